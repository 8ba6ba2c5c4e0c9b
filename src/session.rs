//! # Session state
//!
//! Conversation and quiz state owned by the caller, never by the index. A [`SessionStore`]
//! keys independent sessions by an arbitrary id (a user, a browser tab, a CLI run), so two
//! readers of the same document never see each other's history.
//!
//! - [`ChatSession`] keeps the transcript of completed exchanges. Only exchanges that
//!   produced an answer are recorded, so a failed generation leaves the history unchanged.
//! - [`QuizProgress`] tracks a quiz attempt: the generated questions, the answer given to
//!   each, and the resulting score.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::generation::ChatMessage;
use crate::structured::{QuizQuestion, normalize_answer};

/// Transcript of one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Record a completed user/assistant exchange.
    pub fn push_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::assistant(answer));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// An in-progress or finished quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizProgress {
    questions: Vec<QuizQuestion>,
    answers: Vec<Option<String>>,
    started_at: DateTime<Utc>,
}

impl QuizProgress {
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        let answers = vec![None; questions.len()];
        Self {
            questions,
            answers,
            started_at: Utc::now(),
        }
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record the answer to question `index` and report whether it was correct.
    ///
    /// Answering again replaces the earlier answer.
    ///
    /// # Errors
    /// [`RagError::InvalidInput`] if `index` is out of range or `answer` names no option.
    pub fn answer(&mut self, index: usize, answer: &str) -> Result<bool> {
        let question = self.questions.get(index).ok_or_else(|| {
            RagError::InvalidInput(format!(
                "question {index} does not exist (quiz has {})",
                self.questions.len()
            ))
        })?;
        let letter = normalize_answer(answer)
            .ok_or_else(|| RagError::InvalidInput(format!("{answer:?} is not one of A-D")))?;

        let correct = question.correct_answer == letter;
        self.answers[index] = Some(letter);
        Ok(correct)
    }

    pub fn answered(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn correct(&self) -> usize {
        self.questions
            .iter()
            .zip(&self.answers)
            .filter(|(q, a)| a.as_deref() == Some(q.correct_answer.as_str()))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.answered() == self.questions.len()
    }

    /// Percentage of all questions answered correctly, `0.0..=100.0`.
    pub fn score(&self) -> f64 {
        if self.questions.is_empty() {
            return 0.0;
        }
        self.correct() as f64 / self.questions.len() as f64 * 100.0
    }
}

/// Independent chat and quiz sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionStore {
    chats: HashMap<String, ChatSession>,
    quizzes: HashMap<String, QuizProgress>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chat session for `id`, created empty on first use.
    pub fn chat(&mut self, id: &str) -> &mut ChatSession {
        self.chats.entry(id.to_string()).or_default()
    }

    /// Start (or restart) the quiz for `id`.
    pub fn start_quiz(&mut self, id: &str, questions: Vec<QuizQuestion>) -> &mut QuizProgress {
        let slot = self
            .quizzes
            .entry(id.to_string())
            .or_insert_with(|| QuizProgress::new(Vec::new()));
        *slot = QuizProgress::new(questions);
        slot
    }

    pub fn quiz(&mut self, id: &str) -> Option<&mut QuizProgress> {
        self.quizzes.get_mut(id)
    }

    /// Forget everything held for `id`.
    pub fn reset(&mut self, id: &str) {
        self.chats.remove(id);
        self.quizzes.remove(id);
    }

    pub fn clear_all(&mut self) {
        self.chats.clear();
        self.quizzes.clear();
    }

    pub fn len(&self) -> usize {
        self.chats.len() + self.quizzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty() && self.quizzes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: &str) -> QuizQuestion {
        QuizQuestion {
            question: "Which base pairs with adenine in DNA?".into(),
            option_a: "Guanine".into(),
            option_b: "Thymine".into(),
            option_c: "Cytosine".into(),
            option_d: "Uracil".into(),
            correct_answer: correct.into(),
            explanation: String::new(),
        }
    }

    #[test]
    fn recent_returns_the_tail_in_order() {
        let mut chat = ChatSession::new();
        chat.push_exchange("q1", "a1");
        chat.push_exchange("q2", "a2");

        let recent = chat.recent(3);
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a1", "q2", "a2"]);
        assert_eq!(chat.recent(10).len(), 4);
        assert!(chat.recent(0).is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let mut store = SessionStore::new();
        store.chat("alice").push_exchange("hi", "hello");
        assert!(store.chat("bob").is_empty());
        assert_eq!(store.chat("alice").len(), 2);

        store.reset("alice");
        assert!(store.chat("alice").is_empty());
    }

    #[test]
    fn quiz_scoring() {
        let mut quiz = QuizProgress::new(vec![question("B"), question("B"), question("B")]);
        assert!(quiz.answer(0, "b").unwrap());
        assert!(!quiz.answer(1, "A)").unwrap());
        assert!(!quiz.is_complete());

        assert!(quiz.answer(2, "(B) Thymine").unwrap());
        assert!(quiz.is_complete());
        assert_eq!(quiz.correct(), 2);
        assert!((quiz.score() - 200.0 / 3.0).abs() < 1e-9);

        // Re-answering replaces the old answer.
        assert!(quiz.answer(1, "B").unwrap());
        assert_eq!(quiz.score(), 100.0);
    }

    #[test]
    fn quiz_rejects_bad_answers() {
        let mut quiz = QuizProgress::new(vec![question("A")]);
        assert!(matches!(quiz.answer(5, "A"), Err(RagError::InvalidInput(_))));
        assert!(matches!(quiz.answer(0, "maybe"), Err(RagError::InvalidInput(_))));
        assert_eq!(quiz.answered(), 0);
    }

    #[test]
    fn store_tracks_quizzes_per_id() {
        let mut store = SessionStore::new();
        store.start_quiz("s1", vec![question("C")]).answer(0, "c").unwrap();
        assert_eq!(store.quiz("s1").unwrap().score(), 100.0);
        assert!(store.quiz("s2").is_none());

        store.clear_all();
        assert!(store.is_empty());
    }
}
