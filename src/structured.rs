//! # Structured generation output
//!
//! Quiz questions and flashcards come back from the generator as text that is supposed to be
//! a JSON array. Models often wrap it in prose or a Markdown fence, so parsing is two-step:
//!
//! 1. the whole reply is parsed as a JSON array;
//! 2. failing that, the reply is scanned for the first `[` that starts a complete array of
//!    records, so bracketed prose such as `[1]` ahead of the payload is skipped.
//!
//! Anything that still does not yield at least one well-formed record is
//! [`RagError::MalformedGenerationOutput`], with the raw reply attached for diagnosis.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

static ANSWER_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?i:option)[\s_]*)?\(?([A-Da-d])(?:[\s.):\-]|$)")
        .expect("static pattern compiles")
});

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    /// Always one of `"A"`, `"B"`, `"C"`, `"D"` after parsing.
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

impl QuizQuestion {
    /// Text of the option labelled `letter`, if it is one of A-D.
    pub fn option(&self, letter: &str) -> Option<&str> {
        match normalize_answer(letter)?.as_str() {
            "A" => Some(&self.option_a),
            "B" => Some(&self.option_b),
            "C" => Some(&self.option_c),
            "D" => Some(&self.option_d),
            _ => None,
        }
    }

    /// Whether `answer` names the correct option. Case and trailing text are ignored.
    pub fn is_correct(&self, answer: &str) -> bool {
        normalize_answer(answer).as_deref() == Some(self.correct_answer.as_str())
    }
}

/// One flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// Reduce an answer such as `"b"`, `"B)"`, `"(C) Mitosis"` or `"Option D"` to its letter.
pub fn normalize_answer(raw: &str) -> Option<String> {
    ANSWER_LETTER
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

fn malformed(reason: impl Into<String>, raw: &str) -> RagError {
    RagError::MalformedGenerationOutput {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

fn parse_array<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>> {
    if let Ok(records) = serde_json::from_str::<Vec<T>>(raw.trim()) {
        return Ok(records);
    }

    tracing::debug!("reply is not a bare JSON array, searching for an embedded one");
    let mut empty = None;
    let mut first_error = None;
    for (start, _) in raw.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Vec<T>>();
        match stream.next() {
            Some(Ok(records)) if !records.is_empty() => return Ok(records),
            Some(Ok(records)) => empty = empty.or(Some(records)),
            Some(Err(e)) => first_error = first_error.or(Some(e)),
            None => {}
        }
    }

    if let Some(records) = empty {
        return Ok(records);
    }
    match first_error {
        Some(e) => {
            tracing::warn!(error = %e, "embedded JSON array did not match the record schema");
            Err(malformed(e.to_string(), raw))
        }
        None => Err(malformed("no JSON array found", raw)),
    }
}

/// Parse a quiz reply.
pub fn parse_quiz_questions(raw: &str) -> Result<Vec<QuizQuestion>> {
    let mut questions: Vec<QuizQuestion> = parse_array(raw)?;
    if questions.is_empty() {
        return Err(malformed("no questions in reply", raw));
    }

    for (i, q) in questions.iter_mut().enumerate() {
        if q.question.trim().is_empty() {
            return Err(malformed(format!("question {i} has no text"), raw));
        }
        let Some(letter) = normalize_answer(&q.correct_answer) else {
            return Err(malformed(
                format!("question {i} has invalid correct_answer {:?}", q.correct_answer),
                raw,
            ));
        };
        q.correct_answer = letter;
    }
    Ok(questions)
}

/// Parse a flashcard reply.
pub fn parse_flashcards(raw: &str) -> Result<Vec<Flashcard>> {
    let cards: Vec<Flashcard> = parse_array(raw)?;
    if cards.is_empty() {
        return Err(malformed("no flashcards in reply", raw));
    }
    if let Some(i) = cards
        .iter()
        .position(|c| c.front.trim().is_empty() || c.back.trim().is_empty())
    {
        return Err(malformed(format!("flashcard {i} has an empty side"), raw));
    }
    Ok(cards)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIZ: &str = r#"[{"question":"What organelle makes ATP?","option_a":"Nucleus","option_b":"Mitochondrion","option_c":"Ribosome","option_d":"Golgi","correct_answer":"b","explanation":"Cellular respiration."}]"#;

    #[test]
    fn parses_bare_array() {
        let questions = parse_quiz_questions(QUIZ).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "B");
        assert_eq!(questions[0].option("B"), Some("Mitochondrion"));
    }

    #[test]
    fn recovers_array_wrapped_in_prose_and_fences() {
        let raw = format!("Sure! Here are your questions:\n```json\n{QUIZ}\n```\nGood luck.");
        assert_eq!(parse_quiz_questions(&raw).unwrap().len(), 1);
    }

    #[test]
    fn skips_bracketed_prose_before_the_array() {
        let raw = "Here are [1] cards, see [note]:\n[{\"front\":\"Osmosis\",\"back\":\"Water diffusion\"}]";
        let cards = parse_flashcards(raw).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].back, "Water diffusion");
    }

    #[test]
    fn rejects_text_without_array() {
        let err = parse_flashcards("I cannot help with that.").unwrap_err();
        match err {
            RagError::MalformedGenerationOutput { raw, .. } => {
                assert_eq!(raw, "I cannot help with that.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_array() {
        assert!(matches!(
            parse_flashcards("[]"),
            Err(RagError::MalformedGenerationOutput { .. })
        ));
    }

    #[test]
    fn rejects_records_missing_fields() {
        assert!(parse_flashcards(r#"[{"front":"Osmosis"}]"#).is_err());
    }

    #[test]
    fn rejects_unknown_answer_letter() {
        let raw = QUIZ.replace(r#""correct_answer":"b""#, r#""correct_answer":"E""#);
        assert!(parse_quiz_questions(&raw).is_err());
    }

    #[test]
    fn normalizes_answer_variants() {
        for (raw, want) in [
            ("a", "A"),
            ("B)", "B"),
            ("(c) Ribosome", "C"),
            ("Option D", "D"),
            ("d.", "D"),
        ] {
            assert_eq!(normalize_answer(raw).as_deref(), Some(want), "{raw}");
        }
        assert_eq!(normalize_answer("Because"), None);
        assert_eq!(normalize_answer(""), None);
    }

    #[test]
    fn grading_ignores_case() {
        let q = &parse_quiz_questions(QUIZ).unwrap()[0];
        assert!(q.is_correct("b"));
        assert!(!q.is_correct("A"));
        assert!(!q.is_correct("nonsense"));
    }

    #[test]
    fn flashcards_round_trip() {
        let cards =
            parse_flashcards(r#"[{"front":"Osmosis","back":"Water diffusion across a membrane"}]"#)
                .unwrap();
        assert_eq!(cards[0].front, "Osmosis");
    }
}
