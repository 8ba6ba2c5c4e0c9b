//! # Context assembly
//!
//! Turns retrieved chunks and conversation state into the message sequences sent to the
//! generator. The chat sequence is always:
//!
//! 1. the system prompt,
//! 2. prior turns, verbatim and in order, trimmed from the oldest end to fit a token budget,
//! 3. one user turn carrying the numbered context block and the literal question.
//!
//! Token counts use the `cl100k_base` encoding from `tiktoken-rs`. If the encoder cannot be
//! constructed, counts fall back to a four-characters-per-token estimate.

use once_cell::sync::Lazy;
use tiktoken_rs::{CoreBPE, cl100k_base};

use crate::generation::ChatMessage;

/// Number the passages as `[Context i]` (1-based) and join them with blank lines.
///
/// ```rust
/// use study_rag::context::context_block;
///
/// let block = context_block(&["Cells divide.", "DNA replicates first."]);
/// assert_eq!(block, "[Context 1]\nCells divide.\n\n[Context 2]\nDNA replicates first.");
/// ```
pub fn context_block<S: AsRef<str>>(passages: &[S]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[Context {}]\n{}", i + 1, p.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Join passages with blank lines and no numbering.
pub fn join_passages<S: AsRef<str>>(passages: &[S]) -> String {
    passages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Final user turn of a grounded chat request.
pub fn grounded_question(context: &str, query: &str) -> String {
    format!(
        "Context from your documents:\n{context}\n\nQuestion: {query}\n\nPlease answer based on the context above."
    )
}

static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| match cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!(error = %e, "cl100k encoder unavailable, estimating tokens");
        None
    }
});

/// Token count of `text` under `cl100k_base`.
pub fn count_tokens(text: &str) -> usize {
    match CL100K.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// The newest suffix of `history` whose total token count fits `max_tokens`.
///
/// Messages are dropped from the front (oldest first). The relative order of the kept
/// messages never changes.
pub fn trim_history(history: &[ChatMessage], max_tokens: usize) -> &[ChatMessage] {
    let mut total: usize = history.iter().map(|m| count_tokens(&m.content)).sum();
    let mut start = 0;

    while total > max_tokens && start < history.len() {
        tracing::debug!(total, max_tokens, "dropping oldest history message");
        total -= count_tokens(&history[start].content);
        start += 1;
    }
    &history[start..]
}

/// Full message sequence for a grounded chat request.
pub fn chat_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    history_max_tokens: usize,
    context: &str,
    query: &str,
) -> Vec<ChatMessage> {
    let history = trim_history(history, history_max_tokens);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(grounded_question(context, query)));
    messages
}

fn topic_suffix(topic: Option<&str>) -> String {
    match topic.map(str::trim) {
        Some(t) if !t.is_empty() => format!(" focusing on {t}"),
        _ => String::new(),
    }
}

/// User turn asking for multiple-choice questions as a JSON array.
pub fn quiz_prompt(
    num_questions: usize,
    difficulty: &str,
    topic: Option<&str>,
    content: &str,
) -> String {
    format!(
        "Based on the following content, generate {num_questions} multiple-choice questions at a {difficulty} difficulty level{topic}.

Content:
{content}

For each question, provide:
1. The question text
2. Four answer options (A, B, C, D)
3. The correct answer (letter)
4. A brief explanation of why it's correct

Format your response as a JSON array of objects with keys: question, option_a, option_b, option_c, option_d, correct_answer, explanation",
        topic = topic_suffix(topic),
    )
}

/// User turn asking for flashcards as a JSON array.
pub fn flashcard_prompt(num_cards: usize, topic: Option<&str>, content: &str) -> String {
    format!(
        "Based on the following content, generate {num_cards} flashcards{topic}.

Content:
{content}

For each flashcard, provide:
- Front: A question, term, or concept
- Back: The answer, definition, or explanation

Format your response as a JSON array of objects with keys: front, back",
        topic = topic_suffix(topic),
    )
}

/// User turn asking for a summary of roughly `max_words` words.
pub fn summary_prompt(max_words: usize, content: &str) -> String {
    format!(
        "Please provide a comprehensive summary of the following document in approximately {max_words} words.
Cover the main topics, key concepts, and important points.

Document content:
{content}"
    )
}
