//! # study_rag (library root)
//!
//! Document retrieval-augmented generation for study material. A document becomes
//! normalized, overlapping chunks; the chunks are embedded and stored in a flat vector
//! index; questions are answered from the nearest chunks, and quizzes, flashcards and
//! summaries are generated from samples of them.
//!
//! The pipeline, module by module:
//!
//! - Ingestion: [`document`] (extractor registry, stats, keywords) over [`normalize`] and
//!   [`chunker`].
//! - Backends: [`embedding`] and [`generation`], each a trait with an OpenAI-compatible
//!   implementation and a client that adds batching, timeouts and validation.
//! - Storage: [`vector_store`], an exact nearest-neighbour index persisted as two sibling
//!   files.
//! - Orchestration: [`rag`] owns the index lifecycle and the chat, quiz, flashcard and
//!   summary flows, with prompt assembly in [`context`], prompts in [`template`], reply
//!   parsing in [`structured`] and caller-owned history in [`session`].
//! - Plumbing: [`config`], [`error`], and the `srag` CLI in [`commands`].
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use study_rag::{config::StudyRagConfig, document::DocumentProcessor, rag::RagSystem};
//!
//! # async fn demo() -> study_rag::Result<()> {
//! let config = StudyRagConfig::default();
//! let processed = DocumentProcessor::new(config.chunk_size, config.chunk_overlap)
//!     .process(Path::new("notes/cell-biology.md"))?;
//!
//! let mut rag = RagSystem::from_config(&config, study_rag::template::load_or_default()?);
//! rag.create_index(processed.chunk_texts, Some(processed.chunk_metadata)).await?;
//! rag.save_index(Path::new("indexes/cell-biology"))?;
//!
//! let answer = rag.chat("What happens in prophase?", 5, &[], 0.7).await?;
//! println!("{}", answer.answer);
//! # Ok(()) }
//! ```

use directories::ProjectDirs;

pub mod chunker;
pub mod commands;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod normalize;
pub mod rag;
pub mod session;
pub mod structured;
pub mod template;
pub mod vector_store;

pub use error::{RagError, Result};

/// Return the per-platform configuration directory used by `srag`.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "study-rag", "srag")`. The directory is **not** created here.
///
/// # Errors
/// [`RagError::Config`] if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<std::path::PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "study-rag", "srag")
        .ok_or_else(|| RagError::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
