//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `StudyRagConfig` struct, which holds the backend endpoints, model names and
//! the chunking, retrieval and generation knobs, and a `load_config` function to load it
//! from a YAML file. Every field except the credentials has a default, so a config file
//! only needs to name what it changes.
//!
//! # Examples
//!
//! ```no_run
//! use study_rag::config::{StudyRagConfig, load_config};
//!
//! let config: StudyRagConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::*;

use crate::error::{RagError, Result};

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct StudyRagConfig {
    /// The API key used to authenticate requests to the backends.
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model used for chat, quiz, flashcard and summary generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Texts per embedding request.
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Embedding requests in flight at once.
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,

    /// Per-request timeout for both backends.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Chunking
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    // Retrieval and chat
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token budget for prior turns included in a chat request.
    #[serde(default = "default_history_max_tokens")]
    pub history_max_tokens: usize,

    /// Number of most recent messages handed to the assembler.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    // Quiz / flashcard / summary generation
    #[serde(default = "default_sample_chunks")]
    pub sample_chunks: usize,
    #[serde(default = "default_quiz_temperature")]
    pub quiz_temperature: f32,
    #[serde(default = "default_flashcard_temperature")]
    pub flashcard_temperature: f32,
    #[serde(default = "default_generation_max_tokens")]
    pub generation_max_tokens: u32,

    /// Where `process` writes indexes when no explicit base path is given.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_batch_size() -> usize {
    100
}
fn default_embedding_concurrency() -> usize {
    1
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    5
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_history_max_tokens() -> usize {
    2048
}
fn default_history_turns() -> usize {
    5
}
fn default_sample_chunks() -> usize {
    10
}
fn default_quiz_temperature() -> f32 {
    0.8
}
fn default_flashcard_temperature() -> f32 {
    0.7
}
fn default_generation_max_tokens() -> u32 {
    2000
}

impl Default for StudyRagConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_batch_size: default_embedding_batch_size(),
            embedding_concurrency: default_embedding_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_max_tokens: default_history_max_tokens(),
            history_turns: default_history_turns(),
            sample_chunks: default_sample_chunks(),
            quiz_temperature: default_quiz_temperature(),
            flashcard_temperature: default_flashcard_temperature(),
            generation_max_tokens: default_generation_max_tokens(),
            index_dir: None,
        }
    }
}

impl StudyRagConfig {
    /// Reject settings that would make chunking or embedding impossible.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config("embedding_batch_size must be > 0".into()));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::Config("embedding_concurrency must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be > 0".into()));
        }
        if self.sample_chunks == 0 {
            return Err(RagError::Config("sample_chunks must be > 0".into()));
        }
        Ok(())
    }

    /// Write this configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

/// Default config file location: `<config_dir>/config.yaml`.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::config_dir()?.join("config.yaml"))
}

/// Directory holding `config_path`, which also roots `templates/`.
pub fn config_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Loads and validates the application's configuration from a YAML file.
///
/// ```no_run
/// use study_rag::config::load_config;
///
/// match load_config("/path/to/config.yaml") {
///     Ok(config) => println!("{:?}", config),
///     Err(err) => eprintln!("Error loading config: {}", err),
/// }
/// ```
pub fn load_config(file: &str) -> Result<StudyRagConfig> {
    debug!("Loading config: {:?}", file);
    let content = fs::read_to_string(file)?;
    let config: StudyRagConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
