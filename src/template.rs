//! # Prompt templates
//!
//! System prompts for each generation task, kept in one small YAML document so they can be
//! tuned without recompiling. The file sits next to the active config file:
//!
//! ```text
//! <config root>/config.yaml
//! <config root>/templates/prompts.yaml
//! ```
//!
//! Missing fields fall back to the built-in defaults, so a file that only overrides
//! `chat_system` is valid.
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! chat_system: "You are a patient biology tutor. Answer only from the provided context."
//! quiz_system: "You write exam-style multiple-choice questions."
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the prompt set under `<config root>/templates/`.
pub const PROMPTS_FILE: &str = "prompts.yaml";

/// System prompts used by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Grounded question answering.
    pub chat_system: String,
    /// Multiple-choice quiz generation.
    pub quiz_system: String,
    /// Flashcard generation.
    pub flashcard_system: String,
    /// Whole-document summaries.
    pub summary_system: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            chat_system: "You are a helpful AI study assistant. Answer questions based on the \
                provided context from the user's documents.\nIf the context doesn't contain \
                enough information to answer the question, say so clearly.\nBe concise, \
                accurate, and educational in your responses."
                .to_string(),
            quiz_system: "You are an educational quiz generator. Create clear, accurate questions."
                .to_string(),
            flashcard_system:
                "You are an educational flashcard generator. Create clear, concise cards."
                    .to_string(),
            summary_system: "You are a document summarization expert.".to_string(),
        }
    }
}

/// Read a prompt set from `path`.
pub fn load_templates(path: &Path) -> Result<PromptTemplates> {
    tracing::info!("Loading templates: {}", path.display());
    let content = fs::read_to_string(path)?;
    let templates: PromptTemplates = serde_yaml::from_str(&content)?;
    Ok(templates)
}

/// Where the prompt set lives for a given configuration root.
pub fn templates_path(config_root: &Path) -> PathBuf {
    config_root.join("templates").join(PROMPTS_FILE)
}

/// Prompt set stored under `config_root`, or the defaults if there is none.
///
/// A file that exists but fails to parse is an error.
pub fn load_from_dir(config_root: &Path) -> Result<PromptTemplates> {
    let path = templates_path(config_root);
    if !path.exists() {
        tracing::debug!("No templates at {}, using defaults", path.display());
        return Ok(PromptTemplates::default());
    }
    load_templates(&path)
}

/// [`load_from_dir`] over the platform config directory.
pub fn load_or_default() -> Result<PromptTemplates> {
    load_from_dir(&crate::config_dir()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"chat_system: "Only use the notes.""#).unwrap();

        let templates = load_templates(file.path()).unwrap();
        assert_eq!(templates.chat_system, "Only use the notes.");
        assert_eq!(templates.quiz_system, PromptTemplates::default().quiz_system);
    }

    #[test]
    fn default_chat_prompt_demands_grounding() {
        let prompt = PromptTemplates::default().chat_system;
        assert!(prompt.contains("based on the provided context"));
        assert!(prompt.contains("say so clearly"));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chat_system: [unterminated").unwrap();
        assert!(load_templates(file.path()).is_err());
    }

    #[test]
    fn loads_from_the_given_config_root() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(load_from_dir(root.path()).unwrap(), PromptTemplates::default());

        let path = templates_path(root.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "summary_system: \"Summarize for a first-year student.\"\n").unwrap();

        let templates = load_from_dir(root.path()).unwrap();
        assert_eq!(templates.summary_system, "Summarize for a first-year student.");
        assert_eq!(path, root.path().join("templates").join(PROMPTS_FILE));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_templates(Path::new("/definitely/not/here/prompts.yaml")).is_err());
    }
}
