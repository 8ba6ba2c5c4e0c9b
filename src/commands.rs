//! This module defines the command-line interface for `srag` using `clap`.
//!
//! It provides a `Cli` struct holding the global options and the parsed subcommand, and a
//! `Commands` enum with one variant per subcommand.
//!
//! ```no_run
//! use clap::Parser;
//! use study_rag::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Search { index, query, k } = cli.command {
//!     println!("searching {} for {query:?} (k = {k:?})", index.display());
//! }
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::rag::Difficulty;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Auto)]
pub struct Cli {
    /// Config file to use instead of `<config_dir>/config.yaml`.
    #[arg(long, global = true, env = "SRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// API key; overrides the one in the config file.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config and prompt templates to the config directory.
    Init,

    /// Chunk and embed a document, then persist its index.
    #[clap(alias = "p")]
    Process {
        /// Document to index (`.txt`, `.md`).
        file: PathBuf,

        /// Base path for the index files. Defaults to the document's path without extension.
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Show the chunks nearest to a query.
    #[clap(alias = "s")]
    Search {
        /// Index base path.
        index: PathBuf,
        query: String,
        #[arg(short = 'k')]
        k: Option<usize>,
    },

    /// Ask one question against an index.
    #[clap(alias = "a")]
    Ask {
        /// Index base path.
        index: PathBuf,
        question: String,
        #[arg(short = 'k')]
        k: Option<usize>,
        #[arg(long, short = 't')]
        temperature: Option<f32>,
    },

    /// Chat with an index until `exit`.
    #[clap(alias = "i")]
    Interactive {
        /// Index base path.
        index: PathBuf,
        #[arg(short = 'k')]
        k: Option<usize>,
    },

    /// Generate and take a multiple-choice quiz.
    Quiz {
        /// Index base path.
        index: PathBuf,
        #[arg(short = 'n', default_value_t = 5)]
        num_questions: usize,
        #[arg(long, short = 'd', value_enum, default_value_t = Difficulty::Medium)]
        difficulty: Difficulty,
        #[arg(long)]
        topic: Option<String>,
    },

    /// Generate flashcards.
    Flashcards {
        /// Index base path.
        index: PathBuf,
        #[arg(short = 'n', default_value_t = 10)]
        num_cards: usize,
        #[arg(long)]
        topic: Option<String>,
    },

    /// Summarize the indexed document.
    Summarize {
        /// Index base path.
        index: PathBuf,
        #[arg(long, default_value_t = 500)]
        max_words: usize,
    },
}

/// Index base path for `file` when `process` gets no `--out`.
///
/// With an `index_dir` the base is `<index_dir>/<file stem>`; otherwise it sits next to the
/// document, with the extension removed.
pub fn default_index_base(file: &Path, index_dir: Option<&Path>) -> PathBuf {
    match (index_dir, file.file_stem()) {
        (Some(dir), Some(stem)) => dir.join(stem),
        _ => file.with_extension(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_process_with_overrides() {
        let cli = Cli::try_parse_from([
            "srag",
            "--config",
            "/tmp/c.yaml",
            "process",
            "notes.md",
            "--chunk-size",
            "500",
            "-o",
            "idx/notes",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        match cli.command {
            Commands::Process {
                file,
                out,
                chunk_size,
                chunk_overlap,
            } => {
                assert_eq!(file, PathBuf::from("notes.md"));
                assert_eq!(out, Some(PathBuf::from("idx/notes")));
                assert_eq!(chunk_size, Some(500));
                assert_eq!(chunk_overlap, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quiz_defaults() {
        let cli = Cli::try_parse_from(["srag", "quiz", "idx/notes", "-d", "hard"]).unwrap();
        match cli.command {
            Commands::Quiz {
                num_questions,
                difficulty,
                topic,
                ..
            } => {
                assert_eq!(num_questions, 5);
                assert_eq!(difficulty, Difficulty::Hard);
                assert_eq!(topic, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_difficulty() {
        assert!(Cli::try_parse_from(["srag", "quiz", "idx", "-d", "brutal"]).is_err());
    }

    #[test]
    fn default_index_base_placement() {
        assert_eq!(
            default_index_base(Path::new("docs/bio.md"), None),
            PathBuf::from("docs/bio")
        );
        assert_eq!(
            default_index_base(Path::new("docs/bio.md"), Some(Path::new("/var/idx"))),
            PathBuf::from("/var/idx/bio")
        );
    }
}
