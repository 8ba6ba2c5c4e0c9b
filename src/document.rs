//! # Document processing
//!
//! Turns a file on disk into the `(chunk_texts, chunk_metadata, stats)` triple the index
//! builder consumes:
//!
//! 1. pick an [`Extractor`] by file extension (unknown extensions are rejected before
//!    anything is read),
//! 2. normalize the extracted text and re-project the extractor's segments onto it,
//! 3. chunk the normalized text.
//!
//! Format readers for PDF or DOCX live outside this crate; register them with
//! [`ExtractorRegistry::register`]. Plain text and Markdown are handled in-crate.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::chunker::{Metadata, SourceSegment, chunk};
use crate::error::{RagError, Result};
use crate::normalize::normalize_with_offsets;

/// Raw text plus the segments describing where each part came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub segments: Vec<SourceSegment>,
}

/// A format-specific text extractor.
pub trait Extractor: Send + Sync {
    /// Extract the text of `path`, with segment offsets counted in chars of `text`.
    fn extract(&self, path: &Path) -> Result<Extraction>;
}

/// Reads UTF-8 text files; invalid byte sequences are replaced rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction> {
        let bytes = fs::read(path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), "file is not valid UTF-8, decoding lossily");
                String::from_utf8_lossy(&e.into_bytes()).into_owned()
            }
        };

        let mut metadata = Metadata::new();
        metadata.insert("format".into(), json!("txt"));
        let segments = vec![SourceSegment::new(0, text.chars().count(), metadata)];

        Ok(Extraction { text, segments })
    }
}

/// Extension → extractor table. Extensions are matched case-insensitively, without the dot.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("txt", Arc::new(PlainTextExtractor));
        registry.register("md", Arc::new(PlainTextExtractor));
        registry
    }
}

impl ExtractorRegistry {
    /// A registry that supports nothing.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Add or replace the extractor for `extension`.
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(
            extension.trim_start_matches('.').to_lowercase(),
            extractor,
        );
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.extractors.contains_key(&extension_of(path))
    }

    /// Supported extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<_> = self.extractors.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Dispatch to the extractor registered for `path`'s extension.
    pub fn extract(&self, path: &Path) -> Result<Extraction> {
        let extension = extension_of(path);
        let extractor = self
            .extractors
            .get(&extension)
            .ok_or(RagError::UnsupportedFormat {
                extension: extension.clone(),
            })?;
        extractor.extract(path)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Summary numbers reported after processing a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Chars of extracted text, before normalization.
    pub total_characters: usize,
    pub total_chunks: usize,
    /// Mean chars per chunk text; `0.0` when there are no chunks.
    pub avg_chunk_size: f64,
    /// Lower-cased extension with a leading dot, e.g. `".pdf"`.
    pub file_format: String,
    pub source_segments: usize,
}

/// Output of [`DocumentProcessor::process`], positionally aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDocument {
    pub chunk_texts: Vec<String>,
    pub chunk_metadata: Vec<Metadata>,
    pub stats: DocumentStats,
}

/// Extraction + normalization + chunking for one document.
#[derive(Clone)]
pub struct DocumentProcessor {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    registry: ExtractorRegistry,
}

impl DocumentProcessor {
    /// A processor with the default (plain text / Markdown) registry.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::with_registry(chunk_size, chunk_overlap, ExtractorRegistry::default())
    }

    pub fn with_registry(
        chunk_size: usize,
        chunk_overlap: usize,
        registry: ExtractorRegistry,
    ) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            registry,
        }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Extract, normalize and chunk the file at `path`.
    ///
    /// # Errors
    /// - [`RagError::UnsupportedFormat`] for unknown extensions (nothing is read).
    /// - Extractor failures, propagated unchanged.
    /// - [`RagError::InvalidInput`] for bad chunk parameters.
    pub fn process(&self, path: &Path) -> Result<ProcessedDocument> {
        if !self.registry.is_supported(path) {
            return Err(RagError::UnsupportedFormat {
                extension: extension_of(path),
            });
        }

        let extraction = self.registry.extract(path)?;
        let mut processed = self.process_extraction(&extraction)?;
        processed.stats.file_format = format!(".{}", extension_of(path));

        info!(
            path = %path.display(),
            chunks = processed.stats.total_chunks,
            characters = processed.stats.total_characters,
            "processed document"
        );
        Ok(processed)
    }

    /// Normalize and chunk an already extracted document.
    pub fn process_extraction(&self, extraction: &Extraction) -> Result<ProcessedDocument> {
        let (text, offsets) = normalize_with_offsets(&extraction.text);
        let segments = project_segments(&extraction.segments, &offsets);

        let chunks = chunk(&text, self.chunk_size, self.chunk_overlap, Some(&segments))?;

        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_metadata: Vec<Metadata> = chunks.iter().map(|c| c.to_metadata()).collect();

        let avg_chunk_size = if chunk_texts.is_empty() {
            0.0
        } else {
            chunk_texts.iter().map(|t| t.chars().count()).sum::<usize>() as f64
                / chunk_texts.len() as f64
        };

        let stats = DocumentStats {
            total_characters: extraction.text.chars().count(),
            total_chunks: chunk_texts.len(),
            avg_chunk_size,
            file_format: String::new(),
            source_segments: extraction.segments.len(),
        };

        Ok(ProcessedDocument {
            chunk_texts,
            chunk_metadata,
            stats,
        })
    }
}

/// Map raw segment ranges through the normalization offset map.
fn project_segments(segments: &[SourceSegment], offsets: &[usize]) -> Vec<SourceSegment> {
    let last = offsets.len().saturating_sub(1);
    segments
        .iter()
        .map(|s| {
            SourceSegment::new(
                offsets[s.char_start.min(last)],
                offsets[s.char_end.min(last)],
                s.metadata.clone(),
            )
        })
        .collect()
}

const STOP_WORDS: &[&str] = &[
    "this", "that", "these", "those", "with", "from", "have", "been", "were", "will", "would",
    "could", "should", "their", "there", "where", "which", "what", "when", "about", "also",
    "into", "through", "during", "before", "after", "above", "below", "between", "under",
    "again", "further", "then", "once", "here", "more", "most", "other", "some", "such", "only",
    "same", "than", "very", "just", "your", "they", "them",
];

/// Most frequent words of four or more ASCII letters, stop words excluded.
///
/// Ties keep first-occurrence order.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    let words = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() >= 4 && w.chars().all(|c| c.is_ascii_lowercase()))
        .filter(|w| !STOP_WORDS.contains(w));

    for (position, word) in words.enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
        count_b.cmp(count_a).then(first_a.cmp(first_b))
    });
    ranked
        .into_iter()
        .take(max_keywords)
        .map(|(word, _)| word.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, tempdir};

    struct PagedExtractor;

    impl Extractor for PagedExtractor {
        fn extract(&self, _path: &Path) -> Result<Extraction> {
            let pages = ["Page   one text.", "Page two\n\n\n\ntext."];
            let mut text = String::new();
            let mut segments = Vec::new();
            for (i, page) in pages.iter().enumerate() {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                let start = text.chars().count();
                text.push_str(page);
                let mut metadata = Metadata::new();
                metadata.insert("page".into(), json!(i + 1));
                segments.push(SourceSegment::new(start, text.chars().count(), metadata));
            }
            Ok(Extraction { text, segments })
        }
    }

    #[test]
    fn rejects_unknown_extensions_before_reading() {
        let processor = DocumentProcessor::new(100, 10);
        let err = processor.process(Path::new("/does/not/exist.xyz")).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFormat { extension } if extension == "xyz"));
    }

    #[test]
    fn processes_a_text_file() {
        let mut file = Builder::new().suffix(".TXT").tempfile().unwrap();
        write!(file, "Photosynthesis   converts light.\n\n\n\nChlorophyll absorbs it.").unwrap();

        let processed = DocumentProcessor::new(1000, 200).process(file.path()).unwrap();

        assert_eq!(
            processed.chunk_texts,
            vec!["Photosynthesis converts light.\n\nChlorophyll absorbs it."]
        );
        assert_eq!(processed.stats.total_chunks, 1);
        assert_eq!(processed.stats.file_format, ".txt");
        assert_eq!(processed.stats.source_segments, 1);
        assert_eq!(processed.chunk_metadata[0]["format"], json!("txt"));
        assert_eq!(processed.chunk_metadata[0]["chunk_id"], json!(0));
    }

    #[test]
    fn repairs_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, b"caf\xe9 au lait").unwrap();

        let processed = DocumentProcessor::new(100, 10).process(&path).unwrap();
        assert_eq!(processed.chunk_texts, vec!["caf au lait"]);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let file = Builder::new().suffix(".txt").tempfile().unwrap();
        let processed = DocumentProcessor::new(100, 10).process(file.path()).unwrap();
        assert!(processed.chunk_texts.is_empty());
        assert_eq!(processed.stats.avg_chunk_size, 0.0);
    }

    #[test]
    fn registered_extractor_segments_follow_normalization() {
        let mut registry = ExtractorRegistry::default();
        registry.register(".PDF", Arc::new(PagedExtractor));
        let processor = DocumentProcessor::with_registry(12, 2, registry);

        let processed = processor.process(Path::new("lecture.pdf")).unwrap();

        assert_eq!(processed.stats.file_format, ".pdf");
        let first = &processed.chunk_metadata[0];
        let last = processed.chunk_metadata.last().unwrap();
        assert_eq!(first["page"], json!(1));
        assert_eq!(last["page"], json!(2));
    }

    #[test]
    fn keywords_rank_by_frequency() {
        let text = "Enzymes catalyse reactions. Enzymes lower activation energy; \
                    reactions speed up. This enzymes text.";
        let keywords = extract_keywords(text, 3);
        assert_eq!(keywords, vec!["enzymes", "reactions", "catalyse"]);
    }
}
