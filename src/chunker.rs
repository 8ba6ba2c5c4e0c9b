//! # Chunker
//!
//! Splits normalized text into overlapping, sentence-aware chunks.
//!
//! The scan proposes a window of `chunk_size` characters. When the window ends before the
//! text does, the end is pulled back to just after the last `.`, `!` or `?` that lies past
//! the window's midpoint; without one the raw boundary is kept. The next window starts
//! `chunk_overlap` characters before the previous end.
//!
//! Offsets are counted in `char`s, not bytes, and refer to the text handed to [`chunk`].
//! Each chunk inherits the metadata of the source segment covering its start offset (see
//! [`SegmentIndex::lookup`] for the rule used when the start falls between segments).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{RagError, Result};

/// Open key-value metadata attached to chunks and segments.
pub type Metadata = BTreeMap<String, JsonValue>;

const SENTENCE_TERMINALS: [char; 3] = ['.', '!', '?'];

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed chunk text; never empty.
    pub text: String,
    /// Position in left-to-right scan order, unique per document.
    pub chunk_id: usize,
    /// Inclusive start offset (chars) into the chunked text.
    pub char_start: usize,
    /// Exclusive end offset (chars); always greater than `char_start`.
    pub char_end: usize,
    /// Metadata inherited from the covering extraction segment; may be empty.
    pub source_metadata: Metadata,
}

impl Chunk {
    /// Flatten the chunk's bookkeeping and inherited metadata into one record.
    ///
    /// Produces `chunk_id`, `char_start`, `char_end`, `chunk_size` (chars of the trimmed
    /// text) plus every `source_metadata` entry. Bookkeeping keys win on collision.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = self.source_metadata.clone();
        metadata.insert("chunk_id".into(), self.chunk_id.into());
        metadata.insert("char_start".into(), self.char_start.into());
        metadata.insert("char_end".into(), self.char_end.into());
        metadata.insert("chunk_size".into(), self.text.chars().count().into());
        metadata
    }
}

/// One extraction unit (PDF page, DOCX paragraph, ...) and the text range it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSegment {
    pub char_start: usize,
    pub char_end: usize,
    /// Everything else the extractor recorded (`page`, `paragraph`, `format`, ...).
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl SourceSegment {
    pub fn new(char_start: usize, char_end: usize, metadata: Metadata) -> Self {
        Self {
            char_start,
            char_end,
            metadata,
        }
    }

    fn contains(&self, pos: usize) -> bool {
        self.char_start <= pos && pos < self.char_end
    }
}

/// Segments sorted by start offset, for offset → metadata lookups.
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    segments: Vec<SourceSegment>,
}

impl SegmentIndex {
    /// Build the index. The sort is stable, so equal starts keep extraction order.
    pub fn new(segments: &[SourceSegment]) -> Self {
        let mut segments = segments.to_vec();
        segments.sort_by_key(|s| s.char_start);
        Self { segments }
    }

    /// Metadata for the chunk starting at `pos`.
    ///
    /// The first segment (in start order) whose `[char_start, char_end)` contains `pos`
    /// wins. When `pos` falls in a gap between segments, the nearest segment starting
    /// before `pos` is used instead, so separator runs between pages or paragraphs still
    /// cite their preceding unit. Before the first segment the metadata is empty.
    pub fn lookup(&self, pos: usize) -> Metadata {
        let upper = self.segments.partition_point(|s| s.char_start <= pos);
        let candidates = &self.segments[..upper];

        candidates
            .iter()
            .find(|s| s.contains(pos))
            .or_else(|| candidates.last())
            .map(|s| s.metadata.clone())
            .unwrap_or_default()
    }
}

/// Split `text` into overlapping chunks.
///
/// # Errors
/// [`RagError::InvalidInput`] unless `chunk_size > 0` and `chunk_overlap < chunk_size`.
///
/// ```rust
/// use study_rag::chunker::chunk;
///
/// let chunks = chunk("One. Two. Three.", 1000, 200, None).unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "One. Two. Three.");
/// ```
pub fn chunk(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    source_segments: Option<&[SourceSegment]>,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(RagError::InvalidInput("chunk_size must be > 0".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidInput(format!(
            "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let segments = source_segments.map(SegmentIndex::new).unwrap_or_default();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = window_end(&chars, start, chunk_size);

        let slice: String = chars[start..end].iter().collect();
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                text: trimmed.to_string(),
                chunk_id: chunks.len(),
                char_start: start,
                char_end: end,
                source_metadata: segments.lookup(start),
            });
        }

        if end >= len {
            break;
        }

        let next = end - chunk_overlap.min(end);
        // A sentence snap can pull `end` back far enough that the overlap would not move
        // the window forward; continue from `end` instead of stalling.
        start = if next > start { next } else { end };
    }

    tracing::debug!(
        chars = len,
        chunks = chunks.len(),
        chunk_size,
        chunk_overlap,
        "chunked text"
    );
    Ok(chunks)
}

fn window_end(chars: &[char], start: usize, chunk_size: usize) -> usize {
    let end = start + chunk_size;
    if end >= chars.len() {
        return chars.len();
    }

    let floor = start + chunk_size / 2;
    chars[start..end]
        .iter()
        .rposition(|c| SENTENCE_TERMINALS.contains(c))
        .map(|offset| start + offset)
        .filter(|&pos| pos > floor)
        .map_or(end, |pos| pos + 1)
}
