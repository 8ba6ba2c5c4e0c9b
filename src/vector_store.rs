//! # VectorIndex
//!
//! Exact nearest-neighbour index over chunk embeddings.
//!
//! Vectors live in one flat `Vec<f32>` (row-major, `count × dimension`) next to a parallel
//! list of [`IndexEntry`] values holding each chunk's text and metadata. Search is a full
//! scan with squared Euclidean distance, parallelised over rows with `rayon`; vectors are
//! never normalised. Results are ordered by distance, ties by insertion position.
//!
//! ## Serialization layout
//!
//! An index persisted at base path `P` is two sibling files that are always read and
//! written as a pair:
//!
//! - `P.vec`: `bincode` encoding of the dimension, the vector count and the flat data,
//! - `P.chunks.yaml`: the side table. A manifest (format version, creation time, dimension,
//!   vector count, `blake3` digest of `P.vec`) followed by the ordered entries.
//!
//! Each file is written to a temporary sibling and renamed into place. [`VectorIndex::load`]
//! refuses any pair that does not agree on count, dimension or digest.
//!
//! A built index is never mutated, so a loaded index can be shared across tasks and
//! searched concurrently.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::chunker::Metadata;
use crate::error::{RagError, Result};

/// Side-table format version written by this build.
pub const FORMAT_VERSION: u32 = 1;

const VECTOR_SUFFIX: &str = ".vec";
const SIDE_TABLE_SUFFIX: &str = ".chunks.yaml";

/// Text and metadata stored alongside one vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl IndexEntry {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct SideTable {
    version: u32,
    created_at: String,
    dimension: usize,
    vector_count: usize,
    vectors_blake3: String,
    entries: Vec<IndexEntry>,
}

/// Path of the vector artifact for base path `base`.
pub fn vector_path(base: &Path) -> PathBuf {
    with_suffix(base, VECTOR_SUFFIX)
}

/// Path of the side-table artifact for base path `base`.
pub fn side_table_path(base: &Path) -> PathBuf {
    with_suffix(base, SIDE_TABLE_SUFFIX)
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Flat exact nearest-neighbour index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from parallel entries and vectors.
    ///
    /// # Panics
    /// If `entries` and `vectors` differ in length, if the vectors differ in dimension, or
    /// if a non-empty index is given zero-length vectors. All are caller bugs.
    pub fn build(entries: Vec<IndexEntry>, vectors: Vec<Vec<f32>>) -> Self {
        assert_eq!(
            entries.len(),
            vectors.len(),
            "entry count must match vector count"
        );
        let dimension = vectors.first().map_or(0, Vec::len);
        assert!(
            vectors.iter().all(|v| v.len() == dimension),
            "all vectors must share one dimension"
        );
        assert!(
            entries.is_empty() || dimension > 0,
            "vectors must have at least one dimension"
        );

        let data: Vec<f32> = vectors.into_iter().flatten().collect();
        debug!(count = entries.len(), dimension, "built vector index");
        Self {
            dimension,
            data,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn entry(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    /// Stored vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// The `k` nearest positions to `query`, as `(position, squared distance)`.
    ///
    /// `k` is clamped to the number of indexed vectors. Results are ascending by distance;
    /// equal distances keep insertion order.
    ///
    /// # Errors
    /// [`RagError::InvalidInput`] if the query dimension differs from the index's.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::InvalidInput(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| (position, squared_euclidean(row, query)))
            .collect();

        scored.sort_by(|(pos_a, dist_a), (pos_b, dist_b)| {
            dist_a.total_cmp(dist_b).then(pos_a.cmp(pos_b))
        });
        scored.truncate(k.min(self.len()));
        Ok(scored)
    }

    /// Write both artifacts for base path `base`, creating parent directories.
    pub fn persist(&self, base: &Path) -> Result<()> {
        let dir = parent_dir(base);
        fs::create_dir_all(&dir)?;

        let vector_file = VectorFile {
            dimension: self.dimension,
            count: self.len(),
            data: self.data.clone(),
        };
        let bytes = bincode::serde::encode_to_vec(&vector_file, bincode::config::standard())
            .map_err(|e| RagError::corrupt(vector_path(base), format!("encode failed: {e}")))?;

        let side_table = SideTable {
            version: FORMAT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            dimension: self.dimension,
            vector_count: self.len(),
            vectors_blake3: blake3::hash(&bytes).to_hex().to_string(),
            entries: self.entries.clone(),
        };
        let yaml = serde_yaml::to_string(&side_table)?;

        write_atomically(&dir, &vector_path(base), &bytes)?;
        write_atomically(&dir, &side_table_path(base), yaml.as_bytes())?;

        info!(
            path = %base.display(),
            count = self.len(),
            dimension = self.dimension,
            "persisted vector index"
        );
        Ok(())
    }

    /// Read both artifacts for base path `base`.
    ///
    /// # Errors
    /// [`RagError::CorruptIndex`] if either file is missing or unreadable, or if the pair
    /// disagrees on vector count, dimension or digest.
    pub fn load(base: &Path) -> Result<Self> {
        let vec_path = vector_path(base);
        let table_path = side_table_path(base);

        let bytes = fs::read(&vec_path)
            .map_err(|e| RagError::corrupt(&vec_path, format!("cannot read vectors: {e}")))?;
        let yaml = fs::read_to_string(&table_path)
            .map_err(|e| RagError::corrupt(&table_path, format!("cannot read side table: {e}")))?;

        let (vector_file, _): (VectorFile, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| RagError::corrupt(&vec_path, format!("decode failed: {e}")))?;
        let side_table: SideTable = serde_yaml::from_str(&yaml)
            .map_err(|e| RagError::corrupt(&table_path, format!("parse failed: {e}")))?;

        if side_table.version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                &table_path,
                format!("unsupported format version {}", side_table.version),
            ));
        }
        let digest = blake3::hash(&bytes).to_hex().to_string();
        if digest != side_table.vectors_blake3 {
            warn!(path = %vec_path.display(), "vector digest mismatch");
            return Err(RagError::corrupt(&vec_path, "vector digest does not match side table"));
        }
        if vector_file.dimension == 0 && vector_file.count > 0 {
            return Err(RagError::corrupt(&vec_path, "zero-dimension vectors"));
        }
        let expected_len = vector_file.count.checked_mul(vector_file.dimension);
        if expected_len != Some(vector_file.data.len()) {
            return Err(RagError::corrupt(&vec_path, "vector data length is inconsistent"));
        }
        if vector_file.count != side_table.entries.len()
            || vector_file.count != side_table.vector_count
        {
            return Err(RagError::corrupt(
                &table_path,
                format!(
                    "{} vectors but {} side-table entries",
                    vector_file.count,
                    side_table.entries.len()
                ),
            ));
        }
        if vector_file.dimension != side_table.dimension {
            return Err(RagError::corrupt(&table_path, "dimension mismatch"));
        }

        info!(
            path = %base.display(),
            count = vector_file.count,
            created_at = %side_table.created_at,
            "loaded vector index"
        );
        Ok(Self {
            dimension: vector_file.dimension,
            data: vector_file.data,
            entries: side_table.entries,
        })
    }

    /// Delete both artifacts for `base`. Missing files are ignored.
    pub fn remove(base: &Path) -> Result<()> {
        for path in [vector_path(base), side_table_path(base)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed index artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Whether both artifacts exist for `base`.
    pub fn exists(base: &Path) -> bool {
        vector_path(base).is_file() && side_table_path(base).is_file()
    }
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn parent_dir(base: &Path) -> PathBuf {
    match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
