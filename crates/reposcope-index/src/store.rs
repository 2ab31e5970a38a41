//! Exact nearest-neighbour index over chunk embeddings.
//!
//! [`FlatIndex`] stores vectors row-major next to their [`Chunk`] metadata and
//! answers queries by brute-force squared Euclidean distance. [`VectorStore`]
//! adds locking and snapshot persistence on top.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;
use crate::error::{IndexError, Result};

pub const DEFAULT_DIMENSION: usize = 1536;
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A search result: the stored chunk and its squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
    metadata: Vec<Chunk>,
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dimension.max(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }

    /// Append a vector and its metadata; returns the entry position.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `vector` has the wrong length.
    pub fn insert(&mut self, vector: &[f32], chunk: Chunk) -> Result<usize> {
        self.check_dimension(vector)?;
        let position = self.metadata.len();
        self.vectors.extend_from_slice(vector);
        self.metadata.push(chunk);
        Ok(position)
    }

    /// The `top_k` nearest entries, closest first. Ties keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `query` has the wrong length.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        self.check_dimension(query)?;
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension.max(1))
            .map(|row| squared_l2(row, query))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .filter_map(|(pos, distance)| {
                self.metadata.get(pos).map(|chunk| SearchHit {
                    chunk: chunk.clone(),
                    distance,
                })
            })
            .collect())
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.metadata
    }

    fn to_snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension: self.dimension,
            vectors: self.vectors.chunks_exact(self.dimension.max(1)).collect(),
            metadata: &self.metadata,
        }
    }

    fn from_snapshot(snapshot: OwnedSnapshot, dimension: usize) -> Result<Self> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(IndexError::CorruptSnapshot(format!(
                "unsupported format version {}",
                snapshot.format_version
            )));
        }
        if snapshot.dimension != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: snapshot.dimension,
            });
        }
        if snapshot.vectors.len() != snapshot.metadata.len() {
            return Err(IndexError::CorruptSnapshot(format!(
                "{} vectors but {} metadata entries",
                snapshot.vectors.len(),
                snapshot.metadata.len()
            )));
        }
        let mut index = Self::new(dimension);
        for (vector, chunk) in snapshot.vectors.into_iter().zip(snapshot.metadata) {
            index.insert(&vector, chunk)?;
        }
        Ok(index)
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    format_version: u32,
    dimension: usize,
    vectors: Vec<&'a [f32]>,
    metadata: &'a [Chunk],
}

#[derive(Deserialize)]
struct OwnedSnapshot {
    format_version: u32,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Chunk>,
}

/// Thread-safe [`FlatIndex`] bound to a snapshot path.
#[derive(Debug)]
pub struct VectorStore {
    index: RwLock<FlatIndex>,
    path: PathBuf,
    /// Held from snapshot to rename so concurrent persists never share a temp file.
    persist_lock: tokio::sync::Mutex<()>,
}

impl VectorStore {
    /// Restore from `path` if a snapshot exists there, else start empty.
    ///
    /// A missing, unreadable or unparseable snapshot is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the snapshot was built for another
    /// dimension, or `CorruptSnapshot` if its vectors and metadata disagree.
    pub async fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let path = path.into();
        let index = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<OwnedSnapshot>(&bytes) {
                Ok(snapshot) => {
                    let index = FlatIndex::from_snapshot(snapshot, dimension)?;
                    tracing::info!(path = %path.display(), entries = index.len(), "index restored");
                    index
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "unparseable index snapshot, starting empty: {e}");
                    FlatIndex::new(dimension)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no index snapshot, starting empty");
                FlatIndex::new(dimension)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "unreadable index snapshot, starting empty: {e}");
                FlatIndex::new(dimension)
            }
        };
        Ok(Self {
            index: RwLock::new(index),
            path,
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// An empty store that persists to `path`, ignoring any existing snapshot.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            index: RwLock::new(FlatIndex::new(dimension)),
            path: path.into(),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, FlatIndex> {
        self.index
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `vector` has the wrong length.
    pub fn insert(&self, vector: &[f32], chunk: Chunk) -> Result<usize> {
        self.index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(vector, chunk)
    }

    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `query` has the wrong length.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        self.read().search(query, top_k)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.read().dimension()
    }

    /// Stored chunk metadata in insertion order.
    #[must_use]
    pub fn chunks(&self) -> Vec<Chunk> {
        self.read().chunks().to_vec()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot to the store's own path.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the file cannot be written.
    pub async fn persist(&self) -> Result<()> {
        self.persist_to(&self.path).await
    }

    /// Write the snapshot to `path`, replacing any existing file.
    ///
    /// The bytes go to a sibling temp file first and are renamed into place.
    /// Concurrent calls are serialized, and each writes the index as it is
    /// when its turn comes.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the file cannot be written.
    pub async fn persist_to(&self, path: &Path) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let (bytes, entries) = {
            let index = self.read();
            let bytes = serde_json::to_vec(&index.to_snapshot()).map_err(|e| {
                IndexError::Persistence {
                    path: path.to_path_buf(),
                    source: std::io::Error::other(e),
                }
            })?;
            (bytes, index.len())
        };

        let persistence = |source| IndexError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(persistence)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await.map_err(persistence)?;
        tokio::fs::rename(&tmp, path).await.map_err(persistence)?;

        tracing::info!(path = %path.display(), entries, "index persisted");
        Ok(())
    }
}
