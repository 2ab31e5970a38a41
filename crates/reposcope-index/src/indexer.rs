//! Repository indexing orchestrator: walk → chunk → embed → store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use crate::chunker::{Chunk, DEFAULT_CHUNK_SIZE, chunk_file};
use crate::error::{IndexError, Result};
use crate::store::VectorStore;
use reposcope_llm::{Embedder, EmbeddingProvider};

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Character threshold at which a chunk is emitted.
    pub chunk_size: usize,
    /// File-name suffixes to index; empty means every file.
    pub extensions: Vec<String>,
    /// Apply `.gitignore` and hidden-file filtering during traversal.
    pub respect_gitignore: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            extensions: vec![".py".into(), ".md".into(), ".txt".into()],
            respect_gitignore: false,
        }
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: IndexError,
}

/// Summary of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_attempted: usize,
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IndexReport {
    #[must_use]
    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }
}

/// List regular files under `root` whose name ends with one of `extensions`.
///
/// An empty `extensions` list keeps every file. Order is unspecified.
#[must_use]
pub fn list_files(root: &Path, extensions: &[String], respect_gitignore: bool) -> Vec<PathBuf> {
    if !root.exists() {
        tracing::warn!(root = %root.display(), "index root does not exist");
        return Vec::new();
    }

    let mut walker = ignore::WalkBuilder::new(root);
    if respect_gitignore {
        walker.standard_filters(true).require_git(false);
    } else {
        walker.standard_filters(false);
    }

    walker
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|e| {
            extensions.is_empty() || {
                let name = e.file_name().to_string_lossy();
                extensions.iter().any(|ext| name.ends_with(ext.as_str()))
            }
        })
        .map(ignore::DirEntry::into_path)
        .collect()
}

/// Orchestrates chunking, embedding and insertion over a set of files.
pub struct RepoIndexer<P> {
    embedder: Arc<Embedder<P>>,
    store: Arc<VectorStore>,
    config: IndexerConfig,
}

impl<P: EmbeddingProvider> RepoIndexer<P> {
    #[must_use]
    pub fn new(embedder: Arc<Embedder<P>>, store: Arc<VectorStore>, config: IndexerConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Index every matching file under `root`.
    ///
    /// # Errors
    ///
    /// See [`RepoIndexer::index_files`].
    pub async fn index_repository(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let files = list_files(root, &self.config.extensions, self.config.respect_gitignore);
        tracing::info!(root = %root.display(), files = files.len(), "indexing repository");
        self.index_files(&files, cancel).await
    }

    /// Index `files` concurrently, then persist the store once.
    ///
    /// A failing file is recorded in the report and does not stop the others.
    /// On cancellation the remaining files are recorded as cancelled and
    /// whatever was inserted so far is still persisted.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the index snapshot cannot be written.
    pub async fn index_files(
        &self,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let total = files.len();

        let tasks = files.iter().map(|path| async move {
            let mut inserted = 0usize;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(IndexError::Cancelled),
                r = self.index_file(path, &mut inserted) => r,
            };
            (path, inserted, outcome)
        });
        let results = futures::future::join_all(tasks).await;

        let mut report = IndexReport {
            files_attempted: total,
            ..IndexReport::default()
        };
        for (path, inserted, outcome) in results {
            report.chunks_indexed += inserted;
            match outcome {
                Ok(()) => {
                    report.files_indexed += 1;
                    tracing::debug!(file = %path.display(), chunks = inserted, "file indexed");
                }
                Err(IndexError::Cancelled) => {
                    report.cancelled = true;
                    report.failures.push(FileFailure {
                        path: path.clone(),
                        error: IndexError::Cancelled,
                    });
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), "failed to index file: {e}");
                    report.failures.push(FileFailure {
                        path: path.clone(),
                        error: e,
                    });
                }
            }
        }
        if report.cancelled {
            tracing::warn!(
                cancelled = report.failures.iter().filter(|f| matches!(f.error, IndexError::Cancelled)).count(),
                "indexing cancelled"
            );
        }

        self.store.persist().await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            files = report.files_indexed,
            failed = report.files_failed(),
            chunks = report.chunks_indexed,
            duration_ms = report.duration_ms,
            "indexing complete"
        );
        Ok(report)
    }

    async fn index_file(&self, path: &Path, inserted: &mut usize) -> Result<()> {
        let chunks = chunk_file(path, self.config.chunk_size).await?;
        let mut chunks = std::pin::pin!(chunks);

        let mut chunk_number = 0usize;
        while let Some(text) = chunks.try_next().await? {
            let chunk = Chunk::new(text, path, chunk_number);
            let vector = self.embedder.embed(&chunk.text).await?;
            self.store.insert(&vector, chunk)?;
            *inserted += 1;
            chunk_number += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reposcope_llm::RateLimiter;
    use reposcope_llm::mock::MockProvider;

    use super::*;

    const DIM: usize = 8;

    fn indexer(provider: MockProvider, index_path: &Path, chunk_size: usize) -> RepoIndexer<MockProvider> {
        let limiter = Arc::new(RateLimiter::new(1000, Duration::from_secs(1)).unwrap());
        let embedder = Arc::new(Embedder::new(provider, limiter));
        let store = Arc::new(VectorStore::empty(index_path, DIM));
        RepoIndexer::new(
            embedder,
            store,
            IndexerConfig {
                chunk_size,
                ..IndexerConfig::default()
            },
        )
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn names(mut files: Vec<PathBuf>) -> Vec<String> {
        files.sort();
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn list_files_filters_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x");
        write(dir.path(), "docs/readme.md", "x");
        write(dir.path(), "src/lib.rs", "x");
        write(dir.path(), "notes.txt", "x");

        let exts = vec![".py".to_string(), ".md".to_string()];
        assert_eq!(names(list_files(dir.path(), &exts, false)), vec!["a.py", "readme.md"]);
        assert_eq!(list_files(dir.path(), &[], false).len(), 4);
    }

    #[test]
    fn list_files_includes_hidden_unless_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".hidden/secret.py", "x");
        write(dir.path(), "ignored.py", "x");
        write(dir.path(), "kept.py", "x");
        write(dir.path(), ".gitignore", "ignored.py\n");

        let exts = vec![".py".to_string()];
        assert_eq!(list_files(dir.path(), &exts, false).len(), 3);
        assert_eq!(names(list_files(dir.path(), &exts, true)), vec!["kept.py"]);
    }

    #[test]
    fn list_files_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(&dir.path().join("nope"), &[], false).is_empty());
    }

    #[tokio::test]
    async fn indexes_all_files_and_persists_once() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "repo/a.py", "import os\nprint(os.getcwd())\n"),
            write(dir.path(), "repo/b.md", "# Title\n\nSome prose.\n"),
        ];
        let index_path = dir.path().join("vectorstore.index");
        let ix = indexer(MockProvider::with_dimension(DIM), &index_path, 10);

        let report = ix.index_files(&files, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.files_attempted, 2);
        assert_eq!(report.files_indexed, 2);
        assert!(report.failures.is_empty());
        assert!(!report.cancelled);
        assert_eq!(report.chunks_indexed, ix.store().len());
        assert!(index_path.exists());

        let restored = VectorStore::open(&index_path, DIM).await.unwrap();
        assert_eq!(restored.len(), report.chunks_indexed);
    }

    #[tokio::test]
    async fn chunks_of_one_file_keep_their_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "one.py", "aaaa\nbbbb\ncccc\ndddd\n");
        let ix = indexer(MockProvider::with_dimension(DIM), &dir.path().join("i"), 1);

        ix.index_files(&[file], &CancellationToken::new()).await.unwrap();
        let numbers: Vec<usize> = ix.store().chunks().iter().map(|c| c.chunk_number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert!(ix.store().chunks().iter().all(|c| c.filename == "one.py"));
    }

    #[tokio::test]
    async fn failing_file_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "good1.py", "fine\n"),
            write(dir.path(), "bad.py", "this one says BOOM\n"),
            write(dir.path(), "good2.py", "also fine\n"),
            dir.path().join("missing.py"),
        ];
        let index_path = dir.path().join("vectorstore.index");
        let ix = indexer(MockProvider::with_dimension(DIM).failing_on("BOOM"), &index_path, 500);

        let report = ix.index_files(&files, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.files_attempted, 4);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_failed(), 2);

        let failed = names(report.failures.iter().map(|f| f.path.clone()).collect());
        assert_eq!(failed, vec!["bad.py", "missing.py"]);
        assert!(report.failures.iter().any(|f| matches!(f.error, IndexError::Llm(_))));
        assert!(report.failures.iter().any(|f| matches!(f.error, IndexError::Io(_))));

        let indexed: Vec<String> = ix.store().chunks().into_iter().map(|c| c.filename).collect();
        assert_eq!(indexed.len(), 2);
        assert!(indexed.contains(&"good1.py".to_string()));
        assert!(indexed.contains(&"good2.py".to_string()));
        assert!(index_path.exists());
    }

    #[tokio::test]
    async fn cancelled_run_records_files_and_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "a.py", "a\n"),
            write(dir.path(), "b.py", "b\n"),
        ];
        let index_path = dir.path().join("vectorstore.index");
        let ix = indexer(MockProvider::with_dimension(DIM), &index_path, 500);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = ix.index_files(&files, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.files_failed(), 2);
        assert!(report.failures.iter().all(|f| matches!(f.error, IndexError::Cancelled)));
        assert!(index_path.exists());
    }

    #[tokio::test]
    async fn cancellation_mid_file_keeps_partial_insertions() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let file = write(dir.path(), "long.py", &content);
        let ix = indexer(MockProvider::with_dimension(DIM).with_delay(20), &dir.path().join("i"), 1);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let report = ix.index_files(&[file], &cancel).await.unwrap();
        assert!(report.cancelled);
        assert!(report.chunks_indexed > 0);
        assert!(report.chunks_indexed < 50);
        assert_eq!(ix.store().len(), report.chunks_indexed);
    }

    #[tokio::test]
    async fn persist_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = write(dir.path(), "blocker", "x");
        let file = write(dir.path(), "a.py", "a\n");
        let ix = indexer(MockProvider::with_dimension(DIM), &blocker.join("index"), 500);

        let err = ix
            .index_files(&[file], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Persistence { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_runs_on_one_store_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("vectorstore.index");
        let files: Vec<PathBuf> = (0..40)
            .map(|i| write(dir.path(), &format!("repo/f{i}.txt"), &format!("line {i}\n").repeat(30)))
            .collect();
        let ix = Arc::new(indexer(MockProvider::with_dimension(DIM), &index_path, 50));

        let runs: Vec<_> = (0..4)
            .map(|_| {
                let ix = Arc::clone(&ix);
                let files = files.clone();
                tokio::spawn(async move { ix.index_files(&files, &CancellationToken::new()).await })
            })
            .collect();
        let mut total = 0;
        for run in runs {
            let report = run.await.unwrap().unwrap();
            assert_eq!(report.files_failed(), 0);
            total += report.chunks_indexed;
        }

        assert_eq!(ix.store().len(), total);
        let restored = VectorStore::open(&index_path, DIM).await.unwrap();
        assert_eq!(restored.len(), total);
    }

    #[tokio::test]
    async fn index_repository_walks_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "repo/main.py", "print('hi')\n");
        write(dir.path(), "repo/README.md", "# readme\n");
        write(dir.path(), "repo/image.png", "not really\n");
        let ix = indexer(MockProvider::with_dimension(DIM), &dir.path().join("i"), 500);

        let report = ix
            .index_repository(&dir.path().join("repo"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.files_attempted, 2);
        assert_eq!(report.files_indexed, 2);
    }
}
