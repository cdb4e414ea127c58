//! Storage backends offering compare-and-swap writes on opaque revisions

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use super::RevisionToken;
use crate::error::{ConflictError, PersistError, StorageError, StorageResult};

/// Raw stored content and the revision it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// `None` when nothing has been stored yet
    pub content: Option<Vec<u8>>,
    pub token: RevisionToken,
}

/// Where the history document lives
///
/// `write` must be all-or-nothing and must fail with a conflict when the
/// stored revision no longer equals `expected`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable location for logs
    fn describe(&self) -> String;

    async fn read(&self) -> StorageResult<Snapshot>;

    async fn write(
        &self,
        content: Vec<u8>,
        expected: &RevisionToken,
    ) -> Result<RevisionToken, PersistError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    content: Option<Vec<u8>>,
    version: u64,
}

impl MemoryState {
    fn token(&self) -> RevisionToken {
        if self.content.is_none() {
            RevisionToken::absent()
        } else {
            RevisionToken::new(format!("v{}", self.version))
        }
    }
}

/// In-process backend versioned by a counter
///
/// Clones share the same storage, which lets tests run several pipelines
/// against one document.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<Vec<u8>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                content: Some(content.into()),
                version: 1,
            })),
        }
    }

    /// Current stored bytes (for assertions)
    pub fn content(&self) -> Option<Vec<u8>> {
        self.state.lock().content.clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn read(&self) -> StorageResult<Snapshot> {
        let state = self.state.lock();
        Ok(Snapshot {
            content: state.content.clone(),
            token: state.token(),
        })
    }

    async fn write(
        &self,
        content: Vec<u8>,
        expected: &RevisionToken,
    ) -> Result<RevisionToken, PersistError> {
        let mut state = self.state.lock();
        let actual = state.token();
        if &actual != expected {
            return Err(ConflictError {
                expected: expected.clone(),
                actual,
            }
            .into());
        }
        state.content = Some(content);
        state.version += 1;
        Ok(state.token())
    }
}

/// A file on local disk (typically a checkout of the hosting branch)
///
/// The revision is the SHA-256 of the file content. Writers serialize on an
/// exclusive lock of a `<file>.lock` sidecar, re-check the revision under the
/// lock and replace the file through a rename, so readers never observe a
/// partially written document.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn read_blocking(path: &Path) -> StorageResult<Snapshot> {
        match std::fs::read(path) {
            Ok(content) => Ok(Snapshot {
                token: RevisionToken::of_content(&content),
                content: Some(content),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Snapshot {
                content: None,
                token: RevisionToken::absent(),
            }),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn write_blocking(
        path: &Path,
        content: &[u8],
        expected: &RevisionToken,
    ) -> Result<RevisionToken, PersistError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let lock_path = Self::lock_path(path);
        let lock: File = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StorageError::io(&lock_path, e))?;
        lock.lock_exclusive().map_err(|source| StorageError::Lock {
            path: lock_path.clone(),
            source,
        })?;

        let result = (|| -> Result<RevisionToken, PersistError> {
            let actual = Self::read_blocking(path)?.token;
            if &actual != expected {
                return Err(PersistError::from(ConflictError {
                    expected: expected.clone(),
                    actual,
                }));
            }

            let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
            tmp.write_all(content)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| StorageError::io(tmp.path(), e))?;
            tmp.persist(path)
                .map_err(|e| StorageError::io(path, e.error))?;

            Ok(RevisionToken::of_content(content))
        })();

        let _ = lock.unlock();
        result
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> StorageResult<Snapshot> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path))
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?
    }

    async fn write(
        &self,
        content: Vec<u8>,
        expected: &RevisionToken,
    ) -> Result<RevisionToken, PersistError> {
        let path = self.path.clone();
        let expected = expected.clone();
        debug!(path = %path.display(), expected = %expected, "Writing history file");
        tokio::task::spawn_blocking(move || Self::write_blocking(&path, &content, &expected))
            .await
            .map_err(|e| PersistError::from(StorageError::Internal(e.to_string())))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_backend_compare_and_swap() {
        let backend = MemoryBackend::new();
        let snapshot = backend.read().await.unwrap();
        assert!(snapshot.content.is_none());
        assert_eq!(snapshot.token, RevisionToken::absent());

        let t1 = backend.write(b"one".to_vec(), &snapshot.token).await.unwrap();
        assert_ne!(t1, snapshot.token);

        let err = backend.write(b"two".to_vec(), &snapshot.token).await.unwrap_err();
        assert!(matches!(err, PersistError::Conflict(_)));
        assert_eq!(backend.content(), Some(b"one".to_vec()));

        backend.write(b"two".to_vec(), &t1).await.unwrap();
        assert_eq!(backend.content(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_file_backend_missing_file() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("data.js"));
        let snapshot = backend.read().await.unwrap();
        assert!(snapshot.content.is_none());
        assert!(snapshot.token.is_absent());
    }

    #[tokio::test]
    async fn test_file_backend_write_and_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev").join("bench").join("data.js");
        let backend = FileBackend::new(&path);

        let t1 = backend
            .write(b"first".to_vec(), &RevisionToken::absent())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
        assert_eq!(backend.read().await.unwrap().token, t1);

        let err = backend
            .write(b"stale".to_vec(), &RevisionToken::absent())
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Conflict(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        // Another writer edits the file out from under us
        std::fs::write(&path, b"external").unwrap();
        let err = backend.write(b"mine".to_vec(), &t1).await.unwrap_err();
        assert!(matches!(err, PersistError::Conflict(_)));
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            FileBackend::lock_path(Path::new("/tmp/dev/data.js")),
            PathBuf::from("/tmp/dev/data.js.lock")
        );
    }
}
