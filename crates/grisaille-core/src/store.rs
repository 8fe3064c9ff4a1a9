//! Content store: processed image bytes keyed by output name.
//!
//! Two implementations are provided: [`FsContentStore`] keeps one file per key
//! under a root directory, [`MemoryContentStore`] keeps everything in a map.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::StoreError;

/// A stored entry opened for streaming.
pub struct StoredEntry {
    /// Length of the stored bytes
    pub size: u64,
    /// Reader over the stored bytes
    pub reader: Box<dyn Read + Send>,
}

/// Persistence layer shared by the batch processor (writer) and the archive
/// assembler (reader). Implementations must tolerate concurrent writes to
/// distinct keys.
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn exists(&self, key: &str) -> bool;

    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Open `key` for streaming without loading it into memory.
    fn open(&self, key: &str) -> Result<StoredEntry, StoreError>;
}

/// Reject keys that are not a single, plain path component.
pub fn check_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Filesystem-backed store: one file per key directly under `root`.
///
/// Writes go through a temporary file in the same directory and are renamed
/// into place, so readers never observe a half-written image.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn io_error(key: &str, source: std::io::Error) -> StoreError {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(key.to_string())
        } else {
            StoreError::Io {
                key: key.to_string(),
                source,
            }
        }
    }
}

impl ContentStore for FsContentStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io = |source: std::io::Error| StoreError::Io {
            key: key.to_string(),
            source,
        };

        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.root)
            .map_err(io)?;
        staged.write_all(bytes).map_err(io)?;
        staged.as_file().sync_all().map_err(io)?;
        staged.persist(&path).map_err(|e| io(e.error))?;
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|e| Self::io_error(key, e))
    }

    fn open(&self, key: &str) -> Result<StoredEntry, StoreError> {
        let path = self.path_for(key)?;
        let file = File::open(&path).map_err(|e| Self::io_error(key, e))?;
        let size = file.metadata().map_err(|e| Self::io_error(key, e))?.len();
        Ok(StoredEntry {
            size,
            reader: Box::new(file),
        })
    }
}

/// In-memory store for library callers that manage persistence themselves, and tests.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

impl ContentStore for MemoryContentStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        check_key(key)?;
        let mut entries = self.entries.write().map_err(|_| StoreError::Io {
            key: key.to_string(),
            source: std::io::Error::other("store lock poisoned"),
        })?;
        entries.insert(key.to_string(), Arc::new(bytes.to_vec()));
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get(key)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn open(&self, key: &str) -> Result<StoredEntry, StoreError> {
        let bytes = self
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(StoredEntry {
            size: bytes.len() as u64,
            reader: Box::new(Cursor::new(SharedBytes(bytes))),
        })
    }
}

/// Lets a cursor read from stored bytes without copying them.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(store: &dyn ContentStore) {
        assert!(!store.exists("a.png"));
        store.write("a.png", b"first").unwrap();
        assert!(store.exists("a.png"));
        assert_eq!(store.read("a.png").unwrap(), b"first");

        // Last write wins
        store.write("a.png", b"second").unwrap();
        assert_eq!(store.read("a.png").unwrap(), b"second");

        let mut entry = store.open("a.png").unwrap();
        assert_eq!(entry.size, 6);
        let mut buf = Vec::new();
        entry.reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"second");

        assert!(matches!(
            store.read("missing.png"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.open("missing.png"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_check_key() {
        assert!(check_key("photo 1.jpg").is_ok());
        assert!(check_key("..hidden.png").is_ok());
        for bad in ["", ".", "..", "a/b.png", "../x", "a\\b", "nul\0byte"] {
            assert!(check_key(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryContentStore::new();
        roundtrip(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("images")).unwrap();
        roundtrip(&store);

        // No staging files are left behind
        let names: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.png".to_string()]);
    }

    #[test]
    fn test_fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.write("../escape.png", b"x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(!store.exists("../escape.png"));
        assert!(!dir.path().parent().unwrap().join("escape.png").exists());
    }
}
