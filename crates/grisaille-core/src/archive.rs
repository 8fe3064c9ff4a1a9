//! Archive assembly: bundle stored outputs into one `.tar.gz`.
//!
//! Every requested name is checked against the store before anything is
//! written. Entries are then streamed one at a time from the store into a
//! staged container file, so memory use stays around one copy buffer no matter
//! how many images are bundled. On any failure the staged file is removed and
//! no archive is returned.

use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::Config;
use crate::error::{ArchiveError, StoreError};
use crate::store::ContentStore;
use crate::types::{ArchiveRequest, ArchiveSummary};

/// File extension of produced archives.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Builds compressed archives from content store entries.
pub struct ArchiveAssembler {
    store: Arc<dyn ContentStore>,
    staging_dir: PathBuf,
    compression: Compression,
}

impl ArchiveAssembler {
    /// Create an assembler reading from `store` and staging under `staging_dir`.
    pub fn new(store: Arc<dyn ContentStore>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            staging_dir: staging_dir.into(),
            compression: Compression::default(),
        }
    }

    /// Create an assembler using the archive settings from `config`.
    pub fn from_config(store: Arc<dyn ContentStore>, config: &Config) -> Self {
        Self::new(store, config.archive_dir())
            .with_compression_level(config.archive.compression_level)
    }

    /// Gzip level, clamped to 0..=9.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Build the archive and return its bytes.
    ///
    /// Fails with [`ArchiveError::MissingEntry`] if any requested name is not
    /// in the store; in that case nothing is produced.
    pub fn build_archive(&self, request: &ArchiveRequest) -> Result<Vec<u8>, ArchiveError> {
        self.check_entries(request)?;

        std::fs::create_dir_all(&self.staging_dir)?;
        // Removed on drop, including on every error path below.
        let mut staged = tempfile::Builder::new()
            .prefix("processed_images_")
            .suffix(&format!(".{ARCHIVE_EXTENSION}"))
            .tempfile_in(&self.staging_dir)?;

        let summary = self.assemble(request, BufWriter::new(staged.as_file_mut()))?;

        let file = staged.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::with_capacity(summary.archive_bytes as usize);
        file.read_to_end(&mut bytes)?;

        tracing::info!(
            entries = summary.entries,
            size_bytes = summary.archive_bytes,
            "Archive built"
        );
        Ok(bytes)
    }

    /// Build the archive directly into `dest`.
    ///
    /// The archive is staged next to `dest` and only moved into place once it
    /// is complete; on failure `dest` is left untouched.
    pub fn export_archive(
        &self,
        request: &ArchiveRequest,
        dest: &Path,
    ) -> Result<ArchiveSummary, ArchiveError> {
        self.check_entries(request)?;

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut staged = tempfile::Builder::new()
            .prefix(".processed_images_")
            .tempfile_in(&dir)?;

        let summary = self.assemble(request, BufWriter::new(staged.as_file_mut()))?;
        staged.persist(dest).map_err(|e| ArchiveError::Io(e.error))?;

        tracing::info!(
            entries = summary.entries,
            size_bytes = summary.archive_bytes,
            "Archive written to {:?}",
            dest
        );
        Ok(summary)
    }

    /// Fail on the first (sorted) name that has no stored image.
    fn check_entries(&self, request: &ArchiveRequest) -> Result<(), ArchiveError> {
        match request.output_names().find(|name| !self.store.exists(name)) {
            Some(name) => {
                tracing::warn!("Archive request names missing output {:?}", name);
                Err(ArchiveError::MissingEntry {
                    name: name.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// Stream every requested entry into a gzip-compressed tar written to `sink`.
    fn assemble<W: Write>(
        &self,
        request: &ArchiveRequest,
        sink: W,
    ) -> Result<ArchiveSummary, ArchiveError> {
        let counted = CountingWriter::new(sink);
        let mut builder = tar::Builder::new(GzEncoder::new(counted, self.compression));
        let mut uncompressed_bytes = 0u64;

        for name in request.output_names() {
            let entry = self.store.open(name).map_err(|e| match e {
                // Removed between the existence check and now.
                StoreError::NotFound(_) => ArchiveError::MissingEntry {
                    name: name.to_string(),
                },
                other => ArchiveError::Store(other),
            })?;

            let mut header = tar::Header::new_gnu();
            header.set_size(entry.size);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_entry_type(tar::EntryType::Regular);
            builder.append_data(&mut header, name, entry.reader)?;

            tracing::trace!("  archived {:?} ({} bytes)", name, entry.size);
            uncompressed_bytes += entry.size;
        }

        let counted = builder.into_inner()?.finish()?;
        let archive_bytes = counted.written;
        let mut sink = counted.inner;
        sink.flush()?;

        Ok(ArchiveSummary {
            entries: request.len(),
            uncompressed_bytes,
            archive_bytes,
        })
    }
}

/// Tracks how many bytes reach the underlying writer.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Read an archive back into `(name, bytes)` pairs in entry order.
pub fn read_entries<R: Read>(archive: R) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(archive));
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        entries.push((name, bytes));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryContentStore, StoredEntry};

    fn store_with(entries: &[(&str, &str)]) -> Arc<MemoryContentStore> {
        let store = Arc::new(MemoryContentStore::new());
        for (name, contents) in entries {
            store.write(name, contents.as_bytes()).unwrap();
        }
        store
    }

    fn staging_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    /// Reports every entry as present, but opening `broken` fails.
    struct BrokenEntryStore {
        inner: MemoryContentStore,
        broken: &'static str,
        vanished: bool,
    }

    impl BrokenEntryStore {
        fn new(broken: &'static str, vanished: bool) -> Arc<Self> {
            let inner = MemoryContentStore::new();
            for name in ["a.png", "b.png", "c.png"] {
                inner.write(name, name.as_bytes()).unwrap();
            }
            Arc::new(Self {
                inner,
                broken,
                vanished,
            })
        }
    }

    impl ContentStore for BrokenEntryStore {
        fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
            self.inner.write(key, bytes)
        }

        fn exists(&self, key: &str) -> bool {
            self.inner.exists(key)
        }

        fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.inner.read(key)
        }

        fn open(&self, key: &str) -> Result<StoredEntry, StoreError> {
            if key != self.broken {
                return self.inner.open(key);
            }
            if self.vanished {
                Err(StoreError::NotFound(key.to_string()))
            } else {
                Err(StoreError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("disk on fire"),
                })
            }
        }
    }

    #[test]
    fn test_roundtrip_sorted_and_deduplicated() {
        let store = store_with(&[("b.png", "bbbb"), ("a.png", "aa"), ("c.png", "c")]);
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(store, dir.path());

        let request = ArchiveRequest::new(["b.png", "a.png", "b.png"]);
        let bytes = assembler.build_archive(&request).unwrap();
        let entries = read_entries(bytes.as_slice()).unwrap();

        assert_eq!(
            entries,
            vec![
                ("a.png".to_string(), b"aa".to_vec()),
                ("b.png".to_string(), b"bbbb".to_vec()),
            ]
        );
        assert_eq!(staging_files(dir.path()), 0, "staged archive is removed");
    }

    #[test]
    fn test_missing_entry_aborts() {
        let store = store_with(&[("a.png", "aa")]);
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(store, dir.path());

        let err = assembler
            .build_archive(&ArchiveRequest::new(["a.png", "nope.png", "zzz.png"]))
            .unwrap_err();
        match err {
            ArchiveError::MissingEntry { name } => assert_eq!(name, "nope.png"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[test]
    fn test_entry_removed_after_check_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(BrokenEntryStore::new("b.png", true), dir.path());

        let err = assembler
            .build_archive(&ArchiveRequest::new(["a.png", "b.png", "c.png"]))
            .unwrap_err();
        match err {
            ArchiveError::MissingEntry { name } => assert_eq!(name, "b.png"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[test]
    fn test_store_failure_mid_assembly_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(BrokenEntryStore::new("b.png", false), dir.path());

        let err = assembler
            .build_archive(&ArchiveRequest::new(["a.png", "b.png", "c.png"]))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Store(StoreError::Io { .. })));
        assert_eq!(staging_files(dir.path()), 0);

        let dest = dir.path().join("out").join("bundle.tar.gz");
        assert!(assembler
            .export_archive(&ArchiveRequest::new(["a.png", "b.png"]), &dest)
            .is_err());
        assert!(!dest.exists());
        assert_eq!(staging_files(dest.parent().unwrap()), 0);
    }

    #[test]
    fn test_empty_request_gives_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(Arc::new(MemoryContentStore::new()), dir.path());
        let bytes = assembler.build_archive(&ArchiveRequest::default()).unwrap();
        assert!(!bytes.is_empty());
        assert!(read_entries(bytes.as_slice()).unwrap().is_empty());
    }

    #[test]
    fn test_identical_requests_give_identical_archives() {
        let store = store_with(&[("x.png", "xyz"), ("y.png", "yyy")]);
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(store, dir.path()).with_compression_level(9);

        let first = assembler
            .build_archive(&ArchiveRequest::new(["y.png", "x.png"]))
            .unwrap();
        let second = assembler
            .build_archive(&ArchiveRequest::new(["x.png", "y.png"]))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_long_entry_names_survive() {
        let long = format!("{}.png", "n".repeat(150));
        let store = store_with(&[(long.as_str(), "data")]);
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(store, dir.path());

        let bytes = assembler
            .build_archive(&ArchiveRequest::new([long.clone()]))
            .unwrap();
        let entries = read_entries(bytes.as_slice()).unwrap();
        assert_eq!(entries[0].0, long);
    }

    #[test]
    fn test_export_archive_persists_only_on_success() {
        let store = store_with(&[("a.png", "aa"), ("b.png", "bb")]);
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(store, dir.path().join("staging"));
        let dest = dir.path().join("out").join("bundle.tar.gz");

        let failed = assembler.export_archive(&ArchiveRequest::new(["a.png", "c.png"]), &dest);
        assert!(matches!(failed, Err(ArchiveError::MissingEntry { .. })));
        assert!(!dest.exists());

        let summary = assembler
            .export_archive(&ArchiveRequest::new(["a.png", "b.png"]), &dest)
            .unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.uncompressed_bytes, 4);
        assert_eq!(summary.archive_bytes, std::fs::metadata(&dest).unwrap().len());

        let entries = read_entries(std::fs::File::open(&dest).unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(staging_files(dest.parent().unwrap()), 1);
    }
}
