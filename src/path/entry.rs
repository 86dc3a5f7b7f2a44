//! Entries: identified payloads owned by a root.
//!
//! An entry pairs an identifier and a content kind with a backing
//! location. The payload is read lazily and memoized; compiled entries
//! additionally memoize their decoded unit. Writing resets both caches
//! and marks the entry dirty until the owning root flushes it.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::content::{CompiledUnit, ContentKind};

use super::StoreError;
use super::ident::Ident;

/// Where an entry's bytes live.
#[derive(Debug, Clone)]
pub enum Backing {
    /// A file on disk.
    Disk(PathBuf),
    /// A member of a zip archive.
    ArchiveMember { archive: PathBuf, member: String },
    /// In-memory only; flush is a no-op.
    Memory,
}

#[derive(Default)]
struct EntryState {
    payload: Option<Arc<Vec<u8>>>,
    decoded: Option<Arc<CompiledUnit>>,
    dirty: bool,
}

/// An identified unit of content within a root.
pub struct Entry {
    id: Ident,
    kind: ContentKind,
    backing: Backing,
    state: RwLock<EntryState>,
}

impl Entry {
    pub fn new(id: Ident, kind: ContentKind, backing: Backing) -> Self {
        Self {
            id,
            kind,
            backing,
            state: RwLock::new(EntryState::default()),
        }
    }

    pub fn id(&self) -> &Ident {
        &self.id
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// The on-disk location, if the entry is file-backed.
    pub fn disk_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Disk(path) => Some(path),
            _ => None,
        }
    }

    /// Human-readable location for logs.
    pub fn location(&self) -> String {
        match &self.backing {
            Backing::Disk(path) => path.display().to_string(),
            Backing::ArchiveMember { archive, member } => {
                format!("{}!{member}", archive.display())
            }
            Backing::Memory => format!("<memory:{}>", self.id),
        }
    }

    /// Read the payload, loading from the backing on first access.
    pub fn read(&self) -> Result<Arc<Vec<u8>>, StoreError> {
        if let Some(payload) = &self.state.read().payload {
            return Ok(Arc::clone(payload));
        }
        let bytes = self.load()?;
        let payload = Arc::new(bytes);
        let mut state = self.state.write();
        // A concurrent reader may have loaded first; keep whichever won.
        if state.payload.is_none() {
            state.payload = Some(Arc::clone(&payload));
        }
        Ok(state.payload.as_ref().map(Arc::clone).unwrap_or(payload))
    }

    fn load(&self) -> Result<Vec<u8>, StoreError> {
        match &self.backing {
            Backing::Disk(path) => fs::read(path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            }),
            Backing::ArchiveMember { archive, member } => {
                let file = fs::File::open(archive).map_err(|source| StoreError::Io {
                    path: archive.clone(),
                    source,
                })?;
                let mut zip =
                    zip::ZipArchive::new(file).map_err(|source| StoreError::Archive {
                        path: archive.clone(),
                        source,
                    })?;
                let mut entry = zip.by_name(member).map_err(|source| StoreError::Archive {
                    path: archive.clone(),
                    source,
                })?;
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|source| StoreError::Io {
                        path: archive.clone(),
                        source,
                    })?;
                Ok(bytes)
            }
            Backing::Memory => Ok(Vec::new()),
        }
    }

    /// Decode the payload as a compiled unit, memoizing the result.
    pub fn decoded(&self) -> Result<Arc<CompiledUnit>, StoreError> {
        if self.kind != ContentKind::Compiled {
            return Err(StoreError::NotCompiled {
                id: self.id.clone(),
            });
        }
        if let Some(decoded) = &self.state.read().decoded {
            return Ok(Arc::clone(decoded));
        }
        let payload = self.read()?;
        let unit = Arc::new(CompiledUnit::decode(&payload)?);
        self.state.write().decoded = Some(Arc::clone(&unit));
        Ok(unit)
    }

    /// Replace the payload; caches reset, entry becomes dirty.
    pub fn write(&self, bytes: Vec<u8>) {
        let mut state = self.state.write();
        state.payload = Some(Arc::new(bytes));
        state.decoded = None;
        state.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Drop memoized payload and decoded value (on refresh).
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.payload = None;
        state.decoded = None;
    }

    /// Seed caches from bytes already in hand (classification side
    /// effect: a verified decode should not force a re-read later).
    pub(crate) fn seed(&self, payload: Arc<Vec<u8>>, decoded: Option<CompiledUnit>) {
        let mut state = self.state.write();
        state.payload = Some(payload);
        state.decoded = decoded.map(Arc::new);
    }

    /// Persist a dirty entry to its backing. Atomic for disk backings:
    /// bytes land in a temp file first, then rename over the target.
    pub fn flush(&self) -> Result<(), StoreError> {
        let payload = {
            let state = self.state.read();
            if !state.dirty {
                return Ok(());
            }
            state.payload.as_ref().map(Arc::clone)
        };
        let Some(payload) = payload else {
            return Ok(());
        };
        match &self.backing {
            Backing::Disk(path) => {
                write_atomic(path, &payload)?;
            }
            Backing::Memory => {}
            Backing::ArchiveMember { archive, .. } => {
                return Err(StoreError::ReadOnly(archive.display().to_string()));
            }
        }
        self.state.write().dirty = false;
        Ok(())
    }
}

/// Write via temp file + rename so a failed write leaves the old bytes.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp~");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        io_err(source)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> Ident {
        Ident::parse(text).unwrap()
    }

    #[test]
    fn test_memory_entry_write_read() {
        let entry = Entry::new(id("pkg/main"), ContentKind::Source, Backing::Memory);
        entry.write(b"source text".to_vec());
        assert!(entry.is_dirty());
        assert_eq!(entry.read().unwrap().as_slice(), b"source text");
        entry.flush().unwrap();
        assert!(!entry.is_dirty());
    }

    #[test]
    fn test_disk_entry_lazy_read_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg").join("main.src");
        let entry = Entry::new(id("pkg/main"), ContentKind::Source, Backing::Disk(path.clone()));

        entry.write(b"v1".to_vec());
        entry.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v1");

        // Cache is served without touching disk again.
        fs::write(&path, b"behind-the-back").unwrap();
        assert_eq!(entry.read().unwrap().as_slice(), b"v1");

        // Invalidation re-reads from the backing.
        entry.invalidate();
        assert_eq!(entry.read().unwrap().as_slice(), b"behind-the-back");
    }

    #[test]
    fn test_decoded_memoizes_unit() {
        let entry = Entry::new(id("pkg/main"), ContentKind::Compiled, Backing::Memory);
        entry.write(CompiledUnit::new(b"body".to_vec()).encode());
        let first = entry.decoded().unwrap();
        let second = entry.decoded().unwrap();
        assert_eq!(first.body(), b"body");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_decoded_rejects_source_kind() {
        let entry = Entry::new(id("pkg/main"), ContentKind::Source, Backing::Memory);
        entry.write(b"text".to_vec());
        assert!(matches!(
            entry.decoded(),
            Err(StoreError::NotCompiled { .. })
        ));
    }

    #[test]
    fn test_write_resets_decoded_cache() {
        let entry = Entry::new(id("pkg/main"), ContentKind::Compiled, Backing::Memory);
        entry.write(CompiledUnit::new(b"one".to_vec()).encode());
        assert_eq!(entry.decoded().unwrap().body(), b"one");
        entry.write(CompiledUnit::new(b"two".to_vec()).encode());
        assert_eq!(entry.decoded().unwrap().body(), b"two");
    }
}
