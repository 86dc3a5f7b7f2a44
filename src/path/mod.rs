//! Roots: containers of identified entries.
//!
//! A root abstracts over a directory, a zip archive or a virtual
//! in-memory container. It owns its entries and exposes lookup,
//! enumeration, creation and persistence. Source roots are writable and
//! user-edited; binary roots hold compiler outputs or external
//! libraries.

mod archive;
mod dir;
mod entry;
mod filter;
mod ident;
mod mem;

pub use archive::ArchiveRoot;
pub use dir::DirRoot;
pub use entry::{Backing, Entry};
pub use filter::{Filter, FilterError};
pub use ident::{Ident, IdentError};
pub use mem::MemRoot;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::content::{ContentKind, DecodeError};

/// Errors from root and entry storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive error on `{path}`")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("root `{0}` is read-only")]
    ReadOnly(String),

    #[error("entry `{id}` is not a compiled unit")]
    NotCompiled { id: Ident },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A container of entries, keyed by identifier and content kind.
///
/// Identifier/kind pairs are unique within a root. Enumeration order is
/// unspecified but stable between refreshes.
pub trait Root: Send + Sync {
    /// Human-readable location for logs.
    fn location(&self) -> String;

    /// Whether the builder may create or remove entries here.
    fn writable(&self) -> bool;

    fn exists(&self, id: &Ident, kind: ContentKind) -> bool {
        self.get(id, kind).is_some()
    }

    fn get(&self, id: &Ident, kind: ContentKind) -> Option<&Entry>;

    /// All entries of the given kind matching the filter.
    fn select(&self, filter: &Filter, kind: ContentKind) -> Vec<&Entry>;

    /// Matching identifiers only. Never forces a payload read or decode;
    /// used for fast existence scans.
    fn match_ids(&self, filter: &Filter, kind: ContentKind) -> Vec<Ident>;

    /// Create or overwrite an entry with the given payload. The entry is
    /// dirty until [`flush`](Self::flush).
    fn create(&mut self, id: Ident, kind: ContentKind, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Remove an entry and its backing file. Returns whether it existed.
    fn remove(&mut self, id: &Ident, kind: ContentKind) -> Result<bool, StoreError>;

    /// Persist pending writes. Atomic per entry: on failure the old
    /// bytes remain.
    fn flush(&self) -> Result<(), StoreError>;

    /// Re-synchronize with the backing storage: re-enumerate, drop stale
    /// entries, reset caches. Fails softly - a missing underlying
    /// location leaves the root empty rather than raising.
    fn refresh(&mut self);

    /// Map an absolute path under this root to an identifier and its
    /// suffix-proposed kind. `None` when the path is not covered.
    fn identify(&self, _path: &Path) -> Option<(Ident, ContentKind)> {
        None
    }

    /// Whether a filesystem path belongs to this root's backing storage.
    fn covers(&self, _path: &Path) -> bool {
        false
    }
}
