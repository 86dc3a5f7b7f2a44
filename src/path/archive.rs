//! Read-only roots over zip archives (external libraries).

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::content::{ContentKind, ContentRegistry};
use crate::log;

use super::entry::{Backing, Entry};
use super::filter::Filter;
use super::ident::Ident;
use super::{Root, StoreError};

/// A root over a zip archive, read-only.
///
/// External libraries are assumed to hold already-compiled units; every
/// member is still classified through the registry, so a member with a
/// corrupt header degrades to opaque data instead of posing as a build
/// output. A missing or unreadable archive leaves the root empty - a
/// stale dependency degrades the namespace, it does not crash the build.
pub struct ArchiveRoot {
    archive: PathBuf,
    registry: Arc<ContentRegistry>,
    entries: BTreeMap<(Ident, ContentKind), Entry>,
}

impl ArchiveRoot {
    pub fn open(archive: PathBuf, registry: Arc<ContentRegistry>) -> Self {
        let mut root = Self {
            archive,
            registry,
            entries: BTreeMap::new(),
        };
        root.refresh();
        root
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    fn enumerate(&mut self) -> Result<(), StoreError> {
        let file = fs::File::open(&self.archive).map_err(|source| StoreError::Io {
            path: self.archive.clone(),
            source,
        })?;
        let mut zip = zip::ZipArchive::new(file).map_err(|source| StoreError::Archive {
            path: self.archive.clone(),
            source,
        })?;

        for index in 0..zip.len() {
            let mut member = zip.by_index(index).map_err(|source| StoreError::Archive {
                path: self.archive.clone(),
                source,
            })?;
            if !member.is_file() {
                continue;
            }
            let name = member.name().to_string();
            let rel = Path::new(&name);
            let Some(id) = Ident::from_rel_path(rel) else {
                continue;
            };
            let suffix = rel.extension().and_then(|e| e.to_str()).unwrap_or("");

            let mut bytes = Vec::with_capacity(member.size() as usize);
            if member.read_to_end(&mut bytes).is_err() {
                continue;
            }
            let payload = Arc::new(bytes);
            let (kind, unit) = self.registry.classify(suffix, &payload);

            let entry = Entry::new(
                id.clone(),
                kind,
                Backing::ArchiveMember {
                    archive: self.archive.clone(),
                    member: name,
                },
            );
            entry.seed(payload, unit);
            self.entries.insert((id, kind), entry);
        }
        Ok(())
    }
}

impl Root for ArchiveRoot {
    fn location(&self) -> String {
        self.archive.display().to_string()
    }

    fn writable(&self) -> bool {
        false
    }

    fn get(&self, id: &Ident, kind: ContentKind) -> Option<&Entry> {
        self.entries.get(&(id.clone(), kind))
    }

    fn select(&self, filter: &Filter, kind: ContentKind) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|((id, k), _)| *k == kind && filter.matches(id))
            .map(|(_, entry)| entry)
            .collect()
    }

    fn match_ids(&self, filter: &Filter, kind: ContentKind) -> Vec<Ident> {
        self.entries
            .keys()
            .filter(|(id, k)| *k == kind && filter.matches(id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn create(&mut self, _id: Ident, _kind: ContentKind, _bytes: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly(self.location()))
    }

    fn remove(&mut self, _id: &Ident, _kind: ContentKind) -> Result<bool, StoreError> {
        Err(StoreError::ReadOnly(self.location()))
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn refresh(&mut self) {
        self.entries.clear();
        if let Err(e) = self.enumerate() {
            self.entries.clear();
            log!("root"; "library {} unavailable: {e}", self.archive.display());
        }
    }

    fn covers(&self, path: &Path) -> bool {
        path == self.archive
    }
}
