//! Directory-backed roots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::content::{ContentKind, ContentRegistry};
use crate::debug;

use super::entry::{Backing, Entry};
use super::filter::Filter;
use super::ident::Ident;
use super::{Root, StoreError};

/// A root over a filesystem directory.
///
/// Source roots are writable (user-edited); output roots are writable
/// (builder-written); both enumerate on refresh and classify every file
/// through the content registry.
pub struct DirRoot {
    dir: PathBuf,
    registry: Arc<ContentRegistry>,
    writable: bool,
    entries: BTreeMap<(Ident, ContentKind), Entry>,
}

impl DirRoot {
    /// Create and populate from the directory contents. A missing
    /// directory yields an empty root.
    pub fn open(dir: PathBuf, registry: Arc<ContentRegistry>, writable: bool) -> Self {
        let mut root = Self {
            dir,
            registry,
            writable,
            entries: BTreeMap::new(),
        };
        root.refresh();
        root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: &Ident, kind: ContentKind) -> PathBuf {
        self.dir.join(id.to_rel_path(self.registry.suffix_for(kind)))
    }

    /// Classify one file and install its entry, seeding caches when the
    /// classification already read the payload.
    fn install(&mut self, abs: &Path, rel: &Path) {
        let Some(id) = Ident::from_rel_path(rel) else {
            return;
        };
        let suffix = rel.extension().and_then(|e| e.to_str()).unwrap_or("");
        let kind = self.registry.kind_of_suffix(suffix);

        let entry = if kind == ContentKind::Compiled {
            // Verify the header before trusting the suffix.
            let Ok(bytes) = fs::read(abs) else {
                return;
            };
            let payload = Arc::new(bytes);
            let (kind, unit) = self.registry.classify(suffix, &payload);
            let entry = Entry::new(id.clone(), kind, Backing::Disk(abs.to_path_buf()));
            entry.seed(payload, unit);
            entry
        } else {
            Entry::new(id.clone(), kind, Backing::Disk(abs.to_path_buf()))
        };
        self.entries.insert((id, entry.kind()), entry);
    }
}

impl Root for DirRoot {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn writable(&self) -> bool {
        self.writable
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

    fn create(&mut self, id: Ident, kind: ContentKind, bytes: Vec<u8>) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(self.location()));
        }
        if let Some(existing) = self.entries.get(&(id.clone(), kind)) {
            existing.write(bytes);
            return Ok(());
        }
        let path = self.entry_path(&id, kind);
        let entry = Entry::new(id.clone(), kind, Backing::Disk(path));
        entry.write(bytes);
        self.entries.insert((id, kind), entry);
        Ok(())
    }

    fn remove(&mut self, id: &Ident, kind: ContentKind) -> Result<bool, StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnly(self.location()));
        }
        let Some(entry) = self.entries.remove(&(id.clone(), kind)) else {
            return Ok(false);
        };
        if let Some(path) = entry.disk_path()
            && path.exists()
        {
            fs::remove_file(path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(true)
    }

    fn flush(&self) -> Result<(), StoreError> {
        let dirty: Vec<&Entry> = self.entries.values().filter(|e| e.is_dirty()).collect();
        dirty.par_iter().try_for_each(|entry| entry.flush())
    }

    fn refresh(&mut self) {
        self.entries.clear();
        if !self.dir.is_dir() {
            debug!("root"; "missing directory {}, root left empty", self.dir.display());
            return;
        }

        let files: Vec<PathBuf> = jwalk::WalkDir::new(&self.dir)
            .sort(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path())
            .collect();

        for abs in files {
            // Leftover temp files from an interrupted flush are not entries.
            if abs.to_string_lossy().ends_with(".tmp~") {
                continue;
            }
            if let Ok(rel) = abs.strip_prefix(&self.dir) {
                let rel = rel.to_path_buf();
                self.install(&abs, &rel);
            }
        }
    }

    fn identify(&self, path: &Path) -> Option<(Ident, ContentKind)> {
        let rel = path.strip_prefix(&self.dir).ok()?;
        let id = Ident::from_rel_path(rel)?;
        let suffix = rel.extension().and_then(|e| e.to_str()).unwrap_or("");
        Some((id, self.registry.kind_of_suffix(suffix)))
    }

    fn covers(&self, path: &Path) -> bool {
        path.starts_with(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CompiledUnit;

    fn registry() -> Arc<ContentRegistry> {
        Arc::new(ContentRegistry::default())
    }

    fn id(text: &str) -> Ident {
        Ident::parse(text).unwrap()
    }

    #[test]
    fn test_open_missing_dir_is_empty() {
        let root = DirRoot::open(PathBuf::from("/nonexistent/kiln-test"), registry(), true);
        assert!(root.match_ids(&Filter::all(), ContentKind::Source).is_empty());
    }

    #[test]
    fn test_enumerates_and_classifies() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/main.src"), "source").unwrap();
        fs::write(dir.path().join("notes.txt"), "opaque").unwrap();
        fs::write(
            dir.path().join("pkg/main.bin"),
            CompiledUnit::new(b"body".to_vec()).encode(),
        )
        .unwrap();

        let root = DirRoot::open(dir.path().to_path_buf(), registry(), true);

        assert!(root.exists(&id("pkg/main"), ContentKind::Source));
        assert!(root.exists(&id("pkg/main"), ContentKind::Compiled));
        assert!(root.exists(&id("notes"), ContentKind::Opaque));

        // The verifying decode seeded the cache; the decoded body is there.
        let compiled = root.get(&id("pkg/main"), ContentKind::Compiled).unwrap();
        assert_eq!(compiled.decoded().unwrap().body(), b"body");
    }

    #[test]
    fn test_corrupt_compiled_file_is_opaque() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.bin"), "not a container").unwrap();

        let root = DirRoot::open(dir.path().to_path_buf(), registry(), true);
        assert!(!root.exists(&id("broken"), ContentKind::Compiled));
        assert!(root.exists(&id("broken"), ContentKind::Opaque));
    }

    #[test]
    fn test_create_flush_refresh_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = DirRoot::open(dir.path().to_path_buf(), registry(), true);

        let body = CompiledUnit::new(b"unit".to_vec()).encode();
        root.create(id("pkg/out"), ContentKind::Compiled, body.clone())
            .unwrap();
        root.flush().unwrap();
        assert_eq!(fs::read(dir.path().join("pkg/out.bin")).unwrap(), body);

        root.refresh();
        assert!(root.exists(&id("pkg/out"), ContentKind::Compiled));
    }

    #[test]
    fn test_remove_deletes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.src"), "x").unwrap();
        let mut root = DirRoot::open(dir.path().to_path_buf(), registry(), true);

        assert!(root.remove(&id("a"), ContentKind::Source).unwrap());
        assert!(!dir.path().join("a.src").exists());
        assert!(!root.remove(&id("a"), ContentKind::Source).unwrap());
    }

    #[test]
    fn test_read_only_root_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = DirRoot::open(dir.path().to_path_buf(), registry(), false);
        assert!(matches!(
            root.create(id("x"), ContentKind::Compiled, vec![]),
            Err(StoreError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_identify_maps_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = DirRoot::open(dir.path().to_path_buf(), registry(), true);

        let (ident, kind) = root.identify(&dir.path().join("pkg/main.src")).unwrap();
        assert_eq!(ident, id("pkg/main"));
        assert_eq!(kind, ContentKind::Source);

        assert!(root.identify(Path::new("/elsewhere/main.src")).is_none());
    }

    #[test]
    fn test_select_is_filtered_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/a.src"), "").unwrap();
        fs::write(dir.path().join("pkg/b.src"), "").unwrap();
        fs::write(dir.path().join("other.src"), "").unwrap();

        let root = DirRoot::open(dir.path().to_path_buf(), registry(), true);
        let filter = Filter::parse("pkg/**").unwrap();
        let selected = root.select(&filter, ContentKind::Source);
        let ids: Vec<String> = selected.iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["pkg/a", "pkg/b"]);
    }
}
