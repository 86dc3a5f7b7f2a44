//! In-memory virtual roots.

use std::collections::BTreeMap;

use crate::content::ContentKind;

use super::entry::{Backing, Entry};
use super::filter::Filter;
use super::ident::Ident;
use super::{Root, StoreError};

/// A virtual container with no backing storage.
///
/// Used for scratch outputs and test fixtures. Flush marks entries clean;
/// refresh keeps them, since there is nothing to re-synchronize with.
pub struct MemRoot {
    name: String,
    entries: BTreeMap<(Ident, ContentKind), Entry>,
}

impl MemRoot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }
}

impl Root for MemRoot {
    fn location(&self) -> String {
        format!("<{}>", self.name)
    }

    fn writable(&self) -> bool {
        true
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
        let entry = self
            .entries
            .entry((id.clone(), kind))
            .or_insert_with(|| Entry::new(id, kind, Backing::Memory));
        entry.write(bytes);
        Ok(())
    }

    fn remove(&mut self, id: &Ident, kind: ContentKind) -> Result<bool, StoreError> {
        Ok(self.entries.remove(&(id.clone(), kind)).is_some())
    }

    fn flush(&self) -> Result<(), StoreError> {
        for entry in self.entries.values() {
            entry.flush()?;
        }
        Ok(())
    }

    fn refresh(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> Ident {
        Ident::parse(text).unwrap()
    }

    #[test]
    fn test_create_get_remove() {
        let mut root = MemRoot::new("scratch");
        root.create(id("a/b"), ContentKind::Source, b"text".to_vec())
            .unwrap();

        assert!(root.exists(&id("a/b"), ContentKind::Source));
        assert!(!root.exists(&id("a/b"), ContentKind::Compiled));
        assert_eq!(
            root.get(&id("a/b"), ContentKind::Source)
                .unwrap()
                .read()
                .unwrap()
                .as_slice(),
            b"text"
        );

        assert!(root.remove(&id("a/b"), ContentKind::Source).unwrap());
        assert!(!root.exists(&id("a/b"), ContentKind::Source));
    }

    #[test]
    fn test_flush_clears_dirty() {
        let mut root = MemRoot::new("scratch");
        root.create(id("x"), ContentKind::Compiled, vec![1, 2, 3])
            .unwrap();
        assert!(root.get(&id("x"), ContentKind::Compiled).unwrap().is_dirty());
        root.flush().unwrap();
        assert!(!root.get(&id("x"), ContentKind::Compiled).unwrap().is_dirty());
    }
}
