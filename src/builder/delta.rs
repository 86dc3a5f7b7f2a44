//! Resource change sets handed to the builder.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// What happened to a resource since the last build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }

    /// Collapse two observations of the same resource into one.
    ///
    /// A removal followed by re-creation is whatever the re-creation
    /// was; anything followed by a removal is a removal; otherwise the
    /// first observation stands (created-then-modified is still a
    /// creation from the builder's point of view).
    pub fn merge(old: ChangeKind, new: ChangeKind) -> ChangeKind {
        match (old, new) {
            (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => new,
            (_, ChangeKind::Removed) => ChangeKind::Removed,
            _ => old,
        }
    }
}

#[derive(Default)]
struct Node {
    change: Option<ChangeKind>,
    children: BTreeMap<String, Node>,
}

/// A tree of changed resources, keyed by path component.
///
/// Mirrors the filesystem hierarchy so nested changes stay grouped;
/// [`flatten`](Self::flatten) produces the leaf list the builder walks,
/// in stable path order.
#[derive(Default)]
pub struct ResourceDelta {
    root: Node,
}

impl ResourceDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.change.is_none() && self.root.children.is_empty()
    }

    /// Record an observation, merging with any earlier one for the same
    /// path.
    pub fn insert(&mut self, path: &Path, kind: ChangeKind) {
        let mut node = &mut self.root;
        for component in path.components() {
            let name = match component {
                Component::Normal(name) => name.to_string_lossy().into_owned(),
                Component::RootDir => "/".to_string(),
                Component::Prefix(p) => p.as_os_str().to_string_lossy().into_owned(),
                Component::CurDir | Component::ParentDir => continue,
            };
            node = node.children.entry(name).or_default();
        }
        node.change = Some(match node.change {
            Some(old) => ChangeKind::merge(old, kind),
            None => kind,
        });
    }

    /// All changed resources as `(path, kind)` pairs, in path order.
    pub fn flatten(&self) -> Vec<(PathBuf, ChangeKind)> {
        let mut out = Vec::new();
        collect(&self.root, PathBuf::new(), &mut out);
        out
    }
}

fn collect(node: &Node, prefix: PathBuf, out: &mut Vec<(PathBuf, ChangeKind)>) {
    if let Some(kind) = node.change {
        out.push((prefix.clone(), kind));
    }
    for (name, child) in &node.children {
        let path = if name == "/" {
            PathBuf::from("/")
        } else {
            prefix.join(name)
        };
        collect(child, path, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(ResourceDelta::new().is_empty());
    }

    #[test]
    fn test_insert_and_flatten() {
        let mut delta = ResourceDelta::new();
        delta.insert(Path::new("src/b.src"), ChangeKind::Modified);
        delta.insert(Path::new("src/a.src"), ChangeKind::Created);

        let flat = delta.flatten();
        assert_eq!(
            flat,
            vec![
                (PathBuf::from("src/a.src"), ChangeKind::Created),
                (PathBuf::from("src/b.src"), ChangeKind::Modified),
            ]
        );
    }

    #[test]
    fn test_absolute_paths_round_trip() {
        let mut delta = ResourceDelta::new();
        delta.insert(Path::new("/tmp/p/src/a.src"), ChangeKind::Modified);
        assert_eq!(
            delta.flatten(),
            vec![(PathBuf::from("/tmp/p/src/a.src"), ChangeKind::Modified)]
        );
    }

    #[test]
    fn test_merge_create_then_remove_is_remove() {
        let mut delta = ResourceDelta::new();
        delta.insert(Path::new("a.src"), ChangeKind::Created);
        delta.insert(Path::new("a.src"), ChangeKind::Removed);
        assert_eq!(delta.flatten(), vec![(PathBuf::from("a.src"), ChangeKind::Removed)]);
    }

    #[test]
    fn test_merge_remove_then_create_is_create() {
        let mut delta = ResourceDelta::new();
        delta.insert(Path::new("a.src"), ChangeKind::Removed);
        delta.insert(Path::new("a.src"), ChangeKind::Created);
        assert_eq!(delta.flatten(), vec![(PathBuf::from("a.src"), ChangeKind::Created)]);
    }

    #[test]
    fn test_merge_create_then_modify_stays_create() {
        let mut delta = ResourceDelta::new();
        delta.insert(Path::new("a.src"), ChangeKind::Created);
        delta.insert(Path::new("a.src"), ChangeKind::Modified);
        assert_eq!(delta.flatten(), vec![(PathBuf::from("a.src"), ChangeKind::Created)]);
    }

    #[test]
    fn test_nested_paths_grouped() {
        let mut delta = ResourceDelta::new();
        delta.insert(Path::new("src/pkg/deep.src"), ChangeKind::Modified);
        delta.insert(Path::new("src/top.src"), ChangeKind::Modified);
        delta.insert(Path::new("other/x.src"), ChangeKind::Removed);
        assert_eq!(delta.flatten().len(), 3);
    }
}
