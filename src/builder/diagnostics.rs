//! Diagnostics attached to resources.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// One diagnostic, anchored at a 1-based line of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: u32,
    pub message: String,
    pub severity: Severity,
}

/// Where the builder reports problems.
///
/// The builder clears a resource's diagnostics before recompiling it and
/// adds fresh ones as the compiler reports them, so the table always
/// reflects the latest pass over each file.
pub trait DiagnosticSink: Send + Sync {
    fn add(&self, resource: &Path, line: u32, message: &str, severity: Severity);

    /// Drop diagnostics for a resource; with `recursive`, also for
    /// everything under it.
    fn clear(&self, resource: &Path, recursive: bool);

    fn clear_all(&self);
}

/// The in-process sink: a table of diagnostics per resource.
#[derive(Default)]
pub struct MarkerTable {
    markers: Mutex<FxHashMap<PathBuf, Vec<Diagnostic>>>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_resource(&self, resource: &Path) -> Vec<Diagnostic> {
        self.markers
            .lock()
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Every diagnostic, sorted by resource then line.
    pub fn all(&self) -> Vec<Diagnostic> {
        let markers = self.markers.lock();
        let mut out: Vec<Diagnostic> = markers.values().flatten().cloned().collect();
        out.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        out
    }

    pub fn total(&self) -> usize {
        self.markers.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl DiagnosticSink for MarkerTable {
    fn add(&self, resource: &Path, line: u32, message: &str, severity: Severity) {
        self.markers
            .lock()
            .entry(resource.to_path_buf())
            .or_default()
            .push(Diagnostic {
                file: resource.to_path_buf(),
                line,
                message: message.to_string(),
                severity,
            });
    }

    fn clear(&self, resource: &Path, recursive: bool) {
        let mut markers = self.markers.lock();
        if recursive {
            markers.retain(|path, _| !path.starts_with(resource));
        } else {
            markers.remove(resource);
        }
    }

    fn clear_all(&self) {
        self.markers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_query() {
        let table = MarkerTable::new();
        table.add(Path::new("src/a.src"), 3, "bad token", Severity::Error);
        table.add(Path::new("src/a.src"), 1, "shadowed", Severity::Warning);

        let found = table.for_resource(Path::new("src/a.src"));
        assert_eq!(found.len(), 2);
        assert!(table.for_resource(Path::new("src/b.src")).is_empty());
    }

    #[test]
    fn test_all_sorted_by_file_then_line() {
        let table = MarkerTable::new();
        table.add(Path::new("b.src"), 1, "x", Severity::Error);
        table.add(Path::new("a.src"), 9, "y", Severity::Error);
        table.add(Path::new("a.src"), 2, "z", Severity::Error);

        let lines: Vec<(PathBuf, u32)> =
            table.all().into_iter().map(|d| (d.file, d.line)).collect();
        assert_eq!(
            lines,
            vec![
                (PathBuf::from("a.src"), 2),
                (PathBuf::from("a.src"), 9),
                (PathBuf::from("b.src"), 1),
            ]
        );
    }

    #[test]
    fn test_clear_single_resource() {
        let table = MarkerTable::new();
        table.add(Path::new("src/a.src"), 1, "x", Severity::Error);
        table.add(Path::new("src/b.src"), 1, "y", Severity::Error);

        table.clear(Path::new("src/a.src"), false);
        assert!(table.for_resource(Path::new("src/a.src")).is_empty());
        assert_eq!(table.total(), 1);
    }

    #[test]
    fn test_clear_recursive() {
        let table = MarkerTable::new();
        table.add(Path::new("src/pkg/a.src"), 1, "x", Severity::Error);
        table.add(Path::new("src/pkg/b.src"), 1, "y", Severity::Error);
        table.add(Path::new("other/c.src"), 1, "z", Severity::Error);

        table.clear(Path::new("src"), true);
        assert_eq!(table.total(), 1);
        assert_eq!(table.for_resource(Path::new("other/c.src")).len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let table = MarkerTable::new();
        table.add(Path::new("a.src"), 1, "x", Severity::Error);
        table.clear_all();
        assert!(table.is_empty());
    }
}
