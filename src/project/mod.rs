//! The project model: namespace, build path, rules and configuration.
//!
//! A [`Namespace`] aggregates the binary and source roots a project is
//! built from, resolves entry lookups across all of them, and tracks the
//! working delta of entries pending recompilation.

mod buildpath;
mod config;
mod rules;

pub use buildpath::{BuildPath, BuildRule, Library, ParseError, PathEntry};
pub use config::{ConfigError, ProjectConfig};
pub use rules::{ResolvedRule, RuleSet, Target};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;

use crate::content::{ContentKind, ContentRegistry};
use crate::path::{ArchiveRoot, DirRoot, Entry, Filter, Ident, Root, StoreError};
use crate::{debug, log};

// ============================================================================
// RootId
// ============================================================================

/// Stable name of a registered root, unique across the namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(String);

impl RootId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootId({})", self.0)
    }
}

// ============================================================================
// Namespace
// ============================================================================

struct NamedRoot {
    id: RootId,
    root: Box<dyn Root>,
}

/// An identifier pending recompilation, tagged with its source root.
pub type StaleId = (RootId, Ident);

/// The project namespace: ordered binary and source roots plus the
/// pending delta.
///
/// Lookup iterates every root in registration order and returns the
/// first positive match, so a project's own output shadows an external
/// library holding the same identifier. The delta grows as change
/// notifications arrive and is drained by [`take_delta`] when a build
/// pass consumes it.
///
/// [`take_delta`]: Namespace::take_delta
pub struct Namespace {
    registry: Arc<ContentRegistry>,
    binary_roots: Vec<NamedRoot>,
    source_roots: Vec<NamedRoot>,
    delta: Vec<StaleId>,
    delta_seen: FxHashSet<StaleId>,
}

impl Namespace {
    pub fn new(registry: Arc<ContentRegistry>) -> Self {
        Self {
            registry,
            binary_roots: Vec::new(),
            source_roots: Vec::new(),
            delta: Vec::new(),
            delta_seen: FxHashSet::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ContentRegistry> {
        &self.registry
    }

    pub fn add_binary_root(&mut self, id: RootId, root: Box<dyn Root>) {
        self.binary_roots.push(NamedRoot { id, root });
    }

    pub fn add_source_root(&mut self, id: RootId, root: Box<dyn Root>) {
        self.source_roots.push(NamedRoot { id, root });
    }

    /// All roots in registration order: binary first, then source.
    fn roots(&self) -> impl Iterator<Item = &NamedRoot> {
        self.binary_roots.iter().chain(self.source_roots.iter())
    }

    pub fn root(&self, id: &RootId) -> Option<&dyn Root> {
        self.roots()
            .find(|named| named.id == *id)
            .map(|named| named.root.as_ref())
    }

    pub fn root_mut(&mut self, id: &RootId) -> Option<&mut Box<dyn Root>> {
        self.binary_roots
            .iter_mut()
            .chain(self.source_roots.iter_mut())
            .find(|named| named.id == *id)
            .map(|named| &mut named.root)
    }

    pub fn source_root_ids(&self) -> Vec<RootId> {
        self.source_roots.iter().map(|n| n.id.clone()).collect()
    }

    /// Every root in lookup order.
    pub fn root_ids(&self) -> Vec<RootId> {
        self.roots().map(|n| n.id.clone()).collect()
    }

    // ------------------------------------------------------------------
    // Lookup (first match wins)
    // ------------------------------------------------------------------

    pub fn exists(&self, id: &Ident, kind: ContentKind) -> bool {
        self.roots().any(|named| named.root.exists(id, kind))
    }

    pub fn get(&self, id: &Ident, kind: ContentKind) -> Option<&Entry> {
        self.roots().find_map(|named| named.root.get(id, kind))
    }

    /// All matching entries across every root.
    pub fn select(&self, filter: &Filter, kind: ContentKind) -> Vec<&Entry> {
        self.roots()
            .flat_map(|named| named.root.select(filter, kind))
            .collect()
    }

    /// Matching identifiers across every root, deduplicated and sorted.
    pub fn match_ids(&self, filter: &Filter, kind: ContentKind) -> Vec<Ident> {
        let mut ids: Vec<Ident> = self
            .roots()
            .flat_map(|named| named.root.match_ids(filter, kind))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// The source entry for a stale identifier, searched in its root.
    pub fn source_entry(&self, stale: &StaleId) -> Option<&Entry> {
        let named = self.source_roots.iter().find(|n| n.id == stale.0)?;
        named.root.get(&stale.1, ContentKind::Source)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Persist pending writes in every binary root.
    pub fn flush(&self) -> Result<(), StoreError> {
        for named in &self.binary_roots {
            named.root.flush()?;
        }
        Ok(())
    }

    /// Re-synchronize every binary root with its backing storage.
    pub fn refresh(&mut self) {
        for named in &mut self.binary_roots {
            named.root.refresh();
        }
    }

    // ------------------------------------------------------------------
    // Change notifications
    // ------------------------------------------------------------------

    /// A resource changed. Paths outside every registered root are
    /// ignored; source units join the pending delta; a changed binary
    /// unit conservatively marks every source unit stale, since other
    /// units may depend on it.
    pub fn changed(&mut self, path: &Path) {
        self.notify(path, false);
    }

    /// A resource was created. The owning source root re-enumerates so
    /// the new entry becomes visible before it joins the delta.
    pub fn created(&mut self, path: &Path) {
        if let Some(index) = self.covering_source_root(path) {
            self.source_roots[index].root.refresh();
        }
        self.notify(path, false);
    }

    /// A resource was removed: dropped from the delta, its root
    /// re-enumerated.
    pub fn removed(&mut self, path: &Path) {
        self.notify(path, true);
    }

    fn covering_source_root(&self, path: &Path) -> Option<usize> {
        self.source_roots
            .iter()
            .position(|named| named.root.covers(path))
    }

    fn notify(&mut self, path: &Path, removal: bool) {
        if let Some(index) = self.covering_source_root(path) {
            let root_id = self.source_roots[index].id.clone();
            let Some((id, kind)) = self.source_roots[index].root.identify(path) else {
                return;
            };
            match kind {
                ContentKind::Source => {
                    if removal {
                        self.source_roots[index].root.refresh();
                        self.drop_stale(&(root_id, id));
                    } else {
                        self.mark_stale((root_id, id));
                    }
                }
                ContentKind::Compiled => {
                    // A binary changed under a source folder; dependents
                    // are unknown, so everything becomes stale.
                    self.mark_all_stale();
                }
                ContentKind::Opaque => {}
            }
            return;
        }

        // A binary root's storage changed (e.g. a library archive was
        // replaced on disk): refresh it and conservatively mark every
        // source unit stale.
        let mut touched = false;
        for named in &mut self.binary_roots {
            if named.root.covers(path) {
                named.root.refresh();
                touched = true;
            }
        }
        if touched {
            self.mark_all_stale();
        } else {
            debug!("namespace"; "ignoring change outside all roots: {}", path.display());
        }
    }

    // ------------------------------------------------------------------
    // Pending delta
    // ------------------------------------------------------------------

    pub fn mark_stale(&mut self, stale: StaleId) {
        if self.delta_seen.insert(stale.clone()) {
            self.delta.push(stale);
        }
    }

    /// Conservative fallback: every enumerable source unit is stale.
    pub fn mark_all_stale(&mut self) {
        let all: Vec<StaleId> = self
            .source_roots
            .iter()
            .flat_map(|named| {
                let id = named.id.clone();
                named
                    .root
                    .match_ids(&Filter::all(), ContentKind::Source)
                    .into_iter()
                    .map(move |ident| (id.clone(), ident))
            })
            .collect();
        for stale in all {
            self.mark_stale(stale);
        }
    }

    fn drop_stale(&mut self, stale: &StaleId) {
        if self.delta_seen.remove(stale) {
            self.delta.retain(|s| s != stale);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.delta.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.delta.len()
    }

    /// Drain the pending delta for a build pass. Identifiers no longer
    /// present in their source root are skipped; the delta only ever
    /// hands out entries that still exist.
    pub fn take_delta(&mut self) -> Vec<StaleId> {
        self.delta_seen.clear();
        let drained = std::mem::take(&mut self.delta);
        drained
            .into_iter()
            .filter(|stale| self.source_entry(stale).is_some())
            .collect()
    }

    /// Put unconsumed identifiers back, preserving order, so a failed or
    /// cancelled pass retries them next time.
    pub fn restore_delta(&mut self, stale: Vec<StaleId>) {
        let mut restored = stale;
        restored.extend(std::mem::take(&mut self.delta));
        self.delta_seen.clear();
        self.delta.clear();
        for item in restored {
            self.mark_stale(item);
        }
    }

    /// Map an absolute path to its covering source root, identifier and
    /// suffix-proposed kind.
    pub fn identify_source(&self, path: &Path) -> Option<(RootId, Ident, ContentKind)> {
        for named in &self.source_roots {
            if let Some((id, kind)) = named.root.identify(path) {
                return Some((named.id.clone(), id, kind));
            }
        }
        None
    }
}

// ============================================================================
// Project assembly
// ============================================================================

/// A loaded project: configuration, namespace and resolved rules.
pub struct Project {
    pub root_dir: PathBuf,
    pub config: ProjectConfig,
    pub registry: Arc<ContentRegistry>,
    pub buildpath: BuildPath,
    pub namespace: Namespace,
    pub rules: RuleSet,
    /// Directories the watcher observes (the source root folders).
    pub watch_dirs: Vec<PathBuf>,
}

impl Project {
    /// Open the project a `kiln.toml` describes. A missing build path
    /// document falls back to the conventional layout; a malformed one
    /// is rejected wholesale and also falls back, with a logged error.
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = ProjectConfig::load(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        let root_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let registry = Arc::new(ContentRegistry::new(
            config.build.source_suffix.clone(),
            config.build.compiled_suffix.clone(),
        ));

        let buildpath_file = root_dir.join(&config.project.buildpath);
        let buildpath = if buildpath_file.is_file() {
            let text = fs::read_to_string(&buildpath_file)
                .with_context(|| format!("reading {}", buildpath_file.display()))?;
            match BuildPath::from_xml(&text) {
                Ok(path) => path,
                Err(e) => {
                    log!("error"; "{} is malformed ({e}), using default layout",
                        buildpath_file.display());
                    BuildPath::default_layout()
                }
            }
        } else {
            debug!("config"; "no {} found, using default layout", buildpath_file.display());
            BuildPath::default_layout()
        };

        let (namespace, rules, watch_dirs) = assemble(&root_dir, &buildpath, Arc::clone(&registry));

        Ok(Self {
            root_dir,
            config,
            registry,
            buildpath,
            namespace,
            rules,
            watch_dirs,
        })
    }
}

/// Register roots and resolve rules from a build path.
///
/// Registration order fixes lookup precedence: the default output root
/// first, then rule outputs and libraries in document order, then source
/// roots. Every rule's source folder resolves to a registered source
/// root by construction.
pub fn assemble(
    root_dir: &Path,
    buildpath: &BuildPath,
    registry: Arc<ContentRegistry>,
) -> (Namespace, RuleSet, Vec<PathBuf>) {
    let mut namespace = Namespace::new(Arc::clone(&registry));
    let mut registered: FxHashSet<RootId> = FxHashSet::default();
    let mut watch_dirs = Vec::new();

    let output_id = |namespace: &mut Namespace,
                         registered: &mut FxHashSet<RootId>,
                         folder: &Path| {
        let id = RootId::new(format!("out:{}", folder.display()));
        if registered.insert(id.clone()) {
            let dir = root_dir.join(folder);
            namespace.add_binary_root(
                id.clone(),
                Box::new(DirRoot::open(dir, Arc::clone(&registry), true)),
            );
        }
        id
    };

    let default_output = buildpath
        .default_output
        .as_deref()
        .map(|folder| output_id(&mut namespace, &mut registered, folder));

    let mut rules = RuleSet::new(default_output);

    for entry in &buildpath.entries {
        match entry {
            PathEntry::Rule(rule) => {
                let source_id = RootId::new(format!("src:{}", rule.source.display()));
                if registered.insert(source_id.clone()) {
                    let dir = root_dir.join(&rule.source);
                    watch_dirs.push(dir.clone());
                    namespace.add_source_root(
                        source_id.clone(),
                        Box::new(DirRoot::open(dir, Arc::clone(&registry), true)),
                    );
                }
                let output_root = rule
                    .output
                    .as_deref()
                    .map(|folder| output_id(&mut namespace, &mut registered, folder));
                rules.push(ResolvedRule {
                    source_root: source_id,
                    includes: rule.includes.clone(),
                    output_root,
                });
            }
            PathEntry::Library(lib) => {
                let id = RootId::new(format!("lib:{}", lib.location.display()));
                if !registered.insert(id.clone()) {
                    continue;
                }
                let location = root_dir.join(&lib.location);
                let root: Box<dyn Root> = if location.is_dir() {
                    Box::new(DirRoot::open(location, Arc::clone(&registry), false))
                } else {
                    // A missing archive registers anyway and stays empty;
                    // the namespace degrades instead of failing.
                    Box::new(ArchiveRoot::open(location, Arc::clone(&registry)))
                };
                namespace.add_binary_root(id, root);
            }
        }
    }

    (namespace, rules, watch_dirs)
}
