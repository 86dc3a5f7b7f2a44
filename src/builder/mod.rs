//! The builder: turning change sets into compiled outputs.
//!
//! A build pass selects the source entries to compile, hands them to the
//! compiler as one set, routes the resulting units through the build
//! rules into their output roots and flushes. Compilation failures
//! become diagnostics on the offending resource instead of aborting the
//! session.

mod cancel;
mod compile;
mod delta;
mod diagnostics;

pub use cancel::CancelToken;
pub use compile::{Artifact, CompileError, Compiler, PassthroughCompiler};
pub use delta::{ChangeKind, ResourceDelta};
pub use diagnostics::{Diagnostic, DiagnosticSink, MarkerTable, Severity};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use crate::content::ContentKind;
use crate::path::{Filter, Ident};
use crate::project::{Namespace, RootId, RuleSet, StaleId};
use crate::{debug, log};

/// What kind of pass to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// Recompile every source unit.
    Full,
    /// Recompile only the pending or supplied change set.
    Incremental,
    /// Remove generated outputs, then run a full pass.
    Clean,
}

/// Outcome of one build pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub kind: BuildKind,
    /// Compiled units produced and placed.
    pub compiled: usize,
    /// Compile failures recorded during the pass.
    pub errors: usize,
    pub cancelled: bool,
}

impl BuildReport {
    fn empty(kind: BuildKind) -> Self {
        Self {
            kind,
            compiled: 0,
            errors: 0,
            cancelled: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.errors == 0 && !self.cancelled
    }
}

/// Drives build passes over a namespace.
pub struct Builder {
    pub namespace: Namespace,
    rules: RuleSet,
    compiler: Box<dyn Compiler>,
    sink: Arc<dyn DiagnosticSink>,
}

struct SourceSet {
    /// Files handed to the compiler, in stable order.
    files: Vec<PathBuf>,
    /// File path back to the stale identifier it came from.
    origins: FxHashMap<PathBuf, StaleId>,
}

impl Builder {
    pub fn new(
        namespace: Namespace,
        rules: RuleSet,
        compiler: Box<dyn Compiler>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            namespace,
            rules,
            compiler,
            sink,
        }
    }

    /// Run one pass.
    ///
    /// An incremental pass without a change set consumes the pending
    /// delta; with nothing pending either, it runs a full pass instead.
    /// A clean pass is always followed by a full one, so a `Clean`
    /// request leaves a freshly built project behind.
    pub fn build(
        &mut self,
        kind: BuildKind,
        delta: Option<&ResourceDelta>,
        cancel: &CancelToken,
    ) -> Result<BuildReport> {
        match kind {
            BuildKind::Clean => {
                self.clean().context("removing generated outputs")?;
                let mut report = self.compile_set(self.all_sources(), cancel)?;
                report.kind = BuildKind::Clean;
                Ok(report)
            }
            BuildKind::Full => {
                // Everything gets rebuilt, so the pending delta is moot.
                self.namespace.take_delta();
                self.compile_set(self.all_sources(), cancel)
            }
            BuildKind::Incremental => {
                let stale = match delta {
                    Some(delta) => {
                        self.absorb(delta);
                        self.namespace.take_delta()
                    }
                    None if self.namespace.has_pending() => self.namespace.take_delta(),
                    None => {
                        debug!("build"; "nothing pending, running full pass");
                        return self.compile_set(self.all_sources(), cancel);
                    }
                };
                let mut report = self.compile_set(stale, cancel)?;
                report.kind = BuildKind::Incremental;
                Ok(report)
            }
        }
    }

    /// Feed a resource change set into the namespace as notifications.
    fn absorb(&mut self, delta: &ResourceDelta) {
        for (path, kind) in delta.flatten() {
            self.sink.clear(&path, true);
            match kind {
                ChangeKind::Created => self.namespace.created(&path),
                ChangeKind::Modified => self.namespace.changed(&path),
                ChangeKind::Removed => self.namespace.removed(&path),
            }
        }
    }

    /// Every enumerable source unit, for a full pass.
    fn all_sources(&self) -> Vec<StaleId> {
        let mut out = Vec::new();
        for root_id in self.namespace.source_root_ids() {
            if let Some(root) = self.namespace.root(&root_id) {
                for id in root.match_ids(&Filter::all(), ContentKind::Source) {
                    out.push((root_id.clone(), id));
                }
            }
        }
        out
    }

    /// Remove every compiled unit from writable roots and drop all
    /// diagnostics.
    fn clean(&mut self) -> Result<()> {
        for root_id in self.namespace.root_ids() {
            let Some(root) = self.namespace.root_mut(&root_id) else {
                continue;
            };
            if !root.writable() {
                continue;
            }
            for id in root.match_ids(&Filter::all(), ContentKind::Compiled) {
                root.remove(&id, ContentKind::Compiled)
                    .with_context(|| format!("removing {id} from {}", root.location()))?;
            }
            log!("clean"; "cleaned {}", root.location());
        }
        self.sink.clear_all();
        Ok(())
    }

    /// Compile a set of stale identifiers and place the outputs.
    fn compile_set(&mut self, stale: Vec<StaleId>, cancel: &CancelToken) -> Result<BuildReport> {
        let mut report = BuildReport::empty(BuildKind::Full);
        if stale.is_empty() {
            debug!("build"; "nothing to compile");
            return Ok(report);
        }
        if cancel.is_cancelled() {
            self.namespace.restore_delta(stale);
            report.cancelled = true;
            return Ok(report);
        }

        let set = self.collect_sources(&stale);
        let mut files = set.files.clone();
        for file in &files {
            self.sink.clear(file, false);
        }
        log!("build"; "compiling {} unit(s)", files.len());

        // A syntax error fails one file, not the pass: mark it, drop it
        // from the set and compile the rest. Failed files stay stale.
        let mut failed: Vec<StaleId> = Vec::new();
        let artifacts = loop {
            if files.is_empty() {
                break Vec::new();
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                let remaining = files
                    .iter()
                    .filter_map(|f| set.origins.get(f).cloned())
                    .collect();
                self.namespace.restore_delta(remaining);
                break Vec::new();
            }
            match self.compiler.compile(&files) {
                Ok(artifacts) => break artifacts,
                Err(CompileError::Syntax {
                    file,
                    offset,
                    message,
                }) => {
                    let Some(origin) = set.origins.get(&file) else {
                        // A file outside the compile set: nothing to
                        // attach the diagnostic to, and dropping it from
                        // the set cannot make progress. Log and give up
                        // on the rest of the pass.
                        log!("error"; "compiler reported a file outside the compile set, {}: {message}",
                            file.display());
                        report.errors += 1;
                        let remaining = files
                            .iter()
                            .filter_map(|f| set.origins.get(f).cloned())
                            .collect();
                        self.namespace.restore_delta(remaining);
                        break Vec::new();
                    };
                    let line = self.line_of_offset(Some(origin), offset).unwrap_or(1);
                    self.sink.add(&file, line, &message, Severity::Error);
                    log!("error"; "{}:{line}: {message}", file.display());
                    report.errors += 1;
                    failed.push(origin.clone());
                    files.retain(|f| *f != file);
                }
                Err(e @ CompileError::Io(_)) => {
                    log!("error"; "compilation aborted: {e}");
                    self.namespace.restore_delta(stale);
                    return Err(e).context("compilation failed");
                }
            }
        };
        if !failed.is_empty() {
            self.namespace.restore_delta(failed);
        }

        for artifact in &artifacts {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some((source_root, id)) = set.origins.get(&artifact.file) else {
                debug!("build"; "ignoring artifact for unknown file {}",
                    artifact.file.display());
                continue;
            };
            for target in self.rules.apply(source_root, id) {
                let Some(root) = self.namespace.root_mut(&target.output_root) else {
                    continue;
                };
                root.create(target.id.clone(), target.kind, artifact.unit.encode())
                    .with_context(|| {
                        format!("placing {} in {}", target.id, root.location())
                    })?;
                report.compiled += 1;
            }
        }

        self.namespace.flush().context("flushing outputs")?;
        Ok(report)
    }

    /// Resolve stale identifiers to compiler input files.
    ///
    /// Disk-backed entries hand the compiler their real path; virtual
    /// entries get their identifier's relative path, which stays unique
    /// within the set.
    fn collect_sources(&self, stale: &[StaleId]) -> SourceSet {
        let suffix = self.namespace.registry().suffix_for(ContentKind::Source);
        let mut files = Vec::new();
        let mut origins = FxHashMap::default();
        for item in stale {
            let Some(entry) = self.namespace.source_entry(item) else {
                continue;
            };
            let file = entry
                .disk_path()
                .map(PathBuf::from)
                .unwrap_or_else(|| item.1.to_rel_path(suffix));
            if origins.insert(file.clone(), item.clone()).is_none() {
                files.push(file);
            }
        }
        SourceSet { files, origins }
    }

    /// 1-based line of a byte offset in a stale entry's payload.
    fn line_of_offset(&self, origin: Option<&StaleId>, offset: usize) -> Option<u32> {
        let entry = self.namespace.source_entry(origin?)?;
        let payload = entry.read().ok()?;
        let upto = offset.min(payload.len());
        let newlines = payload[..upto].iter().filter(|b| **b == b'\n').count();
        Some(newlines as u32 + 1)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}
