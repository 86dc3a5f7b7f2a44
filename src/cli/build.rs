//! One-shot build and clean commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, bail};

use crate::builder::{
    BuildKind, BuildReport, Builder, CancelToken, MarkerTable, PassthroughCompiler, Severity,
};
use crate::log;
use crate::project::Project;

/// Open the project and wire a builder over it.
pub fn make_builder(config_path: &Path) -> Result<(Builder, Arc<MarkerTable>)> {
    let project = Project::open(config_path)?;
    log!("build"; "project `{}` at {}", project.config.project.name,
        project.root_dir.display());

    let sink = Arc::new(MarkerTable::new());
    let builder = Builder::new(
        project.namespace,
        project.rules,
        Box::new(PassthroughCompiler),
        sink.clone(),
    );
    Ok((builder, sink))
}

pub fn run_build(config_path: &Path, full: bool) -> Result<()> {
    let (mut builder, sink) = make_builder(config_path)?;
    let kind = if full {
        BuildKind::Full
    } else {
        BuildKind::Incremental
    };

    let cancel = CancelToken::new();
    cancel.install_ctrlc()?;

    let start = Instant::now();
    let report = builder.build(kind, None, &cancel)?;
    finish(&report, &sink, start)
}

pub fn run_clean(config_path: &Path) -> Result<()> {
    let (mut builder, sink) = make_builder(config_path)?;

    let cancel = CancelToken::new();
    cancel.install_ctrlc()?;

    let start = Instant::now();
    let report = builder.build(BuildKind::Clean, None, &cancel)?;
    finish(&report, &sink, start)
}

/// Print diagnostics and the pass summary; fail the process on errors.
fn finish(report: &BuildReport, sink: &MarkerTable, start: Instant) -> Result<()> {
    print_diagnostics(sink);

    if report.cancelled {
        log!("build"; "cancelled after {} unit(s)", report.compiled);
        return Ok(());
    }
    if report.errors > 0 {
        bail!("build failed with {} error(s)", report.errors);
    }
    log!("build"; "done, {} unit(s) compiled in {:.1?}", report.compiled, start.elapsed());
    Ok(())
}

pub fn print_diagnostics(sink: &MarkerTable) {
    for diagnostic in sink.all() {
        let module = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Warning => "warn",
        };
        log!(module; "{}:{}: {}", diagnostic.file.display(), diagnostic.line,
            diagnostic.message);
    }
}
