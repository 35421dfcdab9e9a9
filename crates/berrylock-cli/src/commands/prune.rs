//! `berrylock prune` command implementation.
//!
//! Write a lockfile holding only what the selected workspaces need.

use std::io::Write;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use tempfile::NamedTempFile;

use super::{load_lockfile, report};
use crate::config::Config;

/// Summary printed after writing a pruned lockfile to a file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PruneSummary<'a> {
    ok: bool,
    output: &'a Path,
    kept: usize,
    dropped: usize,
    patches: usize,
    package_extensions: usize,
}

/// Run the prune command.
///
/// Without `output`, the pruned lockfile is written to stdout.
pub fn run(
    config: &Config,
    workspaces: &[String],
    packages: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let lockfile = load_lockfile(config)?;
    let pruned = lockfile.subgraph(workspaces, packages).map_err(report)?;

    tracing::info!(
        kept = pruned.len(),
        dropped = lockfile.len() - pruned.len(),
        "pruned lockfile"
    );

    let Some(output) = output else {
        let mut stdout = std::io::stdout().lock();
        pruned.write_to(&mut stdout).map_err(report)?;
        return Ok(());
    };

    let output = resolve_output(&config.cwd, output);
    let bytes = pruned.encode().map_err(report)?;
    write_atomic(&output, &bytes)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;

    let summary = PruneSummary {
        ok: true,
        output: &output,
        kept: pruned.len(),
        dropped: lockfile.len() - pruned.len(),
        patches: pruned.patches().count(),
        package_extensions: pruned.package_extensions().len(),
    };
    if config.json {
        println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    } else {
        println!(
            "Wrote {} ({} entries kept, {} dropped)",
            output.display(),
            summary.kept,
            summary.dropped
        );
    }

    Ok(())
}

fn resolve_output(cwd: &Path, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        cwd.join(output)
    }
}

/// Write `bytes` to `path` via a temp file in the same directory, so readers
/// never see a partial lockfile.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
