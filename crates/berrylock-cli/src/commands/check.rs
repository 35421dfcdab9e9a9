//! `berrylock check` command implementation.
//!
//! Decode the lockfile, re-encode it and report whether the output matches
//! the input byte for byte.

use berrylock_core::version::LOCKFILE_FORMAT_VERSION;
use miette::Result;

use super::{decode_lockfile, read_lockfile, report};
use crate::config::Config;

/// Run the check command. Exits with status 1 when the lockfile is not in
/// canonical form.
pub fn run(config: &Config) -> Result<()> {
    let original = read_lockfile(config)?;
    let lockfile = decode_lockfile(config, &original)?;
    let encoded = lockfile.encode().map_err(report)?;

    let format = lockfile.metadata().version;
    if format > LOCKFILE_FORMAT_VERSION {
        tracing::warn!(
            format,
            supported = LOCKFILE_FORMAT_VERSION,
            "lockfile format is newer than this version of berrylock"
        );
    }

    let canonical = encoded == original;
    let first_difference = (!canonical).then(|| first_difference_line(&original, &encoded));

    if config.json {
        println!(
            "{}",
            serde_json::json!({
                "ok": canonical,
                "entries": lockfile.len(),
                "patches": lockfile.patches().count(),
                "packageExtensions": lockfile.package_extensions().len(),
                "metadata": lockfile.metadata(),
                "firstDifferenceLine": first_difference,
            })
        );
    } else if let Some(line) = first_difference {
        println!("lockfile is not canonical (first difference on line {line})");
    } else {
        println!(
            "lockfile is canonical ({} entries, {} patches, {} package extensions)",
            lockfile.len(),
            lockfile.patches().count(),
            lockfile.package_extensions().len()
        );
    }

    if !canonical {
        std::process::exit(1);
    }
    Ok(())
}

/// 1-based line where `a` and `b` first differ.
fn first_difference_line(a: &[u8], b: &[u8]) -> usize {
    let offset = a
        .iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()));
    a[..offset].iter().filter(|&&byte| byte == b'\n').count() + 1
}
