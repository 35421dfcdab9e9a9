pub mod check;
pub mod deps;
pub mod prune;
pub mod resolve;
pub mod version;

use berrylock_core::BerryLockfile;
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::config::Config;

/// Read and decode the configured lockfile.
pub fn load_lockfile(config: &Config) -> Result<BerryLockfile> {
    let bytes = read_lockfile(config)?;
    decode_lockfile(config, &bytes)
}

/// Raw bytes of the configured lockfile.
pub fn read_lockfile(config: &Config) -> Result<Vec<u8>> {
    let path = config.lockfile_path();
    std::fs::read(&path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Decode bytes previously read from the configured lockfile.
pub fn decode_lockfile(config: &Config, bytes: &[u8]) -> Result<BerryLockfile> {
    let path = config.lockfile_path();
    let lockfile = berrylock_core::decode(bytes)
        .map_err(report)
        .wrap_err_with(|| format!("failed to decode {}", path.display()))?;

    tracing::debug!(path = %path.display(), entries = lockfile.len(), "loaded lockfile");
    Ok(lockfile)
}

/// Turn a core error into a diagnostic carrying its stable code.
pub fn report(err: impl Into<berrylock_core::Error>) -> miette::Report {
    let err = err.into();
    miette::miette!(code = err.code(), "{err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_decode_lockfile_error_names_path() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        let err = decode_lockfile(&config, b"not: a lockfile\n").unwrap_err();
        assert!(err.to_string().contains("yarn.lock"));
    }

    #[test]
    fn test_read_then_decode() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        std::fs::write(
            config.lockfile_path(),
            "\n__metadata:\n  version: 6\n  cacheKey: 8\n",
        )
        .unwrap();

        let bytes = read_lockfile(&config).unwrap();
        let lockfile = decode_lockfile(&config, &bytes).unwrap();
        assert!(lockfile.is_empty());
        assert_eq!(lockfile.encode().unwrap(), bytes);
    }
}
