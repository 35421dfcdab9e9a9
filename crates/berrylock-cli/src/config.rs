use std::path::PathBuf;

use serde::Serialize;

/// Default lockfile name, relative to the working directory.
pub const DEFAULT_LOCKFILE: &str = "yarn.lock";

/// Runtime configuration for the berrylock CLI.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Lockfile path, relative to `cwd` unless absolute.
    pub lockfile: PathBuf,

    /// Emit JSON output and JSON logs.
    pub json: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            lockfile: PathBuf::from(DEFAULT_LOCKFILE),
            json: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set the lockfile path.
    #[must_use]
    pub fn with_lockfile(mut self, lockfile: PathBuf) -> Self {
        self.lockfile = lockfile;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// The lockfile path resolved against `cwd`.
    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        if self.lockfile.is_absolute() {
            self.lockfile.clone()
        } else {
            self.cwd.join(&self.lockfile)
        }
    }
}
