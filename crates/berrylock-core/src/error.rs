//! Error types for lockfile operations.
//!
//! Each operation family has its own error enum so callers can match on
//! exactly what can go wrong. [`Error`] wraps all of them for callers that
//! only want to bubble failures up.

use thiserror::Error;

/// Stable error codes, one per error family.
pub mod codes {
    pub const LOCK_IDENT_INVALID: &str = "LOCK_IDENT_INVALID";
    pub const LOCK_RANGE_INVALID: &str = "LOCK_RANGE_INVALID";
    pub const LOCK_DECODE_FAILED: &str = "LOCK_DECODE_FAILED";
    pub const LOCK_ENCODE_FAILED: &str = "LOCK_ENCODE_FAILED";
    pub const LOCK_UNRESOLVED_WORKSPACE: &str = "LOCK_UNRESOLVED_WORKSPACE";
    pub const LOCK_UNRESOLVED_SPECIFIER: &str = "LOCK_UNRESOLVED_SPECIFIER";
}

/// Malformed locator, descriptor or ident text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier '{input}': {reason}")]
pub struct IdentError {
    pub input: String,
    pub reason: &'static str,
}

impl IdentError {
    #[must_use]
    pub fn new(input: impl Into<String>, reason: &'static str) -> Self {
        Self {
            input: input.into(),
            reason,
        }
    }
}

/// A version range the range engine cannot interpret.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version range '{range}': {message}")]
pub struct RangeError {
    pub range: String,
    pub message: String,
}

impl RangeError {
    #[must_use]
    pub fn new(range: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            range: range.into(),
            message: message.into(),
        }
    }
}

/// Malformed top-level lockfile structure.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Lockfile is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Lockfile has no __metadata block")]
    MissingMetadata,

    #[error("Invalid __metadata block: {0}")]
    InvalidMetadata(String),

    #[error("Invalid entry '{key}' on line {line}: {message}")]
    InvalidEntry {
        key: String,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    InvalidIdentifier(#[from] IdentError),

    #[error("Descriptor {0} appears in more than one entry heading")]
    DuplicateDescriptor(String),

    #[error("Locator {0} is the resolution of more than one entry")]
    DuplicateLocator(String),

    #[error("Patch {patch} refers to {base} which has no lockfile entry")]
    MissingPatchBase { patch: String, base: String },
}

impl DecodeError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn entry(key: &str, line: usize, message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            key: key.to_string(),
            line,
            message: message.into(),
        }
    }
}

/// Failure while writing canonical lockfile text.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to write lockfile: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while computing a pruned lockfile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PruneError {
    #[error("No workspace found at '{0}'")]
    UnresolvedWorkspace(String),

    #[error("Unable to resolve '{0}' against the lockfile")]
    UnresolvedSpecifier(String),

    #[error(transparent)]
    InvalidSpecifier(#[from] IdentError),
}

/// Any error produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Ident(#[from] IdentError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Prune(#[from] PruneError),
}

impl Error {
    /// Stable code for the error family.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ident(_) | Self::Prune(PruneError::InvalidSpecifier(_)) => {
                codes::LOCK_IDENT_INVALID
            }
            Self::Range(_) => codes::LOCK_RANGE_INVALID,
            Self::Decode(_) => codes::LOCK_DECODE_FAILED,
            Self::Encode(_) => codes::LOCK_ENCODE_FAILED,
            Self::Prune(PruneError::UnresolvedWorkspace(_)) => codes::LOCK_UNRESOLVED_WORKSPACE,
            Self::Prune(PruneError::UnresolvedSpecifier(_)) => codes::LOCK_UNRESOLVED_SPECIFIER,
        }
    }
}
