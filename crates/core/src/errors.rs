//! Error types for the plastigit core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.
//!
//! Only [`HistoryError`] (and configuration problems) are fatal to a run.
//! Everything in [`ReplayError`] is scoped to one changeset or one file.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Plastic(#[from] PlasticError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// History (MalformedHistory) errors
// ---------------------------------------------------------------------------

/// The history export could not be turned into an ordered changeset list.
///
/// Every variant aborts the run before any destination mutation.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The document is not well-formed XML.
    #[error("malformed history: {0}")]
    Malformed(String),

    /// A changeset or item lacks a required element.
    #[error("malformed history: changeset {changeset} is missing <{field}>")]
    MissingField { changeset: String, field: String },

    /// A field is present but its value is unusable.
    #[error("malformed history: changeset {changeset} has invalid <{field}>: {detail}")]
    InvalidField {
        changeset: String,
        field: String,
        detail: String,
    },

    /// Two changesets share the same id.
    #[error("malformed history: duplicate changeset id {0}")]
    DuplicateChangeset(i64),

    /// Two distinct source branches flatten to the same Git branch name.
    #[error("branch name collision: '{first}' and '{second}' both map to '{name}'")]
    BranchNameCollision {
        name: String,
        first: String,
        second: String,
    },

    /// The history file could not be read.
    #[error("history I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Plastic (source) errors
// ---------------------------------------------------------------------------

/// Errors from `cm` CLI operations.
#[derive(Debug, Error)]
pub enum PlasticError {
    /// The `cm` binary was not found on `$PATH`.
    #[error("cm binary not found: {0}")]
    BinaryNotFound(String),

    /// A `cm` command exited with a non-zero status.
    #[error("cm command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// A `cm` command did not finish within the configured timeout.
    #[error("cm command timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The requested content is not available (used by in-memory providers).
    #[error("no content for '{path}' at cs:{changeset}")]
    NotFound { path: String, changeset: i64 },

    /// Generic I/O wrapper.
    #[error("cm I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Git (destination) errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// The working tree has no usable path (bare repository).
    #[error("git repository at '{0}' has no working directory")]
    BareRepository(String),
}

// ---------------------------------------------------------------------------
// Per-changeset replay errors
// ---------------------------------------------------------------------------

/// Failures scoped to a single changeset (or a single file within one).
///
/// None of these stop the run; the driver records them and moves on.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Creating or checking out the destination branch failed.
    #[error("branch switch to '{branch}' failed: {source}")]
    BranchSwitchFailed {
        branch: String,
        #[source]
        source: GitError,
    },

    /// The source could not produce a file's content for this changeset.
    #[error("could not retrieve '{path}' at cs:{changeset}: {source}")]
    ContentRetrievalFailed {
        path: String,
        changeset: i64,
        #[source]
        source: PlasticError,
    },

    /// `cm switch` to the changeset failed (switch strategy).
    #[error("workspace switch to cs:{changeset} failed: {source}")]
    WorkspaceSwitchFailed {
        changeset: i64,
        #[source]
        source: PlasticError,
    },

    /// Writing or removing a file in the working tree failed.
    #[error("reconcile failed at '{path}': {source}")]
    ReconcileFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The changeset date could not be turned into a commit time.
    #[error("invalid changeset timestamp '{0}'")]
    InvalidTimestamp(String),

    /// Staging or committing failed.
    #[error("commit for cs:{changeset} failed: {source}")]
    CommitFailed {
        changeset: i64,
        #[source]
        source: GitError,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = HistoryError::DuplicateChangeset(42);
        assert_eq!(err.to_string(), "malformed history: duplicate changeset id 42");

        let err = HistoryError::MissingField {
            changeset: "#3".into(),
            field: "Branch".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed history: changeset #3 is missing <Branch>"
        );

        let err = PlasticError::Timeout { secs: 30 };
        assert!(err.to_string().contains("timed out after 30s"));

        let err = ReplayError::BranchSwitchFailed {
            branch: "main-feature".into(),
            source: GitError::RepositoryNotFound("/tmp/x".into()),
        };
        assert!(err.to_string().contains("main-feature"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = HistoryError::Malformed("eof".into()).into();
        assert!(matches!(core_err, CoreError::History(_)));

        let core_err: CoreError = ConfigError::FileNotFound("x.toml".into()).into();
        assert!(matches!(core_err, CoreError::Config(_)));
    }
}
