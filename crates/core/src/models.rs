//! Domain model types used throughout plastigit.
//!
//! These types bridge the history reader, the replay driver and the CLI
//! report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Changesets
// ---------------------------------------------------------------------------

/// One atomic revision recorded by the source system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: i64,
    /// Hierarchical source branch path, e.g. `/main/feature-x`.
    pub branch: String,
    /// Free-text comment; may be empty.
    pub comment: String,
    /// Recorded author. Not used for the destination identity.
    pub owner: String,
    /// Date string exactly as exported.
    pub timestamp: String,
    pub changes: Vec<FileChange>,
}

/// Kind of a single file-level mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Changed,
    Deleted,
    Moved,
}

impl ChangeKind {
    /// All kinds in the order used for synthesized messages.
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Added,
        ChangeKind::Changed,
        ChangeKind::Deleted,
        ChangeKind::Moved,
    ];

    /// Parse the `<Type>` value of a history item.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "Added" => Some(Self::Added),
            "Changed" => Some(Self::Changed),
            "Deleted" => Some(Self::Deleted),
            "Moved" => Some(Self::Moved),
            _ => None,
        }
    }

    /// Verb used when describing a count of changes of this kind.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Added => "Add",
            Self::Changed => "Update",
            Self::Deleted => "Delete",
            Self::Moved => "Move",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "Added"),
            Self::Changed => write!(f, "Changed"),
            Self::Deleted => write!(f, "Deleted"),
            Self::Moved => write!(f, "Moved"),
        }
    }
}

/// One file-level mutation within a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    /// Origin path; only set for [`ChangeKind::Moved`].
    pub src_path: Option<String>,
    /// Path the change applies to (destination for moves).
    pub dst_path: String,
}

impl FileChange {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Added,
            src_path: None,
            dst_path: path.into(),
        }
    }

    pub fn changed(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Changed,
            src_path: None,
            dst_path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            src_path: None,
            dst_path: path.into(),
        }
    }

    pub fn moved(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Moved,
            src_path: Some(from.into()),
            dst_path: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Lifecycle of one migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Reading,
    Replaying,
    Summarizing,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Reading => write!(f, "reading"),
            Self::Replaying => write!(f, "replaying"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Done => write!(f, "done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-changeset results
// ---------------------------------------------------------------------------

/// What the branch resolver had to do before a changeset could be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BranchTransition {
    /// Already on the right branch.
    Unchanged,
    /// Branch was created from the previously active branch (if any).
    Created { from: Option<String> },
    /// Existing branch was checked out.
    Switched,
}

/// Outcome of a single changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangesetStatus {
    Committed { sha: String },
    Failed { reason: String },
}

/// Result record for one replayed changeset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesetResult {
    /// 1-based position in replay order.
    pub index: usize,
    pub total: usize,
    pub changeset_id: i64,
    pub source_branch: String,
    pub destination_branch: Option<String>,
    pub transition: Option<BranchTransition>,
    pub message: Option<String>,
    pub status: ChangesetStatus,
    pub files_written: usize,
    pub files_removed: usize,
    /// Per-file problems that did not fail the changeset.
    pub warnings: Vec<String>,
}

impl ChangesetResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ChangesetStatus::Committed { .. })
    }

    /// Failure reason, if the changeset failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ChangesetStatus::Failed { reason } => Some(reason),
            ChangesetStatus::Committed { .. } => None,
        }
    }
}

/// Aggregated outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Destination branches this run had to create.
    pub branches_created: BTreeSet<String>,
    /// Every destination branch a changeset was committed to or switched to.
    pub branches_visited: BTreeSet<String>,
    /// All local branches present in the destination after the run.
    pub destination_branches: Vec<String>,
    pub results: Vec<ChangesetResult>,
}

impl MigrationReport {
    /// Fold a changeset result into the running counters.
    pub fn record(&mut self, result: ChangesetResult) {
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn warning_count(&self) -> usize {
        self.results.iter().map(|r| r.warnings.len()).sum()
    }
}
