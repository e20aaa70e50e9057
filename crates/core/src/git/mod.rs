//! Destination repository operations.

pub mod client;

use std::path::Path;

use chrono::{DateTime, FixedOffset};

use crate::errors::GitError;

pub use client::GitClient;

/// Everything needed to create one destination commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub author_name: String,
    pub author_email: String,
    /// Author time, with the offset it was recorded in.
    pub when: DateTime<FixedOffset>,
    pub message: String,
}

/// The capabilities the replay needs from the destination VCS.
///
/// All branch names are flat destination names (already mapped).
pub trait DestinationVcs {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    fn branch_exists(&self, name: &str) -> Result<bool, GitError>;

    /// Short name of the branch HEAD points at, even if it is unborn.
    fn current_branch(&self) -> Result<Option<String>, GitError>;

    /// Create `name` at the current HEAD and make it the active branch.
    ///
    /// On a repository without commits the branch becomes the unborn HEAD.
    fn create_branch(&self, name: &str) -> Result<(), GitError>;

    /// Check out an existing branch, replacing tracked working-tree files.
    fn checkout_branch(&self, name: &str) -> Result<(), GitError>;

    /// Stage every addition, modification and deletion in the working tree.
    fn stage_all(&self) -> Result<(), GitError>;

    /// Drop `path` (relative to the working tree root) from the index.
    fn remove_from_index(&self, path: &str) -> Result<(), GitError>;

    /// Commit the index on the active branch. Empty commits are allowed.
    /// Returns the new commit id.
    fn commit(&self, request: &CommitRequest) -> Result<String, GitError>;

    fn list_branches(&self) -> Result<Vec<String>, GitError>;
}
