//! Source branch path → destination branch mapping, and keeping the
//! destination on the right branch.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use crate::errors::ReplayError;
use crate::git::DestinationVcs;
use crate::models::BranchTransition;

/// Flatten a hierarchical source branch path into a Git branch name.
///
/// A single leading `/` is dropped and every remaining `/` becomes `-`:
/// `/main/feature-x` → `main-feature-x`.
pub fn map_branch_name(source: &str) -> String {
    source.strip_prefix('/').unwrap_or(source).replace('/', "-")
}

/// Tracks which destination branch is active and which ones this run made.
#[derive(Debug, Default)]
pub struct BranchResolver {
    active: Option<String>,
    created: BTreeSet<String>,
    visited: BTreeSet<String>,
}

impl BranchResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already checked-out branch.
    pub fn starting_on(branch: Option<String>) -> Self {
        Self {
            active: branch,
            ..Self::default()
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn created(&self) -> &BTreeSet<String> {
        &self.created
    }

    pub fn visited(&self) -> &BTreeSet<String> {
        &self.visited
    }

    /// Make the destination branch for `source_branch` the active one.
    ///
    /// A missing branch is created from the current HEAD; an existing one is
    /// checked out. On failure the active branch is left untouched.
    #[instrument(skip(self, vcs))]
    pub fn ensure_active<D: DestinationVcs>(
        &mut self,
        vcs: &D,
        source_branch: &str,
    ) -> Result<(String, BranchTransition), ReplayError> {
        let target = map_branch_name(source_branch);

        if self.active.as_deref() == Some(target.as_str()) {
            debug!(branch = %target, "already on branch");
            self.visited.insert(target.clone());
            return Ok((target, BranchTransition::Unchanged));
        }

        let fail = |source| {
            warn!(branch = %target, "branch switch failed");
            ReplayError::BranchSwitchFailed {
                branch: target.clone(),
                source,
            }
        };

        let exists = vcs.branch_exists(&target).map_err(fail)?;
        let transition = if exists {
            vcs.checkout_branch(&target).map_err(fail)?;
            info!(branch = %target, "switched branch");
            BranchTransition::Switched
        } else {
            vcs.create_branch(&target).map_err(fail)?;
            info!(branch = %target, from = ?self.active, "created branch");
            self.created.insert(target.clone());
            BranchTransition::Created {
                from: self.active.clone(),
            }
        };

        self.visited.insert(target.clone());
        self.active = Some(target.clone());
        Ok((target, transition))
    }
}
