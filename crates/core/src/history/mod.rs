//! Plastic history export reading.
//!
//! [`History`] is the only way changesets enter the replay: its constructor
//! sorts by id and rejects duplicates and branch-name collisions, so nothing
//! downstream ever re-sorts or re-validates.

pub mod parser;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::branch::map_branch_name;
use crate::errors::HistoryError;
use crate::models::Changeset;

pub use parser::parse_history;

/// Changesets in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct History {
    changesets: Vec<Changeset>,
}

impl History {
    /// Build a history from changesets in any order.
    pub fn new(mut changesets: Vec<Changeset>) -> Result<Self, HistoryError> {
        changesets.sort_by_key(|cs| cs.id);

        if let Some(pair) = changesets.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(HistoryError::DuplicateChangeset(pair[0].id));
        }

        check_branch_names(&changesets)?;

        debug!(count = changesets.len(), "history validated");
        Ok(Self { changesets })
    }

    /// Read and parse a history export from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        info!(path = %path.display(), "reading history export");
        let xml = std::fs::read_to_string(path).map_err(|source| HistoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_history(&xml)
    }

    pub fn changesets(&self) -> &[Changeset] {
        &self.changesets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Changeset> {
        self.changesets.iter()
    }

    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    pub fn first_id(&self) -> Option<i64> {
        self.changesets.first().map(|cs| cs.id)
    }

    pub fn last_id(&self) -> Option<i64> {
        self.changesets.last().map(|cs| cs.id)
    }

    /// Distinct destination branch names, keyed to their source path.
    pub fn branch_map(&self) -> BTreeMap<String, String> {
        self.changesets
            .iter()
            .map(|cs| (map_branch_name(&cs.branch), cs.branch.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Changeset;
    type IntoIter = std::slice::Iter<'a, Changeset>;

    fn into_iter(self) -> Self::IntoIter {
        self.changesets.iter()
    }
}

/// Every source branch must flatten to a distinct, non-empty Git name.
fn check_branch_names(changesets: &[Changeset]) -> Result<(), HistoryError> {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for cs in changesets {
        let name = map_branch_name(&cs.branch);
        if name.is_empty() {
            return Err(HistoryError::InvalidField {
                changeset: format!("cs:{}", cs.id),
                field: "Branch".into(),
                detail: format!("'{}' maps to an empty branch name", cs.branch),
            });
        }
        match seen.get(&name) {
            Some(first) if *first != cs.branch => {
                return Err(HistoryError::BranchNameCollision {
                    name,
                    first: first.to_string(),
                    second: cs.branch.clone(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(name, &cs.branch);
            }
        }
    }
    Ok(())
}
