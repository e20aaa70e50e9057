//! Plastic SCM (source) access.

pub mod client;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::PlasticError;

pub use client::PlasticClient;

/// The capabilities the replay needs from the source VCS.
#[allow(async_fn_in_trait)]
pub trait ContentProvider {
    /// Exact bytes of `path` (as recorded in the history) at `changeset`.
    async fn retrieve(&self, path: &str, changeset: i64) -> Result<Vec<u8>, PlasticError>;

    /// Materialise the whole of `changeset` in the working tree.
    async fn switch_workspace(&self, changeset: i64) -> Result<(), PlasticError>;
}

/// In-memory provider keyed by `(path, changeset)`.
///
/// Useful for dry runs against exported blobs and for tests. A path that
/// has no exact entry for the requested changeset falls back to the latest
/// content recorded at or before it.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    blobs: HashMap<String, Vec<(i64, Vec<u8>)>>,
    switches: Mutex<Vec<i64>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `content` for `path` as of `changeset`.
    pub fn insert(&mut self, path: impl Into<String>, changeset: i64, content: impl Into<Vec<u8>>) {
        let versions = self.blobs.entry(path.into()).or_default();
        versions.push((changeset, content.into()));
        versions.sort_by_key(|(cs, _)| *cs);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, path: impl Into<String>, changeset: i64, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, changeset, content);
        self
    }

    /// Changesets passed to [`ContentProvider::switch_workspace`], in order.
    pub fn switched(&self) -> Vec<i64> {
        self.switches.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ContentProvider for MemoryProvider {
    async fn retrieve(&self, path: &str, changeset: i64) -> Result<Vec<u8>, PlasticError> {
        self.blobs
            .get(path)
            .and_then(|versions| {
                versions
                    .iter()
                    .rev()
                    .find(|(cs, _)| *cs <= changeset)
                    .map(|(_, content)| content.clone())
            })
            .ok_or_else(|| PlasticError::NotFound {
                path: path.to_string(),
                changeset,
            })
    }

    async fn switch_workspace(&self, changeset: i64) -> Result<(), PlasticError> {
        if let Ok(mut switches) = self.switches.lock() {
            switches.push(changeset);
        }
        Ok(())
    }
}
