//! Making the working tree match a changeset.
//!
//! The work is split so that the decisions are pure:
//!
//! 1. [`plan_changes`] turns history items into normalized fetch/remove ops.
//! 2. [`Reconciler::reconcile`] resolves fetches through a
//!    [`ContentProvider`].
//! 3. [`TreeState::reconcile`] folds the resolved ops into the next tree and
//!    diffs it against the previous one.
//! 4. [`apply_fs_ops`] performs the resulting writes and removals on disk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::errors::ReplayError;
use crate::git::DestinationVcs;
use crate::models::{ChangeKind, Changeset, FileChange};
use crate::plastic::ContentProvider;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// A working-tree operation derived from one history item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedOp {
    /// Retrieve `source_path` (as recorded) and place it at `path`.
    Fetch { source_path: String, path: String },
    Remove { path: String },
}

/// Normalize a recorded path into a path relative to the working tree root.
///
/// Leading separators are stripped, `\` becomes `/` and `.` components are
/// dropped. Empty paths, `..` components and anything inside `.git` are
/// rejected.
pub fn normalize_path(raw: &str) -> Result<String, String> {
    let unified = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(format!("path '{}' escapes the working tree", raw)),
            p if p.eq_ignore_ascii_case(".git") => {
                return Err(format!("path '{}' points into .git", raw))
            }
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(format!("path '{}' is empty", raw));
    }
    Ok(parts.join("/"))
}

/// Translate history items into ordered working-tree operations.
///
/// Moves become a removal of the origin followed by a fetch of the
/// destination. Items with unusable paths are skipped and reported.
pub fn plan_changes(changes: &[FileChange]) -> (Vec<PlannedOp>, Vec<String>) {
    let mut ops = Vec::with_capacity(changes.len());
    let mut warnings = Vec::new();

    let mut push = |op: Result<PlannedOp, String>| match op {
        Ok(op) => ops.push(op),
        Err(reason) => {
            warn!(%reason, "skipping change");
            warnings.push(reason);
        }
    };

    for change in changes {
        let fetch = |raw: &str| {
            normalize_path(raw).map(|path| PlannedOp::Fetch {
                source_path: raw.to_string(),
                path,
            })
        };
        let remove = |raw: &str| normalize_path(raw).map(|path| PlannedOp::Remove { path });

        match change.kind {
            ChangeKind::Added | ChangeKind::Changed => push(fetch(change.dst_path.as_str())),
            ChangeKind::Deleted => push(remove(change.dst_path.as_str())),
            ChangeKind::Moved => {
                if let Some(src) = &change.src_path {
                    push(remove(src.as_str()));
                }
                push(fetch(change.dst_path.as_str()));
            }
        }
    }

    (ops, warnings)
}

// ---------------------------------------------------------------------------
// Tree model
// ---------------------------------------------------------------------------

/// A planned op after content retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOp {
    Write { path: String, content: Vec<u8> },
    Remove { path: String },
    /// Content could not be retrieved; the path is left as it is.
    Unavailable { path: String },
}

/// A filesystem mutation the working tree needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    Write { path: String, content: Vec<u8> },
    Remove { path: String },
}

impl FsOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Write { path, .. } | Self::Remove { path } => path,
        }
    }
}

/// SHA-256 hex digest used to compare file contents.
pub fn content_digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Known content of one branch's working tree: path → content digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeState {
    files: BTreeMap<String, String>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn digest(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Fold `ops` (in order) into the next tree and work out which files
    /// have to change on disk.
    ///
    /// Only paths touched by a write or removal are considered. Removals come
    /// first, then writes of new or changed content.
    pub fn reconcile(&self, ops: Vec<ResolvedOp>) -> (TreeState, Vec<FsOp>) {
        let mut next = self.clone();
        let mut touched = BTreeSet::new();
        let mut contents: HashMap<String, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                ResolvedOp::Write { path, content } => {
                    next.files.insert(path.clone(), content_digest(&content));
                    touched.insert(path.clone());
                    contents.insert(path, content);
                }
                ResolvedOp::Remove { path } => {
                    // Files written earlier in this changeset land after the
                    // removal on disk, so they stay.
                    for nested in next.nested(&path) {
                        if !contents.contains_key(&nested) {
                            next.files.remove(&nested);
                        }
                    }
                    next.files.remove(&path);
                    contents.remove(&path);
                    touched.insert(path);
                }
                ResolvedOp::Unavailable { .. } => {}
            }
        }

        let removed: Vec<String> = touched
            .iter()
            .filter(|path| !next.files.contains_key(*path))
            .cloned()
            .collect();

        let mut writes = Vec::new();
        for path in touched {
            let Some(digest) = next.files.get(&path) else {
                continue;
            };
            // A removed ancestor directory takes this file off disk too.
            let wiped = removed.iter().any(|dir| is_within(&path, dir));
            if wiped || self.digest(&path) != Some(digest.as_str()) {
                if let Some(content) = contents.remove(&path) {
                    writes.push(FsOp::Write { path, content });
                }
            }
        }

        let mut ops: Vec<FsOp> = removed
            .into_iter()
            .map(|path| FsOp::Remove { path })
            .collect();
        ops.extend(writes);
        (next, ops)
    }

    /// Drop `paths` and anything below them, so their on-disk content is
    /// treated as unknown.
    pub fn forget<'a>(&mut self, paths: impl IntoIterator<Item = &'a str>) {
        for path in paths {
            self.remove_subtree(path);
        }
    }

    /// Remove `path` and every entry nested under it as a directory.
    fn remove_subtree(&mut self, path: &str) {
        for key in self.nested(path) {
            self.files.remove(&key);
        }
        self.files.remove(path);
    }

    /// Entries below `path` when it is treated as a directory.
    fn nested(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Whether `path` lies strictly below the directory `dir`.
fn is_within(path: &str, dir: &str) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

// ---------------------------------------------------------------------------
// Applying
// ---------------------------------------------------------------------------

/// Counts and warnings from [`apply_fs_ops`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub written: usize,
    pub removed: usize,
    pub warnings: Vec<String>,
}

/// Perform `ops` under `root`.
///
/// Removed paths are also dropped from the destination index; failing to
/// do so is only a warning since staging picks the deletion up anyway.
pub fn apply_fs_ops<D: DestinationVcs>(
    root: &Path,
    ops: &[FsOp],
    vcs: &D,
) -> Result<Applied, ReplayError> {
    let mut applied = Applied::default();

    for op in ops {
        let full = root.join(op.path());
        let io_err = |source| ReplayError::ReconcileFailed {
            path: op.path().to_string(),
            source,
        };

        match op {
            FsOp::Write { path, content } => {
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).map_err(io_err)?;
                }
                std::fs::write(&full, content).map_err(io_err)?;
                debug!(path = %path, bytes = content.len(), "wrote file");
                applied.written += 1;
            }
            FsOp::Remove { path } => {
                if full.is_dir() {
                    std::fs::remove_dir_all(&full).map_err(io_err)?;
                } else if full.exists() {
                    std::fs::remove_file(&full).map_err(io_err)?;
                }
                if let Err(e) = vcs.remove_from_index(path) {
                    warn!(path = %path, error = %e, "could not drop path from index");
                    applied
                        .warnings
                        .push(format!("could not drop '{}' from index: {}", path, e));
                }
                debug!(path = %path, "removed file");
                applied.removed += 1;
            }
        }
    }

    Ok(applied)
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Result of reconciling one changeset, before its commit.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    /// Tree to adopt once the commit succeeds.
    pub next: TreeState,
    /// Paths whose on-disk state was changed.
    pub touched: Vec<String>,
    pub written: usize,
    pub removed: usize,
    pub warnings: Vec<String>,
}

/// Per-branch tree states over one working directory.
#[derive(Debug)]
pub struct Reconciler {
    root: PathBuf,
    trees: HashMap<String, TreeState>,
}

impl Reconciler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            trees: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree(&self, branch: &str) -> Option<&TreeState> {
        self.trees.get(branch)
    }

    /// Start `to` from a copy of `from`'s tree (or an empty tree).
    pub fn fork(&mut self, from: Option<&str>, to: &str) {
        let tree = from
            .and_then(|f| self.trees.get(f))
            .cloned()
            .unwrap_or_default();
        debug!(from = ?from, to, files = tree.len(), "forked tree state");
        self.trees.insert(to.to_string(), tree);
    }

    /// Bring the working tree (currently on `branch`) in line with
    /// `changeset`.
    ///
    /// Missing content is a warning, not a failure. A local I/O failure
    /// fails the whole changeset.
    #[instrument(skip(self, provider, vcs, changeset), fields(changeset = changeset.id))]
    pub async fn reconcile<P: ContentProvider, D: DestinationVcs>(
        &mut self,
        provider: &P,
        vcs: &D,
        branch: &str,
        changeset: &Changeset,
    ) -> Result<Reconciled, ReplayError> {
        let (planned, mut warnings) = plan_changes(&changeset.changes);

        let mut resolved = Vec::with_capacity(planned.len());
        for op in planned {
            match op {
                PlannedOp::Remove { path } => resolved.push(ResolvedOp::Remove { path }),
                PlannedOp::Fetch { source_path, path } => {
                    match provider.retrieve(&source_path, changeset.id).await {
                        Ok(content) => resolved.push(ResolvedOp::Write { path, content }),
                        Err(source) => {
                            let err = ReplayError::ContentRetrievalFailed {
                                path: source_path,
                                changeset: changeset.id,
                                source,
                            };
                            warn!(error = %err, "content unavailable, leaving path untouched");
                            warnings.push(err.to_string());
                            resolved.push(ResolvedOp::Unavailable { path });
                        }
                    }
                }
            }
        }

        let prev = self.trees.get(branch).cloned().unwrap_or_default();
        let (next, fs_ops) = prev.reconcile(resolved);
        let touched: Vec<String> = fs_ops.iter().map(|op| op.path().to_string()).collect();

        let applied = match apply_fs_ops(&self.root, &fs_ops, vcs) {
            Ok(applied) => applied,
            Err(e) => {
                self.forget(branch, &touched);
                return Err(e);
            }
        };
        warnings.extend(applied.warnings);

        info!(
            written = applied.written,
            removed = applied.removed,
            warnings = warnings.len(),
            "reconciled working tree"
        );

        Ok(Reconciled {
            next,
            touched,
            written: applied.written,
            removed: applied.removed,
            warnings,
        })
    }

    /// Adopt `tree` for `branch` after its commit succeeded.
    pub fn commit_tree(&mut self, branch: &str, tree: TreeState) {
        self.trees.insert(branch.to_string(), tree);
    }

    /// Treat `paths` on `branch` as unknown after a failed changeset, so the
    /// next one writes them again.
    pub fn forget(&mut self, branch: &str, paths: &[String]) {
        if let Some(tree) = self.trees.get_mut(branch) {
            tree.forget(paths.iter().map(String::as_str));
        }
    }
}
