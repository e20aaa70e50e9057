//! The migration driver: replays a [`History`] into the destination, one
//! changeset at a time.
//!
//! Only an unreadable or invalid history stops a run. Every per-changeset
//! problem is recorded in the [`MigrationReport`] and the run moves on.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::branch::BranchResolver;
use crate::commit::CommitEmitter;
use crate::config::{AuthorConfig, CommitFormatConfig, MigrationConfig, ReplayStrategy};
use crate::errors::{CoreError, HistoryError, ReplayError};
use crate::git::{DestinationVcs, GitClient};
use crate::history::History;
use crate::message::CommitFormatter;
use crate::models::{BranchTransition, Changeset, ChangesetResult, ChangesetStatus, MigrationReport, RunState};
use crate::plastic::{ContentProvider, PlasticClient};
use crate::reconcile::Reconciler;

/// Progress hooks. The core never prints; callers that want output
/// implement this.
pub trait MigrationObserver {
    fn on_start(&mut self, _history: &History) {}
    fn on_changeset(&mut self, _result: &ChangesetResult) {}
    fn on_finish(&mut self, _report: &MigrationReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}

/// The parts of the configuration the replay itself needs.
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub strategy: ReplayStrategy,
    pub author: AuthorConfig,
    pub commit_format: CommitFormatConfig,
}

impl From<&MigrationConfig> for ReplaySettings {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            strategy: config.migration.strategy,
            author: config.author.clone(),
            commit_format: config.commit_format.clone(),
        }
    }
}

/// Open (or create) the repository at the configured work dir and replay the
/// configured history into it, reading content through `cm`.
#[instrument(skip_all, fields(work_dir = %config.migration.work_dir.display()))]
pub async fn migrate<O: MigrationObserver>(
    config: &MigrationConfig,
    observer: &mut O,
) -> Result<MigrationReport, CoreError> {
    let work_dir = &config.migration.work_dir;
    let git = GitClient::open_or_init(work_dir)?;
    let plastic =
        PlasticClient::new(&config.plastic.cm_binary, work_dir).with_timeout(config.plastic.timeout());

    let mut migration = Migration::new(ReplaySettings::from(config), plastic, git);
    let report = migration
        .run(&config.migration.history_path(), observer)
        .await?;
    Ok(report)
}

/// One migration run over a source provider and a destination repository.
pub struct Migration<P, D> {
    provider: P,
    vcs: D,
    strategy: ReplayStrategy,
    formatter: CommitFormatter,
    emitter: CommitEmitter,
    state: RunState,
}

impl<P: ContentProvider, D: DestinationVcs> Migration<P, D> {
    pub fn new(settings: ReplaySettings, provider: P, vcs: D) -> Self {
        Self {
            provider,
            vcs,
            strategy: settings.strategy,
            formatter: CommitFormatter::new(&settings.commit_format),
            emitter: CommitEmitter::new(&settings.author),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn vcs(&self) -> &D {
        &self.vcs
    }

    fn transition(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "migration state");
        self.state = next;
    }

    /// Read the history at `history_path` and replay it.
    pub async fn run<O: MigrationObserver>(
        &mut self,
        history_path: &Path,
        observer: &mut O,
    ) -> Result<MigrationReport, HistoryError> {
        self.transition(RunState::Reading);
        let history = History::load(history_path).inspect_err(|e| {
            warn!(error = %e, "history could not be read, nothing was migrated");
        })?;
        info!(
            changesets = history.len(),
            first = ?history.first_id(),
            last = ?history.last_id(),
            "history loaded"
        );
        Ok(self.replay(&history, observer).await)
    }

    /// Replay every changeset of `history` in order.
    pub async fn replay<O: MigrationObserver>(
        &mut self,
        history: &History,
        observer: &mut O,
    ) -> MigrationReport {
        self.transition(RunState::Replaying);
        observer.on_start(history);

        let total = history.len();
        let mut report = MigrationReport {
            total,
            ..MigrationReport::default()
        };
        let mut resolver = BranchResolver::starting_on(self.checked_out_branch());
        let mut reconciler = Reconciler::new(self.vcs.workdir());

        for (i, changeset) in history.iter().enumerate() {
            let result = self
                .replay_changeset(i + 1, total, changeset, &mut resolver, &mut reconciler)
                .await;
            observer.on_changeset(&result);
            report.record(result);
        }

        self.transition(RunState::Summarizing);
        report.branches_created = resolver.created().clone();
        report.branches_visited = resolver.visited().clone();
        match self.vcs.list_branches() {
            Ok(branches) => report.destination_branches = branches,
            Err(e) => warn!(error = %e, "could not list destination branches"),
        }
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            branches_created = report.branches_created.len(),
            "migration finished"
        );

        self.transition(RunState::Done);
        observer.on_finish(&report);
        report
    }

    /// The existing branch the destination already has checked out. An
    /// unborn HEAD does not count, its branch still has to be created.
    fn checked_out_branch(&self) -> Option<String> {
        let current = match self.vcs.current_branch() {
            Ok(current) => current?,
            Err(e) => {
                warn!(error = %e, "could not read the checked-out branch");
                return None;
            }
        };
        match self.vcs.branch_exists(&current) {
            Ok(true) => {
                debug!(branch = %current, "continuing on checked-out branch");
                Some(current)
            }
            Ok(false) => None,
            Err(e) => {
                warn!(branch = %current, error = %e, "could not inspect checked-out branch");
                None
            }
        }
    }

    async fn replay_changeset(
        &self,
        index: usize,
        total: usize,
        changeset: &Changeset,
        resolver: &mut BranchResolver,
        reconciler: &mut Reconciler,
    ) -> ChangesetResult {
        let mut result = ChangesetResult {
            index,
            total,
            changeset_id: changeset.id,
            source_branch: changeset.branch.clone(),
            destination_branch: None,
            transition: None,
            message: None,
            status: ChangesetStatus::Failed {
                reason: String::new(),
            },
            files_written: 0,
            files_removed: 0,
            warnings: Vec::new(),
        };

        let outcome = self
            .apply_changeset(changeset, resolver, reconciler, &mut result)
            .await;
        result.status = match outcome {
            Ok(sha) => ChangesetStatus::Committed { sha },
            Err(e) => {
                warn!(changeset = changeset.id, error = %e, "changeset failed");
                ChangesetStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        result
    }

    #[instrument(skip_all, fields(changeset = changeset.id, branch = %changeset.branch))]
    async fn apply_changeset(
        &self,
        changeset: &Changeset,
        resolver: &mut BranchResolver,
        reconciler: &mut Reconciler,
        result: &mut ChangesetResult,
    ) -> Result<String, ReplayError> {
        let (branch, transition) = resolver.ensure_active(&self.vcs, &changeset.branch)?;
        if let BranchTransition::Created { from } = &transition {
            reconciler.fork(from.as_deref(), &branch);
        }
        result.destination_branch = Some(branch.clone());
        result.transition = Some(transition);

        let reconciled = match self.strategy {
            ReplayStrategy::PerFile => {
                let reconciled = reconciler
                    .reconcile(&self.provider, &self.vcs, &branch, changeset)
                    .await?;
                result.files_written = reconciled.written;
                result.files_removed = reconciled.removed;
                result.warnings = reconciled.warnings.clone();
                Some(reconciled)
            }
            ReplayStrategy::Switch => {
                self.provider
                    .switch_workspace(changeset.id)
                    .await
                    .map_err(|source| ReplayError::WorkspaceSwitchFailed {
                        changeset: changeset.id,
                        source,
                    })?;
                None
            }
        };

        let message = self.formatter.format(changeset);
        result.message = Some(message.clone());

        match self.emitter.emit(&self.vcs, changeset, &message) {
            Ok(sha) => {
                if let Some(reconciled) = reconciled {
                    reconciler.commit_tree(&branch, reconciled.next);
                }
                Ok(sha)
            }
            Err(e) => {
                if let Some(reconciled) = &reconciled {
                    reconciler.forget(&branch, &reconciled.touched);
                }
                Err(e)
            }
        }
    }
}
