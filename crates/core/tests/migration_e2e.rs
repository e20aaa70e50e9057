//! End-to-end tests for replaying a Plastic history into Git.
//!
//! These tests exercise the real `Migration` driver with:
//! - Real Git repositories via `git2` in temporary directories
//! - History documents written to disk and parsed from XML
//! - An in-memory content provider standing in for `cm`
//!
//! No `cm` binary is needed.

use std::path::Path;

use git2::{Repository, Sort};
use tempfile::TempDir;

use plastigit_core::config::{AuthorConfig, CommitFormatConfig, ReplayStrategy};
use plastigit_core::driver::{Migration, NoopObserver, ReplaySettings};
use plastigit_core::errors::{GitError, HistoryError};
use plastigit_core::git::{CommitRequest, DestinationVcs, GitClient};
use plastigit_core::history::parse_history;
use plastigit_core::models::{BranchTransition, MigrationReport};
use plastigit_core::plastic::MemoryProvider;

// ===========================================================================
// Helpers
// ===========================================================================

fn settings() -> ReplaySettings {
    ReplaySettings {
        strategy: ReplayStrategy::PerFile,
        author: AuthorConfig {
            name: "Migration Bot".into(),
            email: "bot@example.com".into(),
        },
        commit_format: CommitFormatConfig::default(),
    }
}

/// One `<Changeset>` element. `items` is raw `<Item>` markup.
fn changeset_xml(id: i64, branch: &str, comment: &str, items: &str) -> String {
    format!(
        "  <Changeset>\n    <ChangesetId>{id}</ChangesetId>\n    <Branch>{branch}</Branch>\n    \
         <Comment>{comment}</Comment>\n    <Owner>someone</Owner>\n    \
         <Date>2024-02-{day:02}T09:30:00+01:00</Date>\n    <Changes>{items}</Changes>\n  </Changeset>\n",
        day = id.clamp(1, 28),
    )
}

fn item(kind: &str, dst: &str) -> String {
    format!("<Item><Type>{kind}</Type><DstCmPath>{dst}</DstCmPath></Item>")
}

fn moved(src: &str, dst: &str) -> String {
    format!("<Item><Type>Moved</Type><SrcCmPath>{src}</SrcCmPath><DstCmPath>{dst}</DstCmPath></Item>")
}

fn log_xml(changesets: &[String]) -> String {
    format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<LogList>\n{}</LogList>\n", changesets.concat())
}

/// Workspace directory plus a separate directory for the history file.
struct Fixture {
    workspace: TempDir,
    exports: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            workspace: TempDir::new().unwrap(),
            exports: TempDir::new().unwrap(),
        }
    }

    fn write_history(&self, xml: &str) -> std::path::PathBuf {
        let path = self.exports.path().join("PLASTIC_SCM_HISTORY.xml");
        std::fs::write(&path, xml).unwrap();
        path
    }

    fn git(&self) -> GitClient {
        GitClient::open_or_init(self.workspace.path()).unwrap()
    }

    fn root(&self) -> &Path {
        self.workspace.path()
    }
}

async fn migrate<D: DestinationVcs>(
    fixture: &Fixture,
    xml: &str,
    provider: MemoryProvider,
    vcs: D,
) -> MigrationReport {
    let path = fixture.write_history(xml);
    let mut migration = Migration::new(settings(), provider, vcs);
    migration
        .run(&path, &mut NoopObserver)
        .await
        .expect("history should load")
}

/// Commit messages reachable from `branch`, oldest first.
fn messages(repo: &Repository, branch: &str) -> Vec<String> {
    let mut walk = repo.revwalk().unwrap();
    walk.push_ref(&format!("refs/heads/{}", branch)).unwrap();
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE).unwrap();
    walk.map(|oid| {
        let commit = repo.find_commit(oid.unwrap()).unwrap();
        commit.message().unwrap_or_default().to_string()
    })
    .collect()
}

fn file_at(repo: &Repository, branch: &str, path: &str) -> Option<Vec<u8>> {
    let tree = repo
        .find_branch(branch, git2::BranchType::Local)
        .unwrap()
        .get()
        .peel_to_tree()
        .unwrap();
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(blob.content().to_vec())
}

/// Content of `path` in the commit on `branch` whose message is `message`.
fn file_in_commit(repo: &Repository, branch: &str, message: &str, path: &str) -> Option<Vec<u8>> {
    let mut walk = repo.revwalk().unwrap();
    walk.push_ref(&format!("refs/heads/{}", branch)).unwrap();
    let commit = walk
        .map(|oid| repo.find_commit(oid.unwrap()).unwrap())
        .find(|c| c.message() == Some(message))
        .unwrap();
    let entry = commit.tree().unwrap().get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(blob.content().to_vec())
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_replays_in_ascending_order_regardless_of_input_order() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(3, "/main", "third", ""),
        changeset_xml(1, "/main", "first", ""),
        changeset_xml(2, "/main", "second", ""),
    ]);

    let report = migrate(&fixture, &xml, MemoryProvider::new(), fixture.git()).await;
    assert_eq!(report.succeeded, 3);
    let ids: Vec<i64> = report.results.iter().map(|r| r.changeset_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(messages(&repo, "main"), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_empty_changeset_becomes_one_empty_commit() {
    let fixture = Fixture::new();
    let xml = log_xml(&[changeset_xml(7, "/main", "", "")]);

    let report = migrate(&fixture, &xml, MemoryProvider::new(), fixture.git()).await;
    assert_eq!(report.succeeded, 1);

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(messages(&repo, "main"), vec!["Update (changeset 7)"]);
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.tree().unwrap().len(), 0);
    assert_eq!(head.author().name(), Some("Migration Bot"));
    assert_eq!(head.author().when().offset_minutes(), 60);
}

#[tokio::test]
async fn test_move_relocates_file() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(1, "/main", "add", &item("Added", "/a/old.txt")),
        changeset_xml(2, "/main", "", &moved("/a/old.txt", "/b/new.txt")),
    ]);
    let provider = MemoryProvider::new()
        .with("/a/old.txt", 1, "original")
        .with("/b/new.txt", 2, "moved content");

    let report = migrate(&fixture, &xml, provider, fixture.git()).await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.results[1].message.as_deref(), Some("Move 1 file(s)"));

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(file_at(&repo, "main", "a/old.txt"), None);
    assert_eq!(
        file_at(&repo, "main", "b/new.txt").as_deref(),
        Some(&b"moved content"[..])
    );
    assert!(!fixture.root().join("a/old.txt").exists());
}

#[tokio::test]
async fn test_directory_delete_then_readd_with_same_content() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(
            1,
            "/main",
            "add dir",
            &[item("Added", "/dir/a.txt"), item("Added", "/dir/sub/b.txt")].concat(),
        ),
        changeset_xml(2, "/main", "drop dir", &item("Deleted", "/dir")),
        changeset_xml(3, "/main", "restore", &item("Added", "/dir/a.txt")),
    ]);
    let provider = MemoryProvider::new()
        .with("/dir/a.txt", 1, "x")
        .with("/dir/sub/b.txt", 1, "y")
        .with("/dir/a.txt", 3, "x");

    let report = migrate(&fixture, &xml, provider, fixture.git()).await;
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.results[1].files_removed, 1);
    assert_eq!(report.results[2].files_written, 1);

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(file_in_commit(&repo, "main", "drop dir", "dir/a.txt"), None);
    assert_eq!(file_in_commit(&repo, "main", "drop dir", "dir/sub/b.txt"), None);
    assert_eq!(
        file_in_commit(&repo, "main", "restore", "dir/a.txt").as_deref(),
        Some(&b"x"[..])
    );
    assert_eq!(file_at(&repo, "main", "dir/sub/b.txt"), None);
    assert_eq!(std::fs::read(fixture.root().join("dir/a.txt")).unwrap(), b"x");
}

#[tokio::test]
async fn test_directory_move_drops_children() {
    // A moved directory arrives as one item; its content cannot be fetched as
    // a file, so the origin subtree is removed and nothing appears at the
    // destination.
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(
            1,
            "/main",
            "add",
            &[item("Added", "/old/a.txt"), item("Added", "/old/b.txt")].concat(),
        ),
        changeset_xml(2, "/main", "", &moved("/old", "/new")),
    ]);
    let provider = MemoryProvider::new()
        .with("/old/a.txt", 1, "a")
        .with("/old/b.txt", 1, "b");

    let report = migrate(&fixture, &xml, provider, fixture.git()).await;
    assert_eq!(report.succeeded, 2);
    let result = &report.results[1];
    assert_eq!(result.message.as_deref(), Some("Move 1 file(s)"));
    assert_eq!(result.files_removed, 1);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("/new"));

    let repo = Repository::open(fixture.root()).unwrap();
    for path in ["old/a.txt", "old/b.txt", "new/a.txt", "new/b.txt"] {
        assert_eq!(file_at(&repo, "main", path), None, "{} still present", path);
    }
    assert!(!fixture.root().join("old").exists());
    assert!(!fixture.root().join("new").exists());
}

#[tokio::test]
async fn test_retrieval_failure_is_a_warning() {
    let fixture = Fixture::new();
    let items = [
        item("Added", "/one.txt"),
        item("Added", "/two.txt"),
        item("Added", "/three.txt"),
    ]
    .concat();
    let xml = log_xml(&[changeset_xml(1, "/main", "", &items)]);
    let provider = MemoryProvider::new()
        .with("/one.txt", 1, "1")
        .with("/three.txt", 1, "3");

    let report = migrate(&fixture, &xml, provider, fixture.git()).await;
    assert_eq!(report.succeeded, 1);
    let result = &report.results[0];
    assert_eq!(result.files_written, 2);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("/two.txt"));
    assert_eq!(result.message.as_deref(), Some("Add 3 file(s)"));

    let repo = Repository::open(fixture.root()).unwrap();
    assert!(file_at(&repo, "main", "one.txt").is_some());
    assert!(file_at(&repo, "main", "two.txt").is_none());
    assert!(file_at(&repo, "main", "three.txt").is_some());
}

/// Real repository whose commit fails for one message.
struct FailingCommit {
    inner: GitClient,
    fail_message: &'static str,
}

impl DestinationVcs for FailingCommit {
    fn workdir(&self) -> &Path {
        self.inner.workdir()
    }
    fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        self.inner.branch_exists(name)
    }
    fn current_branch(&self) -> Result<Option<String>, GitError> {
        self.inner.current_branch()
    }
    fn create_branch(&self, name: &str) -> Result<(), GitError> {
        self.inner.create_branch(name)
    }
    fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        self.inner.checkout_branch(name)
    }
    fn stage_all(&self) -> Result<(), GitError> {
        self.inner.stage_all()
    }
    fn remove_from_index(&self, path: &str) -> Result<(), GitError> {
        self.inner.remove_from_index(path)
    }
    fn commit(&self, request: &CommitRequest) -> Result<String, GitError> {
        if request.message == self.fail_message {
            return Err(GitError::Git2Error(git2::Error::from_str("disk full")));
        }
        self.inner.commit(request)
    }
    fn list_branches(&self) -> Result<Vec<String>, GitError> {
        self.inner.list_branches()
    }
}

#[tokio::test]
async fn test_commit_failure_does_not_stop_the_run() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(1, "/main", "one", &item("Added", "/f.txt")),
        changeset_xml(2, "/main", "boom", &item("Changed", "/f.txt")),
        changeset_xml(3, "/main", "three", &item("Changed", "/f.txt")),
    ]);
    let provider = MemoryProvider::new()
        .with("/f.txt", 1, "v1")
        .with("/f.txt", 2, "v2")
        .with("/f.txt", 3, "v1");
    let vcs = FailingCommit {
        inner: fixture.git(),
        fail_message: "boom",
    };

    let report = migrate(&fixture, &xml, provider, vcs).await;
    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(report.results[1]
        .failure_reason()
        .unwrap()
        .contains("commit for cs:2 failed"));

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(messages(&repo, "main"), vec!["one", "three"]);
    // cs:3 restores the cs:1 content even though cs:2 left v2 on disk.
    assert_eq!(file_at(&repo, "main", "f.txt").as_deref(), Some(&b"v1"[..]));
}

#[tokio::test]
async fn test_branch_topology() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(1, "/main", "base", &item("Added", "/a.txt")),
        changeset_xml(2, "/main/feature-x", "feature", &item("Added", "/b.txt")),
        changeset_xml(3, "/main", "mainline", &item("Added", "/c.txt")),
        changeset_xml(4, "/main/feature-x", "feature again", &item("Changed", "/a.txt")),
    ]);
    let provider = MemoryProvider::new()
        .with("/a.txt", 1, "a1")
        .with("/a.txt", 4, "a4")
        .with("/b.txt", 2, "b")
        .with("/c.txt", 3, "c");

    let report = migrate(&fixture, &xml, provider, fixture.git()).await;
    assert_eq!(report.succeeded, 4);
    assert_eq!(
        report.destination_branches,
        vec!["main".to_string(), "main-feature-x".to_string()]
    );
    assert_eq!(report.branches_created.len(), 2);
    assert_eq!(
        report.results[1].transition,
        Some(BranchTransition::Created {
            from: Some("main".into())
        })
    );
    assert_eq!(report.results[2].transition, Some(BranchTransition::Switched));

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(messages(&repo, "main"), vec!["base", "mainline"]);
    assert_eq!(
        messages(&repo, "main-feature-x"),
        vec!["base", "feature", "feature again"]
    );
    assert!(file_at(&repo, "main", "b.txt").is_none());
    assert!(file_at(&repo, "main-feature-x", "c.txt").is_none());
    assert_eq!(file_at(&repo, "main", "a.txt").as_deref(), Some(&b"a1"[..]));
    assert_eq!(
        file_at(&repo, "main-feature-x", "a.txt").as_deref(),
        Some(&b"a4"[..])
    );
}

#[tokio::test]
async fn test_rerun_duplicates_commits() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(1, "/main", "first", &item("Added", "/a.txt")),
        changeset_xml(2, "/main", "second", ""),
    ]);
    let provider = || MemoryProvider::new().with("/a.txt", 1, "a");

    let first = migrate(&fixture, &xml, provider(), fixture.git()).await;
    assert_eq!(first.succeeded, 2);
    let second = migrate(&fixture, &xml, provider(), fixture.git()).await;
    assert_eq!(second.succeeded, 2);
    // The second run found the branch instead of creating it.
    assert!(second.branches_created.is_empty());

    let repo = Repository::open(fixture.root()).unwrap();
    assert_eq!(
        messages(&repo, "main"),
        vec!["first", "second", "first", "second"]
    );
}

#[tokio::test]
async fn test_switch_strategy_switches_workspace_per_changeset() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(5, "/main", "five", &item("Added", "/ignored.txt")),
        changeset_xml(9, "/main", "nine", ""),
    ]);
    let path = fixture.write_history(&xml);
    let mut migration = Migration::new(
        ReplaySettings {
            strategy: ReplayStrategy::Switch,
            ..settings()
        },
        MemoryProvider::new(),
        fixture.git(),
    );

    let report = migration.run(&path, &mut NoopObserver).await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(migration.provider().switched(), vec![5, 9]);
}

#[tokio::test]
async fn test_branch_name_collision_aborts_before_any_commit() {
    let fixture = Fixture::new();
    let xml = log_xml(&[
        changeset_xml(1, "/a-b", "one", ""),
        changeset_xml(2, "/a/b", "two", ""),
    ]);
    assert!(matches!(
        parse_history(&xml),
        Err(HistoryError::BranchNameCollision { ref name, .. }) if name == "a-b"
    ));

    let path = fixture.write_history(&xml);
    let mut migration = Migration::new(settings(), MemoryProvider::new(), fixture.git());
    let err = migration.run(&path, &mut NoopObserver).await.unwrap_err();
    assert!(matches!(err, HistoryError::BranchNameCollision { .. }));
    assert!(migration.vcs().get_head_sha().is_err());
}

#[tokio::test]
async fn test_malformed_history_is_fatal() {
    let fixture = Fixture::new();
    let path = fixture.write_history("<LogList><Changeset><ChangesetId>1</ChangesetId></LogList>");
    let mut migration = Migration::new(settings(), MemoryProvider::new(), fixture.git());
    assert!(migration.run(&path, &mut NoopObserver).await.is_err());
    assert!(migration.vcs().list_branches().unwrap().is_empty());
}
