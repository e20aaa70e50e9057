//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{BranchType, ErrorCode, IndexAddOption, Repository, Signature, Time};
use tracing::{debug, info, instrument};

use super::{CommitRequest, DestinationVcs};
use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    workdir: PathBuf,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Self::from_repo(repo, path)
    }

    /// Initialise a new repository at `path`.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        info!(path = %path.display(), "initialising git repository");
        let repo = Repository::init(path)?;
        Self::from_repo(repo, path)
    }

    /// Open the repository at `path`, initialising one if none exists.
    pub fn open_or_init<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        match Self::new(path) {
            Ok(client) => Ok(client),
            Err(GitError::RepositoryNotFound(_)) => Self::init(path),
            Err(e) => Err(e),
        }
    }

    fn from_repo(repo: Repository, path: &Path) -> Result<Self, GitError> {
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::BareRepository(path.display().to_string()))?;
        Ok(Self { repo, workdir })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Return the SHA of HEAD.
    pub fn get_head_sha(&self) -> Result<String, GitError> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }
}

impl DestinationVcs for GitClient {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn current_branch(&self) -> Result<Option<String>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(head.shorthand().map(str::to_string)),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    fn create_branch(&self, name: &str) -> Result<(), GitError> {
        let refname = format!("refs/heads/{}", name);
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit()?;
                self.repo.branch(name, &commit, false)?;
                // Same commit as before, so the working tree already matches.
                self.repo.set_head(&refname)?;
                info!(name, from = %commit.id(), "created branch");
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                self.repo.set_head(&refname)?;
                info!(name, "created initial branch");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        let refname = format!("refs/heads/{}", name);
        let target = self.repo.revparse_single(&refname)?;
        self.repo
            .checkout_tree(&target, Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head(&refname)?;
        info!(name, "checked out branch");
        Ok(())
    }

    fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        // add_all never drops entries for files that vanished from disk.
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        debug!(entries = index.len(), "staged working tree");
        Ok(())
    }

    fn remove_from_index(&self, path: &str) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.remove_path(Path::new(path))?;
        index.remove_dir(Path::new(path), 0)?;
        index.write()?;
        debug!(path, "removed from index");
        Ok(())
    }

    #[instrument(skip(self, request), fields(when = %request.when))]
    fn commit(&self, request: &CommitRequest) -> Result<String, GitError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let when = Time::new(
            request.when.timestamp(),
            request.when.offset().local_minus_utc() / 60,
        );
        let author = Signature::new(&request.author_name, &request.author_email, &when)?;
        let committer = Signature::now(&request.author_name, &request.author_email)?;

        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
        let oid = self.repo.commit(
            Some("HEAD"),
            &author,
            &committer,
            &request.message,
            &tree,
            &parents,
        )?;
        info!(sha = %oid, "created commit");
        Ok(oid.to_string())
    }

    fn list_branches(&self) -> Result<Vec<String>, GitError> {
        let branches = self.repo.branches(Some(BranchType::Local))?;
        let mut names = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
