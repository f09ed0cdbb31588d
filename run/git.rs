use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bstr::ByteSlice;

use super::{ChangeEvent, ChangeLog, ChangeLogEntry, RepositorySource, RunContext, GIT_SCM};
use crate::{pull_request::PULL_REQUEST_BRANCH_PREFIX, Result};

static PULL_REQUEST_EVENT: ChangeEvent = ChangeEvent::PullRequest;

/// A run over a local git checkout.
///
/// With a `to_ref`, every commit reachable from `to_ref` but not from
/// `from_ref` becomes one change log entry, oldest first. Without one, the
/// working tree (index and untracked files included) is diffed against
/// `from_ref` as a single entry.
#[derive(Debug)]
pub struct GitRun {
    workspace: PathBuf,
    commits: ChangeEvent,
    branch: Option<String>,
    repository_source: Option<RepositorySource>,
    cancelled: Arc<AtomicBool>,
}

impl GitRun {
    pub fn new(
        repository: &git2::Repository,
        from_ref: Option<&str>,
        to_ref: Option<&str>,
    ) -> Result<Self> {
        let workspace = repository
            .workdir()
            .ok_or_else(|| git2::Error::from_str("bare repositories are not supported"))?
            .canonicalize()?;

        let change_log = change_log(repository, from_ref, to_ref)?;
        tracing::debug!(
            entries = change_log.entries.len(),
            from_ref = from_ref.unwrap_or("HEAD"),
            to_ref = to_ref.unwrap_or("<working tree>"),
            "Collected git change log"
        );

        Ok(Self {
            workspace,
            commits: ChangeEvent::Commit(vec![change_log]),
            branch: None,
            repository_source: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_repository_source(mut self, source: Option<RepositorySource>) -> Self {
        self.repository_source = source;
        self
    }

    /// The flag that cancels this run once set.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn is_pull_request(&self) -> bool {
        self.repository_source.is_some()
            && self
                .branch
                .as_deref()
                .is_some_and(|branch| branch.starts_with(PULL_REQUEST_BRANCH_PREFIX))
    }
}

impl RunContext for GitRun {
    fn change_event(&self) -> &ChangeEvent {
        if self.is_pull_request() {
            &PULL_REQUEST_EVENT
        } else {
            &self.commits
        }
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn branch_name(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    fn repository_source(&self) -> Option<&RepositorySource> {
        self.repository_source.as_ref()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn change_log(
    repository: &git2::Repository,
    from_ref: Option<&str>,
    to_ref: Option<&str>,
) -> Result<ChangeLog> {
    let from = repository.revparse_single(from_ref.unwrap_or("HEAD"))?;

    let entries = match to_ref {
        Some(to_ref) => {
            let to = repository.revparse_single(to_ref)?.peel_to_commit()?;
            let mut walk = repository.revwalk()?;
            walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;
            walk.push(to.id())?;
            walk.hide(from.peel_to_commit()?.id())?;
            walk.map(|oid| {
                let commit = repository.find_commit(oid?)?;
                commit_entry(repository, &commit)
            })
            .collect::<Result<Vec<_>>>()?
        }
        None => {
            let tree = from.peel_to_tree()?;
            let mut options = git2::DiffOptions::new();
            options
                .include_untracked(true)
                .recurse_untracked_dirs(true);
            let diff =
                repository.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut options))?;
            let entry = diff_entry(&diff);
            if entry.affected_paths.is_empty() {
                Vec::new()
            } else {
                vec![entry]
            }
        }
    };

    Ok(ChangeLog {
        scm: GIT_SCM.to_string(),
        entries,
    })
}

fn commit_entry(repository: &git2::Repository, commit: &git2::Commit) -> Result<ChangeLogEntry> {
    let tree = commit.tree()?;
    let parent_tree = match commit.parents().next() {
        Some(parent) => Some(parent.tree()?),
        None => None,
    };
    let diff = repository.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    Ok(diff_entry(&diff))
}

fn diff_entry(diff: &git2::Diff) -> ChangeLogEntry {
    ChangeLogEntry {
        affected_paths: diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path_bytes()
                    .or_else(|| delta.old_file().path_bytes())
                    .map(|path| path.to_str_lossy().into_owned())
            })
            .collect(),
    }
}
