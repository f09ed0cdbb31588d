use genawaiter::{rc::gen, yield_};
use serde::Serialize;

use crate::{
    run::{ChangeEvent, ChangeLog, RunContext, GIT_SCM},
    Error, Result,
};

/// A path touched by the change, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChangedFile {
    pub path: String,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Commit,
    PullRequest,
    /// Nothing relevant changed. The pipeline stops without error.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub kind: ChangeKind,
    pub files: Vec<ChangedFile>,
}

impl ChangeSet {
    pub fn none() -> Self {
        Self {
            kind: ChangeKind::None,
            files: Vec::new(),
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.path.as_str())
    }
}

/// A remote source of changed files, e.g. a pull request on a hosting service.
pub trait ChangedFileSource {
    fn changed_files(&self, run: &dyn RunContext) -> Result<Vec<ChangedFile>>;
}

/// How change logs from SCMs other than git are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Fail with [`Error::UnsupportedScm`].
    Strict,
    /// Skip them.
    Lenient,
}

pub struct ChangeSetCollector<'a> {
    pull_requests: Option<&'a dyn ChangedFileSource>,
    strictness: Strictness,
}

impl<'a> ChangeSetCollector<'a> {
    pub fn new(strictness: Strictness) -> Self {
        Self {
            pull_requests: None,
            strictness,
        }
    }

    pub fn with_pull_requests(mut self, source: &'a dyn ChangedFileSource) -> Self {
        self.pull_requests = Some(source);
        self
    }

    pub fn collect(&self, run: &dyn RunContext) -> Result<ChangeSet> {
        match run.change_event() {
            ChangeEvent::Unrecognized => {
                tracing::info!("Run has no recognized change event");
                Ok(ChangeSet::none())
            }
            ChangeEvent::Commit(change_logs) => {
                if change_logs.iter().all(|log| log.entries.is_empty()) {
                    tracing::info!("Run has no changed files");
                    return Ok(ChangeSet::none());
                }
                let files = affected_paths(change_logs, self.strictness)
                    .map(|path| path.map(ChangedFile::new))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ChangeSet {
                    kind: ChangeKind::Commit,
                    files,
                })
            }
            ChangeEvent::PullRequest => {
                let source = self.pull_requests.ok_or(Error::NoPullRequestSource)?;
                Ok(ChangeSet {
                    kind: ChangeKind::PullRequest,
                    files: source.changed_files(run)?,
                })
            }
        }
    }
}

/// Flatten change logs into their affected paths: log order, then entry
/// order, then path order.
fn affected_paths(
    change_logs: &[ChangeLog],
    strictness: Strictness,
) -> impl Iterator<Item = Result<String>> + '_ {
    gen!({
        for log in change_logs {
            if log.scm != GIT_SCM {
                match strictness {
                    Strictness::Strict => {
                        yield_!(Err(Error::UnsupportedScm {
                            kind: log.scm.clone(),
                        }));
                        return;
                    }
                    Strictness::Lenient => {
                        tracing::warn!(scm = %log.scm, "Skipping change log from unsupported SCM");
                        continue;
                    }
                }
            }
            for entry in &log.entries {
                for path in &entry.affected_paths {
                    yield_!(Ok(path.clone()));
                }
            }
        }
    })
    .into_iter()
}
