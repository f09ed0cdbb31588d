use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    change_set::{ChangedFile, ChangedFileSource},
    credentials::Credential,
    pull_request::{RepositoryApi, RepositoryHandle},
    run::{ChangeEvent, RepositorySource, RunContext},
    trigger::{JobOrchestrator, JobResult, TriggerSpec},
    Error, Result,
};

/// Build a repository in a temporary directory from a list of commits,
/// followed by optional staged and working tree changes.
macro_rules! git_test {
    ($($message:literal: [$($path:literal => $content:expr),*])* $(staged: [$($spath:literal => $scontent:expr),*])? $(working: [$($wdpath:literal => $wdcontent:expr),*])?) => {{
        let tempdir = ::tempfile::tempdir().unwrap();
        let repo = ::git2::Repository::init(tempdir.path()).unwrap();
        #[allow(unused_variables)]
        let signature = ::git2::Signature::new("Example User", "test@example.com", &::git2::Time::new(0, 0)).unwrap();
        #[allow(unused_variables, unused_mut)]
        let mut index = repo.index().unwrap();
        $({
            $($crate::testing::write_file(tempdir.path(), $path, $content);)*
            $crate::testing::stage_all(&mut index);

            let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
            let parents = match repo.head().and_then(|head| head.peel_to_commit()) {
                Ok(parent) => vec![parent],
                Err(_) => vec![],
            };
            repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                $message,
                &tree,
                &parents.iter().collect::<Vec<_>>(),
            ).unwrap();
        })*
        $($({
            $crate::testing::write_file(tempdir.path(), $spath, $scontent);
            $crate::testing::stage_all(&mut index);
        })*)?
        $($({
            $crate::testing::write_file(tempdir.path(), $wdpath, $wdcontent);
        })*)?
        (tempdir, repo)
    }};
}

pub(crate) use git_test;

pub(crate) fn write_file(root: &Path, path: &str, content: impl AsRef<[u8]>) {
    let path = root.join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub(crate) fn stage_all(index: &mut git2::Index) {
    index
        .add_all(["."].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
}

/// A run whose every property is set by the test.
#[derive(Debug)]
pub(crate) struct FakeRun {
    event: ChangeEvent,
    workspace: PathBuf,
    branch: Option<String>,
    repository_source: Option<RepositorySource>,
    cancelled: AtomicBool,
}

impl FakeRun {
    pub fn new(event: ChangeEvent) -> Self {
        Self {
            event,
            workspace: PathBuf::from("."),
            branch: None,
            repository_source: None,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    pub fn with_repository_source(mut self, source: RepositorySource) -> Self {
        self.repository_source = Some(source);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl RunContext for FakeRun {
    fn change_event(&self) -> &ChangeEvent {
        &self.event
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

/// A pull request source returning fixed paths.
pub(crate) struct StaticFiles(pub Vec<String>);

impl ChangedFileSource for StaticFiles {
    fn changed_files(&self, _run: &dyn RunContext) -> Result<Vec<ChangedFile>> {
        Ok(self.0.iter().cloned().map(ChangedFile::new).collect())
    }
}

/// Finishes every job with a fixed result and records the sequence ids it
/// was started with. Without a result, jobs fail to start.
#[derive(Debug)]
pub(crate) struct ScriptedOrchestrator {
    result: Option<JobResult>,
    started: Mutex<Vec<u64>>,
}

impl Default for ScriptedOrchestrator {
    fn default() -> Self {
        Self::returning(JobResult::Success)
    }
}

impl ScriptedOrchestrator {
    pub fn returning(result: JobResult) -> Self {
        Self {
            result: Some(result),
            started: Mutex::default(),
        }
    }

    pub fn failing_to_start() -> Self {
        Self {
            result: None,
            started: Mutex::default(),
        }
    }

    pub fn started(&self) -> Vec<u64> {
        self.started.lock().unwrap().clone()
    }
}

impl JobOrchestrator for ScriptedOrchestrator {
    fn start_job(&self, spec: &TriggerSpec, _run: &dyn RunContext) -> Result<JobResult> {
        let result = self
            .result
            .ok_or_else(|| Error::UnknownJob(spec.job.clone()))?;
        self.started.lock().unwrap().push(spec.sequence_id());
        Ok(result)
    }
}

#[derive(Debug, Default)]
struct FakeApiState {
    files: Vec<String>,
    refuse: bool,
    credential: Option<Credential>,
    requests: Vec<(String, String, u64)>,
}

/// A repository API serving one fixed list of pull request files.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeApi(Arc<Mutex<FakeApiState>>);

impl FakeApi {
    pub fn with_files<const N: usize>(files: [&str; N]) -> Self {
        Self(Arc::new(Mutex::new(FakeApiState {
            files: files.iter().map(|file| file.to_string()).collect(),
            ..FakeApiState::default()
        })))
    }

    pub fn refusing() -> Self {
        Self(Arc::new(Mutex::new(FakeApiState {
            refuse: true,
            ..FakeApiState::default()
        })))
    }

    pub fn credential(&self) -> Option<Credential> {
        self.0.lock().unwrap().credential.clone()
    }

    /// `(api_url, repository, number)` of every files request.
    pub fn requests(&self) -> Vec<(String, String, u64)> {
        self.0.lock().unwrap().requests.clone()
    }
}

pub(crate) struct FakeHandle {
    state: Arc<Mutex<FakeApiState>>,
    api_url: String,
}

impl RepositoryApi for FakeApi {
    type Handle = FakeHandle;

    fn connect(&self, api_url: &str, credential: &Credential) -> Result<FakeHandle> {
        let mut state = self.0.lock().unwrap();
        if state.refuse {
            return Err(Error::Connect {
                api_url: api_url.to_string(),
                message: "Bad credentials".to_string(),
            });
        }
        state.credential = Some(credential.clone());
        Ok(FakeHandle {
            state: self.0.clone(),
            api_url: api_url.to_string(),
        })
    }
}

impl RepositoryHandle for FakeHandle {
    fn changed_files(&self, repository: &str, number: u64) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state
            .requests
            .push((self.api_url.clone(), repository.to_string(), number));
        Ok(state.files.clone())
    }
}
