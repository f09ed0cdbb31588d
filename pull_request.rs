mod github;

pub use github::{GitHub, GitHubClient};

use crate::{
    change_set::{ChangedFile, ChangedFileSource},
    credentials::{Credential, CredentialResolver},
    run::RunContext,
    Error, Result,
};

/// Branch names of pull request builds look like `PR-42`.
pub const PULL_REQUEST_BRANCH_PREFIX: &str = "PR-";

/// A hosting service API that can list the files of a pull request.
pub trait RepositoryApi {
    type Handle: RepositoryHandle;

    fn connect(&self, api_url: &str, credential: &Credential) -> Result<Self::Handle>;
}

pub trait RepositoryHandle {
    /// File names changed by pull request `number` of `repository`
    /// (`owner/name`), in the order the service returns them.
    fn changed_files(&self, repository: &str, number: u64) -> Result<Vec<String>>;
}

/// Parse the pull request number out of a `PR-<number>` branch name.
pub fn pull_request_number(branch: &str) -> Result<u64> {
    branch
        .strip_prefix(PULL_REQUEST_BRANCH_PREFIX)
        .and_then(|number| number.parse().ok())
        .ok_or_else(|| Error::NotAPullRequest {
            branch: branch.to_string(),
        })
}

/// Fetches the changed files of the pull request a run is building.
///
/// Every failure is fatal. An empty list must mean the pull request changed
/// nothing, never that the remote could not be reached.
pub struct PullRequestChangeSource<C, A> {
    credentials: C,
    api: A,
}

impl<C: CredentialResolver, A: RepositoryApi> PullRequestChangeSource<C, A> {
    pub fn new(credentials: C, api: A) -> Self {
        Self { credentials, api }
    }

    pub fn fetch(&self, run: &dyn RunContext) -> Result<Vec<ChangedFile>> {
        let source = run
            .repository_source()
            .ok_or(Error::MissingRepositorySource)?;
        let branch = run.branch_name().ok_or_else(|| Error::NotAPullRequest {
            branch: String::new(),
        })?;
        let number = pull_request_number(branch)?;
        let repository = source.full_name();

        let credential = self
            .credentials
            .lookup(&source.credentials_id, &source.api_url)
            .ok_or_else(|| Error::CredentialsNotFound {
                id: source.credentials_id.clone(),
                scope: source.api_url.clone(),
            })?;
        match &credential {
            Credential::UsernamePassword { .. } => tracing::debug!("Using username/password"),
            Credential::Token(_) => tracing::debug!("Using token"),
        }

        let handle = self.api.connect(&source.api_url, &credential)?;
        let files = handle.changed_files(&repository, number)?;
        tracing::info!(
            repository = %repository,
            pull_request = number,
            files = files.len(),
            "Fetched pull request files"
        );
        Ok(files.into_iter().map(ChangedFile::new).collect())
    }
}

impl<C: CredentialResolver, A: RepositoryApi> ChangedFileSource for PullRequestChangeSource<C, A> {
    fn changed_files(&self, run: &dyn RunContext) -> Result<Vec<ChangedFile>> {
        self.fetch(run)
    }
}
