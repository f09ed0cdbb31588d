mod change_set;
mod config;
mod credentials;
mod error;
mod extractor;
mod pipeline;
mod pull_request;
mod run;
mod trigger;
mod writer;

pub use change_set::{
    ChangeKind, ChangeSet, ChangeSetCollector, ChangedFile, ChangedFileSource, Strictness,
};
pub use config::{Config, DEFAULT_TARGET_FILE};
pub use credentials::{Credential, CredentialResolver, CredentialStore};
pub use error::{Error, Result};
pub use extractor::{extract, extract_with, ExtractionRule, Observation, TestTarget};
pub use pipeline::{changed_files, list_test_targets, Pipeline, PipelineOutcome, Settings};
pub use pull_request::{
    pull_request_number, GitHub, GitHubClient, PullRequestChangeSource, RepositoryApi, RepositoryHandle,
    PULL_REQUEST_BRANCH_PREFIX,
};
pub use run::{
    ChangeEvent, ChangeLog, ChangeLogEntry, GitRun, RepositorySource, RunContext, GIT_SCM,
};
pub use trigger::{
    BlockingPolicy, Effect, JobCommand, JobOrchestrator, JobResult, Marker, ParameterBinding,
    ProcessJobOrchestrator, TriggerOrchestrator, TriggerOutcome, TriggerSpec,
    DOWNSTREAM_TARGET_DIR,
};
pub use writer::{TestTargetWriter, TARGET_DIR};

#[cfg(test)]
mod testing;
