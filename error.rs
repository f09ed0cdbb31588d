use std::{io, path::PathBuf};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Unsupported SCM kind {kind:?}. Only git change logs are supported.")]
    UnsupportedScm { kind: String },

    #[error("The run has pull request changes but no pull request source is available.")]
    NoPullRequestSource,

    #[error("No repository source is configured for this run.")]
    MissingRepositorySource,

    #[error("Branch {branch:?} is not a pull request branch (expected \"PR-<number>\").")]
    NotAPullRequest { branch: String },

    #[error("Failed to look up credentials with id {id:?} for {scope}.")]
    CredentialsNotFound { id: String, scope: String },

    #[error("Could not connect to {api_url}: {message}")]
    Connect { api_url: String, message: String },

    #[error("Remote API request failed{}: {message}", with_status(.status))]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid path pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid target file name {0:?}. Expected a plain file name.")]
    InvalidTargetFileName(String),

    #[error("Unknown downstream job {0:?}.")]
    UnknownJob(String),

    #[error("Missing required setting {0:?}.")]
    MissingSetting(&'static str),

    #[error("Could not read configuration {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn with_status(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" with status {status}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_remote_api_message() {
        insta::assert_snapshot!(Error::RemoteApi { status: Some(401), message: "Bad credentials".into() }.to_string(), @"Remote API request failed with status 401: Bad credentials");
        insta::assert_snapshot!(Error::RemoteApi { status: None, message: "timed out".into() }.to_string(), @"Remote API request failed: timed out");
    }

    #[test]
    fn test_unsupported_scm_message() {
        insta::assert_snapshot!(Error::UnsupportedScm { kind: "svn".into() }.to_string(), @r###"Unsupported SCM kind "svn". Only git change logs are supported."###);
    }
}
