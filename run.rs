mod git;

use std::path::Path;

use serde::Deserialize;

pub use git::GitRun;

/// The SCM kind reported by git change logs.
pub const GIT_SCM: &str = "git";

/// The change notification attached to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Direct commits, grouped into one change log per checkout.
    Commit(Vec<ChangeLog>),
    /// A pull request build. The changed files live on the remote.
    PullRequest,
    /// Anything this tool does not understand.
    Unrecognized,
}

/// The entries one SCM checkout reported for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLog {
    pub scm: String,
    pub entries: Vec<ChangeLogEntry>,
}

/// A single commit and the paths it touched, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLogEntry {
    pub affected_paths: Vec<String>,
}

/// Where the owning project fetches its sources from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositorySource {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub credentials_id: String,
    pub owner: String,
    pub repository: String,
}

impl RepositorySource {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

pub(crate) fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

/// The host run the pipeline executes on behalf of.
pub trait RunContext {
    /// The changes that triggered this run.
    fn change_event(&self) -> &ChangeEvent;

    /// The root directory the run may write artifacts into.
    fn workspace(&self) -> &Path;

    /// The branch being built, e.g. `main` or `PR-42`.
    fn branch_name(&self) -> Option<&str>;

    /// The repository source configured on the run's owning project.
    fn repository_source(&self) -> Option<&RepositorySource>;

    /// Whether the run has been asked to stop.
    fn is_cancelled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_source_defaults() {
        let source: RepositorySource = toml::from_str(indoc::indoc! {r#"
            credentials_id = "github"
            owner = "octo"
            repository = "widgets"
        "#})
        .unwrap();

        assert_eq!(source.api_url, "https://api.github.com");
        assert_eq!(source.full_name(), "octo/widgets");
    }
}
