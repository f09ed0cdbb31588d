use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;

use crate::{
    extractor::ExtractionRule,
    run::RepositorySource,
    trigger::JobCommand,
    Error, Result,
};

pub const DEFAULT_TARGET_FILE: &str = "test-targets.txt";

/// Settings for one project, usually read from `changed-tests.toml`:
///
/// ```toml
/// path_pattern = '^src/main/java/(.+)\.java$'
/// downstream_job = "unit-tests"
/// target_file = "includes.txt"
/// report_files = "**/surefire-reports/*.xml"
///
/// [repository]
/// credentials_id = "github"
/// owner = "octo"
/// repository = "widgets"
///
/// [jobs.unit-tests]
/// command = ["mvn", "test", "-Dtest.includesFile=test-targets/includes.txt"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Regex whose first capture group names the tests of a changed path.
    pub path_pattern: Option<String>,
    /// Accepted for compatibility. Not used by extraction.
    pub test_target_regex: Option<String>,
    pub downstream_job: Option<String>,
    pub target_file: Option<String>,
    pub report_files: Option<String>,
    pub repository: Option<RepositorySource>,
    #[serde(default)]
    pub jobs: BTreeMap<String, JobCommand>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| Error::Config {
            path: path.to_owned(),
            message: error.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|error| Error::Config {
            path: path.to_owned(),
            message: error.to_string(),
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn extraction_rule(&self) -> Result<ExtractionRule> {
        let path_pattern = self
            .path_pattern
            .as_deref()
            .ok_or(Error::MissingSetting("path_pattern"))?;
        ExtractionRule::new(path_pattern, self.test_target_regex.clone())
    }

    pub fn downstream_job(&self) -> Result<&str> {
        self.downstream_job
            .as_deref()
            .ok_or(Error::MissingSetting("downstream_job"))
    }

    pub fn target_file(&self) -> &str {
        self.target_file.as_deref().unwrap_or(DEFAULT_TARGET_FILE)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(indoc! {r#"
            path_pattern = '^src/main/java/(.+)\.java$'
            test_target_regex = '^(.+)Test$'
            downstream_job = "unit-tests"
            target_file = "includes.txt"
            report_files = "**/surefire-reports/*.xml"

            [repository]
            api_url = "https://github.example.com/api/v3"
            credentials_id = "github"
            owner = "octo"
            repository = "widgets"

            [jobs.unit-tests]
            command = ["mvn", "test"]
        "#})
        .unwrap();

        let rule = config.extraction_rule().unwrap();
        assert_eq!(rule.path_pattern(), r"^src/main/java/(.+)\.java$");
        assert_eq!(rule.test_target_regex(), Some("^(.+)Test$"));
        assert_eq!(config.downstream_job().unwrap(), "unit-tests");
        assert_eq!(config.target_file(), "includes.txt");
        assert_eq!(
            config.repository.as_ref().map(RepositorySource::full_name).as_deref(),
            Some("octo/widgets")
        );
        assert_eq!(config.jobs["unit-tests"].command, ["mvn", "test"]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_file(), DEFAULT_TARGET_FILE);
        assert!(matches!(
            config.extraction_rule().unwrap_err(),
            Error::MissingSetting("path_pattern")
        ));
        assert!(matches!(
            config.downstream_job().unwrap_err(),
            Error::MissingSetting("downstream_job")
        ));
    }

    #[test]
    fn test_unknown_key() {
        assert!(Config::from_toml("regex = '(a)'").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let error = Config::load(&tempdir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(error, Error::Config { .. }));
    }
}
