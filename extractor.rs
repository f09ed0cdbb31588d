use std::{collections::HashSet, fmt};

use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

/// A glob-style expression naming the tests a downstream job should include.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TestTarget(String);

impl TestTarget {
    /// Build the expression for a captured name.
    ///
    /// The captured text is used verbatim. Regex or glob metacharacters in it
    /// are not escaped, so `x/y.go` becomes `**/x/y.go.*`.
    pub fn from_capture(captured: &str) -> Self {
        Self(format!("**/{captured}.*"))
    }
}

impl fmt::Display for TestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns changed paths into test targets.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    path_pattern: Regex,
    test_target_regex: Option<String>,
}

impl ExtractionRule {
    /// Compile a rule. `test_target_regex` is kept as configured but has no
    /// effect on extraction.
    pub fn new(path_pattern: &str, test_target_regex: Option<String>) -> Result<Self> {
        let path_pattern = Regex::new(path_pattern).map_err(|source| Error::InvalidPattern {
            pattern: path_pattern.to_string(),
            source,
        })?;
        // Group 0 is the whole match.
        if path_pattern.captures_len() < 2 {
            tracing::warn!(
                pattern = path_pattern.as_str(),
                "Path pattern has no capture group and will not select any tests"
            );
        }
        Ok(Self {
            path_pattern,
            test_target_regex,
        })
    }

    pub fn path_pattern(&self) -> &str {
        self.path_pattern.as_str()
    }

    pub fn test_target_regex(&self) -> Option<&str> {
        self.test_target_regex.as_deref()
    }

    /// The text of the first capture group for `path`, if the pattern matches
    /// anywhere in it and the group took part in the match.
    pub fn capture<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.path_pattern
            .captures(path)?
            .get(1)
            .map(|group| group.as_str())
    }
}

/// What the extractor saw for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation<'a> {
    pub path: &'a str,
    pub captured: Option<&'a str>,
}

/// Extract deduplicated test targets in first-seen order, logging every path.
pub fn extract<'p>(paths: impl IntoIterator<Item = &'p str>, rule: &ExtractionRule) -> Vec<TestTarget> {
    extract_with(paths, rule, log_observation)
}

/// Like [`extract`], but reports each path to `observe` instead of the log.
pub fn extract_with<'p>(
    paths: impl IntoIterator<Item = &'p str>,
    rule: &ExtractionRule,
    mut observe: impl FnMut(Observation<'_>),
) -> Vec<TestTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for path in paths {
        let captured = rule.capture(path);
        observe(Observation { path, captured });

        let Some(captured) = captured else {
            continue;
        };
        let target = TestTarget::from_capture(captured);
        if seen.insert(target.clone()) {
            targets.push(target);
        }
    }
    targets
}

fn log_observation(observation: Observation<'_>) {
    tracing::debug!(path = observation.path, "path");
    if let Some(captured) = observation.captured {
        tracing::info!(path = observation.path, captured, "matched");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> ExtractionRule {
        ExtractionRule::new(pattern, None).unwrap()
    }

    #[test]
    fn test_extract() {
        let paths = ["src/foo/BarTest.java", "src/foo/Bar.java", "docs/readme.md"];
        insta::assert_compact_json_snapshot!(extract(paths, &rule(r"^src/foo/(\w+)\.java$")), @r###"["**/BarTest.*", "**/Bar.*"]"###);
    }

    #[test]
    fn test_extract_no_match() {
        let paths = ["docs/readme.md", "README"];
        insta::assert_compact_json_snapshot!(extract(paths, &rule(r"^src/(\w+)\.rs$")), @"[]");
    }

    #[test]
    fn test_extract_empty() {
        assert!(extract([], &rule(r"(\w+)")).is_empty());
    }

    #[test]
    fn test_extract_unescaped() {
        insta::assert_compact_json_snapshot!(extract(["x/y.go"], &rule(r"^(.*)$")), @r###"["**/x/y.go.*"]"###);
    }

    #[test]
    fn test_extract_empty_capture() {
        insta::assert_compact_json_snapshot!(extract(["a/.rs"], &rule(r"/(\w*)\.rs$")), @r###"["**/.*"]"###);
    }

    #[test]
    fn test_extract_without_capture_group() {
        assert!(extract(["src/a.rs", "src/b.rs"], &rule(r"\.rs$")).is_empty());
    }

    #[test]
    fn test_extract_unmatched_optional_group() {
        assert!(extract(["b.rs"], &rule(r"(a)?b\.rs")).is_empty());
    }

    #[test]
    fn test_extract_unanchored() {
        insta::assert_compact_json_snapshot!(extract(["crates/core/src/lexer.rs"], &rule(r"src/(\w+)\.rs")), @r###"["**/lexer.*"]"###);
    }

    #[test]
    fn test_extract_first_group_only() {
        insta::assert_compact_json_snapshot!(extract(["src/foo/bar.rs"], &rule(r"src/(\w+)/(\w+)\.rs")), @r###"["**/foo.*"]"###);
    }

    #[test]
    fn test_extract_dedup() {
        let paths = [
            "src/main/Parser.java",
            "src/test/Parser.java",
            "src/main/Lexer.java",
            "src/main/Parser.java",
        ];
        let rule = rule(r"/(\w+)\.java$");
        let first = extract(paths, &rule);
        insta::assert_compact_json_snapshot!(first, @r###"["**/Parser.*", "**/Lexer.*"]"###);
        assert_eq!(extract(paths, &rule), first);
    }

    #[test]
    fn test_observer_sees_every_path() {
        let mut observed = Vec::new();
        extract_with(
            ["src/a.rs", "README.md", "src/a.rs"],
            &rule(r"src/(\w+)\.rs"),
            |observation| {
                observed.push((observation.path.to_string(), observation.captured.map(str::to_string)))
            },
        );
        insta::assert_compact_json_snapshot!(observed, @r###"[["src/a.rs", "a"], ["README.md", null], ["src/a.rs", "a"]]"###);
    }

    #[test]
    fn test_invalid_pattern() {
        let error = ExtractionRule::new("(unclosed", None).unwrap_err();
        assert!(matches!(error, Error::InvalidPattern { pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_test_target_regex_is_inert() {
        let with = ExtractionRule::new(r"src/(\w+)\.rs", Some(r"^(\w+)Test$".into())).unwrap();
        let without = rule(r"src/(\w+)\.rs");
        assert_eq!(with.test_target_regex(), Some(r"^(\w+)Test$"));
        assert_eq!(extract(["src/a.rs"], &with), extract(["src/a.rs"], &without));
    }
}
