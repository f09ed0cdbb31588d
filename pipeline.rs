use std::path::PathBuf;

use serde::Serialize;

use crate::{
    change_set::{ChangeKind, ChangeSetCollector, ChangedFile, ChangedFileSource, Strictness},
    config::Config,
    extractor::{self, ExtractionRule, TestTarget},
    run::RunContext,
    trigger::{JobOrchestrator, TriggerOrchestrator, TriggerOutcome},
    writer::TestTargetWriter,
    Result,
};

/// The changed files of a run. Change logs from other SCMs are skipped.
pub fn changed_files(
    run: &dyn RunContext,
    pull_requests: Option<&dyn ChangedFileSource>,
) -> Result<Vec<ChangedFile>> {
    Ok(collector(Strictness::Lenient, pull_requests)
        .collect(run)?
        .files)
}

/// The test targets selected by a run's changes, without writing or
/// triggering anything.
pub fn list_test_targets(
    run: &dyn RunContext,
    rule: &ExtractionRule,
    pull_requests: Option<&dyn ChangedFileSource>,
) -> Result<Vec<TestTarget>> {
    let change_set = collector(Strictness::Lenient, pull_requests).collect(run)?;
    Ok(extractor::extract(change_set.paths(), rule))
}

fn collector(
    strictness: Strictness,
    pull_requests: Option<&dyn ChangedFileSource>,
) -> ChangeSetCollector<'_> {
    let collector = ChangeSetCollector::new(strictness);
    match pull_requests {
        Some(source) => collector.with_pull_requests(source),
        None => collector,
    }
}

/// Validated settings for a full pipeline run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rule: ExtractionRule,
    pub downstream_job: String,
    pub target_file: String,
}

impl Settings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            rule: config.extraction_rule()?,
            downstream_job: config.downstream_job()?.to_string(),
            target_file: config.target_file().to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Idle,
    ChangesCollected,
    ExpressionsExtracted,
    TargetFileWritten,
    Triggered,
    Completed,
    CallerAborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Nothing relevant changed. No file was written and nothing triggered.
    NoChanges,
    Triggered {
        targets: Vec<TestTarget>,
        target_file: PathBuf,
        trigger: TriggerOutcome,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::NoChanges => true,
            Self::Triggered { trigger, .. } => trigger.is_success(),
        }
    }
}

/// Collect, extract, write and trigger.
pub struct Pipeline<'a, O> {
    settings: &'a Settings,
    trigger: &'a TriggerOrchestrator<O>,
    pull_requests: Option<&'a dyn ChangedFileSource>,
}

impl<'a, O: JobOrchestrator> Pipeline<'a, O> {
    pub fn new(settings: &'a Settings, trigger: &'a TriggerOrchestrator<O>) -> Self {
        Self {
            settings,
            trigger,
            pull_requests: None,
        }
    }

    pub fn with_pull_requests(mut self, source: &'a dyn ChangedFileSource) -> Self {
        self.pull_requests = Some(source);
        self
    }

    /// Errors only happen before anything is triggered. Once the downstream
    /// job runs, its result is reported through [`PipelineOutcome`].
    pub fn execute(&self, run: &dyn RunContext) -> Result<PipelineOutcome> {
        let mut stage = Stage::Idle;
        let outcome = self.advance(run, &mut stage);
        if outcome.is_err() {
            debug_assert!(stage < Stage::Triggered);
            enter(&mut stage, Stage::CallerAborted);
        }
        outcome
    }

    fn advance(&self, run: &dyn RunContext, stage: &mut Stage) -> Result<PipelineOutcome> {
        let change_set = collector(Strictness::Strict, self.pull_requests).collect(run)?;
        enter(stage, Stage::ChangesCollected);
        if change_set.kind == ChangeKind::None {
            enter(stage, Stage::Completed);
            return Ok(PipelineOutcome::NoChanges);
        }

        let targets = extractor::extract(change_set.paths(), &self.settings.rule);
        enter(stage, Stage::ExpressionsExtracted);

        let target_file =
            TestTargetWriter::new(run.workspace()).write(&self.settings.target_file, &targets)?;
        enter(stage, Stage::TargetFileWritten);

        let spec = self
            .trigger
            .build_trigger_spec(&self.settings.downstream_job, &target_file);
        enter(stage, Stage::Triggered);
        let trigger = self.trigger.trigger(&spec, run);

        enter(stage, Stage::Completed);
        Ok(PipelineOutcome::Triggered {
            targets,
            target_file,
            trigger,
        })
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = ?*stage, to = ?next, "Pipeline stage");
    *stage = next;
}
