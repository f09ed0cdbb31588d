mod process;

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

pub use process::{JobCommand, ProcessJobOrchestrator};

use crate::{run::RunContext, Result};

/// Where the target file lands, relative to the downstream job's workspace.
pub const DOWNSTREAM_TARGET_DIR: &str = "test-targets";

/// Terminal result of a job, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Unstable => "UNSTABLE",
            Self::Failure => "FAILURE",
            Self::NotBuilt => "NOT_BUILT",
            Self::Aborted => "ABORTED",
        })
    }
}

/// How a downstream result affects the job that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Effect {
    /// Stop the caller right away.
    pub abort_caller: bool,
    /// Status the caller reports once it finishes.
    pub caller_status: JobResult,
}

/// Maps a downstream result to an [`Effect`]. Each threshold applies to
/// results at least as bad as it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockingPolicy {
    pub fail_step_at: Option<JobResult>,
    pub mark_failure_at: Option<JobResult>,
    pub mark_unstable_at: Option<JobResult>,
}

impl BlockingPolicy {
    /// Never stop the caller early, so it can still clean up and collect
    /// reports. Failures show up in the caller's final status instead.
    pub const fn non_fatal() -> Self {
        Self {
            fail_step_at: None,
            mark_failure_at: Some(JobResult::Failure),
            mark_unstable_at: Some(JobResult::Unstable),
        }
    }

    pub fn apply(&self, result: JobResult) -> Effect {
        let reached = |threshold: Option<JobResult>| threshold.is_some_and(|t| result >= t);
        let caller_status = if reached(self.mark_failure_at) {
            JobResult::Failure
        } else if reached(self.mark_unstable_at) {
            JobResult::Unstable
        } else {
            JobResult::Success
        };
        Effect {
            abort_caller: reached(self.fail_step_at),
            caller_status,
        }
    }
}

/// Copies a file of the caller into the downstream job's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterBinding {
    pub source: PathBuf,
    /// Relative to the downstream job's workspace.
    pub destination: PathBuf,
}

/// Attached to a trigger so reports produced downstream can be matched back
/// to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub sequence_id: u64,
    /// Glob of the report files the collector should pick up.
    pub report_files: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerSpec {
    pub job: String,
    pub bindings: Vec<ParameterBinding>,
    pub policy: BlockingPolicy,
    pub marker: Marker,
}

impl TriggerSpec {
    pub fn sequence_id(&self) -> u64 {
        self.marker.sequence_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub job: String,
    pub sequence_id: u64,
    pub result: JobResult,
    pub effect: Effect,
}

impl TriggerOutcome {
    /// Whether the caller may consider the downstream run a success.
    pub fn is_success(&self) -> bool {
        self.effect.caller_status == JobResult::Success
    }
}

/// Starts jobs and waits for them to finish.
pub trait JobOrchestrator {
    /// Run `spec.job` to completion. Implementations must stop the job and
    /// report [`JobResult::Aborted`] once `run` is cancelled.
    fn start_job(&self, spec: &TriggerSpec, run: &dyn RunContext) -> Result<JobResult>;
}

/// Builds and fires downstream triggers, tagging each with a fresh sequence id.
pub struct TriggerOrchestrator<O> {
    orchestrator: O,
    report_files: Option<String>,
    sequence: AtomicU64,
}

impl<O: JobOrchestrator> TriggerOrchestrator<O> {
    pub fn new(orchestrator: O) -> Self {
        Self {
            orchestrator,
            report_files: None,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_report_files(mut self, report_files: Option<String>) -> Self {
        self.report_files = report_files;
        self
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    /// Ids start at 1 and are never handed out twice, even across threads.
    fn next_sequence_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn build_trigger_spec(&self, job: &str, target_file: &Path) -> TriggerSpec {
        let destination = match target_file.file_name() {
            Some(name) => Path::new(DOWNSTREAM_TARGET_DIR).join(name),
            None => PathBuf::from(DOWNSTREAM_TARGET_DIR),
        };
        TriggerSpec {
            job: job.to_string(),
            bindings: vec![ParameterBinding {
                source: target_file.to_owned(),
                destination,
            }],
            policy: BlockingPolicy::non_fatal(),
            marker: Marker {
                sequence_id: self.next_sequence_id(),
                report_files: self.report_files.clone(),
            },
        }
    }

    /// Run the downstream job and apply the blocking policy to its result.
    ///
    /// A job that cannot be started counts as [`JobResult::NotBuilt`], so an
    /// outcome is always returned. A run cancelled beforehand never starts
    /// the job and reports [`JobResult::Aborted`].
    pub fn trigger(&self, spec: &TriggerSpec, run: &dyn RunContext) -> TriggerOutcome {
        let result = if run.is_cancelled() {
            tracing::warn!(job = %spec.job, "Run cancelled, not triggering downstream job");
            JobResult::Aborted
        } else {
            tracing::info!(job = %spec.job, sequence_id = spec.sequence_id(), "Triggering downstream job");
            self.start(spec, run)
        };

        let effect = spec.policy.apply(result);
        if result == JobResult::Success {
            tracing::info!(job = %spec.job, %result, "Downstream job finished");
        } else {
            tracing::warn!(job = %spec.job, %result, caller_status = %effect.caller_status, "Downstream job did not succeed");
        }

        TriggerOutcome {
            job: spec.job.clone(),
            sequence_id: spec.sequence_id(),
            result,
            effect,
        }
    }

    fn start(&self, spec: &TriggerSpec, run: &dyn RunContext) -> JobResult {
        match self.orchestrator.start_job(spec, run) {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(job = %spec.job, %error, "Could not start downstream job");
                JobResult::NotBuilt
            }
        }
    }
}
