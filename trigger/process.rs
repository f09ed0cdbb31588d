use std::{
    collections::BTreeMap,
    fs,
    path::{self, PathBuf},
    process::Command,
    thread,
    time::Duration,
};

use serde::Deserialize;

use super::{JobOrchestrator, JobResult, TriggerSpec};
use crate::{run::RunContext, Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A downstream job backed by a local command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobCommand {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Relative paths are resolved against the caller's workspace, which is
    /// also the default.
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Runs downstream jobs as child processes.
///
/// Bindings are copied under the job's working directory before it starts.
/// The job sees `TEST_TARGETS_FILE`, `TRIGGER_SEQUENCE_ID` and, when
/// configured, `TEST_REPORT_FILES` in its environment. Exit status 0 is
/// [`JobResult::Success`], anything else [`JobResult::Failure`].
#[derive(Debug, Clone, Default)]
pub struct ProcessJobOrchestrator {
    jobs: BTreeMap<String, JobCommand>,
    poll_interval: Option<Duration>,
}

impl ProcessJobOrchestrator {
    pub fn new(jobs: BTreeMap<String, JobCommand>) -> Self {
        Self {
            jobs,
            poll_interval: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }
}

impl JobOrchestrator for ProcessJobOrchestrator {
    fn start_job(&self, spec: &TriggerSpec, run: &dyn RunContext) -> Result<JobResult> {
        let job = self
            .jobs
            .get(&spec.job)
            .ok_or_else(|| Error::UnknownJob(spec.job.clone()))?;
        let (program, args) = job
            .command
            .split_first()
            .ok_or(Error::MissingSetting("jobs.<name>.command"))?;
        // Absolute, so the paths handed to the job hold from its own cwd.
        let working_dir = path::absolute(match &job.working_dir {
            Some(dir) => run.workspace().join(dir),
            None => run.workspace().to_owned(),
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&working_dir)
            .envs(&job.env)
            .env("TRIGGER_SEQUENCE_ID", spec.sequence_id().to_string());
        if let Some(report_files) = &spec.marker.report_files {
            command.env("TEST_REPORT_FILES", report_files);
        }

        for (index, binding) in spec.bindings.iter().enumerate() {
            let destination = working_dir.join(&binding.destination);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&binding.source, &destination)?;
            if index == 0 {
                command.env("TEST_TARGETS_FILE", &destination);
            }
        }

        let mut child = command.spawn()?;
        tracing::debug!(job = %spec.job, pid = child.id(), "Started downstream process");
        loop {
            if let Some(status) = child.try_wait()? {
                tracing::debug!(job = %spec.job, %status, "Downstream process exited");
                return Ok(if status.success() {
                    JobResult::Success
                } else {
                    JobResult::Failure
                });
            }
            if run.is_cancelled() {
                tracing::warn!(job = %spec.job, "Run cancelled, stopping downstream process");
                if let Err(error) = child.kill() {
                    tracing::warn!(job = %spec.job, %error, "Could not kill downstream process");
                }
                child.wait()?;
                return Ok(JobResult::Aborted);
            }
            thread::sleep(self.poll_interval.unwrap_or(POLL_INTERVAL));
        }
    }
}
