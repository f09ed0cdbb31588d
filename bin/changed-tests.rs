#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use changed_tests::{
    changed_files, list_test_targets, Config, CredentialStore, GitHub, GitRun, Pipeline,
    PipelineOutcome, ProcessJobOrchestrator, PullRequestChangeSource, Settings,
    TriggerOrchestrator,
};
use clap::{Args, Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub options: Options,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the files changed by this run, one per line.
    Files,

    /// Print the test targets selected by this run's changes.
    List {
        /// Print a JSON array instead of one target per line.
        #[arg(long)]
        json: bool,
    },

    /// Write the test targets and trigger the downstream job.
    Run {
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct Options {
    /// TOML configuration file. Command line options take precedence.
    #[arg(long, global = true, env = "CHANGED_TESTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// TOML file with the credentials used to query pull requests.
    #[arg(long, global = true, env = "CHANGED_TESTS_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// The revision to compare against. By default, HEAD is used.
    #[arg(long, global = true, env = "CHANGED_TESTS_FROM_REF")]
    pub from_ref: Option<String>,

    /// The revision to compare with. By default, the current working tree is used.
    #[arg(long, global = true, env = "CHANGED_TESTS_TO_REF")]
    pub to_ref: Option<String>,

    /// The branch being built. `PR-<number>` branches read their changes
    /// from the configured repository's pull request.
    #[arg(long, global = true, env = "BRANCH_NAME")]
    pub branch: Option<String>,

    /// Directory the target file is written under. By default, the
    /// repository root.
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Regex whose first capture group names the tests of a changed path.
    #[arg(long, global = true)]
    pub path_pattern: Option<String>,

    /// Accepted for compatibility. It does not affect the selected targets.
    #[arg(long, global = true)]
    pub test_target_regex: Option<String>,

    /// The job that runs the selected tests.
    #[arg(long, global = true)]
    pub downstream_job: Option<String>,

    /// Name of the file the targets are written to.
    #[arg(long, global = true)]
    pub target_file: Option<String>,

    /// Glob of the report files the downstream job produces.
    #[arg(long, global = true)]
    pub report_files: Option<String>,
}

fn config(options: &Options) -> changed_tests::Result<Config> {
    let config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    Ok(Config {
        path_pattern: options.path_pattern.clone().or(config.path_pattern),
        test_target_regex: options
            .test_target_regex
            .clone()
            .or(config.test_target_regex),
        downstream_job: options.downstream_job.clone().or(config.downstream_job),
        target_file: options.target_file.clone().or(config.target_file),
        report_files: options.report_files.clone().or(config.report_files),
        ..config
    })
}

/// Run `cli` against `repository`, writing results to `out`. Returns whether
/// the caller should report success.
fn run(cli: Cli, repository: &git2::Repository, out: &mut impl Write) -> changed_tests::Result<bool> {
    let options = &cli.options;
    let config = config(options)?;

    let mut run = GitRun::new(repository, options.from_ref.as_deref(), options.to_ref.as_deref())?
        .with_branch(options.branch.clone())
        .with_repository_source(config.repository.clone());
    if let Some(workspace) = &options.workspace {
        run = run.with_workspace(workspace);
    }

    let credentials = match &options.credentials {
        Some(path) => CredentialStore::load(path)?,
        None => CredentialStore::default(),
    };
    let pull_requests = PullRequestChangeSource::new(credentials, GitHub);

    match cli.command {
        Command::Files => {
            for file in changed_files(&run, Some(&pull_requests))? {
                writeln!(out, "{}", file.path)?;
            }
            Ok(true)
        }
        Command::List { json } => {
            let targets = list_test_targets(&run, &config.extraction_rule()?, Some(&pull_requests))?;
            if json {
                writeln!(out, "{}", to_json(&targets)?)?;
            } else {
                for target in targets {
                    writeln!(out, "{target}")?;
                }
            }
            Ok(true)
        }
        Command::Run { json } => {
            for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
                signal_hook::flag::register(signal, run.cancellation_flag())?;
            }

            let settings = Settings::from_config(&config)?;
            let trigger = TriggerOrchestrator::new(ProcessJobOrchestrator::new(config.jobs.clone()))
                .with_report_files(config.report_files.clone());
            let outcome = Pipeline::new(&settings, &trigger)
                .with_pull_requests(&pull_requests)
                .execute(&run)?;

            if json {
                writeln!(out, "{}", to_json(&outcome)?)?;
            } else {
                match &outcome {
                    PipelineOutcome::NoChanges => writeln!(out, "No changes. Nothing triggered.")?,
                    PipelineOutcome::Triggered {
                        targets, trigger, ..
                    } => writeln!(
                        out,
                        "Triggered {:?} (#{}) with {} test target(s): {} ({}).",
                        trigger.job,
                        trigger.sequence_id,
                        targets.len(),
                        trigger.result,
                        trigger.effect.caller_status,
                    )?,
                }
            }
            Ok(outcome.is_success())
        }
    }
}

fn to_json(value: &impl serde::Serialize) -> changed_tests::Result<String> {
    serde_json::to_string(value).map_err(|error| io::Error::other(error).into())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let repository = match git2::Repository::open_from_env() {
        Ok(repository) => repository,
        Err(error) => {
            eprintln!("Could not open the repository: {error}");
            return ExitCode::from(2);
        }
    };
    match run(cli, &repository, &mut io::stdout().lock()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(2)
        }
    }
}
