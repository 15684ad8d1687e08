//! The `emrflow` command line tool.
//!
//! Submits PySpark jobs to EMR Serverless, tracks them, and packages their
//! dependencies.

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::Verbosity;
use emrflow::config::package;
use emrflow::config::package::EnvKind;
use emrflow::engine::Error;
use emrflow::engine::State;
use emrflow::engine::Submission;
use emrflow::engine::artifact::extract_artifacts;
use emrflow::engine::log;
use emrflow::engine::log::LogCursors;
use emrflow::engine::package::build_package;
use emrflow::engine::service::JobClient as _;
use emrflow::events::Event;
use eyre::Context as _;
use eyre::Result;
use eyre::eyre;
use serde_json::json;
use tokio::sync::broadcast;
use tracing_log::AsTrace;
use tracing_subscriber::EnvFilter;

mod output;
mod session;

use session::Session;

/// The number of events buffered for the printer.
const EVENTS_CAPACITY: usize = 1024;

/// Submit, track and package PySpark jobs for EMR Serverless.
#[derive(Parser)]
#[command(name = "emrflow", version)]
struct Args {
    /// The command to run.
    #[command(subcommand)]
    command: Command,

    /// A configuration file (`.json` or `.toml`) merged on top of the default
    /// configuration sources.
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,

    /// The verbosity of the logs.
    #[command(flatten)]
    verbose: Verbosity,
}

/// A command.
#[derive(Subcommand)]
enum Command {
    /// Uploads the job's artifacts and runs it.
    Run {
        /// The name of the job.
        #[arg(long)]
        job_name: String,

        /// The path of the Python file to run, relative to the project.
        #[arg(long)]
        entry_point: String,

        /// The `spark-submit` options.
        #[arg(long, default_value = "")]
        spark_submit_parameters: String,

        /// The location the project artifacts are uploaded to.
        #[arg(long)]
        s3_code_uri: String,

        /// The location logs are sent to.
        #[arg(long)]
        s3_logs_uri: Option<String>,

        /// An argument passed to the entry point (repeatable).
        #[arg(long)]
        entry_point_arguments: Vec<String>,

        /// The maximum number of minutes the job may run before it is
        /// cancelled.
        #[arg(long)]
        execution_timeout: Option<u32>,

        /// The number of seconds between two status checks.
        #[arg(long)]
        ping_duration: Option<u64>,

        /// A `key:value` tag (repeatable).
        #[arg(long)]
        tags: Vec<String>,

        /// Waits for the job to finish.
        #[arg(long)]
        wait: bool,

        /// Shows the driver output while waiting.
        #[arg(long)]
        show_output: bool,

        /// An artifact that is already uploaded and must not be uploaded again
        /// (repeatable).
        #[arg(long)]
        exclude_paths: Vec<String>,
    },

    /// Lists job runs.
    ListJobRuns {
        /// The maximum number of job runs listed.
        #[arg(long)]
        max_results: i32,

        /// The states to list (repeatable); defaults to every state except
        /// `COMPLETED`.
        #[arg(long)]
        states: Vec<State>,
    },

    /// Gets a job run.
    GetJobRun {
        /// The id of the job run.
        #[arg(long)]
        job_id: String,
    },

    /// Cancels a job run.
    CancelJobRun {
        /// The id of the job run.
        #[arg(long)]
        job_id: String,
    },

    /// Gets the dashboard link of a job run.
    GetDashboardForJobRun {
        /// The id of the job run.
        #[arg(long)]
        job_id: String,
    },

    /// Tracks an already submitted job run until it finishes.
    ResumeJobTracking {
        /// The id of the job run.
        #[arg(long)]
        job_id: String,

        /// Shows the driver output while tracking.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        show_output: bool,

        /// The number of seconds between two status checks.
        #[arg(long)]
        ping_duration: Option<u64>,
    },

    /// Prints the driver output of a job run.
    GetLogs {
        /// The id of the job run.
        #[arg(long)]
        job_id: String,
    },

    /// Packages the project and its runtime environment.
    PackageDependencies {
        /// The directory the bundles are written to.
        #[arg(long, default_value = "dist")]
        output_dir: PathBuf,

        /// Zips the project sources.
        #[arg(long)]
        package_project: bool,

        /// A directory or file included in the bundles (repeatable); defaults
        /// to the current directory.
        #[arg(long)]
        include_paths: Vec<String>,

        /// Builds and packs the runtime environment.
        #[arg(long)]
        package_env: bool,

        /// The kind of environment (`conda` or `docker`).
        #[arg(long, default_value = "conda")]
        env_type: EnvKind,

        /// A command run inside the environment to install libraries
        /// (repeatable).
        #[arg(long, default_values_t = [
            String::from("pip install poetry==1.7.1"),
            String::from("poetry install"),
        ])]
        env_exec_cmd: Vec<String>,

        /// The Python version of the environment.
        #[arg(long, default_value = "3.9")]
        env_python_version: String,

        /// The proxy endpoint used while building the environment.
        #[arg(long, default_value = "")]
        env_proxy: String,
    },
}

/// Uploads the artifacts of a job and submits it.
#[allow(clippy::too_many_arguments)]
async fn run_job(
    session: &Session,
    job_name: String,
    entry_point: String,
    spark_submit_parameters: String,
    s3_code_uri: String,
    s3_logs_uri: Option<String>,
    entry_point_arguments: Vec<String>,
    execution_timeout: Option<u32>,
    ping_duration: Option<u64>,
    tags: Vec<String>,
    wait: bool,
    show_output: bool,
    exclude_paths: Vec<String>,
) -> Result<()> {
    let mut artifacts = extract_artifacts(&spark_submit_parameters);
    artifacts.push(entry_point.clone());

    let submission = Submission::builder()
        .name(job_name)
        .entry_point(entry_point)
        .code_uri(s3_code_uri.clone())
        .entry_point_arguments(entry_point_arguments)
        .spark_submit_parameters(spark_submit_parameters)
        .maybe_logs_uri(s3_logs_uri)
        .maybe_execution_timeout(execution_timeout)
        .tags(tags)
        .wait(wait)
        .show_logs(show_output)
        .build();

    // Nothing is uploaded for a submission that would be rejected.
    submission.validate()?;
    submission.request()?;

    let uploaded = session
        .uploader()
        .with_progress(output::upload_progress()?)
        .upload(&s3_code_uri, &artifacts, &exclude_paths)
        .await?;
    let submission = submission.with_uploaded(uploaded);

    let id = session.submitter(ping_duration).submit(&submission).await?;
    output::print_json(&json!({ "jobRunId": id }))
}

/// Loads the configuration and connects to the remote services.
async fn connect(
    config_path: Option<PathBuf>,
    events: broadcast::Sender<Event>,
) -> Result<Session> {
    let config = session::load_config(config_path)?;
    Ok(Session::connect(config, events).await)
}

/// Prints one incremental read of the driver output of a job run.
async fn get_logs(session: &Session, job_id: &str) -> Result<()> {
    let run = session
        .client()
        .get_job_run(job_id)
        .await
        .map_err(Error::RemoteService)?;
    let mut cursors = LogCursors::default();

    let tail = log::tail(
        session.store(),
        session.client().application_id(),
        &run,
        &mut cursors,
    )
    .await
    .with_context(|| format!("failed to read the logs of `{job_id}`"))?;

    if let log::Tail::Fallback { error, .. } = &tail {
        eprintln!("Unable to read stdout ({error}); reading stderr instead");
    }

    match tail.content() {
        Some((_, chunk)) => output::print_log(&chunk.content),
        None => eprintln!("No logs are available for `{job_id}`"),
    }

    println!("Offset: {}", tail.offset());
    Ok(())
}

/// Builds the requested bundles.
#[allow(clippy::too_many_arguments)]
async fn package_dependencies(
    output_dir: PathBuf,
    package_project: bool,
    include_paths: Vec<String>,
    package_env: bool,
    env_type: EnvKind,
    env_exec_cmd: Vec<String>,
    env_python_version: String,
    env_proxy: String,
) -> Result<()> {
    let include_paths = if include_paths.is_empty() {
        vec![
            std::env::current_dir()
                .context("failed to get the current directory")?
                .display()
                .to_string(),
        ]
    } else {
        include_paths
    };

    let config = package::Config::builder()
        .output_dir(output_dir)
        .package_project(package_project)
        .include_paths(include_paths)
        .package_env(package_env)
        .env_kind(env_type)
        .exec_commands(env_exec_cmd)
        .python_version(env_python_version)
        .proxy(env_proxy)
        .build();

    build_package(&config).await?;
    Ok(())
}

/// Runs a command.
///
/// Every command except packaging connects to the remote services first.
async fn dispatch(
    command: Command,
    config_path: Option<PathBuf>,
    events: broadcast::Sender<Event>,
) -> Result<()> {
    match command {
        Command::Run {
            job_name,
            entry_point,
            spark_submit_parameters,
            s3_code_uri,
            s3_logs_uri,
            entry_point_arguments,
            execution_timeout,
            ping_duration,
            tags,
            wait,
            show_output,
            exclude_paths,
        } => {
            let session = connect(config_path, events).await?;
            run_job(
                &session,
                job_name,
                entry_point,
                spark_submit_parameters,
                s3_code_uri,
                s3_logs_uri,
                entry_point_arguments,
                execution_timeout,
                ping_duration,
                tags,
                wait,
                show_output,
                exclude_paths,
            )
            .await
        }
        Command::ListJobRuns {
            max_results,
            states,
        } => {
            let session = connect(config_path, events).await?;
            let states = if states.is_empty() {
                State::LISTABLE.to_vec()
            } else {
                states
            };

            let runs = session
                .client()
                .list_job_runs(max_results, &states)
                .await
                .map_err(Error::RemoteService)?;
            output::print_json(&runs)
        }
        Command::GetJobRun { job_id } => {
            let session = connect(config_path, events).await?;
            let run = session
                .client()
                .get_job_run(&job_id)
                .await
                .map_err(Error::RemoteService)?;
            output::print_json(&run)
        }
        Command::CancelJobRun { job_id } => {
            let session = connect(config_path, events).await?;
            let cancellation = session
                .client()
                .cancel_job_run(&job_id)
                .await
                .map_err(Error::RemoteService)?;
            output::print_json(&cancellation)
        }
        Command::GetDashboardForJobRun { job_id } => {
            let session = connect(config_path, events).await?;
            let url = session
                .client()
                .dashboard_url(&job_id)
                .await
                .map_err(Error::RemoteService)?;
            println!("Job: {job_id}, dashboard link: {url}");
            Ok(())
        }
        Command::ResumeJobTracking {
            job_id,
            show_output,
            ping_duration,
        } => {
            let session = connect(config_path, events).await?;
            let tracked = session
                .tracker(ping_duration)
                .track(&job_id, show_output)
                .await?;
            output::print_json(&tracked.job_run)
        }
        Command::GetLogs { job_id } => {
            let session = connect(config_path, events).await?;
            get_logs(&session, &job_id).await
        }
        Command::PackageDependencies {
            output_dir,
            package_project,
            include_paths,
            package_env,
            env_type,
            env_exec_cmd,
            env_python_version,
            env_proxy,
        } => {
            drop(events);
            package_dependencies(
                output_dir,
                package_project,
                include_paths,
                package_env,
                env_type,
                env_exec_cmd,
                env_python_version,
                env_proxy,
            )
            .await
        }
    }
}

/// Runs the command while printing the events it produces.
async fn run(args: Args) -> Result<()> {
    let (tx, rx) = broadcast::channel(EVENTS_CAPACITY);
    let printer = tokio::spawn(output::print_events(rx));

    let result = dispatch(args.command, args.config_path, tx).await;

    printer
        .await
        .map_err(|e| eyre!("the event printer failed: {e}"))?;
    result
}

fn main() -> Result<()> {
    let args = Args::parse();

    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_max_level(args.verbose.log_level_filter().as_trace())
            .with_writer(std::io::stderr)
            .init(),
    };

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the runtime")?
        .block_on(run(args))
}
