//! Submission of jobs.

use bon::Builder;
use emrflow_events::Event;
use emrflow_events::LogStream;
use emrflow_events::send_event;
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::info;
use tracing::warn;

use crate::Error;
use crate::Result;
use crate::job::JobRequest;
use crate::job::SparkSubmit;
use crate::log::stream_uri;
use crate::service::storage::join;
use crate::tracker::Tracker;

/// The tags attached to every job run, applied after the caller's tags.
pub const IMPLICIT_TAGS: [(&str, &str); 1] = [("utility", "emrflow")];

/// Parses `key:value` tag tokens.
pub fn parse_tags(tokens: &[String]) -> Result<IndexMap<String, String>> {
    tokens
        .iter()
        .map(|token| {
            token
                .split_once(':')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "tag `{token}` must be in the form `key:value`"
                    ))
                })
        })
        .collect()
}

/// Merges the implicit tags into the caller's tags.
///
/// Implicit tags win on key collisions.
pub fn merge_tags(mut tags: IndexMap<String, String>) -> IndexMap<String, String> {
    for (key, value) in IMPLICIT_TAGS {
        tags.insert(key.to_string(), value.to_string());
    }

    tags
}

/// Replaces every local path in `parameters` with its destination.
///
/// Replacements happen literally, in the order of the mapping.
pub fn substitute_paths(parameters: &str, uploaded: &IndexMap<String, String>) -> String {
    uploaded
        .iter()
        .fold(parameters.to_string(), |parameters, (source, destination)| {
            parameters.replace(source.as_str(), destination)
        })
        .trim()
        .to_string()
}

/// A job to submit.
#[derive(Builder, Clone, Debug)]
#[builder(builder_type = Builder)]
pub struct Submission {
    /// The name of the job run.
    #[builder(into)]
    name: String,

    /// The path of the entry point, relative to the code location.
    #[builder(into)]
    entry_point: String,

    /// The location the job's code was uploaded to.
    #[builder(into)]
    code_uri: String,

    /// The arguments passed to the entry point.
    #[builder(default)]
    entry_point_arguments: Vec<String>,

    /// The raw `spark-submit` options.
    #[builder(into)]
    spark_submit_parameters: Option<String>,

    /// Where the service writes logs.
    #[builder(into)]
    logs_uri: Option<String>,

    /// The maximum duration of the job run in minutes.
    execution_timeout: Option<u32>,

    /// The caller's `key:value` tags.
    #[builder(default)]
    tags: Vec<String>,

    /// Whether to wait for the job run to finish.
    #[builder(default)]
    wait: bool,

    /// Whether to show the driver logs while waiting.
    #[builder(default)]
    show_logs: bool,

    /// The destination of each uploaded local artifact.
    #[builder(default)]
    uploaded: IndexMap<String, String>,
}

impl Submission {
    /// Gets the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the log location (if one was given).
    pub fn logs_uri(&self) -> Option<&str> {
        self.logs_uri.as_deref().filter(|uri| !uri.is_empty())
    }

    /// Sets the destination of each uploaded local artifact.
    pub fn with_uploaded(mut self, uploaded: IndexMap<String, String>) -> Self {
        self.uploaded = uploaded;
        self
    }

    /// Whether the job run is tracked after submission.
    pub fn tracks(&self) -> bool {
        self.wait || self.show_logs
    }

    /// Ensures the submission can be sent.
    pub fn validate(&self) -> Result<()> {
        if self.show_logs && self.logs_uri().is_none() {
            return Err(Error::Configuration(String::from(
                "showing logs requires a log location to be set",
            )));
        }

        Ok(())
    }

    /// Builds the request sent to the job-execution service.
    pub fn request(&self) -> Result<JobRequest> {
        let spark_submit_parameters = self
            .spark_submit_parameters
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| substitute_paths(p, &self.uploaded));

        let entry_point_arguments =
            Some(self.entry_point_arguments.clone()).filter(|args| !args.is_empty());

        Ok(JobRequest {
            name: self.name.clone(),
            spark_submit: SparkSubmit {
                entry_point: join(&self.code_uri, &self.entry_point),
                entry_point_arguments,
                spark_submit_parameters,
            },
            log_uri: self.logs_uri().map(str::to_string),
            tags: merge_tags(parse_tags(&self.tags)?),
            execution_timeout_minutes: self.execution_timeout,
        })
    }
}

/// Submits jobs and optionally tracks them to completion.
#[derive(Clone, Debug)]
pub struct Submitter {
    /// The tracker (which also holds the job-execution service).
    tracker: Tracker,
    /// The events sender.
    events: Option<broadcast::Sender<Event>>,
}

impl Submitter {
    /// Creates a new submitter.
    pub fn new(tracker: Tracker) -> Self {
        Self {
            tracker,
            events: None,
        }
    }

    /// Sets the sender submission and tracking events are broadcast to.
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.tracker = self.tracker.with_events(events.clone());
        self.events = Some(events);
        self
    }

    /// Submits a job and returns the id of the job run.
    ///
    /// When the submission waits or shows logs, the job run is tracked until
    /// it finishes and any outcome other than success is an error.
    pub async fn submit(&self, submission: &Submission) -> Result<String> {
        submission.validate()?;
        let request = submission.request()?;

        let client = self.tracker.client();
        let id = client
            .run_job(&request)
            .await
            .map_err(Error::RemoteService)?;

        info!(
            "job `{name}` submitted as job run `{id}`",
            name = submission.name
        );
        send_event!(
            self.events,
            Event::JobSubmitted {
                id: id.clone(),
                name: submission.name.clone(),
            }
        );

        if !submission.tracks() {
            return Ok(id);
        }

        if let Some(logs_uri) = submission.logs_uri() {
            for stream in [LogStream::Stdout, LogStream::Stderr] {
                info!(
                    "{stream} of job run `{id}` is written to `{uri}`",
                    uri = stream_uri(logs_uri, client.application_id(), &id, stream)
                );
            }
        }

        let tracked = self.tracker.track(&id, submission.show_logs).await?;

        if !tracked.state.is_success() {
            warn!(
                "job run `{id}` failed: {}",
                tracked
                    .job_run
                    .state_details
                    .as_deref()
                    .unwrap_or("no details were provided")
            );

            return Err(Error::JobFailed {
                id,
                state: tracked.state,
                details: tracked.job_run.state_details,
            });
        }

        info!("job run `{id}` completed successfully");
        Ok(id)
    }
}
