//! An EMR Serverless job client.
//!
//! Learn more about the EMR Serverless API [here][api].
//!
//! [api]: https://docs.aws.amazon.com/emr-serverless/latest/APIReference/Welcome.html

use std::collections::HashMap;

use anyhow::Context as _;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_emrserverless::Client;
use aws_sdk_emrserverless::types::ConfigurationOverrides;
use aws_sdk_emrserverless::types::JobDriver;
use aws_sdk_emrserverless::types::JobRunState;
use aws_sdk_emrserverless::types::MonitoringConfiguration;
use aws_sdk_emrserverless::types::S3MonitoringConfiguration;
use aws_sdk_emrserverless::types::SparkSubmit;
use tracing::debug;
use tracing::trace;

use super::JobClient;
use crate::job::Cancellation;
use crate::job::JobRequest;
use crate::job::JobRun;
use crate::job::State;

/// A client for an EMR Serverless application.
#[derive(Clone, Debug)]
pub struct Serverless {
    /// The inner SDK client.
    client: Client,
    /// The application job runs are submitted to.
    application_id: String,
    /// The role job runs execute as.
    job_role: String,
}

impl Serverless {
    /// Creates a new [`Serverless`] client from an SDK client.
    pub fn new(
        client: Client,
        application_id: impl Into<String>,
        job_role: impl Into<String>,
    ) -> Self {
        Self {
            client,
            application_id: application_id.into(),
            job_role: job_role.into(),
        }
    }

    /// Creates a new [`Serverless`] client from the emrflow configuration and
    /// the shared AWS configuration.
    pub fn from_config(config: &emrflow_config::Config, sdk: &SdkConfig) -> Self {
        Self::new(Client::new(sdk), config.application_id(), config.job_role())
    }
}

/// Builds the configuration overrides that send logs to `log_uri`.
fn log_overrides(log_uri: &str) -> ConfigurationOverrides {
    ConfigurationOverrides::builder()
        .monitoring_configuration(
            MonitoringConfiguration::builder()
                .s3_monitoring_configuration(
                    S3MonitoringConfiguration::builder().log_uri(log_uri).build(),
                )
                .build(),
        )
        .build()
}

/// Converts a job run reported by the SDK.
fn job_run(run: &aws_sdk_emrserverless::types::JobRun) -> JobRun {
    JobRun {
        id: run.job_run_id().to_string(),
        name: run.name().map(str::to_string),
        state: state(run.state()),
        state_details: non_empty(run.state_details()),
        log_uri: run
            .configuration_overrides()
            .and_then(|overrides| overrides.monitoring_configuration())
            .and_then(|monitoring| monitoring.s3_monitoring_configuration())
            .and_then(|s3| s3.log_uri())
            .map(str::to_string),
    }
}

/// Converts a state reported by the SDK.
fn state(state: &JobRunState) -> State {
    let converted = State::from_remote(state.as_str());

    if converted == State::Unknown {
        debug!("unrecognized job run state `{}`", state.as_str());
    }

    converted
}

/// Returns `None` for empty strings.
fn non_empty(value: &str) -> Option<String> {
    Some(value).filter(|v| !v.is_empty()).map(str::to_string)
}

#[async_trait]
impl JobClient for Serverless {
    fn application_id(&self) -> &str {
        &self.application_id
    }

    async fn get_job_run(&self, id: &str) -> Result<JobRun> {
        let response = self
            .client
            .get_job_run()
            .application_id(&self.application_id)
            .job_run_id(id)
            .send()
            .await
            .with_context(|| format!("failed to get job run `{id}`"))?;

        trace!("response for job run `{id}`: {response:?}");

        response
            .job_run()
            .map(job_run)
            .with_context(|| format!("the response for job run `{id}` is missing the job run"))
    }

    async fn dashboard_url(&self, id: &str) -> Result<String> {
        let response = self
            .client
            .get_dashboard_for_job_run()
            .application_id(&self.application_id)
            .job_run_id(id)
            .send()
            .await
            .with_context(|| format!("failed to get the dashboard for job run `{id}`"))?;

        response
            .url()
            .map(str::to_string)
            .with_context(|| format!("no dashboard is available for job run `{id}`"))
    }

    async fn run_job(&self, request: &JobRequest) -> Result<String> {
        let spark_submit = SparkSubmit::builder()
            .entry_point(&request.spark_submit.entry_point)
            .set_entry_point_arguments(request.spark_submit.entry_point_arguments.clone())
            .set_spark_submit_parameters(request.spark_submit.spark_submit_parameters.clone())
            .build()
            .context("invalid spark-submit job driver")?;

        let tags = request
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<HashMap<_, _>>();

        debug!(
            "starting job run `{name}` in application `{application}`",
            name = request.name,
            application = self.application_id
        );

        let response = self
            .client
            .start_job_run()
            .application_id(&self.application_id)
            .execution_role_arn(&self.job_role)
            .name(&request.name)
            .job_driver(JobDriver::SparkSubmit(spark_submit))
            .set_configuration_overrides(request.log_uri.as_deref().map(log_overrides))
            .set_tags(Some(tags))
            .set_execution_timeout_minutes(request.execution_timeout_minutes.map(i64::from))
            .send()
            .await
            .with_context(|| format!("failed to start job run `{}`", request.name))?;

        Ok(response.job_run_id().to_string())
    }

    async fn list_job_runs(&self, max_results: i32, states: &[State]) -> Result<Vec<JobRun>> {
        let response = self
            .client
            .list_job_runs()
            .application_id(&self.application_id)
            .max_results(max_results)
            .set_states(Some(
                states
                    .iter()
                    .map(|state| JobRunState::from(state.as_str()))
                    .collect(),
            ))
            .send()
            .await
            .context("failed to list job runs")?;

        Ok(response
            .job_runs()
            .iter()
            .map(|summary| JobRun {
                id: summary.id().to_string(),
                name: summary.name().map(str::to_string),
                state: state(summary.state()),
                state_details: non_empty(summary.state_details()),
                log_uri: None,
            })
            .collect())
    }

    async fn cancel_job_run(&self, id: &str) -> Result<Cancellation> {
        let response = self
            .client
            .cancel_job_run()
            .application_id(&self.application_id)
            .job_run_id(id)
            .send()
            .await
            .with_context(|| format!("failed to cancel job run `{id}`"))?;

        Ok(Cancellation {
            application_id: response.application_id().to_string(),
            job_run_id: response.job_run_id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_overrides_point_at_the_log_uri() {
        let overrides = log_overrides("s3://logs/emr");
        let uri = overrides
            .monitoring_configuration()
            .and_then(|m| m.s3_monitoring_configuration())
            .and_then(|s3| s3.log_uri());

        assert_eq!(uri, Some("s3://logs/emr"));
    }

    #[test]
    fn empty_details_are_dropped() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("boom"), Some(String::from("boom")));
    }

    #[test]
    fn sdk_states_are_converted() {
        assert_eq!(state(&JobRunState::Success), State::Success);
        assert_eq!(state(&JobRunState::from("QUEUED")), State::Queued);
        assert_eq!(state(&JobRunState::from("NEWLY_ADDED")), State::Unknown);
    }
}
