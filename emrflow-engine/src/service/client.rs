//! Clients for job-execution services.

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;

use crate::job::Cancellation;
use crate::job::JobRequest;
use crate::job::JobRun;
use crate::job::State;

pub mod serverless;

pub use serverless::Serverless;

/// A job-execution service.
///
/// Each method maps onto a single call to the remote service. Failures are
/// returned as-is; the engine never retries them.
#[async_trait]
pub trait JobClient: Debug + Send + Sync + 'static {
    /// Gets the id of the application job runs belong to.
    fn application_id(&self) -> &str;

    /// Gets a job run.
    async fn get_job_run(&self, id: &str) -> Result<JobRun>;

    /// Gets the dashboard URL of a job run.
    async fn dashboard_url(&self, id: &str) -> Result<String>;

    /// Starts a job run and returns its id.
    async fn run_job(&self, request: &JobRequest) -> Result<String>;

    /// Lists up to `max_results` job runs in any of the given `states`.
    async fn list_job_runs(&self, max_results: i32, states: &[State]) -> Result<Vec<JobRun>>;

    /// Cancels a job run.
    async fn cancel_job_run(&self, id: &str) -> Result<Cancellation>;
}
