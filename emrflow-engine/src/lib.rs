//! The engine that powers emrflow.
//!
//! The engine submits Spark jobs to a managed job-execution service, uploads
//! the local artifacts they reference beforehand, and tracks a job run until
//! it reaches a terminal state (optionally tailing its driver logs).
//!
//! The remote services are reached through two traits:
//!
//! * [`JobClient`](service::client::JobClient) for job runs.
//! * [`ObjectStore`](service::storage::ObjectStore) for artifacts and logs.

use thiserror::Error;

pub mod artifact;
pub mod job;
pub mod log;
pub mod package;
pub mod service;
pub mod submit;
pub mod tracker;

pub use job::JobRun;
pub use job::State;
pub use submit::Submission;
pub use submit::Submitter;
pub use tracker::Tracker;

/// An error within the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The request cannot be submitted as configured.
    ///
    /// These are raised before contacting the remote service.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A call to the job-execution service failed.
    #[error("remote service error: {0:#}")]
    RemoteService(anyhow::Error),

    /// A call to the object storage failed.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    /// A local artifact could not be read.
    #[error("artifact `{path}` could not be read: {source}")]
    Artifact {
        /// The path of the artifact.
        path: String,
        /// The underlying i/o error.
        source: std::io::Error,
    },

    /// A job run reached a terminal state other than success.
    #[error(
        "job `{id}` failed with state `{state}`: {}",
        .details.as_deref().unwrap_or("no details were provided")
    )]
    JobFailed {
        /// The id of the job run.
        id: String,
        /// The terminal state.
        state: State,
        /// The failure detail reported by the service.
        details: Option<String>,
    },

    /// A packaging step failed.
    #[error("packaging step `{step}` failed: {reason}")]
    Package {
        /// The step that failed.
        step: &'static str,
        /// Why the step failed.
        reason: String,
    },
}

/// A [`Result`](std::result::Result) with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
