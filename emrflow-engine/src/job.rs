//! Job runs as observed from the remote service.

use indexmap::IndexMap;
use serde::Serialize;

/// The state of a job run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// The job run has been accepted.
    Submitted,
    /// The job run is waiting for capacity.
    Pending,
    /// The job run is waiting in the application's queue.
    Queued,
    /// The job run has been scheduled onto workers.
    Scheduled,
    /// The job run is executing.
    Running,
    /// The job run finished successfully.
    Success,
    /// The job run failed.
    Failed,
    /// The job run is being cancelled.
    Cancelling,
    /// The job run was cancelled.
    Cancelled,
    /// The job run completed.
    Completed,
    /// The service reported a state this crate does not know about.
    Unknown,
}

impl State {
    /// Every state a job run can be listed by.
    pub const LISTABLE: [State; 8] = [
        State::Submitted,
        State::Pending,
        State::Scheduled,
        State::Running,
        State::Success,
        State::Failed,
        State::Cancelling,
        State::Cancelled,
    ];

    /// Whether the job run will not transition any further.
    ///
    /// `CANCELLING` is considered terminal: once a cancellation is in flight
    /// the outcome is already decided.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Success
                | State::Failed
                | State::Cancelling
                | State::Cancelled
                | State::Completed
        )
    }

    /// Whether the job run succeeded.
    pub fn is_success(&self) -> bool {
        *self == State::Success
    }

    /// Gets the name of the state as used by the remote service.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Submitted => "SUBMITTED",
            State::Pending => "PENDING",
            State::Queued => "QUEUED",
            State::Scheduled => "SCHEDULED",
            State::Running => "RUNNING",
            State::Success => "SUCCESS",
            State::Failed => "FAILED",
            State::Cancelling => "CANCELLING",
            State::Cancelled => "CANCELLED",
            State::Completed => "COMPLETED",
            State::Unknown => "UNKNOWN",
        }
    }

    /// Converts a state reported by the remote service.
    ///
    /// Unrecognized states map to [`State::Unknown`], which is not terminal.
    pub fn from_remote(state: &str) -> Self {
        state.parse().unwrap_or(State::Unknown)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(State::Submitted),
            "PENDING" => Ok(State::Pending),
            "QUEUED" => Ok(State::Queued),
            "SCHEDULED" => Ok(State::Scheduled),
            "RUNNING" => Ok(State::Running),
            "SUCCESS" => Ok(State::Success),
            "FAILED" => Ok(State::Failed),
            "CANCELLING" => Ok(State::Cancelling),
            "CANCELLED" => Ok(State::Cancelled),
            "COMPLETED" => Ok(State::Completed),
            _ => Err(format!("unknown job run state `{s}`")),
        }
    }
}

/// A job run.
///
/// Job runs are created by submission and only ever mutated by the remote
/// service; locally they are read-only snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    /// The id of the job run.
    pub id: String,

    /// The name the job run was submitted with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The current state.
    pub state: State,

    /// Details about the current state (typically the reason for a failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_details: Option<String>,

    /// The base location logs are written under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_uri: Option<String>,
}

/// The acknowledgement of a cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    /// The application the job run belongs to.
    pub application_id: String,
    /// The id of the cancelled job run.
    pub job_run_id: String,
}

/// The Spark driver of a job request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SparkSubmit {
    /// The location of the entry point.
    pub entry_point: String,
    /// The arguments passed to the entry point.
    pub entry_point_arguments: Option<Vec<String>>,
    /// The `spark-submit` options.
    pub spark_submit_parameters: Option<String>,
}

/// A fully resolved request to start a job run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    /// The name of the job run.
    pub name: String,
    /// The Spark driver.
    pub spark_submit: SparkSubmit,
    /// Where the service writes logs (if anywhere).
    pub log_uri: Option<String>,
    /// The tags attached to the job run.
    pub tags: IndexMap<String, String>,
    /// The maximum duration of the job run in minutes.
    pub execution_timeout_minutes: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        let terminal = [
            State::Success,
            State::Failed,
            State::Cancelling,
            State::Cancelled,
            State::Completed,
        ];

        for state in terminal {
            assert!(state.is_terminal(), "{state} should be terminal");
        }

        for state in [
            State::Submitted,
            State::Pending,
            State::Queued,
            State::Scheduled,
            State::Running,
            State::Unknown,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }

    #[test]
    fn remote_states_are_parsed() {
        assert_eq!(State::from_remote("RUNNING"), State::Running);
        assert_eq!(State::from_remote("success"), State::Success);
        assert_eq!(State::from_remote("SOMETHING_NEW"), State::Unknown);
        assert!("bogus".parse::<State>().is_err());
    }

    #[test]
    fn job_runs_serialize_with_service_names() {
        let run = JobRun {
            id: String::from("00f1"),
            name: None,
            state: State::Failed,
            state_details: Some(String::from("out of memory")),
            log_uri: None,
        };

        assert_eq!(
            serde_json::to_value(&run).unwrap(),
            serde_json::json!({
                "id": "00f1",
                "state": "FAILED",
                "stateDetails": "out of memory",
            })
        );
    }
}
