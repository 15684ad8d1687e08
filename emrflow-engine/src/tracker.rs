//! Tracking of job runs until they reach a terminal state.

use std::sync::Arc;
use std::time::Duration;

use emrflow_events::Event;
use emrflow_events::send_event;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::Error;
use crate::Result;
use crate::job::JobRun;
use crate::job::State;
use crate::log::LogCursors;
use crate::log::Tail;
use crate::service::client::JobClient;
use crate::service::storage::ObjectStore;

/// The default interval between two polls of a job run.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// The default interval between two dashboard links.
const DEFAULT_DASHBOARD_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// The outcome of tracking a job run.
#[derive(Clone, Debug)]
pub struct Tracked {
    /// Whether the job run reached a terminal state.
    pub done: bool,
    /// The last observed state.
    pub state: State,
    /// The last fetched job run.
    pub job_run: JobRun,
}

/// Tracks job runs by polling the job-execution service.
#[derive(Clone, Debug)]
pub struct Tracker {
    /// The job-execution service.
    client: Arc<dyn JobClient>,
    /// The store driver logs are read from.
    store: Arc<dyn ObjectStore>,
    /// The interval between two polls.
    interval: Duration,
    /// The interval between two dashboard links.
    dashboard_interval: Duration,
    /// The events sender.
    events: Option<broadcast::Sender<Event>>,
}

impl Tracker {
    /// Creates a new tracker with the default intervals.
    pub fn new(client: Arc<dyn JobClient>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            client,
            store,
            interval: DEFAULT_INTERVAL,
            dashboard_interval: DEFAULT_DASHBOARD_INTERVAL,
            events: None,
        }
    }

    /// Sets the interval between two polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the interval between two dashboard links.
    pub fn with_dashboard_interval(mut self, interval: Duration) -> Self {
        self.dashboard_interval = interval;
        self
    }

    /// Sets the sender tracking events are broadcast to.
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    /// Gets the job-execution service.
    pub fn client(&self) -> &Arc<dyn JobClient> {
        &self.client
    }

    /// Polls a job run until it reaches a terminal state.
    ///
    /// A failure to get the job run ends tracking with an error. Failures to
    /// get the dashboard link or to read the logs never do.
    ///
    /// Every iteration ends with a sleep of one interval, including the one
    /// that observes the terminal state.
    pub async fn track(&self, id: &str, show_logs: bool) -> Result<Tracked> {
        let mut state = State::Submitted;
        let mut dashboard_shown = Instant::now();
        let mut cursors = LogCursors::default();

        info!("tracking job run `{id}`");

        loop {
            let job_run = self
                .client
                .get_job_run(id)
                .await
                .map_err(Error::RemoteService)?;

            trace!("job run `{id}` is in state `{}`", job_run.state);

            if job_run.state != state {
                info!("job run `{id}` is now `{}`", job_run.state);
                state = job_run.state;
                send_event!(
                    self.events,
                    Event::JobStateChanged {
                        id: id.to_string(),
                        state: state.to_string(),
                    }
                );
            }

            if dashboard_shown.elapsed() >= self.dashboard_interval {
                self.show_dashboard(id).await;
                dashboard_shown = Instant::now();
            }

            if show_logs {
                self.show_logs(&job_run, &mut cursors).await;
            }

            let done = state.is_terminal();
            tokio::time::sleep(self.interval).await;

            if done {
                info!("job run `{id}` finished with state `{state}`");
                send_event!(
                    self.events,
                    Event::JobFinished {
                        id: id.to_string(),
                        state: state.to_string(),
                    }
                );

                return Ok(Tracked {
                    done,
                    state,
                    job_run,
                });
            }
        }
    }

    /// Gets the dashboard link of a job run and broadcasts it.
    ///
    /// Failures are ignored.
    async fn show_dashboard(&self, id: &str) {
        match self.client.dashboard_url(id).await {
            Ok(url) => {
                info!("dashboard for job run `{id}`: {url}");
                send_event!(
                    self.events,
                    Event::DashboardAvailable {
                        id: id.to_string(),
                        url,
                    }
                );
            }
            Err(e) => debug!("no dashboard for job run `{id}`: {e:#}"),
        }
    }

    /// Reads the new driver log content of a job run and broadcasts it.
    async fn show_logs(&self, job_run: &JobRun, cursors: &mut LogCursors) {
        let tail = match crate::log::tail(
            self.store.as_ref(),
            self.client.application_id(),
            job_run,
            cursors,
        )
        .await
        {
            Ok(tail) => tail,
            Err(e) => {
                warn!("unable to read the logs of job run `{}`: {e}", job_run.id);
                return;
            }
        };

        if let Tail::Fallback { error, stream, .. } = &tail {
            send_event!(
                self.events,
                Event::LogReadFailed {
                    id: job_run.id.clone(),
                    stream: stream.alternate(),
                    message: error.to_string(),
                }
            );
        }

        if let Tail::Fallback {
            stream,
            result: Err(e),
            ..
        } = &tail
        {
            send_event!(
                self.events,
                Event::LogReadFailed {
                    id: job_run.id.clone(),
                    stream: *stream,
                    message: e.to_string(),
                }
            );
        }

        if let Some((stream, chunk)) = tail.content() {
            if !chunk.content.is_empty() {
                send_event!(
                    self.events,
                    Event::LogOutput {
                        id: job_run.id.clone(),
                        stream,
                        content: chunk.content.clone(),
                    }
                );
            }
        }
    }
}
