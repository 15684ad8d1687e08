//! In-memory stand-ins for the remote services used by the engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::VecDeque;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::Result;
use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use emrflow_engine::JobRun;
use emrflow_engine::State;
use emrflow_engine::job::Cancellation;
use emrflow_engine::job::JobRequest;
use emrflow_engine::service::client::JobClient;
use emrflow_engine::service::storage::ObjectStore;
use flate2::Compression;
use flate2::write::GzEncoder;

/// The application every fake job run belongs to.
pub const APPLICATION: &str = "app-1";

/// The id every submitted fake job run gets.
pub const JOB_RUN: &str = "job-1";

/// A job client that replays a scripted sequence of states.
#[derive(Debug, Default)]
pub struct FakeClient {
    /// The states returned by successive polls; the last one repeats.
    states: Mutex<VecDeque<State>>,
    /// The state returned once the script has run out.
    last: Mutex<Option<State>>,
    /// The failure detail attached to terminal states.
    details: Option<String>,
    /// The log base of every job run.
    log_uri: Option<String>,
    /// Whether getting a job run fails.
    fail_gets: bool,
    /// The dashboard link returned for every job run (if any).
    dashboard: Option<String>,
    /// The requests received by `run_job`.
    pub requests: Mutex<Vec<JobRequest>>,
    /// The number of `get_job_run` calls.
    pub gets: AtomicUsize,
    /// The number of `dashboard_url` calls.
    pub dashboards: AtomicUsize,
}

impl FakeClient {
    /// Creates a client whose job run goes through `states`.
    pub fn with_states(states: impl IntoIterator<Item = State>) -> Self {
        Self {
            states: Mutex::new(states.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Creates a client whose polls always fail.
    pub fn failing() -> Self {
        Self {
            fail_gets: true,
            ..Default::default()
        }
    }

    /// Sets the log base of job runs.
    pub fn logging_to(mut self, log_uri: &str) -> Self {
        self.log_uri = Some(log_uri.to_string());
        self
    }

    /// Sets the failure detail of job runs.
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }

    /// Sets the dashboard link of job runs.
    pub fn with_dashboard(mut self, url: &str) -> Self {
        self.dashboard = Some(url.to_string());
        self
    }

    /// Gets the number of submitted job runs.
    pub fn runs(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl JobClient for FakeClient {
    fn application_id(&self) -> &str {
        APPLICATION
    }

    async fn get_job_run(&self, id: &str) -> Result<JobRun> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        if self.fail_gets {
            bail!("service unavailable");
        }

        let mut last = self.last.lock().unwrap();
        let state = match self.states.lock().unwrap().pop_front() {
            Some(state) => state,
            None => last.unwrap_or(State::Running),
        };
        *last = Some(state);

        Ok(JobRun {
            id: id.to_string(),
            name: Some(String::from("job")),
            state,
            state_details: if state.is_terminal() {
                self.details.clone()
            } else {
                None
            },
            log_uri: self.log_uri.clone(),
        })
    }

    async fn dashboard_url(&self, _: &str) -> Result<String> {
        self.dashboards.fetch_add(1, Ordering::SeqCst);

        match &self.dashboard {
            Some(url) => Ok(url.clone()),
            None => bail!("dashboards are unavailable"),
        }
    }

    async fn run_job(&self, request: &JobRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(JOB_RUN.to_string())
    }

    async fn list_job_runs(&self, _: i32, _: &[State]) -> Result<Vec<JobRun>> {
        Ok(Vec::new())
    }

    async fn cancel_job_run(&self, id: &str) -> Result<Cancellation> {
        Ok(Cancellation {
            application_id: APPLICATION.to_string(),
            job_run_id: id.to_string(),
        })
    }
}

/// An object store backed by a map of `(bucket, key)` to contents.
#[derive(Debug, Default)]
pub struct FakeStore {
    /// The stored objects.
    objects: Mutex<HashMap<(String, String), Bytes>>,
    /// The local paths uploaded so far with their destination key.
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeStore {
    /// Stores an object.
    pub fn put(&self, bucket: &str, key: &str, contents: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), contents.into());
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes> {
        match self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
        {
            Some(contents) => Ok(contents.clone()),
            None => bail!("no such key `{key}` in bucket `{bucket}`"),
        }
    }

    async fn upload(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64> {
        let contents = std::fs::read(path)?;
        let size = contents.len() as u64;

        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), key.to_string()));
        self.put(bucket, key, contents);

        on_progress(size);
        Ok(size)
    }
}

/// Compresses `data` with gzip.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Gets the key of a driver log stream written under the `logs` bucket root.
pub fn driver_log_key(file: &str) -> String {
    format!("applications/{APPLICATION}/jobs/{JOB_RUN}/SPARK_DRIVER/{file}")
}
