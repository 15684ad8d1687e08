//! The connection to the remote services shared by the commands.

use std::path::PathBuf;
use std::sync::Arc;

use emrflow::Config;
use emrflow::engine::Submitter;
use emrflow::engine::Tracker;
use emrflow::engine::artifact::Uploader;
use emrflow::engine::service::client::Serverless;
use emrflow::engine::service::load_sdk_config;
use emrflow::engine::service::storage::S3;
use emrflow::events::Event;
use eyre::Context as _;
use eyre::Result;
use eyre::eyre;
use tokio::sync::broadcast;
use tracing::debug;

/// The configuration file read when no configuration path is given, if it
/// exists.
const LEGACY_FILE: &str = "emr_serverless_config.json";

/// Loads the configuration.
///
/// `path` is merged on top of the default sources. Without it, the legacy
/// configuration file in the home directory is used if present.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.or_else(|| {
        dirs::home_dir()
            .map(|home| home.join(LEGACY_FILE))
            .filter(|path| path.exists())
    });

    let config = Config::load_with_paths(path.iter())
        .context("failed to load the configuration")?;

    config
        .validate()
        .map_err(|e| eyre!("invalid configuration: {e:#}"))?;

    Ok(config)
}

/// The clients for one invocation.
#[derive(Debug)]
pub struct Session {
    /// The configuration the session was created from.
    config: Config,
    /// The job-execution service.
    client: Arc<Serverless>,
    /// The object store for artifacts and logs.
    store: Arc<S3>,
    /// Where events are broadcast.
    events: broadcast::Sender<Event>,
}

impl Session {
    /// Connects to the services named in the configuration.
    pub async fn connect(config: Config, events: broadcast::Sender<Event>) -> Self {
        let sdk = load_sdk_config(config.region()).await;
        debug!(
            "connected to application `{}` in region `{}`",
            config.application_id(),
            sdk.region()
                .map(|region| region.to_string())
                .unwrap_or_default()
        );

        Self {
            client: Arc::new(Serverless::from_config(&config, &sdk)),
            store: Arc::new(S3::from_sdk_config(&sdk)),
            config,
            events,
        }
    }

    /// Gets the job-execution service.
    pub fn client(&self) -> &Serverless {
        &self.client
    }

    /// Creates a tracker.
    ///
    /// `interval` overrides the configured poll interval.
    pub fn tracker(&self, interval: Option<u64>) -> Tracker {
        let tracking = self.config.tracking();

        Tracker::new(self.client.clone(), self.store.clone())
            .with_interval(
                interval
                    .map(std::time::Duration::from_secs)
                    .unwrap_or_else(|| tracking.poll_interval()),
            )
            .with_dashboard_interval(tracking.dashboard_interval())
            .with_events(self.events.clone())
    }

    /// Creates a submitter.
    pub fn submitter(&self, interval: Option<u64>) -> Submitter {
        Submitter::new(self.tracker(interval)).with_events(self.events.clone())
    }

    /// Creates an artifact uploader.
    pub fn uploader(&self) -> Uploader {
        Uploader::new(self.store.clone()).with_max_uploads(self.config.tracking().max_uploads())
    }

    /// Gets the object store.
    pub fn store(&self) -> &S3 {
        &self.store
    }
}
