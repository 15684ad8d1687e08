//! Configuration related to tracking job runs and uploading their artifacts.

use std::time::Duration;

use anyhow::bail;
use serde::Deserialize;
use serde::Serialize;

/// The default number of seconds between two polls of a job run.
pub const DEFAULT_POLL_INTERVAL: u64 = 30;

/// The default number of seconds between two dashboard links.
pub const DEFAULT_DASHBOARD_INTERVAL: u64 = 10 * 60;

/// The default number of artifacts uploaded concurrently.
pub const DEFAULT_MAX_UPLOADS: usize = 4;

/// A configuration object for job tracking.
// **NOTE:** all default values for this struct need to be tested below to
// ensure the defaults never change.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The number of seconds to wait between two polls of a job run.
    pub poll_interval: Option<u64>,

    /// The number of seconds between two dashboard links while tracking.
    pub dashboard_interval: Option<u64>,

    /// The maximum number of artifacts uploaded at once.
    pub max_uploads: Option<usize>,
}

impl Config {
    /// Validates the tracking configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_uploads == Some(0) {
            bail!("`max-uploads` must be at least one");
        }

        Ok(())
    }

    /// Gets the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL))
    }

    /// Gets the dashboard interval.
    pub fn dashboard_interval(&self) -> Duration {
        Duration::from_secs(
            self.dashboard_interval
                .unwrap_or(DEFAULT_DASHBOARD_INTERVAL),
        )
    }

    /// Gets the maximum number of concurrent uploads.
    pub fn max_uploads(&self) -> usize {
        self.max_uploads.unwrap_or(DEFAULT_MAX_UPLOADS)
    }
}
