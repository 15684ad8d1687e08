//! Services the engine talks to.

use aws_config::BehaviorVersion;
use aws_config::SdkConfig;
use aws_sdk_s3::config::Region;
use tracing::debug;

pub mod client;
pub mod storage;

pub use client::JobClient;
pub use storage::ObjectStore;

/// Loads the shared AWS configuration.
///
/// Credentials and (absent an explicit `region`) the region are resolved from
/// the ambient environment.
pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = region {
        debug!("using AWS region `{region}`");
        loader = loader.region(Region::new(region.to_string()));
    }

    loader.load().await
}
