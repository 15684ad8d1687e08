//! Submit, track and package Spark jobs for EMR Serverless.

#[cfg(feature = "config")]
#[doc(inline)]
pub use emrflow_config as config;
#[cfg(feature = "config")]
#[doc(inline)]
pub use emrflow_config::Config;
#[cfg(feature = "engine")]
#[doc(inline)]
pub use emrflow_engine as engine;
#[cfg(feature = "engine")]
#[doc(inline)]
pub use emrflow_engine::Submitter;
#[cfg(feature = "engine")]
#[doc(inline)]
pub use emrflow_engine::Tracker;
#[cfg(feature = "events")]
#[doc(inline)]
pub use emrflow_events as events;
