//! Object storage for artifacts and logs.

use std::fmt::Debug;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

pub mod s3;

pub use s3::S3;

/// An object store.
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync + 'static {
    /// Fetches the entire contents of an object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Uploads a local file to an object and returns the number of bytes
    /// uploaded.
    ///
    /// `on_progress` is called with the number of bytes transferred since the
    /// previous call.
    async fn upload(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64>;
}

/// An error related to an [`ObjectUri`].
#[derive(Debug)]
pub struct InvalidUriError {
    /// The URI that failed to parse.
    uri: String,
}

impl std::fmt::Display for InvalidUriError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` is not a valid object storage URI", self.uri)
    }
}

impl std::error::Error for InvalidUriError {}

/// The location of an object (or object prefix) such as
/// `s3://bucket/path/to/key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectUri {
    /// The bucket.
    bucket: String,
    /// The key (without leading or trailing slashes).
    key: String,
}

impl ObjectUri {
    /// Gets the bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Gets the key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::str::FromStr for ObjectUri {
    type Err = InvalidUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidUriError { uri: s.to_string() };
        let url = Url::parse(s).map_err(|_| err())?;

        let bucket = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(err)?
            .to_string();

        Ok(Self {
            bucket,
            key: url.path().trim_matches('/').to_string(),
        })
    }
}

/// Whether a reference points at an already remote object rather than a
/// local path.
pub fn is_remote(reference: &str) -> bool {
    reference.contains("://")
}

/// Joins a relative path onto a base URI or key prefix with a single `/`.
///
/// Leading `./` and `/` are removed from `path` so the result always stays
/// underneath `base`.
pub fn join(base: &str, path: &str) -> String {
    let path = path.trim_start_matches("./").trim_start_matches('/');
    let base = base.trim_end_matches('/');

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}/{path}")
    }
}
