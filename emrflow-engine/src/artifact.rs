//! Artifacts referenced by a job and their upload to object storage.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::TryStreamExt as _;
use indexmap::IndexMap;
use indexmap::IndexSet;
use indicatif::ProgressBar;
use tracing::debug;
use tracing::info;

use crate::Error;
use crate::Result;
use crate::service::storage::ObjectStore;
use crate::service::storage::ObjectUri;
use crate::service::storage::is_remote;
use crate::service::storage::join;

/// The default number of artifacts uploaded at once.
const DEFAULT_MAX_UPLOADS: usize = 4;

/// The Spark options whose values list artifacts, in the order they are
/// collected.
const ARTIFACT_KEYS: [&str; 5] = [
    "spark.submit.pyFiles",
    "spark.archives",
    "spark.jars",
    "spark.files",
    "spark.jars.packages",
];

/// Parses the `--conf key=value` options of a `spark-submit` option string.
///
/// Options that don't contain exactly one `=` are discarded.
fn parse_conf(parameters: &str) -> IndexMap<&str, &str> {
    parameters
        .split("--conf ")
        .filter_map(|option| {
            let mut parts = option.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Some((key.trim(), value.trim())),
                _ => None,
            }
        })
        .collect()
}

/// Extracts the artifacts referenced by a `spark-submit` option string.
///
/// Python files come first, then archives (without their `#alias`), jars,
/// plain files and finally packages.
pub fn extract_artifacts(parameters: &str) -> Vec<String> {
    let conf = parse_conf(parameters);
    let mut artifacts = Vec::new();

    for key in ARTIFACT_KEYS {
        let Some(value) = conf.get(key).filter(|v| !v.is_empty()) else {
            continue;
        };

        for artifact in value.split(',') {
            let artifact = if key == "spark.archives" {
                artifact.split('#').next().unwrap_or(artifact)
            } else {
                artifact
            };

            artifacts.push(artifact.to_string());
        }
    }

    artifacts
}

/// An artifact scheduled for upload.
#[derive(Debug)]
struct Upload {
    /// The local path.
    path: PathBuf,
    /// The destination key.
    key: String,
    /// The size in bytes.
    size: u64,
}

/// Uploads local artifacts underneath a code location.
#[derive(Clone, Debug)]
pub struct Uploader {
    /// The store artifacts are uploaded to.
    store: Arc<dyn ObjectStore>,
    /// The maximum number of uploads in flight.
    max_uploads: usize,
    /// The progress of all uploads, in bytes.
    progress: ProgressBar,
    /// The directory relative artifacts are resolved against.
    ///
    /// The working directory is used when this is not set.
    base_dir: Option<PathBuf>,
}

impl Uploader {
    /// Creates a new uploader.
    ///
    /// Progress is not drawn until a visible bar is set with
    /// [`with_progress()`](Self::with_progress).
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            max_uploads: DEFAULT_MAX_UPLOADS,
            progress: ProgressBar::hidden(),
            base_dir: None,
        }
    }

    /// Sets the maximum number of uploads in flight (at least one).
    pub fn with_max_uploads(mut self, max_uploads: usize) -> Self {
        self.max_uploads = max_uploads.max(1);
        self
    }

    /// Sets the progress bar advanced as bytes are uploaded.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the directory relative artifacts are read from.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Uploads `artifacts` underneath `code_uri`.
    ///
    /// Returns a map of each local artifact to its destination URI. Remote
    /// artifacts are skipped; excluded artifacts aren't uploaded but are still
    /// mapped to where they are expected to be.
    pub async fn upload(
        &self,
        code_uri: &str,
        artifacts: &[String],
        excludes: &[String],
    ) -> Result<IndexMap<String, String>> {
        let location = code_uri
            .parse::<ObjectUri>()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mut mapping = IndexMap::new();
        let mut pending = IndexSet::new();

        for artifact in artifacts {
            if is_remote(artifact) || mapping.contains_key(artifact) {
                continue;
            }

            mapping.insert(artifact.clone(), join(code_uri, artifact));

            if !excludes.contains(artifact) {
                pending.insert(artifact.as_str());
            }
        }

        let mut uploads = Vec::with_capacity(pending.len());
        for artifact in pending {
            let path = match &self.base_dir {
                Some(base_dir) => base_dir.join(artifact),
                None => PathBuf::from(artifact),
            };
            let size = tokio::fs::metadata(&path)
                .await
                .map_err(|source| Error::Artifact {
                    path: artifact.to_string(),
                    source,
                })?
                .len();

            uploads.push(Upload {
                path,
                key: join(location.key(), artifact),
                size,
            });
        }

        if uploads.is_empty() {
            debug!("no artifacts need to be uploaded");
            return Ok(mapping);
        }

        let total = uploads.iter().map(|upload| upload.size).sum::<u64>();
        info!(
            "uploading {count} artifact(s) ({total} bytes) to `{code_uri}`",
            count = uploads.len()
        );

        self.progress.set_length(total);
        self.progress.set_position(0);

        let progress = self.progress.clone();
        let on_progress = move |bytes: u64| progress.inc(bytes);

        futures::stream::iter(uploads.into_iter().map(|upload| {
            let on_progress = &on_progress;
            let bucket = location.bucket();
            async move {
                debug!(
                    "uploading `{path}` to `{bucket}/{key}`",
                    path = upload.path.display(),
                    key = upload.key
                );

                self.store
                    .upload(&upload.path, bucket, &upload.key, on_progress)
                    .await
                    .map_err(Error::Storage)
            }
        }))
        .buffer_unordered(self.max_uploads)
        .try_collect::<Vec<_>>()
        .await?;

        self.progress.finish();
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_are_collected_in_option_order() {
        let artifacts = extract_artifacts(
            "--conf spark.submit.pyFiles=a,b --conf spark.archives=c#x --conf spark.jars=d",
        );
        assert_eq!(artifacts, ["a", "b", "c", "d"]);
    }

    #[test]
    fn every_artifact_option_is_recognized() {
        let artifacts = extract_artifacts(
            "--conf spark.jars.packages=org:pkg:1.0 --conf spark.files=conf.json --conf \
             spark.jars=x.jar --conf spark.archives=env.tar.gz#environment,other.zip --conf \
             spark.submit.pyFiles=dist/src.zip",
        );
        assert_eq!(
            artifacts,
            [
                "dist/src.zip",
                "env.tar.gz",
                "other.zip",
                "x.jar",
                "conf.json",
                "org:pkg:1.0"
            ]
        );
    }

    #[test]
    fn malformed_and_unrelated_options_are_ignored() {
        let artifacts = extract_artifacts(
            "--conf spark.executor.memory=4g --conf spark.jars --conf \
             spark.files=a=b --conf spark.submit.pyFiles=",
        );
        assert!(artifacts.is_empty());
        assert!(extract_artifacts("").is_empty());
    }

    #[test]
    fn options_are_trimmed() {
        let conf = parse_conf("--conf  spark.jars = a.jar  --conf spark.files=b");
        assert_eq!(conf.get("spark.jars"), Some(&"a.jar"));
        assert_eq!(conf.get("spark.files"), Some(&"b"));
    }
}
