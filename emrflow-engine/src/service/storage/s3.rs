//! An object store backed by Amazon S3.

use std::path::Path;

use anyhow::Context as _;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::primitives::Length;
use aws_sdk_s3::types::CompletedMultipartUpload;
use aws_sdk_s3::types::CompletedPart;
use bytes::Bytes;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ObjectStore;

/// The size of each part of a multipart upload.
///
/// Files no larger than this are uploaded with a single request.
pub const PART_SIZE: u64 = 8 * 1024 * 1024;

/// Splits `size` bytes into `(offset, length)` parts of at most `part_size`
/// bytes.
fn parts(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    let part_size = part_size.max(1);

    (0..size.div_ceil(part_size))
        .map(|i| {
            let offset = i * part_size;
            (offset, part_size.min(size - offset))
        })
        .collect()
}

/// An S3 object store.
#[derive(Clone, Debug)]
pub struct S3 {
    /// The inner SDK client.
    client: Client,
}

impl S3 {
    /// Creates a new [`S3`] store from an SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a new [`S3`] store from the shared AWS configuration.
    pub fn from_sdk_config(sdk: &SdkConfig) -> Self {
        Self::new(Client::new(sdk))
    }

    /// Uploads a file with a single request.
    async fn put(&self, path: &Path, bucket: &str, key: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("failed to open `{}`", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "failed to upload `{}` to `s3://{bucket}/{key}`",
                    path.display()
                )
            })?;

        Ok(())
    }

    /// Uploads the parts of a multipart upload, reporting each part as it
    /// completes.
    async fn put_parts(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
        size: u64,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<Vec<CompletedPart>> {
        let mut completed = Vec::new();

        for (number, (offset, length)) in (1..).zip(parts(size, PART_SIZE)) {
            let body = ByteStream::read_from()
                .path(path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .with_context(|| format!("failed to open `{}`", path.display()))?;

            trace!("uploading part {number} of `s3://{bucket}/{key}`");

            let part = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(number)
                .body(body)
                .send()
                .await
                .with_context(|| {
                    format!("failed to upload part {number} of `s3://{bucket}/{key}`")
                })?;

            completed.push(
                CompletedPart::builder()
                    .set_e_tag(part.e_tag().map(str::to_string))
                    .part_number(number)
                    .build(),
            );
            on_progress(length);
        }

        Ok(completed)
    }

    /// Uploads a file in parts.
    async fn put_multipart(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        size: u64,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to start uploading `s3://{bucket}/{key}`"))?;

        let upload_id = created
            .upload_id()
            .with_context(|| format!("no upload id was returned for `s3://{bucket}/{key}`"))?;

        let completed = match self
            .put_parts(path, bucket, key, upload_id, size, on_progress)
            .await
        {
            Ok(completed) => completed,
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    warn!("failed to abort the upload of `s3://{bucket}/{key}`: {abort}");
                }

                return Err(e);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .with_context(|| {
                format!(
                    "failed to upload `{}` to `s3://{bucket}/{key}`",
                    path.display()
                )
            })?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3 {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes> {
        trace!("fetching `s3://{bucket}/{key}`");

        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to get `s3://{bucket}/{key}`"))?;

        let data = object
            .body
            .collect()
            .await
            .with_context(|| format!("failed to read the body of `s3://{bucket}/{key}`"))?;

        Ok(data.into_bytes())
    }

    async fn upload(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64> {
        let size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to read metadata of `{}`", path.display()))?
            .len();

        debug!("uploading `{}` to `s3://{bucket}/{key}`", path.display());

        if size <= PART_SIZE {
            self.put(path, bucket, key).await?;
            on_progress(size);
        } else {
            self.put_multipart(path, bucket, key, size, on_progress).await?;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_split_into_parts() {
        assert!(parts(0, 4).is_empty());
        assert_eq!(parts(4, 4), [(0, 4)]);
        assert_eq!(parts(10, 4), [(0, 4), (4, 4), (8, 2)]);
    }

    #[test]
    fn parts_cover_large_files() {
        let size = 2 * PART_SIZE + 1;
        let parts = parts(size, PART_SIZE);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts.iter().map(|(_, length)| length).sum::<u64>(), size);
        assert_eq!(parts.last(), Some(&(2 * PART_SIZE, 1)));
    }
}
