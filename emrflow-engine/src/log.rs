//! Incremental reads of the compressed driver logs of a job run.
//!
//! The service writes each driver log stream as a gzip object that is
//! replaced as the job progresses. Objects can't be range-read (the offsets of
//! interest are in the _decompressed_ stream), so every read fetches the whole
//! object, decompresses it, and skips the bytes that were already seen.

use std::io;
use std::io::Read as _;

use bytes::Bytes;
use emrflow_events::LogStream;
use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::job::JobRun;
use crate::service::storage::ObjectStore;
use crate::service::storage::ObjectUri;
use crate::service::storage::join;

/// An error reading a log stream.
///
/// These errors are never fatal to tracking.
#[derive(Error, Debug)]
pub enum LogReadError {
    /// The job run doesn't write logs anywhere.
    #[error("job run `{0}` has no log location configured")]
    MissingLogUri(String),

    /// The location of the log stream is malformed.
    #[error("invalid log location `{0}`")]
    InvalidUri(String),

    /// The log object could not be fetched.
    #[error("failed to fetch `{uri}`: {source:#}")]
    Fetch {
        /// The location of the log stream.
        uri: String,
        /// The underlying storage error.
        source: anyhow::Error,
    },

    /// The log object could not be decompressed.
    #[error("failed to decompress `{uri}`: {source}")]
    Decompress {
        /// The location of the log stream.
        uri: String,
        /// The underlying i/o error.
        source: io::Error,
    },
}

/// Gets the location of a driver log stream.
///
/// The layout is fixed by the service:
/// `<log base>/applications/<application>/jobs/<job run>/SPARK_DRIVER/<file>`.
pub fn stream_uri(log_base: &str, application_id: &str, job_run_id: &str, stream: LogStream) -> String {
    join(
        log_base,
        &format!(
            "applications/{application_id}/jobs/{job_run_id}/SPARK_DRIVER/{file}",
            file = stream.file_name()
        ),
    )
}

/// The position reached in a decompressed log stream.
///
/// The offset never decreases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogCursor {
    /// The number of decompressed bytes consumed.
    offset: u64,
}

impl LogCursor {
    /// Creates a cursor at the given offset.
    pub fn at(offset: u64) -> Self {
        Self { offset }
    }

    /// Gets the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Moves the cursor forward to `offset`.
    ///
    /// Offsets behind the cursor are ignored.
    pub fn advance(&mut self, offset: u64) {
        self.offset = self.offset.max(offset);
    }
}

/// The cursors for both driver log streams of a job run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogCursors {
    /// The standard output cursor.
    pub stdout: LogCursor,
    /// The furthest standard error offset reached by a fallback read.
    pub stderr: LogCursor,
}

impl LogCursors {
    /// Gets the cursor for a stream.
    pub fn get(&self, stream: LogStream) -> LogCursor {
        match stream {
            LogStream::Stdout => self.stdout,
            LogStream::Stderr => self.stderr,
        }
    }

    /// Gets a mutable reference to the cursor for a stream.
    pub fn get_mut(&mut self, stream: LogStream) -> &mut LogCursor {
        match stream {
            LogStream::Stdout => &mut self.stdout,
            LogStream::Stderr => &mut self.stderr,
        }
    }
}

/// New content read from a log stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// The bytes after the previous offset (possibly empty).
    pub content: Bytes,
    /// The offset reached.
    pub offset: u64,
}

/// Reads the content of a compressed log object that comes after
/// `last_offset` in the decompressed stream.
pub async fn read_new_content(
    store: &dyn ObjectStore,
    uri: &str,
    last_offset: u64,
) -> Result<Chunk, LogReadError> {
    let location = uri
        .parse::<ObjectUri>()
        .map_err(|_| LogReadError::InvalidUri(uri.to_string()))?;

    let compressed = store
        .fetch(location.bucket(), location.key())
        .await
        .map_err(|source| LogReadError::Fetch {
            uri: uri.to_string(),
            source,
        })?;

    let (content, end) =
        decompress_after(&compressed, last_offset).map_err(|source| LogReadError::Decompress {
            uri: uri.to_string(),
            source,
        })?;

    trace!(
        "read {len} new byte(s) from `{uri}` (offset {last_offset} -> {end})",
        len = content.len()
    );

    Ok(Chunk {
        content: Bytes::from(content),
        offset: end.max(last_offset),
    })
}

/// Decompresses `compressed`, discarding the first `offset` bytes.
///
/// Returns the remaining bytes and the end position of the decompressed
/// stream.
fn decompress_after(compressed: &[u8], offset: u64) -> io::Result<(Vec<u8>, u64)> {
    let mut decoder = MultiGzDecoder::new(compressed);
    let skipped = io::copy(&mut (&mut decoder).take(offset), &mut io::sink())?;

    let mut content = Vec::new();
    decoder.read_to_end(&mut content)?;

    let end = skipped + content.len() as u64;
    Ok((content, end))
}

/// The outcome of tailing the driver logs of a job run.
#[derive(Debug)]
pub enum Tail {
    /// The primary stream was read.
    Read {
        /// The stream that was read.
        stream: LogStream,
        /// The content read.
        chunk: Chunk,
    },

    /// The primary stream could not be read, so the alternate stream was.
    Fallback {
        /// Why the primary stream could not be read.
        error: LogReadError,
        /// The alternate stream.
        stream: LogStream,
        /// The result of reading the alternate stream.
        result: Result<Chunk, LogReadError>,
    },
}

impl Tail {
    /// Gets the offset reached on the stream that was read last.
    ///
    /// This is zero when neither stream could be read.
    pub fn offset(&self) -> u64 {
        match self {
            Tail::Read { chunk, .. } => chunk.offset,
            Tail::Fallback { result, .. } => result.as_ref().map(|c| c.offset).unwrap_or(0),
        }
    }

    /// Gets the stream and content read (if anything was read).
    pub fn content(&self) -> Option<(LogStream, &Chunk)> {
        match self {
            Tail::Read { stream, chunk } => Some((*stream, chunk)),
            Tail::Fallback {
                stream,
                result: Ok(chunk),
                ..
            } => Some((*stream, chunk)),
            Tail::Fallback { result: Err(_), .. } => None,
        }
    }
}

/// Reads new content from the driver's standard output, falling back to
/// standard error when standard output can't be read.
///
/// Standard error is always read in full on a fallback. Cursors only advance
/// for streams that were read successfully.
pub async fn tail(
    store: &dyn ObjectStore,
    application_id: &str,
    job_run: &JobRun,
    cursors: &mut LogCursors,
) -> Result<Tail, LogReadError> {
    let log_base = job_run
        .log_uri
        .as_deref()
        .ok_or_else(|| LogReadError::MissingLogUri(job_run.id.clone()))?;

    let primary = LogStream::Stdout;
    let uri = stream_uri(log_base, application_id, &job_run.id, primary);

    match read_new_content(store, &uri, cursors.get(primary).offset()).await {
        Ok(chunk) => {
            cursors.get_mut(primary).advance(chunk.offset);
            Ok(Tail::Read {
                stream: primary,
                chunk,
            })
        }
        Err(error) => {
            let stream = primary.alternate();
            debug!("unable to read {primary} of job run `{}`: {error}", job_run.id);

            let uri = stream_uri(log_base, application_id, &job_run.id, stream);
            let result = read_new_content(store, &uri, 0).await;

            match &result {
                Ok(chunk) => cursors.get_mut(stream).advance(chunk.offset),
                Err(e) => warn!("unable to read {stream} of job run `{}`: {e}", job_run.id),
            }

            Ok(Tail::Fallback {
                error,
                stream,
                result,
            })
        }
    }
}
