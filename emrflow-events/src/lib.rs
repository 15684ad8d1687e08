//! Definition of the events broadcast by emrflow.

use bytes::Bytes;

/// A log stream written by the Spark driver of a job run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogStream {
    /// The driver's standard output.
    Stdout,
    /// The driver's standard error.
    Stderr,
}

impl LogStream {
    /// Gets the file name of the compressed log object for this stream.
    pub fn file_name(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout.gz",
            LogStream::Stderr => "stderr.gz",
        }
    }

    /// Gets the stream that is read when this one cannot be.
    pub fn alternate(&self) -> LogStream {
        match self {
            LogStream::Stdout => LogStream::Stderr,
            LogStream::Stderr => LogStream::Stdout,
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStream::Stdout => write!(f, "stdout"),
            LogStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// An event sent while a job run is submitted and tracked.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job run has been accepted by the remote service.
    JobSubmitted {
        /// The id of the job run.
        id: String,
        /// The name the job was submitted with.
        name: String,
    },
    /// The observed state of a job run has changed.
    ///
    /// Polls that observe the same state as before do not produce this event.
    JobStateChanged {
        /// The id of the job run.
        id: String,
        /// The newly observed state.
        state: String,
    },
    /// A dashboard link has been retrieved for a job run.
    DashboardAvailable {
        /// The id of the job run.
        id: String,
        /// The dashboard URL.
        url: String,
    },
    /// New content was read from one of the driver's log streams.
    LogOutput {
        /// The id of the job run.
        id: String,
        /// The stream the content was read from.
        stream: LogStream,
        /// The decompressed bytes that had not been seen before.
        content: Bytes,
    },
    /// Reading a log stream failed.
    ///
    /// This is informational only; tracking continues.
    LogReadFailed {
        /// The id of the job run.
        id: String,
        /// The stream that could not be read.
        stream: LogStream,
        /// The error message.
        message: String,
    },
    /// A job run has reached a terminal state.
    JobFinished {
        /// The id of the job run.
        id: String,
        /// The terminal state.
        state: String,
    },
}

/// Sends an event through a broadcast channel.
///
/// If the sender is `None`, the event expression is not evaluated and no event
/// is sent.
#[macro_export]
macro_rules! send_event {
    ($sender:expr, $event:expr $(,)?) => {
        if let Some(sender) = &$sender {
            sender.send($event).ok();
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_falls_back_to_stderr() {
        assert_eq!(LogStream::Stdout.alternate(), LogStream::Stderr);
        assert_eq!(LogStream::Stderr.file_name(), "stderr.gz");
        assert_eq!(LogStream::Stdout.to_string(), "stdout");
    }
}
