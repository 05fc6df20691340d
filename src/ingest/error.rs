use std::io;
use std::time::Duration;

/// Failures seen by the stream reader.
///
/// Everything except `AlreadyRunning` and `Spawn` is absorbed by the reader
/// loop and converted into a retry.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("camera returned http status {0}")]
    Status(u16),

    #[error("read timed out")]
    Timeout,

    #[error("stream i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("stream ended")]
    Ended,

    #[error("no data for {:.1}s", .silent_for.as_secs_f64())]
    Stalled { silent_for: Duration },

    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("stream reader already running")]
    AlreadyRunning,

    #[error("failed to spawn reader thread: {0}")]
    Spawn(io::Error),
}

impl StreamError {
    /// Short classification for logs and status.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Connect(_) => "connect",
            StreamError::Status(_) => "status",
            StreamError::Timeout => "timeout",
            StreamError::Io(_) => "io",
            StreamError::Ended => "ended",
            StreamError::Stalled { .. } => "stalled",
            StreamError::Decode(_) => "decode",
            StreamError::AlreadyRunning => "already_running",
            StreamError::Spawn(_) => "spawn",
        }
    }

    /// Map a read error, folding socket timeouts into `Timeout`.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => StreamError::Timeout,
            _ => StreamError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_timeouts_are_classified() {
        let err = StreamError::from_read(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(err.kind(), "timeout");
        let err = StreamError::from_read(io::Error::new(io::ErrorKind::ConnectionReset, "rst"));
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn stalled_message_reports_seconds() {
        let err = StreamError::Stalled {
            silent_for: Duration::from_millis(10_500),
        };
        assert_eq!(err.to_string(), "no data for 10.5s");
    }
}
