//! Stream transports.
//!
//! The reader opens connections through `StreamConnector`, which lets tests
//! drive the reader state machine with in-process byte sources.

use std::io::Read;
use std::time::Duration;

use super::StreamError;

/// Client identifier sent with every stream request.
pub const DEFAULT_USER_AGENT: &str = "ESP32-CAM-Reader/1.0";

/// A byte stream handed back by a successful connect.
pub type ByteStream = Box<dyn Read + Send>;

/// Opens one streaming connection per call.
pub trait StreamConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<ByteStream, StreamError>;
}

/// HTTP transport settings.
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    pub connect_timeout: Duration,
    /// Longest a single read may block. Doubles as the stall threshold.
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// MJPEG-over-HTTP connector backed by a `ureq` agent.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    agent: ureq::Agent,
}

impl HttpConnector {
    pub fn new(config: &HttpTransportConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }
}

impl StreamConnector for HttpConnector {
    fn connect(&self, url: &str) -> Result<ByteStream, StreamError> {
        let response = self.agent.get(url).call().map_err(map_ureq_error)?;
        let content_type = response.content_type().to_ascii_lowercase();
        if !content_type.contains("multipart") && !content_type.contains("jpeg") {
            log::warn!(
                "unexpected stream content type '{}'; scanning for jpeg markers anyway",
                content_type
            );
        }
        Ok(Box::new(response.into_reader()))
    }
}

fn map_ureq_error(err: ureq::Error) -> StreamError {
    match err {
        ureq::Error::Status(code, _) => StreamError::Status(code),
        ureq::Error::Transport(transport) => {
            if is_timeout(&transport) {
                StreamError::Timeout
            } else {
                StreamError::Connect(transport.to_string())
            }
        }
    }
}

/// True when any error in the source chain is a socket timeout.
pub(crate) fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        current = err.source();
    }
    false
}
