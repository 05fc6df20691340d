//! Frame ingestion from MJPEG-over-HTTP cameras.
//!
//! - `mjpeg`: JPEG marker extraction and decode
//! - `transport`: connection seam and the HTTP connector
//! - `reader`: the background `StreamReader` session
//!
//! The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Block consumers on network I/O
//! - Surface transport failures to callers (they drive reconnects instead)

mod error;
pub mod mjpeg;
pub mod reader;
pub mod transport;

pub use error::StreamError;
pub use mjpeg::{decode_jpeg, find_jpeg_bounds, JpegExtractor, MAX_JPEG_BYTES};
pub use reader::{ReaderConfig, ReaderState, ReaderStatus, StreamReader};
pub use transport::{ByteStream, HttpConnector, HttpTransportConfig, StreamConnector};
