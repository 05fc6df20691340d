//! camwatch
//!
//! Pulls an MJPEG stream from a network camera, keeps the freshest decoded
//! frame available to consumers, and periodically forwards frames to a remote
//! object-detection API whose results are drawn as overlays.
//!
//! # Architecture
//!
//! Data flows one way:
//!
//! ```text
//! network bytes -> StreamReader -> FrameSlot -> InferenceLoop -> detect API
//!                                                    |
//!                                               detections -> overlay
//! ```
//!
//! - The reader runs on its own thread and never waits for consumers.
//! - Consumers never wait for a new frame; they re-read the latest one.
//! - The `FrameSlot` is the only shared mutable state.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and the latest-frame slot
//! - `ingest`: MJPEG extraction, transports, and the background reader
//! - `detect`: detection results and API clients
//! - `inference`: throttled inference and the current annotation set
//! - `overlay`: drawing detections onto a frame copy, and the display sink seam
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod inference;
pub mod ingest;
pub mod overlay;
pub mod ui;

pub use config::CamwatchConfig;
pub use detect::{
    BoundingBox, ClassColor, Detection, DetectionApi, FailureKind, InferenceError, RoboflowClient,
    RoboflowConfig, StubApi,
};
pub use frame::{Frame, FrameSlot};
pub use inference::{FailurePolicy, InferenceConfig, InferenceLoop, Throttle, TickOutcome};
pub use ingest::{
    HttpConnector, JpegExtractor, ReaderConfig, ReaderState, ReaderStatus, StreamConnector,
    StreamError, StreamReader,
};
