//! Background MJPEG stream reader.
//!
//! `StreamReader` owns one camera session on a dedicated thread:
//!
//! ```text
//! Connecting --ok--> Streaming --error/stall--> Backoff --> Connecting
//!     |                                            |
//!     +--error--> Backoff                          +--budget spent--> Terminal
//! ```
//!
//! A successful connect resets the retry counter. Every transport, protocol or
//! stall failure spends one retry; once `max_retries` consecutive failures
//! accumulate the session goes `Terminal` and never reconnects. Decode failures
//! are counted and skipped. The last decoded frame stays readable after the
//! reader stops or goes terminal; `status()` tells callers which case they are in.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::mjpeg::{decode_jpeg, JpegExtractor};
use super::transport::{ByteStream, HttpConnector, HttpTransportConfig, StreamConnector};
use super::StreamError;
use crate::frame::{Frame, FrameSlot};

const CHUNK_SIZE: usize = 4096;
const STOP_POLL: Duration = Duration::from_millis(50);
const FRAME_POLL: Duration = Duration::from_millis(100);

/// Reader tuning. Defaults match an ESP32-CAM on a local network.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Silence longer than this abandons the connection.
    pub stall_timeout: Duration,
    /// Wait between a failure and the next connect attempt.
    pub backoff: Duration,
    /// Consecutive failed attempts before the reader gives up.
    pub max_retries: u32,
    /// How long `stop()` waits for the worker thread.
    pub stop_grace: Duration,
    pub user_agent: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.1.15/stream".to_string(),
            connect_timeout: Duration::from_secs(10),
            stall_timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(2),
            max_retries: 5,
            stop_grace: Duration::from_secs(5),
            user_agent: super::transport::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ReaderConfig {
    pub fn transport(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: self.connect_timeout,
            read_timeout: self.stall_timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Session state, as seen from outside the worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReaderState {
    /// Never started.
    #[default]
    Idle,
    Connecting,
    Streaming,
    Backoff,
    /// Retry budget exhausted. No further attempts will be made.
    Terminal,
    /// Stopped on request.
    Stopped,
}

/// Snapshot of reader health.
#[derive(Clone, Debug, Default)]
pub struct ReaderStatus {
    pub state: ReaderState,
    /// Connect attempts since `start()`.
    pub attempts: u64,
    /// Failures since the last successful connect.
    pub consecutive_failures: u32,
    pub frames_decoded: u64,
    pub decode_errors: u64,
    pub last_error: Option<String>,
    pub last_frame_at: Option<Instant>,
}

impl ReaderStatus {
    pub fn is_terminal(&self) -> bool {
        self.state == ReaderState::Terminal
    }

    /// Still working toward (or delivering) fresh frames.
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ReaderState::Connecting | ReaderState::Streaming | ReaderState::Backoff
        )
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    join: JoinHandle<()>,
}

/// Best-effort continuous supply of decoded frames from an MJPEG source.
pub struct StreamReader {
    config: ReaderConfig,
    connector: Arc<dyn StreamConnector>,
    slot: Arc<FrameSlot>,
    status: Arc<Mutex<ReaderStatus>>,
    worker: Option<Worker>,
}

impl StreamReader {
    /// Reader over HTTP using the config's timeouts.
    pub fn new(config: ReaderConfig) -> Self {
        let connector = HttpConnector::new(&config.transport());
        Self::with_connector(config, Arc::new(connector))
    }

    pub fn with_connector(config: ReaderConfig, connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            config,
            connector,
            slot: Arc::new(FrameSlot::new()),
            status: Arc::new(Mutex::new(ReaderStatus::default())),
            worker: None,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Spawn the background session. Connection failures are handled by the
    /// worker and only show up in `status()`.
    pub fn start(&mut self) -> Result<(), StreamError> {
        if self.worker.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        // Each session reports into its own cell; a worker detached by an
        // earlier `stop()` can never overwrite this one.
        self.status = Arc::new(Mutex::new(ReaderStatus {
            state: ReaderState::Connecting,
            ..ReaderStatus::default()
        }));

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();
        let session = Session {
            config: self.config.clone(),
            connector: self.connector.clone(),
            slot: self.slot.clone(),
            status: self.status.clone(),
            stop: stop.clone(),
        };
        let join = std::thread::Builder::new()
            .name("mjpeg-reader".to_string())
            .spawn(move || {
                session.run();
                let _ = done_tx.send(());
            })
            .map_err(StreamError::Spawn)?;

        log::info!("mjpeg reader started for {}", self.config.url);
        self.worker = Some(Worker { stop, done, join });
        Ok(())
    }

    /// Copy of the most recent decoded frame. Never blocks on the network.
    pub fn get_latest_frame(&self) -> Option<Frame> {
        self.slot.latest()
    }

    /// Shared handle to the latest-frame slot.
    pub fn slot(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }

    pub fn status(&self) -> ReaderStatus {
        lock(&self.status).clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.join.is_finished())
    }

    /// Poll for a frame until one arrives, `timeout` passes, or the reader
    /// can no longer produce one.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.get_latest_frame() {
                return Some(frame);
            }
            if !self.status().is_live() || Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(FRAME_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Signal the worker and wait up to the grace period for it to exit.
    ///
    /// Returns `true` if the worker finished in time (or was never started).
    /// A worker blocked in a read past the grace period is detached; it exits
    /// on its own once the read returns, without publishing or touching the
    /// status of a later session.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };
        worker.stop.store(true, Ordering::SeqCst);
        match worker.done.recv_timeout(self.config.stop_grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join.join().is_err() {
                    log::error!("mjpeg reader thread panicked");
                }
                log::info!("mjpeg reader stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "mjpeg reader did not exit within {:?}; detaching",
                    self.config.stop_grace
                );
                let mut status = lock(&self.status);
                if status.state != ReaderState::Terminal {
                    status.state = ReaderState::Stopped;
                }
                false
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(status: &Mutex<ReaderStatus>) -> std::sync::MutexGuard<'_, ReaderStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Worker session
// ----------------------------------------------------------------------------

/// Everything the worker thread owns. The byte buffer and retry counter never
/// leave this struct.
struct Session {
    config: ReaderConfig,
    connector: Arc<dyn StreamConnector>,
    slot: Arc<FrameSlot>,
    status: Arc<Mutex<ReaderStatus>>,
    stop: Arc<AtomicBool>,
}

enum StreamEnd {
    Stopped,
    Failed(StreamError),
}

impl Session {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ReaderState) {
        lock(&self.status).state = state;
    }

    fn run(self) {
        let mut retries: u32 = 0;
        let final_state = loop {
            if self.stopped() {
                break ReaderState::Stopped;
            }

            self.set_state(ReaderState::Connecting);
            let attempt = {
                let mut status = lock(&self.status);
                status.attempts += 1;
                status.attempts
            };
            log::info!(
                "connecting to mjpeg stream {} (attempt {})",
                self.config.url,
                attempt
            );

            let failure = match self.connector.connect(&self.config.url) {
                Ok(stream) => {
                    log::info!("connected to mjpeg stream");
                    retries = 0;
                    {
                        let mut status = lock(&self.status);
                        status.state = ReaderState::Streaming;
                        status.consecutive_failures = 0;
                    }
                    match self.stream_frames(stream) {
                        StreamEnd::Stopped => break ReaderState::Stopped,
                        StreamEnd::Failed(err) => err,
                    }
                }
                Err(err) => err,
            };

            retries += 1;
            log::warn!(
                "mjpeg stream failure ({}): {} [{}/{}]",
                failure.kind(),
                failure,
                retries,
                self.config.max_retries
            );
            {
                let mut status = lock(&self.status);
                status.consecutive_failures = retries;
                status.last_error = Some(failure.to_string());
            }

            if retries >= self.config.max_retries {
                log::error!(
                    "mjpeg stream failed after {} attempts; giving up",
                    retries
                );
                break ReaderState::Terminal;
            }

            self.set_state(ReaderState::Backoff);
            if !self.sleep_unless_stopped(self.config.backoff) {
                break ReaderState::Stopped;
            }
        };
        self.set_state(final_state);
    }

    /// Read chunks until stopped or the connection fails.
    fn stream_frames(&self, mut stream: ByteStream) -> StreamEnd {
        let mut extractor = JpegExtractor::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut last_data_at = Instant::now();

        loop {
            if self.stopped() {
                return StreamEnd::Stopped;
            }

            let read = match stream.read(&mut chunk) {
                Ok(0) => return StreamEnd::Failed(StreamError::Ended),
                Ok(read) => read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return StreamEnd::Failed(StreamError::from_read(err)),
            };
            if self.stopped() {
                return StreamEnd::Stopped;
            }

            // Gap since the previous chunk, measured before refreshing.
            let now = Instant::now();
            let silent_for = now.duration_since(last_data_at);
            if silent_for > self.config.stall_timeout {
                return StreamEnd::Failed(StreamError::Stalled { silent_for });
            }
            last_data_at = now;

            extractor.push(&chunk[..read]);
            while let Some(jpeg) = extractor.next_jpeg() {
                self.publish(&jpeg);
            }
        }
    }

    fn publish(&self, jpeg: &[u8]) {
        match decode_jpeg(jpeg) {
            Ok(image) => {
                let sequence = self.slot.publish(Frame::new(image));
                log::trace!("published frame #{}", sequence);
                let mut status = lock(&self.status);
                status.frames_decoded += 1;
                status.last_frame_at = Some(Instant::now());
            }
            Err(err) => {
                log::warn!("frame decode error ({} bytes): {}", jpeg.len(), err);
                lock(&self.status).decode_errors += 1;
            }
        }
    }

    /// Sleep in short slices so a stop request is noticed promptly.
    /// Returns `false` if stopped while sleeping.
    fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stopped() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(remaining.min(STOP_POLL));
        }
    }
}
