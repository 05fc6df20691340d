//! Throttled inference over the latest frame.
//!
//! The loop is driven by the caller's own cadence: every `tick` hands it the
//! current frame, and at most one API call is issued per interval no matter
//! how often `tick` runs. The detections from the last successful call remain
//! the current annotation set until the next call replaces them.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::detect::{Detection, DetectionApi, FailureKind, InferenceError};
use crate::frame::Frame;

/// What happens to the current detections when a call fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep showing the last good set.
    #[default]
    KeepPrevious,
    /// Drop to an empty set.
    Clear,
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "keep_previous" | "keep" => Ok(FailurePolicy::KeepPrevious),
            "clear" => Ok(FailurePolicy::Clear),
            other => Err(anyhow::anyhow!(
                "unknown failure policy '{}'; expected keep_previous or clear",
                other
            )),
        }
    }
}

/// Fires at most once per interval. The first check always fires.
#[derive(Clone, Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true (and restarts the interval) when more than `interval`
    /// has elapsed since the last firing.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

#[derive(Clone, Debug)]
pub struct InferenceConfig {
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub on_failure: FailurePolicy,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            jpeg_quality: 80,
            on_failure: FailurePolicy::KeepPrevious,
        }
    }
}

/// Result of one `tick`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Interval not yet elapsed; no call made.
    Skipped,
    /// Call succeeded; the current set now holds `count` detections.
    Updated { count: usize },
    /// Call failed; the current set follows the failure policy.
    Failed(FailureKind),
}

pub struct InferenceLoop {
    api: Box<dyn DetectionApi>,
    config: InferenceConfig,
    throttle: Throttle,
    detections: Vec<Detection>,
    calls: u64,
    failures: u64,
}

impl InferenceLoop {
    pub fn new(api: Box<dyn DetectionApi>, config: InferenceConfig) -> Self {
        let throttle = Throttle::new(config.interval);
        Self {
            api,
            config,
            throttle,
            detections: Vec::new(),
            calls: 0,
            failures: 0,
        }
    }

    /// Run inference on `frame` if the interval has elapsed at `now`.
    pub fn tick(&mut self, frame: &Frame, now: Instant) -> TickOutcome {
        if !self.throttle.ready(now) {
            return TickOutcome::Skipped;
        }
        self.calls += 1;
        log::debug!(
            "analyzing frame #{} via {}",
            frame.sequence,
            self.api.name()
        );

        let result = encode_jpeg(frame.image(), self.config.jpeg_quality)
            .and_then(|jpeg| self.api.detect(&jpeg));
        match result {
            Ok(detections) => {
                log_detections(frame.sequence, &detections);
                self.detections = detections;
                TickOutcome::Updated {
                    count: self.detections.len(),
                }
            }
            Err(err) => {
                self.failures += 1;
                log::warn!("inference failed on frame #{}: {}", frame.sequence, err);
                if self.config.on_failure == FailurePolicy::Clear {
                    self.detections.clear();
                }
                TickOutcome::Failed(err.kind())
            }
        }
    }

    /// The current annotation set.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

/// Compress an RGB image to JPEG at the given quality (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, InferenceError> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(bytes)
}

fn log_detections(sequence: u64, detections: &[Detection]) {
    if detections.is_empty() {
        log::info!("no detections in frame #{}", sequence);
        return;
    }
    log::info!(
        "found {} detection(s) in frame #{}",
        detections.len(),
        sequence
    );
    for (i, det) in detections.iter().enumerate() {
        log::info!(
            "  #{}: {} ({:.2}) at ({:.0},{:.0}) size {:.0}x{:.0} area {:.0}px²",
            i + 1,
            det.class,
            det.confidence,
            det.x,
            det.y,
            det.width,
            det.height,
            det.area()
        );
    }
}
