use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::api::{DetectionApi, InferenceError};
use super::result::Detection;

/// Offline detection backend for `stub://` endpoints and tests.
///
/// Scripted responses are returned in order; once the script runs out every
/// call returns the fallback set.
pub struct StubApi {
    script: VecDeque<Result<Vec<Detection>, InferenceError>>,
    fallback: Vec<Detection>,
    calls: Arc<AtomicUsize>,
}

impl StubApi {
    pub fn new(fallback: Vec<Detection>) -> Self {
        Self {
            script: VecDeque::new(),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue one response ahead of the fallback.
    pub fn then(mut self, response: Result<Vec<Detection>, InferenceError>) -> Self {
        self.script.push_back(response);
        self
    }

    /// Shared call counter, readable after the stub is moved into a loop.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for StubApi {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DetectionApi for StubApi {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, jpeg: &[u8]) -> Result<Vec<Detection>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if jpeg.is_empty() {
            return Err(InferenceError::BadRequest);
        }
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
