//! Hosted detect API client.
//!
//! Contract: `POST {endpoint}?api_key=..&confidence=..&overlap=..` with the
//! base64-encoded JPEG as a form-urlencoded body. The response carries a
//! `predictions` array of center-anchored boxes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::time::Duration;

use super::api::{DetectionApi, InferenceError};
use super::result::Detection;
use crate::ingest::transport::is_timeout;

const MAX_ERROR_BODY: usize = 200;

/// Settings for the hosted detect API.
#[derive(Clone, Debug)]
pub struct RoboflowConfig {
    /// Model endpoint, e.g. `https://detect.roboflow.com/<project>/<version>`.
    pub endpoint: String,
    pub api_key: String,
    /// Minimum confidence the server should report (0.0-1.0).
    pub confidence: f32,
    /// Non-maximum suppression overlap threshold (0.0-1.0).
    pub overlap: f32,
    pub timeout: Duration,
}

impl Default for RoboflowConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://detect.roboflow.com/underwater-crack-detection/3".to_string(),
            api_key: String::new(),
            confidence: 0.40,
            overlap: 0.30,
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    predictions: Vec<Detection>,
}

pub struct RoboflowClient {
    config: RoboflowConfig,
    agent: ureq::Agent,
}

impl RoboflowClient {
    pub fn new(config: RoboflowConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    pub fn config(&self) -> &RoboflowConfig {
        &self.config
    }
}

impl DetectionApi for RoboflowClient {
    fn name(&self) -> &'static str {
        "roboflow"
    }

    fn detect(&mut self, jpeg: &[u8]) -> Result<Vec<Detection>, InferenceError> {
        let body = BASE64.encode(jpeg);
        let result = self
            .agent
            .post(&self.config.endpoint)
            .query("api_key", &self.config.api_key)
            .query("confidence", &format!("{:.2}", self.config.confidence))
            .query("overlap", &format!("{:.2}", self.config.overlap))
            .set("Content-Type", "application/x-www-form-urlencoded")
            .send_string(&body);

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let mut text = response.into_string().unwrap_or_default();
                text.truncate(floor_char_boundary(&text, MAX_ERROR_BODY));
                return Err(InferenceError::from_status(status, text));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(if is_timeout(&transport) {
                    InferenceError::Timeout
                } else {
                    InferenceError::Connection(transport.to_string())
                });
            }
        };

        let text = response.into_string().map_err(|err| {
            if err.kind() == std::io::ErrorKind::TimedOut {
                InferenceError::Timeout
            } else {
                InferenceError::Malformed(err.to_string())
            }
        })?;
        parse_predictions(&text)
    }
}

/// Parse a detect API response body.
pub fn parse_predictions(body: &str) -> Result<Vec<Detection>, InferenceError> {
    let parsed: PredictionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::Malformed(e.to_string()))?;
    Ok(parsed.predictions)
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max)
        .rev()
        .find(|&idx| text.is_char_boundary(idx))
        .unwrap_or(0)
}
