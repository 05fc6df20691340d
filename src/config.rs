use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::detect::RoboflowConfig;
use crate::inference::{FailurePolicy, InferenceConfig};
use crate::ingest::transport::DEFAULT_USER_AGENT;
use crate::ingest::ReaderConfig;

const DEFAULT_STREAM_URL: &str = "http://192.168.1.15/stream";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STALL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BACKOFF_SECS: u64 = 2;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_STOP_GRACE_SECS: u64 = 5;
const DEFAULT_FIRST_FRAME_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MODEL_ENDPOINT: &str = "https://detect.roboflow.com/underwater-crack-detection/3";
const DEFAULT_INTERVAL_SECS: f64 = 2.0;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_CONFIDENCE: f32 = 0.40;
const DEFAULT_OVERLAP: f32 = 0.30;
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Deserialize, Default)]
struct CamwatchConfigFile {
    stream: Option<StreamConfigFile>,
    inference: Option<InferenceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    stall_timeout_secs: Option<u64>,
    backoff_secs: Option<u64>,
    max_retries: Option<u32>,
    stop_grace_secs: Option<u64>,
    first_frame_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    endpoint: Option<String>,
    api_key: Option<String>,
    interval_secs: Option<f64>,
    jpeg_quality: Option<u8>,
    confidence: Option<f32>,
    overlap: Option<f32>,
    timeout_secs: Option<u64>,
    on_failure: Option<FailurePolicy>,
}

#[derive(Debug, Clone)]
pub struct CamwatchConfig {
    pub stream: StreamSettings,
    pub inference: InferenceSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub stall_timeout: Duration,
    pub backoff: Duration,
    pub max_retries: u32,
    pub stop_grace: Duration,
    pub first_frame_timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub confidence: f32,
    pub overlap: f32,
    pub timeout: Duration,
    pub on_failure: FailurePolicy,
}

impl CamwatchConfig {
    /// Defaults, overlaid with the file named by `CAMWATCH_CONFIG` (if any),
    /// then environment overrides. Validated before returning.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CamwatchConfigFile) -> Self {
        let stream = file.stream.unwrap_or_default();
        let inference = file.inference.unwrap_or_default();
        Self {
            stream: StreamSettings {
                url: stream.url.unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
                connect_timeout: Duration::from_secs(
                    stream
                        .connect_timeout_secs
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                stall_timeout: Duration::from_secs(
                    stream
                        .stall_timeout_secs
                        .unwrap_or(DEFAULT_STALL_TIMEOUT_SECS),
                ),
                backoff: Duration::from_secs(stream.backoff_secs.unwrap_or(DEFAULT_BACKOFF_SECS)),
                max_retries: stream.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                stop_grace: Duration::from_secs(
                    stream.stop_grace_secs.unwrap_or(DEFAULT_STOP_GRACE_SECS),
                ),
                first_frame_timeout: Duration::from_secs(
                    stream
                        .first_frame_timeout_secs
                        .unwrap_or(DEFAULT_FIRST_FRAME_TIMEOUT_SECS),
                ),
                user_agent: stream
                    .user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            },
            inference: InferenceSettings {
                endpoint: inference
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_MODEL_ENDPOINT.to_string()),
                api_key: inference.api_key.filter(|key| !key.trim().is_empty()),
                interval: Duration::try_from_secs_f64(
                    inference.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
                )
                .unwrap_or(Duration::ZERO),
                jpeg_quality: inference.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                confidence: inference.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                overlap: inference.overlap.unwrap_or(DEFAULT_OVERLAP),
                timeout: Duration::from_secs(
                    inference
                        .timeout_secs
                        .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_SECS),
                ),
                on_failure: inference.on_failure.unwrap_or_default(),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CAMWATCH_STREAM_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url;
            }
        }
        if let Ok(key) = std::env::var("CAMWATCH_API_KEY") {
            if !key.trim().is_empty() {
                self.inference.api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var("CAMWATCH_MODEL_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.inference.endpoint = endpoint;
            }
        }
        if let Ok(interval) = std::env::var("CAMWATCH_INFERENCE_INTERVAL_SECS") {
            let seconds: f64 = interval.trim().parse().map_err(|_| {
                anyhow!("CAMWATCH_INFERENCE_INTERVAL_SECS must be a number of seconds")
            })?;
            if seconds <= 0.0 {
                return Err(anyhow!(
                    "CAMWATCH_INFERENCE_INTERVAL_SECS must be greater than zero"
                ));
            }
            self.inference.interval = Duration::try_from_secs_f64(seconds)
                .map_err(|e| anyhow!("CAMWATCH_INFERENCE_INTERVAL_SECS out of range: {}", e))?;
        }
        if let Ok(retries) = std::env::var("CAMWATCH_MAX_RETRIES") {
            self.stream.max_retries = retries
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMWATCH_MAX_RETRIES must be a positive integer"))?;
        }
        Ok(())
    }

    /// Check ranges and URL schemes. Called by `load`; call again after
    /// applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        validate_http_url("stream url", &self.stream.url)?;
        if !self.inference.endpoint.starts_with("stub://") {
            validate_http_url("model endpoint", &self.inference.endpoint)?;
        }
        if self.stream.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        if self.stream.stall_timeout.is_zero() {
            bail!("stall timeout must be greater than zero");
        }
        if self.inference.interval.is_zero() {
            bail!("inference interval must be greater than zero");
        }
        if !(1..=100).contains(&self.inference.jpeg_quality) {
            bail!(
                "jpeg quality must be between 1 and 100, got {}",
                self.inference.jpeg_quality
            );
        }
        for (name, value) in [
            ("confidence", self.inference.confidence),
            ("overlap", self.inference.overlap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within 0.0-1.0, got {}", name, value);
            }
        }
        Ok(())
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            url: self.stream.url.clone(),
            connect_timeout: self.stream.connect_timeout,
            stall_timeout: self.stream.stall_timeout,
            backoff: self.stream.backoff,
            max_retries: self.stream.max_retries,
            stop_grace: self.stream.stop_grace,
            user_agent: self.stream.user_agent.clone(),
        }
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            interval: self.inference.interval,
            jpeg_quality: self.inference.jpeg_quality,
            on_failure: self.inference.on_failure,
        }
    }

    /// Client settings for the detect API. Requires an API key unless the
    /// endpoint is a `stub://` backend.
    pub fn roboflow_config(&self) -> Result<RoboflowConfig> {
        let api_key = match &self.inference.api_key {
            Some(key) => key.clone(),
            None if self.inference.endpoint.starts_with("stub://") => String::new(),
            None => {
                return Err(anyhow!(
                    "an api key is required (set CAMWATCH_API_KEY or inference.api_key)"
                ))
            }
        };
        Ok(RoboflowConfig {
            endpoint: self.inference.endpoint.clone(),
            api_key,
            confidence: self.inference.confidence,
            overlap: self.inference.overlap,
            timeout: self.inference.timeout,
        })
    }
}

fn read_config_file(path: &Path) -> Result<CamwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn validate_http_url(what: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| anyhow!("invalid {} '{}': {}", what, value, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!(
            "unsupported {} scheme '{}'; expected http(s)",
            what,
            other
        )),
    }
}
