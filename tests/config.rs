use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use camwatch::config::CamwatchConfig;
use camwatch::FailurePolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAMWATCH_CONFIG",
        "CAMWATCH_STREAM_URL",
        "CAMWATCH_API_KEY",
        "CAMWATCH_MODEL_ENDPOINT",
        "CAMWATCH_INFERENCE_INTERVAL_SECS",
        "CAMWATCH_MAX_RETRIES",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CamwatchConfig::load().expect("load defaults");

    assert_eq!(cfg.stream.url, "http://192.168.1.15/stream");
    assert_eq!(cfg.stream.max_retries, 5);
    assert_eq!(cfg.stream.stall_timeout, Duration::from_secs(10));
    assert_eq!(cfg.stream.backoff, Duration::from_secs(2));
    assert_eq!(cfg.stream.user_agent, "ESP32-CAM-Reader/1.0");
    assert_eq!(cfg.inference.interval, Duration::from_secs(2));
    assert_eq!(cfg.inference.jpeg_quality, 80);
    assert_eq!(cfg.inference.on_failure, FailurePolicy::KeepPrevious);
    assert!(cfg.inference.api_key.is_none());
    assert!(cfg.roboflow_config().is_err(), "api key is required");
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "stream": {
                "url": "http://10.0.0.7/stream",
                "stall_timeout_secs": 4,
                "max_retries": 3
            },
            "inference": {
                "endpoint": "https://detect.example.com/hull/2",
                "api_key": "from-file",
                "interval_secs": 1.5,
                "confidence": 0.55,
                "on_failure": "clear"
            }
        }"#,
    );
    std::env::set_var("CAMWATCH_CONFIG", file.path());
    std::env::set_var("CAMWATCH_API_KEY", "from-env");
    std::env::set_var("CAMWATCH_MAX_RETRIES", "7");

    let cfg = CamwatchConfig::load().expect("load config");

    assert_eq!(cfg.stream.url, "http://10.0.0.7/stream");
    assert_eq!(cfg.stream.stall_timeout, Duration::from_secs(4));
    assert_eq!(cfg.stream.max_retries, 7);
    assert_eq!(cfg.inference.endpoint, "https://detect.example.com/hull/2");
    assert_eq!(cfg.inference.interval, Duration::from_millis(1500));
    assert_eq!(cfg.inference.on_failure, FailurePolicy::Clear);

    let roboflow = cfg.roboflow_config().expect("roboflow config");
    assert_eq!(roboflow.api_key, "from-env");
    assert!((roboflow.confidence - 0.55).abs() < f32::EPSILON);

    let reader = cfg.reader_config();
    assert_eq!(reader.url, "http://10.0.0.7/stream");
    assert_eq!(reader.max_retries, 7);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
[stream]
url = "https://camera.local/mjpeg"
backoff_secs = 1

[inference]
endpoint = "stub://bench"
jpeg_quality = 60
"#,
    );
    std::env::set_var("CAMWATCH_CONFIG", file.path());

    let cfg = CamwatchConfig::load().expect("load toml config");

    assert_eq!(cfg.stream.url, "https://camera.local/mjpeg");
    assert_eq!(cfg.stream.backoff, Duration::from_secs(1));
    assert_eq!(cfg.inference_config().jpeg_quality, 60);
    let roboflow = cfg.roboflow_config().expect("stub needs no key");
    assert!(roboflow.api_key.is_empty());

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMWATCH_STREAM_URL", "rtsp://camera-1/stream");
    assert!(CamwatchConfig::load().is_err(), "non-http stream url");
    clear_env();

    std::env::set_var("CAMWATCH_MAX_RETRIES", "0");
    assert!(CamwatchConfig::load().is_err(), "zero retries");
    clear_env();

    std::env::set_var("CAMWATCH_INFERENCE_INTERVAL_SECS", "-1");
    assert!(CamwatchConfig::load().is_err(), "negative interval");
    clear_env();

    std::env::set_var("CAMWATCH_INFERENCE_INTERVAL_SECS", "soon");
    assert!(CamwatchConfig::load().is_err(), "non-numeric interval");
    clear_env();

    let file = config_file(".json", r#"{ "inference": { "jpeg_quality": 0 } }"#);
    std::env::set_var("CAMWATCH_CONFIG", file.path());
    assert!(CamwatchConfig::load().is_err(), "zero jpeg quality");
    clear_env();

    let file = config_file(".json", r#"{ "inference": { "overlap": 1.5 } }"#);
    std::env::set_var("CAMWATCH_CONFIG", file.path());
    assert!(CamwatchConfig::load().is_err(), "overlap out of range");
    clear_env();

    let file = config_file(".json", "{ not json");
    std::env::set_var("CAMWATCH_CONFIG", file.path());
    assert!(CamwatchConfig::load().is_err(), "unparseable file");
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("CAMWATCH_CONFIG", dir.path().join("absent.json"));
    let err = CamwatchConfig::load().expect_err("missing file");
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
