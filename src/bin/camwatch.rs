//! camwatch - MJPEG camera stream with periodic remote object detection
//!
//! This binary:
//! 1. Starts the background stream reader against the camera URL
//! 2. Waits for the first decoded frame
//! 3. Polls the latest frame at the display cadence
//! 4. Sends at most one frame per interval to the detection API
//! 5. Draws the current detections onto a copy of each displayed frame
//!
//! Annotated frames go to a `FrameSink`; this binary uses `LogSink`, which
//! reports each frame's size and drawn labels.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camwatch::config::CamwatchConfig;
use camwatch::detect::backend_for;
use camwatch::overlay::{annotate, FrameSink, LogSink};
use camwatch::ui::{Ui, UiMode};
use camwatch::{FailurePolicy, InferenceLoop, StreamReader, TickOutcome};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Read an MJPEG camera stream and run periodic remote object detection"
)]
struct Args {
    /// Camera MJPEG stream URL.
    #[arg(long)]
    stream_url: Option<String>,

    /// Detection model endpoint (use stub://<name> to run offline).
    #[arg(long)]
    endpoint: Option<String>,

    /// Detection API key.
    #[arg(long)]
    api_key: Option<String>,

    /// Seconds between detection calls.
    #[arg(long)]
    interval_secs: Option<f64>,

    /// What to show after a failed call: keep_previous or clear.
    #[arg(long)]
    on_failure: Option<FailurePolicy>,

    /// Display cadence in milliseconds.
    #[arg(long, default_value_t = 33)]
    display_ms: u64,

    /// Progress output: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = CamwatchConfig::load()?;
    if let Some(url) = args.stream_url {
        cfg.stream.url = url;
    }
    if let Some(endpoint) = args.endpoint {
        cfg.inference.endpoint = endpoint;
    }
    if let Some(key) = args.api_key {
        cfg.inference.api_key = Some(key);
    }
    if let Some(seconds) = args.interval_secs {
        cfg.inference.interval = Duration::try_from_secs_f64(seconds)
            .map_err(|e| anyhow!("invalid --interval-secs: {}", e))?;
    }
    if let Some(policy) = args.on_failure {
        cfg.inference.on_failure = policy;
    }
    cfg.validate()?;

    let api = backend_for(cfg.roboflow_config()?);
    let mut inference = InferenceLoop::new(api, cfg.inference_config());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let mut reader = StreamReader::new(cfg.reader_config());
    reader.start()?;

    let ui = Ui::detect(args.ui);
    let stage = ui.stage("waiting for camera");
    if reader
        .wait_for_frame(cfg.stream.first_frame_timeout)
        .is_none()
    {
        stage.fail("no frame received");
        reader.stop();
        return Err(anyhow!(
            "camera not ready within {:?}: {}",
            cfg.stream.first_frame_timeout,
            reader.status().last_error.unwrap_or_else(|| "no data".into())
        ));
    }
    stage.succeed("camera ready");

    log::info!(
        "detecting every {:.1}s (press Ctrl-C to quit)",
        cfg.inference.interval.as_secs_f64()
    );

    let mut sink = LogSink::new();
    let display_interval = Duration::from_millis(args.display_ms.max(1));
    let mut displayed = 0u64;
    let mut last_shown_sequence = 0u64;
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        let status = reader.status();
        if status.is_terminal() {
            log::error!(
                "camera stream permanently stalled after {} attempts; last error: {}",
                status.attempts,
                status.last_error.as_deref().unwrap_or("unknown")
            );
            break;
        }

        if let Some(frame) = reader.get_latest_frame() {
            displayed += 1;

            match inference.tick(&frame, Instant::now()) {
                TickOutcome::Failed(kind) => log::debug!("inference failure class: {:?}", kind),
                TickOutcome::Updated { .. } | TickOutcome::Skipped => {}
            }

            if frame.sequence != last_shown_sequence {
                last_shown_sequence = frame.sequence;
                let annotated = annotate(frame, inference.detections());
                sink.show(last_shown_sequence, &annotated, inference.detections());
            }
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "stream state={:?} decoded={} decode_errors={} polled={} shown={} latest_age={} inference calls={} failures={}",
                status.state,
                status.frames_decoded,
                status.decode_errors,
                displayed,
                sink.shown(),
                reader
                    .get_latest_frame()
                    .map(|frame| format!("{:.1}s", frame.age_secs()))
                    .unwrap_or_else(|| "n/a".to_string()),
                inference.calls(),
                inference.failures()
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(display_interval);
    }

    log::info!("stopping camwatch...");
    if !reader.stop() {
        log::warn!("reader thread still busy; exiting anyway");
    }
    let terminal = reader.status().is_terminal();
    if terminal {
        return Err(anyhow!("camera stream exhausted its retry budget"));
    }
    log::info!("camwatch stopped");
    Ok(())
}
