//! stream_probe - Reader-only check of an MJPEG camera stream.
//!
//! Starts the stream reader, waits for the first frame, then reports frame
//! resolution and decode rate until interrupted or the stream gives up.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camwatch::config::CamwatchConfig;
use camwatch::ui::{Ui, UiMode};
use camwatch::StreamReader;

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe an MJPEG camera stream")]
struct Args {
    /// Camera MJPEG stream URL.
    #[arg(long, env = "CAMWATCH_STREAM_URL")]
    stream_url: Option<String>,

    /// Seconds to wait for the first frame.
    #[arg(long, default_value_t = 15)]
    first_frame_secs: u64,

    /// Seconds between rate reports.
    #[arg(long, default_value_t = 5)]
    report_secs: u64,

    /// Stop after this many seconds (0 runs until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,

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
    cfg.validate()?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let mut reader = StreamReader::new(cfg.reader_config());
    reader.start()?;

    let ui = Ui::detect(args.ui);
    let stage = ui.stage("waiting for first frame");
    let Some(first) = reader.wait_for_frame(Duration::from_secs(args.first_frame_secs)) else {
        stage.fail("no frame received");
        reader.stop();
        return Err(anyhow!(
            "no frame received within {}s",
            args.first_frame_secs
        ));
    };
    stage.succeed(&format!("{}x{}", first.width(), first.height()));

    let started = Instant::now();
    let report_every = Duration::from_secs(args.report_secs.max(1));
    let mut last_report = Instant::now();
    let mut last_count = reader.status().frames_decoded;

    while running.load(Ordering::SeqCst) {
        if args.duration_secs > 0 && started.elapsed() >= Duration::from_secs(args.duration_secs) {
            break;
        }
        let status = reader.status();
        if status.is_terminal() {
            log::error!(
                "stream gave up after {} attempts; last error: {}",
                status.attempts,
                status.last_error.as_deref().unwrap_or("unknown")
            );
            break;
        }
        if last_report.elapsed() >= report_every {
            let elapsed = last_report.elapsed().as_secs_f64();
            let fps = status.frames_decoded.saturating_sub(last_count) as f64 / elapsed;
            let age = reader
                .get_latest_frame()
                .map(|frame| format!("{:.1}s", frame.age_secs()))
                .unwrap_or_else(|| "n/a".to_string());
            log::info!(
                "state={:?} frames={} fps={:.1} latest_age={} decode_errors={} reconnects={}",
                status.state,
                status.frames_decoded,
                fps,
                age,
                status.decode_errors,
                status.attempts.saturating_sub(1)
            );
            last_count = status.frames_decoded;
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    reader.stop();
    if reader.status().is_terminal() {
        return Err(anyhow!("stream exhausted its retry budget"));
    }
    log::info!("mjpeg reader stopped");
    Ok(())
}
