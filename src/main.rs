//! Demo host: drives the recorder from a fixed-rate loop over a synthetic source.
//!
//! `mjpeg-recorder record [seconds]` writes every frame to a new file.
//! `mjpeg-recorder rolling [seconds]` keeps the newest frames in memory and
//! saves them once at the end.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use chrono::Local;
use mjpeg_recorder_lib::capture::TestPatternSource;
use mjpeg_recorder_lib::logging::init_logging;
use mjpeg_recorder_lib::settings::load_settings;
use mjpeg_recorder_lib::shared::paths::{ensure_dir, get_log_dir, recording_file_name};
use mjpeg_recorder_lib::{MuxError, RecorderError, ScreenRecorder, SessionOptions};

const SOURCE_WIDTH: u32 = 1280;
const SOURCE_HEIGHT: u32 = 720;

fn main() -> ExitCode {
    let _logging = match init_logging(&get_log_dir()) {
        Ok(guards) => Some(guards),
        Err(e) => {
            eprintln!("[MJPEG] Logging disabled: {}", e);
            None
        }
    };

    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| "record".to_string());
    let seconds = args.next().and_then(|s| s.parse().ok()).unwrap_or(3);

    match run(&mode, seconds) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[MJPEG] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(mode: &str, seconds: u64) -> Result<(), RecorderError> {
    let settings = load_settings();
    let options = SessionOptions::from_settings(&settings, SOURCE_WIDTH, SOURCE_HEIGHT);

    let out_dir = settings.recordings_dir();
    ensure_dir(&out_dir).map_err(MuxError::from)?;
    let path = out_dir.join(recording_file_name(Local::now()));

    let source = TestPatternSource::new(options.size).with_latency(2);
    let mut recorder = ScreenRecorder::with_jpeg(source);

    match mode {
        "record" => recorder.start_session(&path, options)?,
        "rolling" => recorder.start_rolling_session(options)?,
        other => {
            return Err(RecorderError::InvalidConfig(format!(
                "unknown mode '{}', expected 'record' or 'rolling'",
                other
            )))
        }
    }

    let frame_interval = Duration::from_secs(1) / options.frame_rate;
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let tick_started = Instant::now();
        recorder.tick()?;
        if let Some(rest) = frame_interval.checked_sub(tick_started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    if mode == "rolling" {
        let snapshot = recorder.snapshot_rolling(&path)?;
        println!(
            "Saved the last {} frames to {}",
            snapshot.frame_count,
            snapshot.path.display()
        );
    }

    let summary = recorder.stop_session()?;
    if let Some(output) = &summary.output {
        println!(
            "Recorded {} frames to {}",
            summary.frames_recorded,
            output.display()
        );
    }
    if summary.frames_dropped > 0 || summary.encode_failures > 0 {
        println!(
            "Lost {} frames at readback and {} at compression",
            summary.frames_dropped, summary.encode_failures
        );
    }
    Ok(())
}
