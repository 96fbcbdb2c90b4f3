//! Record a clip whenever a coloured object moves in front of the camera.

use clap::*;
use cv_camera::{CvCapture, CvClipWriter, EscapeKey, DEFAULT_PIPELINE};
use huewatch::prelude::v1::{Result, *};
use log::*;
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod trigger;

use trigger::{AutoTrigger, PromptTrigger};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log_failure(run())
}

fn run() -> Result<()> {
    let matches = Command::new("clip-recorder")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .takes_value(true)
                .help("Camera index, GStreamer pipeline or video file"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .help("Directory to write clips to"),
        )
        .arg(
            Arg::new("cycles")
                .long("cycles")
                .short('n')
                .takes_value(true)
                .help("Stop after this many cycles"),
        )
        .arg(
            Arg::new("auto")
                .long("auto")
                .short('a')
                .help("Start every cycle without waiting for enter"),
        )
        .arg(
            Arg::new("preview")
                .long("preview")
                .short('p')
                .help("Show the camera feed, escape stops recording"),
        )
        .get_matches();

    let input = matches.value_of("input").unwrap_or(DEFAULT_PIPELINE);
    let cycles = matches
        .value_of("cycles")
        .map(str::parse::<usize>)
        .transpose()?;
    let preview = matches.is_present("preview");

    let mut config = match matches.value_of("config") {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    if let Some(output) = matches.value_of("output") {
        config.recording.output_dir = output.into();
    }

    for warning in config.validate() {
        warn!("{warning}");
    }

    std::fs::create_dir_all(&config.recording.output_dir).with_context(|| {
        format!(
            "Could not create output directory {}",
            config.recording.output_dir.display()
        )
    })?;

    let mut capture = CvCapture::try_new(input)?;

    if preview {
        capture = capture.with_preview("Camera")?;
    }

    if let Some(fps) = capture.frame_rate() {
        info!("Capturing at {fps} fps");
    }

    info!(
        "Tracking {} colour bands, clips are {} frames at {} fps",
        config.bands.len(),
        config.max_recording_frames(),
        config.recording.write_fps
    );

    let mut trigger: Box<dyn CycleTrigger> = if matches.is_present("auto") {
        Box::new(AutoTrigger::new(cycles))
    } else {
        Box::new(PromptTrigger::new(
            std::io::stdin().lock(),
            std::io::stdout(),
            cycles,
        ))
    };

    let interrupted = interrupt_flag()?;

    let mut cancel: Box<dyn CancelSignal> = if preview {
        Box::new((interrupted, EscapeKey))
    } else {
        Box::new(interrupted)
    };

    let mut runner = CycleRunner::new(&config, CvClipWriter::default());

    let clips = runner.run(&mut capture, trigger.as_mut(), cancel.as_mut())?;

    info!("Recorded {clips} clip(s)");

    Ok(())
}

/// Flag raised by Ctrl-C, so that an open clip gets finalised before exiting.
///
/// A second Ctrl-C exits right away, which also covers waiting for enter at the prompt.
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();

    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
        warn!("Interrupted, stopping after the current frame");
    })
    .context("Could not install Ctrl-C handler")?;

    Ok(flag)
}

fn log_failure<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}

fn load_config(path: &str) -> Result<Config> {
    let file = File::open(path).with_context(|| format!("Could not open config {path}"))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid config {path}"))
}
