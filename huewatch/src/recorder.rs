//! # Recording state machine

use crate::config::Config;
use crate::detection::CentroidDetector;
use crate::evaluator::{MotionEvaluator, MotionResult};
use crate::frame::{FourCc, Frame, FrameSink};
use anyhow::Result;
use log::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// What the controller did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Idle and still within the quiet period, the frame was not looked at.
    Skipped,
    /// The frame was evaluated and showed no motion. The quiet period restarts.
    Quiet,
    /// Motion on the given band opened a new clip.
    RecordingStarted { band: usize },
    /// The frame was appended to the open clip.
    FrameWritten,
    /// The clip reached its length and was closed.
    ClipComplete,
}

/// Decides when motion evaluation may run and when a clip starts and ends.
///
/// The controller is the only owner of the sink, which is open exactly while the state is
/// [`RecordingState::Recording`]. While recording, frames are written unconditionally and no
/// detection happens.
pub struct RecordingController<S> {
    sink: S,
    state: RecordingState,
    frames_written: usize,
    max_frames: usize,
    quiet_period: Duration,
    last_quiet: Option<Instant>,
    clip_path: PathBuf,
    codec: FourCc,
    write_fps: f64,
    write_trigger_frame: bool,
}

impl<S: FrameSink> RecordingController<S> {
    pub fn new(sink: S, config: &Config) -> Self {
        Self {
            sink,
            state: RecordingState::Idle,
            frames_written: 0,
            max_frames: config.max_recording_frames(),
            quiet_period: config.quiet_period(),
            last_quiet: None,
            clip_path: config.recording.clip_path(0),
            codec: config.recording.fourcc(),
            write_fps: config.recording.write_fps,
            write_trigger_frame: config.recording.write_trigger_frame,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn clip_path(&self) -> &Path {
        &self.clip_path
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Whether a motion evaluation would run for a frame arriving at `now`.
    pub fn is_eligible(&self, now: Instant) -> bool {
        self.state == RecordingState::Idle
            && self
                .last_quiet
                .map_or(true, |t| now.saturating_duration_since(t) >= self.quiet_period)
    }

    /// Prepare for a new cycle.
    ///
    /// Any open clip is closed, the quiet period is cleared so that the next frame gets
    /// evaluated, and `clip_path` becomes the target of the next clip.
    pub fn reset(&mut self, clip_path: PathBuf) -> Result<()> {
        self.abort()?;
        self.last_quiet = None;
        self.clip_path = clip_path;
        Ok(())
    }

    /// Close the open clip, if any, and return to idle.
    ///
    /// If the sink fails to close and stays open, the controller keeps recording.
    pub fn abort(&mut self) -> Result<()> {
        if !self.sink.is_open() {
            self.state = RecordingState::Idle;
            self.frames_written = 0;
            return Ok(());
        }

        info!("Closing {} early", self.clip_path.display());

        self.close_clip()
    }

    /// Process a single frame.
    ///
    /// # Arguments
    ///
    /// * `frame` - the frame to process.
    /// * `now` - time the frame was captured.
    /// * `evaluator` - motion evaluator consulted while idle.
    pub fn process<D: CentroidDetector>(
        &mut self,
        frame: &Frame,
        now: Instant,
        evaluator: &mut MotionEvaluator<D>,
    ) -> Result<ControllerEvent> {
        match self.state {
            RecordingState::Recording => self.write(frame),
            RecordingState::Idle if !self.is_eligible(now) => Ok(ControllerEvent::Skipped),
            RecordingState::Idle => match evaluator.evaluate(frame) {
                MotionResult::NoMotion => {
                    self.last_quiet = Some(now);
                    Ok(ControllerEvent::Quiet)
                }
                MotionResult::MotionOnBand(band) => {
                    self.start(frame)?;

                    if self.write_trigger_frame {
                        if let ControllerEvent::ClipComplete = self.write(frame)? {
                            return Ok(ControllerEvent::ClipComplete);
                        }
                    }

                    Ok(ControllerEvent::RecordingStarted { band })
                }
            },
        }
    }

    fn start(&mut self, frame: &Frame) -> Result<()> {
        self.sink
            .open(&self.clip_path, self.codec, self.write_fps, frame.dim())?;
        self.state = RecordingState::Recording;
        self.frames_written = 0;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<ControllerEvent> {
        // A full clip whose close failed earlier only retries the close.
        if self.frames_written < self.max_frames {
            self.sink.write(frame)?;
            self.frames_written += 1;

            if self.frames_written < self.max_frames {
                return Ok(ControllerEvent::FrameWritten);
            }

            debug!(
                "Wrote {} frames to {}",
                self.frames_written,
                self.clip_path.display()
            );
        }

        self.close_clip()?;

        Ok(ControllerEvent::ClipComplete)
    }

    /// Close the sink, and return to idle once it reports being closed.
    fn close_clip(&mut self) -> Result<()> {
        let closed = self.sink.close();

        if !self.sink.is_open() {
            self.state = RecordingState::Idle;
            self.frames_written = 0;
        }

        closed
    }
}
