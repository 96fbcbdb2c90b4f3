//! # Detection and recording cycles
//!
//! A cycle starts on an external begin signal and ends once a single clip has been recorded, or
//! when cancellation is requested. Frames are pulled from the source one at a time, and each is
//! fully processed before the next one is requested.

use crate::config::Config;
use crate::detection::{CentroidDetector, ColorBandDetector};
use crate::evaluator::MotionEvaluator;
use crate::frame::{Frame, FrameSink, FrameSource};
use crate::recorder::{ControllerEvent, RecordingController};
use crate::stats::FrameRateMeter;
use anyhow::{anyhow, Context, Result};
use log::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Blocking source of "begin a cycle" requests.
pub trait CycleTrigger {
    /// Wait until the next cycle should begin.
    ///
    /// Returns `Ok(false)` when no more cycles will be requested.
    fn wait_for_begin(&mut self) -> Result<bool>;
}

/// Polled stop request.
pub trait CancelSignal {
    /// Returns `true` once the run should stop. Must not block.
    fn cancel_requested(&mut self) -> bool;
}

/// Flag set from another context, such as a signal handler.
impl CancelSignal for Arc<AtomicBool> {
    fn cancel_requested(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Fires when either signal fires.
///
/// Both signals are polled every time, since polling may have side effects such as pumping
/// window events.
impl<A: CancelSignal, B: CancelSignal> CancelSignal for (A, B) {
    fn cancel_requested(&mut self) -> bool {
        let a = self.0.cancel_requested();
        let b = self.1.cancel_requested();
        a || b
    }
}

/// Time source for quiet period bookkeeping.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// How a cycle ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A full clip was written to the given path.
    ClipComplete(PathBuf),
    /// Cancellation was requested. Any partial clip has been closed.
    Cancelled,
}

/// Drives the evaluator and the recording controller over a frame source.
pub struct CycleRunner<'a, S, D = ColorBandDetector, C = SystemClock> {
    config: &'a Config,
    evaluator: MotionEvaluator<D>,
    controller: RecordingController<S>,
    clock: C,
    meter: FrameRateMeter,
    frame: Frame,
    cycles: usize,
}

impl<'a, S: FrameSink> CycleRunner<'a, S> {
    pub fn new(config: &'a Config, sink: S) -> Self {
        Self::with_parts(config, MotionEvaluator::new(config), sink, SystemClock)
    }
}

impl<'a, S: FrameSink, D: CentroidDetector, C: Clock> CycleRunner<'a, S, D, C> {
    /// Create a runner out of custom parts.
    ///
    /// # Arguments
    ///
    /// * `config` - configuration shared by all cycles.
    /// * `evaluator` - motion evaluator to drive.
    /// * `sink` - clip writer, owned by the recording controller.
    /// * `clock` - time source.
    pub fn with_parts(
        config: &'a Config,
        evaluator: MotionEvaluator<D>,
        sink: S,
        clock: C,
    ) -> Self {
        Self {
            config,
            evaluator,
            controller: RecordingController::new(sink, config),
            clock,
            meter: Default::default(),
            frame: Default::default(),
            cycles: 0,
        }
    }

    pub fn evaluator(&self) -> &MotionEvaluator<D> {
        &self.evaluator
    }

    pub fn controller(&self) -> &RecordingController<S> {
        &self.controller
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Run cycles until the trigger runs dry or cancellation is requested.
    ///
    /// Returns the number of clips recorded. Source disconnection is fatal and returned as an
    /// error.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        trigger: &mut dyn CycleTrigger,
        cancel: &mut dyn CancelSignal,
    ) -> Result<usize> {
        let mut clips = 0;

        while trigger.wait_for_begin()? {
            match self.run_cycle(source, cancel)? {
                CycleOutcome::ClipComplete(_) => clips += 1,
                CycleOutcome::Cancelled => {
                    info!("Cancelled");
                    break;
                }
            }
        }

        Ok(clips)
    }

    /// Run a single cycle.
    ///
    /// Tracking state is reset, then frames are processed until a clip completes or the cancel
    /// signal fires. On every exit path the clip writer is left closed.
    pub fn run_cycle(
        &mut self,
        source: &mut dyn FrameSource,
        cancel: &mut dyn CancelSignal,
    ) -> Result<CycleOutcome> {
        self.cycles += 1;

        let clip_path = self.config.recording.clip_path(self.cycles);

        self.evaluator.reset();
        self.controller.reset(clip_path.clone())?;
        self.meter.restart(self.clock.now());

        info!("Cycle {} started", self.cycles);

        let outcome = self.drive(source, cancel, clip_path);

        if !matches!(outcome, Ok(CycleOutcome::ClipComplete(_))) {
            if let Err(e) = self.controller.abort() {
                error!("Failed to close clip: {e}");
            }
        }

        outcome
    }

    fn drive(
        &mut self,
        source: &mut dyn FrameSource,
        cancel: &mut dyn CancelSignal,
        clip_path: PathBuf,
    ) -> Result<CycleOutcome> {
        loop {
            let read = source
                .read_frame(&mut self.frame)
                .context("Frame source disconnected")?;

            if !read || self.frame.is_empty() {
                return Err(anyhow!("Frame source disconnected"));
            }

            let now = self.clock.now();

            if let Some((elapsed, fps)) = self.meter.tick(now) {
                debug!(
                    "{} frames in {:.3} seconds = {fps:.2} FPS",
                    self.meter.window(),
                    elapsed.as_secs_f64()
                );
            }

            match self
                .controller
                .process(&self.frame, now, &mut self.evaluator)?
            {
                ControllerEvent::RecordingStarted { band } => {
                    let name = &self.evaluator.bands()[band].name;
                    info!(
                        "Started recording due to motion on {name} band: {}",
                        clip_path.display()
                    );
                }
                ControllerEvent::ClipComplete => {
                    info!("Stopped recording after one clip: {}", clip_path.display());
                    return Ok(CycleOutcome::ClipComplete(clip_path));
                }
                ControllerEvent::Skipped
                | ControllerEvent::Quiet
                | ControllerEvent::FrameWritten => {}
            }

            if cancel.cancel_requested() {
                return Ok(CycleOutcome::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorBand;
    use crate::frame::Bgr;
    use crate::recorder::tests::MockSink;
    use crate::recorder::RecordingState;
    use std::cell::Cell;
    use std::time::Duration;

    const BLUE: Bgr = Bgr::new(255, 0, 0);

    struct NeverCancel;

    impl CancelSignal for NeverCancel {
        fn cancel_requested(&mut self) -> bool {
            false
        }
    }

    /// Clock advancing by a fixed step on every reading.
    struct SteppingClock {
        start: Instant,
        step: Duration,
        readings: Cell<u32>,
    }

    impl SteppingClock {
        fn new(step: Duration) -> Self {
            Self {
                start: Instant::now(),
                step,
                readings: Cell::new(0),
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Instant {
            let n = self.readings.get();
            self.readings.set(n + 1);
            self.start + self.step * n
        }
    }

    /// Source producing `limit` frames from a generator, then reporting end of stream.
    struct ScriptedSource<F> {
        generate: F,
        limit: usize,
        reads: usize,
    }

    impl<F: FnMut(usize) -> Frame> ScriptedSource<F> {
        fn new(limit: usize, generate: F) -> Self {
            Self {
                generate,
                limit,
                reads: 0,
            }
        }
    }

    impl<F: FnMut(usize) -> Frame> FrameSource for ScriptedSource<F> {
        fn read_frame(&mut self, frame: &mut Frame) -> Result<bool> {
            if self.reads >= self.limit {
                return Ok(false);
            }
            *frame = (self.generate)(self.reads);
            self.reads += 1;
            Ok(true)
        }

        fn frame_rate(&self) -> Option<f64> {
            Some(15.0)
        }
    }

    struct Times(usize);

    impl CycleTrigger for Times {
        fn wait_for_begin(&mut self) -> Result<bool> {
            let more = self.0 > 0;
            self.0 = self.0.saturating_sub(1);
            Ok(more)
        }
    }

    /// Fires on the n-th poll.
    struct CancelAfter(usize);

    impl CancelSignal for CancelAfter {
        fn cancel_requested(&mut self) -> bool {
            self.0 = self.0.saturating_sub(1);
            self.0 == 0
        }
    }

    fn config() -> Config {
        Config {
            bands: vec![ColorBand::blue(), ColorBand::red(), ColorBand::green()],
            ..Default::default()
        }
    }

    fn blue_blob(x: usize, y: usize) -> Frame {
        let mut frame = Frame::new(200, 100);
        frame.fill_rect(x - 5, y - 5, 11, 11, BLUE);
        frame
    }

    /// Blob at (50, 50), then at (120, 50) for the rest of the stream.
    fn moving_blob(i: usize) -> Frame {
        if i % 1000 == 0 {
            blue_blob(50, 50)
        } else {
            blue_blob(120, 50)
        }
    }

    fn runner(config: &Config) -> CycleRunner<MockSink, ColorBandDetector, SteppingClock> {
        CycleRunner::with_parts(
            config,
            MotionEvaluator::new(config),
            MockSink::default(),
            SteppingClock::new(Duration::from_secs(10)),
        )
    }

    #[test]
    fn blue_motion_records_one_clip() {
        let config = config();
        let mut runner = runner(&config);
        let mut source = ScriptedSource::new(460, moving_blob);

        let outcome = runner.run_cycle(&mut source, &mut NeverCancel).unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::ClipComplete(config.recording.clip_path(1))
        );
        // Baseline, trigger, then 450 recorded frames.
        assert_eq!(source.reads, 452);

        let sink = runner.controller().sink();
        assert_eq!(sink.written, vec![450]);
        assert_eq!(sink.opened[0].3, (200, 100));
        assert!(!sink.is_open());
        assert_eq!(runner.controller().state(), RecordingState::Idle);
        assert_eq!(runner.controller().frames_written(), 0);
    }

    #[test]
    fn colourless_frames_never_record() {
        let config = Config {
            quiet_period_s: 0.0,
            ..config()
        };
        let mut runner = runner(&config);
        let mut source = ScriptedSource::new(40, |_| Frame::new(64, 48));

        let err = runner
            .run_cycle(&mut source, &mut NeverCancel)
            .unwrap_err();

        assert!(err.to_string().contains("disconnected"));
        assert_eq!(source.reads, 40);
        assert!(runner.controller().sink().opened.is_empty());
        assert_eq!(runner.evaluator().centroids(), &[None, None, None]);
    }

    #[test]
    fn disconnect_while_recording_closes_clip() {
        let config = config();
        let mut runner = runner(&config);
        let mut source = ScriptedSource::new(10, moving_blob);

        assert!(runner.run_cycle(&mut source, &mut NeverCancel).is_err());

        let sink = runner.controller().sink();
        assert_eq!(sink.written, vec![8]);
        assert_eq!(sink.closes, 1);
        assert!(!sink.is_open());
    }

    #[test]
    fn cancel_closes_clip() {
        let config = config();
        let mut runner = runner(&config);
        let mut source = ScriptedSource::new(460, moving_blob);

        let outcome = runner
            .run_cycle(&mut source, &mut CancelAfter(5))
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(source.reads, 5);
        let sink = runner.controller().sink();
        assert_eq!(sink.written, vec![3]);
        assert!(!sink.is_open());
    }

    #[test]
    fn cycles_reset_tracking() {
        let config = config();
        let mut runner = runner(&config);
        // Had the first cycle's stale centroid survived, frame 452 would trigger right away.
        let mut source = ScriptedSource::new(2000, |i| match i {
            0 => blue_blob(50, 50),
            1..=452 => blue_blob(120, 50),
            _ => blue_blob(50, 50),
        });

        let clips = runner
            .run(&mut source, &mut Times(2), &mut NeverCancel)
            .unwrap();

        assert_eq!(clips, 2);
        assert_eq!(runner.cycles(), 2);
        assert_eq!(source.reads, 904);

        let sink = runner.controller().sink();
        let paths = sink.opened.iter().map(|o| o.0.clone()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![config.recording.clip_path(1), config.recording.clip_path(2)]
        );
        assert_eq!(sink.written, vec![450, 450]);
    }

    #[test]
    fn run_stops_on_cancel() {
        let config = config();
        let mut runner = runner(&config);
        let mut source = ScriptedSource::new(100, moving_blob);

        let clips = runner
            .run(&mut source, &mut Times(usize::MAX), &mut CancelAfter(1))
            .unwrap();

        assert_eq!(clips, 0);
        assert_eq!(runner.cycles(), 1);
        assert_eq!(source.reads, 1);
    }

    #[test]
    fn run_without_trigger_reads_nothing() {
        let config = config();
        let mut runner = runner(&config);
        let mut source = ScriptedSource::new(100, moving_blob);

        let clips = runner
            .run(&mut source, &mut Times(0), &mut NeverCancel)
            .unwrap();

        assert_eq!(clips, 0);
        assert_eq!(source.reads, 0);
    }

    #[test]
    fn paired_signals_poll_both() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut signal = (CancelAfter(3), flag.clone());

        assert!(!signal.cancel_requested());
        flag.store(true, Ordering::Relaxed);
        assert!(signal.cancel_requested());
        // The first signal was still counted down on the previous poll.
        assert_eq!(signal.0 .0, 1);

        flag.store(false, Ordering::Relaxed);
        assert!(signal.cancel_requested());
    }

    #[test]
    fn interrupt_flag_closes_clip() {
        let config = config();
        let mut runner = runner(&config);
        let flag = Arc::new(AtomicBool::new(false));
        let setter = flag.clone();
        let mut source = ScriptedSource::new(460, move |i| {
            // Raised while the fourth frame is captured.
            if i == 3 {
                setter.store(true, Ordering::Relaxed);
            }
            moving_blob(i)
        });

        let outcome = runner
            .run_cycle(&mut source, &mut flag.clone())
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(source.reads, 4);
        let sink = runner.controller().sink();
        assert_eq!(sink.written, vec![2]);
        assert_eq!(sink.closes, 1);
        assert!(!sink.is_open());
    }

    #[test]
    fn atomic_flag_cancels() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut signal = flag.clone();
        assert!(!signal.cancel_requested());
        flag.store(true, Ordering::Relaxed);
        assert!(signal.cancel_requested());
    }
}
