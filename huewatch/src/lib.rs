//! # Colour-band Motion Recorder
//!
//! This library watches a stream of frames, tracks the centroid of a set of configured colour
//! bands, and records a fixed-length clip whenever one of those centroids moves further than a
//! threshold.
//!
//! Frame acquisition and clip encoding are left to implementors of [`frame::FrameSource`] and
//! [`frame::FrameSink`]. The easiest way to use the library is to import its prelude:
//!
//! ```
//! use huewatch::prelude::v1::*;
//! ```

pub mod color;
pub mod config;
pub mod cycle;
pub mod detection;
pub mod evaluator;
pub mod frame;
pub mod morphology;
pub mod recorder;
pub mod stats;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            color::{ColorBand, ColorRange, Hsv, HsvBounds},
            config::{Config, RecordingConfig},
            cycle::{CancelSignal, Clock, CycleOutcome, CycleRunner, CycleTrigger, SystemClock},
            detection::{Centroid, CentroidDetector, ColorBandDetector},
            evaluator::{MotionEvaluator, MotionResult},
            frame::{Bgr, FourCc, Frame, FrameSink, FrameSource},
            morphology::{Mask, MorphologyParams},
            recorder::{ControllerEvent, RecordingController, RecordingState},
            stats::FrameRateMeter,
        };
        pub use anyhow::{anyhow, Context, Error, Result};
    }
}
