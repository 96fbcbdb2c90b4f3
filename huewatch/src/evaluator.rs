//! # Centroid displacement motion evaluation

use crate::color::ColorBand;
use crate::config::Config;
use crate::detection::{Centroid, CentroidDetector, ColorBandDetector};
use crate::frame::Frame;
use log::*;

/// Outcome of evaluating a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionResult {
    NoMotion,
    /// Motion was detected on the band at the given index.
    MotionOnBand(usize),
}

/// Tracks the last known centroid of every colour band.
///
/// A band's centroid starts out unknown. The first sighting only establishes a baseline, while
/// later sightings are compared against it. Bands are checked in configuration order and the
/// first one whose centroid moved further than the threshold ends the evaluation.
pub struct MotionEvaluator<D = ColorBandDetector> {
    bands: Vec<ColorBand>,
    centroids: Vec<Option<Centroid>>,
    motion_threshold: f64,
    detector: D,
}

impl MotionEvaluator {
    pub fn new(config: &Config) -> Self {
        Self::with_detector(
            config.bands.clone(),
            config.motion_threshold,
            ColorBandDetector::new(config.morphology),
        )
    }
}

impl<D: CentroidDetector> MotionEvaluator<D> {
    /// Create an evaluator with a custom detector.
    ///
    /// # Arguments
    ///
    /// * `bands` - colour bands in priority order.
    /// * `motion_threshold` - displacement in pixels that counts as motion. Non-positive values
    /// disable the displacement check.
    /// * `detector` - detector used to locate each band.
    pub fn with_detector(bands: Vec<ColorBand>, motion_threshold: f64, detector: D) -> Self {
        Self {
            centroids: vec![None; bands.len()],
            bands,
            motion_threshold,
            detector,
        }
    }

    /// Forget all centroids.
    pub fn reset(&mut self) {
        self.centroids.iter_mut().for_each(|c| *c = None);
    }

    pub fn bands(&self) -> &[ColorBand] {
        &self.bands
    }

    /// Last known centroid of each band, in band order.
    pub fn centroids(&self) -> &[Option<Centroid>] {
        &self.centroids
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Evaluate a frame for motion.
    ///
    /// Bands without a detection keep their previous centroid. When a band triggers, evaluation
    /// returns immediately and neither that band nor any later band is updated.
    pub fn evaluate(&mut self, frame: &Frame) -> MotionResult {
        for (i, (band, stored)) in self.bands.iter().zip(&mut self.centroids).enumerate() {
            let candidate = match self.detector.detect(frame, &band.range) {
                Some(c) => c,
                None => continue,
            };

            if let Some(previous) = stored {
                let distance = (candidate - *previous).cast::<f64>().norm();

                trace!(
                    "{}: {:?} -> {:?} ({distance:.2} px)",
                    band.name,
                    previous,
                    candidate
                );

                if self.motion_threshold > 0.0 && distance > self.motion_threshold {
                    debug!("Motion on {} band: moved {distance:.2} px", band.name);
                    return MotionResult::MotionOnBand(i);
                }
            } else {
                debug!("{} band baseline at {:?}", band.name, candidate);
            }

            *stored = Some(candidate);
        }

        MotionResult::NoMotion
    }
}
