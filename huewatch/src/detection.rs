//! Colour region detection module

use crate::color::{ColorRange, Hsv};
use crate::frame::Frame;
use crate::morphology::{Mask, MorphologyParams};
use nalgebra as na;

/// Pixel position of a detected colour region.
pub type Centroid = na::Point2<i32>;

/// Locates a colour range within a frame.
pub trait CentroidDetector {
    /// Find the centroid of all pixels of `frame` that fall inside `range`.
    ///
    /// Returns `None` if the range is not present in the frame.
    fn detect(&mut self, frame: &Frame, range: &ColorRange) -> Option<Centroid>;
}

/// HSV threshold based detector.
///
/// The frame is converted to HSV, thresholded against the range (both halves of a wrapping
/// range are unioned), cleaned up with an erode-then-dilate pass, and the centroid is taken from
/// the raw moments of what remains.
#[derive(Clone, Debug, Default)]
pub struct ColorBandDetector {
    morphology: MorphologyParams,
    hsv: Vec<Hsv>,
}

impl ColorBandDetector {
    pub fn new(morphology: MorphologyParams) -> Self {
        Self {
            morphology,
            hsv: vec![],
        }
    }

    /// Compute the denoised foreground mask of `range` within `frame`.
    pub fn mask(&mut self, frame: &Frame, range: &ColorRange) -> Mask {
        let (w, h) = frame.dim();

        self.hsv.clear();
        self.hsv
            .extend(frame.pixels().iter().map(|&bgr| Hsv::from(bgr)));

        let mut mask = Mask::from_fn(w, h, &self.hsv, |&hsv| range.primary.contains(hsv));

        if let Some(secondary) = range.secondary {
            mask = mask.union(&Mask::from_fn(w, h, &self.hsv, |&hsv| {
                secondary.contains(hsv)
            }));
        }

        self.morphology.apply(mask)
    }
}

impl CentroidDetector for ColorBandDetector {
    fn detect(&mut self, frame: &Frame, range: &ColorRange) -> Option<Centroid> {
        if frame.is_empty() {
            return None;
        }

        self.mask(frame, range).moments().centroid()
    }
}
