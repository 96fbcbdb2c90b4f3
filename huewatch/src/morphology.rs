//! # Binary masks and morphological filtering

use nalgebra as na;

/// Erosion and dilation radii, in pixels.
///
/// Erosion runs first to drop speckle noise, dilation then grows the surviving blobs back. A
/// radius of 0 disables the respective step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct MorphologyParams {
    pub erode_size: usize,
    pub dilate_size: usize,
}

impl Default for MorphologyParams {
    fn default() -> Self {
        Self {
            erode_size: 2,
            dilate_size: 2,
        }
    }
}

impl MorphologyParams {
    /// Apply erosion followed by dilation to the mask.
    pub fn apply(&self, mask: Mask) -> Mask {
        let mask = if self.erode_size > 0 {
            mask.erode(&StructuringElement::ellipse(self.erode_size))
        } else {
            mask
        };

        if self.dilate_size > 0 {
            mask.dilate(&StructuringElement::ellipse(self.dilate_size))
        } else {
            mask
        }
    }
}

/// Set of offsets around the anchor pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuringElement {
    offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
    /// Elliptical element inscribed in a `(2 * radius + 1)` square.
    ///
    /// Rows are rasterised the same way as OpenCV's `MORPH_ELLIPSE`.
    pub fn ellipse(radius: usize) -> Self {
        let r = radius as isize;

        if r == 0 {
            return Self {
                offsets: vec![(0, 0)],
            };
        }

        let inv_r2 = 1.0 / (r * r) as f64;

        let offsets = (-r..=r)
            .flat_map(|dy| {
                let dx = r as f64 * ((r * r - dy * dy) as f64 * inv_r2).sqrt();
                let dx = dx.round() as isize;
                (-dx..=dx).map(move |dx| (dx, dy))
            })
            .collect();

        Self { offsets }
    }

    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }
}

/// Raw spatial moments of a binary mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Moments {
    pub m00: u64,
    pub m10: u64,
    pub m01: u64,
}

impl Moments {
    /// Mass-weighted centre of the foreground, if there is any foreground.
    ///
    /// Coordinates are floored to whole pixels.
    pub fn centroid(&self) -> Option<na::Point2<i32>> {
        if self.m00 == 0 {
            None
        } else {
            Some(na::Point2::new(
                (self.m10 / self.m00) as i32,
                (self.m01 / self.m00) as i32,
            ))
        }
    }
}

/// Binary image in row-major order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl Mask {
    /// Create an all-background mask.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    /// Build a mask from a per-pixel predicate over row-major input.
    pub fn from_fn<T>(width: usize, height: usize, pixels: &[T], f: impl Fn(&T) -> bool) -> Self {
        Self {
            width,
            height,
            data: pixels.iter().map(f).collect(),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[self.width * y + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[self.width * y + x] = value;
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Pixel-wise logical OR of two equally sized masks.
    pub fn union(mut self, other: &Mask) -> Mask {
        assert_eq!(self.dim(), other.dim());
        self.data
            .iter_mut()
            .zip(&other.data)
            .for_each(|(a, &b)| *a |= b);
        self
    }

    /// Keep pixels whose whole in-bounds neighbourhood is foreground.
    pub fn erode(&self, element: &StructuringElement) -> Mask {
        self.filter(element, true)
    }

    /// Set pixels that have any in-bounds foreground neighbour.
    pub fn dilate(&self, element: &StructuringElement) -> Mask {
        self.filter(element, false)
    }

    // Neighbours outside the image never influence the result.
    fn filter(&self, element: &StructuringElement, erode: bool) -> Mask {
        let (w, h) = (self.width as isize, self.height as isize);
        let mut out = Mask::new(self.width, self.height);

        for y in 0..h {
            for x in 0..w {
                let mut neighbours = element
                    .offsets()
                    .iter()
                    .map(|&(dx, dy)| (x + dx, y + dy))
                    .filter(|&(nx, ny)| (0..w).contains(&nx) && (0..h).contains(&ny))
                    .map(|(nx, ny)| self.data[(ny * w + nx) as usize]);

                let value = if erode {
                    neighbours.all(|v| v)
                } else {
                    neighbours.any(|v| v)
                };

                out.data[(y * w + x) as usize] = value;
            }
        }

        out
    }

    /// Compute the raw binary moments of the mask.
    pub fn moments(&self) -> Moments {
        let mut moments = Moments::default();

        for (i, _) in self.data.iter().enumerate().filter(|&(_, &v)| v) {
            moments.m00 += 1;
            moments.m10 += (i % self.width) as u64;
            moments.m01 += (i / self.width) as u64;
        }

        moments
    }
}
