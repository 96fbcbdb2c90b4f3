//! # HSV colour ranges

use crate::frame::Bgr;

/// Exclusive upper bound of the 8-bit hue channel (degrees halved).
pub const HUE_RANGE: i32 = 180;

/// 8-bit HSV colour.
///
/// Uses OpenCV conventions: hue is in degrees halved (`0..180`), saturation and value span the
/// full `0..=255` range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(from = "[u8; 3]", into = "[u8; 3]")
)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

impl From<[u8; 3]> for Hsv {
    fn from([h, s, v]: [u8; 3]) -> Self {
        Self { h, s, v }
    }
}

impl From<Hsv> for [u8; 3] {
    fn from(Hsv { h, s, v }: Hsv) -> Self {
        [h, s, v]
    }
}

/// Fractional bits of the fixed point division tables.
const HSV_SHIFT: u32 = 12;

/// `round((255 << HSV_SHIFT) / v)`, used to scale the saturation.
const SDIV_TABLE: [i32; 256] = div_table(255 << HSV_SHIFT, 1);

/// `round((180 << HSV_SHIFT) / (6 * diff))`, used to scale the hue sector.
const HDIV_TABLE: [i32; 256] = div_table(HUE_RANGE << HSV_SHIFT, 6);

/// Reciprocal table with entry `i` set to `num / (den * i)`, rounded half to even.
const fn div_table(num: i32, den: i32) -> [i32; 256] {
    let mut table = [0; 256];
    let mut i = 1;

    while i < 256 {
        let d = den * i as i32;
        let q = num / d;
        let rem = num % d;

        table[i] = if 2 * rem > d || (2 * rem == d && q % 2 == 1) {
            q + 1
        } else {
            q
        };

        i += 1;
    }

    table
}

impl From<Bgr> for Hsv {
    /// Convert with the fixed point tables of OpenCV's 8-bit `BGR2HSV`.
    fn from(Bgr { b, g, r }: Bgr) -> Self {
        let (b, g, r) = (b as i32, g as i32, r as i32);

        let v = b.max(g).max(r);
        let diff = v - b.min(g).min(r);

        let round = 1 << (HSV_SHIFT - 1);

        let s = (diff * SDIV_TABLE[v as usize] + round) >> HSV_SHIFT;

        let sector = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };

        // Arithmetic shift, negative sectors round towards negative infinity.
        let h = (sector * HDIV_TABLE[diff as usize] + round) >> HSV_SHIFT;
        let h = if h < 0 { h + HUE_RANGE } else { h };

        Self {
            h: h as u8,
            s: s as u8,
            v: v as u8,
        }
    }
}

/// Inclusive lower and upper HSV bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct HsvBounds {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvBounds {
    pub const fn new(lower: Hsv, upper: Hsv) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&hsv.h)
            && (self.lower.s..=self.upper.s).contains(&hsv.s)
            && (self.lower.v..=self.upper.v).contains(&hsv.v)
    }
}

/// Colour range to threshold against.
///
/// Hues that straddle the 0/180 boundary (red) are expressed with a secondary set of bounds.
/// A pixel matching either of them is considered inside the range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct ColorRange {
    pub primary: HsvBounds,
    #[cfg_attr(feature = "serde", serde(default))]
    pub secondary: Option<HsvBounds>,
}

impl ColorRange {
    pub const fn single(primary: HsvBounds) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub const fn wrapping(primary: HsvBounds, secondary: HsvBounds) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        self.primary.contains(hsv) || self.secondary.map_or(false, |s| s.contains(hsv))
    }
}

/// Named colour range tracked for motion.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct ColorBand {
    pub name: String,
    pub range: ColorRange,
}

impl ColorBand {
    pub fn new(name: impl Into<String>, range: ColorRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }

    pub fn blue() -> Self {
        Self::new(
            "blue",
            ColorRange::single(bounds([100, 100, 50], [130, 255, 255])),
        )
    }

    pub fn red() -> Self {
        Self::new(
            "red",
            ColorRange::wrapping(
                bounds([0, 100, 50], [10, 255, 255]),
                bounds([160, 100, 50], [179, 255, 255]),
            ),
        )
    }

    pub fn green() -> Self {
        Self::new(
            "green",
            ColorRange::single(bounds([40, 70, 50], [80, 255, 255])),
        )
    }

    pub fn yellow() -> Self {
        Self::new(
            "yellow",
            ColorRange::single(bounds([20, 100, 100], [30, 255, 255])),
        )
    }

    pub fn white() -> Self {
        Self::new(
            "white",
            ColorRange::single(bounds([0, 0, 200], [179, 30, 255])),
        )
    }
}

fn bounds(lower: [u8; 3], upper: [u8; 3]) -> HsvBounds {
    HsvBounds::new(lower.into(), upper.into())
}
