//! # Frames and frame I/O

use crate::prelude::v1::*;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// BGR colour structure.
///
/// Channel order matches the 8-bit images produced by OpenCV captures.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Bgr {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Bgr {
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(b: u8, g: u8, r: u8) -> Self {
        Self { b, g, r }
    }
}

/// Packed 8-bit BGR image stored in row-major order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    data: Vec<Bgr>,
}

impl Frame {
    /// Create a new black frame.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the frame in pixels.
    /// * `height` - height of the frame in pixels.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Bgr::BLACK)
    }

    /// Create a new frame with every pixel set to `colour`.
    pub fn filled(width: usize, height: usize, colour: Bgr) -> Self {
        Self {
            width,
            height,
            data: vec![colour; width * height],
        }
    }

    /// Replace the frame contents with tightly packed `[b, g, r]` bytes.
    ///
    /// The existing allocation is reused when possible.
    pub fn copy_from_bgr_bytes(
        &mut self,
        width: usize,
        height: usize,
        bytes: &[u8],
    ) -> Result<()> {
        let expected = width * height * std::mem::size_of::<Bgr>();

        if bytes.len() != expected {
            return Err(anyhow!(
                "Expected {expected} bytes for a {width}x{height} frame, got {}",
                bytes.len()
            ));
        }

        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.extend_from_slice(bytemuck::cast_slice(bytes));

        Ok(())
    }

    /// Get width and height of the frame.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns `true` if the frame holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the pixels in row-major order.
    pub fn pixels(&self) -> &[Bgr] {
        &self.data
    }

    /// View the frame as packed `[b, g, r]` bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Change the frame dimensions, reusing the existing allocation.
    ///
    /// Pixel contents are unspecified afterwards and expected to be overwritten by the caller.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.data.resize(width * height, Bgr::BLACK);
    }

    pub fn get(&self, x: usize, y: usize) -> Bgr {
        self.data[self.width * y + x]
    }

    pub fn set(&mut self, x: usize, y: usize, colour: Bgr) {
        self.data[self.width * y + x] = colour;
    }

    /// Fill a rectangle, clipped to the frame bounds.
    ///
    /// # Arguments
    ///
    /// * `x` - left edge of the rectangle.
    /// * `y` - top edge of the rectangle.
    /// * `width` - rectangle width.
    /// * `height` - rectangle height.
    /// * `colour` - colour to fill with.
    pub fn fill_rect(&mut self, x: usize, y: usize, width: usize, height: usize, colour: Bgr) {
        if x >= self.width || y >= self.height {
            return;
        }

        let x_end = std::cmp::min(x + width, self.width);
        let y_end = std::cmp::min(y + height, self.height);

        for row in y..y_end {
            let start = row * self.width;
            self.data[(start + x)..(start + x_end)].fill(colour);
        }
    }
}

/// Four character code identifying a video codec.
pub type FourCc = [u8; 4];

/// Live frame source.
pub trait FrameSource {
    /// Read the next frame of the stream.
    ///
    /// On success the frame is written into `frame` and `Ok(true)` is returned. `Ok(false)` means
    /// the stream has ended or the device went away, and `Err` is returned if reading failed.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<bool>;

    /// Get the framerate of the stream.
    ///
    /// On realtime streams it may not always be known. In such cases, `None` is returned.
    fn frame_rate(&self) -> Option<f64>;
}

/// Video clip writer.
pub trait FrameSink {
    /// Open a new clip.
    ///
    /// # Arguments
    ///
    /// * `path` - file to write the clip to.
    /// * `codec` - four character code of the codec to encode with.
    /// * `fps` - playback framerate of the clip.
    /// * `size` - `(width, height)` of every frame that will be written.
    fn open(&mut self, path: &Path, codec: FourCc, fps: f64, size: (usize, usize)) -> Result<()>;

    /// Append a frame to the open clip.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Finalise the clip. Closing a sink that is not open does nothing.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_clips_to_bounds() {
        let red = Bgr::new(0, 0, 255);
        let mut frame = Frame::new(4, 3);
        frame.fill_rect(2, 1, 10, 10, red);

        let filled = frame.pixels().iter().filter(|&&p| p == red).count();
        assert_eq!(filled, 4);
        assert_eq!(frame.get(3, 2), red);
        assert_eq!(frame.get(1, 1), Bgr::BLACK);
    }

    #[test]
    fn fill_rect_outside_frame_is_noop() {
        let mut frame = Frame::new(4, 3);
        frame.fill_rect(10, 10, 2, 2, Bgr::new(1, 2, 3));
        assert!(frame.pixels().iter().all(|&p| p == Bgr::BLACK));
    }

    #[test]
    fn packed_bytes_are_bgr() {
        let mut frame = Frame::new(5, 5);
        frame.copy_from_bgr_bytes(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();

        assert_eq!(frame.dim(), (2, 1));
        assert_eq!(frame.get(1, 0), Bgr::new(4, 5, 6));
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn short_byte_buffer_is_rejected() {
        let mut frame = Frame::new(2, 2);
        assert!(frame.copy_from_bgr_bytes(2, 2, &[0; 6]).is_err());
        // Left untouched.
        assert_eq!(frame, Frame::new(2, 2));
    }
}
