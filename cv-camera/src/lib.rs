//! OpenCV camera capture and clip writing

use huewatch::prelude::v1::*;
use log::*;
use opencv::core::{Scalar, Size, Vec3b, CV_8UC3};
use opencv::highgui;
use opencv::prelude::*;
use opencv::videoio::*;
use std::path::Path;

/// Capture pipeline used on the Raspberry Pi camera.
///
/// Captures at 800x600, scales down to 400x300 and flips the image, since the camera is mounted
/// upside down. Stale buffers are dropped so that processing always sees the latest frame.
pub const DEFAULT_PIPELINE: &str = "libcamerasrc ! video/x-raw, width=800, height=600 ! \
     videoconvert ! videoscale ! video/x-raw, width=400, height=300 ! \
     videoflip method=rotate-180 ! appsink drop=true max_buffers=2";

/// Key code reported by HighGUI for the escape key.
const ESCAPE: i32 = 27;

/// Kind of capture input, guessed from its textual description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureInput<'a> {
    /// Camera device index.
    Device(i32),
    /// GStreamer pipeline description.
    Pipeline(&'a str),
    /// File or stream URL.
    File(&'a str),
}

impl<'a> CaptureInput<'a> {
    pub fn parse(input: &'a str) -> Self {
        if let Ok(index) = input.trim().parse() {
            Self::Device(index)
        } else if input.contains('!') {
            Self::Pipeline(input)
        } else {
            Self::File(input)
        }
    }
}

/// Frame source backed by an OpenCV `VideoCapture`.
pub struct CvCapture {
    capture: VideoCapture,
    mat: Mat,
    preview: Option<String>,
}

impl CvCapture {
    pub fn try_new(input: &str) -> Result<Self> {
        let capture = match CaptureInput::parse(input) {
            CaptureInput::Device(index) => VideoCapture::new(index, CAP_ANY)?,
            CaptureInput::Pipeline(pipeline) => VideoCapture::from_file(pipeline, CAP_GSTREAMER)?,
            CaptureInput::File(file) => VideoCapture::from_file(file, CAP_ANY)?,
        };

        if !capture.is_opened()? {
            return Err(anyhow!("Could not open camera: {input}"));
        }

        Ok(Self {
            capture,
            mat: Default::default(),
            preview: None,
        })
    }

    /// Show every captured frame in a window with the given title.
    ///
    /// The window only refreshes while HighGUI events are pumped, see [`EscapeKey`].
    pub fn with_preview(mut self, window: &str) -> Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
        self.preview = Some(window.to_string());
        Ok(self)
    }
}

impl FrameSource for CvCapture {
    fn read_frame(&mut self, frame: &mut Frame) -> Result<bool> {
        if !self.capture.read(&mut self.mat)? || self.mat.rows() == 0 || self.mat.cols() == 0 {
            return Ok(false);
        }

        if let Some(window) = &self.preview {
            highgui::imshow(window, &self.mat)?;
        }

        mat_to_frame(&self.mat, frame)?;

        Ok(true)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.capture.get(CAP_PROP_FPS).ok().filter(|&fps| fps > 0.0)
    }
}

/// Frame sink backed by an OpenCV `VideoWriter`.
#[derive(Default)]
pub struct CvClipWriter {
    writer: Option<VideoWriter>,
    mat: Mat,
}

impl FrameSink for CvClipWriter {
    fn open(&mut self, path: &Path, codec: FourCc, fps: f64, size: (usize, usize)) -> Result<()> {
        self.close()?;

        let [c1, c2, c3, c4] = codec.map(char::from);
        let fourcc = VideoWriter::fourcc(c1, c2, c3, c4)?;

        let file = path
            .to_str()
            .ok_or_else(|| anyhow!("Clip path is not valid UTF-8: {}", path.display()))?;

        let (w, h) = size;
        let writer = VideoWriter::new(file, fourcc, fps, Size::new(w as _, h as _), true)?;

        if !writer.is_opened()? {
            return Err(anyhow!("Could not open video writer for {file}"));
        }

        info!("Opened {file} ({w}x{h} @ {fps} fps)");

        self.writer = Some(writer);

        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("Video writer is not open"))?;

        frame_to_mat(frame, &mut self.mat)?;
        writer.write(&self.mat)?;

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for CvClipWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to release video writer: {e}");
        }
    }
}

/// Cancel signal fired by pressing escape in a HighGUI window.
///
/// Polling also pumps the window events, which keeps preview windows responsive.
#[derive(Clone, Copy, Debug, Default)]
pub struct EscapeKey;

impl CancelSignal for EscapeKey {
    fn cancel_requested(&mut self) -> bool {
        matches!(highgui::wait_key(1), Ok(ESCAPE))
    }
}

fn mat_to_frame(mat: &Mat, frame: &mut Frame) -> Result<()> {
    if mat.typ() != CV_8UC3 {
        return Err(anyhow!("Unsupported frame type {}", mat.typ()));
    }

    let (w, h) = (mat.cols() as usize, mat.rows() as usize);

    // Only continuous matrices expose their pixels as one slice.
    if let Ok(bytes) = mat.data_bytes() {
        return frame.copy_from_bgr_bytes(w, h, bytes);
    }

    frame.resize(w, h);

    for y in 0..h {
        for x in 0..w {
            let bgr: &Vec3b = mat.at_2d(y as _, x as _)?;
            frame.set(x, y, Bgr::new(bgr[0], bgr[1], bgr[2]));
        }
    }

    Ok(())
}

fn frame_to_mat(frame: &Frame, mat: &mut Mat) -> Result<()> {
    let (w, h) = frame.dim();

    if mat.cols() as usize != w || mat.rows() as usize != h || mat.typ() != CV_8UC3 {
        *mat = Mat::new_rows_cols_with_default(h as _, w as _, CV_8UC3, Scalar::all(0.0))?;
    }

    mat.data_bytes_mut()?.copy_from_slice(frame.as_bytes());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_kinds() {
        assert_eq!(CaptureInput::parse("0"), CaptureInput::Device(0));
        assert_eq!(CaptureInput::parse(" 2 "), CaptureInput::Device(2));
        assert_eq!(
            CaptureInput::parse(DEFAULT_PIPELINE),
            CaptureInput::Pipeline(DEFAULT_PIPELINE)
        );
        assert_eq!(
            CaptureInput::parse("rtsp://cam.local/stream"),
            CaptureInput::File("rtsp://cam.local/stream")
        );
    }

    #[test]
    fn mat_frame_conversion_keeps_channels() {
        let mut frame = Frame::new(3, 2);
        frame.set(2, 1, Bgr::new(10, 20, 30));

        let mut mat = Mat::default();
        frame_to_mat(&frame, &mut mat).unwrap();
        assert_eq!((mat.cols(), mat.rows()), (3, 2));
        let px: &Vec3b = mat.at_2d(1, 2).unwrap();
        assert_eq!((px[0], px[1], px[2]), (10, 20, 30));

        let mut back = Frame::default();
        mat_to_frame(&mat, &mut back).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn closed_writer_rejects_frames() {
        let mut writer = CvClipWriter::default();
        assert!(!writer.is_open());
        assert!(writer.write(&Frame::new(2, 2)).is_err());
        assert!(writer.close().is_ok());
    }
}
