//! # Static configuration
//!
//! Everything the detection and recording logic needs is gathered into a single [`Config`],
//! built once at startup and handed to the [`CycleRunner`](crate::cycle::CycleRunner) by
//! reference.

use crate::color::ColorBand;
use crate::frame::FourCc;
use crate::morphology::MorphologyParams;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(default)
)]
pub struct Config {
    /// Colour bands in priority order. The first band to report motion wins.
    pub bands: Vec<ColorBand>,
    pub morphology: MorphologyParams,
    /// Centroid displacement, in pixels, that counts as motion.
    pub motion_threshold: f64,
    /// Seconds to wait after a motion-free check before checking again.
    pub quiet_period_s: f64,
    pub recording: RecordingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bands: vec![
                ColorBand::blue(),
                ColorBand::red(),
                ColorBand::green(),
                ColorBand::yellow(),
                ColorBand::white(),
            ],
            morphology: Default::default(),
            motion_threshold: 30.0,
            quiet_period_s: 10.0,
            recording: Default::default(),
        }
    }
}

impl Config {
    /// Minimum time between two motion-free checks.
    pub fn quiet_period(&self) -> Duration {
        if self.quiet_period_s.is_finite() && self.quiet_period_s > 0.0 {
            Duration::from_secs_f64(self.quiet_period_s)
        } else {
            Duration::ZERO
        }
    }

    /// Number of frames that make up a single clip.
    pub fn max_recording_frames(&self) -> usize {
        self.recording.max_frames()
    }

    /// List settings that silently disable parts of the pipeline.
    ///
    /// None of these are errors, but they are usually not what the user intended.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = vec![];

        if self.bands.is_empty() {
            warnings.push("No colour bands configured, motion will never be detected".into());
        }

        if self.motion_threshold <= 0.0 || self.motion_threshold.is_nan() {
            warnings.push(format!(
                "Motion threshold {} is not positive, displacement checks are disabled",
                self.motion_threshold
            ));
        }

        if self.morphology.erode_size == 0 {
            warnings.push("Erosion disabled, speckle noise will not be suppressed".into());
        }

        if self.morphology.dilate_size == 0 {
            warnings.push("Dilation disabled".into());
        }

        let raw_frames = (self.recording.write_fps * self.recording.record_duration_s).round();
        if !raw_frames.is_finite() || raw_frames < 1.0 {
            warnings.push(format!(
                "{} fps for {} s yields no frames, clips are cut to a single frame",
                self.recording.write_fps, self.recording.record_duration_s
            ));
        }

        if self.recording.codec.len() != 4 {
            warnings.push(format!(
                "Codec {:?} is not a four character code",
                self.recording.codec
            ));
        }

        warnings
    }
}

/// Clip output settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(default)
)]
pub struct RecordingConfig {
    /// Playback framerate of written clips.
    pub write_fps: f64,
    /// Target clip length in seconds.
    pub record_duration_s: f64,
    /// Four character code of the clip codec.
    pub codec: String,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Write the frame that triggered the recording as the first frame of the clip.
    pub write_trigger_frame: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            write_fps: 15.0,
            record_duration_s: 30.0,
            codec: "MJPG".into(),
            output_dir: ".".into(),
            file_prefix: "motion".into(),
            write_trigger_frame: false,
        }
    }
}

impl RecordingConfig {
    /// `round(write_fps * record_duration_s)`, never less than one frame.
    pub fn max_frames(&self) -> usize {
        let frames = (self.write_fps * self.record_duration_s).round();

        if frames.is_finite() && frames >= 1.0 {
            frames as usize
        } else {
            1
        }
    }

    /// Codec as a four character code, padded with spaces.
    pub fn fourcc(&self) -> FourCc {
        let mut fourcc = [b' '; 4];
        fourcc
            .iter_mut()
            .zip(self.codec.bytes())
            .for_each(|(o, i)| *o = i);
        fourcc
    }

    /// Path of the clip recorded during the given cycle.
    pub fn clip_path(&self, cycle: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}-{:04}.avi", self.file_prefix, cycle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_clip_is_450_frames() {
        assert_eq!(Config::default().max_recording_frames(), 450);
    }

    #[test]
    fn max_frames_rounds() {
        let rec = RecordingConfig {
            write_fps: 12.5,
            record_duration_s: 0.5,
            ..Default::default()
        };
        // 6.25
        assert_eq!(rec.max_frames(), 6);

        let rec = RecordingConfig {
            write_fps: 15.0,
            record_duration_s: 0.1,
            ..Default::default()
        };
        // 1.5
        assert_eq!(rec.max_frames(), 2);
    }

    #[test]
    fn degenerate_clip_length_is_one_frame() {
        let rec = RecordingConfig {
            write_fps: 0.0,
            ..Default::default()
        };
        assert_eq!(rec.max_frames(), 1);

        let config = Config {
            recording: rec,
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn quiet_period_never_panics() {
        let mut config = Config::default();
        assert_eq!(config.quiet_period(), Duration::from_secs(10));
        config.quiet_period_s = -3.0;
        assert_eq!(config.quiet_period(), Duration::ZERO);
        config.quiet_period_s = f64::NAN;
        assert_eq!(config.quiet_period(), Duration::ZERO);
    }

    #[test]
    fn clip_paths_are_numbered() {
        let rec = RecordingConfig {
            output_dir: "/tmp/clips".into(),
            ..Default::default()
        };
        assert_eq!(rec.clip_path(3), PathBuf::from("/tmp/clips/motion-0003.avi"));
    }

    #[test]
    fn fourcc_is_padded() {
        assert_eq!(RecordingConfig::default().fourcc(), *b"MJPG");
        let rec = RecordingConfig {
            codec: "XV".into(),
            ..Default::default()
        };
        assert_eq!(rec.fourcc(), *b"XV  ");
    }

    #[test]
    fn disabled_features_are_warnings() {
        let config = Config {
            bands: vec![],
            motion_threshold: 0.0,
            morphology: MorphologyParams {
                erode_size: 0,
                dilate_size: 0,
            },
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 4);
        assert!(Config::default().validate().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "motion_threshold": 12.5, "recording": { "write_fps": 10.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.motion_threshold, 12.5);
        assert_eq!(config.bands.len(), 5);
        assert_eq!(config.recording.codec, "MJPG");
        assert_eq!(config.max_recording_frames(), 300);
    }
}
