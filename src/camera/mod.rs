//! Camera driver seam and the per-room adapter built on it.
//!
//! [`CameraDevice`] is the narrow interface the rig consumes from a camera
//! driver. Two backends implement it:
//!
//! - [`SimulatedCamera`]: in-process camera for rehearsals and tests
//! - [`RpicamCamera`]: drives the `rpicam-vid` / `rpicam-hello` tools
//!
//! [`CameraAdapter`] wraps one device for one room and turns driver calls
//! into the preview / record operations the orchestrator needs.

use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::Result;
use crate::controls::{ControlRanges, ControlSet, Resolution};

pub mod adapter;
pub mod frame;
pub mod rpicam;
pub mod simulated;

pub use adapter::CameraAdapter;
pub use frame::Frame;
pub use rpicam::RpicamCamera;
pub use simulated::{SimulatedCamera, SimulatedCameraHandle};

/// What a configured stream is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamPurpose {
    Preview,
    Video,
}

/// Pixel layout of the main stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    Xbgr8888,
    Rgb888,
    Yuv420,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Xbgr8888 => f.write_str("XBGR8888"),
            PixelFormat::Rgb888 => f.write_str("RGB888"),
            PixelFormat::Yuv420 => f.write_str("YUV420"),
        }
    }
}

/// A complete stream configuration handed to [`CameraDevice::configure`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub purpose: StreamPurpose,
    pub size: Resolution,
    pub format: PixelFormat,
    pub controls: ControlSet,
}

impl StreamConfig {
    pub fn preview(size: Resolution, controls: ControlSet) -> Self {
        Self { purpose: StreamPurpose::Preview, size, format: PixelFormat::Xbgr8888, controls }
    }

    pub fn video(size: Resolution, controls: ControlSet) -> Self {
        Self { purpose: StreamPurpose::Video, size, format: PixelFormat::Yuv420, controls }
    }
}

/// H.264 encoder settings for a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encoder {
    /// Target bitrate in bits per second; `None` leaves it to the driver.
    pub bitrate: Option<u32>,
}

/// Interface consumed from a camera driver.
///
/// Every method maps onto a single driver call. Implementations report
/// failures as [`crate::RigError::Hardware`]; callers decide what a failure
/// means for the session.
#[async_trait::async_trait]
pub trait CameraDevice: Send + 'static {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    /// Apply a stream configuration. The camera must be stopped.
    async fn configure(&mut self, config: StreamConfig) -> Result<()>;

    /// Start streaming with the current configuration.
    async fn start(&mut self) -> Result<()>;

    /// Stop streaming. Stopping a stopped camera is not an error.
    async fn stop(&mut self) -> Result<()>;

    /// Start streaming and encode the main stream to `path`.
    async fn start_recording(&mut self, encoder: Encoder, path: &Path) -> Result<()>;

    /// Stop encoding and close the output file.
    async fn stop_recording(&mut self) -> Result<()>;

    /// Grab one RGB888 frame from the main stream.
    ///
    /// Returns `Ok(None)` when the backend has no software frame path.
    async fn capture_array(&mut self) -> Result<Option<Frame>>;

    /// Push controls to a running camera without reconfiguring.
    async fn set_controls(&mut self, controls: &ControlSet) -> Result<()>;

    /// Current control values as reported by the driver.
    async fn get_controls(&mut self) -> Result<ControlSet>;

    /// `(min, max, default)` for every control the sensor supports.
    fn camera_controls(&self) -> &ControlRanges;

    /// The configuration last applied, if any.
    fn camera_configuration(&self) -> Option<&StreamConfig>;

    fn is_started(&self) -> bool;
}

/// A value captured in a recording snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Missing,
    Int(i64),
    Float(f64),
    List(Vec<i64>),
    Text(String),
}

impl fmt::Display for SnapshotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotValue::Missing => f.write_str("N/A"),
            SnapshotValue::Int(v) => write!(f, "{v}"),
            SnapshotValue::Float(v) => write!(f, "{v:?}"),
            SnapshotValue::List(v) if v.len() == 2 => write!(f, "{} x {}", v[0], v[1]),
            SnapshotValue::List(v) => {
                let items: Vec<String> = v.iter().map(ToString::to_string).collect();
                write!(f, "({})", items.join(", "))
            }
            SnapshotValue::Text(v) => f.write_str(v),
        }
    }
}

/// Control values in effect when a recording started, in report order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSnapshot {
    pub entries: Vec<(&'static str, SnapshotValue)>,
}

impl RecordingSnapshot {
    /// Build the snapshot from the driver's controls and the video configuration.
    pub fn capture(controls: &ControlSet, config: Option<&StreamConfig>) -> Self {
        fn float(v: Option<f64>) -> SnapshotValue {
            v.map_or(SnapshotValue::Missing, SnapshotValue::Float)
        }
        let entries = vec![
            (
                "FrameDurationLimits",
                controls
                    .frame_duration_limits
                    .clone()
                    .map_or(SnapshotValue::Missing, SnapshotValue::List),
            ),
            ("ExposureTime", controls.exposure_time.map_or(SnapshotValue::Missing, SnapshotValue::Int)),
            ("AnalogueGain", float(controls.analogue_gain)),
            ("LensPosition", float(controls.lens_position)),
            ("Brightness", float(controls.brightness)),
            ("Saturation", float(controls.saturation)),
            ("Contrast", float(controls.contrast)),
            ("Sharpness", float(controls.sharpness)),
            (
                "Resolution",
                config.map_or(SnapshotValue::Missing, |c| {
                    SnapshotValue::List(vec![c.size.width as i64, c.size.height as i64])
                }),
            ),
            (
                "Format",
                config.map_or(SnapshotValue::Missing, |c| SnapshotValue::Text(c.format.to_string())),
            ),
        ];
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotValue> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_values_render_like_the_report() {
        assert_eq!(SnapshotValue::Missing.to_string(), "N/A");
        assert_eq!(SnapshotValue::List(vec![1920, 1080]).to_string(), "1920 x 1080");
        assert_eq!(SnapshotValue::List(vec![1, 2, 3]).to_string(), "(1, 2, 3)");
        assert_eq!(SnapshotValue::Float(1.0).to_string(), "1.0");
        assert_eq!(SnapshotValue::Int(10000).to_string(), "10000");
    }

    #[test]
    fn snapshot_captures_controls_and_stream() {
        let controls = ControlSet {
            exposure_time: Some(20000),
            analogue_gain: Some(2.0),
            ..Default::default()
        };
        let config = StreamConfig::video(Resolution::RECORDING_DEFAULT, ControlSet::default());
        let snapshot = RecordingSnapshot::capture(&controls, Some(&config));

        assert_eq!(snapshot.entries.len(), 10);
        assert_eq!(snapshot.entries[0].0, "FrameDurationLimits");
        assert_eq!(snapshot.get("ExposureTime"), Some(&SnapshotValue::Int(20000)));
        assert_eq!(snapshot.get("LensPosition"), Some(&SnapshotValue::Missing));
        assert_eq!(snapshot.get("Resolution").map(ToString::to_string), Some("1920 x 1080".into()));
        assert_eq!(snapshot.get("Format").map(ToString::to_string), Some("YUV420".into()));
    }
}
