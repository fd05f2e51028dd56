//! In-process camera backend.
//!
//! Behaves like a real driver where it matters to the rig: `configure`
//! refuses a running camera, recordings create their output file, and
//! controls persist across reconfiguration. Every call is logged and any
//! operation can be made to fail through a [`SimulatedCameraHandle`].

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

use super::{CameraDevice, Encoder, Frame, StreamConfig, StreamPurpose};
use crate::controls::{ControlRange, ControlRanges, ControlSet, Resolution};
use crate::{Result, RigError};

/// H.264 Annex B access unit delimiter, written so output files are non-empty.
const ANNEX_B_AUD: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xf0];

/// One driver call, as seen by the simulated camera.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    Configure { purpose: StreamPurpose, size: Resolution },
    Start,
    Stop,
    StartRecording { path: PathBuf },
    StopRecording,
    CaptureArray,
    SetControls(ControlSet),
    GetControls,
}

impl CameraCall {
    fn operation(&self) -> &'static str {
        match self {
            CameraCall::Configure { .. } => "configure",
            CameraCall::Start => "start",
            CameraCall::Stop => "stop",
            CameraCall::StartRecording { .. } => "start_recording",
            CameraCall::StopRecording => "stop_recording",
            CameraCall::CaptureArray => "capture_array",
            CameraCall::SetControls(_) => "set_controls",
            CameraCall::GetControls => "get_controls",
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<CameraCall>,
    /// Remaining injected failures per operation; `usize::MAX` fails forever.
    failures: HashMap<&'static str, usize>,
}

/// Shared view into a [`SimulatedCamera`] for inspection and fault injection.
#[derive(Debug, Clone)]
pub struct SimulatedCameraHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCameraHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<CameraCall> {
        self.lock().calls.clone()
    }

    /// Number of calls made for one operation name.
    pub fn count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.operation() == operation).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next `times` calls of `operation` fail.
    pub fn fail(&self, operation: &'static str, times: usize) {
        self.lock().failures.insert(operation, times);
    }

    /// Make every call of `operation` fail until [`Self::heal`].
    pub fn fail_always(&self, operation: &'static str) {
        self.fail(operation, usize::MAX);
    }

    pub fn heal(&self) {
        self.lock().failures.clear();
    }
}

/// A camera that lives entirely in memory.
pub struct SimulatedCamera {
    port: u32,
    state: Arc<Mutex<SimState>>,
    ranges: ControlRanges,
    config: Option<StreamConfig>,
    controls: ControlSet,
    started: bool,
    recording: Option<PathBuf>,
}

impl SimulatedCamera {
    pub fn new(port: u32) -> Self {
        Self {
            port,
            state: Arc::default(),
            ranges: Self::sensor_ranges(),
            config: None,
            controls: Self::sensor_defaults(),
            started: false,
            recording: None,
        }
    }

    /// Start from an already configured stream, like a camera left running.
    pub fn with_configuration(mut self, size: Resolution) -> Self {
        self.config = Some(StreamConfig::preview(size, ControlSet::default()));
        self
    }

    pub fn handle(&self) -> SimulatedCameraHandle {
        SimulatedCameraHandle { state: Arc::clone(&self.state) }
    }

    pub fn recording_path(&self) -> Option<&Path> {
        self.recording.as_deref()
    }

    fn sensor_ranges() -> ControlRanges {
        let mut ranges = ControlRanges::default();
        ranges.insert("FrameDurationLimits", ControlRange::new(16_666.0, 1_000_000.0, Some(33_333.0)));
        ranges.insert("ExposureTime", ControlRange::new(100.0, 1_000_000.0, Some(10_000.0)));
        ranges.insert("AnalogueGain", ControlRange::new(1.0, 16.0, Some(1.0)));
        ranges.insert("LensPosition", ControlRange::new(0.0, 15.0, Some(1.0)));
        ranges.insert("Brightness", ControlRange::new(-1.0, 1.0, Some(0.0)));
        ranges.insert("Saturation", ControlRange::new(0.0, 32.0, Some(1.0)));
        ranges.insert("Contrast", ControlRange::new(0.0, 32.0, Some(1.0)));
        ranges.insert("Sharpness", ControlRange::new(0.0, 16.0, Some(1.0)));
        ranges
    }

    fn sensor_defaults() -> ControlSet {
        ControlSet {
            frame_duration_limits: Some(vec![33_333, 33_333]),
            exposure_time: Some(10_000),
            analogue_gain: Some(1.0),
            lens_position: Some(1.0),
            brightness: Some(0.0),
            saturation: Some(1.0),
            contrast: Some(1.0),
            sharpness: Some(1.0),
            ..Default::default()
        }
    }

    /// Log the call, then consume an injected failure if one is armed.
    fn record(&self, call: CameraCall) -> Result<()> {
        let operation = call.operation();
        trace!(port = self.port, ?call, "simulated camera call");
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(call);
        if let Some(remaining) = state.failures.get_mut(operation) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(RigError::hardware(self.port.to_string(), operation, "injected failure"));
            }
        }
        Ok(())
    }

    fn fail(&self, operation: &'static str, reason: &str) -> RigError {
        RigError::hardware(self.port.to_string(), operation, reason.to_string())
    }
}

#[async_trait::async_trait]
impl CameraDevice for SimulatedCamera {
    fn backend(&self) -> &'static str {
        "simulated"
    }

    async fn configure(&mut self, config: StreamConfig) -> Result<()> {
        self.record(CameraCall::Configure { purpose: config.purpose, size: config.size })?;
        if self.started {
            return Err(self.fail("configure", "camera must be stopped before configuring"));
        }
        self.controls.merge(&config.controls.without_resolution());
        self.config = Some(config);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.record(CameraCall::Start)?;
        if self.config.is_none() {
            return Err(self.fail("start", "camera has not been configured"));
        }
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.record(CameraCall::Stop)?;
        self.started = false;
        Ok(())
    }

    async fn start_recording(&mut self, encoder: Encoder, path: &Path) -> Result<()> {
        self.record(CameraCall::StartRecording { path: path.to_path_buf() })?;
        if self.config.is_none() {
            return Err(self.fail("start_recording", "camera has not been configured"));
        }
        let mut file = std::fs::File::create(path).map_err(|e| RigError::file_error(path, e))?;
        file.write_all(&ANNEX_B_AUD).map_err(|e| RigError::file_error(path, e))?;
        debug!(port = self.port, path = %path.display(), bitrate = ?encoder.bitrate, "simulated recording started");
        self.recording = Some(path.to_path_buf());
        self.started = true;
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<()> {
        self.record(CameraCall::StopRecording)?;
        if let Some(path) = self.recording.take() {
            debug!(port = self.port, path = %path.display(), "simulated recording stopped");
        }
        Ok(())
    }

    async fn capture_array(&mut self) -> Result<Option<Frame>> {
        self.record(CameraCall::CaptureArray)?;
        let Some(config) = self.config.as_ref().filter(|_| self.started) else {
            return Err(self.fail("capture_array", "camera is not streaming"));
        };
        let shade = (self.port.wrapping_mul(80) % 256) as u8;
        Ok(Some(Frame::solid(config.size.width, config.size.height, [shade, 128, 255 - shade])))
    }

    async fn set_controls(&mut self, controls: &ControlSet) -> Result<()> {
        self.record(CameraCall::SetControls(controls.clone()))?;
        self.controls.merge(&controls.without_resolution());
        Ok(())
    }

    async fn get_controls(&mut self) -> Result<ControlSet> {
        self.record(CameraCall::GetControls)?;
        Ok(self.controls.clone())
    }

    fn camera_controls(&self) -> &ControlRanges {
        &self.ranges
    }

    fn camera_configuration(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configure_requires_a_stopped_camera() {
        let mut cam = SimulatedCamera::new(0);
        let preview = StreamConfig::preview(Resolution::PREVIEW_DEFAULT, ControlSet::default());
        cam.configure(preview.clone()).await.unwrap();
        cam.start().await.unwrap();
        assert!(cam.configure(preview.clone()).await.is_err());
        cam.stop().await.unwrap();
        assert!(cam.configure(preview).await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let mut cam = SimulatedCamera::new(1);
        let handle = cam.handle();
        handle.fail("stop", 1);
        assert!(matches!(cam.stop().await, Err(RigError::Hardware { operation: "stop", .. })));
        assert!(cam.stop().await.is_ok());
        assert_eq!(handle.count("stop"), 2);
    }

    #[tokio::test]
    async fn recording_writes_the_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.h264");
        let mut cam = SimulatedCamera::new(0);
        cam.configure(StreamConfig::video(Resolution::RECORDING_DEFAULT, ControlSet::default()))
            .await
            .unwrap();
        cam.start_recording(Encoder::default(), &path).await.unwrap();
        assert_eq!(cam.recording_path(), Some(path.as_path()));
        cam.stop_recording().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), ANNEX_B_AUD);
    }

    #[tokio::test]
    async fn controls_persist_through_reconfiguration() {
        let mut cam = SimulatedCamera::new(0);
        cam.set_controls(&ControlSet { exposure_time: Some(500), ..Default::default() }).await.unwrap();
        cam.configure(StreamConfig::preview(Resolution::PREVIEW_DEFAULT, ControlSet::default()))
            .await
            .unwrap();
        assert_eq!(cam.get_controls().await.unwrap().exposure_time, Some(500));
    }

    #[tokio::test]
    async fn capture_matches_the_stream_size() {
        let mut cam = SimulatedCamera::new(0);
        assert!(cam.capture_array().await.is_err());
        cam.configure(StreamConfig::preview(Resolution::new(4, 2), ControlSet::default())).await.unwrap();
        cam.start().await.unwrap();
        let frame = cam.capture_array().await.unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 2));
    }
}
