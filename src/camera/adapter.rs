//! Per-room camera adapter

use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::{CameraDevice, Encoder, Frame, RecordingSnapshot, StreamConfig};
use crate::controls::{ControlRanges, ControlSet, Resolution};
use crate::types::{CameraId, CameraSettings, Room, Rotation};
use crate::{Result, RigError};

/// One room's camera: a driver handle plus the state the rig keeps about it.
///
/// The adapter is the only path to the device, and it is owned by exactly one
/// component at a time, so calls to a given camera are always serialized.
pub struct CameraAdapter {
    room: Room,
    settings: CameraSettings,
    rotation: Rotation,
    device: Box<dyn CameraDevice>,
    /// Stream size chosen by a resolution change; used for preview and recording.
    requested_size: Option<Resolution>,
    /// Controls last pushed to the device, replayed on every reconfiguration.
    active_controls: ControlSet,
    encoder: Encoder,
    recording: bool,
    frames: watch::Sender<Option<Arc<Frame>>>,
}

impl CameraAdapter {
    pub fn new(
        room: Room,
        settings: CameraSettings,
        rotation: Rotation,
        device: Box<dyn CameraDevice>,
    ) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            room,
            settings,
            rotation,
            device,
            requested_size: None,
            active_controls: ControlSet::default(),
            encoder: Encoder::default(),
            recording: false,
            frames,
        }
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn room(&self) -> Room {
        self.room
    }

    pub fn id(&self) -> CameraId {
        self.settings.camera_id()
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.settings.status = Some(status.into());
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_streaming(&self) -> bool {
        self.device.is_started()
    }

    pub fn requested_size(&self) -> Option<Resolution> {
        self.requested_size
    }

    /// Size of the active stream, if the camera has been configured.
    pub fn current_size(&self) -> Option<Resolution> {
        self.device.camera_configuration().map(|c| c.size)
    }

    pub fn control_ranges(&self) -> &ControlRanges {
        self.device.camera_controls()
    }

    pub fn backend(&self) -> &'static str {
        self.device.backend()
    }

    /// Receiver for rotated preview frames.
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.frames.subscribe()
    }

    /// Configure and start the preview stream.
    ///
    /// Uses the requested size if a resolution change set one, else 640x360,
    /// and replays the controls last pushed to the camera.
    pub async fn initialize_preview(&mut self) -> Result<()> {
        if self.device.is_started() {
            if let Err(e) = self.device.stop().await {
                debug!(room = %self.room, "stop before preview failed: {}", e);
            }
        }
        let size = self.requested_size.unwrap_or(Resolution::PREVIEW_DEFAULT);
        let config = StreamConfig::preview(size, self.active_controls.without_resolution());
        self.device.configure(config).await?;
        self.device.start().await?;
        self.set_status("previewing");
        debug!(room = %self.room, camera = %self.id(), %size, "preview started");
        Ok(())
    }

    /// Stop the preview stream. Best-effort.
    pub async fn stop_preview(&mut self) {
        if !self.device.is_started() {
            return;
        }
        match self.device.stop().await {
            Ok(()) => {
                self.set_status("idle");
                debug!(room = %self.room, "preview stopped");
            }
            Err(e) => warn!(room = %self.room, "failed to stop preview: {}", e),
        }
    }

    /// Capture one frame, rotate it and publish it to subscribers.
    ///
    /// Returns whether a frame was published.
    pub async fn preview_tick(&mut self) -> Result<bool> {
        if self.recording || !self.device.is_started() {
            return Ok(false);
        }
        let Some(frame) = self.device.capture_array().await? else {
            return Ok(false);
        };
        let frame = frame.rotate(self.rotation);
        trace!(room = %self.room, width = frame.width(), height = frame.height(), "preview frame");
        self.frames.send_replace(Some(Arc::new(frame)));
        Ok(true)
    }

    /// Start recording to `path`.
    ///
    /// Stops any preview, configures a video stream at the requested size
    /// (else 1920x1080), snapshots the resulting controls and starts H.264
    /// encoding. An error means this camera never started.
    pub async fn start_recording(&mut self, path: &Path) -> Result<RecordingSnapshot> {
        if let Err(e) = self.device.stop().await {
            debug!(room = %self.room, "stop before recording failed: {}", e);
        }

        let size = self.requested_size.unwrap_or(Resolution::RECORDING_DEFAULT);
        let config = StreamConfig::video(size, self.active_controls.without_resolution());
        self.device.configure(config).await.inspect_err(|e| {
            error!(room = %self.room, "failed to configure video stream: {}", e);
        })?;

        let controls = match self.device.get_controls().await {
            Ok(controls) => controls,
            Err(e) => {
                warn!(room = %self.room, "could not read controls for snapshot: {}", e);
                ControlSet::default()
            }
        };
        let snapshot = RecordingSnapshot::capture(&controls, self.device.camera_configuration());

        self.device.start_recording(self.encoder, path).await.inspect_err(|e| {
            error!(room = %self.room, path = %path.display(), "failed to start recording: {}", e);
        })?;
        self.recording = true;
        self.set_status("recording");
        info!(room = %self.room, camera = %self.id(), path = %path.display(), %size, "recording started");
        Ok(snapshot)
    }

    /// Stop encoding and the stream. Best-effort: failures are logged.
    ///
    /// Returns `true` when every step succeeded.
    pub async fn stop_recording(&mut self) -> bool {
        let mut clean = true;
        if let Err(e) = self.device.stop_recording().await {
            warn!(room = %self.room, "error stopping recording: {}", e);
            clean = false;
        }
        if let Err(e) = self.device.stop().await {
            warn!(room = %self.room, "error stopping camera: {}", e);
            clean = false;
        }
        self.recording = false;
        self.set_status("idle");
        info!(room = %self.room, camera = %self.id(), "recording stopped");
        clean
    }

    /// Push controls to the running camera without interrupting the stream.
    pub async fn set_controls(&mut self, controls: &ControlSet) -> Result<()> {
        let controls = controls.without_resolution();
        self.device.set_controls(&controls).await?;
        self.active_controls.merge(&controls);
        trace!(room = %self.room, ?controls, "controls pushed");
        Ok(())
    }

    /// Stop, configure at `size` with `controls` merged in, and restart.
    pub async fn reconfigure(&mut self, size: Resolution, controls: &ControlSet) -> Result<()> {
        if self.recording {
            return Err(RigError::SessionActive);
        }
        self.active_controls.merge(&controls.without_resolution());
        self.requested_size = Some(size);
        if let Err(e) = self.device.stop().await {
            debug!(room = %self.room, "stop before reconfigure failed: {}", e);
        }
        let config = StreamConfig::preview(size, self.active_controls.without_resolution());
        self.device.configure(config).await?;
        self.device.start().await?;
        info!(room = %self.room, camera = %self.id(), %size, "camera reconfigured");
        Ok(())
    }

    /// Live control values from the driver.
    pub async fn get_controls(&mut self) -> Result<ControlSet> {
        self.device.get_controls().await
    }
}
