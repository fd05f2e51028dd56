//! The assembled rig: cameras, configuration and lights built from settings.

use std::time::Duration;
use tracing::{info, warn};

use crate::camera::rpicam::RpicamTools;
use crate::camera::{CameraAdapter, CameraDevice, Encoder, RpicamCamera, SimulatedCamera};
use crate::config::{ConfigStore, LoadReport};
use crate::controls::{ControlRanges, ControlSet};
use crate::lighting::{LightingPanel, RoomLighting, SimulatedPin, SimulatedPwm, SysfsPin, SysfsPwm};
use crate::lighting::{DigitalPin, LightingLog, PwmChannel};
use crate::orchestrator::Orchestrator;
use crate::settings::{CameraBackend, LightingBackend, RigSettings};
use crate::types::{CameraId, Room};
use crate::{Result, RigError};

/// How long camera discovery may take before startup gives up.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the console drives, owned in one place.
pub struct Rig {
    pub orchestrator: Orchestrator,
    pub config: ConfigStore,
    pub lighting: LightingPanel,
    settings: RigSettings,
}

/// One camera's live controls and ranges, for the `diag` command.
#[derive(Debug, Clone)]
pub struct CameraDiagnostics {
    pub room: Room,
    pub camera: CameraId,
    pub backend: &'static str,
    pub controls: Option<ControlSet>,
    pub ranges: ControlRanges,
}

impl Rig {
    /// Assemble a rig from already-built parts.
    pub fn new(settings: RigSettings, cameras: Vec<CameraAdapter>, lighting: LightingPanel) -> Self {
        let orchestrator = Orchestrator::new(cameras).with_parameters(settings.recording.clone());
        let config = ConfigStore::new(&settings.config_file).with_scaler_crop(settings.scaler_crop);
        Self { orchestrator, config, lighting, settings }
    }

    /// Discover cameras, validate the room list against them and open the lights.
    pub async fn from_settings(settings: RigSettings) -> Result<Self> {
        let cameras = build_cameras(&settings).await?;
        let lighting = build_lighting(&settings)?;
        Ok(Self::new(settings, cameras, lighting))
    }

    pub fn settings(&self) -> &RigSettings {
        &self.settings
    }

    /// Light the rooms, start previews and load the default configuration.
    pub async fn start(&mut self) -> Option<LoadReport> {
        self.lighting.initialize();
        let started = self.orchestrator.preview_all().await;
        info!(started, total = self.orchestrator.cameras().len(), "previews started");
        self.config.auto_load(self.orchestrator.cameras_mut()).await
    }

    /// Stop previews and switch every light off.
    pub async fn shutdown(&mut self) {
        if self.orchestrator.state().is_any_running() {
            warn!("shutting down with a recording still marked running");
        }
        self.orchestrator.stop_previews().await;
        self.lighting.shutdown();
        info!("rig shut down");
    }

    /// Room of the camera with configuration ID `id`.
    pub fn room_of(&self, id: CameraId) -> Option<Room> {
        self.orchestrator.cameras().iter().find(|c| c.id() == id).map(CameraAdapter::room)
    }

    /// Read and log every camera's controls and control ranges.
    pub async fn diagnostics(&mut self) -> Vec<CameraDiagnostics> {
        let mut out = Vec::new();
        for camera in self.orchestrator.cameras_mut() {
            let controls = match camera.get_controls().await {
                Ok(controls) => Some(controls),
                Err(e) => {
                    warn!(room = %camera.room(), "could not read controls: {}", e);
                    None
                }
            };
            let ranges = camera.control_ranges().clone();
            info!(
                room = %camera.room(),
                camera = %camera.id(),
                backend = camera.backend(),
                ?controls,
                ranges = ranges.0.len(),
                "camera diagnostics"
            );
            out.push(CameraDiagnostics {
                room: camera.room(),
                camera: camera.id(),
                backend: camera.backend(),
                controls,
                ranges,
            });
        }
        out
    }
}

async fn build_cameras(settings: &RigSettings) -> Result<Vec<CameraAdapter>> {
    let encoder = Encoder { bitrate: settings.bitrate };
    let visible = match &settings.camera_backend {
        CameraBackend::Simulated { ports } => ports.clone(),
        CameraBackend::Rpicam { hello, .. } => tokio::time::timeout(DISCOVERY_TIMEOUT, RpicamCamera::list_cameras(hello))
            .await
            .map_err(|_| RigError::Timeout { duration: DISCOVERY_TIMEOUT })??,
    };
    settings.validate_ports(&visible)?;

    let cameras = settings
        .rooms
        .iter()
        .map(|room| {
            let device: Box<dyn CameraDevice> = match &settings.camera_backend {
                CameraBackend::Simulated { .. } => Box::new(SimulatedCamera::new(room.port)),
                CameraBackend::Rpicam { vid, hello } => Box::new(RpicamCamera::new(
                    room.port,
                    RpicamTools { vid: vid.clone(), hello: hello.clone() },
                )),
            };
            info!(room = %room.room, port = room.port, backend = device.backend(), "camera assigned");
            CameraAdapter::new(room.room, room.camera_settings(), room.rotation(), device).with_encoder(encoder)
        })
        .collect();
    Ok(cameras)
}

fn build_lighting(settings: &RigSettings) -> Result<LightingPanel> {
    let log = LightingLog::default();
    let rooms = settings
        .rooms
        .iter()
        .map(|room| {
            let (ir, white): (Box<dyn DigitalPin>, Box<dyn PwmChannel>) = match &settings.lighting_backend {
                LightingBackend::Simulated => (
                    Box::new(SimulatedPin::new(room.ir_pin(), log.clone())),
                    Box::new(SimulatedPwm::new(room.pwm_channel(), log.clone())),
                ),
                LightingBackend::Sysfs { root, gpio_base, pwm_chip, frequency_hz } => (
                    Box::new(SysfsPin::open(root, room.ir_pin(), *gpio_base)?),
                    Box::new(SysfsPwm::open(root, *pwm_chip, room.pwm_channel(), *frequency_hz)?),
                ),
            };
            Ok(RoomLighting::new(room.room, ir, white))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LightingPanel::new(rooms))
}
