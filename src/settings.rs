//! Rig settings loaded from `rig.yaml`.
//!
//! Everything has a default, so a missing file describes the standard two-room
//! bench rig on the simulated backends:
//!
//! ```yaml
//! rooms:
//!   - room: LightRoom
//!     port: 0
//!   - room: DarkRoom
//!     port: 1
//!     rotation: 180
//! camera_backend:
//!   kind: rpicam
//! lighting_backend:
//!   kind: sysfs
//!   gpio_base: 512
//! recording:
//!   save_dir: /home/pi/videos
//!   stop_method: { kind: timer, minutes: 10 }
//!   delay_secs: 5
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::DEFAULT_CONFIG_FILENAME;
use crate::controls::DEFAULT_SCALER_CROP;
use crate::session::RecordingParameters;
use crate::types::{CameraSettings, Room, Rotation};
use crate::{Result, RigError};

/// Settings file read from the working directory.
pub const DEFAULT_SETTINGS_FILENAME: &str = "rig.yaml";
/// Environment variable overriding the settings path.
pub const SETTINGS_ENV: &str = "DUOCAM_SETTINGS";

/// One room's camera and lights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub room: Room,
    /// Physical camera port; also the camera's ID in configuration files.
    pub port: u32,
    #[serde(default)]
    pub rotation: Option<Rotation>,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<String>,
    #[serde(default)]
    pub exposure: Option<String>,
    #[serde(default)]
    pub zoom: Option<String>,
    /// GPIO line of the IR relay (BCM numbering).
    #[serde(default)]
    pub ir_pin: Option<u32>,
    /// Hardware PWM channel of the white lights.
    #[serde(default)]
    pub pwm_channel: Option<u32>,
}

impl RoomSettings {
    pub fn new(room: Room, port: u32) -> Self {
        Self {
            room,
            port,
            rotation: None,
            focus: None,
            frame_rate: None,
            exposure: None,
            zoom: None,
            ir_pin: None,
            pwm_channel: None,
        }
    }

    /// DarkRoom cameras are mounted upside down.
    pub fn rotation(&self) -> Rotation {
        self.rotation.unwrap_or(match self.room {
            Room::LightRoom => Rotation::None,
            Room::DarkRoom => Rotation::Cw180,
        })
    }

    pub fn ir_pin(&self) -> u32 {
        self.ir_pin.unwrap_or(match self.room {
            Room::LightRoom => 17,
            Room::DarkRoom => 27,
        })
    }

    /// LightRoom white lights are on GPIO18 (PWM channel 2), DarkRoom on channel 0.
    pub fn pwm_channel(&self) -> u32 {
        self.pwm_channel.unwrap_or(match self.room {
            Room::LightRoom => 2,
            Room::DarkRoom => 0,
        })
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            port: self.port,
            status: None,
            focus: self.focus.clone(),
            frame_rate: self.frame_rate.clone(),
            exposure: self.exposure.clone(),
            zoom: self.zoom.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CameraBackend {
    /// In-memory cameras; `ports` lists the cameras that "exist".
    Simulated {
        #[serde(default = "default_simulated_ports")]
        ports: Vec<u32>,
    },
    Rpicam {
        #[serde(default = "default_vid")]
        vid: PathBuf,
        #[serde(default = "default_hello")]
        hello: PathBuf,
    },
}

impl Default for CameraBackend {
    fn default() -> Self {
        CameraBackend::Simulated { ports: default_simulated_ports() }
    }
}

fn default_simulated_ports() -> Vec<u32> {
    vec![0, 1]
}

fn default_vid() -> PathBuf {
    PathBuf::from("rpicam-vid")
}

fn default_hello() -> PathBuf {
    PathBuf::from("rpicam-hello")
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LightingBackend {
    #[default]
    Simulated,
    Sysfs {
        #[serde(default = "default_sysfs_root")]
        root: PathBuf,
        /// sysfs number of the header's first GPIO line.
        #[serde(default)]
        gpio_base: u32,
        #[serde(default)]
        pwm_chip: u32,
        #[serde(default = "default_pwm_frequency")]
        frequency_hz: u32,
    },
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class")
}

fn default_pwm_frequency() -> u32 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigSettings {
    pub rooms: Vec<RoomSettings>,
    pub camera_backend: CameraBackend,
    pub lighting_backend: LightingBackend,
    /// Camera-control configuration loaded at startup and used by `save`.
    pub config_file: PathBuf,
    pub scaler_crop: [i64; 4],
    pub recording: RecordingParameters,
    /// H.264 bitrate in bits per second; unset leaves it to the encoder.
    pub bitrate: Option<u32>,
    pub preview_interval_ms: u64,
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            rooms: vec![RoomSettings::new(Room::LightRoom, 0), RoomSettings::new(Room::DarkRoom, 1)],
            camera_backend: CameraBackend::default(),
            lighting_backend: LightingBackend::default(),
            config_file: PathBuf::from(DEFAULT_CONFIG_FILENAME),
            scaler_crop: DEFAULT_SCALER_CROP,
            recording: RecordingParameters::default(),
            bitrate: None,
            preview_interval_ms: 100,
        }
    }
}

impl RigSettings {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RigError::file_error(path, e))?;
        let settings = Self::from_yaml(&text)?;
        info!(path = %path.display(), rooms = settings.rooms.len(), "rig settings loaded");
        Ok(settings)
    }

    /// Settings from `$DUOCAM_SETTINGS`, else `rig.yaml` if present, else defaults.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Self::from_file(PathBuf::from(path));
        }
        let path = Path::new(DEFAULT_SETTINGS_FILENAME);
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!("no {} found, using defaults", DEFAULT_SETTINGS_FILENAME);
            Ok(Self::default())
        }
    }

    /// Check the room list against the ports the camera backend can see.
    pub fn validate_ports(&self, visible: &[u32]) -> Result<()> {
        if self.rooms.is_empty() {
            return Err(RigError::camera_setup("at least one room must be configured"));
        }
        let mut ports = HashSet::new();
        let mut rooms = HashSet::new();
        for room in &self.rooms {
            if !rooms.insert(room.room) {
                return Err(RigError::camera_setup(format!("{} is configured twice", room.room)));
            }
            if !ports.insert(room.port) {
                return Err(RigError::camera_setup(format!("camera port {} is assigned twice", room.port)));
            }
            if !visible.contains(&room.port) {
                return Err(RigError::camera_setup(format!(
                    "camera port {} for {} is not available (found {:?})",
                    room.port, room.room, visible
                )));
            }
        }
        Ok(())
    }
}
