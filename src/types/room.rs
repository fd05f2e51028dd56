//! Rooms, camera identifiers and per-room camera settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RigError;

/// One of the two observation rooms on the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Room {
    LightRoom,
    DarkRoom,
}

impl Room {
    pub const ALL: [Room; 2] = [Room::LightRoom, Room::DarkRoom];
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::LightRoom => f.write_str("LightRoom"),
            Room::DarkRoom => f.write_str("DarkRoom"),
        }
    }
}

impl FromStr for Room {
    type Err = RigError;

    /// Accepts the canonical names, case-insensitively, plus `light`/`dark`
    /// and the room numbers `1`/`2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lightroom" | "light" | "1" => Ok(Room::LightRoom),
            "darkroom" | "dark" | "2" => Ok(Room::DarkRoom),
            other => Err(RigError::camera_setup(format!("unknown room '{other}'"))),
        }
    }
}

/// Identifier of a camera in configuration files: its port number as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl CameraId {
    /// Key used for this camera in configuration JSON.
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CameraId {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(CameraId)
            .map_err(|_| RigError::UnknownCamera { camera: s.trim().to_string() })
    }
}

/// Preview rotation applied in software, in degrees clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees % 360 {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(format!("rotation must be a multiple of 90 degrees, got {other}")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// Static description of a room's camera, fixed at startup except `status`.
///
/// The hint fields are only ever echoed into the session report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Physical camera port.
    pub port: u32,
    pub status: Option<String>,
    pub focus: Option<String>,
    pub frame_rate: Option<String>,
    pub exposure: Option<String>,
    pub zoom: Option<String>,
}

impl CameraSettings {
    pub fn for_port(port: u32) -> Self {
        Self { port, ..Default::default() }
    }

    pub fn camera_id(&self) -> CameraId {
        CameraId(self.port)
    }
}
