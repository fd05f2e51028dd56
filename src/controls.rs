//! Typed camera control records.
//!
//! [`ControlSet`] is the in-memory form of one camera's entry in a
//! configuration file. Every recognised control is an optional field so a
//! missing hardware feature is simply `None`; keys the rig does not know
//! about are carried along untouched in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Result, RigError};

/// Frame duration used when a frame rate of zero is requested.
pub const DEFAULT_FRAME_DURATION_US: i64 = 33_333;
/// Frame rate reported for a zero frame duration.
pub const DEFAULT_FPS: u32 = 30;
/// Frame rate range used when the driver does not report `FrameDurationLimits`.
pub const FALLBACK_FPS_RANGE: FpsRange = FpsRange { min: 1, max: 60, default: 30 };

/// Sensor window injected into every saved configuration unless overridden.
pub const DEFAULT_SCALER_CROP: [i64; 4] = [0, 0, 3072, 1728];

/// Stream size in pixels, serialized as `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const PREVIEW_DEFAULT: Resolution = Resolution::new(640, 360);
    pub const RECORDING_DEFAULT: Resolution = Resolution::new(1920, 1080);

    /// Sizes offered by the resolution picker.
    pub const PRESETS: [Resolution; 4] = [
        Resolution::new(640, 480),
        Resolution::new(1280, 720),
        Resolution::new(1920, 1080),
        Resolution::new(2592, 1944),
    ];

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<[u32; 2]> for Resolution {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for [u32; 2] {
    fn from(r: Resolution) -> Self {
        [r.width, r.height]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Resolution {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once(['x', 'X', ','])
            .ok_or_else(|| RigError::validation(format!("resolution '{s}' must look like 1920x1080")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| RigError::validation(format!("resolution '{s}' must look like 1920x1080")))
        };
        Ok(Resolution::new(parse(w)?, parse(h)?))
    }
}

/// One camera's control values in configuration-file form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_duration_limits: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analogue_gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaler_crop: Option<[i64; 4]>,
    /// Unrecognised keys, preserved as loaded.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ControlSet {
    /// Parse one camera's entry, coercing numeric strings the way the
    /// configuration files have always allowed.
    pub fn from_json(camera: &str, entry: &Map<String, Value>) -> Result<Self> {
        let mut set = ControlSet::default();
        for (key, value) in entry {
            match key.as_str() {
                "FrameDurationLimits" => {
                    let items = value.as_array().filter(|a| !a.is_empty()).ok_or_else(|| {
                        RigError::validation(format!(
                            "FrameDurationLimits for camera {camera} must be a non-empty list"
                        ))
                    })?;
                    let limits = items
                        .iter()
                        .map(|v| coerce_f64(v).map(|f| f.round() as i64))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| {
                            RigError::validation(format!(
                                "FrameDurationLimits for camera {camera} must contain numbers"
                            ))
                        })?;
                    set.frame_duration_limits = Some(limits);
                }
                "ExposureTime" => {
                    set.exposure_time = Some(number(camera, key, value)?.round() as i64);
                }
                "LensPosition" => set.lens_position = Some(number(camera, key, value)?),
                "AnalogueGain" => set.analogue_gain = Some(number(camera, key, value)?),
                "Brightness" => set.brightness = Some(number(camera, key, value)?),
                "Saturation" => set.saturation = Some(number(camera, key, value)?),
                "Contrast" => set.contrast = Some(number(camera, key, value)?),
                "Sharpness" => set.sharpness = Some(number(camera, key, value)?),
                "Resolution" => {
                    let [w, h] = int_array::<2>(value).ok_or_else(|| {
                        RigError::validation(format!(
                            "Resolution for camera {camera} must be [width, height]"
                        ))
                    })?;
                    if w <= 0 || h <= 0 || w > u32::MAX as i64 || h > u32::MAX as i64 {
                        return Err(RigError::validation(format!(
                            "Resolution for camera {camera} must be positive"
                        )));
                    }
                    set.resolution = Some(Resolution::new(w as u32, h as u32));
                }
                "ScalerCrop" => {
                    let crop = int_array::<4>(value).ok_or_else(|| {
                        RigError::validation(format!(
                            "ScalerCrop for camera {camera} must be [x, y, width, height]"
                        ))
                    })?;
                    set.scaler_crop = Some(crop);
                }
                _ => {
                    set.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(set)
    }

    /// Set a single control from console input.
    ///
    /// `FrameRate` is accepted as a convenience and stored as
    /// `FrameDurationLimits`.
    pub fn set_named(&mut self, name: &str, value: &str) -> Result<()> {
        let bad = || RigError::validation(format!("invalid value '{value}' for {name}"));
        let float = || value.trim().parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(bad);
        match name {
            "FrameRate" => {
                let fps = float()?;
                if fps <= 0.0 {
                    return Err(bad());
                }
                let fd = fps_to_frame_duration(fps);
                self.frame_duration_limits = Some(vec![fd, fd]);
            }
            "FrameDurationLimits" => {
                let limits = value
                    .split(',')
                    .map(|v| v.trim().parse::<i64>().map_err(|_| bad()))
                    .collect::<Result<Vec<_>>>()?;
                self.frame_duration_limits = Some(limits);
            }
            "ExposureTime" => self.exposure_time = Some(float()?.round() as i64),
            "LensPosition" => self.lens_position = Some(float()?),
            "AnalogueGain" => {
                self.analogue_gain = if value.eq_ignore_ascii_case("off") { None } else { Some(float()?) }
            }
            "Brightness" => self.brightness = Some(float()?),
            "Saturation" => self.saturation = Some(float()?),
            "Contrast" => self.contrast = Some(float()?),
            "Sharpness" => self.sharpness = Some(float()?),
            "Resolution" => self.resolution = Some(value.parse()?),
            other => {
                return Err(RigError::validation(format!("unknown control '{other}'")));
            }
        }
        Ok(())
    }

    /// Overlay every control present in `other`.
    pub fn merge(&mut self, other: &ControlSet) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field.clone(); })*
            };
        }
        overlay!(
            frame_duration_limits,
            exposure_time,
            lens_position,
            analogue_gain,
            brightness,
            saturation,
            contrast,
            sharpness,
            resolution,
            scaler_crop
        );
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Fill only the controls that are missing here.
    pub fn fill_missing(&mut self, fallback: &ControlSet) {
        let mut merged = fallback.clone();
        merged.merge(self);
        *self = merged;
    }

    /// The controls a driver accepts at runtime: everything but the stream size.
    pub fn without_resolution(&self) -> ControlSet {
        ControlSet { resolution: None, ..self.clone() }
    }

    pub fn is_empty(&self) -> bool {
        *self == ControlSet::default()
    }

    /// Frame rate implied by the first frame duration limit.
    pub fn frame_rate(&self) -> Option<u32> {
        self.frame_duration_limits.as_ref().and_then(|l| l.first()).map(|&fd| frame_duration_to_fps(fd))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }
}

fn number(camera: &str, key: &str, value: &Value) -> Result<f64> {
    coerce_f64(value)
        .ok_or_else(|| RigError::validation(format!("{key} for camera {camera} must be numeric")))
}

/// Numbers, and strings that parse as numbers.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn int_array<const N: usize>(value: &Value) -> Option<[i64; N]> {
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0i64; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = coerce_f64(item)?.round() as i64;
    }
    Some(out)
}

/// Frame duration in microseconds for a frame rate.
pub fn fps_to_frame_duration(fps: f64) -> i64 {
    if fps > 0.0 { (1_000_000.0 / fps) as i64 } else { DEFAULT_FRAME_DURATION_US }
}

/// Whole frames per second for a frame duration in microseconds.
pub fn frame_duration_to_fps(frame_duration_us: i64) -> u32 {
    if frame_duration_us > 0 { (1_000_000 / frame_duration_us) as u32 } else { DEFAULT_FPS }
}

/// `(min, max, default)` of one control as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlRange {
    pub min: f64,
    pub max: f64,
    pub default: Option<f64>,
}

impl ControlRange {
    pub const fn new(min: f64, max: f64, default: Option<f64>) -> Self {
        Self { min, max, default }
    }
}

/// Control ranges keyed by control name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRanges(pub BTreeMap<String, ControlRange>);

/// Frame rate limits derived from `FrameDurationLimits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl ControlRanges {
    pub fn get(&self, name: &str) -> Option<&ControlRange> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, range: ControlRange) {
        self.0.insert(name.into(), range);
    }

    /// Frame rate bounds: the longest frame duration gives the lowest rate.
    pub fn fps_range(&self) -> FpsRange {
        let Some(fd) = self.get("FrameDurationLimits") else {
            return FALLBACK_FPS_RANGE;
        };
        let (min_fd, max_fd) = (fd.min as i64, fd.max as i64);
        if min_fd <= 0 || max_fd <= 0 {
            return FALLBACK_FPS_RANGE;
        }
        let default_fd = fd.default.map(|d| d as i64).filter(|d| *d > 0).unwrap_or(max_fd);
        FpsRange {
            min: (1_000_000 / max_fd).max(1) as u32,
            max: (1_000_000 / min_fd).max(1) as u32,
            default: (1_000_000 / default_fd).max(1) as u32,
        }
    }
}
