//! Structural validation of camera configuration files.
//!
//! A configuration file maps camera IDs to control dictionaries:
//!
//! ```json
//! { "0": { "ExposureTime": 10000, "Resolution": [1920, 1080] }, "1": { ... } }
//! ```
//!
//! Validation runs to completion before anything is applied, so a rejected
//! file never changes camera state.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::controls::ControlSet;
use crate::error::LEGACY_CONTROL_KEYS;
use crate::{Result, RigError};

/// Parsed configuration: camera ID key to controls.
pub type ConfigMap = BTreeMap<String, ControlSet>;

/// Parse and validate configuration JSON text.
pub fn parse_config(text: &str) -> Result<ConfigMap> {
    let value: Value = serde_json::from_str(text)?;
    validate_config(&value)
}

/// Validate an already parsed JSON value.
pub fn validate_config(value: &Value) -> Result<ConfigMap> {
    let top = value
        .as_object()
        .ok_or_else(|| RigError::validation("top-level JSON value must be an object"))?;

    if !top.values().any(Value::is_object) {
        if top.keys().any(|k| LEGACY_CONTROL_KEYS.contains(&k.as_str())) {
            return Err(RigError::LegacyConfigFormat);
        }
        return Err(RigError::NotACameraMapping);
    }

    top.iter()
        .map(|(id, entry)| {
            let entry = entry.as_object().ok_or_else(|| {
                RigError::validation(format!("Camera ID '{id}' entry must be a dictionary of controls"))
            })?;
            Ok((id.clone(), ControlSet::from_json(id, entry)?))
        })
        .collect()
}

/// Serialize a configuration map in file form.
pub fn config_to_json(map: &ConfigMap) -> Value {
    Value::Object(map.iter().map(|(id, controls)| (id.clone(), controls.to_json())).collect())
}

/// Read a file as a JSON object, treating anything unreadable as empty.
pub(crate) fn read_object_lenient(path: &Path) -> Map<String, Value> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}

/// Write a JSON object with two-space indentation.
pub(crate) fn write_object(path: &Path, map: Map<String, Value>) -> Result<()> {
    let mut text = serde_json::to_string_pretty(&Value::Object(map))?;
    text.push('\n');
    std::fs::write(path, text).map_err(|e| RigError::file_error(path, e))
}
