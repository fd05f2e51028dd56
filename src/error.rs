//! Error types for the recording rig.
//!
//! Every fallible operation in the crate returns [`RigError`] through the
//! crate-wide [`Result`] alias. Errors carry enough structured context
//! (camera, room, path) for the console to report them, and classify
//! themselves for the operator:
//!
//! - **Hardware Errors**: a camera driver call failed
//! - **File Errors**: reading or writing configuration, reports or settings
//! - **Validation Errors**: a configuration file was rejected before any of it applied
//! - **Session Errors**: a recording could not be started
//!
//! ## Recovery
//!
//! ```rust
//! use duocam::RigError;
//!
//! let error = RigError::hardware("0", "start", "device busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::Room;

/// Result type alias for rig operations.
pub type Result<T, E = RigError> = std::result::Result<T, E>;

/// Control keys whose presence at the top level marks a pre-mapping config file.
pub const LEGACY_CONTROL_KEYS: &[&str] = &[
    "FrameDurationLimits",
    "ExposureTime",
    "LensPosition",
    "AnalogueGain",
    "Brightness",
    "Resolution",
];

/// Main error type for rig operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RigError {
    #[error("Camera {camera} failed during {operation}")]
    Hardware {
        camera: String,
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rig settings: {0}")]
    Settings(#[from] serde_yaml_ng::Error),

    #[error("Invalid configuration: {reason}")]
    ConfigValidation { reason: String },

    #[error(
        "Legacy single-camera configuration format is not supported; \
         wrap the controls in an object keyed by camera ID, e.g. {{\"0\": {{...}}}}"
    )]
    LegacyConfigFormat,

    #[error("Configuration must map camera IDs to control dictionaries")]
    NotACameraMapping,

    #[error("Unknown camera: {camera}")]
    UnknownCamera { camera: String },

    #[error("Recording failed to start on {room}: {reason}")]
    RecordingStart { room: Room, reason: String },

    #[error("No save location selected")]
    NoSaveDirectory,

    #[error("A recording session is already active")]
    SessionActive,

    #[error("Camera setup invalid: {reason}")]
    CameraSetup { reason: String },

    #[error("Lighting error on {device}")]
    Lighting {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl RigError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RigError::Hardware { .. } => true,
            RigError::RecordingStart { .. } => true,
            RigError::Timeout { .. } => true,
            RigError::Lighting { .. } => true,
            RigError::File { .. } => false,
            RigError::Json(_) => false,
            RigError::Settings(_) => false,
            RigError::ConfigValidation { .. } => false,
            RigError::LegacyConfigFormat => false,
            RigError::NotACameraMapping => false,
            RigError::UnknownCamera { .. } => false,
            RigError::NoSaveDirectory => false,
            RigError::SessionActive => false,
            RigError::CameraSetup { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RigError::Hardware { .. } => vec![
                "Check the camera ribbon cable is seated",
                "Make sure no other process holds the camera",
                "Retry the operation",
            ],
            RigError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check directory permissions",
                "Ensure sufficient disk space",
            ],
            RigError::Json(_) => {
                vec!["Check the file is valid JSON", "Compare against a saved configuration"]
            }
            RigError::Settings(_) => {
                vec!["Check rig.yaml indentation and keys", "Delete rig.yaml to fall back to defaults"]
            }
            RigError::ConfigValidation { .. } => vec![
                "Check control values are numbers",
                "Resolution must be [width, height]",
                "FrameDurationLimits must be a non-empty list",
            ],
            RigError::LegacyConfigFormat => vec![
                "Wrap the controls in an object keyed by camera ID",
                "Re-save the configuration from the console",
            ],
            RigError::NotACameraMapping => {
                vec!["Use an object of camera ID to controls", "Re-save the configuration from the console"]
            }
            RigError::UnknownCamera { .. } => {
                vec!["Use a camera port listed by the status command", "Check rig.yaml room ports"]
            }
            RigError::RecordingStart { .. } => vec![
                "Check the save directory is writable",
                "Check both cameras preview correctly",
                "Retry the recording",
            ],
            RigError::NoSaveDirectory => vec!["Select a save location with the dir command"],
            RigError::SessionActive => vec!["Stop the current recording first"],
            RigError::CameraSetup { .. } => vec![
                "List visible cameras with rpicam-hello --list-cameras",
                "Fix the room ports in rig.yaml",
                "Configure at least one room",
            ],
            RigError::Lighting { .. } => vec![
                "Check the GPIO pin is exported",
                "Check PWM overlay is enabled in config.txt",
                "Run with permission to write /sys/class",
            ],
            RigError::Timeout { .. } => vec!["Check that rpicam-hello --list-cameras responds", "Check system load"],
        }
    }

    /// Helper constructor for camera driver failures.
    pub fn hardware(
        camera: impl Into<String>,
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RigError::Hardware { camera: camera.into(), operation, source: source.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RigError::File { path: path.into(), source }
    }

    /// Helper constructor for configuration validation errors.
    pub fn validation(reason: impl Into<String>) -> Self {
        RigError::ConfigValidation { reason: reason.into() }
    }

    /// Helper constructor for camera setup errors.
    pub fn camera_setup(reason: impl Into<String>) -> Self {
        RigError::CameraSetup { reason: reason.into() }
    }

    /// Helper constructor for recording start failures.
    pub fn recording_start(room: Room, reason: impl ToString) -> Self {
        RigError::RecordingStart { room, reason: reason.to_string() }
    }

    /// Helper constructor for lighting write failures.
    pub fn lighting(device: impl Into<String>, source: std::io::Error) -> Self {
        RigError::Lighting { device: device.into(), source }
    }
}

impl From<std::io::Error> for RigError {
    fn from(err: std::io::Error) -> Self {
        RigError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn messages_carry_their_context(
            camera in "[0-9]{1,2}",
            reason in ".*",
            path in "[a-z/]{1,20}",
          ) {
            let hw = RigError::hardware(camera.clone(), "configure", reason.clone());
            prop_assert!(hw.to_string().contains(&camera));
            prop_assert!(hw.to_string().contains("configure"));

            let validation = RigError::validation(reason.clone());
            prop_assert!(validation.to_string().contains(&reason));

            let file = RigError::file_error(
              PathBuf::from(&path),
              std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            );
            prop_assert!(file.to_string().contains(&path));
          }

          #[test]
          fn hardware_source_is_preserved(reason in ".+") {
            let err = RigError::hardware("1", "start", std::io::Error::other(reason.clone()));
            let source = std::error::Error::source(&err);
            prop_assert!(source.is_some());
            prop_assert_eq!(source.map(|s| s.to_string()), Some(reason));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<RigError>();
    }

    #[test]
    fn retry_classification() {
        assert!(RigError::hardware("0", "start", "busy").is_retryable());
        assert!(RigError::recording_start(Room::DarkRoom, "busy").is_retryable());
        assert!(!RigError::LegacyConfigFormat.is_retryable());
        assert!(!RigError::NoSaveDirectory.is_retryable());
        assert!(!RigError::camera_setup("no rooms").is_retryable());
    }

    #[test]
    fn every_variant_has_suggestions() {
        let errors = vec![
            RigError::hardware("0", "start", "busy"),
            RigError::file_error("/x", std::io::Error::other("x")),
            RigError::validation("bad"),
            RigError::LegacyConfigFormat,
            RigError::NotACameraMapping,
            RigError::UnknownCamera { camera: "7".into() },
            RigError::recording_start(Room::LightRoom, "x"),
            RigError::NoSaveDirectory,
            RigError::SessionActive,
            RigError::camera_setup("x"),
            RigError::lighting("gpio17", std::io::Error::other("x")),
            RigError::Timeout { duration: Duration::from_secs(1) },
        ];
        for error in errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "{error:?}");
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn legacy_message_names_the_format() {
        let msg = RigError::LegacyConfigFormat.to_string();
        assert!(msg.contains("Legacy"));
        assert!(msg.contains("camera ID"));
    }

    #[test]
    fn from_io_error() {
        let err: RigError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        match err {
            RigError::File { source, .. } => assert_eq!(source.to_string(), "gone"),
            other => panic!("Expected File error, got {other:?}"),
        }
    }
}
