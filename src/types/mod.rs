//! Core value types shared across the rig.
//!
//! - [`Room`] names one side of the rig; configured rooms are always iterated
//!   in the order they appear in the rig settings
//! - [`CameraId`] is the key of a camera in configuration files (its port)
//! - [`CameraSettings`] holds the fixed per-room camera description
//! - [`StopMethod`] decides whether a recording ends manually or on a timer

pub mod room;
pub mod stop_method;

pub use room::{CameraId, CameraSettings, Room, Rotation};
pub use stop_method::{StopMethod, format_hh_mm_ss, format_mm_ss};
