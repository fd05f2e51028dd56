//! Dual-camera recording console for a two-room (LightRoom/DarkRoom) observation rig.
//!
//! duocam previews both cameras, records them together into one session,
//! tunes each camera's controls from JSON configuration files and drives the
//! rooms' IR and white lights.
//!
//! # Layout
//!
//! - [`camera`]: the `CameraDevice` driver seam, its backends and the per-room adapter
//! - [`config`]: per-camera control configuration (load, live edit, save, swap)
//! - [`orchestrator`]: the recording session state machine
//! - [`session`]: session naming, per-room state and the session report
//! - [`lighting`]: IR and white light outputs
//! - [`console`]: the line-oriented operator console
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use duocam::{Rig, RigSettings};
//! use duocam::orchestrator::{ScriptedOperator, SessionControl};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut rig = Rig::from_settings(RigSettings::load()?).await?;
//!     rig.start().await;
//!     rig.orchestrator.set_save_dir("/tmp")?;
//!
//!     let control = SessionControl::new();
//!     let stopper = control.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!         stopper.stop();
//!     });
//!
//!     let mut operator = ScriptedOperator::new().name("trial1");
//!     let outcome = rig.orchestrator.run_session(&mut operator, &control).await?;
//!     println!("{outcome:?}");
//!     rig.shutdown().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod controls;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Hardware seams
pub mod camera;
pub mod lighting;

// Session lifecycle
pub mod config;
pub mod orchestrator;
pub mod session;

// Operator surface
pub mod console;
pub mod rig;
pub mod settings;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use config::ConfigStore;
pub use controls::{ControlSet, Resolution};
pub use orchestrator::{Orchestrator, Phase};
pub use rig::Rig;
pub use settings::RigSettings;
