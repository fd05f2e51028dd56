//! Recording orchestration across every room's camera.
//!
//! The [`Orchestrator`] owns the camera adapters and drives one recording
//! session at a time through an explicit [`Phase`] state machine:
//!
//! ```text
//! Previewing -> AwaitingSessionInfo -> CheckingOverwrite -> Countdown -> Recording -> Stopping -> Previewing
//! ```
//!
//! Every early exit (cancelled name, declined overwrite, cancelled countdown,
//! failed start) returns to `Previewing` with the previews restored.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::CameraAdapter;
use crate::session::{
    MAX_DELAY_SECS, RecordingParameters, RecordingSession, SessionState, StatusSnapshot, write_report,
};
use crate::types::{Room, StopMethod};
use crate::{Result, RigError};

pub mod operator;

pub use operator::{ChannelOperator, Operator, Prompt, ScriptedOperator};

/// Where the rig is in the recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Previewing,
    AwaitingSessionInfo,
    CheckingOverwrite,
    Countdown { remaining: u32 },
    Recording,
    Stopping,
}

impl Phase {
    /// True from the name prompt until previews are restored.
    pub fn is_session_active(self) -> bool {
        self != Phase::Previewing
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Previewing => f.write_str("previewing"),
            Phase::AwaitingSessionInfo => f.write_str("awaiting session info"),
            Phase::CheckingOverwrite => f.write_str("checking overwrite"),
            Phase::Countdown { remaining } => write!(f, "countdown ({remaining}s)"),
            Phase::Recording => f.write_str("recording"),
            Phase::Stopping => f.write_str("stopping"),
        }
    }
}

/// Operator requests that reach a running session.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    countdown: CancellationToken,
    stop: CancellationToken,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the countdown; ignored once recording has started.
    pub fn cancel_countdown(&self) {
        self.countdown.cancel();
    }

    /// Stop the recording, or abort the countdown if it is still running.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

/// Wall-clock time anchored to the runtime clock.
///
/// Timestamps advance with `tokio::time`, so a paused test runtime produces
/// exact durations.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    base: DateTime<Local>,
    anchor: tokio::time::Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self { base: Local::now(), anchor: tokio::time::Instant::now() }
    }

    pub fn now(&self) -> DateTime<Local> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.base + elapsed
    }
}

/// Why a session ended without recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    NoSessionName,
    OverwriteDeclined,
    CountdownCancelled,
}

/// What ended a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Manual,
    Timer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Cancelled(CancelReason),
    Completed {
        session: RecordingSession,
        stopped_by: StopReason,
        /// `None` when the report could not be written.
        report: Option<PathBuf>,
    },
}

pub struct Orchestrator {
    cameras: Vec<CameraAdapter>,
    state: SessionState,
    params: RecordingParameters,
    phase: watch::Sender<Phase>,
    last_session: Option<RecordingSession>,
}

impl Orchestrator {
    /// Cameras are kept in the given order, which is room order everywhere.
    pub fn new(cameras: Vec<CameraAdapter>) -> Self {
        let state = SessionState::new(cameras.iter().map(|c| (c.room(), c.settings().clone())));
        let (phase, _) = watch::channel(Phase::Previewing);
        Self { cameras, state, params: RecordingParameters::default(), phase, last_session: None }
    }

    pub fn with_parameters(mut self, params: RecordingParameters) -> Self {
        self.params = params;
        self
    }

    pub fn cameras(&self) -> &[CameraAdapter] {
        &self.cameras
    }

    pub fn cameras_mut(&mut self) -> &mut [CameraAdapter] {
        &mut self.cameras
    }

    pub fn camera_mut(&mut self, room: Room) -> Option<&mut CameraAdapter> {
        self.cameras.iter_mut().find(|c| c.room() == room)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.state.subscribe()
    }

    pub fn parameters(&self) -> &RecordingParameters {
        &self.params
    }

    pub fn last_session(&self) -> Option<&RecordingSession> {
        self.last_session.as_ref()
    }

    pub fn set_save_dir(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RigError::validation(format!("{} is not a directory", dir.display())));
        }
        info!(dir = %dir.display(), "save directory set");
        self.params.save_dir = Some(dir.to_path_buf());
        Ok(())
    }

    pub fn set_stop_method(&mut self, method: StopMethod) -> Result<()> {
        if let StopMethod::Timer { minutes } = method {
            if !(minutes.is_finite() && minutes > 0.0) {
                return Err(RigError::validation("timer minutes must be positive"));
            }
        }
        info!(%method, timer = %method.timer_display(), "stop method set");
        self.params.stop_method = method;
        Ok(())
    }

    pub fn set_delay(&mut self, secs: u32) -> Result<()> {
        if secs > MAX_DELAY_SECS {
            return Err(RigError::validation(format!("delay must be between 0 and {MAX_DELAY_SECS} seconds")));
        }
        self.params.delay_secs = secs;
        Ok(())
    }

    fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "phase changed");
        }
    }

    fn sync_status(&mut self, index: usize) {
        let camera = &self.cameras[index];
        if let Some(status) = camera.settings().status.clone() {
            self.state.set_status(camera.room(), status);
        }
    }

    /// Start the preview on every camera. Returns how many started.
    pub async fn preview_all(&mut self) -> usize {
        let mut started = 0;
        for i in 0..self.cameras.len() {
            let camera = &mut self.cameras[i];
            match camera.initialize_preview().await {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!(room = %camera.room(), "failed to start preview: {}", e);
                    camera.set_status("error");
                }
            }
            self.sync_status(i);
        }
        started
    }

    pub async fn stop_previews(&mut self) {
        for i in 0..self.cameras.len() {
            self.cameras[i].stop_preview().await;
            self.sync_status(i);
        }
    }

    /// Publish one preview frame per streaming camera.
    pub async fn preview_tick_all(&mut self) {
        for camera in &mut self.cameras {
            if let Err(e) = camera.preview_tick().await {
                debug!(room = %camera.room(), "preview frame failed: {}", e);
            }
        }
    }

    /// Run one recording session from the name prompt back to previewing.
    ///
    /// Cancellations are `Ok`; a missing save directory or a camera that
    /// fails to start is an error, after every started camera is stopped.
    pub async fn run_session(
        &mut self,
        operator: &mut dyn Operator,
        control: &SessionControl,
    ) -> Result<SessionOutcome> {
        if self.phase().is_session_active() {
            return Err(RigError::SessionActive);
        }
        let save_dir = self.params.save_dir.clone().ok_or(RigError::NoSaveDirectory)?;

        self.set_phase(Phase::AwaitingSessionInfo);
        let name = operator.session_name().await.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let Some(name) = name else {
            info!("session cancelled: no name given");
            self.set_phase(Phase::Previewing);
            return Ok(SessionOutcome::Cancelled(CancelReason::NoSessionName));
        };
        let mut session = RecordingSession::new(name, save_dir, &self.params);

        self.set_phase(Phase::CheckingOverwrite);
        let existing = session.existing_outputs(self.cameras.len());
        if !existing.is_empty() && !operator.confirm_overwrite(&existing).await {
            info!(session = %session.name, "session cancelled: overwrite declined");
            self.set_phase(Phase::Previewing);
            return Ok(SessionOutcome::Cancelled(CancelReason::OverwriteDeclined));
        }

        self.stop_previews().await;
        self.state.clear_session();

        if session.delay_secs > 0 && !self.countdown(session.delay_secs, control).await {
            self.restore_previews().await;
            return Ok(SessionOutcome::Cancelled(CancelReason::CountdownCancelled));
        }

        self.set_phase(Phase::Recording);
        let clock = SessionClock::start();
        session.stamp_start(clock.now());
        if let Err(e) = self.start_all(&session, &clock).await {
            self.restore_previews().await;
            return Err(e);
        }
        info!(
            session = %session.name,
            dir = %session.save_dir.display(),
            method = %session.stop_method,
            cameras = self.cameras.len(),
            "recording started"
        );

        let stopped_by = wait_for_stop(session.stop_method, control).await;

        self.set_phase(Phase::Stopping);
        session.stamp_end(clock.now());
        self.stop_all(&clock).await;
        let report = match write_report(&session, self.state.rooms()) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(session = %session.name, "failed to write session report: {}", e);
                None
            }
        };
        info!(
            session = %session.name,
            elapsed = session.elapsed_seconds().unwrap_or(0),
            ?stopped_by,
            "recording stopped"
        );

        self.restore_previews().await;
        self.last_session = Some(session.clone());
        Ok(SessionOutcome::Completed { session, stopped_by, report })
    }

    /// Tick once per second; `false` when cancelled.
    async fn countdown(&mut self, secs: u32, control: &SessionControl) -> bool {
        for remaining in (1..=secs).rev() {
            self.set_phase(Phase::Countdown { remaining });
            debug!(remaining, "countdown");
            tokio::select! {
                _ = control.countdown.cancelled() => {
                    info!(remaining, "countdown cancelled");
                    return false;
                }
                _ = control.stop.cancelled() => {
                    info!(remaining, "countdown stopped");
                    return false;
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
        true
    }

    /// Start every camera in room order, rolling back on the first failure.
    async fn start_all(&mut self, session: &RecordingSession, clock: &SessionClock) -> Result<()> {
        for i in 0..self.cameras.len() {
            let path = session.camera_file(i + 1);
            let room = self.cameras[i].room();
            match self.cameras[i].start_recording(&path).await {
                Ok(snapshot) => {
                    self.state.set_recording_snapshot(room, snapshot);
                    self.state.set_start_time(room, clock.now().time());
                    self.state.set_is_running(room, true);
                    self.sync_status(i);
                }
                Err(e) => {
                    error!(%room, "camera failed to start, stopping the others: {}", e);
                    self.cameras[i].set_status("error");
                    self.sync_status(i);
                    for j in 0..i {
                        self.cameras[j].stop_recording().await;
                        self.state.set_is_running(self.cameras[j].room(), false);
                        self.sync_status(j);
                    }
                    return Err(RigError::recording_start(room, e));
                }
            }
        }
        Ok(())
    }

    async fn stop_all(&mut self, clock: &SessionClock) {
        for i in 0..self.cameras.len() {
            let room = self.cameras[i].room();
            if !self.cameras[i].stop_recording().await {
                warn!(%room, "camera did not stop cleanly");
            }
            self.state.set_end_time(room, clock.now().time());
            self.state.set_is_running(room, false);
            self.sync_status(i);
        }
    }

    async fn restore_previews(&mut self) {
        let started = self.preview_all().await;
        if started < self.cameras.len() {
            warn!(started, total = self.cameras.len(), "not every preview could be restored");
        }
        self.set_phase(Phase::Previewing);
    }
}

async fn wait_for_stop(method: StopMethod, control: &SessionControl) -> StopReason {
    match method.deadline() {
        Some(deadline) => tokio::select! {
            _ = control.stop.cancelled() => StopReason::Manual,
            _ = tokio::time::sleep(deadline) => StopReason::Timer,
        },
        None => {
            control.stop.cancelled().await;
            StopReason::Manual
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedCameraHandle;
    use crate::test_utils::simulated_cameras;

    fn orchestrator(dir: &Path) -> (Orchestrator, Vec<SimulatedCameraHandle>) {
        let (cameras, handles) = simulated_cameras(&[0, 1]);
        let mut orch = Orchestrator::new(cameras);
        orch.set_save_dir(dir).unwrap();
        (orch, handles)
    }

    #[tokio::test]
    async fn requires_a_save_directory() {
        let (cameras, _) = simulated_cameras(&[0]);
        let mut orch = Orchestrator::new(cameras);
        let mut op = ScriptedOperator::new().name("t");
        let err = orch.run_session(&mut op, &SessionControl::new()).await.unwrap_err();
        assert!(matches!(err, RigError::NoSaveDirectory));
        assert_eq!(orch.phase(), Phase::Previewing);
    }

    #[tokio::test]
    async fn empty_name_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, handles) = orchestrator(dir.path());
        let mut op = ScriptedOperator::new().name("   ");
        let outcome = orch.run_session(&mut op, &SessionControl::new()).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled(CancelReason::NoSessionName));
        assert_eq!(handles[0].count("start_recording"), 0);
    }

    #[tokio::test]
    async fn declined_overwrite_leaves_previews_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t_data.txt"), "old").unwrap();
        let (mut orch, handles) = orchestrator(dir.path());
        orch.preview_all().await;
        handles[0].clear_calls();

        let mut op = ScriptedOperator::new().name("t").overwrite(false);
        let outcome = orch.run_session(&mut op, &SessionControl::new()).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled(CancelReason::OverwriteDeclined));
        assert_eq!(op.overwrite_prompts, vec![vec!["t_data.txt".to_string()]]);
        assert!(orch.cameras()[0].is_streaming());
        assert!(handles[0].calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_then_records() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, _) = orchestrator(dir.path());
        orch.set_delay(3).unwrap();
        let mut phases = orch.subscribe_phase();
        let control = SessionControl::new();
        let stopper = control.clone();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while phases.changed().await.is_ok() {
                let phase = *phases.borrow_and_update();
                seen.push(phase);
                if phase == Phase::Recording {
                    stopper.stop();
                }
                if phase == Phase::Previewing {
                    break;
                }
            }
            seen
        });

        let mut op = ScriptedOperator::new().name("t");
        let outcome = orch.run_session(&mut op, &control).await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Completed { stopped_by: StopReason::Manual, .. }));
        let seen = watcher.await.unwrap();
        assert!(seen.contains(&Phase::Countdown { remaining: 3 }));
        assert!(seen.contains(&Phase::Countdown { remaining: 1 }));
        assert!(seen.contains(&Phase::Recording));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_records() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, handles) = orchestrator(dir.path());
        orch.set_delay(10).unwrap();
        let control = SessionControl::new();
        let canceller = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel_countdown();
        });

        let mut op = ScriptedOperator::new().name("t");
        let outcome = orch.run_session(&mut op, &control).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled(CancelReason::CountdownCancelled));
        assert_eq!(handles[1].count("start_recording"), 0);
        assert!(orch.cameras().iter().all(CameraAdapter::is_streaming));
        assert_eq!(orch.state().rooms()[0].start_time, None);
        assert_eq!(orch.phase(), Phase::Previewing);
    }

    #[tokio::test]
    async fn failed_start_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, handles) = orchestrator(dir.path());
        handles[1].fail("start_recording", 1);

        let mut op = ScriptedOperator::new().name("t");
        let err = orch.run_session(&mut op, &SessionControl::new()).await.unwrap_err();
        assert!(matches!(err, RigError::RecordingStart { room: Room::DarkRoom, .. }));
        assert!(!orch.state().is_any_running());
        assert_eq!(handles[0].count("stop_recording"), 1);
        assert!(orch.cameras().iter().all(|c| !c.is_recording()));
        assert_eq!(orch.phase(), Phase::Previewing);
        assert!(!dir.path().join("t_data.txt").exists());
    }

    #[test]
    fn parameter_validation() {
        let (cameras, _) = simulated_cameras(&[0]);
        let mut orch = Orchestrator::new(cameras);
        assert!(orch.set_delay(MAX_DELAY_SECS).is_ok());
        assert!(orch.set_delay(MAX_DELAY_SECS + 1).is_err());
        assert!(orch.set_stop_method(StopMethod::Timer { minutes: 0.0 }).is_err());
        assert!(orch.set_stop_method(StopMethod::Timer { minutes: 2.5 }).is_ok());
        assert!(orch.set_save_dir("/nonexistent/duocam").is_err());
        assert_eq!(orch.parameters().delay_secs, MAX_DELAY_SECS);
    }
}
