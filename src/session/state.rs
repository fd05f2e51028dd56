//! Per-room recording state with change notifications

use chrono::NaiveTime;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::camera::RecordingSnapshot;
use crate::types::{CameraSettings, Room};

/// Everything the rig tracks about one room's camera during a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomStatus {
    pub room: Room,
    pub settings: CameraSettings,
    /// True only between a successful start and its matching stop.
    pub is_running: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub snapshot: Option<RecordingSnapshot>,
}

impl RoomStatus {
    fn new(room: Room, settings: CameraSettings) -> Self {
        Self { room, settings, is_running: false, start_time: None, end_time: None, snapshot: None }
    }
}

/// Snapshot of every room, published after each change.
pub type StatusSnapshot = Arc<Vec<RoomStatus>>;

/// Room-keyed session state in configured room order.
pub struct SessionState {
    rooms: Vec<RoomStatus>,
    updates: watch::Sender<StatusSnapshot>,
}

impl SessionState {
    pub fn new(rooms: impl IntoIterator<Item = (Room, CameraSettings)>) -> Self {
        let rooms: Vec<RoomStatus> =
            rooms.into_iter().map(|(room, settings)| RoomStatus::new(room, settings)).collect();
        let (updates, _) = watch::channel(Arc::new(rooms.clone()));
        Self { rooms, updates }
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.updates.subscribe()
    }

    pub fn rooms(&self) -> &[RoomStatus] {
        &self.rooms
    }

    pub fn room(&self, room: Room) -> Option<&RoomStatus> {
        self.rooms.iter().find(|r| r.room == room)
    }

    pub fn is_running(&self, room: Room) -> bool {
        self.room(room).is_some_and(|r| r.is_running)
    }

    pub fn is_any_running(&self) -> bool {
        self.rooms.iter().any(|r| r.is_running)
    }

    fn update(&mut self, room: Room, f: impl FnOnce(&mut RoomStatus)) {
        if let Some(status) = self.rooms.iter_mut().find(|r| r.room == room) {
            f(status);
            trace!(%room, running = status.is_running, "room state changed");
            self.updates.send_replace(Arc::new(self.rooms.clone()));
        }
    }

    pub fn set_is_running(&mut self, room: Room, running: bool) {
        self.update(room, |r| r.is_running = running);
    }

    pub fn set_start_time(&mut self, room: Room, at: NaiveTime) {
        self.update(room, |r| r.start_time = Some(at));
    }

    pub fn set_end_time(&mut self, room: Room, at: NaiveTime) {
        self.update(room, |r| r.end_time = Some(at));
    }

    pub fn set_recording_snapshot(&mut self, room: Room, snapshot: RecordingSnapshot) {
        self.update(room, |r| r.snapshot = Some(snapshot));
    }

    pub fn set_status(&mut self, room: Room, status: impl Into<String>) {
        let status = status.into();
        self.update(room, |r| r.settings.status = Some(status));
    }

    /// Forget the previous session's times and snapshots.
    pub fn clear_session(&mut self) {
        for status in &mut self.rooms {
            status.start_time = None;
            status.end_time = None;
            status.snapshot = None;
        }
        self.updates.send_replace(Arc::new(self.rooms.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new([
            (Room::LightRoom, CameraSettings::for_port(0)),
            (Room::DarkRoom, CameraSettings::for_port(1)),
        ])
    }

    #[test]
    fn running_flags_aggregate() {
        let mut state = state();
        assert!(!state.is_any_running());
        state.set_is_running(Room::DarkRoom, true);
        assert!(state.is_running(Room::DarkRoom));
        assert!(!state.is_running(Room::LightRoom));
        assert!(state.is_any_running());
        state.set_is_running(Room::DarkRoom, false);
        assert!(!state.is_any_running());
    }

    #[test]
    fn setters_notify_subscribers() {
        let mut state = state();
        let mut rx = state.subscribe();
        rx.borrow_and_update();
        state.set_start_time(Room::LightRoom, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot[0].start_time, NaiveTime::from_hms_opt(10, 0, 0));
    }

    #[test]
    fn rooms_keep_configured_order() {
        let state = SessionState::new([
            (Room::DarkRoom, CameraSettings::for_port(1)),
            (Room::LightRoom, CameraSettings::for_port(0)),
        ]);
        let order: Vec<Room> = state.rooms().iter().map(|r| r.room).collect();
        assert_eq!(order, vec![Room::DarkRoom, Room::LightRoom]);
    }

    #[test]
    fn clear_session_keeps_settings() {
        let mut state = state();
        state.set_status(Room::LightRoom, "recording");
        state.set_end_time(Room::LightRoom, NaiveTime::from_hms_opt(1, 2, 3).unwrap());
        state.clear_session();
        let light = state.room(Room::LightRoom).unwrap();
        assert_eq!(light.end_time, None);
        assert_eq!(light.settings.status.as_deref(), Some("recording"));
    }
}
