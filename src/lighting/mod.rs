//! Room lighting: IR illuminators on a digital pin, white lights on hardware PWM.
//!
//! Lighting writes never abort anything. A failed write is logged at `warn`
//! and the remembered state still changes, so the console always shows what
//! the operator asked for.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::types::Room;

pub mod simulated;
pub mod sysfs;

pub use simulated::{LightingLog, SimulatedPin, SimulatedPwm};
pub use sysfs::{SysfsPin, SysfsPwm};

/// A digital output driving a lighting relay.
pub trait DigitalPin: Send {
    fn set(&mut self, high: bool) -> Result<()>;
    fn label(&self) -> String;
}

/// A hardware PWM output; duty is a percentage in `0.0..=100.0`.
pub trait PwmChannel: Send {
    fn start(&mut self, duty: f64) -> Result<()>;
    fn change_duty_cycle(&mut self, duty: f64) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn label(&self) -> String;
}

/// What the operator has asked a room's lights to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightingState {
    pub ir_on: bool,
    pub white_on: bool,
    /// White light level in percent; kept while the white light is off.
    pub white_level: u8,
}

impl LightingState {
    /// Power-on state for a room.
    pub fn initial(room: Room) -> Self {
        match room {
            Room::LightRoom => Self { ir_on: false, white_on: true, white_level: 100 },
            Room::DarkRoom => Self { ir_on: true, white_on: false, white_level: 0 },
        }
    }

    fn duty(self) -> f64 {
        if self.white_on { f64::from(self.white_level) } else { 0.0 }
    }
}

/// One room's lighting outputs.
pub struct RoomLighting {
    room: Room,
    ir: Box<dyn DigitalPin>,
    white: Box<dyn PwmChannel>,
    state: LightingState,
}

impl RoomLighting {
    pub fn new(room: Room, ir: Box<dyn DigitalPin>, white: Box<dyn PwmChannel>) -> Self {
        Self { room, ir, white, state: LightingState::initial(room) }
    }

    pub fn room(&self) -> Room {
        self.room
    }

    pub fn state(&self) -> LightingState {
        self.state
    }

    fn report(&self, what: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!(room = %self.room, "lighting {} failed: {}", what, e);
        }
    }

    fn start(&mut self) {
        let state = self.state;
        let r = self.white.start(0.0);
        self.report("pwm start", r);
        let r = self.ir.set(state.ir_on);
        self.report("ir write", r);
        let r = self.white.change_duty_cycle(state.duty());
        self.report("white duty", r);
        info!(room = %self.room, ir = %self.ir.label(), white = %self.white.label(), ?state, "lighting initialised");
    }

    pub fn set_ir(&mut self, on: bool) {
        self.state.ir_on = on;
        let r = self.ir.set(on);
        self.report("ir write", r);
        debug!(room = %self.room, on, "ir lights");
    }

    /// Disabling sets duty to zero but keeps the level for re-enabling.
    pub fn set_white(&mut self, on: bool) {
        self.state.white_on = on;
        let r = self.white.change_duty_cycle(self.state.duty());
        self.report("white duty", r);
        debug!(room = %self.room, on, level = self.state.white_level, "white lights");
    }

    /// Level is clamped to 100 and only reaches the hardware while enabled.
    pub fn set_level(&mut self, level: u8) {
        self.state.white_level = level.min(100);
        if self.state.white_on {
            let r = self.white.change_duty_cycle(self.state.duty());
            self.report("white duty", r);
        }
        debug!(room = %self.room, level = self.state.white_level, "white level");
    }

    /// Drive every output to match `state`.
    pub fn apply(&mut self, state: LightingState) {
        self.state = state;
        let r = self.ir.set(state.ir_on);
        self.report("ir write", r);
        let r = self.white.change_duty_cycle(state.duty());
        self.report("white duty", r);
    }

    fn shutdown(&mut self) {
        let r = self.white.change_duty_cycle(0.0);
        self.report("white duty", r);
        let r = self.white.stop();
        self.report("pwm stop", r);
        let r = self.ir.set(false);
        self.report("ir write", r);
        info!(room = %self.room, "lighting off");
    }
}

/// Lighting for every configured room.
#[derive(Default)]
pub struct LightingPanel {
    rooms: Vec<RoomLighting>,
}

impl LightingPanel {
    pub fn new(rooms: Vec<RoomLighting>) -> Self {
        Self { rooms }
    }

    /// Start PWM and drive every room to its power-on state.
    pub fn initialize(&mut self) {
        for room in &mut self.rooms {
            room.start();
        }
    }

    pub fn room_mut(&mut self, room: Room) -> Option<&mut RoomLighting> {
        self.rooms.iter_mut().find(|r| r.room == room)
    }

    pub fn state(&self, room: Room) -> Option<LightingState> {
        self.rooms.iter().find(|r| r.room == room).map(|r| r.state)
    }

    pub fn states(&self) -> Vec<(Room, LightingState)> {
        self.rooms.iter().map(|r| (r.room, r.state)).collect()
    }

    /// Exchange the complete lighting state of the first two rooms.
    pub fn swap(&mut self) -> bool {
        let [first, second, ..] = self.rooms.as_mut_slice() else {
            warn!("cannot swap lights with fewer than two rooms");
            return false;
        };
        let (a, b) = (first.state, second.state);
        first.apply(b);
        second.apply(a);
        info!("lighting states swapped");
        true
    }

    /// Lights off and PWM stopped in every room.
    pub fn shutdown(&mut self) {
        for room in &mut self.rooms {
            room.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::simulated::LightingEvent;

    fn panel() -> (LightingPanel, LightingLog) {
        let log = LightingLog::default();
        let rooms = Room::ALL
            .iter()
            .enumerate()
            .map(|(i, &room)| {
                RoomLighting::new(
                    room,
                    Box::new(SimulatedPin::new(17 + i as u32, log.clone())),
                    Box::new(SimulatedPwm::new(i as u32, log.clone())),
                )
            })
            .collect();
        (LightingPanel::new(rooms), log)
    }

    #[test]
    fn initial_states_match_room_roles() {
        let (mut panel, log) = panel();
        panel.initialize();
        assert_eq!(
            panel.state(Room::LightRoom),
            Some(LightingState { ir_on: false, white_on: true, white_level: 100 })
        );
        assert_eq!(
            panel.state(Room::DarkRoom),
            Some(LightingState { ir_on: true, white_on: false, white_level: 0 })
        );
        assert_eq!(log.duty("pwm0"), Some(100.0));
        assert_eq!(log.pin("gpio18"), Some(true));
    }

    #[test]
    fn white_toggle_keeps_level() {
        let (mut panel, log) = panel();
        panel.initialize();
        let light = panel.room_mut(Room::LightRoom).unwrap();
        light.set_level(40);
        light.set_white(false);
        assert_eq!(log.duty("pwm0"), Some(0.0));
        light.set_level(60);
        assert_eq!(log.duty("pwm0"), Some(0.0));
        light.set_white(true);
        assert_eq!(log.duty("pwm0"), Some(60.0));
        light.set_level(250);
        assert_eq!(light.state().white_level, 100);
    }

    #[test]
    fn swap_twice_restores_states() {
        let (mut panel, _log) = panel();
        panel.initialize();
        let before = panel.states();
        assert!(panel.swap());
        assert_eq!(panel.state(Room::LightRoom), Some(LightingState::initial(Room::DarkRoom)));
        assert!(panel.swap());
        assert_eq!(panel.states(), before);
    }

    #[test]
    fn failed_writes_still_track_state() {
        let (mut panel, log) = panel();
        log.fail_writes(true);
        panel.room_mut(Room::DarkRoom).unwrap().set_ir(false);
        assert!(!panel.state(Room::DarkRoom).unwrap().ir_on);
    }

    #[test]
    fn shutdown_turns_everything_off() {
        let (mut panel, log) = panel();
        panel.initialize();
        panel.shutdown();
        assert_eq!(log.duty("pwm0"), Some(0.0));
        assert_eq!(log.pin("gpio18"), Some(false));
        assert!(log.events().contains(&LightingEvent::PwmStop("pwm1".into())));
    }
}
