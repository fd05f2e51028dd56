//! In-memory lighting outputs that record every write

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{DigitalPin, PwmChannel};
use crate::{Result, RigError};

#[derive(Debug, Clone, PartialEq)]
pub enum LightingEvent {
    Pin(String, bool),
    PwmStart(String, f64),
    PwmDuty(String, f64),
    PwmStop(String),
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<LightingEvent>,
    fail: bool,
}

/// Shared record of lighting writes.
#[derive(Debug, Clone, Default)]
pub struct LightingLog {
    state: Arc<Mutex<LogState>>,
}

impl LightingLog {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<LightingEvent> {
        self.lock().events.clone()
    }

    /// Make every following write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail = fail;
    }

    /// Last level written to a pin.
    pub fn pin(&self, label: &str) -> Option<bool> {
        self.lock().events.iter().rev().find_map(|e| match e {
            LightingEvent::Pin(l, v) if l == label => Some(*v),
            _ => None,
        })
    }

    /// Last duty written to a PWM channel.
    pub fn duty(&self, label: &str) -> Option<f64> {
        self.lock().events.iter().rev().find_map(|e| match e {
            LightingEvent::PwmStart(l, d) | LightingEvent::PwmDuty(l, d) if l == label => Some(*d),
            _ => None,
        })
    }

    fn push(&self, label: &str, event: LightingEvent) -> Result<()> {
        let mut state = self.lock();
        if state.fail {
            return Err(RigError::lighting(label, io::Error::other("simulated write failure")));
        }
        state.events.push(event);
        Ok(())
    }
}

pub struct SimulatedPin {
    label: String,
    log: LightingLog,
}

impl SimulatedPin {
    pub fn new(pin: u32, log: LightingLog) -> Self {
        Self { label: format!("gpio{pin}"), log }
    }
}

impl DigitalPin for SimulatedPin {
    fn set(&mut self, high: bool) -> Result<()> {
        self.log.push(&self.label, LightingEvent::Pin(self.label.clone(), high))
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

pub struct SimulatedPwm {
    label: String,
    log: LightingLog,
}

impl SimulatedPwm {
    pub fn new(channel: u32, log: LightingLog) -> Self {
        Self { label: format!("pwm{channel}"), log }
    }
}

impl PwmChannel for SimulatedPwm {
    fn start(&mut self, duty: f64) -> Result<()> {
        self.log.push(&self.label, LightingEvent::PwmStart(self.label.clone(), duty))
    }

    fn change_duty_cycle(&mut self, duty: f64) -> Result<()> {
        self.log.push(&self.label, LightingEvent::PwmDuty(self.label.clone(), duty))
    }

    fn stop(&mut self) -> Result<()> {
        self.log.push(&self.label, LightingEvent::PwmStop(self.label.clone()))
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
