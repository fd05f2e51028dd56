//! How a recording ends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a recording session is ended.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StopMethod {
    /// Recording runs until the operator stops it.
    #[default]
    Manual,

    /// Recording stops by itself after a single-shot deadline.
    /// The operator can still stop early.
    Timer { minutes: f64 },
}

impl StopMethod {
    /// Timer deadline, rounded to whole seconds.
    pub fn deadline(self) -> Option<Duration> {
        match self {
            StopMethod::Manual => None,
            StopMethod::Timer { minutes } => Some(Duration::from_secs(minutes_to_secs(minutes))),
        }
    }

    /// Configured timer length as `MM:SS`, or `00:00` when there is no timer.
    pub fn timer_display(self) -> String {
        match self {
            StopMethod::Manual => "00:00".to_string(),
            StopMethod::Timer { minutes } => format_mm_ss(minutes_to_secs(minutes)),
        }
    }
}

impl fmt::Display for StopMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopMethod::Manual => f.write_str("Manual"),
            StopMethod::Timer { .. } => f.write_str("Timer"),
        }
    }
}

fn minutes_to_secs(minutes: f64) -> u64 {
    if minutes.is_finite() && minutes > 0.0 { (minutes * 60.0).round() as u64 } else { 0 }
}

/// `MM:SS`, with minutes allowed past 59.
pub fn format_mm_ss(total_seconds: u64) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// `HH:MM:SS`, with hours allowed past 23.
pub fn format_hh_mm_ss(total_seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_deadline_rounds_to_whole_seconds() {
        assert_eq!(StopMethod::Timer { minutes: 0.1 }.deadline(), Some(Duration::from_secs(6)));
        assert_eq!(StopMethod::Timer { minutes: 0.35 }.deadline(), Some(Duration::from_secs(21)));
        assert_eq!(StopMethod::Manual.deadline(), None);
        assert_eq!(StopMethod::Timer { minutes: -1.0 }.deadline(), Some(Duration::ZERO));
    }

    #[test]
    fn timer_display_formats() {
        assert_eq!(StopMethod::Manual.timer_display(), "00:00");
        assert_eq!(StopMethod::Timer { minutes: 1.5 }.timer_display(), "01:30");
        assert_eq!(StopMethod::Timer { minutes: 60.0 }.timer_display(), "60:00");
    }

    #[test]
    fn duration_formats() {
        assert_eq!(format_hh_mm_ss(6), "00:00:06");
        assert_eq!(format_hh_mm_ss(3723), "01:02:03");
        assert_eq!(format_hh_mm_ss(90_000), "25:00:00");
    }

    #[test]
    fn serde_shape() {
        let timer: StopMethod = serde_yaml_ng::from_str("kind: timer\nminutes: 5").unwrap();
        assert_eq!(timer, StopMethod::Timer { minutes: 5.0 });
        let manual: StopMethod = serde_yaml_ng::from_str("kind: manual").unwrap();
        assert_eq!(manual, StopMethod::Manual);
        assert_eq!(timer.to_string(), "Timer");
    }
}
