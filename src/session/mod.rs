//! Recording sessions: naming, output files, per-room state and the report.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::StopMethod;

pub mod report;
pub mod state;

pub use report::{render_report, write_report};
pub use state::{RoomStatus, SessionState, StatusSnapshot};

/// Longest countdown the console accepts, in seconds.
pub const MAX_DELAY_SECS: u32 = 120;

/// Operator choices that apply to the next recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingParameters {
    pub save_dir: Option<PathBuf>,
    pub stop_method: StopMethod,
    /// Countdown before recording starts; 0 starts immediately.
    pub delay_secs: u32,
}

/// One recording session from name entry to report.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    pub name: String,
    pub save_dir: PathBuf,
    pub stop_method: StopMethod,
    pub delay_secs: u32,
    start: Option<DateTime<Local>>,
    end: Option<DateTime<Local>>,
}

impl RecordingSession {
    pub fn new(name: impl Into<String>, save_dir: impl Into<PathBuf>, params: &RecordingParameters) -> Self {
        Self {
            name: name.into(),
            save_dir: save_dir.into(),
            stop_method: params.stop_method,
            delay_secs: params.delay_secs,
            start: None,
            end: None,
        }
    }

    pub fn start(&self) -> Option<DateTime<Local>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Local>> {
        self.end
    }

    /// Stamp the start time. Only the first stamp counts.
    pub fn stamp_start(&mut self, at: DateTime<Local>) {
        if self.start.is_none() {
            self.start = Some(at);
        } else {
            debug!(session = %self.name, "start already stamped");
        }
    }

    /// Stamp the end time. Only the first stamp counts.
    pub fn stamp_end(&mut self, at: DateTime<Local>) {
        if self.end.is_none() {
            self.end = Some(at);
        } else {
            debug!(session = %self.name, "end already stamped");
        }
    }

    /// `end - start`, rounded to whole seconds.
    pub fn elapsed_seconds(&self) -> Option<u64> {
        let (start, end) = (self.start?, self.end?);
        let millis = (end - start).num_milliseconds().max(0) as u64;
        Some((millis + 500) / 1000)
    }

    /// `<save_dir>/<session>_<camera_name>.h264`
    pub fn file_path(&self, camera_name: &str) -> PathBuf {
        self.save_dir.join(format!("{}_{}.h264", self.name, camera_name))
    }

    /// Video file name for the `n`th camera, counting from 1.
    pub fn camera_file_name(&self, n: usize) -> String {
        format!("{}_camera_{}.h264", self.name, n)
    }

    pub fn camera_file(&self, n: usize) -> PathBuf {
        self.file_path(&format!("camera_{n}"))
    }

    pub fn report_file_name(&self) -> String {
        format!("{}_data.txt", self.name)
    }

    pub fn report_path(&self) -> PathBuf {
        self.save_dir.join(self.report_file_name())
    }

    /// Names of output files for `cameras` cameras that already exist.
    pub fn existing_outputs(&self, cameras: usize) -> Vec<String> {
        let mut existing: Vec<String> = (1..=cameras)
            .filter(|&n| self.camera_file(n).exists())
            .map(|n| self.camera_file_name(n))
            .collect();
        if self.report_path().exists() {
            existing.push(self.report_file_name());
        }
        existing
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(dir: &Path) -> RecordingSession {
        RecordingSession::new("trial1", dir, &RecordingParameters::default())
    }

    #[test]
    fn output_names() {
        let s = session(Path::new("/tmp/sess"));
        assert_eq!(s.camera_file(1), PathBuf::from("/tmp/sess/trial1_camera_1.h264"));
        assert_eq!(s.file_path("LightRoom"), PathBuf::from("/tmp/sess/trial1_LightRoom.h264"));
        assert_eq!(s.report_path(), PathBuf::from("/tmp/sess/trial1_data.txt"));
    }

    #[test]
    fn start_and_end_stamp_once() {
        let mut s = session(Path::new("/tmp"));
        let t0 = Local.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::milliseconds(6_400);
        s.stamp_start(t0);
        s.stamp_start(t1);
        assert_eq!(s.start(), Some(t0));
        assert_eq!(s.elapsed_seconds(), None);
        s.stamp_end(t1);
        assert_eq!(s.elapsed_seconds(), Some(6));
        s.stamp_end(t1 + chrono::Duration::seconds(5));
        assert_eq!(s.end(), Some(t1));
    }

    #[test]
    fn elapsed_rounds_half_up() {
        let mut s = session(Path::new("/tmp"));
        let t0 = Local.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        s.stamp_start(t0);
        s.stamp_end(t0 + chrono::Duration::milliseconds(5_500));
        assert_eq!(s.elapsed_seconds(), Some(6));
    }

    #[test]
    fn existing_outputs_lists_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        assert!(s.existing_outputs(2).is_empty());
        std::fs::write(s.camera_file(2), b"").unwrap();
        std::fs::write(s.report_path(), b"").unwrap();
        assert_eq!(s.existing_outputs(2), vec!["trial1_camera_2.h264", "trial1_data.txt"]);
    }
}
