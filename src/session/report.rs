//! Plain-text session report written next to the video files

use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

use super::{RecordingSession, RoomStatus};
use crate::types::{StopMethod, format_hh_mm_ss};
use crate::{Result, RigError};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Render the report for a finished session.
///
/// `rooms` must be in configured room order; camera numbers follow it.
pub fn render_report(session: &RecordingSession, rooms: &[RoomStatus]) -> String {
    let heavy = "=".repeat(60);
    let light = "-".repeat(60);
    let elapsed = session.elapsed_seconds().unwrap_or(0);
    let mut out = String::new();

    // Infallible: writing into a String
    let _ = writeln!(out, "{heavy}\nRECORDING SESSION DATA\n{heavy}\n");

    let _ = writeln!(out, "SESSION INFORMATION\n{light}");
    let _ = writeln!(out, "Session Name: {}", session.name);
    let _ = writeln!(out, "Save Path: {}\n", session.save_dir.display());

    let _ = writeln!(out, "TIMING INFORMATION\n{light}");
    if let Some(start) = session.start() {
        let _ = writeln!(out, "Start Date/Time: {}", start.format(DATETIME_FORMAT));
    }
    if let Some(end) = session.end() {
        let _ = writeln!(out, "End Date/Time: {}", end.format(DATETIME_FORMAT));
    }
    let _ = writeln!(out, "Total Duration: {}", format_hh_mm_ss(elapsed));
    let _ = writeln!(out, "Elapsed Seconds: {elapsed}\n");

    let _ = writeln!(out, "RECORDING PARAMETERS\n{light}");
    let _ = writeln!(out, "Stop Method: {}", session.stop_method);
    if let StopMethod::Timer { minutes } = session.stop_method {
        let _ = writeln!(out, "Timer Duration: {minutes} minutes");
    }
    let _ = writeln!(out, "Recording Delay (Countdown): {} seconds\n", session.delay_secs);

    for (i, status) in rooms.iter().enumerate() {
        let n = i + 1;
        let _ = writeln!(out, "CAMERA {n} ({})\n{light}", status.room);
        let _ = writeln!(out, "Video File: {}", session.camera_file_name(n));
        if let Some(start) = status.start_time {
            let _ = writeln!(out, "Start Time: {}", start.format(TIME_FORMAT));
        }
        if let Some(end) = status.end_time {
            let _ = writeln!(out, "End Time: {}", end.format(TIME_FORMAT));
        }

        if let Some(snapshot) = status.snapshot.as_ref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "\nCamera Configuration:");
            for (key, value) in &snapshot.entries {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }

        let settings = &status.settings;
        let _ = writeln!(out, "\nCamera Settings:");
        let _ = writeln!(out, "  Display Number: {}", settings.port);
        let hints = [
            ("Status", &settings.status),
            ("Focus", &settings.focus),
            ("Frame Rate", &settings.frame_rate),
            ("Exposure", &settings.exposure),
            ("Zoom", &settings.zoom),
        ];
        for (label, value) in hints {
            if let Some(value) = value {
                let _ = writeln!(out, "  {label}: {value}");
            }
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{heavy}\nEnd of session data\n{heavy}");
    out
}

/// Write the report to `<save_dir>/<session>_data.txt`.
pub fn write_report(session: &RecordingSession, rooms: &[RoomStatus]) -> Result<PathBuf> {
    let path = session.report_path();
    std::fs::write(&path, render_report(session, rooms)).map_err(|e| RigError::file_error(&path, e))?;
    info!(path = %path.display(), "session report written");
    Ok(path)
}
