//! Fixtures shared by unit tests, integration tests and benches
//!
//! Everything here runs on the simulated backends, so no camera or GPIO
//! hardware is needed.

#![cfg(any(test, feature = "benchmark"))]

use chrono::{Local, NaiveTime, TimeZone};
use serde_json::{Value, json};
use std::path::Path;

use crate::camera::{CameraAdapter, RecordingSnapshot, SimulatedCamera, SimulatedCameraHandle, StreamConfig};
use crate::controls::{ControlSet, Resolution};
use crate::lighting::{LightingLog, LightingPanel, RoomLighting, SimulatedPin, SimulatedPwm};
use crate::rig::Rig;
use crate::session::{RecordingParameters, RecordingSession, RoomStatus};
use crate::settings::{RigSettings, RoomSettings};
use crate::types::{CameraSettings, Room, StopMethod};

/// Room for the `i`th configured camera: LightRoom first.
fn room_for(index: usize) -> Room {
    Room::ALL[index % Room::ALL.len()]
}

/// Simulated camera adapters on `ports`, in room order, with their call logs.
pub fn simulated_cameras(ports: &[u32]) -> (Vec<CameraAdapter>, Vec<SimulatedCameraHandle>) {
    ports
        .iter()
        .enumerate()
        .map(|(i, &port)| {
            let room = RoomSettings::new(room_for(i), port);
            let camera = SimulatedCamera::new(port);
            let handle = camera.handle();
            let adapter = CameraAdapter::new(room.room, room.camera_settings(), room.rotation(), Box::new(camera));
            (adapter, handle)
        })
        .unzip()
}

/// Simulated lighting for every room in `rooms`, recording to one log.
pub fn simulated_lighting(rooms: &[Room]) -> (LightingPanel, LightingLog) {
    let log = LightingLog::default();
    let settings: Vec<RoomSettings> = rooms.iter().map(|&room| RoomSettings::new(room, 0)).collect();
    let lights = settings
        .iter()
        .map(|room| {
            RoomLighting::new(
                room.room,
                Box::new(SimulatedPin::new(room.ir_pin(), log.clone())),
                Box::new(SimulatedPwm::new(room.pwm_channel(), log.clone())),
            )
        })
        .collect();
    (LightingPanel::new(lights), log)
}

/// A two-room simulated rig saving sessions into `dir`.
///
/// The rig's default configuration file lives in `dir` too, so tests never
/// touch the working directory.
pub fn simulated_rig(dir: &Path) -> (Rig, Vec<SimulatedCameraHandle>, LightingLog) {
    let settings = RigSettings {
        config_file: dir.join("default_config.json"),
        recording: RecordingParameters { save_dir: Some(dir.to_path_buf()), ..Default::default() },
        ..Default::default()
    };
    let (cameras, handles) = simulated_cameras(&[0, 1]);
    let (lighting, log) = simulated_lighting(&Room::ALL);
    (Rig::new(settings, cameras, lighting), handles, log)
}

/// A valid two-camera configuration file.
pub fn sample_config() -> Value {
    json!({
        "0": {
            "FrameDurationLimits": [33333, 33333],
            "ExposureTime": 12000,
            "LensPosition": 2.5,
            "Brightness": 0.1,
            "Saturation": 1.2,
            "Contrast": 1.1,
            "Sharpness": 1.5,
            "Resolution": [1920, 1080],
            "ScalerCrop": [0, 0, 3072, 1728]
        },
        "1": {
            "FrameDurationLimits": [40000, 40000],
            "ExposureTime": 30000,
            "AnalogueGain": 4.0,
            "Resolution": [1280, 720],
            "AwbMode": 1
        }
    })
}

/// A fully populated control set.
pub fn sample_controls() -> ControlSet {
    ControlSet {
        frame_duration_limits: Some(vec![33_333, 33_333]),
        exposure_time: Some(12_000),
        lens_position: Some(2.5),
        analogue_gain: Some(2.0),
        brightness: Some(0.1),
        saturation: Some(1.2),
        contrast: Some(1.1),
        sharpness: Some(1.5),
        resolution: Some(Resolution::RECORDING_DEFAULT),
        scaler_crop: Some([0, 0, 3072, 1728]),
        ..Default::default()
    }
}

/// A finished six-second timer session with two rooms recorded.
pub fn finished_session(dir: &Path) -> (RecordingSession, Vec<RoomStatus>) {
    let params = RecordingParameters {
        save_dir: Some(dir.to_path_buf()),
        stop_method: StopMethod::Timer { minutes: 0.1 },
        delay_secs: 0,
    };
    let mut session = RecordingSession::new("trial1", dir, &params);
    let start = Local.with_ymd_and_hms(2025, 6, 2, 14, 5, 0).single().unwrap_or_else(Local::now);
    session.stamp_start(start);
    session.stamp_end(start + chrono::Duration::seconds(6));

    let video = StreamConfig::video(Resolution::RECORDING_DEFAULT, ControlSet::default());
    let snapshot = RecordingSnapshot::capture(&sample_controls(), Some(&video));
    let rooms = Room::ALL
        .iter()
        .enumerate()
        .map(|(i, &room)| RoomStatus {
            room,
            settings: CameraSettings::for_port(i as u32),
            is_running: false,
            start_time: NaiveTime::from_hms_opt(14, 5, 0),
            end_time: NaiveTime::from_hms_opt(14, 5, 6),
            snapshot: Some(snapshot.clone()),
        })
        .collect();
    (session, rooms)
}
