//! End-to-end recording sessions on simulated cameras

use std::path::Path;
use std::time::Duration;

use duocam::camera::simulated::CameraCall;
use duocam::camera::{CameraAdapter, SimulatedCamera, SimulatedCameraHandle};
use duocam::orchestrator::{CancelReason, ScriptedOperator, SessionControl, SessionOutcome, StopReason};
use duocam::session::RecordingParameters;
use duocam::{CameraSettings, Orchestrator, Phase, RigError, Room, Rotation, StopMethod};

fn rig(dir: &Path, stop_method: StopMethod, delay_secs: u32) -> (Orchestrator, Vec<SimulatedCameraHandle>) {
    let (cameras, handles): (Vec<CameraAdapter>, Vec<SimulatedCameraHandle>) = [(Room::LightRoom, 0), (Room::DarkRoom, 1)]
        .into_iter()
        .map(|(room, port)| {
            let camera = SimulatedCamera::new(port);
            let handle = camera.handle();
            let rotation = if room == Room::DarkRoom { Rotation::Cw180 } else { Rotation::None };
            (CameraAdapter::new(room, CameraSettings::for_port(port), rotation, Box::new(camera)), handle)
        })
        .unzip();
    let params = RecordingParameters { save_dir: Some(dir.to_path_buf()), stop_method, delay_secs };
    (Orchestrator::new(cameras).with_parameters(params), handles)
}

#[tokio::test(start_paused = true)]
async fn timer_session_writes_videos_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let (mut orchestrator, handles) = rig(dir.path(), StopMethod::Timer { minutes: 0.1 }, 0);
    assert_eq!(orchestrator.preview_all().await, 2);

    let mut operator = ScriptedOperator::new().name("trial1");
    let outcome = orchestrator.run_session(&mut operator, &SessionControl::new()).await.unwrap();

    let SessionOutcome::Completed { session, stopped_by, report } = outcome else {
        panic!("session did not complete: {outcome:?}");
    };
    assert_eq!(stopped_by, StopReason::Timer);
    assert_eq!(session.elapsed_seconds(), Some(6));
    assert!(operator.overwrite_prompts.is_empty());

    for file in ["trial1_camera_1.h264", "trial1_camera_2.h264"] {
        let len = std::fs::metadata(dir.path().join(file)).unwrap().len();
        assert!(len > 0, "{file} is empty");
    }
    let report = report.unwrap();
    assert_eq!(report, dir.path().join("trial1_data.txt"));
    let text = std::fs::read_to_string(&report).unwrap();
    assert!(text.contains("Session Name: trial1"));
    assert!(text.contains("Total Duration: 00:00:06"));
    assert!(text.contains("Elapsed Seconds: 6"));
    assert!(text.contains("Stop Method: Timer"));
    assert!(text.contains("Timer Duration: 0.1 minutes"));
    assert!(text.contains("CAMERA 1 (LightRoom)"));
    assert!(text.contains("CAMERA 2 (DarkRoom)"));
    assert!(text.contains("Video File: trial1_camera_2.h264"));

    let reports = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("_data.txt"))
        .count();
    assert_eq!(reports, 1);

    assert_eq!(orchestrator.phase(), Phase::Previewing);
    assert!(!orchestrator.state().is_any_running());
    assert!(orchestrator.cameras().iter().all(CameraAdapter::is_streaming));
    for handle in &handles {
        assert_eq!(handle.count("start_recording"), 1);
        assert_eq!(handle.count("stop_recording"), 1);
    }
    assert_eq!(orchestrator.last_session().map(|s| s.name.as_str()), Some("trial1"));
}

#[tokio::test]
async fn manual_stop_after_every_room_is_running() {
    let dir = tempfile::tempdir().unwrap();
    let (mut orchestrator, _handles) = rig(dir.path(), StopMethod::Manual, 0);
    orchestrator.preview_all().await;

    let control = SessionControl::new();
    let mut status = orchestrator.subscribe_status();
    let stopper = control.clone();
    let watcher = tokio::spawn(async move {
        loop {
            if status.borrow_and_update().iter().all(|room| room.is_running) {
                stopper.stop();
                return true;
            }
            if status.changed().await.is_err() {
                return false;
            }
        }
    });

    let mut operator = ScriptedOperator::new().name("manual");
    let outcome = orchestrator.run_session(&mut operator, &control).await.unwrap();
    assert!(watcher.await.unwrap(), "rooms were never all running together");
    assert!(matches!(outcome, SessionOutcome::Completed { stopped_by: StopReason::Manual, .. }));

    let rooms = orchestrator.state().rooms();
    assert!(rooms.iter().all(|room| !room.is_running));
    assert!(rooms.iter().all(|room| room.start_time.is_some() && room.end_time.is_some()));
    assert!(dir.path().join("manual_data.txt").exists());
}

#[tokio::test(start_paused = true)]
async fn recording_starts_only_after_the_countdown() {
    let dir = tempfile::tempdir().unwrap();
    let (mut orchestrator, handles) = rig(dir.path(), StopMethod::Manual, 3);
    orchestrator.preview_all().await;

    let control = SessionControl::new();
    let mut phases = orchestrator.subscribe_phase();
    let stopper = control.clone();
    let observed = handles.clone();
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            if let Phase::Countdown { .. } = phase {
                assert_eq!(observed.iter().map(|h| h.count("start_recording")).sum::<usize>(), 0);
            }
            seen.push(phase);
            if phase == Phase::Recording {
                tokio::time::sleep(Duration::from_secs(2)).await;
                stopper.stop();
            }
            if phase == Phase::Previewing {
                break;
            }
        }
        seen
    });

    let started = tokio::time::Instant::now();
    let mut operator = ScriptedOperator::new().name("delayed");
    let outcome = orchestrator.run_session(&mut operator, &control).await.unwrap();
    let SessionOutcome::Completed { session, .. } = outcome else {
        panic!("session did not complete: {outcome:?}");
    };

    // three countdown ticks, then two seconds of recording
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(session.elapsed_seconds(), Some(2));

    let seen = watcher.await.unwrap();
    assert!(seen.contains(&Phase::Countdown { remaining: 3 }));
    assert!(seen.contains(&Phase::Countdown { remaining: 1 }));
    let countdown_end = seen.iter().rposition(|p| matches!(p, Phase::Countdown { .. })).unwrap();
    let recording = seen.iter().position(|p| *p == Phase::Recording).unwrap();
    assert!(countdown_end < recording);
}

#[tokio::test(start_paused = true)]
async fn cancelled_countdown_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let (mut orchestrator, handles) = rig(dir.path(), StopMethod::Manual, 10);
    orchestrator.preview_all().await;

    let control = SessionControl::new();
    let canceller = control.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        canceller.cancel_countdown();
    });

    let mut operator = ScriptedOperator::new().name("aborted");
    let outcome = orchestrator.run_session(&mut operator, &control).await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Cancelled(CancelReason::CountdownCancelled)));
    assert!(handles.iter().all(|h| h.count("start_recording") == 0));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(orchestrator.phase(), Phase::Previewing);
    assert!(orchestrator.cameras().iter().all(CameraAdapter::is_streaming));
}

#[tokio::test]
async fn overwrite_is_asked_once_per_session() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("trial1_camera_1.h264"), b"old").unwrap();
    let (mut orchestrator, handles) = rig(dir.path(), StopMethod::Manual, 0);
    orchestrator.preview_all().await;

    let mut declining = ScriptedOperator::new().name("trial1").overwrite(false);
    let outcome = orchestrator.run_session(&mut declining, &SessionControl::new()).await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Cancelled(CancelReason::OverwriteDeclined)));
    assert_eq!(declining.overwrite_prompts, vec![vec!["trial1_camera_1.h264".to_string()]]);
    assert_eq!(std::fs::read(dir.path().join("trial1_camera_1.h264")).unwrap(), b"old");
    assert!(handles.iter().all(|h| h.count("start_recording") == 0));

    let control = SessionControl::new();
    control.stop();
    let mut accepting = ScriptedOperator::new().name("trial1").overwrite(true);
    let outcome = orchestrator.run_session(&mut accepting, &control).await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));
    assert_eq!(accepting.overwrite_prompts.len(), 1);
    assert_ne!(std::fs::read(dir.path().join("trial1_camera_1.h264")).unwrap(), b"old");
}

#[tokio::test]
async fn failed_second_camera_stops_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let (mut orchestrator, handles) = rig(dir.path(), StopMethod::Manual, 0);
    orchestrator.preview_all().await;
    handles[1].fail("start_recording", 1);

    let mut operator = ScriptedOperator::new().name("broken");
    let result = orchestrator.run_session(&mut operator, &SessionControl::new()).await;
    assert!(matches!(result, Err(RigError::RecordingStart { room: Room::DarkRoom, .. })));

    assert!(handles[0].calls().contains(&CameraCall::StopRecording));
    assert!(!orchestrator.state().is_any_running());
    assert!(!dir.path().join("broken_data.txt").exists());
    assert_eq!(orchestrator.phase(), Phase::Previewing);
    assert!(orchestrator.cameras().iter().all(CameraAdapter::is_streaming));

    // the rig is usable again once the fault clears
    let control = SessionControl::new();
    control.stop();
    let mut operator = ScriptedOperator::new().name("retry");
    let outcome = orchestrator.run_session(&mut operator, &control).await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));
}
