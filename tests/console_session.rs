//! A full operator session typed into the console

use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

use duocam::console::Console;
use duocam::{Rig, RigSettings, Room};

#[tokio::test(start_paused = true)]
async fn timed_session_from_the_console() {
    let dir = tempfile::tempdir().unwrap();
    let settings = RigSettings { config_file: dir.path().join("default_config.json"), ..Default::default() };
    let mut rig = Rig::from_settings(settings).await.unwrap();
    rig.start().await;

    let (mut keyboard, input) = tokio::io::duplex(4096);
    let script = format!("dir {}\nmethod timer 0.1\ndelay 2\nstart\ntrial1\n", dir.path().display());
    let typist = tokio::spawn(async move {
        keyboard.write_all(script.as_bytes()).await.unwrap();
        // mid-recording: countdown ends at 2s, the timer at 8s
        tokio::time::sleep(Duration::from_secs(4)).await;
        keyboard.write_all(b"ir dark off\nset 0 Brightness 0.5\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;
        keyboard.write_all(b"status\nquit\n").await.unwrap();
        keyboard
    });

    let mut output = Vec::new();
    let rig = Console::new(rig, BufReader::new(input), &mut output).run().await.unwrap();
    drop(typist.await.unwrap());
    let output = String::from_utf8(output).unwrap();

    assert!(output.contains("stop method: Timer (timer 00:06)"), "{output}");
    assert!(output.contains("countdown delay: 2s"));
    assert!(output.contains("Session name (empty to cancel):"));
    assert!(output.contains("DarkRoom IR off"));
    assert!(output.contains("A recording session is already active"), "{output}");
    assert!(output.contains("session 'trial1' stopped (Timer) after 6s"), "{output}");
    assert!(output.contains("phase: previewing"));
    assert!(output.trim_end().ends_with("bye"));

    for file in ["trial1_camera_1.h264", "trial1_camera_2.h264", "trial1_data.txt"] {
        assert!(dir.path().join(file).exists(), "{file} missing");
    }
    let report = std::fs::read_to_string(dir.path().join("trial1_data.txt")).unwrap();
    assert!(report.contains("Total Duration: 00:00:06"));
    assert!(report.contains("Recording Delay (Countdown): 2 seconds"));

    // quitting shuts everything down
    assert!(rig.orchestrator.cameras().iter().all(|c| !c.is_streaming()));
    assert_eq!(rig.lighting.state(Room::DarkRoom).map(|s| s.ir_on), Some(false));
}

#[tokio::test]
async fn end_of_input_during_a_prompt_cancels_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let settings = RigSettings { config_file: dir.path().join("default_config.json"), ..Default::default() };
    let rig = Rig::from_settings(settings).await.unwrap();

    let script = format!("dir {}\nstart\n", dir.path().display());
    let mut output = Vec::new();
    let rig = Console::new(rig, script.as_bytes(), &mut output).run().await.unwrap();
    let output = String::from_utf8(output).unwrap();

    assert!(output.contains("session cancelled: NoSessionName"), "{output}");
    assert!(!rig.orchestrator.state().is_any_running());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
