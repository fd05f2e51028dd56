//! Camera backend driving the `rpicam-apps` command line tools.
//!
//! Preview runs `rpicam-hello` with its own window; recording runs
//! `rpicam-vid` writing a raw H.264 elementary stream. The tools cannot
//! change controls on a running process, so [`CameraDevice::set_controls`]
//! restarts the preview process with the new arguments.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{CameraDevice, Encoder, Frame, StreamConfig, StreamPurpose};
use crate::controls::{ControlRange, ControlRanges, ControlSet, Resolution};
use crate::{Result, RigError};

/// How long a tool gets to flush its output after SIGINT before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Full pixel array of the IMX708, the frame of reference for `ScalerCrop`.
const SENSOR_SIZE: Resolution = Resolution { width: 4608, height: 2592 };

/// Tool paths for the rpicam backend.
#[derive(Debug, Clone)]
pub struct RpicamTools {
    pub vid: PathBuf,
    pub hello: PathBuf,
}

impl Default for RpicamTools {
    fn default() -> Self {
        Self { vid: PathBuf::from("rpicam-vid"), hello: PathBuf::from("rpicam-hello") }
    }
}

pub struct RpicamCamera {
    index: u32,
    tools: RpicamTools,
    ranges: ControlRanges,
    config: Option<StreamConfig>,
    controls: ControlSet,
    child: Option<Child>,
    recording: bool,
}

impl RpicamCamera {
    pub fn new(index: u32, tools: RpicamTools) -> Self {
        Self {
            index,
            tools,
            ranges: Self::imx708_ranges(),
            config: None,
            controls: ControlSet::default(),
            child: None,
            recording: false,
        }
    }

    /// Camera indices reported by `rpicam-hello --list-cameras`.
    pub async fn list_cameras(hello: &Path) -> Result<Vec<u32>> {
        let output = Command::new(hello)
            .arg("--list-cameras")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RigError::hardware("*", "list_cameras", e))?;
        // The tool prints its list on stdout or stderr depending on version
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_camera_list(&text))
    }

    fn imx708_ranges() -> ControlRanges {
        let mut ranges = ControlRanges::default();
        ranges.insert("FrameDurationLimits", ControlRange::new(8_333.0, 1_000_000.0, Some(33_333.0)));
        ranges.insert("ExposureTime", ControlRange::new(26.0, 1_000_000.0, Some(20_000.0)));
        ranges.insert("AnalogueGain", ControlRange::new(1.0, 16.0, Some(1.0)));
        ranges.insert("LensPosition", ControlRange::new(0.0, 15.0, Some(1.0)));
        ranges.insert("Brightness", ControlRange::new(-1.0, 1.0, Some(0.0)));
        ranges.insert("Saturation", ControlRange::new(0.0, 32.0, Some(1.0)));
        ranges.insert("Contrast", ControlRange::new(0.0, 32.0, Some(1.0)));
        ranges.insert("Sharpness", ControlRange::new(0.0, 16.0, Some(1.0)));
        ranges
    }

    fn spawn(&self, program: &Path, args: Vec<String>, operation: &'static str) -> Result<Child> {
        debug!(camera = self.index, program = %program.display(), ?args, "spawning rpicam tool");
        Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RigError::hardware(self.index.to_string(), operation, e))
    }

    fn stream_args(&self, config: &StreamConfig) -> Vec<String> {
        let mut args = vec![
            "--camera".to_string(),
            self.index.to_string(),
            "-t".to_string(),
            "0".to_string(),
            "--width".to_string(),
            config.size.width.to_string(),
            "--height".to_string(),
            config.size.height.to_string(),
        ];
        let mut controls = config.controls.clone();
        controls.merge(&self.controls);
        args.extend(control_args(&controls));
        args
    }

    /// Stop the running tool, letting it close its output first.
    ///
    /// The tool is interrupted with SIGINT, which makes `rpicam-vid` flush
    /// the encoder and close the file. It is killed only if it is still
    /// running after [`STOP_GRACE`].
    async fn stop_child(&mut self, operation: &'static str) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let hardware = |e: std::io::Error| RigError::hardware(self.index.to_string(), operation, e);
        if interrupt(&child) {
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(status) => {
                    let status = status.map_err(hardware)?;
                    debug!(camera = self.index, %status, "rpicam tool exited");
                    return Ok(());
                }
                Err(_) => warn!(camera = self.index, grace = ?STOP_GRACE, "rpicam tool ignored SIGINT, killing it"),
            }
        }
        if child.id().is_none() {
            return Ok(());
        }
        child.kill().await.map_err(hardware)
    }

    fn unconfigured(&self, operation: &'static str) -> RigError {
        RigError::hardware(self.index.to_string(), operation, "camera has not been configured")
    }
}

/// Send SIGINT to a child that has not been reaped yet.
#[cfg(unix)]
fn interrupt(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: `pid` is our own unreaped child, so it cannot have been reused.
    unsafe { libc::kill(pid, libc::SIGINT) == 0 }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> bool {
    false
}

/// `ScalerCrop` as the normalised `x,y,w,h` that `--roi` expects.
fn roi(crop: [i64; 4]) -> String {
    let [x, y, w, h] = crop;
    let (sw, sh) = (f64::from(SENSOR_SIZE.width), f64::from(SENSOR_SIZE.height));
    let norm = |v: i64, full: f64| (v as f64 / full).clamp(0.0, 1.0);
    format!("{:.4},{:.4},{:.4},{:.4}", norm(x, sw), norm(y, sh), norm(w, sw), norm(h, sh))
}

/// Translate controls into `rpicam-apps` options.
pub fn control_args(controls: &ControlSet) -> Vec<String> {
    let mut args = Vec::new();
    let mut push = |flag: &str, value: String| {
        args.push(flag.to_string());
        args.push(value);
    };
    if let Some(fps) = controls.frame_rate() {
        push("--framerate", fps.to_string());
    }
    if let Some(shutter) = controls.exposure_time {
        push("--shutter", shutter.to_string());
    }
    if let Some(gain) = controls.analogue_gain {
        push("--gain", gain.to_string());
    }
    if let Some(lens) = controls.lens_position {
        push("--autofocus-mode", "manual".to_string());
        push("--lens-position", lens.to_string());
    }
    if let Some(v) = controls.brightness {
        push("--brightness", v.to_string());
    }
    if let Some(v) = controls.contrast {
        push("--contrast", v.to_string());
    }
    if let Some(v) = controls.saturation {
        push("--saturation", v.to_string());
    }
    if let Some(v) = controls.sharpness {
        push("--sharpness", v.to_string());
    }
    if let Some(crop) = controls.scaler_crop {
        push("--roi", roi(crop));
    }
    args
}

/// Pull camera indices out of `--list-cameras` output.
///
/// Camera lines look like `0 : imx708 [4608x2592 10-bit RGGB] (/base/...)`.
pub fn parse_camera_list(text: &str) -> Vec<u32> {
    text.lines()
        .filter_map(|line| {
            let (index, rest) = line.trim().split_once(':')?;
            if rest.trim().is_empty() {
                return None;
            }
            index.trim().parse::<u32>().ok()
        })
        .collect()
}

#[async_trait::async_trait]
impl CameraDevice for RpicamCamera {
    fn backend(&self) -> &'static str {
        "rpicam"
    }

    async fn configure(&mut self, config: StreamConfig) -> Result<()> {
        if self.child.is_some() {
            return Err(RigError::hardware(
                self.index.to_string(),
                "configure",
                "camera must be stopped before configuring",
            ));
        }
        self.controls.merge(&config.controls.without_resolution());
        self.config = Some(config);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let config = self.config.as_ref().ok_or_else(|| self.unconfigured("start"))?;
        let args = self.stream_args(config);
        let program = self.tools.hello.clone();
        self.child = Some(self.spawn(&program, args, "start")?);
        info!(camera = self.index, "rpicam preview started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.recording = false;
        self.stop_child("stop").await
    }

    async fn start_recording(&mut self, encoder: Encoder, path: &Path) -> Result<()> {
        let config = self.config.as_ref().ok_or_else(|| self.unconfigured("start_recording"))?;
        if config.purpose != StreamPurpose::Video {
            warn!(camera = self.index, "recording with a preview configuration");
        }
        let mut args = self.stream_args(config);
        args.extend(["--nopreview".to_string(), "--codec".to_string(), "h264".to_string()]);
        if let Some(bitrate) = encoder.bitrate {
            args.extend(["--bitrate".to_string(), bitrate.to_string()]);
        }
        args.extend(["-o".to_string(), path.display().to_string()]);

        self.stop_child("start_recording").await?;
        let program = self.tools.vid.clone();
        self.child = Some(self.spawn(&program, args, "start_recording")?);
        self.recording = true;
        info!(camera = self.index, path = %path.display(), "rpicam recording started");
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<()> {
        if !self.recording {
            return Ok(());
        }
        self.recording = false;
        self.stop_child("stop_recording").await
    }

    async fn capture_array(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }

    async fn set_controls(&mut self, controls: &ControlSet) -> Result<()> {
        self.controls.merge(&controls.without_resolution());
        if self.recording {
            warn!(camera = self.index, "controls change takes effect after the recording");
            return Ok(());
        }
        if self.child.is_some() {
            self.stop_child("set_controls").await?;
            self.start().await?;
        }
        Ok(())
    }

    async fn get_controls(&mut self) -> Result<ControlSet> {
        let mut controls = self.controls.clone();
        if controls.frame_duration_limits.is_none() {
            let fd = self.ranges.get("FrameDurationLimits").and_then(|r| r.default).unwrap_or(33_333.0);
            controls.frame_duration_limits = Some(vec![fd as i64, fd as i64]);
        }
        Ok(controls)
    }

    fn camera_controls(&self) -> &ControlRanges {
        &self.ranges
    }

    fn camera_configuration(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    fn is_started(&self) -> bool {
        self.child.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_cameras_output() {
        let text = "Available cameras\n-----------------\n\
            0 : imx708 [4608x2592 10-bit RGGB] (/base/axi/pcie@120000/rp1/i2c@88000/imx708@1a)\n    \
            Modes: 'SRGGB10_CSI2P' : 1536x864 [120.13 fps - (768, 432)/3072x1728 crop]\n\
            1 : imx708 [4608x2592 10-bit RGGB] (/base/axi/pcie@120000/rp1/i2c@80000/imx708@1a)\n";
        assert_eq!(parse_camera_list(text), vec![0, 1]);
        assert!(parse_camera_list("No cameras available!").is_empty());
    }

    #[test]
    fn control_args_map_to_tool_options() {
        let controls = ControlSet {
            frame_duration_limits: Some(vec![40_000, 40_000]),
            exposure_time: Some(10_000),
            lens_position: Some(2.5),
            ..Default::default()
        };
        let args = control_args(&controls);
        assert_eq!(
            args,
            vec![
                "--framerate",
                "25",
                "--shutter",
                "10000",
                "--autofocus-mode",
                "manual",
                "--lens-position",
                "2.5"
            ]
        );
        assert!(control_args(&ControlSet::default()).is_empty());
    }

    #[test]
    fn scaler_crop_becomes_a_normalised_roi() {
        let controls = ControlSet { scaler_crop: Some([1152, 648, 2304, 1296]), ..Default::default() };
        assert_eq!(control_args(&controls), vec!["--roi", "0.2500,0.2500,0.5000,0.5000"]);

        let full = ControlSet { scaler_crop: Some([0, 0, 4608, 2592]), ..Default::default() };
        assert_eq!(control_args(&full), vec!["--roi", "0.0000,0.0000,1.0000,1.0000"]);
    }

    /// A stand-in for `rpicam-vid` that only writes its output once interrupted.
    #[cfg(unix)]
    fn flushing_tool(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-rpicam-vid");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             for out; do :; done\n\
             trap 'echo flushed > \"$out\"; exit 0' INT\n\
             touch \"$out.ready\"\n\
             while :; do sleep 0.05; done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_recording_lets_the_tool_flush() {
        let dir = tempfile::tempdir().unwrap();
        let tools = RpicamTools { vid: flushing_tool(dir.path()), hello: PathBuf::from("true") };
        let mut cam = RpicamCamera::new(0, tools);
        cam.configure(StreamConfig::video(Resolution::new(1280, 720), ControlSet::default())).await.unwrap();

        let out = dir.path().join("clip.h264");
        cam.start_recording(Encoder::default(), &out).await.unwrap();
        let ready = dir.path().join("clip.h264.ready");
        tokio::time::timeout(Duration::from_secs(5), async {
            while !ready.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cam.stop_recording().await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "flushed");
        assert!(!cam.is_started());
    }

    #[tokio::test]
    async fn start_without_configuration_fails() {
        let mut cam = RpicamCamera::new(0, RpicamTools::default());
        assert!(matches!(cam.start().await, Err(RigError::Hardware { operation: "start", .. })));
        assert_eq!(cam.capture_array().await.unwrap(), None);
    }
}
