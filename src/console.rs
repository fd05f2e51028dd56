//! Line-oriented operator console.
//!
//! Reads one command per line. While a recording session runs, the console
//! keeps reading: prompts raised by the session (session name, overwrite
//! confirmation) take the next line, `stop`/`cancel` end it, lighting and
//! `status` stay available, and everything that would touch a camera is
//! refused until the rig is previewing again.

use futures::StreamExt;
use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ApplyOutcome;
use crate::lighting::{LightingPanel, RoomLighting};
use crate::orchestrator::{ChannelOperator, Phase, SessionControl, SessionOutcome};
use crate::rig::Rig;
use crate::session::{MAX_DELAY_SECS, RoomStatus, StatusSnapshot};
use crate::stream::{Debounce, DebounceExt};
use crate::types::{CameraId, Room, StopMethod};
use crate::{Result, RigError};

/// Quiet period before staged control edits reach the cameras.
pub const EDIT_DEBOUNCE: Duration = Duration::from_millis(250);

const HELP: &str = "\
Commands:
  status                         rig, session and lighting state
  dir <path>                     set the save directory
  method manual | timer <min>    how recordings end
  delay <0-120>                  countdown before recording, in seconds
  start                          start a recording session
  stop                           stop the recording (or abort the countdown)
  cancel                         abort the countdown
  load <path>                    load and apply a camera configuration file
  save <camera>                  save one camera's controls
  saveas <path>                  save every camera's controls to a new file
  show <camera>                  print a camera's controls
  set <camera> <Control> <value> change a control live
  refresh <camera>               re-read a camera's controls
  swap <a> <b>                   exchange two cameras' controls
  ir <room> on|off               IR lights
  white <room> on|off            white lights
  level <room> <0-100>           white light level
  swaplights                     exchange the rooms' lighting
  diag                           log controls and ranges of every camera
  quit                           stop previews, lights off, exit
";

/// One parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    Dir(PathBuf),
    Method(StopMethod),
    Delay(u32),
    Start,
    Stop,
    Cancel,
    Load(PathBuf),
    Save(CameraId),
    SaveAs(PathBuf),
    Show(CameraId),
    Set { camera: CameraId, control: String, value: String },
    Refresh(CameraId),
    Swap(CameraId, CameraId),
    Ir(Room, bool),
    White(Room, bool),
    Level(Room, u8),
    SwapLights,
    Diag,
    Quit,
}

impl Command {
    /// Commands that work while a session is running.
    pub fn allowed_during_session(&self) -> bool {
        matches!(
            self,
            Command::Help
                | Command::Status
                | Command::Stop
                | Command::Cancel
                | Command::Ir(..)
                | Command::White(..)
                | Command::Level(..)
                | Command::SwapLights
        )
    }
}

fn usage(text: &str) -> RigError {
    RigError::validation(format!("usage: {text}"))
}

fn on_off(word: Option<&str>, text: &str) -> Result<bool> {
    match word.map(str::to_ascii_lowercase).as_deref() {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(usage(text)),
    }
}

impl FromStr for Command {
    type Err = RigError;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(RigError::validation("empty command"));
        };
        let rest: Vec<&str> = words.collect();
        let arg = |i: usize| rest.get(i).copied();
        let path_arg = |text: &str| -> Result<PathBuf> {
            // paths may contain spaces
            let path = rest.join(" ");
            if path.is_empty() { Err(usage(text)) } else { Ok(PathBuf::from(path)) }
        };
        let camera_arg = |i: usize, text: &str| -> Result<CameraId> { arg(i).ok_or_else(|| usage(text))?.parse() };
        let room_arg = |text: &str| -> Result<Room> { arg(0).ok_or_else(|| usage(text))?.parse() };

        let command = match verb.to_ascii_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "status" => Command::Status,
            "dir" => Command::Dir(path_arg("dir <path>")?),
            "method" => match arg(0).map(str::to_ascii_lowercase).as_deref() {
                Some("manual") => Command::Method(StopMethod::Manual),
                Some("timer") => {
                    let minutes = arg(1)
                        .and_then(|m| m.parse::<f64>().ok())
                        .ok_or_else(|| usage("method timer <minutes>"))?;
                    Command::Method(StopMethod::Timer { minutes })
                }
                _ => return Err(usage("method manual | method timer <minutes>")),
            },
            "delay" => {
                let secs = arg(0).and_then(|s| s.parse::<u32>().ok()).ok_or_else(|| usage("delay <0-120>"))?;
                Command::Delay(secs)
            }
            "start" => Command::Start,
            "stop" => Command::Stop,
            "cancel" => Command::Cancel,
            "load" => Command::Load(path_arg("load <path>")?),
            "save" => Command::Save(camera_arg(0, "save <camera>")?),
            "saveas" => Command::SaveAs(path_arg("saveas <path>")?),
            "show" => Command::Show(camera_arg(0, "show <camera>")?),
            "set" => {
                let text = "set <camera> <Control> <value>";
                let camera = camera_arg(0, text)?;
                let control = arg(1).ok_or_else(|| usage(text))?.to_string();
                if rest.len() < 3 {
                    return Err(usage(text));
                }
                Command::Set { camera, control, value: rest[2..].join(" ") }
            }
            "refresh" => Command::Refresh(camera_arg(0, "refresh <camera>")?),
            "swap" => Command::Swap(camera_arg(0, "swap <a> <b>")?, camera_arg(1, "swap <a> <b>")?),
            "ir" => Command::Ir(room_arg("ir <room> on|off")?, on_off(arg(1), "ir <room> on|off")?),
            "white" => Command::White(room_arg("white <room> on|off")?, on_off(arg(1), "white <room> on|off")?),
            "level" => {
                let text = "level <room> <0-100>";
                let room = room_arg(text)?;
                let level = arg(1).and_then(|l| l.parse::<u8>().ok()).filter(|l| *l <= 100).ok_or_else(|| usage(text))?;
                Command::Level(room, level)
            }
            "swaplights" => Command::SwapLights,
            "diag" => Command::Diag,
            "quit" | "exit" => Command::Quit,
            other => return Err(RigError::validation(format!("unknown command '{other}' (try help)"))),
        };
        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

async fn say<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        out.write_all(b"\n").await?;
    }
    out.flush().await
}

fn describe_error(e: &RigError) -> String {
    let mut text = format!("error: {e}");
    for hint in e.recovery_suggestions() {
        let _ = write!(text, "\n  - {hint}");
    }
    text
}

fn lighting_command(lighting: &mut LightingPanel, command: &Command) -> Result<String> {
    fn room_lights(lighting: &mut LightingPanel, room: Room) -> Result<&mut RoomLighting> {
        lighting.room_mut(room).ok_or_else(|| RigError::camera_setup(format!("{room} is not configured")))
    }
    match *command {
        Command::Ir(room, on) => {
            room_lights(lighting, room)?.set_ir(on);
            Ok(format!("{room} IR {}", if on { "on" } else { "off" }))
        }
        Command::White(room, on) => {
            room_lights(lighting, room)?.set_white(on);
            Ok(format!("{room} white {}", if on { "on" } else { "off" }))
        }
        Command::Level(room, level) => {
            room_lights(lighting, room)?.set_level(level);
            Ok(format!("{room} white level {level}%"))
        }
        Command::SwapLights => {
            if lighting.swap() {
                Ok("lighting swapped".to_string())
            } else {
                Err(RigError::camera_setup("swapping lights needs two rooms"))
            }
        }
        _ => Err(RigError::SessionActive),
    }
}

fn render_status(phase: Phase, rooms: &[RoomStatus], lighting: &LightingPanel) -> String {
    let mut out = format!("phase: {phase}\n");
    for status in rooms.iter() {
        let _ = write!(
            out,
            "{:<10} port {}  {:<10} running={}",
            status.room.to_string(),
            status.settings.port,
            status.settings.status.as_deref().unwrap_or("-"),
            status.is_running
        );
        if let Some(start) = status.start_time {
            let _ = write!(out, "  start {}", start.format("%H:%M:%S"));
        }
        if let Some(end) = status.end_time {
            let _ = write!(out, "  end {}", end.format("%H:%M:%S"));
        }
        if let Some(lights) = lighting.state(status.room) {
            let _ = write!(
                out,
                "  ir={} white={} level={}%",
                if lights.ir_on { "on" } else { "off" },
                if lights.white_on { "on" } else { "off" },
                lights.white_level
            );
        }
        out.push('\n');
    }
    out
}

pub struct Console<R, W> {
    rig: Rig,
    input: Lines<R>,
    input_open: bool,
    output: W,
    edits_tx: mpsc::UnboundedSender<()>,
    edits: Pin<Box<Debounce<UnboundedReceiverStream<()>>>>,
    preview_interval: Duration,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(rig: Rig, input: R, output: W) -> Self {
        let (edits_tx, edits_rx) = mpsc::unbounded_channel();
        let edits = Box::pin(UnboundedReceiverStream::new(edits_rx).debounce(EDIT_DEBOUNCE));
        let preview_interval = Duration::from_millis(rig.settings().preview_interval_ms.max(1));
        Self { rig, input: input.lines(), input_open: true, output, edits_tx, edits, preview_interval }
    }

    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    /// Run until `quit` or end of input, then shut the rig down.
    pub async fn run(mut self) -> io::Result<Rig> {
        say(&mut self.output, "duocam ready, type help for commands").await?;
        let mut preview = tokio::time::interval(self.preview_interval);
        preview.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.input_open {
            tokio::select! {
                line = self.input.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("console input failed: {}", e);
                            break;
                        }
                    };
                    if self.handle_line(&line).await? == Flow::Quit {
                        break;
                    }
                }
                Some(()) = self.edits.next() => self.apply_edits().await?,
                _ = preview.tick() => self.rig.orchestrator.preview_tick_all().await,
            }
        }

        if self.rig.config.has_pending_edits() {
            self.apply_edits().await?;
        }
        self.rig.shutdown().await;
        say(&mut self.output, "bye").await?;
        Ok(self.rig)
    }

    async fn apply_edits(&mut self) -> io::Result<()> {
        let results = self.rig.config.apply_staged(self.rig.orchestrator.cameras_mut()).await;
        for (camera, result) in results {
            let text = match result {
                Ok(ApplyOutcome::ControlsPushed) => format!("camera {camera}: controls applied"),
                Ok(ApplyOutcome::Reconfigured) => format!("camera {camera}: stream reconfigured"),
                Err(e) => format!("camera {camera}: {}", describe_error(&e)),
            };
            say(&mut self.output, &text).await?;
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                say(&mut self.output, &describe_error(&e)).await?;
                return Ok(Flow::Continue);
            }
        };
        debug!(?command, "console command");
        if command == Command::Quit {
            return Ok(Flow::Quit);
        }
        if command == Command::Start {
            self.start_session().await?;
            return Ok(Flow::Continue);
        }
        match self.execute(command).await {
            Ok(text) => say(&mut self.output, &text).await?,
            Err(e) => say(&mut self.output, &describe_error(&e)).await?,
        }
        Ok(Flow::Continue)
    }

    /// Run one command while no session is active.
    async fn execute(&mut self, command: Command) -> Result<String> {
        let rig = &mut self.rig;
        match command {
            Command::Help => Ok(HELP.to_string()),
            Command::Status => {
                let params = rig.orchestrator.parameters();
                let mut text = render_status(rig.orchestrator.phase(), rig.orchestrator.state().rooms(), &rig.lighting);
                let _ = write!(
                    text,
                    "save dir: {}\nstop method: {} (timer {})\ndelay: {}s",
                    params.save_dir.as_ref().map(|d| d.display().to_string()).unwrap_or_else(|| "(not set)".into()),
                    params.stop_method,
                    params.stop_method.timer_display(),
                    params.delay_secs
                );
                Ok(text)
            }
            Command::Dir(path) => {
                rig.orchestrator.set_save_dir(&path)?;
                Ok(format!("save directory: {}", path.display()))
            }
            Command::Method(method) => {
                rig.orchestrator.set_stop_method(method)?;
                Ok(format!("stop method: {method} (timer {})", method.timer_display()))
            }
            Command::Delay(secs) => {
                rig.orchestrator.set_delay(secs)?;
                Ok(format!("countdown delay: {secs}s (max {MAX_DELAY_SECS})"))
            }
            Command::Stop | Command::Cancel => Ok("no session is running".to_string()),
            Command::Load(path) => {
                let report = rig.config.load(&path, rig.orchestrator.cameras_mut()).await?;
                let mut text = format!(
                    "loaded {} ({} camera entries)",
                    report.path.display(),
                    report.cameras_in_file.len()
                );
                for (camera, outcome) in &report.applied {
                    let _ = write!(text, "\n  camera {camera}: {outcome:?}");
                }
                for (camera, e) in &report.failed {
                    let _ = write!(text, "\n  camera {camera}: failed: {e}");
                }
                Ok(text)
            }
            Command::Save(id) => {
                let i = camera_index(rig, id)?;
                let path = rig.config.save(&mut rig.orchestrator.cameras_mut()[i]).await?;
                Ok(format!("camera {id} saved to {}", path.display()))
            }
            Command::SaveAs(path) => {
                let count = rig.config.save_as(&path, rig.orchestrator.cameras_mut()).await?;
                Ok(format!("{count} cameras saved to {}", path.display()))
            }
            Command::Show(id) => {
                let i = camera_index(rig, id)?;
                let controls = rig.config.gather(&mut rig.orchestrator.cameras_mut()[i]).await;
                Ok(serde_json::to_string_pretty(&controls.to_json())?)
            }
            Command::Set { camera, control, value } => {
                camera_index(rig, camera)?;
                rig.config.stage(camera, &control, &value)?;
                // the receiver lives as long as the console
                let _ = self.edits_tx.send(());
                Ok(format!("camera {camera}: {control} = {value}"))
            }
            Command::Refresh(id) => {
                let i = camera_index(rig, id)?;
                let view = rig.config.refresh(&mut rig.orchestrator.cameras_mut()[i]).await;
                Ok(serde_json::to_string_pretty(&view.to_json())?)
            }
            Command::Swap(a, b) => {
                rig.config.swap(a, b, rig.orchestrator.cameras_mut()).await?;
                Ok(format!("cameras {a} and {b} swapped"))
            }
            Command::Diag => {
                let cameras = rig.diagnostics().await;
                let config = rig.config.diagnostics();
                let mut text = format!(
                    "config: loaded={} default={} pending={:?}",
                    config.loaded_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".into()),
                    config.default_path.display(),
                    config.pending_edits
                );
                for camera in cameras {
                    let fps = camera.ranges.fps_range();
                    let _ = write!(
                        text,
                        "\n{} camera {} [{}]: {} ranges, fps {}..{} (default {})",
                        camera.room,
                        camera.camera,
                        camera.backend,
                        camera.ranges.0.len(),
                        fps.min,
                        fps.max,
                        fps.default
                    );
                }
                Ok(text)
            }
            lights @ (Command::Ir(..) | Command::White(..) | Command::Level(..) | Command::SwapLights) => {
                lighting_command(&mut rig.lighting, &lights)
            }
            Command::Start | Command::Quit => Ok(String::new()),
        }
    }

    /// Drive a recording session while still reading operator input.
    async fn start_session(&mut self) -> io::Result<()> {
        if self.rig.config.has_pending_edits() {
            self.apply_edits().await?;
        }

        let (prompt_tx, mut prompts) = mpsc::channel(1);
        let mut operator = ChannelOperator::new(prompt_tx);
        let control = SessionControl::new();
        let phase = self.rig.orchestrator.subscribe_phase();
        let status = self.rig.orchestrator.subscribe_status();

        let Rig { orchestrator, lighting, .. } = &mut self.rig;
        let input = &mut self.input;
        let input_open = &mut self.input_open;
        let output = &mut self.output;

        let session = orchestrator.run_session(&mut operator, &control);
        tokio::pin!(session);
        let mut pending: Option<oneshot::Sender<String>> = None;

        let result = loop {
            // session first so a prompt is always registered before the line answering it is read
            tokio::select! {
                biased;
                result = &mut session => break result,
                Some(prompt) = prompts.recv() => {
                    say(output, &prompt.question).await?;
                    pending = Some(prompt.reply);
                }
                line = input.next_line(), if *input_open => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) | Err(_) => {
                            // no more input: end the session cleanly
                            *input_open = false;
                            pending = None;
                            control.stop();
                            continue;
                        }
                    };
                    if let Some(reply) = pending.take() {
                        let _ = reply.send(line);
                        continue;
                    }
                    let text = session_command(&line, &control, &phase, &status, lighting);
                    if !text.is_empty() {
                        say(output, &text).await?;
                    }
                }
            }
        };

        let text = match result {
            Ok(SessionOutcome::Cancelled(reason)) => format!("session cancelled: {reason:?}"),
            Ok(SessionOutcome::Completed { session, stopped_by, report }) => {
                info!(session = %session.name, ?stopped_by, "session complete");
                let mut text = format!(
                    "session '{}' stopped ({:?}) after {}s",
                    session.name,
                    stopped_by,
                    session.elapsed_seconds().unwrap_or(0)
                );
                match report {
                    Some(path) => {
                        let _ = write!(text, "\nreport: {}", path.display());
                    }
                    None => text.push_str("\nreport could not be written, see log"),
                }
                text
            }
            Err(e) => describe_error(&e),
        };
        say(&mut self.output, &text).await
    }
}

fn camera_index(rig: &Rig, id: CameraId) -> Result<usize> {
    rig.orchestrator
        .cameras()
        .iter()
        .position(|c| c.id() == id)
        .ok_or_else(|| RigError::UnknownCamera { camera: id.key() })
}

/// Handle one line typed while a session runs.
fn session_command(
    line: &str,
    control: &SessionControl,
    phase: &watch::Receiver<Phase>,
    status: &watch::Receiver<StatusSnapshot>,
    lighting: &mut LightingPanel,
) -> String {
    if line.trim().is_empty() {
        return String::new();
    }
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => return describe_error(&e),
    };
    if !command.allowed_during_session() {
        return describe_error(&RigError::SessionActive);
    }
    match command {
        Command::Stop => {
            control.stop();
            "stopping".to_string()
        }
        Command::Cancel => {
            control.cancel_countdown();
            "cancelling countdown".to_string()
        }
        Command::Help => HELP.to_string(),
        Command::Status => {
            let rooms = status.borrow().clone();
            render_status(*phase.borrow(), &rooms, lighting)
        }
        lights => lighting_command(lighting, &lights).unwrap_or_else(|e| describe_error(&e)),
    }
}
