//! Per-camera control configuration: load, live edits, save and swap.
//!
//! [`ConfigStore`] keeps the operator's view of every camera's controls (the
//! "applied" set) and is the only place that decides whether a change can be
//! pushed to a running camera or needs a stream reconfiguration.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::camera::CameraAdapter;
use crate::controls::{ControlSet, DEFAULT_SCALER_CROP, Resolution};
use crate::types::CameraId;
use crate::{Result, RigError};

pub mod validation;

pub use validation::{ConfigMap, config_to_json, parse_config, validate_config};

/// File name used when no configuration has been loaded.
pub const DEFAULT_CONFIG_FILENAME: &str = "default_config.json";

/// How a set of controls reached a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Pushed to the running stream.
    ControlsPushed,
    /// The stream was stopped, reconfigured at a new size and restarted.
    Reconfigured,
}

/// Result of loading a configuration file.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub path: PathBuf,
    /// Camera IDs present in the file.
    pub cameras_in_file: Vec<String>,
    pub applied: Vec<(CameraId, ApplyOutcome)>,
    pub failed: Vec<(CameraId, RigError)>,
}

#[derive(Debug, Clone)]
struct LoadedConfig {
    path: PathBuf,
    data: ConfigMap,
}

/// Snapshot of the store for the `diag` command.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDiagnostics {
    pub loaded_path: Option<PathBuf>,
    pub loaded_cameras: Vec<String>,
    pub default_path: PathBuf,
    pub pending_edits: Vec<CameraId>,
    pub applied: BTreeMap<CameraId, ControlSet>,
}

pub struct ConfigStore {
    default_path: PathBuf,
    scaler_crop: [i64; 4],
    loaded: Option<LoadedConfig>,
    applied: BTreeMap<CameraId, ControlSet>,
    last_applied_resolution: HashMap<CameraId, Resolution>,
    dirty: BTreeSet<CameraId>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILENAME)
    }
}

impl ConfigStore {
    pub fn new(default_path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: default_path.into(),
            scaler_crop: DEFAULT_SCALER_CROP,
            loaded: None,
            applied: BTreeMap::new(),
            last_applied_resolution: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn with_scaler_crop(mut self, crop: [i64; 4]) -> Self {
        self.scaler_crop = crop;
        self
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    pub fn loaded_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.path.as_path())
    }

    /// The operator's current controls for `id`.
    pub fn applied(&self, id: CameraId) -> Option<&ControlSet> {
        self.applied.get(&id)
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Load and apply a configuration file.
    ///
    /// The whole file is validated first; any error leaves every camera
    /// untouched. Cameras whose ID is absent from the file are skipped.
    pub async fn load(&mut self, path: impl AsRef<Path>, cameras: &mut [CameraAdapter]) -> Result<LoadReport> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RigError::file_error(path, e))?;
        let data = parse_config(&text)?;
        info!(path = %path.display(), cameras = data.len(), "configuration loaded");

        let mut report = LoadReport {
            path: path.to_path_buf(),
            cameras_in_file: data.keys().cloned().collect(),
            ..Default::default()
        };
        for camera in cameras.iter_mut() {
            let id = camera.id();
            let Some(controls) = data.get(&id.key()) else {
                debug!(camera = %id, "no entry in configuration file");
                continue;
            };
            self.applied.entry(id).or_default().merge(controls);
            match self.apply_to(camera, controls).await {
                Ok(outcome) => report.applied.push((id, outcome)),
                Err(e) => {
                    warn!(camera = %id, "failed to apply configuration: {}", e);
                    report.failed.push((id, e));
                }
            }
        }

        self.loaded = Some(LoadedConfig { path: path.to_path_buf(), data });
        Ok(report)
    }

    /// Load the default configuration file if it exists. Failures are logged.
    pub async fn auto_load(&mut self, cameras: &mut [CameraAdapter]) -> Option<LoadReport> {
        if !self.default_path.exists() {
            debug!(path = %self.default_path.display(), "no default configuration");
            return None;
        }
        let path = self.default_path.clone();
        match self.load(&path, cameras).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(path = %path.display(), "could not auto-load configuration: {}", e);
                None
            }
        }
    }

    /// Push `controls` to one camera, reconfiguring only for a new size.
    pub async fn apply_to(&mut self, camera: &mut CameraAdapter, controls: &ControlSet) -> Result<ApplyOutcome> {
        let id = camera.id();
        let runtime = controls.without_resolution();
        match controls.resolution {
            Some(size) if self.needs_reconfigure(camera, size) => {
                camera.reconfigure(size, &runtime).await?;
                self.last_applied_resolution.insert(id, size);
                Ok(ApplyOutcome::Reconfigured)
            }
            requested => {
                if !runtime.is_empty() {
                    camera.set_controls(&runtime).await?;
                }
                if let Some(size) = requested {
                    self.last_applied_resolution.insert(id, size);
                }
                Ok(ApplyOutcome::ControlsPushed)
            }
        }
    }

    fn needs_reconfigure(&self, camera: &CameraAdapter, size: Resolution) -> bool {
        let current = self
            .last_applied_resolution
            .get(&camera.id())
            .copied()
            .or_else(|| camera.current_size());
        current != Some(size)
    }

    /// Record a live edit. It reaches the camera on the next [`apply_staged`].
    ///
    /// [`apply_staged`]: ConfigStore::apply_staged
    pub fn stage(&mut self, id: CameraId, control: &str, value: &str) -> Result<()> {
        let mut edited = self.applied.get(&id).cloned().unwrap_or_default();
        edited.set_named(control, value)?;
        self.applied.insert(id, edited);
        self.dirty.insert(id);
        Ok(())
    }

    /// Apply every staged edit to its camera.
    pub async fn apply_staged(&mut self, cameras: &mut [CameraAdapter]) -> Vec<(CameraId, Result<ApplyOutcome>)> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut results = Vec::with_capacity(dirty.len());
        for id in dirty {
            let Some(camera) = cameras.iter_mut().find(|c| c.id() == id) else {
                results.push((id, Err(RigError::UnknownCamera { camera: id.key() })));
                continue;
            };
            let mut controls = self.applied.get(&id).cloned().unwrap_or_default();
            controls.scaler_crop = Some(self.scaler_crop);
            let result = self.apply_to(camera, &controls).await;
            if let Err(e) = &result {
                warn!(camera = %id, "live update failed: {}", e);
            }
            results.push((id, result));
        }
        results
    }

    /// Full control snapshot for one camera, as it would be saved.
    ///
    /// Live driver values are overlaid with the operator's controls. The
    /// gain is included only when the operator enabled it, and `ScalerCrop`
    /// is always injected.
    pub async fn gather(&self, camera: &mut CameraAdapter) -> ControlSet {
        let id = camera.id();
        let mut controls = match camera.get_controls().await {
            Ok(live) => ControlSet { extra: Default::default(), ..live },
            Err(e) => {
                debug!(camera = %id, "could not read live controls: {}", e);
                ControlSet::default()
            }
        };
        let applied = self.applied.get(&id);
        controls.analogue_gain = None;
        if let Some(applied) = applied {
            controls.merge(applied);
        }
        if controls.resolution.is_none() {
            controls.resolution = self
                .last_applied_resolution
                .get(&id)
                .copied()
                .or_else(|| camera.requested_size())
                .or_else(|| camera.current_size());
        }
        controls.scaler_crop = Some(self.scaler_crop);
        controls
    }

    /// Save one camera's snapshot into the loaded file, or the default file.
    ///
    /// Other cameras' entries in the target are preserved; a target that
    /// cannot be read as a JSON object is replaced.
    pub async fn save(&self, camera: &mut CameraAdapter) -> Result<PathBuf> {
        let target = self
            .loaded
            .as_ref()
            .map(|l| l.path.clone())
            .filter(|p| p.exists())
            .unwrap_or_else(|| self.default_path.clone());

        let mut data = validation::read_object_lenient(&target);
        let controls = self.gather(camera).await;
        data.insert(camera.id().key(), controls.to_json());
        validation::write_object(&target, data)?;
        info!(camera = %camera.id(), path = %target.display(), "configuration saved");
        Ok(target)
    }

    /// Write every camera's snapshot to a new file.
    pub async fn save_as(&self, path: impl AsRef<Path>, cameras: &mut [CameraAdapter]) -> Result<usize> {
        let path = path.as_ref();
        if cameras.is_empty() {
            return Err(RigError::validation("no camera settings to save"));
        }
        let mut data = serde_json::Map::new();
        for camera in cameras.iter_mut() {
            let controls = self.gather(camera).await;
            data.insert(camera.id().key(), controls.to_json());
        }
        let count = data.len();
        validation::write_object(path, data)?;
        info!(path = %path.display(), cameras = count, "configuration saved");
        Ok(count)
    }

    /// Exchange the full control snapshots of two cameras and push each.
    ///
    /// Swapping the same pair twice restores the original snapshots. The
    /// stored snapshots only change once both cameras accepted theirs; if the
    /// second push fails the first camera is put back.
    pub async fn swap(&mut self, a: CameraId, b: CameraId, cameras: &mut [CameraAdapter]) -> Result<()> {
        if a == b {
            return Ok(());
        }
        let ia = position(cameras, a)?;
        let ib = position(cameras, b)?;

        let snapshot_a = self.gather(&mut cameras[ia]).await;
        let snapshot_b = self.gather(&mut cameras[ib]).await;

        self.apply_to(&mut cameras[ia], &snapshot_b).await?;
        if let Err(e) = self.apply_to(&mut cameras[ib], &snapshot_a).await {
            if let Err(restore) = self.apply_to(&mut cameras[ia], &snapshot_a).await {
                warn!(camera = %a, "could not restore controls after a failed swap: {}", restore);
            }
            return Err(e);
        }

        self.applied.insert(a, snapshot_b);
        self.applied.insert(b, snapshot_a);
        self.dirty.remove(&a);
        self.dirty.remove(&b);
        info!(%a, %b, "camera settings swapped");
        Ok(())
    }

    /// Rebuild the operator view of one camera from its sources.
    ///
    /// Precedence, lowest first: live driver values, the active stream size,
    /// the default configuration file, then the loaded file.
    pub async fn refresh(&mut self, camera: &mut CameraAdapter) -> ControlSet {
        let id = camera.id();
        let mut view = match camera.get_controls().await {
            Ok(live) => live,
            Err(e) => {
                warn!(camera = %id, "could not read live controls: {}", e);
                ControlSet::default()
            }
        };
        if let Some(size) = camera.current_size() {
            view.resolution = Some(size);
        }
        if let Some(defaults) = file_entry(&self.default_path, id) {
            view.fill_missing(&defaults);
        }
        if let Some(loaded) = self.loaded.as_ref().and_then(|l| file_entry(&l.path, id)) {
            view.merge(&loaded);
        }
        self.applied.insert(id, view.clone());
        self.dirty.remove(&id);
        view
    }

    pub fn diagnostics(&self) -> ConfigDiagnostics {
        ConfigDiagnostics {
            loaded_path: self.loaded.as_ref().map(|l| l.path.clone()),
            loaded_cameras: self.loaded.as_ref().map(|l| l.data.keys().cloned().collect()).unwrap_or_default(),
            default_path: self.default_path.clone(),
            pending_edits: self.dirty.iter().copied().collect(),
            applied: self.applied.clone(),
        }
    }
}

fn position(cameras: &[CameraAdapter], id: CameraId) -> Result<usize> {
    cameras
        .iter()
        .position(|c| c.id() == id)
        .ok_or_else(|| RigError::UnknownCamera { camera: id.key() })
}

/// One camera's entry from a configuration file on disk, if readable.
fn file_entry(path: &Path, id: CameraId) -> Option<ControlSet> {
    let data = validation::read_object_lenient(path);
    match data.get(&id.key()) {
        Some(Value::Object(entry)) => ControlSet::from_json(&id.key(), entry)
            .inspect_err(|e| debug!(path = %path.display(), camera = %id, "ignoring entry: {}", e))
            .ok(),
        _ => None,
    }
}
