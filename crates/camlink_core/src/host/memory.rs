//! In-memory source and destination hosts.
//!
//! [`InMemorySource`] evaluates keyframed cameras described in a JSON scene
//! file; [`InMemorySink`] records stages, actors and timeline containers the
//! way an editor host would. Both back the `camlink` binary and the tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use camlink_math::XformComponents;
use serde::{Deserialize, Serialize};

use super::{ActorId, CameraNode, CameraSink, CameraSource, ContainerId, StageBinding, StageId, TimelineSettings};
use crate::camera::LensAttributes;
use crate::error::{CameraLinkError, Result};
use crate::units::Resolution;
use crate::usd::{read_layer, PrimKind, UsdLayer};

/// Last `|`-separated component of a node path.
fn short_name(path: &str) -> &str {
    path.rsplit('|').next().unwrap_or(path)
}

/// A keyframe on a scene camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraKey {
    pub frame: f64,

    #[serde(default)]
    pub xform: XformComponents,

    #[serde(default)]
    pub lens: LensAttributes,
}

/// A camera transform/shape pair with its keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneCamera {
    /// Full transform path, e.g. `|rig|shotCam`
    pub transform: String,

    /// Shape path; defaults to `<transform>|<name>Shape`
    #[serde(default)]
    pub shape: Option<String>,

    #[serde(default)]
    pub keys: Vec<CameraKey>,
}

impl SceneCamera {
    pub fn shape_path(&self) -> String {
        self.shape
            .clone()
            .unwrap_or_else(|| format!("{}|{}Shape", self.transform, short_name(&self.transform)))
    }

    fn matches(&self, name: &str) -> bool {
        let shape = self.shape_path();
        self.transform == name || short_name(&self.transform) == name || shape == name || short_name(&shape) == name
    }

    /// Linearly interpolated state at `time`, held outside the keyed range.
    fn evaluate(&self, time: f64) -> (XformComponents, LensAttributes) {
        let keys = &self.keys;
        let idx = keys.partition_point(|k| k.frame <= time);

        match (idx.checked_sub(1).and_then(|i| keys.get(i)), keys.get(idx)) {
            (None, None) => (XformComponents::default(), LensAttributes::default()),
            (Some(a), None) => (a.xform, a.lens),
            (None, Some(b)) => (b.xform, b.lens),
            (Some(a), Some(b)) => {
                let t = (time - a.frame) / (b.frame - a.frame);
                (a.xform.lerp(&b.xform, t), a.lens.lerp(&b.lens, t))
            }
        }
    }
}

/// Playback range of a source scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRange {
    pub start: i64,
    pub end: i64,
}

/// A source scene as stored in JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceScene {
    /// Scene linear unit name (`cm`, `m`, `inch`, ...)
    pub linear_unit: String,

    /// Time unit name (`film`, `ntsc`, `30fps`, ...)
    pub time_unit: String,

    pub resolution: Resolution,
    pub playback: PlaybackRange,
    pub current_time: f64,

    /// Selected node, used when no camera is named
    pub selection: Option<String>,

    pub cameras: Vec<SceneCamera>,

    /// Non-camera transform nodes
    pub nodes: Vec<String>,
}

impl Default for SourceScene {
    fn default() -> Self {
        Self {
            linear_unit: "cm".to_string(),
            time_unit: "film".to_string(),
            resolution: Resolution::new(1920, 1080),
            playback: PlaybackRange { start: 1, end: 100 },
            current_time: 1.0,
            selection: None,
            cameras: Vec::new(),
            nodes: Vec::new(),
        }
    }
}

/// Keyframe-evaluating source host.
#[derive(Clone, Debug)]
pub struct InMemorySource {
    scene: SourceScene,
    current_time: f64,
}

impl InMemorySource {
    pub fn new(mut scene: SourceScene) -> Self {
        for camera in &mut scene.cameras {
            camera.keys.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        }
        let current_time = scene.current_time;
        Self { scene, current_time }
    }

    /// Parse a JSON scene description.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let scene: SourceScene = serde_json::from_str(json)?;
        Ok(Self::new(scene))
    }

    /// Load a JSON scene file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| CameraLinkError::path(path, e))?;
        log::info!("Loaded source scene: {}", path.display());
        Self::from_json_str(&json)
    }

    pub fn scene(&self) -> &SourceScene {
        &self.scene
    }

    /// Mutable scene access, e.g. to retime keys between exports.
    pub fn scene_mut(&mut self) -> &mut SourceScene {
        &mut self.scene
    }

    fn camera(&self, node: &CameraNode) -> Result<&SceneCamera> {
        self.scene
            .cameras
            .iter()
            .find(|c| c.transform == node.transform)
            .ok_or_else(|| CameraLinkError::resolution(&node.transform, "node no longer exists"))
    }
}

impl CameraSource for InMemorySource {
    fn resolve_camera(&self, name: Option<&str>) -> Result<CameraNode> {
        let name = match name.or(self.scene.selection.as_deref()) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(CameraLinkError::resolution("<selection>", "no camera named or selected")),
        };

        if let Some(camera) = self.scene.cameras.iter().find(|c| c.matches(name)) {
            return Ok(CameraNode {
                transform: camera.transform.clone(),
                shape: camera.shape_path(),
            });
        }

        if self.scene.nodes.iter().any(|n| n == name || short_name(n) == name) {
            return Err(CameraLinkError::resolution(name, "no camera shape found under node"));
        }

        Err(CameraLinkError::resolution(name, "node does not exist"))
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, frame: f64) {
        self.current_time = frame;
    }

    fn world_xform(&self, node: &CameraNode) -> Result<XformComponents> {
        Ok(self.camera(node)?.evaluate(self.current_time).0)
    }

    fn lens(&self, node: &CameraNode) -> Result<LensAttributes> {
        Ok(self.camera(node)?.evaluate(self.current_time).1)
    }

    fn linear_unit(&self) -> String {
        self.scene.linear_unit.clone()
    }

    fn time_unit(&self) -> String {
        self.scene.time_unit.clone()
    }

    fn render_resolution(&self) -> Resolution {
        self.scene.resolution
    }

    fn playback_range(&self) -> (i64, i64) {
        (self.scene.playback.start, self.scene.playback.end)
    }
}

/// A stage reference held by the sink.
#[derive(Clone, Debug)]
pub struct StageRecord {
    pub path: PathBuf,

    /// Layer as of the last open or reload
    pub layer: UsdLayer,

    pub reload_count: usize,

    /// One entry per import through this stage
    pub bindings: Vec<StageBinding>,
}

/// A spawned camera actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorRecord {
    pub label: String,
    pub stage: StageId,
    pub prim: String,
}

/// A user-authored section inside a container; untouched by reloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubSection {
    pub name: String,
    pub start: i64,
    pub end: i64,
}

/// A timeline container (level sequence).
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineContainer {
    pub name: String,
    pub settings: TimelineSettings,
    pub camera_cut: Option<ActorId>,
    pub sections: Vec<SubSection>,
    pub presented: bool,
}

/// Destination host that keeps everything in maps.
#[derive(Debug, Default)]
pub struct InMemorySink {
    next_id: u64,
    stages: BTreeMap<StageId, StageRecord>,
    actors: BTreeMap<ActorId, ActorRecord>,
    containers: BTreeMap<ContainerId, TimelineContainer>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn stage(&self, id: StageId) -> Option<&StageRecord> {
        self.stages.get(&id)
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorRecord> {
        self.actors.get(&id)
    }

    pub fn container(&self, id: ContainerId) -> Option<&TimelineContainer> {
        self.containers.get(&id)
    }

    /// Mutable container access, standing in for user edits in the editor.
    pub fn container_mut(&mut self, id: ContainerId) -> Option<&mut TimelineContainer> {
        self.containers.get_mut(&id)
    }

    pub fn containers(&self) -> impl Iterator<Item = (&ContainerId, &TimelineContainer)> {
        self.containers.iter()
    }

    fn stage_record(&self, id: StageId) -> Result<&StageRecord> {
        self.stages
            .get(&id)
            .ok_or_else(|| CameraLinkError::Host(format!("unknown {}", id)))
    }

    fn container_record(&mut self, id: ContainerId) -> Result<&mut TimelineContainer> {
        self.containers
            .get_mut(&id)
            .ok_or_else(|| CameraLinkError::Host(format!("unknown {}", id)))
    }
}

impl CameraSink for InMemorySink {
    fn open_stage(&mut self, path: &Path) -> Result<StageId> {
        if let Some(id) = self.find_stage(path) {
            log::debug!("Reusing {} for {}", id, path.display());
            return Ok(id);
        }

        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let layer = read_layer(&path)?;
        let id = StageId(self.allocate());
        log::info!("Opened {} on {}", id, path.display());

        self.stages.insert(
            id,
            StageRecord {
                path,
                layer,
                reload_count: 0,
                bindings: Vec::new(),
            },
        );
        Ok(id)
    }

    fn reload_stage(&mut self, stage: StageId) -> Result<()> {
        let path = self.stage_record(stage)?.path.clone();
        let layer = read_layer(&path)?;

        if let Some(record) = self.stages.get_mut(&stage) {
            record.layer = layer;
            record.reload_count += 1;
            log::info!("Reloaded {} ({} reloads)", stage, record.reload_count);
        }
        Ok(())
    }

    fn stage_path(&self, stage: StageId) -> Result<PathBuf> {
        Ok(self.stage_record(stage)?.path.clone())
    }

    fn find_stage(&self, path: &Path) -> Option<StageId> {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.stages.iter().find(|(_, s)| s.path == path).map(|(id, _)| *id)
    }

    fn stage_bindings(&self, stage: StageId) -> Vec<StageBinding> {
        self.stages.get(&stage).map(|s| s.bindings.clone()).unwrap_or_default()
    }

    fn add_stage_binding(&mut self, stage: StageId, binding: StageBinding) -> Result<()> {
        let record = self
            .stages
            .get_mut(&stage)
            .ok_or_else(|| CameraLinkError::Host(format!("unknown {}", stage)))?;
        record.bindings.push(binding);
        Ok(())
    }

    fn spawn_camera_actor(&mut self, stage: StageId, prim: &str, label: &str) -> Result<ActorId> {
        let record = self.stage_record(stage)?;
        match record.layer.find_prim(prim) {
            Some(p) if p.kind == PrimKind::Camera => {}
            _ => {
                return Err(CameraLinkError::Host(format!(
                    "{} has no camera prim at {}",
                    stage, prim
                )))
            }
        }

        let id = ActorId(self.allocate());
        self.actors.insert(
            id,
            ActorRecord {
                label: label.to_string(),
                stage,
                prim: prim.to_string(),
            },
        );
        log::info!("Spawned {} '{}' bound to {}", id, label, prim);
        Ok(id)
    }

    fn create_container(&mut self, name: &str, settings: &TimelineSettings) -> Result<ContainerId> {
        let id = ContainerId(self.allocate());
        self.containers.insert(
            id,
            TimelineContainer {
                name: name.to_string(),
                settings: *settings,
                camera_cut: None,
                sections: Vec::new(),
                presented: false,
            },
        );
        log::info!(
            "Created {} '{}': {}-{} @ {} fps",
            id,
            name,
            settings.start,
            settings.end,
            settings.fps
        );
        Ok(id)
    }

    fn update_container(&mut self, container: ContainerId, settings: &TimelineSettings) -> Result<()> {
        self.container_record(container)?.settings = *settings;
        Ok(())
    }

    fn bind_camera_cut(&mut self, container: ContainerId, actor: ActorId) -> Result<()> {
        if !self.actors.contains_key(&actor) {
            return Err(CameraLinkError::Host(format!("unknown {}", actor)));
        }
        self.container_record(container)?.camera_cut = Some(actor);
        Ok(())
    }

    fn present(&mut self, container: ContainerId) -> Result<()> {
        self.container_record(container)?.presented = true;
        Ok(())
    }
}
