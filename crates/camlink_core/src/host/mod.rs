//! Host capability contracts.
//!
//! The pipeline talks to the source (keyframe animation) host through
//! [`CameraSource`] and to the destination (real-time editor) host through
//! [`CameraSink`]. Destination objects are referenced by opaque ids and looked
//! up on every call; the pipeline never holds on to host objects.
//!
//! [`memory`] provides in-memory hosts used by the CLI and tests.

use std::fmt;
use std::path::{Path, PathBuf};

use camlink_math::XformComponents;
use serde::{Deserialize, Serialize};

use crate::camera::LensAttributes;
use crate::error::Result;
use crate::units::{FrameRate, Resolution};

pub mod memory;

/// A resolved transform + lens node pair on the source host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraNode {
    /// Full path of the transform node, e.g. `|rig|shotCam`
    pub transform: String,

    /// Full path of the lens (shape) node
    pub shape: String,
}

/// Source host operations the exporter needs.
pub trait CameraSource {
    /// Resolve a node name (transform or lens) to its camera pair.
    /// `None` uses the current selection.
    fn resolve_camera(&self, name: Option<&str>) -> Result<CameraNode>;

    fn current_time(&self) -> f64;

    /// Move the host to `frame`, forcing evaluation.
    fn set_current_time(&mut self, frame: f64);

    /// World-space transform at the current time.
    fn world_xform(&self, node: &CameraNode) -> Result<XformComponents>;

    /// Lens attributes at the current time.
    fn lens(&self, node: &CameraNode) -> Result<LensAttributes>;

    /// Scene linear unit name, e.g. `cm`.
    fn linear_unit(&self) -> String;

    /// Time unit name, e.g. `film` or `30fps`.
    fn time_unit(&self) -> String;

    fn render_resolution(&self) -> Resolution;

    /// Playback range as (start, end).
    fn playback_range(&self) -> (i64, i64);
}

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

host_id!(
    /// Stage reference handle on the destination host.
    StageId,
    "stage"
);
host_id!(
    /// Camera actor handle on the destination host.
    ActorId,
    "actor"
);
host_id!(
    /// Timeline container handle on the destination host.
    ContainerId,
    "container"
);

/// Playback settings of a timeline container.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineSettings {
    pub start: i64,
    pub end: i64,
    pub fps: f64,

    /// Rational display rate derived from `fps`
    pub display_rate: FrameRate,

    /// Visible range in the editor, padded around playback
    pub view_start: f64,
    pub view_end: f64,
}

impl TimelineSettings {
    /// Settings for `start..=end` at `fps`, view padded by `padding` frames.
    pub fn new(start: i64, end: i64, fps: f64, padding: i64) -> Self {
        Self {
            start,
            end,
            fps,
            display_rate: FrameRate::from_fps(fps),
            view_start: start.saturating_sub(padding) as f64,
            view_end: end.saturating_add(padding) as f64,
        }
    }

    /// The `(start, end, fps)` triple.
    pub fn range(&self) -> (i64, i64, f64) {
        (self.start, self.end, self.fps)
    }
}

/// What an imported stage reference is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBinding {
    /// Camera prim path inside the document
    pub prim: String,
    pub actor: ActorId,
    pub container: ContainerId,
}

/// Destination host operations the importer needs.
pub trait CameraSink {
    /// Open a stage reference on `path`, reusing one already open on it.
    fn open_stage(&mut self, path: &Path) -> Result<StageId>;

    /// Re-read the referenced document from disk.
    fn reload_stage(&mut self, stage: StageId) -> Result<()>;

    fn stage_path(&self, stage: StageId) -> Result<PathBuf>;

    /// Stage reference already open on `path`, if any.
    fn find_stage(&self, path: &Path) -> Option<StageId>;

    /// Bindings recorded by every import through this stage, oldest first.
    fn stage_bindings(&self, stage: StageId) -> Vec<StageBinding>;

    fn add_stage_binding(&mut self, stage: StageId, binding: StageBinding) -> Result<()>;

    /// Spawn a camera actor driven by `prim` on `stage`.
    fn spawn_camera_actor(&mut self, stage: StageId, prim: &str, label: &str) -> Result<ActorId>;

    fn create_container(&mut self, name: &str, settings: &TimelineSettings) -> Result<ContainerId>;

    /// Replace the container's playback settings; nothing else changes.
    fn update_container(&mut self, container: ContainerId, settings: &TimelineSettings) -> Result<()>;

    /// Make `actor` the container's active camera.
    fn bind_camera_cut(&mut self, container: ContainerId, actor: ActorId) -> Result<()>;

    /// Hand the container to the host's sequencing system.
    fn present(&mut self, container: ContainerId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_view_padding() {
        let settings = TimelineSettings::new(1, 100, 24.0, 10);
        assert_eq!(settings.view_start, -9.0);
        assert_eq!(settings.view_end, 110.0);
        assert_eq!(settings.display_rate, FrameRate { numerator: 24, denominator: 1 });
    }

    #[test]
    fn test_timeline_view_padding_at_frame_limits() {
        let settings = TimelineSettings::new(i64::MIN, i64::MAX, 24.0, 10);
        assert_eq!(settings.view_start, i64::MIN as f64);
        assert_eq!(settings.view_end, i64::MAX as f64);
        assert_eq!(settings.range(), (i64::MIN, i64::MAX, 24.0));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ContainerId(3).to_string(), "container#3");
    }
}
