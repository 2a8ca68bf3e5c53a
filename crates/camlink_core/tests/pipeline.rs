//! End-to-end export / import / reload through the in-memory hosts.

use std::fs;
use std::path::{Path, PathBuf};

use camlink_core::camera::LensAttributes;
use camlink_core::host::memory::{InMemorySink, InMemorySource, SubSection};
use camlink_core::host::{CameraNode, CameraSource};
use camlink_core::usd::{read_layer, UsdValue};
use camlink_core::{
    export_camera, import_camera, print_debug, read_camera_track, reload, CameraLinkConfig, CameraLinkError,
    ExportRequest, MetadataPolicy, Resolution,
};
use camlink_math::XformComponents;
use tempfile::TempDir;

const SCENE: &str = r#"{
    "linear_unit": "cm",
    "time_unit": "film",
    "playback": { "start": 1, "end": 24 },
    "current_time": 12,
    "resolution": { "width": 1920, "height": 1080 },
    "selection": "|cams|shotCam",
    "cameras": [
        {
            "transform": "|cams|shotCam",
            "keys": [
                {
                    "frame": 1,
                    "xform": { "translate": [0.0, 150.0, 500.0], "rotate_xyz": [-5.0, 0.0, 0.0] },
                    "lens": { "focal_length": 35.0, "focus_distance": 500.0, "f_stop": 2.8 }
                },
                {
                    "frame": 24,
                    "xform": { "translate": [230.0, 150.0, 500.0], "rotate_xyz": [-5.0, 30.0, 0.0] },
                    "lens": { "focal_length": 35.0, "focus_distance": 500.0, "f_stop": 2.8 }
                }
            ]
        }
    ]
}"#;

fn source() -> InMemorySource {
    InMemorySource::from_json_str(SCENE).unwrap()
}

fn doc_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn export(source: &mut InMemorySource, path: &Path, start: i64, end: i64, step: i64) {
    let request = ExportRequest::new(path).range(start, end, step);
    export_camera(source, &request, &CameraLinkConfig::default()).unwrap();
}

#[test]
fn test_export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "sh010_cam.usda");
    let config = CameraLinkConfig::default();

    let mut src = source();
    let summary = export_camera(&mut src, &ExportRequest::new(&path), &config).unwrap();
    assert_eq!(summary.sample_count, 24);
    assert_eq!(summary.prim_path, "/shotCam");

    let mut sink = InMemorySink::new();
    let outcome = import_camera(&mut sink, &path, &config).unwrap();
    assert!(!outcome.degraded);
    assert_eq!(outcome.prim_path, "/shotCam");

    let container = sink.container(outcome.container).unwrap();
    assert_eq!(container.name, "LS_sh010_cam");
    assert_eq!(container.settings.range(), (1, 24, 24.0));
    assert_eq!((container.settings.view_start, container.settings.view_end), (-9.0, 34.0));
    assert_eq!(container.camera_cut, Some(outcome.actor));
    assert!(container.presented);

    let actor = sink.actor(outcome.actor).unwrap();
    assert_eq!(actor.label, "USD_Cam_sh010_cam");
    assert_eq!(actor.prim, "/shotCam");

    // Decoded transform matches what the source reports
    let track = read_camera_track(&path).unwrap();
    let node = src.resolve_camera(None).unwrap();
    src.set_current_time(24.0);
    let expected = src.world_xform(&node).unwrap().to_matrix();
    let last = track.frames.last().unwrap();
    assert_eq!(last.frame, 24);
    assert!(last.world.abs_diff_eq(expected, 1e-9));
}

#[test]
fn test_reexport_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let a = doc_path(&dir, "a.usda");
    let b = doc_path(&dir, "b.usda");

    let mut src = source();
    export(&mut src, &a, 1, 24, 1);
    export(&mut src, &b, 1, 24, 1);

    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}

#[test]
fn test_import_rate_and_range_from_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "ntsc.usda");

    let mut src = source();
    src.scene_mut().time_unit = "ntsc".to_string();
    export(&mut src, &path, 0, 349, 30);

    let mut sink = InMemorySink::new();
    let outcome = import_camera(&mut sink, &path, &CameraLinkConfig::default()).unwrap();

    let container = sink.container(outcome.container).unwrap();
    assert_eq!(container.settings.range(), (0, 349, 30.0));
    assert_eq!(print_debug(&path).unwrap().sample_count, 12);
}

#[test]
fn test_reload_updates_container_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "live.usda");
    let config = CameraLinkConfig::default();

    let mut src = source();
    export(&mut src, &path, 1, 24, 1);

    let mut sink = InMemorySink::new();
    let outcome = import_camera(&mut sink, &path, &config).unwrap();
    sink.container_mut(outcome.container).unwrap().sections.push(SubSection {
        name: "shot".into(),
        start: 1,
        end: 24,
    });

    export(&mut src, &path, 1, 48, 1);
    let container_id = reload(&mut sink, outcome.stage, &config).unwrap();
    assert_eq!(container_id, outcome.container);
    assert_eq!(sink.containers().count(), 1);

    let container = sink.container(container_id).unwrap();
    assert_eq!(container.settings.range(), (1, 48, 24.0));
    assert_eq!(container.sections[0].end, 24);
    assert_eq!(container.camera_cut, Some(outcome.actor));
    assert_eq!(sink.stage(outcome.stage).unwrap().reload_count, 1);
}

#[test]
fn test_reload_after_prim_rename_leaves_state_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "renamed.usda");
    let config = CameraLinkConfig::default();

    let mut src = source();
    export(&mut src, &path, 1, 24, 1);

    let mut sink = InMemorySink::new();
    let outcome = import_camera(&mut sink, &path, &config).unwrap();
    let before = sink.container(outcome.container).unwrap().clone();

    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, text.replace("\"shotCam\"", "\"otherCam\"")).unwrap();

    let err = reload(&mut sink, outcome.stage, &config).unwrap_err();
    assert!(matches!(err, CameraLinkError::PrimMissing { ref prim, .. } if prim == "/shotCam"));
    assert_eq!(sink.container(outcome.container).unwrap(), &before);
    assert_eq!(sink.stage(outcome.stage).unwrap().reload_count, 0);
}

#[test]
fn test_repeated_imports_new_containers_same_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "repeat.usda");
    let config = CameraLinkConfig::default();

    export(&mut source(), &path, 1, 24, 2);

    let mut sink = InMemorySink::new();
    let first = import_camera(&mut sink, &path, &config).unwrap();
    let track_a = read_camera_track(&path).unwrap();
    let second = import_camera(&mut sink, &path, &config).unwrap();
    let track_b = read_camera_track(&path).unwrap();

    assert_ne!(first.container, second.container);
    assert_eq!(first.stage, second.stage);
    assert_eq!(sink.containers().count(), 2);
    assert_eq!(track_a, track_b);
}

#[test]
fn test_every_import_on_a_shared_stage_follows_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "shared.usda");
    let config = CameraLinkConfig::default();
    let mut src = source();
    let mut sink = InMemorySink::new();

    export(&mut src, &path, 1, 24, 1);
    let first = import_camera(&mut sink, &path, &config).unwrap();

    export(&mut src, &path, 1, 48, 1);
    let second = import_camera(&mut sink, &path, &config).unwrap();
    assert_eq!(first.stage, second.stage);
    assert_eq!(sink.stage(first.stage).unwrap().bindings.len(), 2);
    assert_eq!(sink.container(first.container).unwrap().settings.range(), (1, 48, 24.0));
    assert_eq!(sink.container(second.container).unwrap().settings.range(), (1, 48, 24.0));

    export(&mut src, &path, 1, 96, 1);
    let latest = reload(&mut sink, first.stage, &config).unwrap();
    assert_eq!(latest, second.container);
    for outcome in [&first, &second] {
        let container = sink.container(outcome.container).unwrap();
        assert_eq!(container.settings.range(), (1, 96, 24.0));
        assert_eq!(container.camera_cut, Some(outcome.actor));
    }
    assert_eq!(sink.containers().count(), 2);
}

#[test]
fn test_import_with_extreme_metadata_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "extreme.usda");
    let fps = 4_300_000.0_f64 / 1.001;
    fs::write(
        &path,
        format!(
            "#usda 1.0\n(\n    customLayerData = {{\n        int endFrame = {}\n        double fps = {}\n        \
             int startFrame = {}\n    }}\n)\n\ndef Camera \"cam\"\n{{\n    float focalLength = 35\n}}\n",
            i64::MAX,
            fps,
            i64::MIN
        ),
    )
    .unwrap();

    let mut sink = InMemorySink::new();
    let outcome = import_camera(&mut sink, &path, &CameraLinkConfig::default()).unwrap();
    let settings = sink.container(outcome.container).unwrap().settings;
    assert_eq!(settings.range(), (i64::MIN, i64::MAX, fps));
    assert_eq!(settings.view_start, i64::MIN as f64);
    assert_eq!(settings.view_end, i64::MAX as f64);
    assert_eq!(settings.display_rate.denominator, 1);
}

#[test]
fn test_static_camera_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "static.usda");

    export(&mut source(), &path, 10, 10, 1);

    let report = print_debug(&path).unwrap();
    assert_eq!(report.sample_count, 1);
    assert!(report.is_static());
    assert!(report.has_metadata());
}

#[test]
fn test_aspect_match_and_units_in_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "aspect.usda");

    let mut src = source();
    src.scene_mut().linear_unit = "m".to_string();
    let request = ExportRequest::new(&path).range(1, 2, 1).aspect_match(None);
    export_camera(&mut src, &request, &CameraLinkConfig::default()).unwrap();

    let layer = read_layer(&path).unwrap();
    let data = &layer.metadata.custom_layer_data;
    assert_eq!(data.get("renderWidth"), Some(&UsdValue::Int(1920)));
    assert_eq!(data.get("renderHeight"), Some(&UsdValue::Int(1080)));

    let cam = layer.find_prim("/shotCam").unwrap();
    assert_eq!(cam.attribute("horizontalAperture").unwrap().default, Some(UsdValue::Float(36.0)));
    assert_eq!(cam.attribute("verticalAperture").unwrap().default, Some(UsdValue::Float(20.25)));
    // 500 m focus distance authored in centimetres
    assert_eq!(cam.attribute("focusDistance").unwrap().default, Some(UsdValue::Float(50000.0)));
    assert_eq!(layer.metadata.meters_per_unit, Some(0.01));
}

#[test]
fn test_explicit_resolution_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "scope.usda");

    let request = ExportRequest::new(&path)
        .range(1, 1, 1)
        .aspect_match(Some(Resolution::new(2000, 1000)));
    export_camera(&mut source(), &request, &CameraLinkConfig::default()).unwrap();

    let layer = read_layer(&path).unwrap();
    let cam = layer.find_prim("/shotCam").unwrap();
    assert_eq!(cam.attribute("verticalAperture").unwrap().default, Some(UsdValue::Float(18.0)));
}

#[test]
fn test_strict_import_of_bare_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "bare.usda");
    fs::write(
        &path,
        "#usda 1.0\n(\n    timeCodesPerSecond = 25\n)\n\ndef Camera \"cam\"\n{\n    float focalLength = 35\n}\n",
    )
    .unwrap();

    let strict = CameraLinkConfig {
        metadata_policy: MetadataPolicy::Strict,
        ..Default::default()
    };
    let mut sink = InMemorySink::new();
    assert!(matches!(
        import_camera(&mut sink, &path, &strict),
        Err(CameraLinkError::MetadataMissing { .. })
    ));
    assert_eq!(sink.containers().count(), 0);

    let outcome = import_camera(&mut sink, &path, &CameraLinkConfig::default()).unwrap();
    assert!(outcome.degraded);
    assert_eq!(outcome.metadata.fps, 25.0);
}

/// Source whose lens evaluation fails at one frame.
struct FailingSource {
    inner: InMemorySource,
    fail_at: f64,
}

impl CameraSource for FailingSource {
    fn resolve_camera(&self, name: Option<&str>) -> camlink_core::Result<CameraNode> {
        self.inner.resolve_camera(name)
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn set_current_time(&mut self, frame: f64) {
        self.inner.set_current_time(frame)
    }

    fn world_xform(&self, node: &CameraNode) -> camlink_core::Result<XformComponents> {
        self.inner.world_xform(node)
    }

    fn lens(&self, node: &CameraNode) -> camlink_core::Result<LensAttributes> {
        if self.inner.current_time() == self.fail_at {
            return Err(CameraLinkError::Host("evaluation failed".into()));
        }
        self.inner.lens(node)
    }

    fn linear_unit(&self) -> String {
        self.inner.linear_unit()
    }

    fn time_unit(&self) -> String {
        self.inner.time_unit()
    }

    fn render_resolution(&self) -> Resolution {
        self.inner.render_resolution()
    }

    fn playback_range(&self) -> (i64, i64) {
        self.inner.playback_range()
    }
}

#[test]
fn test_source_time_restored_on_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "time.usda");

    let mut src = source();
    export(&mut src, &path, 1, 24, 1);
    assert_eq!(src.current_time(), 12.0);

    let mut failing = FailingSource {
        inner: source(),
        fail_at: 5.0,
    };
    let err = export_camera(&mut failing, &ExportRequest::new(&path), &CameraLinkConfig::default()).unwrap_err();
    assert!(matches!(err, CameraLinkError::Host(_)));
    assert_eq!(failing.current_time(), 12.0);
}

#[test]
fn test_failed_export_keeps_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = doc_path(&dir, "keep.usda");

    export(&mut source(), &path, 1, 24, 1);
    let before = fs::read(&path).unwrap();

    let mut failing = FailingSource {
        inner: source(),
        fail_at: 3.0,
    };
    assert!(export_camera(&mut failing, &ExportRequest::new(&path), &CameraLinkConfig::default()).is_err());
    assert_eq!(fs::read(&path).unwrap(), before);
}
