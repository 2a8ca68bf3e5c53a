//! The interchange camera document.
//!
//! Maps converted camera frames onto a USD layer (one `Camera` prim with
//! translate / rotateXYZ / scale ops and lens attributes) and reads the
//! pieces back: the metadata block and the per-frame camera track.

use std::collections::BTreeMap;

use camlink_math::{compose_xform_ops, DMat4, DVec3, Vec2, XformOp};

use crate::camera::{CameraFrame, CameraOptics};
use crate::units::Resolution;
use crate::usd::{LayerMetadata, PrimKind, TimeSamples, UsdAttribute, UsdLayer, UsdPrim, UsdValue};

/// Metadata block keys in `customLayerData`.
pub mod keys {
    pub const FPS: &str = "fps";
    pub const START_FRAME: &str = "startFrame";
    pub const END_FRAME: &str = "endFrame";
    pub const RENDER_WIDTH: &str = "renderWidth";
    pub const RENDER_HEIGHT: &str = "renderHeight";

    /// Keys written by older exporters, read as a fallback.
    pub const LEGACY_FPS: &str = "layoutlink_fps";
    pub const LEGACY_START_FRAME: &str = "layoutlink_start_frame";
    pub const LEGACY_END_FRAME: &str = "layoutlink_end_frame";
}

/// Stage units: centimetres.
pub const METERS_PER_UNIT: f64 = 0.01;

pub const UP_AXIS: &str = "Y";

const TRANSLATE_OP: &str = "xformOp:translate";
const ROTATE_XYZ_OP: &str = "xformOp:rotateXYZ";
const SCALE_OP: &str = "xformOp:scale";

/// Characters not allowed in a prim name.
const INVALID_NAME_CHARS: &str = "<>:\"/\\|?*. ";

/// Turn a host node path into a valid prim name.
///
/// Drops the DAG path and namespace (`|rig|ns:shotCam` becomes `shotCam`) and
/// replaces characters USD rejects with `_`.
pub fn sanitize_prim_name(node: &str) -> String {
    let short = node.rsplit('|').next().unwrap_or(node);
    let short = short.rsplit(':').next().unwrap_or(short);

    let mut clean: String = short
        .chars()
        .map(|c| if INVALID_NAME_CHARS.contains(c) { '_' } else { c })
        .collect();

    if clean.is_empty() {
        clean = "camera".to_string();
    }
    if clean.starts_with(|c: char| c.is_ascii_digit()) {
        clean.insert(0, '_');
    }
    clean
}

/// Frame rate and range carried in the document's metadata block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DocumentMetadata {
    pub fps: f64,
    pub start_frame: i64,
    pub end_frame: i64,

    /// Present only when the apertures were aspect-matched
    pub render_resolution: Option<Resolution>,
}

impl DocumentMetadata {
    pub fn to_custom_data(&self) -> BTreeMap<String, UsdValue> {
        let mut data = BTreeMap::new();
        data.insert(keys::FPS.to_string(), UsdValue::Double(self.fps));
        data.insert(keys::START_FRAME.to_string(), UsdValue::Int(self.start_frame));
        data.insert(keys::END_FRAME.to_string(), UsdValue::Int(self.end_frame));

        if let Some(res) = self.render_resolution {
            data.insert(keys::RENDER_WIDTH.to_string(), UsdValue::Int(i64::from(res.width)));
            data.insert(keys::RENDER_HEIGHT.to_string(), UsdValue::Int(i64::from(res.height)));
        }
        data
    }

    /// Read the block; `None` when any of fps, startFrame or endFrame is absent.
    pub fn from_custom_data(data: &BTreeMap<String, UsdValue>) -> Option<Self> {
        let lookup = |key: &str, legacy: &str| data.get(key).or_else(|| data.get(legacy));

        let fps = lookup(keys::FPS, keys::LEGACY_FPS)?.as_f64()?;
        let start_frame = lookup(keys::START_FRAME, keys::LEGACY_START_FRAME)?.as_i64()?;
        let end_frame = lookup(keys::END_FRAME, keys::LEGACY_END_FRAME)?.as_i64()?;

        let dimension = |key: &str| {
            data.get(key)
                .and_then(UsdValue::as_i64)
                .and_then(|v| u32::try_from(v).ok())
        };
        let render_resolution = match (dimension(keys::RENDER_WIDTH), dimension(keys::RENDER_HEIGHT)) {
            (Some(w), Some(h)) => Some(Resolution::new(w, h)).filter(Resolution::is_valid),
            _ => None,
        };

        Some(Self {
            fps,
            start_frame,
            end_frame,
            render_resolution,
        })
    }

    pub fn from_layer(layer: &UsdLayer) -> Option<Self> {
        Self::from_custom_data(&layer.metadata.custom_layer_data)
    }
}

/// An exportable camera: converted frames plus metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct InterchangeCameraDocument {
    /// Sanitized prim name
    pub camera_name: String,
    pub metadata: DocumentMetadata,

    /// Frames in strictly increasing order
    pub frames: Vec<CameraFrame>,
}

impl InterchangeCameraDocument {
    pub fn new(source_node: &str, metadata: DocumentMetadata, frames: Vec<CameraFrame>) -> Self {
        Self {
            camera_name: sanitize_prim_name(source_node),
            metadata,
            frames,
        }
    }

    pub fn prim_path(&self) -> String {
        format!("/{}", self.camera_name)
    }

    pub fn sample_count(&self) -> usize {
        self.frames.len()
    }

    /// Author the USD layer.
    ///
    /// Transform ops are time-sampled at every frame. Lens attributes are
    /// written static when every frame carries the same value and
    /// time-sampled otherwise.
    pub fn to_layer(&self) -> UsdLayer {
        let mut cam = UsdPrim::new(PrimKind::Camera, &self.camera_name);
        let frames = &self.frames;

        cam.set_attribute(sampled(frames, TRANSLATE_OP, "double3", |f| {
            UsdValue::Double3(f.xform.translate)
        }));
        cam.set_attribute(sampled(frames, ROTATE_XYZ_OP, "double3", |f| {
            UsdValue::Double3(f.xform.rotate_xyz)
        }));
        cam.set_attribute(sampled(frames, SCALE_OP, "double3", |f| UsdValue::Double3(f.xform.scale)));
        cam.set_attribute(
            UsdAttribute::with_default(
                "xformOpOrder",
                "token[]",
                UsdValue::TokenArray(vec![TRANSLATE_OP.into(), ROTATE_XYZ_OP.into(), SCALE_OP.into()]),
            )
            .uniform(),
        );

        cam.set_attribute(UsdAttribute::with_default(
            "projection",
            "token",
            UsdValue::Token("perspective".into()),
        ));

        let float = |v: f64| UsdValue::Float(v as f32);
        let lens: [(&str, fn(&CameraOptics) -> f64); 5] = [
            ("focalLength", |o| o.focal_length),
            ("horizontalAperture", |o| o.horizontal_aperture),
            ("verticalAperture", |o| o.vertical_aperture),
            ("horizontalApertureOffset", |o| o.horizontal_aperture_offset),
            ("verticalApertureOffset", |o| o.vertical_aperture_offset),
        ];
        for (name, get) in lens {
            if let Some(attr) = static_or_sampled(frames, name, "float", |f| float(get(&f.optics))) {
                cam.set_attribute(attr);
            }
        }

        if let Some(attr) = static_or_sampled(frames, "clippingRange", "float2", |f| {
            let (near, far) = f.optics.clipping_range;
            UsdValue::Float2(Vec2::new(near as f32, far as f32))
        }) {
            cam.set_attribute(attr);
        }

        let optional: [(&str, fn(&CameraOptics) -> Option<f64>); 2] =
            [("focusDistance", |o| o.focus_distance), ("fStop", |o| o.f_stop)];
        for (name, get) in optional {
            if !frames.is_empty() && frames.iter().all(|f| get(&f.optics).is_some()) {
                if let Some(attr) = static_or_sampled(frames, name, "float", |f| {
                    float(get(&f.optics).unwrap_or_default())
                }) {
                    cam.set_attribute(attr);
                }
            }
        }

        UsdLayer {
            metadata: LayerMetadata {
                default_prim: Some(self.camera_name.clone()),
                up_axis: Some(UP_AXIS.to_string()),
                meters_per_unit: Some(METERS_PER_UNIT),
                time_codes_per_second: Some(self.metadata.fps),
                start_time_code: Some(self.metadata.start_frame as f64),
                end_time_code: Some(self.metadata.end_frame as f64),
                custom_layer_data: self.metadata.to_custom_data(),
            },
            prims: vec![cam],
        }
    }
}

/// Time samples at every frame.
fn sampled(frames: &[CameraFrame], name: &str, type_name: &str, value: impl Fn(&CameraFrame) -> UsdValue) -> UsdAttribute {
    let samples: TimeSamples = frames.iter().map(|f| (f.frame as f64, value(f))).collect();
    UsdAttribute::with_samples(name, type_name, samples)
}

/// A static attribute when all frames agree, time samples otherwise.
fn static_or_sampled(
    frames: &[CameraFrame],
    name: &str,
    type_name: &str,
    value: impl Fn(&CameraFrame) -> UsdValue,
) -> Option<UsdAttribute> {
    let values: Vec<UsdValue> = frames.iter().map(&value).collect();
    let first = values.first()?.clone();

    if values.iter().all(|v| *v == first) {
        return Some(UsdAttribute::with_default(name, type_name, first));
    }

    let samples = frames.iter().map(|f| f.frame as f64).zip(values).collect();
    Some(UsdAttribute::with_samples(name, type_name, samples))
}

/// The camera prim a document is about: `defaultPrim` when it is a camera,
/// else the first camera in traversal order.
pub fn find_camera_prim(layer: &UsdLayer) -> Option<&UsdPrim> {
    let default = layer
        .metadata
        .default_prim
        .as_deref()
        .and_then(|name| layer.find_prim(&format!("/{}", name)))
        .filter(|p| p.kind == PrimKind::Camera);

    default.or_else(|| layer.prims_of_kind(&PrimKind::Camera).into_iter().next())
}

/// First and last time sample over all attributes of `prim`.
pub fn time_sample_bounds(prim: &UsdPrim) -> Option<(f64, f64)> {
    prim.attributes
        .iter()
        .filter_map(|a| a.time_samples.as_ref().and_then(TimeSamples::bounds))
        .reduce(|(lo, hi), (s, e)| (lo.min(s), hi.max(e)))
}

/// Camera state decoded from a document at one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodedFrame {
    pub frame: i64,

    /// Composed from the prim's `xformOpOrder`
    pub world: DMat4,

    pub optics: CameraOptics,
}

/// Per-frame camera state read back from a document.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraTrack {
    pub prim_path: String,
    pub frames: Vec<DecodedFrame>,
}

impl CameraTrack {
    /// Decode the camera at `prim_path`, one frame per authored time sample.
    ///
    /// Values between or outside samples are held. A prim with no time
    /// samples decodes to a single frame at the layer's start time.
    pub fn decode(layer: &UsdLayer, prim_path: &str) -> Option<Self> {
        let prim = layer.find_prim(prim_path).filter(|p| p.kind == PrimKind::Camera)?;

        let mut times: Vec<f64> = prim
            .attributes
            .iter()
            .filter_map(|a| a.time_samples.as_ref())
            .flat_map(|s| s.times())
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        if times.is_empty() {
            times.push(layer.metadata.start_time_code.unwrap_or(0.0));
        }

        let frames = times
            .into_iter()
            .map(|t| DecodedFrame {
                frame: t.round() as i64,
                world: world_matrix_at(prim, t),
                optics: optics_at(prim, t),
            })
            .collect();

        Some(Self {
            prim_path: prim_path.to_string(),
            frames,
        })
    }
}

/// Compose the prim's ops at `time` in `xformOpOrder` order.
pub fn world_matrix_at(prim: &UsdPrim, time: f64) -> DMat4 {
    let Some(UsdValue::TokenArray(order)) = prim.attribute("xformOpOrder").and_then(|a| a.default.as_ref()) else {
        return DMat4::IDENTITY;
    };

    let ops: Vec<XformOp> = order
        .iter()
        .filter_map(|name| {
            if name.starts_with("!invert!") {
                log::debug!("Skipping inverted op {} on {}", name, prim.path);
                return None;
            }
            let value = prim.attribute(name)?.value_at(time)?;
            // xformOp:<kind>[:suffix]
            let kind = name.split(':').nth(1)?;
            match kind {
                "translate" => value.as_dvec3().map(XformOp::Translate),
                "rotateXYZ" => value.as_dvec3().map(XformOp::RotateXYZ),
                "rotateX" => value.as_f64().map(XformOp::RotateX),
                "rotateY" => value.as_f64().map(XformOp::RotateY),
                "rotateZ" => value.as_f64().map(XformOp::RotateZ),
                "scale" => value.as_dvec3().map(XformOp::Scale),
                "transform" => match value {
                    UsdValue::Matrix4d(m) => Some(XformOp::Transform(*m)),
                    _ => None,
                },
                other => {
                    log::warn!("Unsupported xformOp '{}' on {}", other, prim.path);
                    None
                }
            }
        })
        .collect();

    compose_xform_ops(&ops)
}

/// Lens attributes at `time`, with schema fallbacks for anything unauthored.
pub fn optics_at(prim: &UsdPrim, time: f64) -> CameraOptics {
    let scalar = |name: &str| prim.attribute(name).and_then(|a| a.value_at(time)).and_then(UsdValue::as_f64);

    let clipping_range = match prim.attribute("clippingRange").and_then(|a| a.value_at(time)) {
        Some(UsdValue::Float2(v)) => (f64::from(v.x), f64::from(v.y)),
        _ => (1.0, 1_000_000.0),
    };

    CameraOptics {
        focal_length: scalar("focalLength").unwrap_or(50.0),
        horizontal_aperture: scalar("horizontalAperture").unwrap_or(20.955),
        vertical_aperture: scalar("verticalAperture").unwrap_or(15.2908),
        horizontal_aperture_offset: scalar("horizontalApertureOffset").unwrap_or(0.0),
        vertical_aperture_offset: scalar("verticalApertureOffset").unwrap_or(0.0),
        clipping_range,
        focus_distance: scalar("focusDistance"),
        f_stop: scalar("fStop"),
    }
}

/// World-space position at `time`.
pub fn position_at(prim: &UsdPrim, time: f64) -> DVec3 {
    world_matrix_at(prim, time).transform_point3(DVec3::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_math::XformComponents;

    fn frame(frame: i64, x: f64, focal: f64) -> CameraFrame {
        CameraFrame {
            frame,
            xform: XformComponents::new(DVec3::new(x, 0.0, 0.0), DVec3::new(0.0, 90.0, 0.0)),
            optics: CameraOptics {
                focal_length: focal,
                horizontal_aperture: 36.0,
                vertical_aperture: 24.0,
                horizontal_aperture_offset: 0.0,
                vertical_aperture_offset: 0.0,
                clipping_range: (0.1, 10000.0),
                focus_distance: Some(500.0),
                f_stop: None,
            },
        }
    }

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            fps: 24.0,
            start_frame: 1,
            end_frame: 3,
            render_resolution: None,
        }
    }

    #[test]
    fn test_sanitize_prim_name() {
        assert_eq!(sanitize_prim_name("|rig|ns:shotCam"), "shotCam");
        assert_eq!(sanitize_prim_name("shot cam.v2"), "shot_cam_v2");
        assert_eq!(sanitize_prim_name("010_cam"), "_010_cam");
        assert_eq!(sanitize_prim_name("|"), "camera");
    }

    #[test]
    fn test_static_focal_length_is_not_sampled() {
        let doc = InterchangeCameraDocument::new("cam", metadata(), vec![frame(1, 0.0, 35.0), frame(2, 1.0, 35.0)]);
        let layer = doc.to_layer();
        let cam = &layer.prims[0];

        let focal = cam.attribute("focalLength").unwrap();
        assert!(!focal.is_time_sampled());
        assert_eq!(focal.default, Some(UsdValue::Float(35.0)));

        assert_eq!(cam.attribute("xformOp:translate").unwrap().sample_count(), 2);
        assert!(cam.attribute("fStop").is_none());
        assert!(cam.attribute("focusDistance").is_some());
    }

    #[test]
    fn test_varying_focal_length_is_sampled() {
        let doc = InterchangeCameraDocument::new("cam", metadata(), vec![frame(1, 0.0, 35.0), frame(2, 0.0, 50.0)]);
        let layer = doc.to_layer();
        let focal = layer.prims[0].attribute("focalLength").unwrap();
        assert_eq!(focal.sample_count(), 2);
        assert!(focal.default.is_none());
    }

    #[test]
    fn test_layer_metadata() {
        let meta = DocumentMetadata {
            render_resolution: Some(Resolution::new(1920, 1080)),
            ..metadata()
        };
        let layer = InterchangeCameraDocument::new("|shotCam", meta, vec![frame(1, 0.0, 35.0)]).to_layer();

        assert_eq!(layer.metadata.default_prim.as_deref(), Some("shotCam"));
        assert_eq!(layer.metadata.meters_per_unit, Some(0.01));
        assert_eq!(layer.metadata.up_axis.as_deref(), Some("Y"));
        assert_eq!(DocumentMetadata::from_layer(&layer), Some(meta));
    }

    #[test]
    fn test_metadata_missing_key() {
        let mut data = metadata().to_custom_data();
        data.remove(keys::END_FRAME);
        assert_eq!(DocumentMetadata::from_custom_data(&data), None);
    }

    #[test]
    fn test_legacy_metadata_keys() {
        let mut data = BTreeMap::new();
        data.insert("layoutlink_fps".to_string(), UsdValue::Double(25.0));
        data.insert("layoutlink_start_frame".to_string(), UsdValue::Int(1001));
        data.insert("layoutlink_end_frame".to_string(), UsdValue::Int(1100));

        let meta = DocumentMetadata::from_custom_data(&data).unwrap();
        assert_eq!((meta.fps, meta.start_frame, meta.end_frame), (25.0, 1001, 1100));
    }

    #[test]
    fn test_decode_matches_authored_transform() {
        let frames = vec![frame(1, 0.0, 35.0), frame(2, 10.0, 35.0), frame(3, 20.0, 40.0)];
        let doc = InterchangeCameraDocument::new("cam", metadata(), frames.clone());
        let layer = doc.to_layer();

        let track = CameraTrack::decode(&layer, "/cam").unwrap();
        assert_eq!(track.frames.len(), 3);
        for (decoded, authored) in track.frames.iter().zip(&frames) {
            assert_eq!(decoded.frame, authored.frame);
            assert!(decoded.world.abs_diff_eq(authored.world_matrix(), 1e-9));
        }
        assert_eq!(track.frames[2].optics.focal_length, 40.0);
        assert_eq!(track.frames[0].optics.focus_distance, Some(500.0));
    }

    #[test]
    fn test_find_camera_prim_prefers_default() {
        let mut layer = UsdLayer::default();
        layer.prims.push(UsdPrim::new(PrimKind::Camera, "a"));
        layer.prims.push(UsdPrim::new(PrimKind::Camera, "b"));
        assert_eq!(find_camera_prim(&layer).unwrap().name, "a");

        layer.metadata.default_prim = Some("b".into());
        assert_eq!(find_camera_prim(&layer).unwrap().name, "b");
    }

    #[test]
    fn test_time_sample_bounds_and_position() {
        let doc = InterchangeCameraDocument::new("cam", metadata(), vec![frame(5, 1.0, 35.0), frame(9, 3.0, 35.0)]);
        let layer = doc.to_layer();
        let cam = &layer.prims[0];
        assert_eq!(time_sample_bounds(cam), Some((5.0, 9.0)));
        assert!(position_at(cam, 9.0).abs_diff_eq(DVec3::new(3.0, 0.0, 0.0), 1e-9));
    }
}
