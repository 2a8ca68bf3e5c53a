//! Source-side export: sample a camera and author the interchange document.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use crate::camera::SampleConverter;
use crate::config::CameraLinkConfig;
use crate::document::{DocumentMetadata, InterchangeCameraDocument};
use crate::error::{CameraLinkError, Result};
use crate::host::CameraSource;
use crate::range::ExportRange;
use crate::sampler::Sampler;
use crate::units::{fps_from_time_unit, AperturePolicy, LinearUnit, Resolution};
use crate::usd::{save_layer_atomic, validate_document_path};

/// Parameters of one export.
///
/// Anything left unset falls back to the config or the source host: the
/// range to the playback range, the step to `default_step`, the resolution
/// to the host render resolution.
#[derive(Clone, Debug, Default)]
pub struct ExportRequest<'a> {
    /// Node name; the selection when unset
    pub camera: Option<String>,

    pub path: PathBuf,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub step: Option<i64>,
    pub aspect_match: Option<bool>,
    pub resolution: Option<Resolution>,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> ExportRequest<'a> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn camera(mut self, name: impl Into<String>) -> Self {
        self.camera = Some(name.into());
        self
    }

    pub fn range(mut self, start: i64, end: i64, step: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self.step = Some(step);
        self
    }

    /// Aspect-match the filmback, optionally against an explicit resolution.
    pub fn aspect_match(mut self, resolution: Option<Resolution>) -> Self {
        self.aspect_match = Some(true);
        self.resolution = resolution;
        self
    }

    pub fn cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }
}

/// Result of a successful export.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub sample_count: usize,
    pub prim_path: String,
    pub fps: f64,
    pub range: ExportRange,
}

/// Sample the requested camera and write the document atomically.
pub fn export_camera<S: CameraSource + ?Sized>(
    source: &mut S,
    request: &ExportRequest<'_>,
    config: &CameraLinkConfig,
) -> Result<ExportSummary> {
    let path: &Path = &request.path;
    validate_document_path(path)?;

    let (playback_start, playback_end) = source.playback_range();
    let range = ExportRange::new(
        request.start.unwrap_or(playback_start),
        request.end.unwrap_or(playback_end),
        request.step.unwrap_or(config.default_step),
    )?;

    let node = source.resolve_camera(request.camera.as_deref())?;
    let fps = fps_from_time_unit(&source.time_unit())?;
    let linear_unit: LinearUnit = source.linear_unit().parse()?;

    let aperture = if request.aspect_match.unwrap_or(config.aspect_match) {
        let resolution = request
            .resolution
            .or(config.resolution)
            .unwrap_or_else(|| source.render_resolution());
        if !resolution.is_valid() {
            return Err(CameraLinkError::Host(format!("render resolution {} is empty", resolution)));
        }
        AperturePolicy::AspectMatch(resolution)
    } else {
        AperturePolicy::Native
    };

    log::info!("Exporting camera: {}", node.transform);
    log::info!("  Frame range: {} - {} (step {})", range.start, range.end, range.step);
    log::info!("  FPS: {}", fps);

    let mut sampler = Sampler::new(range);
    if let Some(flag) = request.cancel {
        sampler = sampler.with_cancel_flag(flag);
    }
    let samples = sampler.sample(source, &node)?;

    let converter = SampleConverter::new(linear_unit, aperture);
    let frames = samples.iter().map(|s| converter.convert(s)).collect();

    let metadata = DocumentMetadata {
        fps,
        start_frame: range.start,
        end_frame: range.end,
        render_resolution: match aperture {
            AperturePolicy::AspectMatch(res) => Some(res),
            AperturePolicy::Native => None,
        },
    };

    let document = InterchangeCameraDocument::new(&node.transform, metadata, frames);
    save_layer_atomic(&document.to_layer(), path)?;

    log::info!("  Wrote {} time samples to {}", document.sample_count(), path.display());

    Ok(ExportSummary {
        path: path.to_path_buf(),
        sample_count: document.sample_count(),
        prim_path: document.prim_path(),
        fps,
        range,
    })
}
