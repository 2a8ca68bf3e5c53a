//! Destination-side import and live reload.

use std::path::Path;

use crate::config::{CameraLinkConfig, MetadataPolicy};
use crate::document::{find_camera_prim, time_sample_bounds, CameraTrack, DocumentMetadata};
use crate::error::{CameraLinkError, Result};
use crate::host::{ActorId, CameraSink, ContainerId, StageBinding, StageId, TimelineSettings};
use crate::usd::{read_layer, PrimKind, UsdLayer, UsdPrim};

/// Range used when a degraded document has neither samples nor time codes.
const FALLBACK_RANGE: (i64, i64) = (1, 100);

/// Result of a first import.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportOutcome {
    pub container: ContainerId,
    pub stage: StageId,
    pub actor: ActorId,

    /// Camera prim the actor is bound to
    pub prim_path: String,

    pub metadata: DocumentMetadata,

    /// Metadata was derived from stage time codes and samples
    pub degraded: bool,
}

/// Read the metadata block, or derive it when the policy allows.
pub fn resolve_metadata(
    layer: &UsdLayer,
    camera: &UsdPrim,
    path: &Path,
    config: &CameraLinkConfig,
) -> Result<(DocumentMetadata, bool)> {
    let (metadata, degraded) = match DocumentMetadata::from_layer(layer) {
        Some(metadata) => (metadata, false),
        None if config.metadata_policy == MetadataPolicy::Strict => {
            return Err(CameraLinkError::MetadataMissing {
                path: path.to_path_buf(),
            })
        }
        None => {
            let fps = layer.metadata.time_codes_per_second.unwrap_or(config.fallback_fps);
            let stage_range = layer.metadata.start_time_code.zip(layer.metadata.end_time_code);
            let (start, end) = time_sample_bounds(camera)
                .or(stage_range)
                .map(|(s, e)| (s.round() as i64, e.round() as i64))
                .unwrap_or(FALLBACK_RANGE);

            log::warn!(
                "No metadata block in {}; using {}-{} @ {} fps from the stage",
                path.display(),
                start,
                end,
                fps
            );
            (
                DocumentMetadata {
                    fps,
                    start_frame: start,
                    end_frame: end,
                    render_resolution: None,
                },
                true,
            )
        }
    };

    if !(metadata.fps.is_finite() && metadata.fps > 0.0) {
        return Err(CameraLinkError::UnsupportedRate(metadata.fps.to_string()));
    }
    if metadata.end_frame < metadata.start_frame {
        return Err(CameraLinkError::Range {
            start: metadata.start_frame,
            end: metadata.end_frame,
            step: 1,
            reason: format!("document range in {} is inverted", path.display()),
        });
    }

    Ok((metadata, degraded))
}

fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "camera".to_string())
}

/// Bound camera prim of `binding` in a freshly read layer.
fn bound_camera<'l>(layer: &'l UsdLayer, binding: &StageBinding, path: &Path) -> Result<&'l UsdPrim> {
    layer
        .find_prim(&binding.prim)
        .filter(|p| p.kind == PrimKind::Camera)
        .ok_or_else(|| CameraLinkError::PrimMissing {
            prim: binding.prim.clone(),
            path: path.to_path_buf(),
        })
}

fn update_bound_containers<K: CameraSink + ?Sized>(
    sink: &mut K,
    bindings: &[StageBinding],
    settings: &TimelineSettings,
) -> Result<()> {
    for binding in bindings {
        sink.update_container(binding.container, settings)?;
    }
    Ok(())
}

/// Import a document: stage reference, camera actor and timeline container.
///
/// Every call creates a new actor and container; the stage reference for a
/// path is shared. A shared stage is reloaded first and the containers of
/// earlier imports are brought in line with the document.
pub fn import_camera<K: CameraSink + ?Sized>(
    sink: &mut K,
    path: impl AsRef<Path>,
    config: &CameraLinkConfig,
) -> Result<ImportOutcome> {
    let path = path.as_ref();
    log::info!("Importing camera from {}", path.display());

    let layer = read_layer(path)?;
    let camera = find_camera_prim(&layer)
        .ok_or_else(|| CameraLinkError::resolution(path.display().to_string(), "no Camera prim in document"))?;
    let (metadata, degraded) = resolve_metadata(&layer, camera, path, config)?;

    let stem = document_stem(path);
    let settings = TimelineSettings::new(metadata.start_frame, metadata.end_frame, metadata.fps, config.view_padding);

    let stage = match sink.find_stage(path) {
        Some(stage) => {
            // Shared stage may predate this document
            sink.reload_stage(stage)?;
            let earlier = sink.stage_bindings(stage);
            if !earlier.is_empty() {
                log::info!("Refreshing {} earlier import(s) on {}", earlier.len(), stage);
            }
            update_bound_containers(sink, &earlier, &settings)?;
            stage
        }
        None => sink.open_stage(path)?,
    };

    let actor = sink.spawn_camera_actor(stage, &camera.path, &config.actor_label(&stem))?;

    let container = sink.create_container(&config.timeline_name(&stem), &settings)?;
    sink.bind_camera_cut(container, actor)?;
    sink.add_stage_binding(
        stage,
        StageBinding {
            prim: camera.path.clone(),
            actor,
            container,
        },
    )?;
    sink.present(container)?;

    log::info!(
        "Imported {}: frames {}-{} @ {} fps{}",
        camera.path,
        metadata.start_frame,
        metadata.end_frame,
        metadata.fps,
        if degraded { " (degraded)" } else { "" }
    );

    Ok(ImportOutcome {
        container,
        stage,
        actor,
        prim_path: camera.path.clone(),
        metadata,
        degraded,
    })
}

/// Re-read an imported document and refresh its containers in place.
///
/// Every container imported through `stage` is updated; the one from the most
/// recent import is returned. The document is validated before anything on
/// the host changes: if any bound camera prim is gone the call fails with
/// `PrimMissing` and the stage and containers are left as they were. Only the
/// containers' own range and rate are updated; sections inside them are not
/// resized.
pub fn reload<K: CameraSink + ?Sized>(sink: &mut K, stage: StageId, config: &CameraLinkConfig) -> Result<ContainerId> {
    let bindings = sink.stage_bindings(stage);
    let latest = bindings
        .last()
        .cloned()
        .ok_or_else(|| CameraLinkError::Host(format!("{} has no imported camera", stage)))?;
    let path = sink.stage_path(stage)?;

    let layer = read_layer(&path)?;
    for binding in &bindings {
        bound_camera(&layer, binding, &path)?;
    }
    let camera = bound_camera(&layer, &latest, &path)?;
    let (metadata, _) = resolve_metadata(&layer, camera, &path, config)?;

    sink.reload_stage(stage)?;
    let settings = TimelineSettings::new(metadata.start_frame, metadata.end_frame, metadata.fps, config.view_padding);
    update_bound_containers(sink, &bindings, &settings)?;

    log::info!(
        "Reloaded {}: {} container(s) now {}-{} @ {} fps",
        path.display(),
        bindings.len(),
        metadata.start_frame,
        metadata.end_frame,
        metadata.fps
    );
    Ok(latest.container)
}

/// Decode the document's camera frame by frame.
pub fn read_camera_track(path: impl AsRef<Path>) -> Result<CameraTrack> {
    let path = path.as_ref();
    let layer = read_layer(path)?;
    let camera = find_camera_prim(&layer)
        .ok_or_else(|| CameraLinkError::resolution(path.display().to_string(), "no Camera prim in document"))?;

    CameraTrack::decode(&layer, &camera.path).ok_or_else(|| CameraLinkError::PrimMissing {
        prim: camera.path.clone(),
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::parse_usda;
    use std::path::PathBuf;

    const NO_METADATA: &str = r#"#usda 1.0
(
    timeCodesPerSecond = 30
)

def Camera "cam"
{
    double3 xformOp:translate.timeSamples = {
        5: (0, 0, 0),
        40: (1, 0, 0),
    }
    uniform token[] xformOpOrder = ["xformOp:translate"]
}
"#;

    fn resolve(policy: MetadataPolicy) -> Result<(DocumentMetadata, bool)> {
        let layer = parse_usda(NO_METADATA).unwrap();
        let config = CameraLinkConfig {
            metadata_policy: policy,
            ..Default::default()
        };
        resolve_metadata(&layer, &layer.prims[0], &PathBuf::from("cam.usda"), &config)
    }

    #[test]
    fn test_degraded_metadata_from_samples() {
        let (metadata, degraded) = resolve(MetadataPolicy::Degrade).unwrap();
        assert!(degraded);
        assert_eq!(metadata.fps, 30.0);
        assert_eq!((metadata.start_frame, metadata.end_frame), (5, 40));
    }

    #[test]
    fn test_strict_metadata_policy() {
        assert!(matches!(
            resolve(MetadataPolicy::Strict),
            Err(CameraLinkError::MetadataMissing { .. })
        ));
    }

    #[test]
    fn test_zero_fps_rejected() {
        let usda = NO_METADATA.replace("timeCodesPerSecond = 30", "timeCodesPerSecond = 0");
        let layer = parse_usda(&usda).unwrap();
        let err = resolve_metadata(&layer, &layer.prims[0], Path::new("cam.usda"), &CameraLinkConfig::default());
        assert!(matches!(err, Err(CameraLinkError::UnsupportedRate(_))));
    }

    #[test]
    fn test_document_stem() {
        assert_eq!(document_stem(Path::new("/shots/sh010_cam.usda")), "sh010_cam");
    }
}
