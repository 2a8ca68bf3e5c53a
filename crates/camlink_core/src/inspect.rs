//! Read-only document inspector.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::document::{find_camera_prim, DocumentMetadata};
use crate::error::Result;
use crate::usd::{read_layer, UsdLayer};

/// Time sample count of one attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeReport {
    pub name: String,

    /// Static attributes count as one
    pub samples: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimReport {
    pub path: String,
    pub type_name: String,
    pub attributes: Vec<AttributeReport>,
}

/// What the inspector found in a document.
#[derive(Clone, Debug, PartialEq)]
pub struct DebugReport {
    pub path: PathBuf,
    pub time_codes_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,

    /// `None` when the metadata block is absent
    pub metadata: Option<DocumentMetadata>,

    pub prims: Vec<PrimReport>,

    /// Most time samples on any attribute of the camera prim
    pub sample_count: usize,
}

impl DebugReport {
    /// Build a report from a parsed layer.
    pub fn from_layer(path: impl Into<PathBuf>, layer: &UsdLayer) -> Self {
        let prims = layer
            .traverse()
            .into_iter()
            .map(|prim| PrimReport {
                path: prim.path.clone(),
                type_name: prim.kind.type_name().to_string(),
                attributes: prim
                    .attributes
                    .iter()
                    .map(|a| AttributeReport {
                        name: a.name.clone(),
                        samples: a.sample_count(),
                    })
                    .collect(),
            })
            .collect();

        let sample_count = find_camera_prim(layer)
            .and_then(|cam| cam.attributes.iter().map(|a| a.sample_count()).max())
            .unwrap_or(0);

        Self {
            path: path.into(),
            time_codes_per_second: layer.metadata.time_codes_per_second,
            start_time_code: layer.metadata.start_time_code,
            end_time_code: layer.metadata.end_time_code,
            metadata: DocumentMetadata::from_layer(layer),
            prims,
            sample_count,
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// A one-sample (or unsampled) camera.
    pub fn is_static(&self) -> bool {
        self.sample_count <= 1
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(f, "  TimeCodesPerSecond: {}", fmt_opt(self.time_codes_per_second))?;
        writeln!(f, "  StartTimeCode: {}", fmt_opt(self.start_time_code))?;
        writeln!(f, "  EndTimeCode: {}", fmt_opt(self.end_time_code))?;

        match &self.metadata {
            Some(md) => {
                write!(f, "  Metadata: frames {}-{} @ {} fps", md.start_frame, md.end_frame, md.fps)?;
                if let Some(res) = md.render_resolution {
                    write!(f, ", aspect-matched to {}", res)?;
                }
                writeln!(f)?;
            }
            None => writeln!(f, "  Metadata: missing")?,
        }

        writeln!(f, "  Prims:")?;
        for prim in &self.prims {
            writeln!(f, "    {} ({})", prim.path, prim.type_name)?;
            for attr in prim.attributes.iter().filter(|a| a.samples > 1) {
                writeln!(f, "      {}: {} samples", attr.name, attr.samples)?;
            }
        }

        let verdict = if self.is_static() { "static" } else { "keyed" };
        writeln!(f, "  Camera: {} ({} samples)", verdict, self.sample_count)?;
        write!(f, "{}", rule)
    }
}

/// Inspect a document and log the report.
pub fn print_debug(path: impl AsRef<Path>) -> Result<DebugReport> {
    let path = path.as_ref();
    let layer = read_layer(path)?;
    let report = DebugReport::from_layer(path, &layer);

    for line in report.to_string().lines() {
        log::info!("[USD Debug] {}", line);
    }
    Ok(report)
}
