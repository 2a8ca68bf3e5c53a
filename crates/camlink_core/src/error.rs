//! Error taxonomy for the camera transcoding pipeline.
//!
//! Every sampling, conversion and I/O failure surfaces as one of these
//! variants; the exporter and importer never swallow them.

use std::path::PathBuf;

use thiserror::Error;

use crate::usd::ParseError;

/// Errors raised by the exporter, importer and inspector.
#[derive(Error, Debug)]
pub enum CameraLinkError {
    /// Source node is missing or is not a transform+lens pair.
    #[error("Cannot resolve camera '{node}': {reason}")]
    Resolution { node: String, reason: String },

    /// Invalid frame range or step.
    #[error("Invalid frame range {start}..{end} step {step}: {reason}")]
    Range {
        start: i64,
        end: i64,
        step: i64,
        reason: String,
    },

    /// Document path cannot be read or written.
    #[error("Path error for '{}': {reason}", path.display())]
    Path { path: PathBuf, reason: String },

    /// Scene linear unit not in the conversion table.
    #[error("Unrecognized scene linear unit: '{0}'")]
    UnitConversion(String),

    /// Host time unit does not resolve to a frame rate.
    #[error("Unsupported or indeterminate frame rate: '{0}'")]
    UnsupportedRate(String),

    /// Document has no metadata block and degraded import was not allowed.
    #[error("Metadata block missing in '{}'", path.display())]
    MetadataMissing { path: PathBuf },

    /// Camera prim bound at import time no longer exists in the document.
    #[error("Camera prim '{prim}' not found in '{}'", path.display())]
    PrimMissing { prim: String, path: PathBuf },

    /// USDA syntax error.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Malformed JSON configuration or scene description.
    #[error("Invalid JSON: {0}")]
    Config(#[from] serde_json::Error),

    /// A host collaborator refused an operation.
    #[error("Host error: {0}")]
    Host(String),

    /// Sampling was cancelled between frames.
    #[error("Export cancelled after {completed} of {total} frames")]
    Cancelled { completed: usize, total: usize },
}

impl CameraLinkError {
    /// Build a `Path` error from an I/O failure.
    pub fn path(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Path {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Build a `Resolution` error.
    pub fn resolution(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CameraLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_subject() {
        let err = CameraLinkError::path("/tmp/x.usda", "permission denied");
        assert!(err.to_string().contains("/tmp/x.usda"));
        assert!(err.to_string().contains("permission denied"));

        let err = CameraLinkError::PrimMissing {
            prim: "/shotCam".into(),
            path: PathBuf::from("cam.usda"),
        };
        assert!(err.to_string().contains("/shotCam"));
    }
}
