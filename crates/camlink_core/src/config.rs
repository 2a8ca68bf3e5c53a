//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```json
//! { "default_step": 2, "metadata_policy": "strict", "view_padding": 24 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CameraLinkError, Result};
use crate::units::Resolution;

/// What the importer does when a document has no metadata block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataPolicy {
    /// Derive fps from `timeCodesPerSecond` and the range from time samples,
    /// and flag the import as degraded.
    #[default]
    Degrade,

    /// Fail with `MetadataMissing`.
    Strict,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraLinkConfig {
    /// Frame step when the caller gives none
    pub default_step: i64,

    /// Aspect-match apertures unless the caller says otherwise
    pub aspect_match: bool,

    /// Resolution for aspect matching; the host render resolution when unset
    pub resolution: Option<Resolution>,

    pub metadata_policy: MetadataPolicy,

    /// Rate used when a document carries neither metadata nor `timeCodesPerSecond`
    pub fallback_fps: f64,

    /// Timeline container name prefix, followed by the document stem
    pub timeline_prefix: String,

    /// Camera actor label prefix, followed by the document stem
    pub actor_prefix: String,

    /// Frames of view range either side of playback
    pub view_padding: i64,
}

impl Default for CameraLinkConfig {
    fn default() -> Self {
        Self {
            default_step: 1,
            aspect_match: false,
            resolution: None,
            metadata_policy: MetadataPolicy::Degrade,
            fallback_fps: 24.0,
            timeline_prefix: "LS_".to_string(),
            actor_prefix: "USD_Cam_".to_string(),
            view_padding: 10,
        }
    }
}

impl CameraLinkConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| CameraLinkError::path(path, e))?;
        let config = Self::from_json_str(&json)?;
        log::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Timeline container name for a document stem.
    pub fn timeline_name(&self, stem: &str) -> String {
        format!("{}{}", self.timeline_prefix, stem)
    }

    /// Camera actor label for a document stem.
    pub fn actor_label(&self, stem: &str) -> String {
        format!("{}{}", self.actor_prefix, stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = CameraLinkConfig::from_json_str(r#"{ "metadata_policy": "strict", "view_padding": 24 }"#).unwrap();
        assert_eq!(config.metadata_policy, MetadataPolicy::Strict);
        assert_eq!(config.view_padding, 24);
        assert_eq!(config.default_step, 1);
        assert_eq!(config.timeline_name("shot010"), "LS_shot010");
        assert_eq!(config.actor_label("shot010"), "USD_Cam_shot010");
    }

    #[test]
    fn test_resolution_from_json() {
        let config =
            CameraLinkConfig::from_json_str(r#"{ "aspect_match": true, "resolution": { "width": 2048, "height": 858 } }"#)
                .unwrap();
        assert_eq!(config.resolution, Some(Resolution::new(2048, 858)));
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(matches!(
            CameraLinkConfig::from_json_str(r#"{ "metadata_policy": "maybe" }"#),
            Err(CameraLinkError::Config(_))
        ));
    }
}
