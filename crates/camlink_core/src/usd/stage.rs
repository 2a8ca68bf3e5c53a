//! Reading and atomically saving USDA documents on disk.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::parser::parse_usda;
use super::types::UsdLayer;
use super::writer::write_usda;
use crate::error::{CameraLinkError, Result};

/// File extensions accepted for interchange documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["usda", "usd"];

/// Check that `path` names a `.usda` / `.usd` file.
pub fn validate_document_path(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(CameraLinkError::path(path, "expected a .usda or .usd file")),
    }
}

/// Read and parse a USDA document.
pub fn read_layer(path: impl AsRef<Path>) -> Result<UsdLayer> {
    let path = path.as_ref();
    log::debug!("Reading USDA: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| CameraLinkError::path(path, e))?;
    let layer = parse_usda(&content)?;

    log::debug!("Parsed {} root prims from {}", layer.prims.len(), path.display());
    Ok(layer)
}

/// Serialize `layer` and replace `path` in one step.
///
/// The text goes to a temp file in the destination directory which is then
/// renamed over the target, so readers see either the old or the new
/// document. Missing parent directories are created.
pub fn save_layer_atomic(layer: &UsdLayer, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    validate_document_path(path)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir().map_err(|e| CameraLinkError::path(path, e))?,
    };
    fs::create_dir_all(&dir).map_err(|e| CameraLinkError::path(&dir, e))?;

    let text = write_usda(layer);

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CameraLinkError::path(&dir, e))?;
    tmp.write_all(text.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| CameraLinkError::path(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| CameraLinkError::path(path, e.error))?;

    log::info!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}
