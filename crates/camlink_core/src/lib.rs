//! camlink core - camera transcoding between a keyframe host and an editor host.
//!
//! This crate provides:
//!
//! - **Exporter**: samples a source camera over a frame range and authors a
//!   USDA interchange document (`export_camera`)
//! - **Importer**: rebuilds the camera and a timeline container on the
//!   destination host, and refreshes it on reload (`import_camera`, `reload`)
//! - **Inspector**: read-only report on a document (`print_debug`)
//! - **USD support**: USDA reading and atomic writing
//!
//! Hosts are reached through the [`CameraSource`] and [`CameraSink`] traits;
//! [`host::memory`] has in-memory implementations.
//!
//! # Example
//!
//! ```ignore
//! use camlink_core::host::memory::{InMemorySink, InMemorySource};
//! use camlink_core::{export_camera, import_camera, CameraLinkConfig, ExportRequest};
//!
//! let config = CameraLinkConfig::default();
//! let mut source = InMemorySource::load("shot010.json")?;
//! let summary = export_camera(&mut source, &ExportRequest::new("shot010_cam.usda"), &config)?;
//!
//! let mut sink = InMemorySink::new();
//! let outcome = import_camera(&mut sink, &summary.path, &config)?;
//! ```

pub mod camera;
pub mod config;
pub mod document;
pub mod error;
pub mod exporter;
pub mod host;
pub mod importer;
pub mod inspect;
pub mod range;
pub mod sampler;
pub mod units;
pub mod usd;

// Re-export commonly used types
pub use camera::{CameraFrame, CameraOptics, CameraSample, LensAttributes};
pub use config::{CameraLinkConfig, MetadataPolicy};
pub use document::{CameraTrack, DocumentMetadata, InterchangeCameraDocument};
pub use error::{CameraLinkError, Result};
pub use exporter::{export_camera, ExportRequest, ExportSummary};
pub use host::{CameraSink, CameraSource, ContainerId, StageId, TimelineSettings};
pub use importer::{import_camera, read_camera_track, reload, ImportOutcome};
pub use inspect::{print_debug, DebugReport};
pub use range::ExportRange;
pub use sampler::{Sampler, TimeGuard};
pub use units::{FrameRate, Resolution};
