//! USD (Universal Scene Description) support for camlink.
//!
//! This module reads and writes USDA (ASCII) layers: enough of the format to
//! carry a camera prim, its time samples and the layer metadata block.
//!
//! ## Supported USD Features
//!
//! - Layer metadata (`defaultPrim`, `upAxis`, `metersPerUnit`,
//!   `timeCodesPerSecond`, `startTimeCode`, `endTimeCode`, `customLayerData`)
//! - `Camera`, `Xform` and `Scope` prims, nested
//! - Static and time-sampled attributes of scalar, tuple, matrix and token types
//!
//! ## Not Supported
//!
//! - Binary `.usdc` format
//! - References, payloads, variants and other composition arcs
//!
//! # Example
//!
//! ```ignore
//! use camlink_core::usd::read_layer;
//!
//! let layer = read_layer("shot010_cam.usda")?;
//! for prim in layer.traverse() {
//!     println!("{} ({})", prim.path, prim.kind.type_name());
//! }
//! ```

mod parser;
mod stage;
mod types;
mod writer;

pub use parser::*;
pub use stage::*;
pub use types::*;
pub use writer::*;
