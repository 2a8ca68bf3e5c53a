// Transform op composition for camera prims
//
// Mirrors the USD xformOp stack: ops are listed outermost first and multiplied
// left to right, so `[translate, rotateXYZ, scale]` yields `T * R * S`.
// Everything is double precision since cameras routinely sit far from origin.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Transform operation types authored on a camera prim.
#[derive(Clone, Debug, PartialEq)]
pub enum XformOp {
    /// Translation (xformOp:translate)
    Translate(DVec3),

    /// Rotation in degrees around X axis
    RotateX(f64),

    /// Rotation in degrees around Y axis
    RotateY(f64),

    /// Rotation in degrees around Z axis
    RotateZ(f64),

    /// Euler rotation in degrees, X applied first, then Y, then Z
    RotateXYZ(DVec3),

    /// Scale (uniform or non-uniform)
    Scale(DVec3),

    /// Full 4x4 transform matrix
    Transform(DMat4),
}

impl XformOp {
    /// Convert this operation to a transformation matrix.
    pub fn to_matrix(&self) -> DMat4 {
        match self {
            XformOp::Translate(t) => DMat4::from_translation(*t),
            XformOp::RotateX(deg) => DMat4::from_rotation_x(deg.to_radians()),
            XformOp::RotateY(deg) => DMat4::from_rotation_y(deg.to_radians()),
            XformOp::RotateZ(deg) => DMat4::from_rotation_z(deg.to_radians()),
            XformOp::RotateXYZ(euler) => {
                DMat4::from_rotation_z(euler.z.to_radians())
                    * DMat4::from_rotation_y(euler.y.to_radians())
                    * DMat4::from_rotation_x(euler.x.to_radians())
            }
            XformOp::Scale(s) => DMat4::from_scale(*s),
            XformOp::Transform(m) => *m,
        }
    }
}

/// Combine a list of xformOps into a single matrix.
pub fn compose_xform_ops(ops: &[XformOp]) -> DMat4 {
    let mut result = DMat4::IDENTITY;
    for op in ops {
        result = result * op.to_matrix();
    }
    result
}

/// World-space transform of a camera node as translate / rotateXYZ / scale.
///
/// This is the decomposition hosts report when queried in world space, and the
/// order the interchange document authors its ops in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XformComponents {
    /// Translation in scene linear units
    pub translate: DVec3,

    /// Euler rotation in degrees (XYZ order)
    pub rotate_xyz: DVec3,

    /// Per-axis scale
    pub scale: DVec3,
}

impl Default for XformComponents {
    fn default() -> Self {
        Self {
            translate: DVec3::ZERO,
            rotate_xyz: DVec3::ZERO,
            scale: DVec3::ONE,
        }
    }
}

impl XformComponents {
    /// Create components from translation and rotation with unit scale.
    pub fn new(translate: DVec3, rotate_xyz: DVec3) -> Self {
        Self {
            translate,
            rotate_xyz,
            scale: DVec3::ONE,
        }
    }

    /// The op stack in authoring order.
    pub fn ops(&self) -> [XformOp; 3] {
        [
            XformOp::Translate(self.translate),
            XformOp::RotateXYZ(self.rotate_xyz),
            XformOp::Scale(self.scale),
        ]
    }

    /// Compose into a 4x4 world matrix.
    pub fn to_matrix(&self) -> DMat4 {
        compose_xform_ops(&self.ops())
    }

    /// Return a copy with translation multiplied by `factor` (unit conversion).
    pub fn with_translation_scaled(&self, factor: f64) -> Self {
        Self {
            translate: self.translate * factor,
            ..*self
        }
    }

    /// Linear interpolation between two observations.
    ///
    /// Euler angles are interpolated per component, matching what a host does
    /// when evaluating independent rotate curves.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            translate: self.translate.lerp(other.translate, t),
            rotate_xyz: self.rotate_xyz.lerp(other.rotate_xyz, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}
