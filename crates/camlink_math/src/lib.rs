// Re-export glam for convenience
pub use glam::*;

// camlink math types
mod xform;
pub use xform::{compose_xform_ops, XformComponents, XformOp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvec3_creation() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
    }

    #[test]
    fn test_dmat4_translation_column() {
        let m = DMat4::from_translation(DVec3::new(4.0, 5.0, 6.0));
        assert_eq!(m.w_axis.truncate(), DVec3::new(4.0, 5.0, 6.0));
    }
}
