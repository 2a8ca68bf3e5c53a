//! Camera observations and their converted, authorable form.
//!
//! A [`CameraSample`] is what the source host reports at one frame, in the
//! host's own units (filmback in inches, distances in scene units).
//! [`convert_sample`] turns it into a [`CameraFrame`] in the document's units:
//! millimetres for optics, centimetres for distances.

use camlink_math::{DMat4, XformComponents};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::units::{aperture_from_inches, resolve_aperture, AperturePolicy, LinearUnit};

/// Lens attributes in host units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensAttributes {
    /// Focal length in millimetres
    pub focal_length: f64,

    /// Filmback width in inches
    pub horizontal_aperture: f64,

    /// Filmback height in inches
    pub vertical_aperture: f64,

    /// Film offsets in inches
    pub horizontal_film_offset: f64,
    pub vertical_film_offset: f64,

    /// Clip planes in scene linear units
    pub near_clip: f64,
    pub far_clip: f64,

    /// Focus distance in scene linear units
    pub focus_distance: Option<f64>,

    pub f_stop: Option<f64>,
}

impl Default for LensAttributes {
    fn default() -> Self {
        // 35mm full aperture, the usual source-host default
        Self {
            focal_length: 35.0,
            horizontal_aperture: 1.417,
            vertical_aperture: 0.945,
            horizontal_film_offset: 0.0,
            vertical_film_offset: 0.0,
            near_clip: 0.1,
            far_clip: 10000.0,
            focus_distance: None,
            f_stop: None,
        }
    }
}

impl LensAttributes {
    /// Linear interpolation between two observations.
    ///
    /// Optional attributes interpolate only when both ends carry a value.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        let mix_opt = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => Some(mix(a, b)),
            (a, _) => a,
        };

        Self {
            focal_length: mix(self.focal_length, other.focal_length),
            horizontal_aperture: mix(self.horizontal_aperture, other.horizontal_aperture),
            vertical_aperture: mix(self.vertical_aperture, other.vertical_aperture),
            horizontal_film_offset: mix(self.horizontal_film_offset, other.horizontal_film_offset),
            vertical_film_offset: mix(self.vertical_film_offset, other.vertical_film_offset),
            near_clip: mix(self.near_clip, other.near_clip),
            far_clip: mix(self.far_clip, other.far_clip),
            focus_distance: mix_opt(self.focus_distance, other.focus_distance),
            f_stop: mix_opt(self.f_stop, other.f_stop),
        }
    }
}

/// One observation of camera state at a frame, in host units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSample {
    pub frame: i64,

    /// World-space transform, translation in scene linear units
    pub xform: XformComponents,

    pub lens: LensAttributes,
}

impl CameraSample {
    /// Compose the world matrix (translate, then rotateXYZ, then scale).
    pub fn world_matrix(&self) -> DMat4 {
        self.xform.to_matrix()
    }
}

/// Camera optics in document units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraOptics {
    /// Millimetres
    pub focal_length: f64,
    pub horizontal_aperture: f64,
    pub vertical_aperture: f64,
    pub horizontal_aperture_offset: f64,
    pub vertical_aperture_offset: f64,

    /// Near and far clip in centimetres
    pub clipping_range: (f64, f64),

    /// Centimetres
    pub focus_distance: Option<f64>,

    pub f_stop: Option<f64>,
}

/// A converted sample, ready to author.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFrame {
    pub frame: i64,

    /// Translation in centimetres
    pub xform: XformComponents,

    pub optics: CameraOptics,
}

impl CameraFrame {
    pub fn world_matrix(&self) -> DMat4 {
        self.xform.to_matrix()
    }
}

/// Converts host observations into document units.
#[derive(Clone, Copy, Debug)]
pub struct SampleConverter {
    pub linear_unit: LinearUnit,
    pub aperture: AperturePolicy,
}

impl SampleConverter {
    pub fn new(linear_unit: LinearUnit, aperture: AperturePolicy) -> Self {
        Self { linear_unit, aperture }
    }

    /// Convert one sample.
    pub fn convert(&self, sample: &CameraSample) -> CameraFrame {
        let lens = &sample.lens;
        let cm = |v: f64| self.linear_unit.to_centimeters(v);
        let (h_aperture, v_aperture) =
            resolve_aperture(lens.horizontal_aperture, lens.vertical_aperture, self.aperture);

        CameraFrame {
            frame: sample.frame,
            xform: sample.xform.with_translation_scaled(self.linear_unit.centimeters_per_unit()),
            optics: CameraOptics {
                focal_length: lens.focal_length,
                horizontal_aperture: h_aperture,
                vertical_aperture: v_aperture,
                horizontal_aperture_offset: aperture_from_inches(lens.horizontal_film_offset),
                vertical_aperture_offset: aperture_from_inches(lens.vertical_film_offset),
                clipping_range: (cm(lens.near_clip), cm(lens.far_clip)),
                focus_distance: lens.focus_distance.map(cm),
                f_stop: lens.f_stop,
            },
        }
    }
}

/// Convert every sample; the linear unit name is resolved once up front.
pub fn convert_samples(samples: &[CameraSample], linear_unit: &str, aperture: AperturePolicy) -> Result<Vec<CameraFrame>> {
    let converter = SampleConverter::new(linear_unit.parse()?, aperture);
    Ok(samples.iter().map(|s| converter.convert(s)).collect())
}
