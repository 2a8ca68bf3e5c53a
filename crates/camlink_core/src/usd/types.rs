//! USD layer types for intermediate representation.
//!
//! These types represent a parsed (or about-to-be-written) USDA layer before
//! it is interpreted as a camera document.

use std::collections::BTreeMap;

use camlink_math::{DMat4, DVec3, Vec2, Vec3};

/// A single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum UsdValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    Float2(Vec2),
    Float3(Vec3),
    Double3(DVec3),
    Matrix4d(DMat4),
    Token(String),
    String(String),
    TokenArray(Vec<String>),

    /// Value of a type the reader does not interpret, kept verbatim
    Raw(String),
}

impl UsdValue {
    /// Numeric value as f64 (Int, Float and Double only).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            UsdValue::Int(v) => Some(*v as f64),
            UsdValue::Float(v) => Some(f64::from(*v)),
            UsdValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value; doubles are accepted when they hold a whole number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            UsdValue::Int(v) => Some(*v),
            UsdValue::Float(_) | UsdValue::Double(_) => self
                .as_f64()
                .filter(|v| v.fract() == 0.0)
                .map(|v| v as i64),
            _ => None,
        }
    }

    /// Three-component value widened to double precision.
    pub fn as_dvec3(&self) -> Option<DVec3> {
        match self {
            UsdValue::Double3(v) => Some(*v),
            UsdValue::Float3(v) => Some(v.as_dvec3()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            UsdValue::Token(s) | UsdValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered (time, value) pairs of an animated attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSamples {
    samples: Vec<(f64, UsdValue)>,
}

impl TimeSamples {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample, replacing any existing sample at the same time.
    pub fn insert(&mut self, time: f64, value: UsdValue) {
        match self.samples.binary_search_by(|(t, _)| t.total_cmp(&time)) {
            Ok(i) => self.samples[i].1 = value,
            Err(i) => self.samples.insert(i, (time, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, UsdValue)> {
        self.samples.iter()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(t, _)| *t)
    }

    /// First and last sample times.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.samples.first()?.0, self.samples.last()?.0))
    }

    /// Held (step) evaluation: the latest sample at or before `time`, or the
    /// first sample when `time` precedes all of them.
    pub fn value_at(&self, time: f64) -> Option<&UsdValue> {
        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        let idx = idx.saturating_sub(1);
        self.samples.get(idx).map(|(_, v)| v)
    }
}

impl FromIterator<(f64, UsdValue)> for TimeSamples {
    fn from_iter<I: IntoIterator<Item = (f64, UsdValue)>>(iter: I) -> Self {
        let mut samples = TimeSamples::new();
        for (t, v) in iter {
            samples.insert(t, v);
        }
        samples
    }
}

/// A prim attribute: a static default, time samples, or both.
#[derive(Clone, Debug, PartialEq)]
pub struct UsdAttribute {
    /// Attribute name, e.g. `focalLength` or `xformOp:translate`
    pub name: String,

    /// Value type name, e.g. `float`, `double3`, `token[]`
    pub type_name: String,

    /// Declared `uniform` (not animatable)
    pub uniform: bool,

    /// Static value
    pub default: Option<UsdValue>,

    /// Animated values
    pub time_samples: Option<TimeSamples>,
}

impl UsdAttribute {
    /// A static attribute.
    pub fn with_default(name: impl Into<String>, type_name: impl Into<String>, value: UsdValue) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            uniform: false,
            default: Some(value),
            time_samples: None,
        }
    }

    /// An animated attribute.
    pub fn with_samples(name: impl Into<String>, type_name: impl Into<String>, samples: TimeSamples) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            uniform: false,
            default: None,
            time_samples: Some(samples),
        }
    }

    /// Mark as `uniform`.
    pub fn uniform(mut self) -> Self {
        self.uniform = true;
        self
    }

    pub fn is_time_sampled(&self) -> bool {
        self.time_samples.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Time sample count; a static-only attribute counts as one sample.
    pub fn sample_count(&self) -> usize {
        match &self.time_samples {
            Some(samples) if !samples.is_empty() => samples.len(),
            _ => usize::from(self.default.is_some()),
        }
    }

    /// Resolve the value at `time`: time samples win over the default.
    pub fn value_at(&self, time: f64) -> Option<&UsdValue> {
        self.time_samples
            .as_ref()
            .and_then(|s| s.value_at(time))
            .or(self.default.as_ref())
    }
}

/// Prim type, as written after `def`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimKind {
    Camera,
    Xform,
    Scope,
    Other(String),
}

impl PrimKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Camera" => PrimKind::Camera,
            "Xform" => PrimKind::Xform,
            "Scope" => PrimKind::Scope,
            other => PrimKind::Other(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            PrimKind::Camera => "Camera",
            PrimKind::Xform => "Xform",
            PrimKind::Scope => "Scope",
            PrimKind::Other(name) => name,
        }
    }
}

/// A parsed USD prim.
#[derive(Clone, Debug, PartialEq)]
pub struct UsdPrim {
    /// Prim path (e.g. "/shotCam")
    pub path: String,

    /// Prim name (last component of path)
    pub name: String,

    pub kind: PrimKind,

    pub attributes: Vec<UsdAttribute>,

    /// Child prims
    pub children: Vec<UsdPrim>,
}

impl UsdPrim {
    /// Create a root-level prim.
    pub fn new(kind: PrimKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: format!("/{}", name),
            name,
            kind,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&UsdAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Add or replace an attribute by name.
    pub fn set_attribute(&mut self, attr: UsdAttribute) {
        match self.attributes.iter_mut().find(|a| a.name == attr.name) {
            Some(existing) => *existing = attr,
            None => self.attributes.push(attr),
        }
    }
}

/// Layer-level metadata from the header block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerMetadata {
    pub default_prim: Option<String>,
    pub up_axis: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub time_codes_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,

    /// `customLayerData` dictionary, key-sorted
    pub custom_layer_data: BTreeMap<String, UsdValue>,
}

/// A whole USDA layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsdLayer {
    pub metadata: LayerMetadata,

    /// Root prims
    pub prims: Vec<UsdPrim>,
}

impl UsdLayer {
    /// Depth-first walk over every prim.
    pub fn traverse(&self) -> Vec<&UsdPrim> {
        fn walk<'a>(prim: &'a UsdPrim, out: &mut Vec<&'a UsdPrim>) {
            out.push(prim);
            for child in &prim.children {
                walk(child, out);
            }
        }

        let mut out = Vec::new();
        for prim in &self.prims {
            walk(prim, &mut out);
        }
        out
    }

    /// Find a prim by absolute path.
    pub fn find_prim(&self, path: &str) -> Option<&UsdPrim> {
        self.traverse().into_iter().find(|p| p.path == path)
    }

    /// All prims of a given kind.
    pub fn prims_of_kind(&self, kind: &PrimKind) -> Vec<&UsdPrim> {
        self.traverse().into_iter().filter(|p| &p.kind == kind).collect()
    }
}
