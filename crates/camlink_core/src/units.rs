//! Unit and optics conversion.
//!
//! Pure functions with no I/O: filmback policy, linear unit scaling and frame
//! rate resolution. Everything here is deterministic and is tested without a
//! live scene.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CameraLinkError, Result};

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Full-frame horizontal filmback used when matching a render aspect.
pub const FULL_FRAME_APERTURE_MM: f64 = 36.0;

/// Convert a filmback measurement from inches to millimetres.
pub fn aperture_from_inches(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

/// Render resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Height over width.
    pub fn inverse_aspect(&self) -> f64 {
        f64::from(self.height) / f64::from(self.width)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `1920x1080`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("bad width '{}': {}", w, e))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("bad height '{}': {}", h, e))?;
        let res = Resolution::new(width, height);
        if !res.is_valid() {
            return Err(format!("resolution must be non-zero, got '{}'", s));
        }
        Ok(res)
    }
}

/// How horizontal/vertical aperture are derived.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AperturePolicy {
    /// Fixed 36mm horizontal, vertical from the render aspect.
    AspectMatch(Resolution),
    /// Trust the host filmback (inches), converted to millimetres.
    Native,
}

/// Resolve (horizontal, vertical) aperture in millimetres.
pub fn resolve_aperture(native_h_inches: f64, native_v_inches: f64, policy: AperturePolicy) -> (f64, f64) {
    match policy {
        AperturePolicy::AspectMatch(res) => {
            let h = FULL_FRAME_APERTURE_MM;
            (h, h * res.inverse_aspect())
        }
        AperturePolicy::Native => (
            aperture_from_inches(native_h_inches),
            aperture_from_inches(native_v_inches),
        ),
    }
}

/// Scene linear units a source host may report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinearUnit {
    Millimeter,
    Centimeter,
    Meter,
    Inch,
    Foot,
    Yard,
}

impl LinearUnit {
    /// Centimetres in one of this unit.
    pub fn centimeters_per_unit(self) -> f64 {
        match self {
            LinearUnit::Millimeter => 0.1,
            LinearUnit::Centimeter => 1.0,
            LinearUnit::Meter => 100.0,
            LinearUnit::Inch => 2.54,
            LinearUnit::Foot => 30.48,
            LinearUnit::Yard => 91.44,
        }
    }

    /// Convert a length in this unit to centimetres.
    pub fn to_centimeters(self, value: f64) -> f64 {
        value * self.centimeters_per_unit()
    }
}

impl FromStr for LinearUnit {
    type Err = CameraLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimetre" => Ok(LinearUnit::Millimeter),
            "cm" | "centimeter" | "centimetre" => Ok(LinearUnit::Centimeter),
            "m" | "meter" | "metre" => Ok(LinearUnit::Meter),
            "in" | "inch" => Ok(LinearUnit::Inch),
            "ft" | "foot" => Ok(LinearUnit::Foot),
            "yd" | "yard" => Ok(LinearUnit::Yard),
            _ => Err(CameraLinkError::UnitConversion(s.to_string())),
        }
    }
}

/// Convert a focus distance in the named scene unit to centimetres.
pub fn focus_distance_to_cm(value: f64, unit: &str) -> Result<f64> {
    Ok(unit.parse::<LinearUnit>()?.to_centimeters(value))
}

/// Named host time units and their rates.
const NAMED_RATES: &[(&str, f64)] = &[
    ("game", 15.0),
    ("film", 24.0),
    ("pal", 25.0),
    ("ntsc", 30.0),
    ("show", 48.0),
    ("palf", 50.0),
    ("ntscf", 60.0),
    ("23.976fps", 23.976),
    ("29.97fps", 29.97),
    ("29.97df", 29.97),
    ("47.952fps", 47.952),
    ("59.94fps", 59.94),
];

/// Resolve a host time-unit name to frames per second.
///
/// Accepts the named rates above and any `<N>fps` custom rate.
pub fn fps_from_time_unit(name: &str) -> Result<f64> {
    let key = name.trim().to_ascii_lowercase();

    if let Some(&(_, fps)) = NAMED_RATES.iter().find(|(n, _)| *n == key) {
        return Ok(fps);
    }

    key.strip_suffix("fps")
        .and_then(|n| n.trim().parse::<f64>().ok())
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .ok_or_else(|| CameraLinkError::UnsupportedRate(name.to_string()))
}

/// Rational frame rate for destination display rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// Derive a rational rate from fps; NTSC rates map to `N*1000/1001`.
    pub fn from_fps(fps: f64) -> Self {
        let whole = fps.round();
        if (fps - whole).abs() < 1e-6 {
            return Self { numerator: whole as u32, denominator: 1 };
        }

        let ntsc = (fps * 1.001).round();
        if (ntsc / 1.001 - fps).abs() < 1e-3 {
            if let Some(numerator) = (ntsc as u32).checked_mul(1000) {
                return Self { numerator, denominator: 1001 };
            }
        }

        let millis = (fps * 1000.0).round();
        if millis > f64::from(u32::MAX) {
            return Self { numerator: whole as u32, denominator: 1 };
        }

        let numerator = millis as u32;
        let divisor = gcd(numerator, 1000);
        Self {
            numerator: numerator / divisor,
            denominator: 1000 / divisor,
        }
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a.max(1) } else { gcd(b, a % b) }
}
