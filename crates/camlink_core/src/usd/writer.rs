//! USDA (ASCII) serializer.
//!
//! Output is deterministic: layer metadata keys are written in sorted order,
//! attributes in insertion order, and numbers with Rust's shortest
//! round-trip formatting. Writing the same layer twice yields identical
//! bytes, and [`parse_usda`](super::parse_usda) reads everything written here.

use super::types::*;

const INDENT: &str = "    ";

/// Serialize a layer to USDA text.
pub fn write_usda(layer: &UsdLayer) -> String {
    let mut out = String::from("#usda 1.0\n");

    write_layer_metadata(&mut out, &layer.metadata);

    for prim in &layer.prims {
        out.push('\n');
        write_prim(&mut out, prim, 0);
    }

    out
}

fn write_layer_metadata(out: &mut String, md: &LayerMetadata) {
    let mut entries: Vec<String> = Vec::new();

    if let Some(prim) = &md.default_prim {
        entries.push(format!("defaultPrim = \"{}\"", prim));
    }
    if let Some(end) = md.end_time_code {
        entries.push(format!("endTimeCode = {}", fmt_f64(end)));
    }
    if let Some(mpu) = md.meters_per_unit {
        entries.push(format!("metersPerUnit = {}", fmt_f64(mpu)));
    }
    if let Some(start) = md.start_time_code {
        entries.push(format!("startTimeCode = {}", fmt_f64(start)));
    }
    if let Some(tcps) = md.time_codes_per_second {
        entries.push(format!("timeCodesPerSecond = {}", fmt_f64(tcps)));
    }
    if let Some(axis) = &md.up_axis {
        entries.push(format!("upAxis = \"{}\"", axis));
    }

    if entries.is_empty() && md.custom_layer_data.is_empty() {
        return;
    }

    out.push_str("(\n");

    if !md.custom_layer_data.is_empty() {
        out.push_str(&format!("{INDENT}customLayerData = {{\n"));
        for (key, value) in &md.custom_layer_data {
            out.push_str(&format!("{INDENT}{INDENT}{} {} = {}\n", value_type_name(value), key, fmt_value(value)));
        }
        out.push_str(&format!("{INDENT}}}\n"));
    }

    for entry in entries {
        out.push_str(&format!("{INDENT}{}\n", entry));
    }

    out.push_str(")\n");
}

fn write_prim(out: &mut String, prim: &UsdPrim, depth: usize) {
    let pad = INDENT.repeat(depth);
    let inner = INDENT.repeat(depth + 1);

    out.push_str(&format!("{pad}def {} \"{}\"\n", prim.kind.type_name(), prim.name));
    out.push_str(&format!("{pad}{{\n"));

    for attr in &prim.attributes {
        write_attribute(out, attr, &inner);
    }

    for child in &prim.children {
        out.push('\n');
        write_prim(out, child, depth + 1);
    }

    out.push_str(&format!("{pad}}}\n"));
}

fn write_attribute(out: &mut String, attr: &UsdAttribute, pad: &str) {
    let qualifier = if attr.uniform { "uniform " } else { "" };

    match (&attr.default, &attr.time_samples) {
        (None, None) => {
            out.push_str(&format!("{pad}{qualifier}{} {}\n", attr.type_name, attr.name));
        }
        (default, samples) => {
            if let Some(value) = default {
                out.push_str(&format!("{pad}{qualifier}{} {} = {}\n", attr.type_name, attr.name, fmt_value(value)));
            }
            if let Some(samples) = samples {
                out.push_str(&format!("{pad}{qualifier}{} {}.timeSamples = {{\n", attr.type_name, attr.name));
                for (time, value) in samples.iter() {
                    out.push_str(&format!("{pad}{INDENT}{}: {},\n", fmt_f64(*time), fmt_value(value)));
                }
                out.push_str(&format!("{pad}}}\n"));
            }
        }
    }
}

/// Type name used when a value is written without a declared attribute type.
fn value_type_name(value: &UsdValue) -> &'static str {
    match value {
        UsdValue::Bool(_) => "bool",
        UsdValue::Int(_) => "int",
        UsdValue::Float(_) => "float",
        UsdValue::Double(_) => "double",
        UsdValue::Float2(_) => "float2",
        UsdValue::Float3(_) => "float3",
        UsdValue::Double3(_) => "double3",
        UsdValue::Matrix4d(_) => "matrix4d",
        UsdValue::Token(_) => "token",
        UsdValue::String(_) | UsdValue::Raw(_) => "string",
        UsdValue::TokenArray(_) => "token[]",
    }
}

fn fmt_f64(v: f64) -> String {
    format!("{}", v)
}

fn fmt_f32(v: f32) -> String {
    format!("{}", v)
}

fn fmt_value(value: &UsdValue) -> String {
    match value {
        UsdValue::Bool(b) => b.to_string(),
        UsdValue::Int(i) => i.to_string(),
        UsdValue::Float(f) => fmt_f32(*f),
        UsdValue::Double(d) => fmt_f64(*d),
        UsdValue::Float2(v) => format!("({}, {})", fmt_f32(v.x), fmt_f32(v.y)),
        UsdValue::Float3(v) => format!("({}, {}, {})", fmt_f32(v.x), fmt_f32(v.y), fmt_f32(v.z)),
        UsdValue::Double3(v) => format!("({}, {}, {})", fmt_f64(v.x), fmt_f64(v.y), fmt_f64(v.z)),
        UsdValue::Matrix4d(m) => {
            // glam columns are USD rows
            let rows: Vec<String> = m
                .to_cols_array_2d()
                .iter()
                .map(|r| format!("({}, {}, {}, {})", fmt_f64(r[0]), fmt_f64(r[1]), fmt_f64(r[2]), fmt_f64(r[3])))
                .collect();
            format!("( {} )", rows.join(", "))
        }
        UsdValue::Token(s) | UsdValue::String(s) => format!("\"{}\"", s),
        UsdValue::TokenArray(items) => {
            let quoted: Vec<String> = items.iter().map(|s| format!("\"{}\"", s)).collect();
            format!("[{}]", quoted.join(", "))
        }
        UsdValue::Raw(text) => text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::parse_usda;
    use camlink_math::{DMat4, DVec3, Vec2};

    fn sample_layer() -> UsdLayer {
        let mut cam = UsdPrim::new(PrimKind::Camera, "shotCam");
        cam.set_attribute(UsdAttribute::with_default(
            "clippingRange",
            "float2",
            UsdValue::Float2(Vec2::new(0.1, 10000.0)),
        ));
        cam.set_attribute(UsdAttribute::with_samples(
            "xformOp:translate",
            "double3",
            [(1.0, UsdValue::Double3(DVec3::ZERO)), (2.0, UsdValue::Double3(DVec3::new(0.5, 1.25, -3.0)))]
                .into_iter()
                .collect(),
        ));
        cam.set_attribute(
            UsdAttribute::with_default(
                "xformOpOrder",
                "token[]",
                UsdValue::TokenArray(vec!["xformOp:translate".into()]),
            )
            .uniform(),
        );

        let mut layer = UsdLayer::default();
        layer.metadata.default_prim = Some("shotCam".into());
        layer.metadata.meters_per_unit = Some(0.01);
        layer.metadata.time_codes_per_second = Some(23.976);
        layer.metadata.custom_layer_data.insert("fps".into(), UsdValue::Double(23.976));
        layer.metadata.custom_layer_data.insert("startFrame".into(), UsdValue::Int(1));
        layer.prims.push(cam);
        layer
    }

    #[test]
    fn test_written_layer_reads_back() {
        let layer = sample_layer();
        let text = write_usda(&layer);
        let parsed = parse_usda(&text).unwrap();
        assert_eq!(parsed, layer);
    }

    #[test]
    fn test_output_is_deterministic() {
        let layer = sample_layer();
        assert_eq!(write_usda(&layer), write_usda(&layer.clone()));
    }

    #[test]
    fn test_metadata_block_layout() {
        let text = write_usda(&sample_layer());
        assert!(text.starts_with("#usda 1.0\n(\n    customLayerData = {\n        double fps = 23.976\n"));
        assert!(text.contains("    defaultPrim = \"shotCam\"\n"));
        assert!(text.contains("    uniform token[] xformOpOrder = [\"xformOp:translate\"]\n"));
        assert!(text.contains("        2: (0.5, 1.25, -3),\n"));
    }

    #[test]
    fn test_nested_prim_layout() {
        let mut cam = UsdPrim::new(PrimKind::Camera, "cam");
        cam.path = "/rig/cam".to_string();
        cam.set_attribute(UsdAttribute::with_samples(
            "focalLength",
            "float",
            [(1.0, UsdValue::Float(35.0)), (2.0, UsdValue::Float(50.0))].into_iter().collect(),
        ));
        let mut rig = UsdPrim::new(PrimKind::Xform, "rig");
        rig.children.push(cam);
        let layer = UsdLayer {
            prims: vec![rig],
            ..Default::default()
        };

        let expected = "#usda 1.0\n\ndef Xform \"rig\"\n{\n\n    def Camera \"cam\"\n    {\n        \
                        float focalLength.timeSamples = {\n            1: 35,\n            2: 50,\n        }\n    }\n}\n";
        assert_eq!(write_usda(&layer), expected);
    }

    #[test]
    fn test_matrix_rows() {
        let m = DMat4::from_translation(DVec3::new(5.0, 6.0, 7.0));
        let text = fmt_value(&UsdValue::Matrix4d(m));
        assert_eq!(text, "( (1, 0, 0, 0), (0, 1, 0, 0), (0, 0, 1, 0), (5, 6, 7, 1) )");
    }
}
