//! USDA (ASCII) file parser.
//!
//! This module provides line-by-line parsing of USDA text files.
//! The parser is intentionally simple and handles the patterns camera
//! documents use.
//!
//! # Supported Syntax
//!
//! - `#usda 1.0` header with a `( ... )` layer metadata block
//! - `customLayerData = { <type> <key> = <value> ... }`
//! - `def <Type> "Name" { ... }` with nested children
//! - `<type> <name> = <value>` static attributes (`uniform`/`custom` accepted)
//! - `<type> <name>.timeSamples = { <time>: <value>, ... }`
//! - scalars, tuples, `matrix4d`, tokens, strings and token arrays
//!
//! Relationships, connections and prim metadata are skipped.

use std::collections::{BTreeMap, VecDeque};

use camlink_math::{DMat4, DVec3, Vec2, Vec3};
use thiserror::Error;

use super::types::*;

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),

    #[error("Missing '#usda' header")]
    MissingHeader,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Attribute declaration split off the left of `=`.
struct AttrDecl {
    name: String,
    type_name: String,
    uniform: bool,
    time_samples: bool,
}

/// USDA file parser.
pub struct UsdaParser {
    lines: VecDeque<(usize, String)>,
    current_line: usize,
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> Self {
        let lines: VecDeque<_> = content
            .lines()
            .enumerate()
            .map(|(i, s)| (i + 1, s.to_string()))
            .collect();

        Self {
            lines,
            current_line: 0,
        }
    }

    /// Parse the USDA content into a layer.
    pub fn parse(&mut self) -> ParseResult<UsdLayer> {
        let mut layer = UsdLayer::default();

        // Header line must come first
        match self.next_content_line() {
            Some((_, line)) if line.trim().starts_with("#usda") => {}
            _ => return Err(ParseError::MissingHeader),
        }

        self.skip_blank_and_comments();
        if let Some((_, line)) = self.lines.front() {
            if line.trim().starts_with('(') {
                layer.metadata = self.parse_layer_metadata()?;
            }
        }

        // Parse root prims
        while !self.lines.is_empty() {
            if let Some(prim) = self.parse_prim("")? {
                layer.prims.push(prim);
            } else if let Some((num, line)) = self.lines.front() {
                // A stray closing brace at root level is malformed
                if line.trim() == "}" {
                    return Err(ParseError::Parse {
                        line: *num,
                        message: "Unexpected '}' at root level".to_string(),
                    });
                }
            }
        }

        Ok(layer)
    }

    fn skip_blank_and_comments(&mut self) {
        while let Some((_, line)) = self.lines.front() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.lines.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pop the next non-empty line (comments included).
    fn next_content_line(&mut self) -> Option<(usize, String)> {
        while let Some((num, line)) = self.lines.pop_front() {
            if !line.trim().is_empty() {
                self.current_line = num;
                return Some((num, line));
            }
        }
        None
    }

    /// Parse the `( ... )` block following the header.
    fn parse_layer_metadata(&mut self) -> ParseResult<LayerMetadata> {
        let mut metadata = LayerMetadata::default();

        let (start_line, first) = self.lines.pop_front().ok_or(ParseError::UnexpectedEof)?;
        self.current_line = start_line;
        let first = first.trim();

        // Single-line block: ( key = value )
        if first.len() > 1 && first.ends_with(')') {
            let inner = first[1..first.len() - 1].trim();
            if !inner.is_empty() {
                self.apply_layer_entry(&mut metadata, inner)?;
            }
            return Ok(metadata);
        }

        loop {
            let (num, line) = self
                .lines
                .pop_front()
                .ok_or(ParseError::UnclosedBlock(start_line))?;
            self.current_line = num;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if trimmed == ")" {
                break;
            }

            if trimmed.starts_with("customLayerData") {
                metadata.custom_layer_data = self.parse_dictionary(trimmed, num)?;
                continue;
            }

            if trimmed.contains("\"\"\"") && trimmed.matches("\"\"\"").count() == 1 {
                // Multi-line doc string
                self.skip_until(|l| l.contains("\"\"\""), num)?;
                continue;
            }

            self.apply_layer_entry(&mut metadata, trimmed)?;
        }

        Ok(metadata)
    }

    /// Apply one `key = value` layer metadata entry.
    fn apply_layer_entry(&self, metadata: &mut LayerMetadata, entry: &str) -> ParseResult<()> {
        let Some((key, value)) = entry.split_once('=') else {
            log::debug!("Ignoring layer metadata line {}: {}", self.current_line, entry);
            return Ok(());
        };
        let value = value.trim();

        match key.trim() {
            "defaultPrim" => metadata.default_prim = Some(self.parse_quoted(value)?),
            "upAxis" => metadata.up_axis = Some(self.parse_quoted(value)?),
            "metersPerUnit" => metadata.meters_per_unit = Some(parse_number(value)?),
            "timeCodesPerSecond" => metadata.time_codes_per_second = Some(parse_number(value)?),
            "framesPerSecond" => {
                // Only a fallback for timeCodesPerSecond
                if metadata.time_codes_per_second.is_none() {
                    metadata.time_codes_per_second = Some(parse_number(value)?);
                }
            }
            "startTimeCode" => metadata.start_time_code = Some(parse_number(value)?),
            "endTimeCode" => metadata.end_time_code = Some(parse_number(value)?),
            other => log::debug!("Ignoring layer metadata key '{}'", other),
        }

        Ok(())
    }

    /// Parse a `name = { <type> <key> = <value> ... }` dictionary.
    fn parse_dictionary(&mut self, first_line: &str, start_line: usize) -> ParseResult<BTreeMap<String, UsdValue>> {
        let mut dict = BTreeMap::new();

        let after_brace = first_line
            .split_once('{')
            .map(|(_, rest)| rest.trim())
            .ok_or_else(|| ParseError::Parse {
                line: start_line,
                message: "Expected '{' after dictionary name".to_string(),
            })?;

        // Inline dictionary: customLayerData = { int startFrame = 1 }
        if let Some(inner) = after_brace.strip_suffix('}') {
            for entry in inner.split(';').map(str::trim).filter(|e| !e.is_empty()) {
                self.insert_dictionary_entry(&mut dict, entry)?;
            }
            return Ok(dict);
        }

        loop {
            let (num, line) = self
                .lines
                .pop_front()
                .ok_or(ParseError::UnclosedBlock(start_line))?;
            self.current_line = num;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if trimmed == "}" {
                break;
            }

            if trimmed.starts_with("dictionary ") && trimmed.ends_with('{') {
                // Nested dictionaries are not part of the camera contract
                self.skip_block(num)?;
                continue;
            }

            self.insert_dictionary_entry(&mut dict, trimmed)?;
        }

        Ok(dict)
    }

    fn insert_dictionary_entry(&self, dict: &mut BTreeMap<String, UsdValue>, entry: &str) -> ParseResult<()> {
        let (decl, value) = entry.split_once('=').ok_or_else(|| ParseError::Parse {
            line: self.current_line,
            message: format!("Expected '<type> <key> = <value>', got: {}", entry),
        })?;

        let mut parts = decl.split_whitespace();
        let (Some(type_name), Some(key)) = (parts.next(), parts.next()) else {
            return Err(ParseError::Parse {
                line: self.current_line,
                message: format!("Expected '<type> <key>' in: {}", entry),
            });
        };

        let value = parse_value(type_name, value.trim(), self.current_line)?;
        dict.insert(key.trim_matches('"').to_string(), value);
        Ok(())
    }

    /// Parse a single prim and its children.
    fn parse_prim(&mut self, parent_path: &str) -> ParseResult<Option<UsdPrim>> {
        // Get next non-empty line
        let (line_num, line) = loop {
            match self.lines.pop_front() {
                Some((num, line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && !trimmed.starts_with('#') {
                        self.current_line = num;
                        break (num, line);
                    }
                }
                None => return Ok(None),
            }
        };

        let trimmed = line.trim();

        // Check for closing brace
        if trimmed == "}" {
            // Put it back for the caller to handle
            self.lines.push_front((line_num, line));
            return Ok(None);
        }

        for specifier in ["def ", "over ", "class "] {
            if let Some(rest) = trimmed.strip_prefix(specifier) {
                let rest = rest.to_string();
                return self.parse_def(&rest, parent_path, line_num).map(Some);
            }
        }

        // Skip other lines at this level
        log::debug!("Skipping line {}: {}", line_num, trimmed);
        Ok(None)
    }

    /// Parse a `def Type "Name"` block; `rest` is the text after the specifier.
    fn parse_def(&mut self, rest: &str, parent_path: &str, start_line: usize) -> ParseResult<UsdPrim> {
        // Typeless prims start straight with the quoted name
        let prim_type = if rest.starts_with('"') {
            ""
        } else {
            rest.split_whitespace().next().unwrap_or("")
        };

        let name = extract_quoted(rest).ok_or_else(|| ParseError::Parse {
            line: start_line,
            message: format!("Expected quoted prim name in: {}", rest),
        })?;

        let path = if parent_path.is_empty() {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_path, name)
        };

        let mut prim = UsdPrim {
            path,
            name: name.to_string(),
            kind: PrimKind::from_type_name(prim_type),
            attributes: Vec::new(),
            children: Vec::new(),
        };

        // Text after the closing quote of the name
        let after_name = rest
            .find('"')
            .and_then(|q| rest[q + 1..].find('"').map(|e| &rest[q + 1 + e + 1..]))
            .unwrap_or("")
            .trim();

        let mut tail = after_name.to_string();

        // Prim metadata: inline, started on this line, or on the next line
        if tail.starts_with('(') {
            if balance(&tail, '(', ')') > 0 {
                self.skip_balanced('(', ')', balance(&tail, '(', ')'), start_line)?;
                tail.clear();
            } else if let Some(close) = tail.rfind(')') {
                tail = tail[close + 1..].trim().to_string();
            }
        } else if tail.is_empty() {
            self.skip_blank_and_comments();
            if let Some((_, next)) = self.lines.front() {
                if next.trim().starts_with('(') {
                    let (num, next) = self.lines.pop_front().ok_or(ParseError::UnexpectedEof)?;
                    let depth = balance(next.trim(), '(', ')');
                    if depth > 0 {
                        self.skip_balanced('(', ')', depth, num)?;
                    }
                }
            }
        }

        // Entire prim on one line: def Camera "cam" { float focalLength = 35 }
        if let Some(open) = tail.find('{') {
            if let Some(close) = tail.rfind('}') {
                let inline = tail[open + 1..close].trim();
                if !inline.is_empty() {
                    self.parse_attribute_line(&mut prim, inline)?;
                }
                return Ok(prim);
            }
        } else {
            self.expect_opening_brace(start_line)?;
        }

        self.parse_prim_body(&mut prim, start_line)?;
        Ok(prim)
    }

    /// Expect and consume an opening brace.
    fn expect_opening_brace(&mut self, start_line: usize) -> ParseResult<()> {
        self.skip_blank_and_comments();
        match self.lines.front() {
            Some((_, line)) if line.trim() == "{" => {
                self.lines.pop_front();
                Ok(())
            }
            Some((num, line)) => Err(ParseError::Parse {
                line: *num,
                message: format!("Expected opening brace, got: {}", line.trim()),
            }),
            None => Err(ParseError::UnclosedBlock(start_line)),
        }
    }

    /// Parse attributes and children until the closing brace.
    fn parse_prim_body(&mut self, prim: &mut UsdPrim, start_line: usize) -> ParseResult<()> {
        loop {
            let (line_num, line) = match self.lines.pop_front() {
                Some(x) => x,
                None => return Err(ParseError::UnclosedBlock(start_line)),
            };
            self.current_line = line_num;

            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if trimmed == "}" {
                break;
            }

            // Check for child prim FIRST
            if ["def ", "over ", "class "].iter().any(|s| trimmed.starts_with(s)) {
                self.lines.push_front((line_num, line));
                let path = prim.path.clone();
                if let Some(child) = self.parse_prim(&path)? {
                    prim.children.push(child);
                }
                continue;
            }

            if trimmed.starts_with("rel ") || trimmed.contains(".connect") {
                let depth = balance(trimmed, '[', ']');
                if depth > 0 {
                    self.skip_balanced('[', ']', depth, line_num)?;
                }
                continue;
            }

            if trimmed.starts_with("variantSet ") {
                self.skip_block(line_num)?;
                continue;
            }

            let owned = trimmed.to_string();
            self.parse_attribute_line(prim, &owned)?;
        }

        Ok(())
    }

    /// Parse one attribute statement and merge it into the prim.
    fn parse_attribute_line(&mut self, prim: &mut UsdPrim, line: &str) -> ParseResult<()> {
        let (decl_text, value_text) = match line.split_once('=') {
            Some((d, v)) => (d.trim(), Some(v.trim())),
            None => (line.trim(), None),
        };

        let Some(decl) = self.parse_declaration(decl_text) else {
            log::debug!("Skipping unrecognized statement at line {}: {}", self.current_line, line);
            return Ok(());
        };

        let mut default = None;
        let mut time_samples = None;

        match value_text {
            Some(text) if decl.time_samples => {
                time_samples = Some(self.parse_time_samples(&decl.type_name, text)?);
            }
            Some(text) => {
                let (value, rest) = split_leading_value(text);
                default = Some(parse_value(&decl.type_name, value, self.current_line)?);

                // Trailing attribute metadata: = 35 ( doc = "..." )
                let depth = balance(rest, '(', ')');
                if depth > 0 {
                    self.skip_balanced('(', ')', depth, self.current_line)?;
                }
            }
            None => {}
        }

        match prim.attributes.iter_mut().find(|a| a.name == decl.name) {
            Some(existing) => {
                if default.is_some() {
                    existing.default = default;
                }
                if time_samples.is_some() {
                    existing.time_samples = time_samples;
                }
            }
            None => prim.attributes.push(UsdAttribute {
                name: decl.name,
                type_name: decl.type_name,
                uniform: decl.uniform,
                default,
                time_samples,
            }),
        }

        Ok(())
    }

    /// Split `[custom] [uniform] <type> <name>[.timeSamples]`.
    fn parse_declaration(&self, text: &str) -> Option<AttrDecl> {
        let mut uniform = false;
        let mut words = text.split_whitespace().peekable();

        while let Some(&word) = words.peek() {
            match word {
                "custom" | "varying" => {
                    words.next();
                }
                "uniform" => {
                    uniform = true;
                    words.next();
                }
                _ => break,
            }
        }

        let type_name = words.next()?.to_string();
        let full_name = words.next()?;
        if words.next().is_some() {
            return None;
        }

        let (name, time_samples) = match full_name.strip_suffix(".timeSamples") {
            Some(base) => (base.to_string(), true),
            None => (full_name.to_string(), false),
        };

        Some(AttrDecl {
            name,
            type_name,
            uniform,
            time_samples,
        })
    }

    /// Parse `{ <time>: <value>, ... }`, inline or spread across lines.
    fn parse_time_samples(&mut self, type_name: &str, first: &str) -> ParseResult<TimeSamples> {
        let start_line = self.current_line;
        let body = first.strip_prefix('{').ok_or_else(|| ParseError::Parse {
            line: start_line,
            message: format!("Expected '{{' to open time samples, got: {}", first),
        })?;

        let mut content = body.to_string();
        while !content.trim_end().ends_with('}') {
            let (num, line) = self
                .lines
                .pop_front()
                .ok_or(ParseError::UnclosedBlock(start_line))?;
            self.current_line = num;
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                continue;
            }
            content.push(' ');
            content.push_str(trimmed);
        }

        let content = content.trim_end();
        let inner = &content[..content.len() - 1];

        let mut samples = TimeSamples::new();
        for entry in split_top_level(inner) {
            let (time, value) = entry.split_once(':').ok_or_else(|| ParseError::Parse {
                line: self.current_line,
                message: format!("Expected '<time>: <value>', got: {}", entry),
            })?;
            let time: f64 = parse_number(time.trim())?;
            let value = value.trim();
            if value == "None" {
                // Blocked sample
                continue;
            }
            samples.insert(time, parse_value(type_name, value, self.current_line)?);
        }

        Ok(samples)
    }

    /// Skip a block (consume until matching closing brace).
    fn skip_block(&mut self, start_line: usize) -> ParseResult<()> {
        self.skip_balanced('{', '}', 1, start_line)
    }

    /// Consume lines until the given bracket pair balances out.
    fn skip_balanced(&mut self, open: char, close: char, mut depth: i64, start_line: usize) -> ParseResult<()> {
        while depth > 0 {
            match self.lines.pop_front() {
                Some((num, line)) => {
                    self.current_line = num;
                    depth += balance(&line, open, close);
                }
                None => return Err(ParseError::UnclosedBlock(start_line)),
            }
        }
        Ok(())
    }

    fn skip_until(&mut self, pred: impl Fn(&str) -> bool, start_line: usize) -> ParseResult<()> {
        while let Some((num, line)) = self.lines.pop_front() {
            self.current_line = num;
            if pred(line.as_str()) {
                return Ok(());
            }
        }
        Err(ParseError::UnclosedBlock(start_line))
    }

    fn parse_quoted(&self, text: &str) -> ParseResult<String> {
        extract_quoted(text)
            .map(str::to_string)
            .ok_or_else(|| ParseError::Parse {
                line: self.current_line,
                message: format!("Expected quoted string, got: {}", text),
            })
    }
}

/// Net count of `open` minus `close`, ignoring quoted text.
fn balance(text: &str, open: char, close: char) -> i64 {
    let mut depth = 0;
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == open && !in_quotes => depth += 1,
            c if c == close && !in_quotes => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// The first double-quoted string in `text`.
fn extract_quoted(text: &str) -> Option<&str> {
    let start = text.find('"')?;
    let after = &text[start + 1..];
    let end = after.find('"')?;
    Some(&after[..end])
}

/// Split on commas not nested inside (), [] or quotes; empty pieces dropped.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' | '[' if !in_quotes => depth += 1,
            ')' | ']' if !in_quotes => depth -= 1,
            ',' if depth == 0 && !in_quotes => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Separate the leading value from any trailing text (metadata, comments).
fn split_leading_value(text: &str) -> (&str, &str) {
    let text = text.trim();
    let close = match text.chars().next() {
        Some('(') => Some(')'),
        Some('[') => Some(']'),
        Some('"') => Some('"'),
        _ => None,
    };

    match close {
        Some('"') => match text[1..].find('"') {
            Some(end) => (&text[..end + 2], text[end + 2..].trim()),
            None => (text, ""),
        },
        Some(close) => {
            let open = text.chars().next().unwrap_or('(');
            let mut depth = 0i32;
            let mut in_quotes = false;
            for (i, c) in text.char_indices() {
                match c {
                    '"' => in_quotes = !in_quotes,
                    c if c == open && !in_quotes => depth += 1,
                    c if c == close && !in_quotes => {
                        depth -= 1;
                        if depth == 0 {
                            return (&text[..=i], text[i + 1..].trim());
                        }
                    }
                    _ => {}
                }
            }
            (text, "")
        }
        None => match text.find(char::is_whitespace) {
            Some(i) => (&text[..i], text[i..].trim()),
            None => (text, ""),
        },
    }
}

fn parse_number<T: std::str::FromStr>(text: &str) -> ParseResult<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| ParseError::InvalidNumber(text.trim().to_string()))
}

/// Components of a `( a, b, ... )` tuple.
fn parse_tuple(text: &str, expected: usize, line: usize) -> ParseResult<Vec<&str>> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| ParseError::Parse {
            line,
            message: format!("Expected '(...)', got: {}", text),
        })?;

    let parts = split_top_level(inner);
    if parts.len() != expected {
        return Err(ParseError::Parse {
            line,
            message: format!("Expected {} components, got {}", expected, parts.len()),
        });
    }
    Ok(parts)
}

/// Parse a value of the given USD type name.
pub fn parse_value(type_name: &str, text: &str, line: usize) -> ParseResult<UsdValue> {
    let text = text.trim();

    let value = match type_name {
        "bool" => match text {
            "true" | "1" => UsdValue::Bool(true),
            "false" | "0" => UsdValue::Bool(false),
            _ => return Err(ParseError::InvalidNumber(text.to_string())),
        },
        "int" | "int64" | "uint" | "uint64" | "uchar" => UsdValue::Int(parse_number(text)?),
        "float" | "half" => UsdValue::Float(parse_number(text)?),
        "double" | "timecode" => UsdValue::Double(parse_number(text)?),
        "float2" | "half2" => {
            let p = parse_tuple(text, 2, line)?;
            UsdValue::Float2(Vec2::new(parse_number(p[0])?, parse_number(p[1])?))
        }
        "float3" | "half3" | "point3f" | "vector3f" | "normal3f" | "color3f" => {
            let p = parse_tuple(text, 3, line)?;
            UsdValue::Float3(Vec3::new(parse_number(p[0])?, parse_number(p[1])?, parse_number(p[2])?))
        }
        "double3" | "point3d" | "vector3d" | "normal3d" | "color3d" => {
            let p = parse_tuple(text, 3, line)?;
            UsdValue::Double3(DVec3::new(parse_number(p[0])?, parse_number(p[1])?, parse_number(p[2])?))
        }
        "matrix4d" => {
            let rows = parse_tuple(text, 4, line)?;
            let mut cols = [[0.0f64; 4]; 4];
            for (r, row) in rows.iter().enumerate() {
                let p = parse_tuple(row, 4, line)?;
                for (c, v) in p.iter().enumerate() {
                    cols[r][c] = parse_number(v)?;
                }
            }
            // USD rows are glam columns (row-vector convention)
            UsdValue::Matrix4d(DMat4::from_cols_array_2d(&cols))
        }
        "token" | "string" => {
            let s = extract_quoted(text).ok_or_else(|| ParseError::Parse {
                line,
                message: format!("Expected quoted string, got: {}", text),
            })?;
            if type_name == "token" {
                UsdValue::Token(s.to_string())
            } else {
                UsdValue::String(s.to_string())
            }
        }
        "token[]" | "string[]" => {
            let inner = text
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .ok_or_else(|| ParseError::Parse {
                    line,
                    message: format!("Expected '[...]', got: {}", text),
                })?;
            let items = split_top_level(inner)
                .into_iter()
                .map(|item| item.trim_matches('"').to_string())
                .collect();
            UsdValue::TokenArray(items)
        }
        _ => UsdValue::Raw(text.to_string()),
    };

    Ok(value)
}

/// Parse a USDA string into a layer.
pub fn parse_usda(content: &str) -> ParseResult<UsdLayer> {
    let mut parser = UsdaParser::new(content);
    parser.parse()
}
