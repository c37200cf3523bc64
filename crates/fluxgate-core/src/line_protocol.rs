//! InfluxDB line protocol
//!
//! Format: measurement,tag1=value1,tag2=value2 field1=value1,field2=value2 timestamp
//!
//! Example: cpu,host=server01,region=us-west usage=64.5,cores=8i 1609459200000
//!
//! The timestamp unit is not part of a line; the write request declares it
//! (`precision=ms` for everything this client sends).

use crate::error::{CoreError, Result};
use crate::types::{Field, FieldValue, Point, Tag};

/// Encode a single point as one line
pub fn encode_point(point: &Point) -> Result<String> {
    point.validate()?;

    let mut line = escape_measurement(&point.measurement);

    for tag in point.sorted_tags() {
        line.push(',');
        line.push_str(&escape_key(&tag.key));
        line.push('=');
        line.push_str(&escape_key(&tag.value));
    }

    line.push(' ');
    let fields: Vec<String> = point
        .fields
        .iter()
        .map(|f| format!("{}={}", escape_key(&f.key), encode_field_value(&f.value)))
        .collect();
    line.push_str(&fields.join(","));

    if let Some(ts) = point.timestamp {
        line.push(' ');
        line.push_str(&ts.to_string());
    }

    Ok(line)
}

/// Encode a batch of points as a newline separated request body
pub fn encode_points(points: &[Point]) -> Result<String> {
    let lines = points.iter().map(encode_point).collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

fn encode_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::UnsignedInteger(v) => format!("{}u", v),
        FieldValue::String(v) => format!("\"{}\"", escape_string_value(v)),
        FieldValue::Boolean(v) => format!("{}", v),
    }
}

/// Escape special characters in measurement names
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape special characters in tag keys, tag values and field keys
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Escape special characters in string field values
fn escape_string_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parse a single line
pub fn parse_line(line: &str) -> Result<Point> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(CoreError::Parse("Empty or comment line".to_string()));
    }

    let parts = split_unescaped(line, ' ');
    if parts.len() < 2 || parts.len() > 3 {
        return Err(CoreError::Parse(format!("Invalid line format: {}", line)));
    }

    let (measurement, tags) = parse_measurement_tags(parts[0])?;
    let fields = parse_fields(parts[1])?;

    let mut point = Point::new(measurement);
    point.tags = tags;
    point.fields = fields;

    if let Some(ts) = parts.get(2) {
        let ts = ts
            .parse::<i64>()
            .map_err(|e| CoreError::Parse(format!("Invalid timestamp: {}", e)))?;
        point = point.timestamp(ts);
    }

    point.validate()?;
    Ok(point)
}

/// Parse every non-empty, non-comment line of a request body
pub fn parse_lines(input: &str) -> Vec<Result<Point>> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim().starts_with('#'))
        .map(parse_line)
        .collect()
}

/// Split on `delim` outside of quoted strings and backslash escapes.
/// Empty segments are dropped.
fn split_unescaped(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut current_start = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            c if c == delim && !in_string => {
                if i > current_start {
                    parts.push(&s[current_start..i]);
                }
                current_start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if current_start < s.len() {
        parts.push(&s[current_start..]);
    }

    parts
}

/// Split `key=value` at the first unescaped `=`
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let mut escape_next = false;
    for (i, c) in pair.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' => escape_next = true,
            '=' => return Some((&pair[..i], &pair[i + 1..])),
            _ => {}
        }
    }
    None
}

fn parse_measurement_tags(s: &str) -> Result<(String, Vec<Tag>)> {
    let mut parts = split_unescaped(s, ',').into_iter();

    let measurement = parts
        .next()
        .map(unescape)
        .ok_or_else(|| CoreError::Parse("Missing measurement".to_string()))?;

    let tags = parts
        .map(|pair| {
            split_pair(pair)
                .map(|(k, v)| Tag::new(unescape(k), unescape(v)))
                .ok_or_else(|| CoreError::Parse(format!("Invalid tag: {}", pair)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((measurement, tags))
}

fn parse_fields(s: &str) -> Result<Vec<Field>> {
    let fields = split_unescaped(s, ',')
        .into_iter()
        .map(|pair| -> Result<Field> {
            let (key, value) = split_pair(pair)
                .ok_or_else(|| CoreError::Parse(format!("Invalid field: {}", pair)))?;
            Ok(Field::new(unescape(key), parse_field_value(value)?))
        })
        .collect::<Result<Vec<_>>>()?;

    if fields.is_empty() {
        return Err(CoreError::Parse("No fields".to_string()));
    }

    Ok(fields)
}

fn parse_field_value(s: &str) -> Result<FieldValue> {
    match s {
        "true" | "t" | "T" | "True" | "TRUE" => return Ok(FieldValue::Boolean(true)),
        "false" | "f" | "F" | "False" | "FALSE" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }

    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return Ok(FieldValue::String(unescape(&s[1..s.len() - 1])));
    }

    if let Some(num) = s.strip_suffix('i') {
        return num
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|e| CoreError::Parse(format!("Invalid integer: {}", e)));
    }

    if let Some(num) = s.strip_suffix('u') {
        return num
            .parse::<u64>()
            .map(FieldValue::UnsignedInteger)
            .map_err(|e| CoreError::Parse(format!("Invalid unsigned: {}", e)));
    }

    s.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|e| CoreError::Parse(format!("Invalid number: {}", e)))
}

fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('\\' | '"' | ',' | '=' | ' ')) => result.push(next),
            Some(next) => {
                result.push('\\');
                result.push(next);
            }
            None => result.push('\\'),
        }
    }

    result
}
