//! Typed value conversion
//!
//! Every value written to or read from a table passes through [`convert`]
//! for the field's declared [`FieldType`]. All date-like inputs share one
//! parse path ([`parse_date`]), so a field declared as `Date` accepts epoch
//! milliseconds, numeric strings, ISO-8601 strings, `/Date(ms)/` wrappers and
//! already-parsed instants alike.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::value::{format_number, Value};

/// Declared type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Boolean,
    Number,
    String,
    Date,
    /// Date that keeps its UTC offset
    Moment,
    #[serde(rename = "ISODate")]
    IsoDate,
    #[serde(rename = "ASPDate")]
    AspDate,
}

/// Per-field type declarations
pub type FieldTypes = HashMap<String, FieldType>;

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Boolean => "Boolean",
            FieldType::Number => "Number",
            FieldType::String => "String",
            FieldType::Date => "Date",
            FieldType::Moment => "Moment",
            FieldType::IsoDate => "ISODate",
            FieldType::AspDate => "ASPDate",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Boolean" => Ok(FieldType::Boolean),
            "Number" => Ok(FieldType::Number),
            "String" => Ok(FieldType::String),
            "Date" => Ok(FieldType::Date),
            "Moment" => Ok(FieldType::Moment),
            "ISODate" => Ok(FieldType::IsoDate),
            "ASPDate" => Ok(FieldType::AspDate),
            other => Err(format!("Unknown field type '{}'", other)),
        }
    }
}

/// A value could not be coerced to the requested type
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot convert {} value '{value}' to type {target}", .value.kind())]
pub struct ConversionError {
    pub value: Value,
    pub target: String,
}

impl ConversionError {
    fn new(value: &Value, target: FieldType) -> Self {
        Self {
            value: value.clone(),
            target: target.name().to_string(),
        }
    }
}

/// Convert `value` to `target`.
///
/// `Null` stays `Null` for every target except `Number` (which yields `0`)
/// and `String` (which yields `""`).
pub fn convert(value: &Value, target: FieldType) -> Result<Value, ConversionError> {
    if value.is_null() {
        return Ok(match target {
            FieldType::Number => Value::Number(0.0),
            FieldType::String => Value::String(String::new()),
            _ => Value::Null,
        });
    }

    match target {
        FieldType::Boolean => Ok(Value::Boolean(truthy(value))),
        FieldType::Number => to_number(value).map(Value::Number),
        FieldType::String => Ok(Value::String(to_display_string(value))),
        FieldType::Date => parse_date(value)
            .map(|d| Value::Date(d.with_timezone(&Utc)))
            .ok_or_else(|| ConversionError::new(value, target)),
        FieldType::Moment => parse_date(value)
            .map(Value::Moment)
            .ok_or_else(|| ConversionError::new(value, target)),
        FieldType::IsoDate => parse_date(value)
            .map(|d| Value::String(to_iso_string(&d.with_timezone(&Utc))))
            .ok_or_else(|| ConversionError::new(value, target)),
        FieldType::AspDate => parse_date(value)
            .map(|d| Value::String(format!("/Date({})/", d.timestamp_millis())))
            .ok_or_else(|| ConversionError::new(value, target)),
    }
}

/// Convert using a type given by name. Unknown names leave the value as is.
pub fn convert_named(value: &Value, target: &str) -> Result<Value, ConversionError> {
    match target.parse::<FieldType>() {
        Ok(field_type) => convert(value, field_type),
        Err(_) => {
            warn!("Unknown type '{}', value passed through unconverted", target);
            Ok(value.clone())
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn to_iso_string(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn to_number(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            if let Ok(n) = trimmed.parse::<f64>() {
                return Ok(n);
            }
            parse_date(value)
                .map(|d| d.timestamp_millis() as f64)
                .ok_or_else(|| ConversionError::new(value, FieldType::Number))
        }
        Value::Date(d) => Ok(d.timestamp_millis() as f64),
        Value::Moment(m) => Ok(m.timestamp_millis() as f64),
        Value::List(_) | Value::Object(_) => Err(ConversionError::new(value, FieldType::Number)),
    }
}

fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.clone(),
        Value::Date(d) => to_iso_string(d),
        other => other.to_string(),
    }
}

/// Parse any date-like value into an instant with an offset.
///
/// Inputs without an explicit offset are taken as UTC.
pub fn parse_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Date(d) => Some(d.fixed_offset()),
        Value::Moment(m) => Some(*m),
        Value::Number(n) => from_millis(*n),
        Value::String(s) => parse_date_str(s.trim()),
        _ => None,
    }
}

fn from_millis(ms: f64) -> Option<DateTime<FixedOffset>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms.trunc() as i64)
        .single()
        .map(|d| d.fixed_offset())
}

fn parse_date_str(s: &str) -> Option<DateTime<FixedOffset>> {
    if s.is_empty() {
        return None;
    }
    if let Some(ms) = parse_asp_date(s) {
        return from_millis(ms as f64);
    }
    if let Ok(ms) = s.parse::<f64>() {
        return from_millis(ms);
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(d) = DateTime::parse_from_str(s, format) {
            return Some(d);
        }
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Milliseconds inside a `/Date(ms)/` wrapper. The leading slash and any
/// trailing offset (`/Date(ms+0100)/`) are optional.
fn parse_asp_date(s: &str) -> Option<i64> {
    let rest = s.strip_prefix('/').unwrap_or(s);
    if rest.len() < 5 || !rest[..5].eq_ignore_ascii_case("date(") {
        return None;
    }
    let body = &rest[5..];
    let digits_end = body
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body[..digits_end].parse().ok()
}
