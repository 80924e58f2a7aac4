//! Label patterns per scale

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::Scale;

/// strftime patterns keyed by scale; a missing or empty pattern yields an
/// empty label
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaleFormats(BTreeMap<Scale, String>);

impl ScaleFormats {
    fn from_pairs(pairs: [(Scale, &str); 8]) -> Self {
        Self(pairs.into_iter().map(|(scale, p)| (scale, p.to_string())).collect())
    }

    /// Patterns for the labels under every tick
    pub fn minor() -> Self {
        Self::from_pairs([
            (Scale::Millisecond, "%3f"),
            (Scale::Second, "%-S"),
            (Scale::Minute, "%H:%M"),
            (Scale::Hour, "%H:%M"),
            (Scale::Weekday, "%a %-d"),
            (Scale::Day, "%-d"),
            (Scale::Month, "%b"),
            (Scale::Year, "%Y"),
        ])
    }

    /// Patterns for the labels at major ticks, one unit coarser
    pub fn major() -> Self {
        Self::from_pairs([
            (Scale::Millisecond, "%H:%M:%S"),
            (Scale::Second, "%-d %B %H:%M"),
            (Scale::Minute, "%a %-d %B"),
            (Scale::Hour, "%a %-d %B"),
            (Scale::Weekday, "%B %Y"),
            (Scale::Day, "%B %Y"),
            (Scale::Month, "%Y"),
            (Scale::Year, ""),
        ])
    }

    pub fn get(&self, scale: Scale) -> &str {
        self.0.get(&scale).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, scale: Scale, pattern: impl Into<String>) {
        self.0.insert(scale, pattern.into());
    }

    fn merged(mut self, overrides: BTreeMap<Scale, String>) -> Self {
        self.0.extend(overrides);
        self
    }
}

/// Minor and major label patterns of a time axis.
///
/// Deserialized tables only need to name the scales they change; the rest
/// keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatTable {
    #[serde(default = "ScaleFormats::minor", deserialize_with = "minor_over_defaults")]
    pub minor_labels: ScaleFormats,
    #[serde(default = "ScaleFormats::major", deserialize_with = "major_over_defaults")]
    pub major_labels: ScaleFormats,
}

impl Default for FormatTable {
    fn default() -> Self {
        Self {
            minor_labels: ScaleFormats::minor(),
            major_labels: ScaleFormats::major(),
        }
    }
}

fn minor_over_defaults<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ScaleFormats, D::Error> {
    let overrides = BTreeMap::<Scale, String>::deserialize(deserializer)?;
    Ok(ScaleFormats::minor().merged(overrides))
}

fn major_over_defaults<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ScaleFormats, D::Error> {
    let overrides = BTreeMap::<Scale, String>::deserialize(deserializer)?;
    Ok(ScaleFormats::major().merged(overrides))
}
