use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Calendar unit a time axis steps by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Millisecond,
    Second,
    Minute,
    Hour,
    /// Whole days, labelled with the day of the week
    Weekday,
    Day,
    Month,
    Year,
}

impl Scale {
    pub fn name(self) -> &'static str {
        match self {
            Scale::Millisecond => "millisecond",
            Scale::Second => "second",
            Scale::Minute => "minute",
            Scale::Hour => "hour",
            Scale::Weekday => "weekday",
            Scale::Day => "day",
            Scale::Month => "month",
            Scale::Year => "year",
        }
    }

    pub const ALL: [Scale; 8] = [
        Scale::Millisecond,
        Scale::Second,
        Scale::Minute,
        Scale::Hour,
        Scale::Weekday,
        Scale::Day,
        Scale::Month,
        Scale::Year,
    ];
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scale::ALL
            .into_iter()
            .find(|scale| scale.name() == s)
            .ok_or_else(|| format!("Unknown scale '{}'", s))
    }
}
