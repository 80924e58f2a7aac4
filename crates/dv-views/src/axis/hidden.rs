//! Time ranges left out of the axis

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` range of hidden time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HiddenRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }
}

/// Calendar boundary crossed when a stepper jumps over hidden time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    Day,
    Month,
    Year,
}

/// Sorted, non-overlapping hidden ranges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<HiddenRange>", into = "Vec<HiddenRange>")]
pub struct HiddenRanges {
    ranges: Vec<HiddenRange>,
}

impl HiddenRanges {
    /// Empty ranges are dropped; overlapping and touching ranges merge
    pub fn new(ranges: impl IntoIterator<Item = HiddenRange>) -> Self {
        let mut sorted: Vec<HiddenRange> = ranges.into_iter().filter(|r| r.end > r.start).collect();
        sorted.sort_by_key(|r| r.start);

        let mut merged: Vec<HiddenRange> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HiddenRange> {
        self.ranges.iter()
    }

    /// The range containing `time`
    pub fn find(&self, time: DateTime<Utc>) -> Option<&HiddenRange> {
        let idx = self.ranges.partition_point(|r| r.start <= time).checked_sub(1)?;
        Some(&self.ranges[idx]).filter(|r| r.contains(time))
    }

    pub fn is_hidden(&self, time: DateTime<Utc>) -> bool {
        self.find(time).is_some()
    }

    /// Total hidden time inside `[from, to]`; zero when `to` is not after `from`
    pub fn hidden_duration_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
        let mut total = Duration::zero();
        if to <= from {
            return total;
        }
        for range in &self.ranges {
            if range.start >= to {
                break;
            }
            let start = range.start.max(from);
            let end = range.end.min(to);
            if end > start {
                total = total + (end - start);
            }
        }
        total
    }

    /// If `current` lies in a hidden range before `end` and moved since
    /// `previous`, the first visible time after that range together with
    /// the calendar boundary the jump crossed, judged from `previous`
    pub fn step_over<Tz: TimeZone>(
        &self,
        current: &DateTime<Tz>,
        previous: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> Option<(DateTime<Tz>, Option<Switch>)> {
        if current >= end || current == previous {
            return None;
        }
        let range = self.find(current.with_timezone(&Utc))?;
        let target = range.end.with_timezone(&current.timezone());

        let before = previous.naive_local();
        let after = target.naive_local();
        let switch = if before.year() != after.year() {
            Some(Switch::Year)
        } else if before.month() != after.month() {
            Some(Switch::Month)
        } else if before.ordinal() != after.ordinal() {
            Some(Switch::Day)
        } else {
            None
        };
        Some((target, switch))
    }
}

impl From<Vec<HiddenRange>> for HiddenRanges {
    fn from(ranges: Vec<HiddenRange>) -> Self {
        Self::new(ranges)
    }
}

impl From<HiddenRanges> for Vec<HiddenRange> {
    fn from(ranges: HiddenRanges) -> Self {
        ranges.ranges
    }
}
