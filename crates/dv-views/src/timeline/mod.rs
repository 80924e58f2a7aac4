//! Timed items and their vertical layout

mod items;
mod layer;
mod stack;
mod visible;

pub use items::load_items;
pub use layer::ItemLayer;
pub use stack::{collision, nostack, order_by_end, order_by_start, stack, EPSILON};
pub use visible::{find_insertion_point, visible_items, OrderKey};

use chrono::{DateTime, Duration, Utc};
use dv_core::{Id, Value};
use serde::{Deserialize, Serialize};

use crate::axis::HiddenRanges;
use crate::AxisError;

/// The visible time range of a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window; `end` before `start` is rejected
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AxisError> {
        if end < start {
            return Err(AxisError::invalid_range(start, end, "end is before start"));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }

    /// Horizontal pixel offset of `time` in a container `width` pixels wide.
    /// Hidden ranges take no horizontal space.
    pub fn to_screen(&self, time: DateTime<Utc>, width: f64, hidden: &HiddenRanges) -> f64 {
        let visible_ms = (self.duration() - hidden.hidden_duration_between(self.start, self.end))
            .num_milliseconds();
        if visible_ms <= 0 {
            return 0.0;
        }
        let offset = if time >= self.start {
            (time - self.start) - hidden.hidden_duration_between(self.start, time)
        } else {
            (time - self.start) + hidden.hidden_duration_between(time, self.start)
        };
        offset.num_milliseconds() as f64 * width / visible_ms as f64
    }

    /// Pixels per visible millisecond; zero when everything is hidden
    pub fn pixels_per_ms(&self, width: f64, hidden: &HiddenRanges) -> f64 {
        let visible_ms = (self.duration() - hidden.hidden_duration_between(self.start, self.end))
            .num_milliseconds();
        if visible_ms <= 0 {
            0.0
        } else {
            width / visible_ms as f64
        }
    }

    /// Time at a horizontal pixel offset, ignoring hidden ranges
    pub fn from_screen(&self, x: f64, width: f64) -> DateTime<Utc> {
        if width <= 0.0 {
            return self.start;
        }
        let ms = self.duration().num_milliseconds() as f64 * x / width;
        self.start + Duration::milliseconds(ms.round() as i64)
    }
}

/// Vertical spacing used by the stacker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Margin {
    /// Distance between the axis and the first lane
    pub axis: f64,
    pub item: ItemMargin,
}

/// Minimum gap kept around every item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemMargin {
    pub horizontal: f64,
    pub vertical: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            axis: 20.0,
            item: ItemMargin::default(),
        }
    }
}

impl Default for ItemMargin {
    fn default() -> Self {
        Self {
            horizontal: 10.0,
            vertical: 10.0,
        }
    }
}

/// A timed item together with its screen geometry
#[derive(Debug, Clone, PartialEq)]
pub struct StackItem {
    pub id: Id,
    pub start: DateTime<Utc>,
    /// `None` for point items
    pub end: Option<DateTime<Utc>>,
    pub group: Option<Value>,
    pub visible: bool,
    /// Whether the item takes part in stacking
    pub stack: bool,
    /// Assigned vertical offset; `None` until stacked
    pub top: Option<f64>,
    pub height: f64,
    pub left: f64,
    pub width: f64,
}

impl StackItem {
    pub fn new(id: impl Into<Id>, start: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end: None,
            group: None,
            visible: true,
            stack: true,
            top: None,
            height: 0.0,
            left: 0.0,
            width: 0.0,
        }
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_geometry(mut self, left: f64, width: f64, height: f64) -> Self {
        self.left = left;
        self.width = width;
        self.height = height;
        self
    }

    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// End of a range item, start of a point item
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.end.unwrap_or(self.start)
    }

    /// Whether any part of the item falls inside the window
    pub fn intersects(&self, window: &TimeWindow) -> bool {
        match self.end {
            Some(end) => self.start <= window.end && end >= window.start,
            None => window.contains(self.start),
        }
    }

    /// Bottom edge once stacked
    pub fn bottom(&self) -> Option<f64> {
        self.top.map(|top| top + self.height)
    }
}
