//! Timeline layout for the data visualization platform
//!
//! Item stacking and visible-range search for timed items, calendar and
//! numeric axis tick generation, and the redraw orchestration shared by
//! timeline components.

pub mod axis;
pub mod component;
pub mod timeline;

pub use axis::{
    align_zeros, DataStep, DataStepOptions, FormatTable, HiddenRange, HiddenRanges, Scale,
    ScaleFormats, Switch, Tick, TimeStep, TimeStepOptions, ValueFormatter,
};
pub use component::{Body, Components, ElementPool, Redrawable};
pub use timeline::{
    collision, find_insertion_point, load_items, nostack, order_by_end, order_by_start, stack,
    visible_items, ItemLayer, ItemMargin, Margin, OrderKey, StackItem, TimeWindow,
};

use thiserror::Error;

/// Errors raised by layout and axis computations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AxisError {
    #[error("Invalid range {start} .. {end}: {reason}")]
    InvalidRange {
        start: String,
        end: String,
        reason: &'static str,
    },
}

impl AxisError {
    pub(crate) fn invalid_range(
        start: impl std::fmt::Display,
        end: impl std::fmt::Display,
        reason: &'static str,
    ) -> Self {
        AxisError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
            reason,
        }
    }
}
