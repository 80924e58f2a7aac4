//! Tick generation for time and value axes

mod data_step;
mod format;
pub mod hidden;
mod scale;
mod time_step;

pub use data_step::{align_zeros, DataStep, DataStepOptions, ValueFormatter};
pub use format::{FormatTable, ScaleFormats};
pub use hidden::{HiddenRange, HiddenRanges, Switch};
pub use scale::Scale;
pub use time_step::{Tick, TimeStep, TimeStepOptions};
