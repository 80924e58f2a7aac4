//! Numeric tick generation for value axes
//!
//! Ticks are generated from the top of the axis down: iteration starts at
//! the upper margin and subtracts one step at a time until it passes the
//! lower margin. Margins are rounded to the step grid unless a custom
//! minimum or maximum is given, in which case ticks are offset from it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AxisError;

/// Custom label formatter for axis values
pub type ValueFormatter = Arc<dyn Fn(f64) -> String + Send + Sync>;

/// Extra head room given to the range when choosing a step
const RANGE_PADDING: f64 = 1.2;

const SIGNIFICANT_DIGITS: i32 = 5;

/// Construction options for [`DataStep`]
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataStepOptions {
    /// Fixed lower margin instead of the rounded start
    pub custom_min: Option<f64>,
    /// Fixed upper margin instead of the rounded end
    pub custom_max: Option<f64>,
    /// Stretch the range to include zero
    pub align_zeros: bool,
    /// Width given to a zero-length range instead of rejecting it
    pub minimum_span: Option<f64>,
    #[serde(skip)]
    pub formatter: Option<ValueFormatter>,
}

impl fmt::Debug for DataStepOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStepOptions")
            .field("custom_min", &self.custom_min)
            .field("custom_max", &self.custom_max)
            .field("align_zeros", &self.align_zeros)
            .field("minimum_span", &self.minimum_span)
            .field("formatter", &self.formatter.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Iterator over the ticks of a numeric axis, top to bottom
#[derive(Clone)]
pub struct DataStep {
    start: f64,
    end: f64,
    container_height: f64,
    step: f64,
    /// Distance between major ticks
    major_step: f64,
    margin_start: f64,
    margin_end: f64,
    /// Steps taken down from `margin_end`
    index: u32,
    current: f64,
    exhausted: bool,
    formatter: Option<ValueFormatter>,
}

impl DataStep {
    /// Create a stepper for `[start, end]` drawn `container_height` pixels
    /// tall with ticks at least `minimum_step` pixels apart
    pub fn new(
        start: f64,
        end: f64,
        minimum_step: f64,
        container_height: f64,
        options: DataStepOptions,
    ) -> Result<Self, AxisError> {
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(AxisError::invalid_range(start, end, "end is before start"));
        }
        let (mut start, mut end) = (start, end);
        if end == start {
            match options.minimum_span.filter(|span| *span > 0.0) {
                Some(span) => {
                    start -= span / 2.0;
                    end += span / 2.0;
                }
                None => {
                    return Err(AxisError::invalid_range(
                        start,
                        end,
                        "zero-length range without a minimum span",
                    ))
                }
            }
        }
        if options.align_zeros {
            start = start.min(0.0);
            end = end.max(0.0);
        }
        if let (Some(min), Some(max)) = (options.custom_min, options.custom_max) {
            if max <= min {
                return Err(AxisError::invalid_range(min, max, "custom maximum is not above custom minimum"));
            }
        }
        if !(minimum_step > 0.0) || !(container_height > 0.0) {
            return Err(AxisError::invalid_range(
                start,
                end,
                "minimum step and container height must be positive",
            ));
        }

        let low = options.custom_min.unwrap_or(start);
        let high = options.custom_max.unwrap_or(end);
        let minimum_value = minimum_step * (high - low) * RANGE_PADDING / container_height;
        let (step, major_step) = choose_step(minimum_value);
        debug!("Value axis step {} for range {} .. {}", step, low, high);

        let margin_start = options.custom_min.unwrap_or((start / step).floor() * step);
        let margin_end = options.custom_max.unwrap_or((end / step).ceil() * step);

        Ok(Self {
            start,
            end,
            container_height,
            step,
            major_step,
            margin_start,
            margin_end,
            index: 0,
            current: margin_end,
            exhausted: false,
            formatter: options.formatter,
        })
    }

    /// Rewind to the top of the axis
    pub fn start(&mut self) {
        self.index = 0;
        self.current = self.margin_end;
        self.exhausted = false;
    }

    pub fn has_next(&self) -> bool {
        !self.exhausted && self.current >= self.margin_start - self.step * 1e-9
    }

    /// Move one step down
    pub fn advance(&mut self) {
        let previous = self.current;
        let next = self.margin_end - f64::from(self.index + 1) * self.step;
        if next < previous {
            self.index += 1;
            self.current = next;
        } else if previous > self.margin_start {
            // the step vanished in rounding: visit the bottom once, then stop
            self.current = self.margin_start;
        } else {
            self.exhausted = true;
        }
    }

    /// Move one step up, extending the top margin
    pub fn previous(&mut self) {
        self.margin_end += self.step;
        if !self.exhausted {
            self.current = self.margin_end - f64::from(self.index) * self.step;
        }
    }

    /// Current value; rounding noise around zero reads as zero
    pub fn current(&self) -> f64 {
        if self.current.abs() < self.step * 1e-9 {
            0.0
        } else {
            self.current
        }
    }

    pub fn is_major(&self) -> bool {
        let ratio = self.current() / self.major_step;
        (ratio - ratio.round()).abs() < 1e-9
    }

    /// Label of the current value
    pub fn label(&self) -> String {
        let value = self.current();
        match &self.formatter {
            Some(formatter) => formatter(value),
            None => format_value(value),
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn margin_start(&self) -> f64 {
        self.margin_start
    }

    pub fn margin_end(&self) -> f64 {
        self.margin_end
    }

    /// The requested range, after zero alignment and span padding
    pub fn range(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    /// Vertical pixel offset of `value`, zero at the top margin
    pub fn to_screen(&self, value: f64) -> f64 {
        let range = self.margin_end - self.margin_start;
        if range == 0.0 {
            return 0.0;
        }
        (self.margin_end - value) / range * self.container_height
    }

    pub fn from_screen(&self, y: f64) -> f64 {
        self.margin_end - y / self.container_height * (self.margin_end - self.margin_start)
    }

    /// Whole steps needed to cover the margin above zero
    fn steps_above_zero(&self) -> i64 {
        (self.margin_end.max(0.0) / self.step - 1e-9).ceil() as i64
    }

    fn steps_below_zero(&self) -> i64 {
        (-self.margin_start.min(0.0) / self.step - 1e-9).ceil() as i64
    }
}

impl Iterator for DataStep {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if !self.has_next() {
            return None;
        }
        let value = self.current();
        self.advance();
        Some(value)
    }
}

impl fmt::Debug for DataStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStep")
            .field("step", &self.step)
            .field("margin_start", &self.margin_start)
            .field("margin_end", &self.margin_end)
            .field("current", &self.current)
            .finish()
    }
}

/// Extend two steppers so zero sits the same number of steps below the top
/// of both axes and both carry the same number of steps. Both are rewound.
pub fn align_zeros(a: &mut DataStep, b: &mut DataStep) {
    for axis in [&mut *a, &mut *b] {
        axis.margin_start = axis.margin_start.min(0.0);
        axis.margin_end = axis.margin_end.max(0.0);
    }

    let above = a.steps_above_zero().max(b.steps_above_zero());
    let below = a.steps_below_zero().max(b.steps_below_zero());
    for axis in [a, b] {
        axis.margin_end = above as f64 * axis.step;
        axis.margin_start = -(below as f64) * axis.step;
        axis.start();
    }
}

/// Smallest of {1, 2, 5} x 10^n not below `minimum`, with its major step
fn choose_step(minimum: f64) -> (f64, f64) {
    if !(minimum > 0.0) || !minimum.is_finite() {
        return (1.0, 5.0);
    }
    let magnitude = 10f64.powf(minimum.log10().floor());
    for (factor, major) in [(1.0, 5.0), (2.0, 10.0), (5.0, 10.0), (10.0, 50.0)] {
        let step = magnitude * factor;
        if step >= minimum * (1.0 - 1e-12) {
            return (step, magnitude * major);
        }
    }
    (magnitude * 10.0, magnitude * 50.0)
}

/// Five significant digits with trailing zeros removed
fn format_value(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let integer_digits = value.abs().log10().floor() as i32 + 1;
    let decimals = (SIGNIFICANT_DIGITS - integer_digits).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(step: DataStep) -> Vec<f64> {
        step.collect()
    }

    #[test]
    fn test_step_is_one_two_or_five() {
        assert_eq!(choose_step(0.7), (1.0, 5.0));
        assert_eq!(choose_step(1.0), (1.0, 5.0));
        assert_eq!(choose_step(1.3), (2.0, 10.0));
        assert_eq!(choose_step(3.0), (5.0, 10.0));
        assert_eq!(choose_step(6.0), (10.0, 50.0));
        assert!((choose_step(0.03).0 - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_counts_down_from_rounded_margins() {
        // minimum value = 20 * 8 * 1.2 / 100 = 1.92, so step 2
        let step = DataStep::new(1.0, 9.0, 20.0, 100.0, DataStepOptions::default()).unwrap();
        assert_eq!(step.step(), 2.0);
        assert_eq!((step.margin_start(), step.margin_end()), (0.0, 10.0));
        assert_eq!(values(step), vec![10.0, 8.0, 6.0, 4.0, 2.0, 0.0]);
    }

    #[test]
    fn test_major_ticks() {
        let mut step = DataStep::new(0.0, 20.0, 5.0, 100.0, DataStepOptions::default()).unwrap();
        // minimum value = 5 * 20 * 1.2 / 100 = 1.2, so step 2 with majors every 10
        assert_eq!(step.step(), 2.0);
        let mut majors = Vec::new();
        while step.has_next() {
            if step.is_major() {
                majors.push(step.current());
            }
            step.advance();
        }
        assert_eq!(majors, vec![20.0, 10.0, 0.0]);
    }

    #[test]
    fn test_fractional_steps_snap_to_zero() {
        let step = DataStep::new(-0.3, 0.3, 10.0, 100.0, DataStepOptions::default()).unwrap();
        let ticks = values(step);
        assert!(ticks.contains(&0.0));
        let expected = [0.3, 0.2, 0.1, 0.0, -0.1, -0.2, -0.3];
        assert_eq!(ticks.len(), expected.len());
        for (tick, want) in ticks.iter().zip(expected) {
            assert!((tick - want).abs() < 1e-9, "{} != {}", tick, want);
        }
    }

    #[test]
    fn test_custom_margins() {
        let options = DataStepOptions {
            custom_min: Some(-5.0),
            custom_max: Some(15.0),
            ..Default::default()
        };
        let step = DataStep::new(0.0, 10.0, 30.0, 100.0, options).unwrap();
        assert_eq!((step.margin_start(), step.margin_end()), (-5.0, 15.0));

        let ticks: Vec<(f64, f64)> = step.clone().map(|v| (v, step.to_screen(v))).collect();
        assert_eq!(ticks, vec![(15.0, 0.0), (5.0, 50.0), (-5.0, 100.0)]);

        let bad = DataStepOptions {
            custom_min: Some(3.0),
            custom_max: Some(1.0),
            ..Default::default()
        };
        assert!(DataStep::new(0.0, 10.0, 30.0, 100.0, bad).is_err());
    }

    #[test]
    fn test_zero_length_range() {
        assert!(matches!(
            DataStep::new(4.0, 4.0, 20.0, 100.0, DataStepOptions::default()),
            Err(AxisError::InvalidRange { .. })
        ));
        let options = DataStepOptions {
            minimum_span: Some(2.0),
            ..Default::default()
        };
        let step = DataStep::new(4.0, 4.0, 20.0, 100.0, options).unwrap();
        assert_eq!(step.range(), (3.0, 5.0));
        assert!(DataStep::new(5.0, 4.0, 20.0, 100.0, DataStepOptions::default()).is_err());
    }

    #[test]
    fn test_align_zeros_option_includes_zero() {
        let options = DataStepOptions {
            align_zeros: true,
            ..Default::default()
        };
        let step = DataStep::new(40.0, 90.0, 20.0, 100.0, options).unwrap();
        assert_eq!(step.margin_start(), 0.0);
    }

    #[test]
    fn test_align_zeros_between_axes() {
        let mut left = DataStep::new(-10.0, 30.0, 25.0, 100.0, DataStepOptions::default()).unwrap();
        let mut right = DataStep::new(0.0, 500.0, 25.0, 100.0, DataStepOptions::default()).unwrap();
        assert_eq!(left.step(), 20.0);
        assert_eq!(right.step(), 200.0);

        align_zeros(&mut left, &mut right);

        let left_ticks = values(left.clone());
        let right_ticks = values(right.clone());
        assert_eq!(left_ticks.len(), right_ticks.len());
        let left_zero = left_ticks.iter().position(|v| *v == 0.0);
        let right_zero = right_ticks.iter().position(|v| *v == 0.0);
        assert!(left_zero.is_some());
        assert_eq!(left_zero, right_zero);
        assert_eq!(left.margin_start(), -20.0);
        assert_eq!(right.margin_start(), -200.0);
    }

    #[test]
    fn test_align_zeros_covers_custom_margins() {
        let options = DataStepOptions {
            custom_min: Some(-5.0),
            custom_max: Some(15.0),
            ..Default::default()
        };
        let mut custom = DataStep::new(0.0, 10.0, 30.0, 100.0, options).unwrap();
        let mut plain = DataStep::new(0.0, 10.0, 30.0, 100.0, DataStepOptions::default()).unwrap();
        align_zeros(&mut custom, &mut plain);

        assert_eq!((custom.margin_start(), custom.margin_end()), (-10.0, 20.0));
        assert_eq!(values(custom), vec![20.0, 10.0, 0.0, -10.0]);
    }

    #[test]
    fn test_previous_extends_top() {
        let mut step = DataStep::new(1.0, 9.0, 20.0, 100.0, DataStepOptions::default()).unwrap();
        step.previous();
        assert_eq!(step.current(), 12.0);
        assert_eq!(step.margin_end(), 12.0);
    }

    #[test]
    fn test_screen_mapping() {
        let step = DataStep::new(1.0, 9.0, 20.0, 100.0, DataStepOptions::default()).unwrap();
        assert_eq!(step.to_screen(10.0), 0.0);
        assert_eq!(step.to_screen(0.0), 100.0);
        assert_eq!(step.to_screen(5.0), 50.0);
        assert_eq!(step.from_screen(25.0), 7.5);
    }

    #[test]
    fn test_labels() {
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(12.0), "12");
        assert_eq!(format_value(1234567.0), "1234567");
        assert_eq!(format_value(0.000125), "0.000125");
        assert_eq!(format_value(-3.14159265), "-3.1416");

        let options = DataStepOptions {
            formatter: Some(Arc::new(|v: f64| format!("{}%", v))),
            ..Default::default()
        };
        let step = DataStep::new(1.0, 9.0, 20.0, 100.0, options).unwrap();
        assert_eq!(step.label(), "10%");
    }
}
