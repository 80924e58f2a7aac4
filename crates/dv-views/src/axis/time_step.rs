//! Calendar tick generation for time axes
//!
//! A [`TimeStep`] picks a calendar unit and step for a range, snaps the
//! first tick down to a round boundary and then walks the range one step at
//! a time. Day, month and year steps are done on the wall clock of the
//! stepper's time zone, so a daily tick stays at the same local hour across
//! daylight-saving shifts. Hidden ranges are jumped over.

use std::fmt::{self, Write};

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{FormatTable, HiddenRanges, Scale, Switch};
use crate::AxisError;

const SECOND: f64 = 1000.0;
const MINUTE: f64 = 60.0 * SECOND;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 12.0 * MONTH;

/// Candidate steps from coarse to fine with the duration each one covers
const LADDER: [(f64, Scale, u32); 29] = [
    (YEAR * 1000.0, Scale::Year, 1000),
    (YEAR * 500.0, Scale::Year, 500),
    (YEAR * 100.0, Scale::Year, 100),
    (YEAR * 50.0, Scale::Year, 50),
    (YEAR * 10.0, Scale::Year, 10),
    (YEAR * 5.0, Scale::Year, 5),
    (YEAR, Scale::Year, 1),
    (MONTH * 3.0, Scale::Month, 3),
    (MONTH, Scale::Month, 1),
    (DAY * 5.0, Scale::Day, 5),
    (DAY * 2.0, Scale::Day, 2),
    (DAY, Scale::Day, 1),
    (DAY / 2.0, Scale::Weekday, 1),
    (HOUR * 4.0, Scale::Hour, 4),
    (HOUR, Scale::Hour, 1),
    (MINUTE * 15.0, Scale::Minute, 15),
    (MINUTE * 10.0, Scale::Minute, 10),
    (MINUTE * 5.0, Scale::Minute, 5),
    (MINUTE, Scale::Minute, 1),
    (SECOND * 15.0, Scale::Second, 15),
    (SECOND * 10.0, Scale::Second, 10),
    (SECOND * 5.0, Scale::Second, 5),
    (SECOND, Scale::Second, 1),
    (200.0, Scale::Millisecond, 200),
    (100.0, Scale::Millisecond, 100),
    (50.0, Scale::Millisecond, 50),
    (10.0, Scale::Millisecond, 10),
    (5.0, Scale::Millisecond, 5),
    (1.0, Scale::Millisecond, 1),
];

/// Construction options for [`TimeStep`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeStepOptions {
    /// Length in milliseconds given to a zero-length range instead of
    /// rejecting it
    pub minimum_span: Option<i64>,
    pub format: FormatTable,
}

/// One generated tick
#[derive(Debug, Clone, PartialEq)]
pub struct Tick<Tz: TimeZone> {
    pub time: DateTime<Tz>,
    pub major: bool,
}

/// Iterator over the calendar ticks of a time range
#[derive(Debug, Clone)]
pub struct TimeStep<Tz: TimeZone> {
    tz: Tz,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    current: DateTime<Tz>,
    scale: Scale,
    step: u32,
    auto_scale: bool,
    switched: Option<Switch>,
    exhausted: bool,
    hidden: HiddenRanges,
    minimum_span: Option<i64>,
    format: FormatTable,
}

impl<Tz: TimeZone> TimeStep<Tz> {
    /// Create a stepper for `[start, end]` whose step covers at least
    /// `minimum_step` milliseconds. The stepper is positioned on its first
    /// tick.
    pub fn new(
        tz: Tz,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        minimum_step: f64,
        hidden: HiddenRanges,
        options: TimeStepOptions,
    ) -> Result<Self, AxisError> {
        let first = start.with_timezone(&tz);
        let mut time_step = Self {
            start: first.clone(),
            end: first.clone(),
            current: first,
            tz,
            scale: Scale::Day,
            step: 1,
            auto_scale: true,
            switched: None,
            exhausted: false,
            hidden,
            minimum_span: options.minimum_span,
            format: options.format,
        };
        time_step.set_range(start, end, minimum_step)?;
        time_step.start();
        Ok(time_step)
    }

    /// Change the range; with auto scale on, the step is chosen again.
    /// Call [`start`](Self::start) to rewind afterwards.
    pub fn set_range(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        minimum_step: f64,
    ) -> Result<(), AxisError> {
        if end < start {
            return Err(AxisError::invalid_range(start, end, "end is before start"));
        }
        let end = if end == start {
            match self.minimum_span.filter(|span| *span > 0) {
                Some(span) => start + Duration::milliseconds(span),
                None => {
                    return Err(AxisError::invalid_range(
                        start,
                        end,
                        "zero-length range without a minimum span",
                    ))
                }
            }
        } else {
            end
        };

        self.start = start.with_timezone(&self.tz);
        self.end = end.with_timezone(&self.tz);
        if self.auto_scale {
            self.set_minimum_step(minimum_step);
        }
        Ok(())
    }

    /// Pick the finest step that still covers more than `minimum_step`
    /// milliseconds
    pub fn set_minimum_step(&mut self, minimum_step: f64) {
        for (duration, scale, step) in LADDER {
            if duration > minimum_step {
                self.scale = scale;
                self.step = step;
            }
        }
        debug!("Time axis steps by {} {}", self.step, self.scale);
    }

    /// Fix the scale and step; turns auto scale off
    pub fn set_scale(&mut self, scale: Scale, step: u32) {
        self.scale = scale;
        self.step = step.max(1);
        self.auto_scale = false;
    }

    pub fn set_auto_scale(&mut self, enabled: bool) {
        self.auto_scale = enabled;
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn current(&self) -> &DateTime<Tz> {
        &self.current
    }

    /// Rewind to the first tick: the range start rounded down to the step
    pub fn start(&mut self) {
        let rounded = round_down(self.start.naive_local(), self.scale, self.step);
        self.current = resolve(&self.tz, rounded);
        if let Some(range) = self.hidden.find(self.current.with_timezone(&Utc)) {
            self.current = range.end.with_timezone(&self.tz);
        }
        self.switched = None;
        self.exhausted = false;
    }

    pub fn has_next(&self) -> bool {
        !self.exhausted && self.current <= self.end
    }

    /// Move to the next tick
    pub fn advance(&mut self) {
        let previous = self.current.clone();

        let advanced = match fixed_length(self.scale, self.step) {
            Some(length) => previous.clone().checked_add_signed(length),
            None => advance_wall_clock(previous.naive_local(), self.scale, self.step)
                .map(|naive| resolve(&self.tz, naive)),
        }
        .unwrap_or_else(|| previous.clone());

        let wall = advanced.naive_local();
        let aligned = reset_partial_unit(wall, self.scale, self.step);
        let next = if aligned != wall { resolve(&self.tz, aligned) } else { advanced };

        if next == previous {
            // no progress: land on the end once, then stop
            if previous < self.end {
                self.current = self.end.clone();
            } else {
                self.exhausted = true;
            }
        } else {
            self.current = next;
        }

        self.switched = None;
        if let Some((target, switch)) = self.hidden.step_over(&self.current, &previous, &self.end) {
            self.current = target;
            self.switched = switch;
        }
    }

    /// Whether the current tick sits on a boundary of the next coarser unit
    pub fn is_major(&self) -> bool {
        if let Some(switch) = self.switched {
            return match switch {
                Switch::Year => true,
                Switch::Month => !matches!(self.scale, Scale::Month | Scale::Year),
                Switch::Day => matches!(
                    self.scale,
                    Scale::Millisecond | Scale::Second | Scale::Minute | Scale::Hour
                ),
            };
        }

        let wall = self.current.naive_local();
        match self.scale {
            Scale::Millisecond => wall.nanosecond() / 1_000_000 == 0,
            Scale::Second => wall.second() == 0,
            Scale::Minute => wall.hour() == 0 && wall.minute() == 0,
            Scale::Hour => wall.hour() == 0,
            Scale::Weekday | Scale::Day => wall.day() == 1,
            Scale::Month => wall.month0() == 0,
            Scale::Year => false,
        }
    }

    /// Round `date` to the nearest boundary of `scale` and `step`
    pub fn snap(date: &DateTime<Tz>, scale: Scale, step: u32) -> DateTime<Tz> {
        let tz = date.timezone();
        let step = step.max(1);
        let wall = date.naive_local();

        let floor_wall = round_down(wall, scale, step);
        let floor = resolve(&tz, floor_wall);
        let ceil = match advance_wall_clock(floor_wall, scale, step) {
            Some(next) => resolve(&tz, reset_partial_unit(next, scale, step)),
            None => return floor,
        };

        if date.clone().signed_duration_since(floor.clone()) < ceil.clone().signed_duration_since(date.clone()) {
            floor
        } else {
            ceil
        }
    }
}

impl<Tz: TimeZone> TimeStep<Tz>
where
    Tz::Offset: fmt::Display,
{
    /// Label shown under every tick
    pub fn label_minor(&self, date: &DateTime<Tz>) -> String {
        format_date(date, self.format.minor_labels.get(self.scale))
    }

    /// Label shown at major ticks
    pub fn label_major(&self, date: &DateTime<Tz>) -> String {
        format_date(date, self.format.major_labels.get(self.scale))
    }
}

impl<Tz: TimeZone> Iterator for TimeStep<Tz> {
    type Item = Tick<Tz>;

    fn next(&mut self) -> Option<Tick<Tz>> {
        if !self.has_next() {
            return None;
        }
        let tick = Tick {
            time: self.current.clone(),
            major: self.is_major(),
        };
        self.advance();
        Some(tick)
    }
}

fn format_date<Tz: TimeZone>(date: &DateTime<Tz>, pattern: &str) -> String
where
    Tz::Offset: fmt::Display,
{
    let mut label = String::new();
    if pattern.is_empty() {
        return label;
    }
    if write!(label, "{}", date.format(pattern)).is_err() {
        warn!("Invalid date label pattern '{}'", pattern);
        label.clear();
    }
    label
}

/// Steps measured in elapsed time rather than on the wall clock
fn fixed_length(scale: Scale, step: u32) -> Option<Duration> {
    let step = i64::from(step);
    match scale {
        Scale::Millisecond => Some(Duration::milliseconds(step)),
        Scale::Second => Some(Duration::seconds(step)),
        Scale::Minute => Some(Duration::minutes(step)),
        _ => None,
    }
}

fn advance_wall_clock(wall: NaiveDateTime, scale: Scale, step: u32) -> Option<NaiveDateTime> {
    match scale {
        Scale::Millisecond | Scale::Second | Scale::Minute => {
            wall.checked_add_signed(fixed_length(scale, step)?)
        }
        Scale::Hour => wall.checked_add_signed(Duration::hours(i64::from(step))),
        Scale::Weekday | Scale::Day => wall.checked_add_signed(Duration::days(i64::from(step))),
        Scale::Month => wall.checked_add_months(Months::new(step)),
        Scale::Year => wall.checked_add_months(Months::new(step.saturating_mul(12))),
    }
}

/// Truncate to the start of the unit, then down to a multiple of the step
fn round_down(wall: NaiveDateTime, scale: Scale, step: u32) -> NaiveDateTime {
    let step = step.max(1);
    let date = wall.date();
    let (hour, minute, second) = (wall.hour(), wall.minute(), wall.second());
    let millis = (wall.nanosecond() / 1_000_000).min(999);
    let midnight = |year: i32, month0: u32, day: u32| {
        NaiveDate::from_ymd_opt(year, month0 + 1, day).and_then(|d| d.and_hms_opt(0, 0, 0))
    };

    let rounded = match scale {
        Scale::Year => {
            let year = date.year();
            midnight(year - year.rem_euclid(i32::try_from(step).unwrap_or(i32::MAX)), 0, 1)
        }
        Scale::Month => midnight(date.year(), date.month0() - date.month0() % step, 1),
        Scale::Weekday | Scale::Day => {
            midnight(date.year(), date.month0(), date.day() - (date.day() - 1) % step)
        }
        Scale::Hour => date.and_hms_opt(hour - hour % step, 0, 0),
        Scale::Minute => date.and_hms_opt(hour, minute - minute % step, 0),
        Scale::Second => date.and_hms_opt(hour, minute, second - second % step),
        Scale::Millisecond => date.and_hms_milli_opt(hour, minute, second, millis - millis % step),
    };
    rounded.unwrap_or(wall)
}

/// After crossing into the next coarser unit, restart the count at zero
/// when the step would otherwise leave a short first interval
fn reset_partial_unit(wall: NaiveDateTime, scale: Scale, step: u32) -> NaiveDateTime {
    if step <= 1 {
        return wall;
    }
    let millis = wall.nanosecond() / 1_000_000;
    let reset = match scale {
        Scale::Millisecond if millis > 0 && millis < step => wall.with_nanosecond(0),
        Scale::Second if wall.second() > 0 && wall.second() < step => wall.with_second(0),
        Scale::Minute if wall.minute() > 0 && wall.minute() < step => wall.with_minute(0),
        Scale::Hour if wall.hour() > 0 && wall.hour() < step => wall.with_hour(0),
        Scale::Weekday | Scale::Day if wall.day() < step + 1 => wall.with_day(1),
        Scale::Month if wall.month0() < step => wall.with_month0(0),
        _ => None,
    };
    reset.unwrap_or(wall)
}

/// Map a wall-clock time to an instant. Ambiguous times take the earlier
/// instant; times skipped by a forward shift are read with the offset in
/// force before the shift, which lands just after it.
fn resolve<Tz: TimeZone>(tz: &Tz, wall: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(date) => date,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = wall.checked_sub_signed(Duration::days(1)).unwrap_or(wall);
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc = wall
                .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
                .unwrap_or(wall);
            tz.from_utc_datetime(&utc)
        }
    }
}
