//! Slot arithmetic.
//!
//! A slot is a `(date, base_time)` bucket. Buckets are measured from the
//! day's opening time, not from midnight, so they line up with the
//! business-hours grid of the calendar.

use std::{collections::HashMap, fmt};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::error::SlotError;

/// Slots are never narrower than an hour
pub const MIN_GRANULARITY_MINUTES: u32 = 60;

const RAW_TIME_FORMATS: [&str; 5] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p", "%I:%M:%S %p"];

/// Canonical slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub base_time: NaiveTime,
}

impl SlotKey {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.base_time)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.date.format("%Y-%m-%d"),
            self.base_time.format("%H:%M")
        )
    }
}

/// Opening time per weekday
#[derive(Debug, Clone)]
pub struct BusinessHours {
    default_opening: NaiveTime,
    overrides: HashMap<Weekday, NaiveTime>,
}

impl BusinessHours {
    pub fn new(default_opening: NaiveTime) -> Self {
        Self {
            default_opening,
            overrides: HashMap::new(),
        }
    }

    /// Use a different opening time on one weekday
    pub fn with_opening(mut self, weekday: Weekday, opening: NaiveTime) -> Self {
        self.overrides.insert(weekday, opening);
        self
    }

    pub fn opening_for(&self, date: NaiveDate) -> NaiveTime {
        self.overrides
            .get(&date.weekday())
            .copied()
            .unwrap_or(self.default_opening)
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self::new(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default())
    }
}

/// Slot layout settings
#[derive(Debug, Clone)]
pub struct SlotConfig {
    pub granularity_minutes: u32,
    pub business_hours: BusinessHours,
    /// Duration of each item in a normally occupied slot
    pub standard_duration_minutes: u32,
    /// Duration of each item once the slot is crowded
    pub compact_duration_minutes: u32,
    /// Occupancy from which the compact duration applies
    pub compact_threshold: usize,
    /// Gap between consecutive items
    pub gap_minutes: u32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            granularity_minutes: 120,
            business_hours: BusinessHours::default(),
            standard_duration_minutes: 20,
            compact_duration_minutes: 15,
            compact_threshold: 6,
            gap_minutes: 1,
        }
    }
}

impl SlotConfig {
    /// Effective granularity (clamped to at least an hour)
    pub fn granularity(&self) -> u32 {
        self.granularity_minutes.max(MIN_GRANULARITY_MINUTES)
    }

    /// Per-item duration for a slot holding `occupancy` items
    pub fn duration_for(&self, occupancy: usize) -> u32 {
        if occupancy >= self.compact_threshold {
            self.compact_duration_minutes
        } else {
            self.standard_duration_minutes
        }
    }

    /// Base minute offset of the slot containing `minutes` on `date`
    pub fn slot_base_minutes(&self, date: NaiveDate, minutes: u32) -> u32 {
        let opening = minutes_of_day(self.business_hours.opening_for(date));
        let granularity = self.granularity();
        let relative = minutes.saturating_sub(opening);
        opening + (relative / granularity) * granularity
    }

    /// Canonical slot start for a raw time, formatted `HH:MM`
    pub fn compute_slot_base(&self, date: NaiveDate, raw_time: &str) -> Result<String, SlotError> {
        let key = self.slot_key(date, raw_time)?;
        Ok(key.base_time.format("%H:%M").to_string())
    }

    pub fn slot_key(&self, date: NaiveDate, raw_time: &str) -> Result<SlotKey, SlotError> {
        let time = parse_raw_time(raw_time)?;
        self.slot_key_at(date, time)
    }

    /// Slot key for an already parsed start
    pub fn slot_key_for(&self, start: NaiveDateTime) -> Result<SlotKey, SlotError> {
        self.slot_key_at(start.date(), start.time())
    }

    fn slot_key_at(&self, date: NaiveDate, time: NaiveTime) -> Result<SlotKey, SlotError> {
        let base = self.slot_base_minutes(date, minutes_of_day(time));
        Ok(SlotKey {
            date,
            base_time: time_from_minutes(base)?,
        })
    }

    /// Whether `start` falls in the half-open window `[base, base + granularity)` of `key`
    pub fn window_contains(&self, key: &SlotKey, start: NaiveDateTime) -> bool {
        if start.date() != key.date {
            return false;
        }
        let base = minutes_of_day(key.base_time);
        let minutes = minutes_of_day(start.time());
        base <= minutes && minutes < base + self.granularity()
    }
}

/// Parse a raw time of day (`HH:MM`, `HH:MM:SS` or 12-hour `h:MM AM`)
pub fn parse_raw_time(raw: &str) -> Result<NaiveTime, SlotError> {
    let trimmed = raw.trim();
    RAW_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| SlotError::InvalidTime(raw.to_string()))
}

pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

pub fn time_from_minutes(minutes: u32) -> Result<NaiveTime, SlotError> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).ok_or(SlotError::OutOfRange(minutes))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
