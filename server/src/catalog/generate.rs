//! Bulk slot generation over a date range and a daily time window.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::models::slot::{is_night_time, parse_date, parse_time, GenerateSlotsRequest};
use crate::models::NewSlot;
use crate::utils::AppError;

pub const MIN_INTERVAL_MINUTES: u32 = 30;
pub const MAX_INTERVAL_MINUTES: u32 = 180;
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub interval_minutes: u32,
    pub price: Decimal,
    pub capacity: i32,
}

impl TryFrom<GenerateSlotsRequest> for SlotRange {
    type Error = AppError;

    fn try_from(req: GenerateSlotsRequest) -> Result<Self, Self::Error> {
        let range = SlotRange {
            start_date: parse_date("startDate", &req.start_date)?,
            end_date: parse_date("endDate", &req.end_date)?,
            start_time: parse_time("startTime", &req.start_time)?,
            end_time: parse_time("endTime", &req.end_time)?,
            interval_minutes: req.interval,
            price: req.price,
            capacity: req.capacity,
        };

        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&range.interval_minutes) {
            return Err(AppError::ValidationError(format!(
                "Interval must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES} minutes"
            )));
        }
        if range.end_date < range.start_date {
            return Err(AppError::ValidationError(
                "endDate must not be before startDate".to_string(),
            ));
        }
        if (range.end_date - range.start_date).num_days() >= MAX_RANGE_DAYS {
            return Err(AppError::ValidationError(format!(
                "A range may cover at most {MAX_RANGE_DAYS} days"
            )));
        }
        if range.price.is_sign_negative() || range.price.is_zero() {
            return Err(AppError::ValidationError(
                "price must be greater than 0".to_string(),
            ));
        }
        if range.capacity < 1 {
            return Err(AppError::ValidationError(
                "capacity must be at least 1".to_string(),
            ));
        }
        Ok(range)
    }
}

/// Window of one day: an end of 00:00 means 23:59, an end before the start
/// runs into the next day.
fn window(day: NaiveDate, start: NaiveTime, end: NaiveTime) -> (NaiveDateTime, NaiveDateTime) {
    let from = day.and_time(start);
    let to = if end == NaiveTime::MIN {
        day.and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN))
    } else if end < start {
        day.and_time(end) + Duration::days(1)
    } else {
        day.and_time(end)
    };
    (from, to)
}

/// Every slot start in the range, both ends of each daily window included.
/// Starts past midnight belong to the calendar day they fall on.
pub fn generate(range: &SlotRange) -> Vec<NewSlot> {
    let step = Duration::minutes(i64::from(range.interval_minutes));
    let mut seen = BTreeSet::new();
    let mut slots = Vec::new();

    for day in range.start_date.iter_days().take_while(|d| *d <= range.end_date) {
        let (mut at, to) = window(day, range.start_time, range.end_time);
        while at <= to {
            if seen.insert(at) {
                slots.push(NewSlot {
                    date: at.date(),
                    time: at.time(),
                    price: range.price,
                    total_capacity: range.capacity,
                    is_night: is_night_time(at.time()),
                    is_enabled: true,
                });
            }
            at += step;
        }
    }

    slots
}
