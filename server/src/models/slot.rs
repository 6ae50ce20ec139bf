use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::AppError;

pub const DEFAULT_TOTAL_CAPACITY: i32 = 3;

/// Slots starting at or after this hour, or before [`NIGHT_ENDS_HOUR`], are night slots.
pub const NIGHT_STARTS_HOUR: u32 = 18;
pub const NIGHT_ENDS_HOUR: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
    pub price: Decimal,
    pub total_capacity: i32,
    pub is_night: bool,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A slot together with the units still free on its date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    #[serde(flatten)]
    pub slot: Slot,
    pub remaining: i32,
}

/// Validated input for creating (or replacing) the slot at `(date, time)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub price: Decimal,
    pub total_capacity: i32,
    pub is_night: bool,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotChanges {
    pub time: NaiveTime,
    pub price: Decimal,
    pub total_capacity: i32,
}

pub fn is_night_time(time: NaiveTime) -> bool {
    let hour = time.hour();
    hour >= NIGHT_STARTS_HOUR || hour < NIGHT_ENDS_HOUR
}

/// Parses a calendar date in canonical `YYYY-MM-DD` form.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::ValidationError(format!("{field} must be a date in YYYY-MM-DD format"))
    })
}

/// Parses `HH:MM`, tolerating a trailing `:SS`.
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, AppError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppError::ValidationError(format!("{field} must be a time in HH:MM format")))
}

fn validate_price(price: Decimal) -> Result<Decimal, AppError> {
    if price.is_sign_negative() {
        return Err(AppError::ValidationError(
            "price must not be negative".to_string(),
        ));
    }
    Ok(price)
}

fn validate_capacity(capacity: i32) -> Result<i32, AppError> {
    if capacity < 1 {
        return Err(AppError::ValidationError(
            "totalCapacity must be at least 1".to_string(),
        ));
    }
    Ok(capacity)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSlotsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSlotRequest {
    pub date: String,
    pub time: String,
    pub price: Decimal,
    pub total_capacity: Option<i32>,
    pub is_night: Option<bool>,
    pub is_enabled: Option<bool>,
}

impl UpsertSlotRequest {
    pub fn validate(self) -> Result<NewSlot, AppError> {
        let date = parse_date("date", &self.date)?;
        let time = parse_time("time", &self.time)?;
        Ok(NewSlot {
            date,
            time,
            price: validate_price(self.price)?,
            total_capacity: validate_capacity(
                self.total_capacity.unwrap_or(DEFAULT_TOTAL_CAPACITY),
            )?,
            is_night: self.is_night.unwrap_or_else(|| is_night_time(time)),
            is_enabled: self.is_enabled.unwrap_or(true),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSlotRequest {
    pub time: String,
    pub price: Decimal,
    pub total_capacity: i32,
}

impl UpdateSlotRequest {
    pub fn validate(self) -> Result<SlotChanges, AppError> {
        Ok(SlotChanges {
            time: parse_time("time", &self.time)?,
            price: validate_price(self.price)?,
            total_capacity: validate_capacity(self.total_capacity)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSlotEnabledRequest {
    pub is_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSlotsRequest {
    pub start_date: String,
    pub end_date: String,
    pub start_time: String,
    pub end_time: String,
    pub interval: u32,
    pub price: Decimal,
    pub capacity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSlot {
    pub date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
    pub is_night: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSlotsResponse {
    pub created: u64,
    pub existing: u64,
    pub total_attempted: u64,
    pub generated_slots: Vec<GeneratedSlot>,
}

pub(crate) mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time("time", &raw).map_err(serde::de::Error::custom)
    }
}
