use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::slot::hh_mm;
use crate::models::{Booking, Slot};
use crate::utils::{AppError, AppResult};

pub const TICKET_PREFIX: &str = "TF";

/// `TF` + `YYMMDD` + four random digits, e.g. `TF2406010427`.
pub fn generate_ticket_number<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    format!(
        "{}{}{:04}",
        TICKET_PREFIX,
        now.format("%y%m%d"),
        rng.gen_range(0..10_000)
    )
}

/// Document encoded into the ticket's QR code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QrPayload<'a> {
    ticket_number: &'a str,
    booking_id: Uuid,
    user_id: &'a str,
    date: NaiveDate,
    #[serde(with = "hh_mm")]
    time: chrono::NaiveTime,
    amount: Decimal,
}

pub fn qr_payload(ticket_number: &str, booking: &Booking, slot: &Slot) -> AppResult<String> {
    serde_json::to_string(&QrPayload {
        ticket_number,
        booking_id: booking.id,
        user_id: &booking.user_id,
        date: booking.date,
        time: slot.time,
        amount: booking.amount,
    })
    .map_err(|e| AppError::InternalServerError(format!("failed to encode QR payload: {e}")))
}
