use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::slot::{parse_date, Slot};
use crate::payments::GatewayOrder;
use crate::utils::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub user_id: String,
    pub date: NaiveDate,
    pub status: BookingStatus,
    pub amount: Decimal,
    pub both_turfs: bool,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Capacity units this booking takes from its slot.
    pub fn units(&self) -> i32 {
        units_for(self.both_turfs)
    }

    /// Whether the booking holds capacity. Pending bookings created before
    /// `hold_cutoff` have lapsed.
    pub fn is_active(&self, hold_cutoff: DateTime<Utc>) -> bool {
        match self.status {
            BookingStatus::Confirmed => true,
            BookingStatus::Pending => self.created_at > hold_cutoff,
            BookingStatus::Cancelled => false,
        }
    }
}

pub fn units_for(both_turfs: bool) -> i32 {
    if both_turfs {
        2
    } else {
        1
    }
}

/// Payment proof returned by the gateway checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

impl PaymentProof {
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("orderId", &self.order_id),
            ("paymentId", &self.payment_id),
            ("signature", &self.signature),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::ValidationError(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// A booking about to be admitted.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub slot_id: Uuid,
    pub user_id: String,
    pub date: NaiveDate,
    pub both_turfs: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithSlot {
    #[serde(flatten)]
    pub booking: Booking,
    pub slot: Option<Slot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub slot_id: Uuid,
    pub date: String,
    #[serde(default)]
    pub both_turfs: bool,
    pub payment: Option<PaymentProof>,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub both_turfs: bool,
    pub payment: Option<PaymentProof>,
}

impl CreateBookingRequest {
    pub fn validate(self) -> Result<BookingRequest, AppError> {
        if let Some(proof) = &self.payment {
            proof.validate()?;
        }
        Ok(BookingRequest {
            slot_id: self.slot_id,
            date: parse_date("date", &self.date)?,
            both_turfs: self.both_turfs,
            payment: self.payment,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingAdmission {
    pub booking: Booking,
    /// Present while the booking still awaits payment.
    pub order: Option<GatewayOrder>,
    pub key_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsForDateQuery {
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking(status: BookingStatus, age_minutes: i64) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            date: now.date_naive(),
            status,
            amount: Decimal::new(1000, 0),
            both_turfs: false,
            order_id: None,
            payment_id: None,
            signature: None,
            created_at: now - Duration::minutes(age_minutes),
            confirmed_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_units() {
        assert_eq!(units_for(false), 1);
        assert_eq!(units_for(true), 2);
    }

    #[test]
    fn test_pending_hold_lapses() {
        let cutoff = Utc::now() - Duration::minutes(15);
        assert!(booking(BookingStatus::Pending, 5).is_active(cutoff));
        assert!(!booking(BookingStatus::Pending, 30).is_active(cutoff));
        assert!(booking(BookingStatus::Confirmed, 600).is_active(cutoff));
        assert!(!booking(BookingStatus::Cancelled, 1).is_active(cutoff));
    }

    #[test]
    fn test_create_request_validation() {
        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "slotId": Uuid::new_v4(),
            "date": "2024-06-01",
        }))
        .unwrap();
        let req = req.validate().unwrap();
        assert!(!req.both_turfs);
        assert!(req.payment.is_none());

        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "slotId": Uuid::new_v4(),
            "date": "2024-06-01",
            "payment": { "orderId": "order_1", "paymentId": " ", "signature": "abc" }
        }))
        .unwrap();
        assert!(matches!(req.validate(), Err(AppError::ValidationError(_))));
    }
}
