use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: String,
    pub ticket_number: String,
    /// JSON document rendered into the QR code by the client.
    pub qr_payload: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub booking_id: Uuid,
    pub user_id: String,
    pub ticket_number: String,
    pub qr_payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTicketRequest {
    pub ticket_number: String,
}

impl VerifyTicketRequest {
    pub fn validate(self) -> Result<String, AppError> {
        let number = self.ticket_number.trim();
        if number.is_empty() {
            return Err(AppError::ValidationError(
                "Ticket number is required".to_string(),
            ));
        }
        Ok(number.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_valid: bool,
    pub already_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub message: String,
    pub ticket: Ticket,
}
