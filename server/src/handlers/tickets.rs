use axum::extract::State;
use axum::response::Response;

use crate::auth::{AdminUser, CurrentUser};
use crate::models::ticket::{IssueTicketRequest, VerifyTicketRequest};
use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::{ApiJson, AppResult};

pub async fn issue_ticket(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<IssueTicketRequest>,
) -> AppResult<Response> {
    let ticket = state
        .ledger
        .issue_ticket(&user.id, request.booking_id)
        .await?;
    Ok(success(ticket, "Ticket ready"))
}

pub async fn my_tickets(
    user: CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let tickets = state.ledger.user_tickets(&user.id).await?;
    Ok(success(tickets, "Tickets retrieved successfully"))
}

/// Gate scan. A second scan is not an error; the result reports it.
pub async fn verify_ticket(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyTicketRequest>,
) -> AppResult<Response> {
    let result = state.ledger.verify_ticket(&request.validate()?).await?;
    let message = result.message.clone();
    Ok(success(result, message))
}
