use axum::extract::State;
use axum::response::Response;
use uuid::Uuid;

use crate::auth::{Actor, AdminUser, CurrentUser};
use crate::models::booking::{BookingsForDateQuery, CreateBookingRequest};
use crate::models::slot::parse_date;
use crate::models::PaymentProof;
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::{ApiJson, ApiPath, ApiQuery, AppResult};

pub async fn create_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateBookingRequest>,
) -> AppResult<Response> {
    let admission = state
        .ledger
        .request_booking(&user.id, request.validate()?)
        .await?;
    let message = if admission.order.is_some() {
        "Booking reserved, complete the payment to confirm"
    } else {
        "Booking confirmed"
    };
    Ok(created(admission, message))
}

pub async fn confirm_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(proof): ApiJson<PaymentProof>,
) -> AppResult<Response> {
    proof.validate()?;
    let booking = state.ledger.confirm_payment(&user.id, id, &proof).await?;
    Ok(success(booking, "Payment verified, booking confirmed"))
}

pub async fn cancel_own_booking(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let booking = state
        .ledger
        .cancel_booking(id, Actor::Customer(user.id))
        .await?;
    Ok(success(booking, "Booking cancelled"))
}

pub async fn my_bookings(
    user: CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let bookings = state.ledger.user_bookings(&user.id).await?;
    Ok(success(bookings, "Bookings retrieved successfully"))
}

pub async fn bookings_for_date(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BookingsForDateQuery>,
) -> AppResult<Response> {
    let date = parse_date("date", &query.date)?;
    let bookings = state.ledger.bookings_for_date(date).await?;
    Ok(success(bookings, "Bookings retrieved successfully"))
}

pub async fn admin_cancel_booking(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let booking = state.ledger.cancel_booking(id, Actor::Admin).await?;
    Ok(success(booking, "Booking cancelled"))
}
