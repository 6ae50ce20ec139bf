use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::models::slot::{
    parse_date, GenerateSlotsRequest, ListSlotsQuery, SetSlotEnabledRequest, UpdateSlotRequest,
    UpsertSlotRequest,
};
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::{ApiJson, ApiPath, ApiQuery, AppResult};

#[derive(Serialize)]
struct DeletedCount {
    deleted: u64,
}

pub async fn list_slots(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListSlotsQuery>,
) -> AppResult<Response> {
    let date = query
        .date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| parse_date("date", d))
        .transpose()?;

    let listing = state.catalog.list(date).await?;
    Ok(success(listing.as_slice(), "Slots retrieved successfully"))
}

pub async fn upsert_slot(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpsertSlotRequest>,
) -> AppResult<Response> {
    let slot = state.catalog.upsert(request.validate()?).await?;
    Ok(success(slot, "Slot saved successfully"))
}

pub async fn update_slot(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateSlotRequest>,
) -> AppResult<Response> {
    let slot = state.catalog.update(id, request.validate()?).await?;
    Ok(success(slot, "Slot updated successfully"))
}

pub async fn set_slot_enabled(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<SetSlotEnabledRequest>,
) -> AppResult<Response> {
    let slot = state.catalog.set_enabled(id, request.is_enabled).await?;
    let message = if slot.is_enabled {
        "Slot enabled"
    } else {
        "Slot disabled"
    };
    Ok(success(slot, message))
}

pub async fn delete_slot(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Response> {
    let slot = state.catalog.delete(id).await?;
    Ok(success(slot, "Slot deleted successfully"))
}

pub async fn delete_all_slots(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let deleted = state.catalog.delete_all().await?;
    Ok(success(
        DeletedCount { deleted },
        format!("{deleted} slots deleted"),
    ))
}

pub async fn generate_slots(
    _admin: AdminUser,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GenerateSlotsRequest>,
) -> AppResult<Response> {
    let report = state.catalog.generate(request).await?;
    let message = format!(
        "{} slots created, {} already existed",
        report.created, report.existing
    );
    Ok(created(report, message))
}
