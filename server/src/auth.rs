//! Request identities.
//!
//! Customers are authenticated by the identity provider in front of this
//! service, which forwards the opaque user id in `x-user-id`. Admin routes
//! take a bearer token matching `ADMIN_API_TOKEN`.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::state::AppState;
use crate::utils::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

/// Who is acting on a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Customer(String),
    Admin,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::AuthError("Please sign in to continue".to_string()))?;

        Ok(CurrentUser { id: id.to_string() })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::AuthError("Admin access required".to_string()))?;

        match state.admin_api_token.as_deref() {
            Some(expected) if expected == provided.trim() => Ok(AdminUser),
            Some(_) => Err(AppError::Forbidden("Invalid admin token".to_string())),
            None => {
                tracing::warn!("Admin request rejected: ADMIN_API_TOKEN is not configured");
                Err(AppError::Forbidden("Admin access is disabled".to_string()))
            }
        }
    }
}
