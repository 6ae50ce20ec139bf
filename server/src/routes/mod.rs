use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{bookings, health_check, slots, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/slots",
            get(slots::list_slots)
                .post(slots::upsert_slot)
                .delete(slots::delete_all_slots),
        )
        .route("/api/slots/bulk", post(slots::generate_slots))
        .route(
            "/api/slots/:id",
            put(slots::update_slot).delete(slots::delete_slot),
        )
        .route("/api/slots/:id/enabled", patch(slots::set_slot_enabled))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/me", get(bookings::my_bookings))
        .route("/api/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_own_booking))
        .route("/api/admin/bookings", get(bookings::bookings_for_date))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(bookings::admin_cancel_booking),
        )
        .route("/api/tickets", post(tickets::issue_ticket))
        .route("/api/tickets/me", get(tickets::my_tickets))
        .route("/api/tickets/verify", post(tickets::verify_ticket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
}
