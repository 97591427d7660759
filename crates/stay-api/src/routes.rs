//! # Routes
//!
//! Axum router configuration for the booking API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - API:
///   - POST /api/v1/checkout - Create a hosted checkout session
///   - GET  /api/v1/reservations - List reservations
///   - GET  /api/v1/reservations/{id} - Get a reservation
///   - POST /api/v1/reservations/{id}/refund - Operator refund
///
/// - Webhooks:
///   - POST /webhook/stripe - Stripe webhook handler
///
/// - Static pages:
///   - GET /checkout/success - Success page
///   - GET /checkout/cancel - Cancel page
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Static success/cancel pages
    let checkout_routes = Router::new()
        .route("/success", get(handlers::checkout_success))
        .route("/cancel", get(handlers::checkout_cancel));

    let api_routes = Router::new()
        .route("/checkout", post(handlers::create_checkout))
        .route("/reservations", get(handlers::list_reservations))
        .route("/reservations/{reservation_id}", get(handlers::get_reservation))
        .route(
            "/reservations/{reservation_id}/refund",
            post(handlers::request_refund),
        );

    // Webhook routes (no CORS, must accept raw body)
    let webhook_routes = Router::new().route("/stripe", post(handlers::stripe_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/checkout", checkout_routes)
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
