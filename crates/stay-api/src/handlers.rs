//! # Request Handlers
//!
//! Axum request handlers for the booking API.
//!
//! The webhook handler's acknowledgement policy matters: an event is ACKed
//! (200) only when processing succeeded or when redelivery cannot help
//! (stale booking constraints). Retryable failures return 5xx so the
//! provider redelivers.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use stay_core::{BookingError, BookingRequest, GuestCounts, ReconcileOutcome};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Create checkout request body. The guest identity comes from the
/// `x-guest-id` header, not the body.
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Listing to book
    pub listing_id: String,
    /// Check-in date
    pub start_date: NaiveDate,
    /// Check-out date
    pub end_date: NaiveDate,
    /// Guest counts (optional)
    #[serde(default)]
    pub guests: GuestCounts,
}

/// Create checkout response
#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    /// Session ID
    pub session_id: String,
    /// Hosted checkout URL (redirect guest here)
    pub checkout_url: String,
    /// Session expiration time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Operator refund request body
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// Amount in minor currency units; omit for a full refund of the
    /// remaining balance
    #[serde(default)]
    pub amount: Option<i64>,
}

/// Operator refund response
#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub reservation_id: Uuid,
    pub refund_id: String,
    /// Amount refunded by this request, minor units
    pub amount: i64,
    /// Cumulative refunded amount, minor units
    pub refunded_amount: i64,
    pub refund_status: stay_core::RefundStatus,
    pub remaining_refundable: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

fn booking_error_to_response(err: BookingError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stayflow",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create a hosted checkout session for a stay
#[instrument(skip(state, headers, request), fields(listing_id = %request.listing_id))]
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, (StatusCode, Json<ErrorResponse>)> {
    let guest_id = headers
        .get("x-guest-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing x-guest-id header", 401)),
            )
        })?;

    let booking = BookingRequest {
        guest_id: guest_id.to_string(),
        listing_id: request.listing_id,
        start_date: request.start_date,
        end_date: request.end_date,
        guests: request.guests,
    };

    let session = state.checkout.create_checkout(&booking).await.map_err(|e| {
        error!("Failed to create checkout: {}", e);
        booking_error_to_response(e)
    })?;

    info!("Created checkout session: {}", session.session_id);

    Ok(Json(CreateCheckoutResponse {
        session_id: session.session_id,
        checkout_url: session.redirect_url,
        expires_at: session.expires_at.map(|t| t.to_rfc3339()),
    }))
}

/// Handle Stripe webhook
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing Stripe-Signature header", 400)),
            )
        })?;

    // Verify before any state change
    let event = state.gateway.verify_webhook(&body, signature).map_err(|e| {
        error!("Webhook verification failed: {}", e);
        booking_error_to_response(e)
    })?;

    match state.reconciler.process(event).await {
        Ok(ReconcileOutcome::Settled {
            reservation,
            newly_created,
        }) => {
            info!(
                reservation_id = %reservation.id,
                newly_created,
                "Settled checkout session {}",
                reservation.checkout_session_id
            );
            Ok(StatusCode::OK)
        }
        Ok(ReconcileOutcome::RefundSynced { updated }) => {
            info!("Synchronized refunds on {} reservation(s)", updated.len());
            Ok(StatusCode::OK)
        }
        Ok(ReconcileOutcome::Ignored { event_type }) => {
            info!("Ignoring webhook event: {}", event_type);
            Ok(StatusCode::OK)
        }
        // Redelivering the same event cannot repair a booking that no
        // longer satisfies the listing's constraints; ACK so the provider
        // stops retrying, and leave the failure in the logs for operators.
        Err(BookingError::StaleBookingConstraint(msg)) => {
            error!("Settlement rejected, acknowledging event: {}", msg);
            Ok(StatusCode::OK)
        }
        Err(e) if e.is_retryable() => {
            warn!("Webhook processing failed, requesting redelivery: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), 500)),
            ))
        }
        Err(e) => {
            error!("Webhook processing failed: {}", e);
            Err(booking_error_to_response(e))
        }
    }
}

/// Execute an operator refund against a reservation
#[instrument(skip(state, headers, request), fields(reservation_id = %reservation_id))]
pub async fn request_refund(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, (StatusCode, Json<ErrorResponse>)> {
    let token = headers
        .get("x-operator-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if token != state.config.operator_token {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid operator token", 401)),
        ));
    }

    let outcome = state
        .refunds
        .request_refund(reservation_id, request.amount)
        .await
        .map_err(|e| {
            error!("Refund failed: {}", e);
            booking_error_to_response(e)
        })?;

    info!(
        "Refunded {} on reservation {}: refund={}",
        outcome.refund.amount, reservation_id, outcome.refund.id
    );

    Ok(Json(RefundResponse {
        reservation_id,
        refund_id: outcome.refund.id.clone(),
        amount: outcome.refund.amount,
        refunded_amount: outcome.reservation.refunded_amount,
        refund_status: outcome.reservation.refund_status,
        remaining_refundable: outcome.reservation.remaining_refundable(),
    }))
}

/// Get a reservation by id
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let reservation = state
        .store
        .get(reservation_id)
        .await
        .map_err(booking_error_to_response)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    format!("Reservation not found: {}", reservation_id),
                    404,
                )),
            )
        })?;

    Ok(Json(reservation))
}

/// List reservations, newest first
pub async fn list_reservations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let reservations = state
        .store
        .list()
        .await
        .map_err(booking_error_to_response)?;

    Ok(Json(serde_json::json!({
        "count": reservations.len(),
        "reservations": reservations,
    })))
}

/// Checkout success page
pub async fn checkout_success(
    axum::extract::Query(params): axum::extract::Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let session_id = params
        .get("session_id")
        .map(|s| s.as_str())
        .unwrap_or("unknown");
    axum::response::Html(format!(
        r#"
<!DOCTYPE html>
<html>
<head><title>Booking Confirmed</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <div style="padding: 60px; text-align: center;">
        <h1>Booking Confirmed</h1>
        <p>Session: <code>{}</code></p>
        <p style="color: #666;">Your payment was processed. A confirmation is on its way.</p>
    </div>
</body>
</html>
"#,
        session_id
    ))
}

/// Checkout cancel page
pub async fn checkout_cancel() -> impl IntoResponse {
    axum::response::Html(
        r#"
<!DOCTYPE html>
<html>
<head><title>Booking Cancelled</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <div style="padding: 60px; text-align: center;">
        <h1>Booking Cancelled</h1>
        <p style="color: #666;">No charges were made. Your dates were not reserved.</p>
    </div>
</body>
</html>
"#,
    )
}
