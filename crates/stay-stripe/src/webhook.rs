//! # Stripe Webhook Verification and Parsing
//!
//! Verifies the `Stripe-Signature` header over the raw request body, then
//! parses the event into the core `GatewayEvent` model. Verification always
//! happens before parsing: an unverifiable payload is rejected with no side
//! effects so Stripe's own retry can safely re-attempt.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use stay_core::{
    BookingError, BookingResult, ChargeRefunded, Currency, GatewayEvent, SessionCompleted,
};
use tracing::debug;

/// Signature timestamps older than this are rejected
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Event kinds this system reconciles; everything else is acknowledged
/// without processing
pub const HANDLED_WEBHOOK_EVENTS: &[&str] = &["checkout.session.completed", "charge.refunded"];

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    #[allow(dead_code)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Map<String, Value>,
}

/// Verify the signature over the raw payload and parse the event
pub fn verify_and_parse(
    webhook_secret: &str,
    payload: &[u8],
    signature: &str,
) -> BookingResult<GatewayEvent> {
    let sig_parts = parse_signature_header(signature)?;

    let now = Utc::now().timestamp();
    if (now - sig_parts.timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(BookingError::SignatureVerification(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let signed_payload = format!(
        "{}.{}",
        sig_parts.timestamp,
        String::from_utf8_lossy(payload)
    );
    let expected_sig = compute_hmac_sha256(webhook_secret, &signed_payload);

    let valid = sig_parts
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected_sig));
    if !valid {
        return Err(BookingError::SignatureVerification(
            "Signature mismatch".to_string(),
        ));
    }

    parse_event(payload)
}

/// Parse an already-verified event payload
pub fn parse_event(payload: &[u8]) -> BookingResult<GatewayEvent> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| BookingError::EventParse(format!("Malformed webhook event: {e}")))?;

    debug!(event_type = %event.event_type, "Verified Stripe webhook");

    let object = &event.data.object;
    match event.event_type.as_str() {
        "checkout.session.completed" => Ok(GatewayEvent::SessionCompleted(
            parse_session_completed(object)?,
        )),
        "charge.refunded" => Ok(GatewayEvent::ChargeRefunded(parse_charge_refunded(object)?)),
        other => Ok(GatewayEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}

fn parse_session_completed(
    object: &serde_json::Map<String, Value>,
) -> BookingResult<SessionCompleted> {
    let session_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| BookingError::EventParse("Missing session id".to_string()))?;

    let metadata: HashMap<String, String> = object
        .get("metadata")
        .and_then(|m| m.as_object())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(SessionCompleted {
        session_id,
        payment_intent_id: object
            .get("payment_intent")
            .and_then(|v| v.as_str())
            .map(String::from),
        payment_status: object
            .get("payment_status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        amount_total: object.get("amount_total").and_then(|v| v.as_i64()).unwrap_or(0),
        currency: object
            .get("currency")
            .and_then(|v| v.as_str())
            .and_then(Currency::parse)
            .unwrap_or_default(),
        customer_email: object
            .get("customer_details")
            .and_then(|cd| cd.get("email"))
            .and_then(|v| v.as_str())
            .map(String::from),
        metadata,
    })
}

fn parse_charge_refunded(
    object: &serde_json::Map<String, Value>,
) -> BookingResult<ChargeRefunded> {
    let charge_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| BookingError::EventParse("Missing charge id".to_string()))?;

    Ok(ChargeRefunded {
        charge_id,
        payment_intent_id: object
            .get("payment_intent")
            .and_then(|v| v.as_str())
            .map(String::from),
        amount_refunded: object
            .get("amount_refunded")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
    })
}

// =============================================================================
// Signature Verification
// =============================================================================

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> BookingResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let kv: Vec<&str> = part.split('=').collect();
        if kv.len() != 2 {
            continue;
        }
        match kv[0] {
            "t" => {
                timestamp = kv[1].parse().ok();
            }
            "v1" => {
                signatures.push(kv[1].to_string());
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        BookingError::SignatureVerification("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(BookingError::SignatureVerification(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
