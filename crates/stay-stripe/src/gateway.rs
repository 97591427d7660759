//! # Stripe Payment Gateway
//!
//! Implementation of the `PaymentGateway` trait against Stripe's REST API.
//! Sessions use Stripe's hosted checkout page for secure payments, which is
//! the recommended approach for PCI compliance.

use crate::config::StripeConfig;
use crate::webhook;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use stay_core::{
    BookingError, BookingResult, CheckoutSessionRequest, Currency, GatewayCard, GatewayCharge,
    GatewayEvent, GatewayPaymentIntent, GatewayRefund, HostedSession, PaymentGateway,
};
use tracing::{debug, error, info, instrument};

/// Stripe-backed payment gateway
pub struct StripeGateway {
    config: StripeConfig,
    client: Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Create from environment variables
    pub fn from_env() -> BookingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form_params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> BookingResult<T> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .form(form_params);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BookingError::Network(e.to_string()))?;

        self.parse_response(path, response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> BookingResult<T> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .query(query)
            .send()
            .await
            .map_err(|e| BookingError::Network(e.to_string()))?;

        self.parse_response(path, response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> BookingResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BookingError::Network(e.to_string()))?;

        if !status.is_success() {
            error!("Stripe API error: path={}, status={}, body={}", path, status, body);

            if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(BookingError::Gateway {
                    provider: "stripe".to_string(),
                    message: error_response.error.message,
                });
            }

            return Err(BookingError::Gateway {
                provider: "stripe".to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            BookingError::Serialization(format!("Failed to parse Stripe response: {}", e))
        })
    }

    /// Flatten a session request into Stripe's form encoding
    fn build_session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form_params: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            form_params.push((
                format!("line_items[{}][price_data][currency]", i),
                request.currency.as_str().to_string(),
            ));
            form_params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount.to_string(),
            ));
            form_params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            form_params.push((
                format!("line_items[{}][quantity]", i),
                item.quantity.to_string(),
            ));
        }

        if let Some(ref email) = request.customer_email {
            form_params.push(("customer_email".to_string(), email.clone()));
        }

        for (key, value) in &request.metadata {
            form_params.push((format!("metadata[{}]", key), value.clone()));
        }

        form_params
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> BookingResult<HostedSession> {
        if request.line_items.is_empty() {
            return Err(BookingError::Validation(
                "Checkout session has no line items".to_string(),
            ));
        }

        let form_params = Self::build_session_form(request);

        // One session per booking attempt; the intent metadata doubles as
        // the idempotency key so retried submits reuse the same session
        let idempotency_key = request
            .metadata
            .get("guest_id")
            .zip(request.metadata.get("listing_id"))
            .zip(request.metadata.get("start_date"))
            .map(|((g, l), s)| format!("{}:{}:{}", g, l, s));

        debug!("Creating Stripe checkout session: {} items", request.line_items.len());

        let session: StripeCheckoutSessionResponse = self
            .post_form(
                "/v1/checkout/sessions",
                &form_params,
                idempotency_key.as_deref(),
            )
            .await?;

        info!(
            "Created Stripe checkout session: id={}, url={}",
            session.id, session.url
        );

        Ok(HostedSession {
            session_id: session.id,
            redirect_url: session.url,
            expires_at: session
                .expires_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> BookingResult<GatewayPaymentIntent> {
        let intent: StripePaymentIntentResponse = self
            .get_json(&format!("/v1/payment_intents/{}", intent_id), &[])
            .await?;

        Ok(GatewayPaymentIntent {
            id: intent.id,
            status: intent.status,
            amount: intent.amount,
            currency: Currency::parse(&intent.currency).unwrap_or_default(),
            latest_charge_id: intent.latest_charge,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_charge(&self, charge_id: &str) -> BookingResult<GatewayCharge> {
        // Expand the refund list so one read returns the canonical ledger
        let charge: StripeChargeResponse = self
            .get_json(
                &format!("/v1/charges/{}", charge_id),
                &[("expand[]", "refunds")],
            )
            .await?;

        let card = charge
            .payment_method_details
            .and_then(|d| d.card)
            .map(|c| GatewayCard {
                brand: c.brand,
                last4: c.last4,
                exp_month: c.exp_month,
                exp_year: c.exp_year,
            })
            .unwrap_or_default();

        let refunds = charge
            .refunds
            .map(|r| r.data)
            .unwrap_or_default()
            .into_iter()
            .map(StripeRefundResponse::into_gateway_refund)
            .collect();

        Ok(GatewayCharge {
            id: charge.id,
            payment_intent_id: charge.payment_intent,
            balance_transaction_id: charge.balance_transaction,
            amount: charge.amount,
            amount_refunded: charge.amount_refunded,
            currency: Currency::parse(&charge.currency).unwrap_or_default(),
            card,
            refunds,
        })
    }

    #[instrument(skip(self))]
    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: i64,
        reason: Option<&str>,
    ) -> BookingResult<GatewayRefund> {
        let mut form_params: Vec<(String, String)> = vec![
            (
                "payment_intent".to_string(),
                payment_intent_id.to_string(),
            ),
            ("amount".to_string(), amount.to_string()),
        ];
        if let Some(reason) = reason {
            form_params.push(("reason".to_string(), reason.to_string()));
        }

        let refund: StripeRefundResponse =
            self.post_form("/v1/refunds", &form_params, None).await?;

        info!(
            "Created Stripe refund: id={}, amount={}",
            refund.id, refund.amount
        );

        Ok(refund.into_gateway_refund())
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> BookingResult<GatewayEvent> {
        webhook::verify_and_parse(&self.config.webhook_secret, payload, signature)
    }

    fn provider_name(&self) -> &'static str {
        "stripe"
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    url: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntentResponse {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    latest_charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeChargeResponse {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    balance_transaction: Option<String>,
    amount: i64,
    #[serde(default)]
    amount_refunded: i64,
    currency: String,
    #[serde(default)]
    payment_method_details: Option<StripePaymentMethodDetails>,
    #[serde(default)]
    refunds: Option<StripeRefundList>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethodDetails {
    #[serde(default)]
    card: Option<StripeCardDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeCardDetails {
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    last4: Option<String>,
    #[serde(default)]
    exp_month: Option<u32>,
    #[serde(default)]
    exp_year: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StripeRefundList {
    #[serde(default)]
    data: Vec<StripeRefundResponse>,
}

#[derive(Debug, Deserialize)]
struct StripeRefundResponse {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    created: Option<i64>,
}

impl StripeRefundResponse {
    fn into_gateway_refund(self) -> GatewayRefund {
        GatewayRefund {
            id: self.id,
            amount: self.amount,
            currency: Currency::parse(&self.currency).unwrap_or_default(),
            status: self.status,
            reason: self.reason,
            created_at: self
                .created
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use stay_core::SessionLineItem;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gateway(server: &MockServer) -> StripeGateway {
        let config = StripeConfig::new("sk_test_abc", "whsec_test")
            .with_api_base_url(server.uri());
        StripeGateway::new(config)
    }

    fn session_request() -> CheckoutSessionRequest {
        let mut metadata = HashMap::new();
        metadata.insert("guest_id".to_string(), "guest_1".to_string());
        metadata.insert("listing_id".to_string(), "cabin-1".to_string());
        metadata.insert("start_date".to_string(), "2026-09-01".to_string());
        metadata.insert("end_date".to_string(), "2026-09-04".to_string());

        CheckoutSessionRequest {
            line_items: vec![
                SessionLineItem {
                    name: "Lakeside Cabin (per night)".to_string(),
                    unit_amount: 10000,
                    quantity: 3,
                },
                SessionLineItem {
                    name: "Cleaning fee".to_string(),
                    unit_amount: 5000,
                    quantity: 1,
                },
            ],
            currency: Currency::USD,
            metadata,
            success_url: "https://stay.test/success".to_string(),
            cancel_url: "https://stay.test/cancel".to_string(),
            customer_email: None,
        }
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("Authorization", "Bearer sk_test_abc"))
            .and(body_string_contains("mode=payment"))
            .and(body_string_contains("unit_amount%5D=10000"))
            .and(body_string_contains("metadata%5Blisting_id%5D=cabin-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1",
                "expires_at": 1790000000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = test_gateway(&server);
        let session = gateway
            .create_checkout_session(&session_request())
            .await
            .unwrap();

        assert_eq!(session.session_id, "cs_test_1");
        assert!(session.redirect_url.contains("cs_test_1"));
        assert!(session.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_items() {
        let server = MockServer::start().await;
        let gateway = test_gateway(&server);

        let mut request = session_request();
        request.line_items.clear();

        let err = gateway.create_checkout_session(&request).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_api_error_surfaces_stripe_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": { "message": "Your card was declined.", "type": "card_error" }
            })))
            .mount(&server)
            .await;

        let gateway = test_gateway(&server);
        let err = gateway
            .create_checkout_session(&session_request())
            .await
            .unwrap_err();

        match err {
            BookingError::Gateway { provider, message } => {
                assert_eq!(provider, "stripe");
                assert_eq!(message, "Your card was declined.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retrieve_payment_intent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_123",
                "status": "succeeded",
                "amount": 39400,
                "currency": "usd",
                "latest_charge": "ch_123"
            })))
            .mount(&server)
            .await;

        let gateway = test_gateway(&server);
        let intent = gateway.retrieve_payment_intent("pi_123").await.unwrap();

        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.amount, 39400);
        assert_eq!(intent.currency, Currency::USD);
        assert_eq!(intent.latest_charge_id.as_deref(), Some("ch_123"));
    }

    #[tokio::test]
    async fn test_retrieve_charge_with_refunds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/charges/ch_123"))
            .and(query_param("expand[]", "refunds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ch_123",
                "payment_intent": "pi_123",
                "balance_transaction": "txn_123",
                "amount": 39400,
                "amount_refunded": 10000,
                "currency": "usd",
                "payment_method_details": {
                    "card": { "brand": "visa", "last4": "4242", "exp_month": 4, "exp_year": 2030 }
                },
                "refunds": {
                    "data": [{
                        "id": "re_1",
                        "amount": 10000,
                        "currency": "usd",
                        "status": "succeeded",
                        "reason": "requested_by_customer",
                        "created": 1790000000
                    }]
                }
            })))
            .mount(&server)
            .await;

        let gateway = test_gateway(&server);
        let charge = gateway.retrieve_charge("ch_123").await.unwrap();

        assert_eq!(charge.amount_refunded, 10000);
        assert_eq!(charge.card.last4.as_deref(), Some("4242"));
        assert_eq!(charge.refunds.len(), 1);
        assert_eq!(charge.refunds[0].id, "re_1");
        assert_eq!(charge.balance_transaction_id.as_deref(), Some("txn_123"));
    }

    #[tokio::test]
    async fn test_create_refund() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/refunds"))
            .and(body_string_contains("payment_intent=pi_123"))
            .and(body_string_contains("amount=10000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "re_1",
                "amount": 10000,
                "currency": "usd",
                "status": "succeeded",
                "created": 1790000000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = test_gateway(&server);
        let refund = gateway
            .create_refund("pi_123", 10000, Some("requested_by_customer"))
            .await
            .unwrap();

        assert_eq!(refund.id, "re_1");
        assert_eq!(refund.amount, 10000);
        assert_eq!(refund.status, "succeeded");
    }
}
