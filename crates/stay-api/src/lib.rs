//! # stay-api
//!
//! HTTP API layer for stayflow-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for checkout, reservations, and operator refunds
//! - Webhook handler for payment events
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/checkout` | Create a hosted checkout session |
//! | GET | `/api/v1/reservations` | List reservations |
//! | GET | `/api/v1/reservations/:id` | Get a reservation |
//! | POST | `/api/v1/reservations/:id/refund` | Operator refund |
//! | POST | `/webhook/stripe` | Stripe webhook |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
