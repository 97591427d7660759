//! # StayFlow RS
//!
//! Booking and payment engine for short-term stays.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//! export OPERATOR_TOKEN=...
//!
//! # Run the server
//! stayflow
//! ```

use stay_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    print_banner();

    // Initialize application state
    let state = AppState::new()?;

    let addr = state.config.socket_addr();
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment provider: {}", state.gateway.provider_name());

    let app = routes::create_router(state);

    info!("🏡 StayFlow starting on http://{}", addr);

    if !is_prod {
        info!("💳 Checkout: POST http://{}/api/v1/checkout", addr);
        info!("🔔 Webhook: POST http://{}/webhook/stripe", addr);
        info!("📋 Reservations: GET http://{}/api/v1/reservations", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  🏡 StayFlow RS 🏡
  ━━━━━━━━━━━━━━━━━━
  Booking & payment engine
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
