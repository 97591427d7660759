//! # Application State
//!
//! Shared state for the Axum application: the payment gateway, reservation
//! store, catalogs, and the three booking components wired on top of them.

use stay_core::{
    CheckoutOrchestrator, CheckoutUrls, ListingCatalog, MemoryReservationStore, RefundCoordinator,
    SharedGateway, SharedListings, SharedStore, SharedTaxProfiles, TaxProfileCatalog,
    WebhookReconciler,
};
use stay_stripe::StripeGateway;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for checkout redirect callbacks
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Shared secret for the operator refund endpoint
    pub operator_token: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            operator_token: std::env::var("OPERATOR_TOKEN")
                .unwrap_or_else(|_| "dev-operator-token".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid socket address")
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Builds checkout sessions
    pub checkout: Arc<CheckoutOrchestrator>,
    /// Settles webhook events into the store
    pub reconciler: Arc<WebhookReconciler>,
    /// Executes operator refunds
    pub refunds: Arc<RefundCoordinator>,
    /// Payment gateway (also verifies webhook signatures)
    pub gateway: SharedGateway,
    /// Reservation reads
    pub store: SharedStore,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create the production state: Stripe gateway from the environment,
    /// catalogs from config files, in-memory reservation store.
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let gateway = StripeGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;
        let gateway: SharedGateway = Arc::new(gateway);

        let listings: SharedListings = Arc::new(load_listing_catalog()?);
        let tax_profiles: SharedTaxProfiles = Arc::new(load_tax_profile_catalog()?);
        let store: SharedStore = Arc::new(MemoryReservationStore::new());

        Ok(Self::assemble(
            gateway,
            store,
            listings,
            tax_profiles,
            config,
        ))
    }

    /// Wire the booking components on top of explicit parts. Tests use this
    /// with stub gateways and pre-seeded stores.
    pub fn assemble(
        gateway: SharedGateway,
        store: SharedStore,
        listings: SharedListings,
        tax_profiles: SharedTaxProfiles,
        config: AppConfig,
    ) -> Self {
        let urls = CheckoutUrls::new(&config.base_url);

        let checkout = Arc::new(CheckoutOrchestrator::new(
            gateway.clone(),
            listings.clone(),
            tax_profiles.clone(),
            urls,
        ));
        let reconciler = Arc::new(WebhookReconciler::new(
            gateway.clone(),
            store.clone(),
            listings,
            tax_profiles,
        ));
        let refunds = Arc::new(RefundCoordinator::new(gateway.clone(), store.clone()));

        Self {
            checkout,
            reconciler,
            refunds,
            gateway,
            store,
            config,
        }
    }
}

/// Load the listing catalog from a config file
fn load_listing_catalog() -> anyhow::Result<ListingCatalog> {
    let config_paths = [
        "config/listings.toml",
        "../config/listings.toml",
        "../../config/listings.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ListingCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} listings from {}", catalog.listings.len(), path);
            return Ok(catalog);
        }
    }

    tracing::warn!("No listing catalog found, using empty catalog");
    Ok(ListingCatalog::new())
}

/// Load tax profiles from a config file
fn load_tax_profile_catalog() -> anyhow::Result<TaxProfileCatalog> {
    let config_paths = [
        "config/tax_profiles.toml",
        "../config/tax_profiles.toml",
        "../../config/tax_profiles.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = TaxProfileCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} tax profiles from {}", catalog.profiles.len(), path);
            return Ok(catalog);
        }
    }

    tracing::warn!("No tax profile catalog found, using empty catalog");
    Ok(TaxProfileCatalog::new())
}
