//! # Listing and Tax-Profile Lookups
//!
//! Narrow interfaces to external collaborators: the listing editor and
//! tax-profile admin screens live elsewhere; the booking core only needs
//! id → snapshot lookups. In-memory, TOML-loadable implementations ship
//! here for composition and tests.

use crate::error::BookingResult;
use crate::pricing::TaxProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Price/fee/tax-profile snapshot of a listing, as of lookup time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSnapshot {
    /// Unique listing identifier
    pub id: String,

    /// Display name (used on the hosted checkout page)
    pub name: String,

    /// Free-form location, used for jurisdiction tax fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Per-night rate in whole currency units
    pub nightly_rate: f64,

    /// Cleaning fee in whole currency units
    #[serde(default)]
    pub cleaning_fee: f64,

    /// Service fee in whole currency units
    #[serde(default)]
    pub service_fee: f64,

    /// Flat fallback tax percentage when no profile line applies
    #[serde(default)]
    pub fallback_tax_rate: f64,

    /// Minimum-night requirement for a stay
    #[serde(default = "default_min_nights")]
    pub min_nights: u32,

    /// Tax profile reference, when one is assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_profile_id: Option<String>,
}

fn default_min_nights() -> u32 {
    1
}

/// Listing lookup consumed from the listings collaborator
#[async_trait::async_trait]
pub trait ListingDirectory: Send + Sync {
    async fn find(&self, listing_id: &str) -> BookingResult<Option<ListingSnapshot>>;
}

/// Tax-profile lookup consumed from the tax-profile collaborator
#[async_trait::async_trait]
pub trait TaxProfileDirectory: Send + Sync {
    async fn find(&self, profile_id: &str) -> BookingResult<Option<TaxProfile>>;
}

pub type SharedListings = Arc<dyn ListingDirectory>;
pub type SharedTaxProfiles = Arc<dyn TaxProfileDirectory>;

/// In-memory listing catalog (loaded from `config/listings.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingCatalog {
    #[serde(default)]
    pub listings: Vec<ListingSnapshot>,
}

impl ListingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listing: ListingSnapshot) {
        self.listings.push(listing);
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[async_trait::async_trait]
impl ListingDirectory for ListingCatalog {
    async fn find(&self, listing_id: &str) -> BookingResult<Option<ListingSnapshot>> {
        Ok(self.listings.iter().find(|l| l.id == listing_id).cloned())
    }
}

/// In-memory tax-profile catalog (loaded from `config/tax_profiles.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxProfileCatalog {
    #[serde(default)]
    pub profiles: Vec<TaxProfile>,
}

impl TaxProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, profile: TaxProfile) {
        self.profiles.push(profile);
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[async_trait::async_trait]
impl TaxProfileDirectory for TaxProfileCatalog {
    async fn find(&self, profile_id: &str) -> BookingResult<Option<TaxProfile>> {
        Ok(self.profiles.iter().find(|p| p.id == profile_id).cloned())
    }
}

/// Map-backed profile directory for tests and embedded setups
#[async_trait::async_trait]
impl TaxProfileDirectory for HashMap<String, TaxProfile> {
    async fn find(&self, profile_id: &str) -> BookingResult<Option<TaxProfile>> {
        Ok(self.get(profile_id).cloned())
    }
}
