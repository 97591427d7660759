//! # Checkout Orchestration
//!
//! Validates a booking request, prices the stay, and asks the payment
//! gateway for a hosted checkout session. The full booking intent rides on
//! the session as metadata; no reservation row is written here. The
//! reservation is created later, by webhook reconciliation, once payment
//! settles.

use crate::error::{BookingError, BookingResult};
use crate::gateway::{CheckoutSessionRequest, HostedSession, SessionLineItem, SharedGateway};
use crate::listing::{ListingSnapshot, SharedListings, SharedTaxProfiles};
use crate::money::Currency;
use crate::pricing::{quote_stay, PriceBreakdown, StayPricing, TaxProfile};
use crate::reservation::GuestCounts;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Booking request from an authenticated guest
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    /// Guest identity, supplied by the upstream auth collaborator
    pub guest_id: String,
    pub listing_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub guests: GuestCounts,
}

/// The booking intent carried as checkout-session metadata.
///
/// Until payment completes this metadata is the only durable record of the
/// guest's intent; reconciliation reconstructs the stay from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingIntent {
    pub guest_id: String,
    pub listing_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub guests: GuestCounts,
}

const META_GUEST_ID: &str = "guest_id";
const META_LISTING_ID: &str = "listing_id";
const META_START_DATE: &str = "start_date";
const META_END_DATE: &str = "end_date";
const META_ADULTS: &str = "adults";
const META_CHILDREN: &str = "children";
const META_INFANTS: &str = "infants";

impl BookingIntent {
    /// Encode as flat string metadata for the gateway session
    pub fn to_metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            (META_GUEST_ID.to_string(), self.guest_id.clone()),
            (META_LISTING_ID.to_string(), self.listing_id.clone()),
            (META_START_DATE.to_string(), self.start_date.to_string()),
            (META_END_DATE.to_string(), self.end_date.to_string()),
            (META_ADULTS.to_string(), self.guests.adults.to_string()),
            (META_CHILDREN.to_string(), self.guests.children.to_string()),
            (META_INFANTS.to_string(), self.guests.infants.to_string()),
        ])
    }

    /// Reconstruct the intent from session metadata
    pub fn from_metadata(metadata: &HashMap<String, String>) -> BookingResult<Self> {
        let required = |key: &str| {
            metadata.get(key).cloned().ok_or_else(|| {
                BookingError::EventParse(format!("Session metadata missing '{key}'"))
            })
        };
        let date = |key: &str| -> BookingResult<NaiveDate> {
            required(key)?.parse().map_err(|_| {
                BookingError::EventParse(format!("Session metadata '{key}' is not a date"))
            })
        };
        let count = |key: &str| -> u32 {
            metadata
                .get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };

        Ok(Self {
            guest_id: required(META_GUEST_ID)?,
            listing_id: required(META_LISTING_ID)?,
            start_date: date(META_START_DATE)?,
            end_date: date(META_END_DATE)?,
            guests: GuestCounts {
                adults: count(META_ADULTS),
                children: count(META_CHILDREN),
                infants: count(META_INFANTS),
            },
        })
    }
}

/// Number of nights as the calendar-day difference between dates
pub fn nights_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Redirect URLs for the hosted payment page
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub base_url: String,
    pub success_path: String,
    pub cancel_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            success_path: "/checkout/success".to_string(),
            cancel_path: "/checkout/cancel".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url, self.success_path)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}

/// Validates booking requests and creates hosted checkout sessions
pub struct CheckoutOrchestrator {
    gateway: SharedGateway,
    listings: SharedListings,
    tax_profiles: SharedTaxProfiles,
    urls: CheckoutUrls,
    currency: Currency,
}

impl CheckoutOrchestrator {
    pub fn new(
        gateway: SharedGateway,
        listings: SharedListings,
        tax_profiles: SharedTaxProfiles,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            gateway,
            listings,
            tax_profiles,
            urls,
            currency: Currency::USD,
        }
    }

    /// Validate the request, price the stay, and create the hosted session.
    ///
    /// Side effect: none locally. The returned redirect URL is the guest's
    /// next stop; everything else waits for the provider's webhook.
    #[instrument(skip(self, request), fields(listing_id = %request.listing_id))]
    pub async fn create_checkout(&self, request: &BookingRequest) -> BookingResult<HostedSession> {
        if request.guest_id.trim().is_empty() {
            return Err(BookingError::Authorization(
                "Booking requires an authenticated guest".to_string(),
            ));
        }

        let listing = self
            .listings
            .find(&request.listing_id)
            .await?
            .ok_or_else(|| BookingError::NotFound {
                entity: "listing",
                id: request.listing_id.clone(),
            })?;

        let nights = nights_between(request.start_date, request.end_date);
        if nights <= 0 {
            return Err(BookingError::Validation(
                "End date must be after start date".to_string(),
            ));
        }
        let nights = nights as u32;
        if nights < listing.min_nights {
            return Err(BookingError::Validation(format!(
                "Stay of {} nights is below the listing minimum of {}",
                nights, listing.min_nights
            )));
        }

        let profile = self.tax_profile_for(&listing).await?;
        let breakdown = quote_stay(&listing_pricing(&listing, nights), profile.as_ref())?;

        let intent = BookingIntent {
            guest_id: request.guest_id.clone(),
            listing_id: request.listing_id.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            guests: request.guests,
        };

        let session_request = CheckoutSessionRequest {
            line_items: build_line_items(&listing, &breakdown, self.currency),
            currency: self.currency,
            metadata: intent.to_metadata(),
            success_url: self.urls.success_url(),
            cancel_url: self.urls.cancel_url(),
            customer_email: None,
        };

        let session = self.gateway.create_checkout_session(&session_request).await?;

        info!(
            session_id = %session.session_id,
            total = breakdown.total,
            nights,
            "Created checkout session"
        );

        Ok(session)
    }

    async fn tax_profile_for(&self, listing: &ListingSnapshot) -> BookingResult<Option<TaxProfile>> {
        match &listing.tax_profile_id {
            Some(id) => self.tax_profiles.find(id).await,
            None => Ok(None),
        }
    }
}

pub(crate) fn listing_pricing(listing: &ListingSnapshot, nights: u32) -> StayPricing {
    StayPricing {
        nights,
        nightly_rate: listing.nightly_rate,
        cleaning_fee: listing.cleaning_fee,
        service_fee: listing.service_fee,
        location: listing.location.clone(),
        fallback_tax_rate: listing.fallback_tax_rate,
    }
}

/// Build the hosted-checkout line items from the priced breakdown.
///
/// The charged amount always equals the displayed breakdown: the nightly
/// line splits the rounded nightly subtotal per night when it divides
/// evenly and falls back to a single-quantity line otherwise.
fn build_line_items(
    listing: &ListingSnapshot,
    breakdown: &PriceBreakdown,
    currency: Currency,
) -> Vec<SessionLineItem> {
    let mut items = Vec::new();

    let nightly_minor = currency.to_minor_units(breakdown.nightly_subtotal);
    if breakdown.nights > 0 && nightly_minor % breakdown.nights as i64 == 0 {
        items.push(SessionLineItem {
            name: format!("{} ({} nights)", listing.name, breakdown.nights),
            unit_amount: nightly_minor / breakdown.nights as i64,
            quantity: breakdown.nights,
        });
    } else if nightly_minor > 0 {
        items.push(SessionLineItem {
            name: format!("{} ({} nights)", listing.name, breakdown.nights),
            unit_amount: nightly_minor,
            quantity: 1,
        });
    }

    if breakdown.cleaning_subtotal > 0 {
        items.push(SessionLineItem {
            name: "Cleaning fee".to_string(),
            unit_amount: currency.to_minor_units(breakdown.cleaning_subtotal),
            quantity: 1,
        });
    }
    if breakdown.service_subtotal > 0 {
        items.push(SessionLineItem {
            name: "Service fee".to_string(),
            unit_amount: currency.to_minor_units(breakdown.service_subtotal),
            quantity: 1,
        });
    }
    if breakdown.tax_total > 0 {
        items.push(SessionLineItem {
            name: "Taxes".to_string(),
            unit_amount: currency.to_minor_units(breakdown.tax_total),
            quantity: 1,
        });
    }

    items
}
