//! # Pricing Engine
//!
//! Pure stay-pricing computation: turns dates, a nightly rate, fees, and a
//! tax schedule into an exact monetary breakdown. No side effects, no I/O.
//!
//! All arithmetic is in whole currency units; each stay-cost component is
//! rounded independently before summing.

use crate::error::{BookingError, BookingResult};
use crate::money::{percent_of, round_whole};
use serde::{Deserialize, Serialize};

/// Which stay-cost component a tax line's rate is applied to.
///
/// Closed variant with an explicit base selector per variant; tax bases are
/// never chosen by string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBase {
    /// Nightly-rate subtotal only
    Nightly,
    /// Cleaning fee only
    Cleaning,
    /// Service fee only
    Service,
    /// Full stay subtotal
    All,
}

impl TaxBase {
    /// Select this variant's tax base from the component subtotals
    pub fn base_of(&self, components: &ComponentSubtotals) -> i64 {
        match self {
            TaxBase::Nightly => components.nightly,
            TaxBase::Cleaning => components.cleaning,
            TaxBase::Service => components.service,
            TaxBase::All => components.subtotal(),
        }
    }
}

/// One line of a reusable tax schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLine {
    /// Display label (e.g. "City Lodging Tax")
    pub label: String,

    /// Rate in percent
    pub rate: f64,

    /// Component the rate is applied to
    pub applies_to: TaxBase,

    /// Inactive lines never participate in a calculation
    #[serde(default = "default_true")]
    pub active: bool,

    /// Display/aggregation order; each line's base is independent of order
    #[serde(default)]
    pub order: u32,
}

fn default_true() -> bool {
    true
}

/// A reusable, location-scoped tax configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxProfile {
    /// Unique profile identifier
    pub id: String,

    /// Jurisdiction descriptors (for the admin screens; not used in math)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Flat VAT rate in percent, applied to the full subtotal when non-zero
    #[serde(default)]
    pub vat_rate: f64,

    /// Flat GST rate in percent, applied to the full subtotal when non-zero
    #[serde(default)]
    pub gst_rate: f64,

    /// Ordered tax lines
    #[serde(default)]
    pub lines: Vec<TaxLine>,
}

impl TaxProfile {
    /// Lines that participate in a calculation: active with rate > 0,
    /// in schedule order
    pub fn participating_lines(&self) -> Vec<&TaxLine> {
        let mut lines: Vec<&TaxLine> = self
            .lines
            .iter()
            .filter(|l| l.active && l.rate > 0.0)
            .collect();
        lines.sort_by_key(|l| l.order);
        lines
    }

    /// Whether any line would participate in a calculation
    pub fn has_participating_lines(&self) -> bool {
        self.lines.iter().any(|l| l.active && l.rate > 0.0)
    }
}

/// Independently rounded stay-cost components
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentSubtotals {
    pub nightly: i64,
    pub cleaning: i64,
    pub service: i64,
}

impl ComponentSubtotals {
    pub fn subtotal(&self) -> i64 {
        self.nightly + self.cleaning + self.service
    }
}

/// Input to a stay quote
#[derive(Debug, Clone, Default)]
pub struct StayPricing {
    /// Number of nights; 0 collapses the nightly component but fees still apply
    pub nights: u32,

    /// Per-night rate in whole currency units (may be fractional pre-rounding)
    pub nightly_rate: f64,

    /// Cleaning fee in whole currency units
    pub cleaning_fee: f64,

    /// Service fee in whole currency units
    pub service_fee: f64,

    /// Free-form listing location, used for jurisdiction fallback
    pub location: Option<String>,

    /// Flat fallback tax percentage when no profile line applies
    pub fallback_tax_rate: f64,
}

/// One computed tax line: its own base, rate, and rounded amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLine {
    pub label: String,
    pub base: i64,
    pub rate: f64,
    pub amount: i64,
}

/// A deterministic monetary breakdown of a stay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub nights: u32,
    pub nightly_subtotal: i64,
    pub cleaning_subtotal: i64,
    pub service_subtotal: i64,
    pub subtotal: i64,
    /// Base used by full-subtotal tax lines
    pub taxable_base: i64,
    pub tax_lines: Vec<PriceLine>,
    pub tax_total: i64,
    pub vat_amount: i64,
    pub gst_amount: i64,
    pub total: i64,
}

impl PriceBreakdown {
    /// Aggregate tax expressed as a percentage of the subtotal, for display
    /// and for the stored reservation's effective rate
    pub fn effective_tax_rate(&self) -> f64 {
        if self.subtotal == 0 {
            0.0
        } else {
            (self.tax_total as f64 / self.subtotal as f64 * 10_000.0).round() / 100.0
        }
    }
}

/// A hard-coded jurisdiction tax schedule used when no profile applies
struct JurisdictionSchedule {
    /// Case-insensitive substrings matched against the listing location
    keywords: &'static [&'static str],
    /// (label, percent) lines, each applied to the full subtotal
    lines: &'static [(&'static str, f64)],
}

const JURISDICTIONS: &[JurisdictionSchedule] = &[JurisdictionSchedule {
    keywords: &["tennessee", "nashville", ", tn"],
    lines: &[("Sales Tax", 9.75), ("Lodging Tax", 3.0)],
}];

const DOMESTIC_KEYWORDS: &[&str] = &["united states", "usa", ", us"];

fn match_jurisdiction(location: &str) -> Option<&'static JurisdictionSchedule> {
    let loc = location.to_lowercase();
    JURISDICTIONS
        .iter()
        .find(|j| j.keywords.iter().any(|k| loc.contains(k)))
}

fn is_domestic(location: &str) -> bool {
    let loc = location.to_lowercase();
    DOMESTIC_KEYWORDS.iter().any(|k| loc.contains(k))
        || match_jurisdiction(location).is_some()
}

/// Compute the monetary breakdown for a stay.
///
/// Tax-line precedence:
/// 1. participating `TaxProfile` lines, each against its `applies_to` base
/// 2. hard-coded jurisdiction schedule against the full subtotal
/// 3. domestic flat fallback as a single "Sales Tax" line (only if > 0)
/// 4. flat fallback as a single generic "Taxes" line
///
/// Non-zero profile VAT/GST rates append one full-subtotal line each, after
/// the lines above.
pub fn quote_stay(
    pricing: &StayPricing,
    profile: Option<&TaxProfile>,
) -> BookingResult<PriceBreakdown> {
    if pricing.nightly_rate < 0.0 || pricing.cleaning_fee < 0.0 || pricing.service_fee < 0.0 {
        return Err(BookingError::Validation(
            "Rates and fees must be non-negative".to_string(),
        ));
    }
    if pricing.fallback_tax_rate < 0.0 {
        return Err(BookingError::Validation(
            "Fallback tax rate must be non-negative".to_string(),
        ));
    }

    let components = ComponentSubtotals {
        nightly: round_whole(pricing.nightly_rate * pricing.nights as f64),
        cleaning: round_whole(pricing.cleaning_fee),
        service: round_whole(pricing.service_fee),
    };
    let subtotal = components.subtotal();

    let mut tax_lines: Vec<PriceLine> = Vec::new();

    match profile.filter(|p| p.has_participating_lines()) {
        Some(profile) => {
            for line in profile.participating_lines() {
                let base = line.applies_to.base_of(&components);
                tax_lines.push(PriceLine {
                    label: line.label.clone(),
                    base,
                    rate: line.rate,
                    amount: percent_of(base, line.rate),
                });
            }
        }
        None => {
            let location = pricing.location.as_deref().unwrap_or("");
            if let Some(schedule) = match_jurisdiction(location) {
                for (label, rate) in schedule.lines {
                    tax_lines.push(PriceLine {
                        label: (*label).to_string(),
                        base: subtotal,
                        rate: *rate,
                        amount: percent_of(subtotal, *rate),
                    });
                }
            } else if is_domestic(location) && pricing.fallback_tax_rate > 0.0 {
                tax_lines.push(PriceLine {
                    label: "Sales Tax".to_string(),
                    base: subtotal,
                    rate: pricing.fallback_tax_rate,
                    amount: percent_of(subtotal, pricing.fallback_tax_rate),
                });
            } else {
                tax_lines.push(PriceLine {
                    label: "Taxes".to_string(),
                    base: subtotal,
                    rate: pricing.fallback_tax_rate,
                    amount: percent_of(subtotal, pricing.fallback_tax_rate),
                });
            }
        }
    }

    let mut vat_amount = 0;
    let mut gst_amount = 0;
    if let Some(profile) = profile {
        if profile.vat_rate > 0.0 {
            vat_amount = percent_of(subtotal, profile.vat_rate);
            tax_lines.push(PriceLine {
                label: "VAT".to_string(),
                base: subtotal,
                rate: profile.vat_rate,
                amount: vat_amount,
            });
        }
        if profile.gst_rate > 0.0 {
            gst_amount = percent_of(subtotal, profile.gst_rate);
            tax_lines.push(PriceLine {
                label: "GST".to_string(),
                base: subtotal,
                rate: profile.gst_rate,
                amount: gst_amount,
            });
        }
    }

    let tax_total = tax_lines.iter().map(|l| l.amount).sum();

    Ok(PriceBreakdown {
        nights: pricing.nights,
        nightly_subtotal: components.nightly,
        cleaning_subtotal: components.cleaning,
        service_subtotal: components.service,
        subtotal,
        taxable_base: subtotal,
        tax_lines,
        tax_total,
        vat_amount,
        gst_amount,
        total: subtotal + tax_total,
    })
}
