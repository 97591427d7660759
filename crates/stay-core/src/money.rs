//! # Money Types
//!
//! Currency handling for the booking core.
//!
//! The pricing engine computes in whole currency units (integer dollars);
//! amounts cross into minor units (cents) exactly once, at the payment
//! gateway boundary. Stored captured/refunded amounts are minor units as
//! reported by the provider.

use serde::{Deserialize, Serialize};

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, most others have 2)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a whole-unit amount to the smallest currency unit (cents, etc.)
    pub fn to_minor_units(&self, whole: i64) -> i64 {
        whole * 10_i64.pow(self.decimal_places() as u32)
    }

    /// Parse a lowercase ISO code as reported by the payment provider
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "usd" => Some(Currency::USD),
            "eur" => Some(Currency::EUR),
            "gbp" => Some(Currency::GBP),
            "jpy" => Some(Currency::JPY),
            "cad" => Some(Currency::CAD),
            "aud" => Some(Currency::AUD),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Round a fractional whole-unit amount to the nearest whole currency unit.
///
/// The pricing engine rounds each stay-cost component independently before
/// summing, so component totals always reconcile against the grand total.
pub fn round_whole(amount: f64) -> i64 {
    amount.round() as i64
}

/// A tax-line amount: `round(base × rate / 100)` in whole units
pub fn percent_of(base: i64, rate: f64) -> i64 {
    round_whole(base as f64 * rate / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(Currency::USD.to_minor_units(394), 39400);
        assert_eq!(Currency::JPY.to_minor_units(1000), 1000);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("usd"), Some(Currency::USD));
        assert_eq!(Currency::parse("EUR"), Some(Currency::EUR));
        assert_eq!(Currency::parse("xyz"), None);
    }

    #[test]
    fn test_percent_rounding() {
        // 370 × 8% = 29.6 → 30; 500 × 9.75% = 48.75 → 49
        assert_eq!(percent_of(370, 8.0), 30);
        assert_eq!(percent_of(500, 9.75), 49);
        assert_eq!(percent_of(500, 3.0), 15);
        assert_eq!(percent_of(300, 8.0), 24);
    }
}
