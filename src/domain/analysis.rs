//! Competitive analysis result types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tiered classification of competitive exposure.
///
/// Ordered from best to worst standing; the analyzer evaluates its rules in
/// a fixed order and the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields extracted from one offer-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub severity: Severity,
    pub your_price: Option<Decimal>,
    pub market_low: Option<Decimal>,
    pub prime_low: Option<Decimal>,
    pub total_offers: Option<u32>,
    /// 1-based rank of your offer in the price-sorted list.
    pub your_position: Option<u32>,
    pub buy_box_winner: bool,
}

impl Analysis {
    /// Degraded analysis for notifications without a usable offer list.
    #[must_use]
    pub fn default_info() -> Self {
        Self {
            severity: Severity::Info,
            your_price: None,
            market_low: None,
            prime_low: None,
            total_offers: None,
            your_position: None,
            buy_box_winner: false,
        }
    }

    /// Percentage gap between your price and the market low.
    ///
    /// `None` when either price is absent or the market low is zero.
    #[must_use]
    pub fn gap_pct(&self) -> Option<Decimal> {
        let yours = self.your_price?;
        let low = self.market_low?;
        if low.is_zero() {
            return None;
        }
        Some((yours - low) / low * Decimal::from(100))
    }
}
