//! Offer value types extracted from offer-change notifications.

use rust_decimal::Decimal;

/// A single competing offer for a listing.
///
/// The feed delivers offers pre-sorted by landed price, cheapest first;
/// the analyzer relies on that ordering for the market low.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub seller_id: String,
    pub listing_price: Decimal,
    pub shipping: Option<Decimal>,
    /// Operator-fulfilled offers qualify for the prime-low aggregate.
    pub prime: bool,
    pub buy_box_winner: bool,
    pub sub_condition: Option<String>,
}

impl Offer {
    /// Listing price plus shipping when present.
    #[must_use]
    pub fn landed_price(&self) -> Decimal {
        self.listing_price + self.shipping.unwrap_or_default()
    }
}

/// Aggregates from a summary-shaped payload, which carries no offer list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferSummary {
    pub total_offers: Option<u32>,
    pub lowest_price: Option<Decimal>,
    pub buy_box_price: Option<Decimal>,
}
