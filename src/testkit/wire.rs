//! Builders for raw notification bodies as they arrive off the queue.

use rust_decimal::Decimal;
use serde_json::json;

/// One offer in a scripted trigger payload.
#[derive(Debug, Clone)]
pub struct TestOffer {
    pub seller_id: String,
    pub price: Decimal,
    pub prime: bool,
    pub buy_box_winner: bool,
}

/// A plain offer from a rival seller.
#[must_use]
pub fn offer(seller_id: &str, price: Decimal) -> TestOffer {
    TestOffer {
        seller_id: seller_id.to_string(),
        price,
        prime: false,
        buy_box_winner: false,
    }
}

impl TestOffer {
    #[must_use]
    pub fn prime(mut self) -> Self {
        self.prime = true;
        self
    }

    #[must_use]
    pub fn buy_box(mut self) -> Self {
        self.buy_box_winner = true;
        self
    }
}

/// A camelCase trigger-shaped notification body.
#[must_use]
pub fn trigger_body(entity_id: &str, marketplace: &str, offers: &[TestOffer]) -> String {
    let offers: Vec<serde_json::Value> = offers
        .iter()
        .map(|o| {
            json!({
                "sellerId": o.seller_id,
                "listingPrice": {"amount": o.price.to_string(), "currencyCode": "USD"},
                "isFulfilledByOperator": o.prime,
                "isBuyBoxWinner": o.buy_box_winner,
            })
        })
        .collect();

    json!({
        "notificationType": "ANY_OFFER_CHANGED",
        "eventTime": "2026-07-01T12:30:00Z",
        "payload": {
            "offerChangeTrigger": {
                "asin": entity_id,
                "marketplaceId": marketplace,
                "itemCondition": "new"
            },
            "offers": offers
        }
    })
    .to_string()
}

/// A summary-shaped notification body with no offer list.
#[must_use]
pub fn summary_body(entity_id: &str, total_offers: u32) -> String {
    json!({
        "notificationType": "ANY_OFFER_CHANGED",
        "payload": {
            "offerChangeSummary": {
                "asin": entity_id,
                "numberOfOffers": total_offers
            }
        }
    })
    .to_string()
}

/// Wrap a notification body in the transport envelope.
#[must_use]
pub fn envelope(inner: &str) -> String {
    json!({
        "Type": "Notification",
        "MessageId": "envelope-1",
        "Message": inner,
    })
    .to_string()
}
