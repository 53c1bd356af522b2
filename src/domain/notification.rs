//! Canonical offer-change notification model.
//!
//! The wire format is messy: bodies may arrive wrapped in a transport
//! envelope, the payload comes in trigger and summary shapes, and field
//! names appear in either camelCase or PascalCase depending on the
//! publisher generation. Everything is normalized here, at ingestion, into
//! one [`Notification`] struct; downstream code never touches wire JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::offer::{Offer, OfferSummary};
use crate::error::{Error, Result};

/// Content hash of an inbound message body, used to detect redelivery.
///
/// The hash covers the body exactly as received, before envelope unwrap,
/// so a redelivered envelope and a redelivered bare notification each
/// collide with their own prior delivery.
#[must_use]
pub fn dedupe_hash(raw_body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A normalized offer-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub notification_type: String,
    pub event_time: Option<DateTime<Utc>>,
    /// Catalog identifier of the listing the change concerns.
    pub entity_id: String,
    pub marketplace: Option<String>,
    pub change: OfferChange,
}

/// The payload variants a notification can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferChange {
    /// Trigger-shaped payload with the full competing-offer list.
    Trigger {
        condition: Option<String>,
        offers: Vec<Offer>,
    },
    /// Summary-shaped payload carrying aggregates only.
    Summary(OfferSummary),
    /// Payload carried only direct identification fields.
    Bare,
}

impl Notification {
    /// Parse a raw queue message body into a canonical notification.
    ///
    /// Unwraps the transport envelope when present, accepts both wire
    /// casings, and extracts the entity id from the trigger, summary, or
    /// direct payload fields — in that priority order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed JSON or a payload with no
    /// entity id. The caller must leave such messages unacknowledged so
    /// the queue redelivers them under its own policy.
    pub fn parse(raw_body: &str) -> Result<Self> {
        let inner = unwrap_envelope(raw_body)?;
        let wire: WireNotification = serde_json::from_str(inner.as_ref())
            .map_err(|e| Error::Parse(format!("malformed notification: {e}")))?;
        Self::from_wire(wire)
    }

    /// The competing-offer list, empty for summary and bare payloads.
    #[must_use]
    pub fn offers(&self) -> &[Offer] {
        match &self.change {
            OfferChange::Trigger { offers, .. } => offers,
            _ => &[],
        }
    }

    fn from_wire(wire: WireNotification) -> Result<Self> {
        let payload = wire.payload.unwrap_or_default();

        let entity_id = payload
            .trigger
            .as_ref()
            .and_then(|t| t.asin.clone())
            .or_else(|| payload.summary.as_ref().and_then(|s| s.asin.clone()))
            .or_else(|| payload.asin.clone())
            .ok_or_else(|| Error::Parse("notification carries no entity id".into()))?;

        let marketplace = payload
            .trigger
            .as_ref()
            .and_then(|t| t.marketplace_id.clone())
            .or_else(|| payload.summary.as_ref().and_then(|s| s.marketplace_id.clone()))
            .or_else(|| payload.marketplace_id.clone());

        let event_time = wire
            .event_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        let change = if let Some(offers) = payload.offers {
            OfferChange::Trigger {
                condition: payload.trigger.as_ref().and_then(|t| t.item_condition.clone()),
                offers: offers.into_iter().filter_map(WireOffer::into_offer).collect(),
            }
        } else if let Some(summary) = payload.summary {
            OfferChange::Summary(OfferSummary {
                total_offers: summary.number_of_offers,
                lowest_price: summary.lowest_price.and_then(|m| m.amount),
                buy_box_price: summary.buy_box_price.and_then(|m| m.amount),
            })
        } else {
            OfferChange::Bare
        };

        Ok(Self {
            notification_type: wire
                .notification_type
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            event_time,
            entity_id,
            marketplace,
            change,
        })
    }
}

/// Unwrap a transport envelope, returning the inner notification body.
///
/// An envelope is detected by the Type+Message marker pair; anything else
/// passes through untouched (it must still be valid JSON).
fn unwrap_envelope(raw_body: &str) -> Result<std::borrow::Cow<'_, str>> {
    let envelope: TransportEnvelope = serde_json::from_str(raw_body)
        .map_err(|e| Error::Parse(format!("malformed message body: {e}")))?;

    match (envelope.kind, envelope.message) {
        (Some(_), Some(message)) => Ok(std::borrow::Cow::Owned(message)),
        _ => Ok(std::borrow::Cow::Borrowed(raw_body)),
    }
}

#[derive(Debug, Deserialize)]
struct TransportEnvelope {
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireNotification {
    #[serde(rename = "notificationType", alias = "NotificationType")]
    notification_type: Option<String>,
    #[serde(rename = "eventTime", alias = "EventTime")]
    event_time: Option<String>,
    #[serde(rename = "payload", alias = "Payload")]
    payload: Option<WirePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePayload {
    #[serde(rename = "offerChangeTrigger", alias = "OfferChangeTrigger")]
    trigger: Option<WireTrigger>,
    #[serde(rename = "offerChangeSummary", alias = "OfferChangeSummary", alias = "summary", alias = "Summary")]
    summary: Option<WireSummary>,
    #[serde(rename = "asin", alias = "ASIN")]
    asin: Option<String>,
    #[serde(rename = "marketplaceId", alias = "MarketplaceId")]
    marketplace_id: Option<String>,
    #[serde(rename = "offers", alias = "Offers")]
    offers: Option<Vec<WireOffer>>,
}

#[derive(Debug, Deserialize)]
struct WireTrigger {
    #[serde(rename = "asin", alias = "ASIN")]
    asin: Option<String>,
    #[serde(rename = "marketplaceId", alias = "MarketplaceId")]
    marketplace_id: Option<String>,
    #[serde(rename = "itemCondition", alias = "ItemCondition")]
    item_condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    #[serde(rename = "asin", alias = "ASIN")]
    asin: Option<String>,
    #[serde(rename = "marketplaceId", alias = "MarketplaceId")]
    marketplace_id: Option<String>,
    #[serde(rename = "numberOfOffers", alias = "NumberOfOffers")]
    number_of_offers: Option<u32>,
    #[serde(rename = "lowestPrice", alias = "LowestPrice")]
    lowest_price: Option<WireMoney>,
    #[serde(rename = "buyBoxPrice", alias = "BuyBoxPrice")]
    buy_box_price: Option<WireMoney>,
}

#[derive(Debug, Deserialize)]
struct WireOffer {
    #[serde(rename = "sellerId", alias = "SellerId")]
    seller_id: Option<String>,
    #[serde(rename = "listingPrice", alias = "ListingPrice")]
    listing_price: Option<WireMoney>,
    #[serde(rename = "shipping", alias = "Shipping")]
    shipping: Option<WireMoney>,
    #[serde(rename = "isFulfilledByOperator", alias = "IsFulfilledByOperator", alias = "isFulfilledByAmazon", alias = "IsFulfilledByAmazon")]
    prime: Option<bool>,
    #[serde(rename = "isBuyBoxWinner", alias = "IsBuyBoxWinner")]
    buy_box_winner: Option<bool>,
    #[serde(rename = "subCondition", alias = "SubCondition")]
    sub_condition: Option<String>,
}

impl WireOffer {
    /// Offers without a seller id or listing price are unusable and dropped.
    fn into_offer(self) -> Option<Offer> {
        Some(Offer {
            seller_id: self.seller_id?,
            listing_price: self.listing_price.and_then(|m| m.amount)?,
            shipping: self.shipping.and_then(|m| m.amount),
            prime: self.prime.unwrap_or(false),
            buy_box_winner: self.buy_box_winner.unwrap_or(false),
            sub_condition: self.sub_condition,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireMoney {
    #[serde(rename = "amount", alias = "Amount")]
    amount: Option<Decimal>,
    #[serde(rename = "currencyCode", alias = "CurrencyCode")]
    #[allow(dead_code)]
    currency_code: Option<String>,
}
