//! Thin client for the quota-limited outbound pricing API.
//!
//! HTTP 429 and quota-exceeded bodies map to [`Error::RateLimited`], the
//! sole signal the adaptive limiter reacts to; any other non-2xx follows
//! the generic retry policy.

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::Duration;
use tracing::debug;

use crate::config::PricingConfig;
use crate::error::{Error, Result};

/// Competitive pricing aggregates for one listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompetitiveSummary {
    pub entity_id: String,
    pub total_offers: Option<u32>,
    pub lowest_price: Option<Decimal>,
    pub buy_box_price: Option<Decimal>,
}

pub struct PricingClient {
    client: reqwest::Client,
    base_url: String,
}

impl PricingClient {
    pub fn new(config: &PricingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the current competitive summary for one listing.
    pub async fn competitive_summary(
        &self,
        entity_id: &str,
        marketplace: &str,
    ) -> Result<CompetitiveSummary> {
        let url = format!(
            "{}/products/pricing/v0/items/{entity_id}/offers?MarketplaceId={marketplace}&ItemCondition=New",
            self.base_url
        );
        debug!(entity_id, marketplace, "fetching competitive summary");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!(
                "pricing api throttled request for {entity_id}"
            )));
        }
        if !status.is_success() {
            if is_quota_exceeded(&body) {
                return Err(Error::RateLimited(format!(
                    "pricing api quota exceeded for {entity_id}"
                )));
            }
            return Err(Error::Connection(format!(
                "pricing api returned {status} for {entity_id}"
            )));
        }

        let wire: OffersResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("malformed pricing response: {e}")))?;
        Ok(wire.into_summary(entity_id))
    }
}

/// Quota errors sometimes arrive with a 403 and an error-coded body rather
/// than a 429.
fn is_quota_exceeded(body: &str) -> bool {
    body.contains("QuotaExceeded")
}

#[derive(Debug, Deserialize)]
struct OffersResponse {
    #[serde(rename = "payload", alias = "Payload")]
    payload: Option<OffersPayload>,
}

#[derive(Debug, Deserialize)]
struct OffersPayload {
    #[serde(rename = "Summary", alias = "summary")]
    summary: Option<WireSummary>,
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    #[serde(rename = "TotalOfferCount", alias = "totalOfferCount")]
    total_offer_count: Option<u32>,
    #[serde(rename = "LowestPrices", alias = "lowestPrices", default)]
    lowest_prices: Vec<WirePrice>,
    #[serde(rename = "BuyBoxPrices", alias = "buyBoxPrices", default)]
    buy_box_prices: Vec<WirePrice>,
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    #[serde(rename = "LandedPrice", alias = "landedPrice")]
    landed_price: Option<WireMoney>,
}

#[derive(Debug, Deserialize)]
struct WireMoney {
    #[serde(rename = "Amount", alias = "amount")]
    amount: Option<Decimal>,
}

impl OffersResponse {
    fn into_summary(self, entity_id: &str) -> CompetitiveSummary {
        let summary = self.payload.and_then(|p| p.summary);
        match summary {
            Some(summary) => CompetitiveSummary {
                entity_id: entity_id.to_string(),
                total_offers: summary.total_offer_count,
                lowest_price: lowest_amount(&summary.lowest_prices),
                buy_box_price: lowest_amount(&summary.buy_box_prices),
            },
            None => CompetitiveSummary {
                entity_id: entity_id.to_string(),
                ..CompetitiveSummary::default()
            },
        }
    }
}

fn lowest_amount(prices: &[WirePrice]) -> Option<Decimal> {
    prices
        .iter()
        .filter_map(|p| p.landed_price.as_ref().and_then(|m| m.amount))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_summary_response() {
        let body = r#"{
            "payload": {
                "Summary": {
                    "TotalOfferCount": 7,
                    "LowestPrices": [
                        {"LandedPrice": {"Amount": "19.99", "CurrencyCode": "USD"}},
                        {"LandedPrice": {"Amount": "18.49", "CurrencyCode": "USD"}}
                    ],
                    "BuyBoxPrices": [
                        {"LandedPrice": {"Amount": "19.99", "CurrencyCode": "USD"}}
                    ]
                }
            }
        }"#;

        let wire: OffersResponse = serde_json::from_str(body).unwrap();
        let summary = wire.into_summary("B00TEST");
        assert_eq!(summary.total_offers, Some(7));
        assert_eq!(summary.lowest_price, Some(dec!(18.49)));
        assert_eq!(summary.buy_box_price, Some(dec!(19.99)));
    }

    #[test]
    fn missing_summary_degrades_to_defaults() {
        let wire: OffersResponse = serde_json::from_str("{}").unwrap();
        let summary = wire.into_summary("B00TEST");
        assert_eq!(summary.entity_id, "B00TEST");
        assert_eq!(summary.total_offers, None);
        assert_eq!(summary.lowest_price, None);
    }

    #[test]
    fn quota_exceeded_body_is_detected() {
        assert!(is_quota_exceeded(
            r#"{"errors":[{"code":"QuotaExceeded","message":"You exceeded your quota"}]}"#
        ));
        assert!(!is_quota_exceeded(r#"{"errors":[{"code":"NotFound"}]}"#));
    }
}
