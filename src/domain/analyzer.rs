//! Competitive severity analyzer.
//!
//! A pure function over the canonical notification: locates "your" offer by
//! seller id, extracts the market aggregates, and classifies competitive
//! exposure with an ordered rule set. Thresholds preserve the behavior the
//! rest of the system was tuned against, but every one of them is
//! configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::analysis::{Analysis, Severity};
use super::notification::Notification;

/// Thresholds for the severity rule set.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Positions at or above this rank classify as `success`.
    #[serde(default = "default_top_positions")]
    pub top_positions: u32,
    /// Gap percentage floor for `warning`.
    #[serde(default = "default_warning_gap_pct")]
    pub warning_gap_pct: Decimal,
    /// Offer count floor for `warning`.
    #[serde(default = "default_warning_min_offers")]
    pub warning_min_offers: u32,
    /// Gap percentage floor for `high`.
    #[serde(default = "default_high_gap_pct")]
    pub high_gap_pct: Decimal,
    /// Offer count floor for `high`.
    #[serde(default = "default_high_min_offers")]
    pub high_min_offers: u32,
    /// Gap percentage floor for `critical`.
    #[serde(default = "default_critical_gap_pct")]
    pub critical_gap_pct: Decimal,
    /// Offer count floor for `critical`.
    #[serde(default = "default_critical_min_offers")]
    pub critical_min_offers: u32,
    /// `critical` requires a position strictly below this rank.
    #[serde(default = "default_critical_min_position")]
    pub critical_min_position: u32,
}

fn default_top_positions() -> u32 {
    3
}

fn default_warning_gap_pct() -> Decimal {
    Decimal::from(10)
}

fn default_warning_min_offers() -> u32 {
    3
}

fn default_high_gap_pct() -> Decimal {
    Decimal::from(20)
}

fn default_high_min_offers() -> u32 {
    5
}

fn default_critical_gap_pct() -> Decimal {
    Decimal::from(50)
}

fn default_critical_min_offers() -> u32 {
    10
}

fn default_critical_min_position() -> u32 {
    10
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            top_positions: default_top_positions(),
            warning_gap_pct: default_warning_gap_pct(),
            warning_min_offers: default_warning_min_offers(),
            high_gap_pct: default_high_gap_pct(),
            high_min_offers: default_high_min_offers(),
            critical_gap_pct: default_critical_gap_pct(),
            critical_min_offers: default_critical_min_offers(),
            critical_min_position: default_critical_min_position(),
        }
    }
}

/// Analyze a notification against the configured seller.
///
/// Never fails: a notification without a usable offer list degrades to the
/// default `info` analysis.
#[must_use]
pub fn analyze(notification: &Notification, seller_id: &str, config: &AnalyzerConfig) -> Analysis {
    let offers = notification.offers();
    if offers.is_empty() {
        return Analysis::default_info();
    }

    // The feed sorts offers cheapest-first.
    let market_low = offers.first().map(|o| o.listing_price);
    let prime_low = offers
        .iter()
        .filter(|o| o.prime)
        .map(|o| o.listing_price)
        .min();

    let your_index = offers.iter().position(|o| o.seller_id == seller_id);
    let your_position = your_index.map(|i| i as u32 + 1);
    let your_price = your_index.map(|i| offers[i].listing_price);
    let buy_box_winner = your_index.is_some_and(|i| offers[i].buy_box_winner);
    let total_offers = offers.len() as u32;

    let mut analysis = Analysis {
        severity: Severity::Info,
        your_price,
        market_low,
        prime_low,
        total_offers: Some(total_offers),
        your_position,
        buy_box_winner,
    };
    analysis.severity = classify(&analysis, total_offers, config);
    analysis
}

/// Ordered severity rules; the first match wins.
fn classify(analysis: &Analysis, total_offers: u32, config: &AnalyzerConfig) -> Severity {
    if analysis.buy_box_winner
        || analysis
            .your_position
            .is_some_and(|p| p <= config.top_positions)
    {
        return Severity::Success;
    }

    let Some(gap_pct) = analysis.gap_pct() else {
        return Severity::Info;
    };

    if gap_pct >= config.critical_gap_pct
        && total_offers >= config.critical_min_offers
        && analysis
            .your_position
            .is_some_and(|p| p > config.critical_min_position)
    {
        return Severity::Critical;
    }

    if gap_pct >= config.high_gap_pct && total_offers >= config.high_min_offers {
        return Severity::High;
    }

    if gap_pct >= config.warning_gap_pct || total_offers >= config.warning_min_offers {
        return Severity::Warning;
    }

    Severity::Info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::OfferChange;
    use crate::domain::offer::Offer;
    use rust_decimal_macros::dec;

    const SELLER: &str = "A2YOU";

    fn offer(seller_id: &str, price: Decimal) -> Offer {
        Offer {
            seller_id: seller_id.into(),
            listing_price: price,
            shipping: None,
            prime: false,
            buy_box_winner: false,
            sub_condition: None,
        }
    }

    /// Build a notification whose offer list puts the configured seller at
    /// `position` (1-based) with `your_price`, padding the remaining slots
    /// with rivals priced between the market low and your price.
    fn notification_at(
        your_price: Decimal,
        market_low: Decimal,
        total_offers: u32,
        position: u32,
    ) -> Notification {
        assert!(position >= 1 && position <= total_offers);

        let mut offers = Vec::with_capacity(total_offers as usize);
        for rank in 1..=total_offers {
            if rank == position {
                offers.push(offer(SELLER, your_price));
            } else if rank == 1 {
                offers.push(offer("A1RIVAL", market_low));
            } else {
                offers.push(offer(&format!("A{rank}RIVAL"), market_low + Decimal::from(rank)));
            }
        }

        Notification {
            notification_type: "ANY_OFFER_CHANGED".into(),
            event_time: None,
            entity_id: "B00TEST".into(),
            marketplace: Some("ATVPDKIKX0DER".into()),
            change: OfferChange::Trigger {
                condition: None,
                offers,
            },
        }
    }

    fn severity_of(notification: &Notification) -> Severity {
        analyze(notification, SELLER, &AnalyzerConfig::default()).severity
    }

    #[test]
    fn buy_box_winner_short_circuits_to_success() {
        // Huge gap, deep position — buy box still wins.
        let mut notification = notification_at(dec!(100), dec!(10), 12, 12);
        if let OfferChange::Trigger { offers, .. } = &mut notification.change {
            offers[11].buy_box_winner = true;
        }
        assert_eq!(severity_of(&notification), Severity::Success);
    }

    #[test]
    fn top_three_position_is_success() {
        let notification = notification_at(dec!(25), dec!(20), 8, 3);
        assert_eq!(severity_of(&notification), Severity::Success);
    }

    #[test]
    fn missing_your_offer_is_info_when_market_thin() {
        // Seller absent from a 2-offer list: no price, no position.
        let notification = Notification {
            notification_type: "ANY_OFFER_CHANGED".into(),
            event_time: None,
            entity_id: "B00TEST".into(),
            marketplace: None,
            change: OfferChange::Trigger {
                condition: None,
                offers: vec![offer("A1RIVAL", dec!(10)), offer("A3RIVAL", dec!(11))],
            },
        };
        assert_eq!(severity_of(&notification), Severity::Info);
    }

    #[test]
    fn empty_offer_list_degrades_to_default_info() {
        let notification = Notification {
            notification_type: "ANY_OFFER_CHANGED".into(),
            event_time: None,
            entity_id: "B00TEST".into(),
            marketplace: None,
            change: OfferChange::Bare,
        };
        let analysis = analyze(&notification, SELLER, &AnalyzerConfig::default());
        assert_eq!(analysis, Analysis::default_info());
    }

    // Boundary matrix: gap percentages straddling each threshold, with the
    // seller held past the top-position band and offer counts at
    // qualifying values for the tier under test.

    #[test]
    fn gap_9_9_below_the_gap_floor_is_info() {
        // Any position past the top band implies at least 4 offers, which
        // would trip the warning offer-count floor on its own; raise that
        // floor so the gap alone decides.
        let config = AnalyzerConfig {
            warning_min_offers: 100,
            ..AnalyzerConfig::default()
        };
        let notification = notification_at(dec!(10.99), dec!(10), 4, 4);
        let analysis = analyze(&notification, SELLER, &config);
        assert_eq!(analysis.severity, Severity::Info);
    }

    #[test]
    fn gap_9_9_with_crowded_market_is_warning() {
        // Offer count alone satisfies the warning rule.
        let notification = notification_at(dec!(10.99), dec!(10), 4, 4);
        assert_eq!(severity_of(&notification), Severity::Warning);
    }

    #[test]
    fn gap_10_0_is_warning() {
        let notification = notification_at(dec!(11), dec!(10), 4, 4);
        assert_eq!(severity_of(&notification), Severity::Warning);
    }

    #[test]
    fn gap_19_9_is_warning() {
        // 5 offers meet the high-tier floor; the gap just under 20% does not.
        let notification = notification_at(dec!(11.99), dec!(10), 5, 5);
        assert_eq!(severity_of(&notification), Severity::Warning);
    }

    #[test]
    fn gap_20_0_with_five_offers_is_high() {
        let notification = notification_at(dec!(12), dec!(10), 5, 5);
        assert_eq!(severity_of(&notification), Severity::High);
    }

    #[test]
    fn gap_49_9_stays_high() {
        let notification = notification_at(dec!(14.99), dec!(10), 11, 11);
        assert_eq!(severity_of(&notification), Severity::High);
    }

    #[test]
    fn gap_50_0_deep_position_crowded_market_is_critical() {
        let notification = notification_at(dec!(15), dec!(10), 11, 11);
        assert_eq!(severity_of(&notification), Severity::Critical);
    }

    #[test]
    fn gap_50_0_shallow_position_is_not_critical() {
        // Position 10 is not strictly greater than the cutoff.
        let notification = notification_at(dec!(15), dec!(10), 11, 10);
        assert_eq!(severity_of(&notification), Severity::High);
    }

    #[test]
    fn scenario_b_fifty_percent_gap() {
        let notification = notification_at(dec!(30), dec!(20), 12, 12);
        let analysis = analyze(&notification, SELLER, &AnalyzerConfig::default());
        assert_eq!(analysis.severity, Severity::Critical);
        assert_eq!(analysis.gap_pct(), Some(dec!(50)));
        assert_eq!(analysis.your_position, Some(12));
    }

    #[test]
    fn prime_low_tracks_cheapest_operator_fulfilled_offer() {
        let mut notification = notification_at(dec!(30), dec!(20), 5, 5);
        if let OfferChange::Trigger { offers, .. } = &mut notification.change {
            offers[1].prime = true;
            offers[2].prime = true;
        }
        let analysis = analyze(&notification, SELLER, &AnalyzerConfig::default());
        // Offers 2 and 3 are priced market_low + rank.
        assert_eq!(analysis.prime_low, Some(dec!(22)));
    }

    #[test]
    fn custom_thresholds_are_honored() {
        // A 2% gap is below the default warning floor but above the
        // custom one.
        let config = AnalyzerConfig {
            warning_gap_pct: dec!(1),
            warning_min_offers: 100,
            ..AnalyzerConfig::default()
        };
        let notification = notification_at(dec!(10.20), dec!(10), 4, 4);
        let analysis = analyze(&notification, SELLER, &config);
        assert_eq!(analysis.severity, Severity::Warning);
    }
}
