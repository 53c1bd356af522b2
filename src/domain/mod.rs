//! Transport-agnostic domain types: notifications, offers, competitive analysis.

pub mod analysis;
pub mod analyzer;
pub mod notification;
pub mod offer;

pub use analysis::{Analysis, Severity};
pub use analyzer::{analyze, AnalyzerConfig};
pub use notification::{dedupe_hash, Notification, OfferChange};
pub use offer::{Offer, OfferSummary};
