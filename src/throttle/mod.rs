//! Outbound call throttling.
//!
//! Two independent mechanisms gate every dispatch: the [`TokenBucket`] is a
//! strict long-run ceiling with a burst allowance, and the
//! [`AdaptiveLimiter`] is a feedback-controlled minimum spacing per API
//! class that grows on throttle responses and decays on success.

pub mod adaptive;
pub mod bucket;

pub use adaptive::AdaptiveLimiter;
pub use bucket::TokenBucket;
