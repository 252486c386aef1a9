//! Price sources tried in order by the resolver.
//!
//! Networked sources never fail outward: every transport, status or parse
//! problem is logged and reported as an empty list, which is what lets the
//! resolver fall through to the next stage.

pub mod gov;
pub mod llm;
pub mod mock;

pub use gov::AgmarknetSource;
pub use llm::GroqSource;
pub use mock::MockSource;

use async_trait::async_trait;

use crate::types::{MarketRecord, PriceQuery, ResolutionSource};

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Stage this source represents in the fallback chain.
    fn kind(&self) -> ResolutionSource;

    /// Fetch raw quotes for `query.crop`. Empty on any failure.
    async fn fetch(&self, query: &PriceQuery) -> Vec<MarketRecord>;
}

/// Reads a number that may arrive as a JSON number or a numeric string.
pub(crate) fn lenient_f64(v: &serde_json::Value, key: &str) -> Option<f64> {
    v.get(key)
        .and_then(|x| x.as_f64().or_else(|| x.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|x| x.is_finite())
}

pub(crate) fn lenient_str(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|x| x.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Builds a record from one loosely-typed JSON object. Returns None when the
/// modal price is missing, which is the one field the response cannot do without.
/// `price_divisor` converts upstream units to per-kg (100 for per-quintal feeds).
pub(crate) fn record_from_value(
    v: &serde_json::Value,
    fallback_commodity: &str,
    price_divisor: f64,
) -> Option<MarketRecord> {
    let modal_price = lenient_f64(v, "modal_price")? / price_divisor;
    let min_price = lenient_f64(v, "min_price").map_or(modal_price, |p| p / price_divisor);
    let max_price = lenient_f64(v, "max_price").map_or(modal_price, |p| p / price_divisor);

    Some(MarketRecord {
        commodity: lenient_str(v, "commodity").unwrap_or_else(|| fallback_commodity.to_string()),
        market: lenient_str(v, "market"),
        state: lenient_str(v, "state").unwrap_or_else(|| "Unknown".to_string()),
        district: lenient_str(v, "district").unwrap_or_else(|| "Unknown".to_string()),
        min_price,
        max_price,
        modal_price,
        arrival_date: lenient_str(v, "arrival_date").unwrap_or_else(|| "TODAY".to_string()),
        latitude: lenient_f64(v, "latitude"),
        longitude: lenient_f64(v, "longitude"),
    })
}
