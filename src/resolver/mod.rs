//! Market price resolution: an ordered fallback chain over upstream sources,
//! then the response cache, then synthetic data.
//!
//! Sources are awaited strictly one after another. Concurrent identical
//! requests are not coalesced; both may hit the LLM and both write the cache.

pub mod assemble;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::cache::{market_cache_key, PriceCache};
use crate::config::{CACHE_KEY_PREFIX, CACHE_TTL_SECS};
use crate::error::{AppError, Result};
use crate::sources::{MockSource, PriceSource};
use crate::types::{Language, MarketPriceResponse, PriceQuery, ResolutionSource};

use assemble::{build_response, rank_by_distance};

/// Fixed query used by the health check: tomato at Pune.
const HEALTH_SAMPLE: (f64, f64) = (18.5204, 73.8567);

#[derive(Debug, Clone)]
pub struct Resolved {
    pub response: MarketPriceResponse,
    pub source: ResolutionSource,
}

pub struct MarketPriceResolver {
    /// Tried in order; the first non-empty result wins.
    sources: Vec<Arc<dyn PriceSource>>,
    cache: Arc<dyn PriceCache>,
    mock: MockSource,
}

impl MarketPriceResolver {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, cache: Arc<dyn PriceCache>) -> Self {
        Self { sources, cache, mock: MockSource::new() }
    }

    /// Runs the fallback chain for one request and reports which stage answered.
    pub async fn get_market_prices(&self, query: &PriceQuery, include_far: bool) -> Result<Resolved> {
        let key = market_cache_key(&query.crop, query.lat, query.lon, include_far, query.language);

        let mut fetched = None;
        for source in &self.sources {
            let kind = source.kind();
            info!(crop = %query.crop, source = %kind, "Trying price source");
            let records = source.fetch(query).await;
            if records.is_empty() {
                warn!(crop = %query.crop, source = %kind, "Price source returned no data");
                continue;
            }
            info!(crop = %query.crop, source = %kind, count = records.len(), "Price source succeeded");
            fetched = Some((kind, records));
            break;
        }

        let (source, ranked) = match fetched {
            Some((kind, records)) => {
                (kind, rank_by_distance(records, query.lat, query.lon, query.limit))
            }
            None => {
                if let Some(cached) = self.read_cache(&key).await {
                    info!(crop = %query.crop, key = %key, "Serving market data from cache");
                    return Ok(Resolved { response: cached, source: ResolutionSource::Cache });
                }
                warn!(crop = %query.crop, "All sources failed. Using mock data.");
                (ResolutionSource::Mock, self.mock.generate(query))
            }
        };

        let response = build_response(&query.crop, &ranked, query.language, Utc::now())
            .ok_or_else(|| {
                error!(crop = %query.crop, source = %source, "No markets left to build a response");
                AppError::MarketUnavailable
            })?;

        if source.is_cacheable() {
            self.write_cache(&key, &response).await;
        }

        Ok(Resolved { response, source })
    }

    async fn read_cache(&self, key: &str) -> Option<MarketPriceResponse> {
        if !self.cache.is_open() {
            return None;
        }
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!(key = %key, "[Cache] unreadable entry: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, "[Cache] read failed: {e}");
                None
            }
        }
    }

    async fn write_cache(&self, key: &str, response: &MarketPriceResponse) {
        if !self.cache.is_open() {
            return;
        }
        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, "[Cache] serialize failed: {e}");
                return;
            }
        };
        match self.cache.set_ex(key, CACHE_TTL_SECS, &raw).await {
            Ok(()) => info!(key = %key, ttl = CACHE_TTL_SECS, "[Cache] market data cached"),
            Err(e) => warn!(key = %key, "[Cache] write failed: {e}"),
        }
    }

    /// Deletes every cached market response. 0 when the cache is closed or errors.
    pub async fn clear_cache(&self) -> usize {
        if !self.cache.is_open() {
            return 0;
        }
        match self.cache.delete_matching(&format!("{CACHE_KEY_PREFIX}:*")).await {
            Ok(n) => {
                info!(deleted = n, "[Cache] cleared market entries");
                n
            }
            Err(e) => {
                warn!("[Cache] clear failed: {e}");
                0
            }
        }
    }

    /// The last-resort generator must always be able to answer.
    pub fn health_check(&self) -> bool {
        let (lat, lon) = HEALTH_SAMPLE;
        let sample = PriceQuery {
            crop: "tomato".to_string(),
            lat,
            lon,
            limit: 1,
            language: Language::En,
        };
        !self.mock.generate(&sample).is_empty()
    }

    pub async fn cache_connected(&self) -> bool {
        self.cache.is_open() && self.cache.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::MemoryCache;
    use crate::sources::tests::{record, StaticSource};
    use crate::types::MarketRecord;

    const PUNE: (f64, f64) = (18.5204, 73.8567);

    fn query(limit: usize) -> PriceQuery {
        PriceQuery {
            crop: "tomato".to_string(),
            lat: PUNE.0,
            lon: PUNE.1,
            limit,
            language: Language::En,
        }
    }

    fn gov_records() -> Vec<MarketRecord> {
        vec![
            record("Solapur Mandi", 20.0, 17.6599, 75.9064),
            record("Pune Mandi", 24.0, 18.5204, 73.8567),
            record("Nashik Market", 30.0, 19.9975, 73.7898),
            record("Mumbai APMC", 28.0, 19.0760, 72.8777),
        ]
    }

    struct Fixture {
        llm: Arc<StaticSource>,
        gov: Arc<StaticSource>,
        cache: Arc<MemoryCache>,
        resolver: MarketPriceResolver,
    }

    fn fixture(llm: Vec<MarketRecord>, gov: Vec<MarketRecord>, cache: MemoryCache) -> Fixture {
        let llm = Arc::new(StaticSource::new(ResolutionSource::Llm, llm));
        let gov = Arc::new(StaticSource::new(ResolutionSource::GovApi, gov));
        let cache = Arc::new(cache);
        let resolver = MarketPriceResolver::new(
            vec![llm.clone() as Arc<dyn PriceSource>, gov.clone() as Arc<dyn PriceSource>],
            cache.clone(),
        );
        Fixture { llm, gov, cache, resolver }
    }

    #[tokio::test]
    async fn llm_result_wins_and_skips_gov() {
        let f = fixture(vec![record("Pune Mandi", 26.0, PUNE.0, PUNE.1)], gov_records(), MemoryCache::new());
        let resolved = f.resolver.get_market_prices(&query(5), false).await.unwrap();
        assert_eq!(resolved.source, ResolutionSource::Llm);
        assert_eq!(resolved.response.markets[0].price, 26.0);
        assert_eq!(f.llm.call_count(), 1);
        assert_eq!(f.gov.call_count(), 0);
    }

    #[tokio::test]
    async fn gov_used_when_llm_empty_and_result_cached() {
        let f = fixture(vec![], gov_records(), MemoryCache::new());
        let resolved = f.resolver.get_market_prices(&query(5), true).await.unwrap();

        assert_eq!(resolved.source, ResolutionSource::GovApi);
        let names: Vec<_> = resolved.response.markets.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Pune Mandi", "Mumbai APMC", "Nashik Market", "Solapur Mandi"]);

        let key = market_cache_key("tomato", PUNE.0, PUNE.1, true, Language::En);
        let (ttl, raw) = f.cache.entry(&key).expect("response cached");
        assert_eq!(ttl, CACHE_TTL_SECS);
        let cached: MarketPriceResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(cached, resolved.response);
    }

    #[tokio::test]
    async fn mock_when_everything_fails_and_never_cached() {
        let f = fixture(vec![], vec![], MemoryCache::new());
        let resolved = f.resolver.get_market_prices(&query(5), false).await.unwrap();
        assert_eq!(resolved.source, ResolutionSource::Mock);
        assert!(!resolved.response.markets.is_empty());
        assert_eq!(f.cache.len(), 0);
    }

    #[tokio::test]
    async fn cache_hit_is_returned_verbatim() {
        let f = fixture(vec![], gov_records(), MemoryCache::new());
        let first = f.resolver.get_market_prices(&query(3), false).await.unwrap();
        let key = market_cache_key("tomato", PUNE.0, PUNE.1, false, Language::En);
        let (_, stored) = f.cache.entry(&key).unwrap();

        // Upstream goes dark; the earlier response must come back untouched.
        let dark = fixture(vec![], vec![], MemoryCache::new());
        dark.cache.insert(&key, &stored);
        let second = dark.resolver.get_market_prices(&query(3), false).await.unwrap();

        assert_eq!(second.source, ResolutionSource::Cache);
        assert_eq!(second.response, first.response);
        assert_eq!(serde_json::to_string(&second.response).unwrap(), stored);
    }

    #[tokio::test]
    async fn cache_is_not_consulted_when_upstream_answers() {
        let cache = MemoryCache::new();
        let key = market_cache_key("tomato", PUNE.0, PUNE.1, false, Language::En);
        cache.insert(&key, "{\"stale\": true}");
        let f = fixture(vec![record("Pune Mandi", 26.0, PUNE.0, PUNE.1)], vec![], cache);
        let resolved = f.resolver.get_market_prices(&query(5), false).await.unwrap();
        assert_eq!(resolved.source, ResolutionSource::Llm);
    }

    #[tokio::test]
    async fn closed_or_failing_cache_degrades_to_mock() {
        let closed = MemoryCache::closed();
        let key = market_cache_key("tomato", PUNE.0, PUNE.1, false, Language::En);
        closed.insert(&key, "ignored");
        let f = fixture(vec![], vec![], closed);
        assert_eq!(f.resolver.get_market_prices(&query(5), false).await.unwrap().source, ResolutionSource::Mock);

        let f = fixture(vec![], vec![], MemoryCache::failing());
        assert_eq!(f.resolver.get_market_prices(&query(5), false).await.unwrap().source, ResolutionSource::Mock);

        let f = fixture(vec![], gov_records(), MemoryCache::failing());
        assert_eq!(f.resolver.get_market_prices(&query(5), false).await.unwrap().source, ResolutionSource::GovApi);
    }

    #[tokio::test]
    async fn unreadable_cache_entry_falls_through_to_mock() {
        let cache = MemoryCache::new();
        let key = market_cache_key("tomato", PUNE.0, PUNE.1, false, Language::En);
        cache.insert(&key, "not json");
        let f = fixture(vec![], vec![], cache);
        assert_eq!(f.resolver.get_market_prices(&query(5), false).await.unwrap().source, ResolutionSource::Mock);
    }

    #[tokio::test]
    async fn markets_sorted_by_distance() {
        for include_far in [false, true] {
            let f = fixture(vec![], gov_records(), MemoryCache::new());
            let resp = f.resolver.get_market_prices(&query(10), include_far).await.unwrap().response;
            assert!(resp.markets.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[tokio::test]
    async fn truncation_is_min_of_limit_and_available() {
        for include_far in [false, true] {
            for (limit, expected) in [(1, 1), (2, 2), (4, 4), (10, 4)] {
                let f = fixture(vec![], gov_records(), MemoryCache::new());
                let resp = f
                    .resolver
                    .get_market_prices(&query(limit), include_far)
                    .await
                    .unwrap()
                    .response;
                assert_eq!(resp.markets.len(), expected, "limit={limit} include_far={include_far}");
            }
        }
    }

    #[tokio::test]
    async fn llm_markets_beyond_two_hundred_km_are_kept() {
        let f = fixture(gov_records(), vec![], MemoryCache::new());
        let resp = f.resolver.get_market_prices(&query(5), false).await.unwrap().response;
        let names: Vec<_> = resp.markets.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Pune Mandi", "Mumbai APMC", "Nashik Market", "Solapur Mandi"]);
        assert!(resp.markets[3].distance > 200.0);
    }

    #[tokio::test]
    async fn include_far_only_changes_cache_key() {
        let f = fixture(vec![], gov_records(), MemoryCache::new());
        let near = f.resolver.get_market_prices(&query(5), false).await.unwrap().response;
        let far = f.resolver.get_market_prices(&query(5), true).await.unwrap().response;
        assert_eq!(near.markets, far.markets);
        assert!(f.cache.entry(&market_cache_key("tomato", PUNE.0, PUNE.1, false, Language::En)).is_some());
        assert!(f.cache.entry(&market_cache_key("tomato", PUNE.0, PUNE.1, true, Language::En)).is_some());
    }

    #[tokio::test]
    async fn zero_limit_is_unavailable() {
        let f = fixture(vec![], vec![], MemoryCache::new());
        let err = f.resolver.get_market_prices(&query(0), false).await.unwrap_err();
        assert!(matches!(err, AppError::MarketUnavailable));
    }

    #[tokio::test]
    async fn pune_tomato_end_to_end_on_mock() {
        let f = fixture(vec![], vec![], MemoryCache::closed());
        let resp = f.resolver.get_market_prices(&query(5), false).await.unwrap().response;

        let names: Vec<_> = resp.markets.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Pune Mandi", "Mumbai APMC", "Nashik Market", "Solapur Mandi"]);
        assert_eq!(resp.markets[0].distance, 0.0);
        assert!(resp.markets.iter().all(|m| m.price == 25.0 && m.unit == "per kg"));
        assert_eq!(resp.price_analysis.average, 25.0);
        assert_eq!(resp.price_analysis.highest.market, "Pune Mandi");
        assert_eq!(resp.price_analysis.lowest.market, "Pune Mandi");
        assert_eq!(resp.crop, "Tomato");
        assert_eq!(resp.price_history.len(), 30);
    }

    #[tokio::test]
    async fn clear_cache_removes_only_market_keys() {
        let cache = MemoryCache::new();
        cache.insert("market:tomato:1,2:far=false:lang=en", "{}");
        cache.insert("market:onion:1,2:far=true:lang=hi", "{}");
        cache.insert("weather:1,2", "{}");
        let f = fixture(vec![], vec![], cache);
        assert_eq!(f.resolver.clear_cache().await, 2);
        assert_eq!(f.cache.len(), 1);

        let f = fixture(vec![], vec![], MemoryCache::closed());
        assert_eq!(f.resolver.clear_cache().await, 0);
        let f = fixture(vec![], vec![], MemoryCache::failing());
        assert_eq!(f.resolver.clear_cache().await, 0);
    }

    #[tokio::test]
    async fn health_reflects_mock_and_cache() {
        let f = fixture(vec![], vec![], MemoryCache::new());
        assert!(f.resolver.health_check());
        assert!(f.resolver.cache_connected().await);
        let f = fixture(vec![], vec![], MemoryCache::closed());
        assert!(!f.resolver.cache_connected().await);
    }
}
