//! Last-resort synthetic quotes. No I/O, never empty for `limit >= 1`.

use crate::geo::distance_km;
use crate::resolver::assemble::format_crop_name;
use crate::types::{MarketRecord, MarketRecordWithDistance, PriceQuery};

struct MockMarket {
    name: &'static str,
    lat: f64,
    lon: f64,
    state: &'static str,
}

const MOCK_MARKETS: &[MockMarket] = &[
    MockMarket { name: "Pune Mandi", lat: 18.5204, lon: 73.8567, state: "Maharashtra" },
    MockMarket { name: "Mumbai APMC", lat: 19.0760, lon: 72.8777, state: "Maharashtra" },
    MockMarket { name: "Nashik Market", lat: 19.9975, lon: 73.7898, state: "Maharashtra" },
    MockMarket { name: "Solapur Mandi", lat: 17.6599, lon: 75.9064, state: "Maharashtra" },
];

/// Spread applied either side of the base price for min/max.
const PRICE_SPREAD: f64 = 3.0;

const DEFAULT_BASE_PRICE: f64 = 25.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct MockSource;

impl MockSource {
    pub fn new() -> Self {
        Self
    }

    /// Nearest `query.limit` mock markets, sorted by distance, all at the crop's base price.
    pub fn generate(&self, query: &PriceQuery) -> Vec<MarketRecordWithDistance> {
        let mut markets: Vec<(&MockMarket, f64)> = MOCK_MARKETS
            .iter()
            .map(|m| (m, distance_km(query.lat, query.lon, m.lat, m.lon)))
            .collect();
        markets.sort_by(|a, b| a.1.total_cmp(&b.1));
        markets.truncate(query.limit);

        let base = base_price(&query.crop);
        let commodity = format_crop_name(&query.crop);
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

        markets
            .into_iter()
            .map(|(m, distance_km)| MarketRecordWithDistance {
                record: MarketRecord {
                    commodity: commodity.clone(),
                    market: Some(m.name.to_string()),
                    state: m.state.to_string(),
                    district: m.name.split(' ').next().unwrap_or(m.name).to_string(),
                    min_price: (base - PRICE_SPREAD).max(0.0),
                    max_price: base + PRICE_SPREAD,
                    modal_price: base,
                    arrival_date: today.clone(),
                    latitude: Some(m.lat),
                    longitude: Some(m.lon),
                },
                distance_km,
            })
            .collect()
    }
}

/// Typical wholesale INR/kg per crop.
pub fn base_price(crop: &str) -> f64 {
    match crop.trim().to_lowercase().as_str() {
        "tomato" => 25.0,
        "potato" => 18.0,
        "onion" => 22.0,
        "wheat" => 21.0,
        "rice" => 28.0,
        "cotton" => 55.0,
        "sugarcane" => 3.0,
        "maize" => 18.0,
        "soybean" => 42.0,
        "groundnut" => 50.0,
        "chili" => 80.0,
        "banana" => 15.0,
        "mango" => 40.0,
        _ => DEFAULT_BASE_PRICE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;

    fn query(crop: &str, lat: f64, lon: f64, limit: usize) -> PriceQuery {
        PriceQuery { crop: crop.to_string(), lat, lon, limit, language: Language::En }
    }

    #[test]
    fn pune_requester_sees_pune_first() {
        let records = MockSource::new().generate(&query("tomato", 18.5204, 73.8567, 5));
        let names: Vec<_> = records.iter().map(|r| r.record.market.clone().unwrap()).collect();
        assert_eq!(names, ["Pune Mandi", "Mumbai APMC", "Nashik Market", "Solapur Mandi"]);
        assert!(records[0].distance_km < 1e-9);
        assert_eq!(records[0].record.district, "Pune");
    }

    #[test]
    fn prices_are_base_plus_minus_spread() {
        let records = MockSource::new().generate(&query("tomato", 18.5204, 73.8567, 2));
        for r in &records {
            assert_eq!(r.record.min_price, 22.0);
            assert_eq!(r.record.modal_price, 25.0);
            assert_eq!(r.record.max_price, 28.0);
        }
    }

    #[test]
    fn limit_truncates_and_zero_limit_is_empty() {
        let mock = MockSource::new();
        assert_eq!(mock.generate(&query("onion", 19.9975, 73.7898, 1)).len(), 1);
        assert_eq!(
            mock.generate(&query("onion", 19.9975, 73.7898, 1))[0].record.market.as_deref(),
            Some("Nashik Market")
        );
        assert!(mock.generate(&query("onion", 19.9975, 73.7898, 0)).is_empty());
    }

    #[test]
    fn cheap_crop_min_price_never_negative() {
        let records = MockSource::new().generate(&query("sugarcane", 18.5, 73.8, 1));
        assert_eq!(records[0].record.min_price, 0.0);
        assert_eq!(records[0].record.modal_price, 3.0);
    }

    #[test]
    fn every_crop_is_fixed_base_plus_minus_three() {
        for crop in ["onion", "wheat", "mango", "dragonfruit"] {
            let base = base_price(crop);
            for r in MockSource::new().generate(&query(crop, 18.5204, 73.8567, 4)) {
                assert_eq!(r.record.modal_price, base, "{crop}");
                assert_eq!(r.record.min_price, base - 3.0, "{crop}");
                assert_eq!(r.record.max_price, base + 3.0, "{crop}");
            }
        }
    }

    #[test]
    fn unknown_crop_uses_default_base() {
        assert_eq!(base_price("dragonfruit"), 25.0);
        assert_eq!(base_price("  Wheat "), 21.0);
    }
}
