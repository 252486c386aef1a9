//! data.gov.in Agmarknet daily price feed.
//!
//! Prices arrive per quintal and are converted to per kg. The feed carries no
//! coordinates, so every record is pinned to [`GOV_PLACEHOLDER_COORDS`]; distance
//! ranking downstream is therefore meaningless for this source.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{record_from_value, PriceSource};
use crate::config::{Config, GOV_API_TIMEOUT_SECS, GOV_PLACEHOLDER_COORDS};
use crate::error::Result;
use crate::resolver::assemble::format_crop_name;
use crate::types::{MarketRecord, PriceQuery, ResolutionSource};

const KG_PER_QUINTAL: f64 = 100.0;

pub struct AgmarknetSource {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl AgmarknetSource {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GOV_API_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: cfg.agmarknet_api_key.clone(),
            api_url: cfg.agmarknet_api_url.clone(),
        })
    }

    async fn request(&self, commodity: &str, limit: usize) -> Result<serde_json::Value> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("api-key", self.api_key.as_str()),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("filters[commodity]", commodity),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl PriceSource for AgmarknetSource {
    fn kind(&self) -> ResolutionSource {
        ResolutionSource::GovApi
    }

    async fn fetch(&self, query: &PriceQuery) -> Vec<MarketRecord> {
        if self.api_key.is_empty() {
            warn!("[Agmarknet] AGMARKNET_API_KEY not configured, skipping");
            return Vec::new();
        }

        let commodity = format_crop_name(&query.crop);
        info!(crop = %commodity, limit = query.limit, "[Agmarknet] requesting market prices");

        match self.request(&commodity, query.limit).await {
            Ok(body) => {
                let records = parse_records(&body, &commodity);
                if !records.is_empty() {
                    warn!(
                        count = records.len(),
                        "[Agmarknet] records carry placeholder coordinates; distances are approximate"
                    );
                }
                records
            }
            Err(e) => {
                warn!(crop = %commodity, "[Agmarknet] request failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Parses the `records` array of an Agmarknet response body.
pub fn parse_records(body: &serde_json::Value, commodity: &str) -> Vec<MarketRecord> {
    let Some(items) = body.get("records").and_then(|r| r.as_array()) else {
        return Vec::new();
    };
    let (lat, lon) = GOV_PLACEHOLDER_COORDS;
    items
        .iter()
        .filter_map(|v| record_from_value(v, commodity, KG_PER_QUINTAL))
        .map(|mut r| {
            r.latitude = Some(lat);
            r.longitude = Some(lon);
            r
        })
        .collect()
}
