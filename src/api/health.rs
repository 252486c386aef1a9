//! Shared counters behind /api/market/health.
//! Updated by the price handler.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::types::ResolutionSource;

/// Shared health metrics. Handlers write, the health endpoint reads.
#[derive(Default)]
pub struct HealthState {
    pub llm_resolutions: AtomicU64,
    pub gov_resolutions: AtomicU64,
    pub cache_resolutions: AtomicU64,
    pub mock_resolutions: AtomicU64,
}

/// How many responses each stage of the fallback chain has served.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCounts {
    pub llm: u64,
    pub gov_api: u64,
    pub cache: u64,
    pub mock: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_resolution(&self, source: ResolutionSource) {
        let counter = match source {
            ResolutionSource::Llm => &self.llm_resolutions,
            ResolutionSource::GovApi => &self.gov_resolutions,
            ResolutionSource::Cache => &self.cache_resolutions,
            ResolutionSource::Mock => &self.mock_resolutions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resolutions(&self) -> ResolutionCounts {
        ResolutionCounts {
            llm: self.llm_resolutions.load(Ordering::Relaxed),
            gov_api: self.gov_resolutions.load(Ordering::Relaxed),
            cache: self.cache_resolutions.load(Ordering::Relaxed),
            mock: self.mock_resolutions.load(Ordering::Relaxed),
        }
    }
}
