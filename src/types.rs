use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw market records (adapter output)
// ---------------------------------------------------------------------------

/// One commodity quote as produced by a price source. Prices are INR per kg.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRecord {
    pub commodity: String,
    pub market: Option<String>,
    pub state: String,
    pub district: String,
    pub min_price: f64,
    pub max_price: f64,
    pub modal_price: f64,
    /// Free-form: "TODAY", "15/03/2024", "2024-03-15", RFC 3339, ...
    pub arrival_date: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketRecordWithDistance {
    pub record: MarketRecord,
    pub distance_km: f64,
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// What every price source is asked for.
#[derive(Debug, Clone)]
pub struct PriceQuery {
    pub crop: String,
    pub lat: f64,
    pub lon: f64,
    pub limit: usize,
    pub language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Hi,
    Ta,
    Ml,
    Te,
    Kn,
}

impl Language {
    /// Unknown codes resolve to English.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "hi" => Language::Hi,
            "ta" => Language::Ta,
            "ml" => Language::Ml,
            "te" => Language::Te,
            "kn" => Language::Kn,
            _ => Language::En,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ta => "ta",
            Language::Ml => "ml",
            Language::Te => "te",
            Language::Kn => "kn",
        }
    }

    /// English name used when instructing the LLM.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hi => "Hindi",
            Language::Ta => "Tamil",
            Language::Ml => "Malayalam",
            Language::Te => "Telugu",
            Language::Kn => "Kannada",
        }
    }
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Short-term movement of a single market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketTrend {
    Up,
    Down,
    Stable,
}

/// Overall direction of the price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Rising,
    Falling,
    Stable,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMarket {
    pub name: String,
    /// "{district}, {state}"
    pub location: String,
    /// Kilometres, rounded to one decimal.
    pub distance: f64,
    pub price: f64,
    pub unit: String,
    /// ISO-8601 UTC.
    pub date: String,
    pub trend: MarketTrend,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub market: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub average: f64,
    pub highest: MarketQuote,
    pub lowest: MarketQuote,
    pub trend: PriceTrend,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryEntry {
    /// YYYY-MM-DD
    pub date: String,
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPriceResponse {
    pub crop: String,
    pub markets: Vec<DisplayMarket>,
    pub price_analysis: PriceAnalysis,
    pub price_history: Vec<PriceHistoryEntry>,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Resolution bookkeeping
// ---------------------------------------------------------------------------

/// Which stage of the fallback chain produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Llm,
    GovApi,
    Cache,
    Mock,
}

impl ResolutionSource {
    /// Only fresh upstream data is worth caching.
    pub fn is_cacheable(self) -> bool {
        matches!(self, ResolutionSource::Llm | ResolutionSource::GovApi)
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionSource::Llm => "llm",
            ResolutionSource::GovApi => "gov_api",
            ResolutionSource::Cache => "cache",
            ResolutionSource::Mock => "mock",
        };
        write!(f, "{s}")
    }
}
