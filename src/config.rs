use crate::error::{AppError, Result};

pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const AGMARKNET_API_URL: &str =
    "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070";

/// Resolved responses live in Redis for 6 hours.
pub const CACHE_TTL_SECS: u64 = 21_600;

/// Every market cache key starts with this prefix; clear-cache deletes `market:*`.
pub const CACHE_KEY_PREFIX: &str = "market";

pub const DEFAULT_MARKET_LIMIT: usize = 5;

/// Hard cap on markets per response, applied at the HTTP boundary.
pub const MAX_MARKET_LIMIT: usize = 10;

pub const LLM_TIMEOUT_SECS: u64 = 20;
pub const GOV_API_TIMEOUT_SECS: u64 = 10;

/// Agmarknet publishes no coordinates; every record is pinned near the
/// geographic center of India, so distance ranking is meaningless for it.
pub const GOV_PLACEHOLDER_COORDS: (f64, f64) = (20.0, 78.0);

/// Days of synthetic price history attached to every response.
pub const PRICE_HISTORY_DAYS: i64 = 30;

/// Rate limit on /api/market/* per client.
pub const RATE_LIMIT_MAX: u32 = 30;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub db_path: String,
    pub redis_url: String,
    /// HS256 secret for access tokens (JWT_SECRET). Empty rejects every token.
    pub jwt_secret: String,
    /// Groq chat-completions key (GROQ_API_KEY). Empty disables the LLM source.
    pub groq_api_key: String,
    pub groq_api_url: String,
    pub groq_model: String,
    /// data.gov.in key (AGMARKNET_API_KEY). Empty disables the government source.
    pub agmarknet_api_key: String,
    pub agmarknet_api_url: String,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    /// Key anonymous clients on `X-Forwarded-For` (TRUST_FORWARDED_FOR). Only
    /// safe behind a proxy that overwrites the header; off by default.
    pub trust_forwarded_for: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("PORT must be a valid port number".to_string()))?,
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "farmly.db".to_string()),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            groq_api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_api_url: std::env::var("GROQ_API_URL")
                .unwrap_or_else(|_| GROQ_API_URL.to_string()),
            groq_model: std::env::var("GROQ_MODEL").unwrap_or_else(|_| GROQ_MODEL.to_string()),
            agmarknet_api_key: std::env::var("AGMARKNET_API_KEY").unwrap_or_default(),
            agmarknet_api_url: std::env::var("AGMARKNET_API_URL")
                .unwrap_or_else(|_| AGMARKNET_API_URL.to_string()),
            rate_limit_max: std::env::var("RATE_LIMIT_MAX")
                .unwrap_or_else(|_| RATE_LIMIT_MAX.to_string())
                .parse::<u32>()
                .unwrap_or(RATE_LIMIT_MAX),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| RATE_LIMIT_WINDOW_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(RATE_LIMIT_WINDOW_SECS),
            trust_forwarded_for: matches!(
                std::env::var("TRUST_FORWARDED_FOR").as_deref().map(str::trim),
                Ok("true") | Ok("1")
            ),
        })
    }
}
