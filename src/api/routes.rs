use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::auth::AuthUser;
use super::health::HealthState;
use super::latency::{LatencyStats, LatencySummary};
use super::rate_limit::{limit_requests, RateLimiter};
use crate::config::{Config, DEFAULT_MARKET_LIMIT, MAX_MARKET_LIMIT};
use crate::db::profiles::find_user;
use crate::error::AppError;
use crate::resolver::MarketPriceResolver;
use crate::types::{Language, PriceQuery};

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<MarketPriceResolver>,
    pub pool: sqlx::SqlitePool,
    pub jwt_secret: Arc<str>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub limiter: Arc<RateLimiter>,
    pub trust_forwarded_for: bool,
}

impl ApiState {
    pub fn new(cfg: &Config, resolver: MarketPriceResolver, pool: sqlx::SqlitePool) -> Self {
        Self {
            resolver: Arc::new(resolver),
            pool,
            jwt_secret: Arc::from(cfg.jwt_secret.as_str()),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
            limiter: Arc::new(RateLimiter::new(cfg.rate_limit_max, cfg.rate_limit_window_secs)),
            trust_forwarded_for: cfg.trust_forwarded_for,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let market = Router::new()
        .route("/prices", get(get_market_prices))
        .route("/health", get(get_health))
        .route("/clear-cache", post(clear_cache))
        .route("/stats/latency", get(get_stats_latency))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_requests));

    Router::new().nest("/api/market", market).with_state(state)
}

// ---------------------------------------------------------------------------
// Query params
// ---------------------------------------------------------------------------

/// Everything arrives as text; parsing is lenient so bad values fall back to
/// defaults instead of rejecting the request.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesQuery {
    pub crop: Option<String>,
    pub language: Option<String>,
    pub limit: Option<String>,
    pub include_far: Option<String>,
}

/// Invalid or non-positive → default; otherwise capped at the maximum.
pub fn parse_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => (n as usize).min(MAX_MARKET_LIMIT),
        _ => DEFAULT_MARKET_LIMIT,
    }
}

pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("true") | Some("1"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_market_prices(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(params): Query<PricesQuery>,
) -> Result<Json<Value>, AppError> {
    let crop = params
        .crop
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Crop name is required".to_string()))?;

    let profile = find_user(&state.pool, &user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (lat, lon) = profile.farm_location().ok_or_else(|| {
        AppError::BadRequest(
            "User location not set. Please complete your farm profile.".to_string(),
        )
    })?;

    let language = params
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Language::from_code)
        .unwrap_or_else(|| profile.preferred_language());
    let include_far = parse_flag(params.include_far.as_deref());
    let query = PriceQuery {
        crop: crop.to_string(),
        lat,
        lon,
        limit: parse_limit(params.limit.as_deref()),
        language,
    };

    info!(
        user_id = %user.user_id,
        crop = %query.crop,
        lat,
        lon,
        language = query.language.code(),
        limit = query.limit,
        include_far,
        "Fetching market prices"
    );

    let started = Instant::now();
    let resolved = state.resolver.get_market_prices(&query, include_far).await;
    state.latency.record(started.elapsed());
    let resolved = resolved?;
    state.health.record_resolution(resolved.source);

    Ok(Json(json!({
        "success": true,
        "data": resolved.response,
    })))
}

async fn get_health(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let healthy = state.resolver.health_check();
    let cache_connected = state.resolver.cache_connected().await;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(json!({
            "success": healthy,
            "healthy": healthy,
            "service": "market",
            "cacheConnected": cache_connected,
            "resolutions": state.health.resolutions(),
        })),
    )
}

async fn clear_cache(State(state): State<ApiState>, user: AuthUser) -> Json<Value> {
    let deleted = state.resolver.clear_cache().await;
    info!(user_id = %user.user_id, deleted, "Market cache cleared");
    Json(json!({
        "success": true,
        "message": format!("Cleared {deleted} cache entries"),
        "deletedCount": deleted,
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
