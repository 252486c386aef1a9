mod api;
mod cache;
mod config;
mod db;
mod error;
mod geo;
mod resolver;
mod sources;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::cache::{PriceCache, RedisCache};
use crate::config::Config;
use crate::error::Result;
use crate::resolver::MarketPriceResolver;
use crate::sources::{AgmarknetSource, GroqSource, PriceSource};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Profile database ---
    let pool = db::connect(&cfg.db_path).await?;

    // --- Response cache (optional) ---
    let cache: Arc<dyn PriceCache> = Arc::new(RedisCache::connect(&cfg.redis_url).await);

    // --- Price sources, in fallback order ---
    if cfg.groq_api_key.is_empty() {
        warn!("GROQ_API_KEY not set: LLM prices disabled");
    }
    if cfg.agmarknet_api_key.is_empty() {
        warn!("AGMARKNET_API_KEY not set: government prices disabled");
    }
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(GroqSource::new(&cfg)?),
        Arc::new(AgmarknetSource::new(&cfg)?),
    ];
    let resolver = MarketPriceResolver::new(sources, cache);

    if cfg.jwt_secret.is_empty() {
        warn!("JWT_SECRET not set: every authenticated request will be rejected");
    }
    let state = ApiState::new(&cfg, resolver, pool);

    // Rate-limit windows (background, once per window)
    let limiter = Arc::clone(&state.limiter);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
        loop {
            tick.tick().await;
            let purged = limiter.purge_expired();
            if purged > 0 {
                info!(purged, "Expired rate-limit windows dropped");
            }
        }
    });

    // --- HTTP API server ---
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
