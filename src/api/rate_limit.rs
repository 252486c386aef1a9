//! Fixed-window per-client request limiter for /api/market/*.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use super::auth::{bearer_token, verify_token};
use super::routes::ApiState;
use crate::error::{AppError, Result};

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    max: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max: u32, window_secs: u64) -> Self {
        Self {
            max,
            window: Duration::from_secs(window_secs),
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, count: 0 });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        if entry.count >= self.max {
            let remaining = self.window.saturating_sub(now.saturating_duration_since(entry.started));
            return Err(AppError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }
        entry.count += 1;
        Ok(())
    }

    /// Drops windows that have fully elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - self.windows.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Authenticated callers are limited per user, everyone else per peer address.
/// `X-Forwarded-For` is client-controlled and only honoured when `trust_forwarded_for`.
fn client_key(req: &Request, jwt_secret: &str, trust_forwarded_for: bool) -> String {
    if let Ok(token) = bearer_token(req.headers()) {
        if let Ok(claims) = verify_token(token, jwt_secret, chrono::Utc::now().timestamp()) {
            return format!("user:{}", claims.user_id);
        }
    }
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return format!("ip:{ip}");
        }
    }
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "anonymous".to_string(),
    }
}

pub async fn limit_requests(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let key = client_key(&req, &state.jwt_secret, state.trust_forwarded_for);
    if let Err(e) = state.limiter.check(&key) {
        warn!(client = %key, path = %req.uri().path(), "Rate limit exceeded");
        return Err(e);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request_from(peer: &str, forwarded_for: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/market/health");
        if let Some(xff) = forwarded_for {
            builder = builder.header("x-forwarded-for", xff);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn forwarded_for_ignored_by_default() {
        let a = request_from("203.0.113.7:5000", Some("10.0.0.1"));
        let b = request_from("203.0.113.7:5001", Some("10.0.0.2"));
        assert_eq!(client_key(&a, "s", false), "ip:203.0.113.7");
        assert_eq!(client_key(&a, "s", false), client_key(&b, "s", false));
    }

    #[test]
    fn forwarded_for_used_when_trusted() {
        let req = request_from("127.0.0.1:5000", Some("198.51.100.4, 127.0.0.1"));
        assert_eq!(client_key(&req, "s", true), "ip:198.51.100.4");
        let bare = request_from("127.0.0.1:5000", None);
        assert_eq!(client_key(&bare, "s", true), "ip:127.0.0.1");
    }

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("a", t0).is_ok());
        }
        match limiter.check_at("a", t0 + Duration::from_secs(20)) {
            Err(AppError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 40),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, 60);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_ok());
        assert!(limiter.check_at("a", t0).is_err());
        assert!(limiter.check_at("b", t0).is_ok());
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, 60);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_ok());
        assert!(limiter.check_at("a", t0 + Duration::from_secs(59)).is_err());
        assert!(limiter.check_at("a", t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn purge_keeps_live_windows() {
        let limiter = RateLimiter::new(5, 60);
        limiter.check("a").unwrap();
        assert_eq!(limiter.purge_expired(), 0);

        let expired = RateLimiter::new(5, 0);
        expired.check("a").unwrap();
        assert_eq!(expired.purge_expired(), 1);
    }
}
