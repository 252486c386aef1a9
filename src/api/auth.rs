//! Bearer access-token verification (HS256 JWT).
//!
//! Tokens are issued by the auth service; this service only checks the
//! signature and expiry and reads the subject.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::routes::ApiState;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const INVALID_TOKEN: &str = "Invalid or expired access token";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Authenticated caller, extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self> {
        let token = bearer_token(&parts.headers)?;
        let claims = verify_token(token, &state.jwt_secret, chrono::Utc::now().timestamp())?;
        Ok(AuthUser { user_id: claims.user_id })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Authorization token required".to_string()))?;
    let token = value["Bearer ".len()..].trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("Invalid authorization header format".to_string()));
    }
    Ok(token)
}

/// Checks signature, algorithm and expiry. `now` is unix seconds.
pub fn verify_token(token: &str, secret: &str, now: i64) -> Result<Claims> {
    let invalid = || AppError::Unauthorized(INVALID_TOKEN.to_string());
    if secret.is_empty() {
        return Err(invalid());
    }

    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let header: Header = decode_segment(header_b64).ok_or_else(invalid)?;
    if header.alg != "HS256" {
        return Err(invalid());
    }

    let signature = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| invalid())?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| invalid())?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let claims: Claims = decode_segment(payload_b64).ok_or_else(invalid)?;
    if now >= claims.exp {
        return Err(invalid());
    }
    Ok(claims)
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}
