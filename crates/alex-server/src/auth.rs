//! Bearer-credential extraction: all authenticated endpoints require a
//! bearer credential via cookie or header; legacy `?access_token=` is
//! accepted with a deprecation warning.
//!
//! The authentication/OAuth layer itself sits elsewhere — this crate only
//! needs *something* that turns a request into a `user_id`. The
//! credential value is taken as the `user_id` directly: a narrow stand-in
//! for whatever real identity provider sits in front of this service in
//! production, not a design this runtime prescribes.

use axum::extract::Query;
use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use alex_engine::EngineError;

const COOKIE_NAME: &str = "alex_session";

#[derive(Debug, Deserialize)]
pub struct LegacyTokenQuery {
    pub access_token: Option<String>,
}

/// Resolve the caller's `user_id` from, in order: the `alex_session`
/// cookie, an `Authorization: Bearer` header, then the legacy
/// `?access_token=` query parameter (logged once per request as deprecated).
pub fn extract_user_id(headers: &HeaderMap, query: &Query<LegacyTokenQuery>) -> Result<String, ApiError> {
    if let Some(cookie_header) = headers.get(axum::http::header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            if let Some(value) = find_cookie(cookie_str, COOKIE_NAME) {
                return Ok(value);
            }
        }
    }

    if let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| ApiError(EngineError::Unauthorized))?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.to_string());
        }
        return Err(ApiError(EngineError::Unauthorized));
    }

    if let Some(token) = &query.access_token {
        warn!("request authenticated via legacy ?access_token= query parameter");
        return Ok(token.clone());
    }

    Err(ApiError(EngineError::Unauthorized))
}

fn find_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_named_cookie_among_several() {
        let header = "other=1; alex_session=user-42; third=abc";
        assert_eq!(find_cookie(header, COOKIE_NAME), Some("user-42".to_string()));
    }

    #[test]
    fn missing_cookie_returns_none() {
        assert_eq!(find_cookie("other=1", COOKIE_NAME), None);
    }
}
