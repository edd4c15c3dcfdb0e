//! Session token verification
//!
//! Sessions are issued and validated by the Classmoji web apps; the
//! streaming services only check that a request carries the token the
//! deployment was configured with.
//!
//! # Design Principle
//!
//! Pure functions over `HeaderMap` only. Each service wraps these with its
//! own axum middleware.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

/// Cookie carrying the session token for browser `EventSource` clients,
/// which cannot set an `Authorization` header
pub const SESSION_COOKIE: &str = "classmoji_session";

/// Decides whether a request belongs to an authenticated session
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, headers: &HeaderMap) -> bool;
}

/// Accepts every request (no token configured)
#[derive(Debug, Clone, Default)]
pub struct DisabledVerifier;

impl SessionVerifier for DisabledVerifier {
    fn verify(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Accepts requests presenting one configured token
#[derive(Clone)]
pub struct SharedTokenVerifier {
    token: String,
}

impl SharedTokenVerifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for SharedTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTokenVerifier")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl SessionVerifier for SharedTokenVerifier {
    fn verify(&self, headers: &HeaderMap) -> bool {
        extract_token(headers).is_some_and(|presented| constant_time_eq(presented, &self.token))
    }
}

/// Find the session token in `Authorization: Bearer` or the session cookie
///
/// The header wins when both are present.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token);
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
