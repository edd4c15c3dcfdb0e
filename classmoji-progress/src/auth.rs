//! Session middleware
//!
//! Sessions are validated by the Classmoji web app; this service only
//! checks the presented token through the configured [`SessionVerifier`].
//! Applied to the import routes only; `/health` stays public.
//!
//! [`SessionVerifier`]: classmoji_common::session::SessionVerifier

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// Reject requests without a valid session with `401`
pub async fn session_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.verifier.verify(request.headers()) {
        warn!("Rejected {} {}: no valid session", request.method(), request.uri().path());
        return Err(ApiError::Unauthorized("valid session required".to_string()));
    }

    Ok(next.run(request).await)
}
