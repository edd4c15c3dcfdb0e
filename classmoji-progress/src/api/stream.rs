//! Server-Sent Events (SSE) for import progress
//!
//! `GET /api/import/stream/:import_id`
//!
//! Streams, as bare `data:` frames:
//! - `connected` (always first)
//! - every buffered event of the import, in publish order
//! - live `step` events
//! - a terminal `done` or `error`, after which the stream closes

use super::validate_import_id;
use crate::error::ApiResult;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
};
use classmoji_common::sse::{progress_event_stream, progress_sse_response};
use tracing::info;

/// GET /api/import/stream/:import_id - SSE progress stream for one import
pub async fn import_progress_stream(
    State(state): State<AppState>,
    Path(import_id): Path<String>,
) -> ApiResult<Response> {
    validate_import_id(&import_id)?;

    info!("New SSE client connected to import {}", import_id);
    let stream = progress_event_stream(state.store.as_ref(), &import_id);

    Ok(progress_sse_response(stream, state.keep_alive))
}
