//! Producer endpoint for import jobs
//!
//! `POST /api/import/:import_id/events` with a progress event body:
//!
//! ```json
//! {"type":"step","step":"Creating repositories","current":2,"total":5}
//! ```

use super::validate_import_id;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use classmoji_common::ProgressEvent;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// False when the import already finished and the event was dropped
    pub accepted: bool,
}

/// POST /api/import/:import_id/events - publish one progress event
pub async fn publish_progress(
    State(state): State<AppState>,
    Path(import_id): Path<String>,
    payload: Result<Json<ProgressEvent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    validate_import_id(&import_id)?;

    let Json(event) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if matches!(event, ProgressEvent::Connected { .. }) {
        return Err(ApiError::BadRequest(
            "connected events are emitted by the stream itself".to_string(),
        ));
    }

    let event_type = event.event_type();
    let accepted = state.store.publish(&import_id, event);
    debug!(
        "Published {} event for import {} (accepted: {})",
        event_type, import_id, accepted
    );

    Ok((StatusCode::ACCEPTED, Json(PublishResponse { accepted })))
}
