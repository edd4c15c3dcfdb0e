//! HTTP API handlers for classmoji-progress

pub mod health;
pub mod publish;
pub mod stream;

pub use health::health_routes;
pub use publish::publish_progress;
pub use stream::import_progress_stream;

use crate::error::{ApiError, ApiResult};
use classmoji_common::uuid_utils::is_hyphenated_uuid;

/// Import ids must be canonical hyphenated UUIDs
pub(crate) fn validate_import_id(import_id: &str) -> ApiResult<()> {
    if is_hyphenated_uuid(import_id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "import id must be a UUID, got '{}'",
            import_id
        )))
    }
}
