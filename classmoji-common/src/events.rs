//! Import progress event definitions
//!
//! Events are published by import jobs and serialized as JSON for SSE
//! transmission. The wire shape is consumed by the browser client:
//!
//! ```json
//! {"type":"step","step":"Importing roster","current":1,"total":5,"filename":"roster.csv"}
//! {"type":"done","resultId":"xyz"}
//! ```

use serde::{Deserialize, Serialize};

/// Progress event for a single import
///
/// `Done` and `Error` are terminal: no further events follow them on the
/// same channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// First frame of every SSE stream, emitted by the transport
    #[serde(rename_all = "camelCase")]
    Connected {
        import_id: String,
        /// Milliseconds since the UNIX epoch
        timestamp: i64,
    },

    /// One step of the import finished
    Step {
        /// Human-readable step label
        step: String,
        current: u32,
        total: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// Import finished successfully
    #[serde(rename_all = "camelCase")]
    Done { result_id: String },

    /// Import failed
    Error { message: String },
}

impl ProgressEvent {
    /// Connected event stamped with the current time
    pub fn connected(import_id: impl Into<String>) -> Self {
        Self::Connected {
            import_id: import_id.into(),
            timestamp: crate::time::now_millis(),
        }
    }

    /// Step event without a filename
    pub fn step(step: impl Into<String>, current: u32, total: u32) -> Self {
        Self::Step {
            step: step.into(),
            current,
            total,
            filename: None,
        }
    }

    pub fn done(result_id: impl Into<String>) -> Self {
        Self::Done {
            result_id: result_id.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// True for `done` and `error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Event type name as it appears in the `type` field
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Step { .. } => "step",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
