//! Server-Sent Events (SSE) utilities
//!
//! Turns a progress channel subscription into an axum SSE response.
//! Each event is sent as a bare `data: <json>\n\n` frame (no `event:` line)
//! so the browser handles everything in `onmessage`.

use crate::events::ProgressEvent;
use crate::progress::ProgressStore;
use axum::http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONNECTION};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Headers sent with every progress stream
///
/// `Content-Type: text/event-stream` is set by [`Sse`] itself.
pub fn stream_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform")),
        (CONNECTION, HeaderValue::from_static("keep-alive")),
        // nginx-style proxies buffer responses unless told otherwise
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ]
}

/// Encode one event as an SSE data frame
///
/// Returns `None` (and logs) if the event cannot be serialized; the caller
/// drops the frame and keeps the connection open.
pub fn frame(event: &ProgressEvent) -> Option<Event> {
    match Event::default().json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("SSE: Failed to encode {} event: {}", event.event_type(), e);
            None
        }
    }
}

/// Subscribe to `import_id` and stream its events
///
/// The stream yields a `connected` frame, then the channel's buffered
/// history, then live events, and ends after a terminal event or when the
/// channel is torn down. The subscription is owned by the stream, so
/// dropping the stream (client disconnect) unsubscribes.
pub fn progress_event_stream(
    store: &dyn ProgressStore,
    import_id: &str,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let connected = ProgressEvent::connected(import_id);

    let subscription = store.subscribe(
        import_id,
        Box::new(move |event: &ProgressEvent| {
            // Receiver gone means the stream was dropped; cancel follows
            let _ = tx.send(event.clone());
        }),
    );
    let import_id = import_id.to_string();

    async_stream::stream! {
        let _subscription = subscription;

        if let Some(connected) = frame(&connected) {
            yield Ok(connected);
        }

        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            if let Some(data) = frame(&event) {
                yield Ok(data);
            }
            if terminal {
                debug!("SSE: {} event ends progress stream {}", event.event_type(), import_id);
                break;
            }
        }

        debug!("SSE: Progress stream {} finished", import_id);
    }
}

/// Wrap a progress stream into a full SSE response with keep-alive comments
pub fn progress_sse_response<S>(stream: S, keep_alive: Duration) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("heartbeat"));
    (stream_headers(), sse).into_response()
}
