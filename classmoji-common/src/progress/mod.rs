//! Import progress channels
//!
//! Producers (import jobs) publish ordered [`ProgressEvent`]s keyed by import
//! identifier; consumers (SSE connections) subscribe and receive the buffered
//! history followed by live events.
//!
//! Callers depend on the [`ProgressStore`] trait rather than on the
//! in-memory [`ProgressStreamManager`] so the registry can be backed by an
//! external broker without changing the producer or transport code.
//!
//! # Examples
//!
//! ```
//! use classmoji_common::progress::{ProgressConfig, ProgressStore, ProgressStreamManager};
//! use classmoji_common::ProgressEvent;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = ProgressStreamManager::new(ProgressConfig::default());
//!
//! store.publish("import-1", ProgressEvent::step("Importing roster", 1, 2));
//!
//! // Late joiner receives the buffered step first
//! let _subscription = store.subscribe(
//!     "import-1",
//!     Box::new(|event: &ProgressEvent| println!("{}", event.event_type())),
//! );
//!
//! store.publish("import-1", ProgressEvent::done("result-42"));
//! # }
//! ```

mod manager;

pub use manager::ProgressStreamManager;

use crate::events::ProgressEvent;
use serde::Deserialize;
use std::time::Duration;

/// Channel lifetime settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    /// Delay between a terminal event and channel removal
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Absolute channel lifetime, closed or not
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_max_age_secs() -> u64 {
    3_600
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl ProgressConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Receiver of progress events for one channel
///
/// `deliver` is invoked synchronously while the store is publishing, so
/// implementations must not block and must not call back into the store.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: &ProgressEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn deliver(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Handle for one registered subscriber
///
/// Owns exactly one cancellation. [`Subscription::cancel`] is idempotent,
/// and dropping the handle cancels it, so an SSE stream that is dropped on
/// client disconnect unsubscribes automatically.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a cancellation function
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to cancel (channel already closed)
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    /// Stop receiving events; later calls do nothing
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Channel store for import progress
///
/// Channels are created on demand by either `publish` or `subscribe`.
/// Events for one import are delivered to every subscriber in publish order.
pub trait ProgressStore: Send + Sync {
    /// Append `event` to the channel and deliver it to current subscribers
    ///
    /// Returns `false` (and does nothing) when the channel is already closed
    /// by a terminal event.
    fn publish(&self, import_id: &str, event: ProgressEvent) -> bool;

    /// Replay buffered events to `subscriber`, then register it for live ones
    fn subscribe(&self, import_id: &str, subscriber: Box<dyn Subscriber>) -> Subscription;

    /// Tear down a channel immediately; returns whether it existed
    fn remove(&self, import_id: &str) -> bool;

    /// Number of live channels
    fn channel_count(&self) -> usize;

    /// Whether the channel exists and has seen a terminal event
    fn is_closed(&self, import_id: &str) -> bool;
}
