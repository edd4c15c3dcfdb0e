//! In-memory progress channel store

use super::{ProgressConfig, ProgressStore, Subscriber, Subscription};
use crate::events::ProgressEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info};

/// Process-local progress channel registry
///
/// One registry per server instance: the producer and the SSE endpoint must
/// be served by the same process. Cloning shares the registry.
///
/// Every registry mutation happens under one mutex and never awaits, so a
/// subscriber added while an event is being published sees that event
/// exactly once (either in the replay or live).
///
/// Cleanup timers run on the Tokio runtime captured at construction and are
/// aborted when their channel is removed.
#[derive(Clone)]
pub struct ProgressStreamManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ProgressConfig,
    channels: Mutex<HashMap<String, Channel>>,
    next_generation: AtomicU64,
    next_subscriber_id: AtomicU64,
    runtime: Handle,
}

struct Channel {
    /// Distinguishes a recreated channel from the one a timer was armed for
    generation: u64,
    /// Registration order is delivery order
    subscribers: Vec<(u64, Box<dyn Subscriber>)>,
    buffer: Vec<ProgressEvent>,
    closed: bool,
    expiry_task: Option<AbortHandle>,
    grace_task: Option<AbortHandle>,
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
        if let Some(task) = self.grace_task.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RemovalReason {
    GracePeriodElapsed,
    MaxAgeReached,
}

impl ProgressStreamManager {
    /// Create a registry bound to the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`ProgressStreamManager::with_runtime`] in that case.
    pub fn new(config: ProgressConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    /// Create a registry whose cleanup timers run on `runtime`
    pub fn with_runtime(config: ProgressConfig, runtime: Handle) -> Self {
        info!(
            "Progress stream manager initialized (grace period {:?}, max age {:?})",
            config.grace_period(),
            config.max_age()
        );
        Self {
            inner: Arc::new(Inner {
                config,
                channels: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                next_subscriber_id: AtomicU64::new(1),
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.inner.config
    }

    /// Number of events buffered for a channel (0 if absent)
    pub fn buffered_len(&self, import_id: &str) -> usize {
        self.inner
            .lock()
            .get(import_id)
            .map_or(0, |channel| channel.buffer.len())
    }

    /// Number of live subscribers on a channel (0 if absent)
    pub fn subscriber_count(&self, import_id: &str) -> usize {
        self.inner
            .lock()
            .get(import_id)
            .map_or(0, |channel| channel.subscribers.len())
    }

    fn channel<'a>(
        &self,
        channels: &'a mut HashMap<String, Channel>,
        import_id: &str,
    ) -> &'a mut Channel {
        channels
            .entry(import_id.to_string())
            .or_insert_with(|| self.create_channel(import_id))
    }

    fn create_channel(&self, import_id: &str) -> Channel {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let expiry_task = self.schedule_removal(
            import_id,
            generation,
            self.inner.config.max_age(),
            RemovalReason::MaxAgeReached,
        );
        debug!("Created progress channel {} (generation {})", import_id, generation);

        Channel {
            generation,
            subscribers: Vec::new(),
            buffer: Vec::new(),
            closed: false,
            expiry_task: Some(expiry_task),
            grace_task: None,
        }
    }

    fn schedule_removal(
        &self,
        import_id: &str,
        generation: u64,
        delay: Duration,
        reason: RemovalReason,
    ) -> AbortHandle {
        let registry = Arc::downgrade(&self.inner);
        let import_id = import_id.to_string();

        self.inner
            .runtime
            .spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(inner) = registry.upgrade() {
                    inner.remove_generation(&import_id, generation, reason);
                }
            })
            .abort_handle()
    }

    fn unsubscribe_fn(&self, import_id: &str, generation: u64, subscriber_id: u64) -> Subscription {
        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        let import_id = import_id.to_string();

        Subscription::new(move || {
            // Registry gone or channel removed: nothing to do
            let Some(inner) = registry.upgrade() else {
                return;
            };
            let mut channels = inner.lock();
            if let Some(channel) = channels.get_mut(&import_id) {
                if channel.generation == generation {
                    channel.subscribers.retain(|(id, _)| *id != subscriber_id);
                    debug!(
                        "Subscriber {} left progress channel {} ({} remaining)",
                        subscriber_id,
                        import_id,
                        channel.subscribers.len()
                    );
                }
            }
        })
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        // A panicking subscriber must not take the whole registry down
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_generation(&self, import_id: &str, generation: u64, reason: RemovalReason) {
        let removed = {
            let mut channels = self.lock();
            let armed_for_this_channel = channels
                .get(import_id)
                .is_some_and(|channel| channel.generation == generation);
            if armed_for_this_channel {
                channels.remove(import_id)
            } else {
                None
            }
        };

        // Dropped outside the lock: subscriber handles may own resources
        if let Some(channel) = removed {
            info!(
                "Removed progress channel {} ({:?}, {} events, {} subscribers)",
                import_id,
                reason,
                channel.buffer.len(),
                channel.subscribers.len()
            );
        }
    }
}

impl ProgressStore for ProgressStreamManager {
    fn publish(&self, import_id: &str, event: ProgressEvent) -> bool {
        let mut channels = self.inner.lock();
        let channel = self.channel(&mut channels, import_id);

        if channel.closed {
            debug!(
                "Ignoring {} event for closed progress channel {}",
                event.event_type(),
                import_id
            );
            return false;
        }

        for (_, subscriber) in &channel.subscribers {
            subscriber.deliver(&event);
        }

        if event.is_terminal() {
            channel.closed = true;
            let generation = channel.generation;
            channel.grace_task = Some(self.schedule_removal(
                import_id,
                generation,
                self.inner.config.grace_period(),
                RemovalReason::GracePeriodElapsed,
            ));
            info!(
                "Progress channel {} closed by {} event",
                import_id,
                event.event_type()
            );
        }

        channel.buffer.push(event);
        true
    }

    fn subscribe(&self, import_id: &str, subscriber: Box<dyn Subscriber>) -> Subscription {
        let mut channels = self.inner.lock();
        let channel = self.channel(&mut channels, import_id);

        for event in &channel.buffer {
            subscriber.deliver(event);
        }

        if channel.closed {
            debug!(
                "Replayed {} events to late subscriber of closed channel {}",
                channel.buffer.len(),
                import_id
            );
            return Subscription::inert();
        }

        let subscriber_id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let generation = channel.generation;
        channel.subscribers.push((subscriber_id, subscriber));
        debug!(
            "Subscriber {} joined progress channel {} (replayed {} events)",
            subscriber_id,
            import_id,
            channel.buffer.len()
        );
        drop(channels);

        self.unsubscribe_fn(import_id, generation, subscriber_id)
    }

    fn remove(&self, import_id: &str) -> bool {
        let removed = self.inner.lock().remove(import_id);
        match removed {
            Some(channel) => {
                info!(
                    "Progress channel {} torn down ({} subscribers detached)",
                    import_id,
                    channel.subscribers.len()
                );
                true
            }
            None => false,
        }
    }

    fn channel_count(&self) -> usize {
        self.inner.lock().len()
    }

    fn is_closed(&self, import_id: &str) -> bool {
        self.inner
            .lock()
            .get(import_id)
            .is_some_and(|channel| channel.closed)
    }
}
