//! Event Broadcaster (component C6, spec §4.6): per-session, multi-
//! subscriber fan-out with bounded buffers and a drop-oldest policy.

mod session;
mod subscriber;

use std::sync::Arc;

use alex_events::{Event, EventKind, EventObserver};
use dashmap::DashMap;
use parking_lot::RwLock;

use session::SessionChannel;
pub use subscriber::SubscriberQueue;

#[derive(Debug, Clone, Copy)]
pub struct BroadcasterConfig {
    /// Capacity of the per-session ingest channel (spec §4.6: default 256).
    pub ingest_capacity: usize,
    /// Capacity of each subscriber's own bounded queue (spec §3: default 100).
    pub subscriber_queue_size: usize,
    /// How many past events are replayed to a newly-subscribed consumer
    /// (spec §4.6: default 50).
    pub replay_window: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 256,
            subscriber_queue_size: 100,
            replay_window: 50,
        }
    }
}

/// A live subscription to one session's event stream. Dropping this
/// handle without calling nothing special still leaves the queue
/// registered — callers should hold it for the connection's lifetime and
/// let the broadcaster's `unsubscribe` (or `Drop`) detach it.
pub struct Subscriber {
    session_id: String,
    queue: Arc<SubscriberQueue>,
    broadcaster: Arc<BroadcasterInner>,
}

impl Subscriber {
    pub async fn recv(&self) -> Option<Event> {
        self.queue.recv().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Number of events replayed (buffered) at subscribe time, for the
    /// SSE `connected` frame's `replay` field (spec §6).
    pub fn replayed_count(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(&self.session_id, self.queue.id());
    }
}

struct BroadcasterInner {
    sessions: DashMap<String, Arc<SessionChannel>>,
    config: BroadcasterConfig,
    /// Best-effort audit sinks (spec §4.1's `EventObserver`): fed every
    /// event alongside the transport fan-out, never allowed to block or
    /// fail a `publish` call.
    observers: RwLock<Vec<Arc<dyn EventObserver>>>,
}

impl BroadcasterInner {
    fn session(&self, session_id: &str) -> Arc<SessionChannel> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionChannel::spawn(session_id.to_string(), &self.config))
            .clone()
    }

    fn unsubscribe(&self, session_id: &str, subscriber_id: u64) {
        if let Some(channel) = self.sessions.get(session_id) {
            channel.unsubscribe(subscriber_id);
        }
    }
}

/// Per-session event fan-out (spec §4.6). Cheap to clone — internally
/// `Arc`-backed, safe to share across the Coordinator's worker pool.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    pub fn new(config: BroadcasterConfig) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                sessions: DashMap::new(),
                config,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a best-effort audit observer (spec §4.1's `EventObserver`):
    /// from this point on it receives every event published on this
    /// broadcaster, independent of transport subscribers.
    pub fn register_observer(&self, observer: Arc<dyn EventObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Publish an event to a session's ingest channel. Non-blocking
    /// (best-effort) except for terminal events, which get a short
    /// bounded retry — see [`SessionChannel::publish`]. Also fans the
    /// event out to every registered `EventObserver`, fire-and-forget, so
    /// a slow or misbehaving observer can never delay task execution.
    pub async fn publish(
        &self,
        session_id: &str,
        task_id: &str,
        iteration: Option<u32>,
        kind: EventKind,
    ) -> bool {
        let terminal = kind.is_terminal();
        let event = session::build_event(session_id, task_id, iteration, kind);

        let observers = self.inner.observers.read();
        if !observers.is_empty() {
            for observer in observers.iter().cloned() {
                let event = event.clone();
                tokio::spawn(async move { observer.on_event(&event).await });
            }
        }
        drop(observers);

        self.inner.session(session_id).publish(event, terminal).await
    }

    /// Subscribe to a session's event stream. Replays up to
    /// `replay_window` past events before returning.
    pub fn subscribe(&self, session_id: &str) -> Subscriber {
        let channel = self.inner.session(session_id);
        let queue = channel.subscribe(self.inner.config.subscriber_queue_size);
        Subscriber {
            session_id: session_id.to_string(),
            queue,
            broadcaster: self.inner.clone(),
        }
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.inner
            .sessions
            .get(session_id)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    pub fn dropped_ingest(&self, session_id: &str) -> u64 {
        self.inner
            .sessions
            .get(session_id)
            .map(|c| c.dropped_ingest())
            .unwrap_or(0)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcasterConfig::default())
    }
}
