//! Per-subscriber bounded queue (spec §4.6): independent of every other
//! subscriber, drop-oldest when full, with a single synthetic
//! `event_lag` marker injected ahead of the next delivered event per gap.
//!
//! This is deliberately NOT built on `tokio::sync::broadcast` — broadcast's
//! lagged-receiver semantics apply one "you missed N" signal across *all*
//! slow receivers measured against the single shared ring buffer, whereas
//! spec §4.6 requires each subscriber's queue to evict independently. A
//! plain `Mutex`-guarded deque plus a `Notify` models that directly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alex_events::{ErrorKind, Event, EventKind};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::Notify;

struct Inner {
    capacity: usize,
    buffer: VecDeque<Event>,
    /// Present exactly when a gap has occurred and the marker has not yet
    /// been delivered to the subscriber.
    lag_marker: Option<Event>,
    dropped: u64,
    closed: bool,
}

impl Inner {
    fn push(&mut self, event: Event, session_id: &str, task_id: &str) {
        if self.closed {
            return;
        }

        // The marker rides ahead of the buffer (see `pop`), not inside it,
        // so it never costs the buffer a real-event slot: a queue of
        // capacity K overflowed by any amount still delivers exactly K real
        // events, preceded by at most one `event_lag` marker (spec §8).
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.dropped += 1;
            if self.lag_marker.is_none() {
                self.lag_marker = Some(lag_marker_event(session_id, task_id, self.dropped));
            }
        }

        self.buffer.push_back(event);
    }

    fn pop(&mut self) -> Option<Event> {
        self.lag_marker.take().or_else(|| self.buffer.pop_front())
    }
}

fn lag_marker_event(session_id: &str, task_id: &str, dropped_so_far: u64) -> Event {
    Event {
        sequence: 0,
        timestamp: OffsetDateTime::now_utc(),
        session_id: session_id.to_string(),
        task_id: task_id.to_string(),
        iteration: None,
        kind: EventKind::Error {
            kind: ErrorKind::EventLag,
            message: format!("subscriber fell behind, {dropped_so_far} event(s) dropped so far"),
            recoverable: true,
        },
    }
}

/// A live consumer of a session's event stream (spec glossary: "Subscriber").
pub struct SubscriberQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    id: u64,
    open: AtomicBool,
}

impl SubscriberQueue {
    pub(crate) fn new(id: u64, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                capacity,
                buffer: VecDeque::with_capacity(capacity),
                lag_marker: None,
                dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
            id,
            open: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn push(&self, event: Event, session_id: &str, task_id: &str) {
        {
            let mut inner = self.inner.lock();
            inner.push(event, session_id, task_id);
        }
        self.notify.notify_waiters();
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Number of events currently buffered (used to report the replay
    /// count in the SSE `connected` frame right after subscribing).
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Await the next event. Returns `None` once the subscriber has been
    /// unsubscribed and its queue drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            if let Some(event) = self.inner.lock().pop() {
                return Some(event);
            }
            if !self.is_open() {
                return None;
            }
            self.notify.notified().await;
        }
    }
}
