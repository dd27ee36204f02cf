use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alex_events::{Event, EventKind};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use super::subscriber::SubscriberQueue;
use crate::BroadcasterConfig;

struct Slot {
    id: u64,
    queue: Arc<SubscriberQueue>,
}

struct WorkerState {
    next_sequence: u64,
    replay: VecDeque<Event>,
    replay_window: usize,
    subscribers: Vec<Slot>,
    next_subscriber_id: u64,
}

/// One session's ingest channel, ordered worker, replay buffer and
/// subscriber list (spec §4.6). Lives for as long as the session has had
/// at least one publish or subscribe since the broadcaster started.
pub(crate) struct SessionChannel {
    ingest_tx: mpsc::Sender<Event>,
    dropped_ingest: AtomicU64,
    state: Arc<Mutex<WorkerState>>,
}

impl SessionChannel {
    pub(crate) fn spawn(session_id: String, config: &BroadcasterConfig) -> Arc<Self> {
        let (ingest_tx, mut ingest_rx) = mpsc::channel(config.ingest_capacity);
        let state = Arc::new(Mutex::new(WorkerState {
            next_sequence: 1,
            replay: VecDeque::with_capacity(config.replay_window),
            replay_window: config.replay_window,
            subscribers: Vec::new(),
            next_subscriber_id: 0,
        }));

        let worker_state = state.clone();
        tokio::spawn(async move {
            while let Some(mut event) = ingest_rx.recv().await {
                let mut guard = worker_state.lock();
                event.sequence = guard.next_sequence;
                guard.next_sequence += 1;

                guard.replay.push_back(event.clone());
                if guard.replay.len() > guard.replay_window {
                    guard.replay.pop_front();
                }

                for slot in &guard.subscribers {
                    slot.queue.push(event.clone(), &event.session_id, &event.task_id);
                }
            }
        });

        Arc::new(Self {
            ingest_tx,
            dropped_ingest: AtomicU64::new(0),
            state,
        })
    }

    /// Non-blocking publish. Terminal events get a short bounded retry
    /// (spec §4.6: "retried up to 5x with a 1ms backoff before being
    /// considered delivered-or-dropped") since losing a `task_complete`
    /// or `error` event leaves a subscriber with no terminal signal at all.
    pub(crate) async fn publish(&self, mut event: Event, terminal: bool) -> bool {
        event.timestamp = OffsetDateTime::now_utc();

        let attempts = if terminal { 5 } else { 1 };
        for attempt in 0..attempts {
            match self.ingest_tx.try_send(event.clone()) {
                Ok(()) => return true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if attempt + 1 < attempts {
                        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
        self.dropped_ingest.fetch_add(1, Ordering::Relaxed);
        false
    }

    pub(crate) fn dropped_ingest(&self) -> u64 {
        self.dropped_ingest.load(Ordering::Relaxed)
    }

    pub(crate) fn subscribe(&self, queue_capacity: usize) -> Arc<SubscriberQueue> {
        let mut state = self.state.lock();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;

        let queue = SubscriberQueue::new(id, queue_capacity);
        for event in state.replay.iter() {
            queue.push(event.clone(), &event.session_id, &event.task_id);
        }
        state.subscribers.push(Slot {
            id,
            queue: queue.clone(),
        });
        queue
    }

    pub(crate) fn unsubscribe(&self, subscriber_id: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.subscribers.iter().position(|s| s.id == subscriber_id) {
            let slot = state.subscribers.remove(pos);
            slot.queue.close();
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

pub(crate) fn build_event(
    session_id: &str,
    task_id: &str,
    iteration: Option<u32>,
    kind: EventKind,
) -> Event {
    Event {
        sequence: 0,
        timestamp: OffsetDateTime::now_utc(),
        session_id: session_id.to_string(),
        task_id: task_id.to_string(),
        iteration,
        kind,
    }
}
