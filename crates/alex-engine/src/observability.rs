//! Concrete `EventObserver` (spec §4.1 ambient addition): a structured
//! audit sink wired alongside the Broadcaster's transport fan-out, not
//! instead of it. Grounded on the teacher's `tracing`-based structured
//! logging throughout `agent/src/` and `querymt-service/src/main.rs`
//! rather than a bespoke audit format.

use alex_events::{Event, EventObserver};
use async_trait::async_trait;
use tracing::info;

/// Logs one `tracing::info!` per event regardless of whether any
/// transport subscriber is attached, so every event is auditable even
/// with zero SSE/CLI consumers connected.
pub struct TracingEventObserver;

#[async_trait]
impl EventObserver for TracingEventObserver {
    async fn on_event(&self, event: &Event) {
        info!(
            target: "alex_engine::audit",
            event_type = event.kind.type_name(),
            session_id = %event.session_id,
            task_id = %event.task_id,
            sequence = event.sequence,
            iteration = ?event.iteration,
            "event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alex_events::EventKind;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn on_event_does_not_panic_on_every_variant() {
        let observer = TracingEventObserver;
        let event = Event {
            sequence: 1,
            timestamp: OffsetDateTime::now_utc(),
            session_id: "s1".into(),
            task_id: "t1".into(),
            iteration: Some(1),
            kind: EventKind::TaskStarted,
        };
        observer.on_event(&event).await;
    }
}
