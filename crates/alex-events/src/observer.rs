use async_trait::async_trait;

use crate::event::Event;

/// A best-effort, out-of-band sink for events — distinct from the
/// Broadcaster's transport fanout. Intended for things like structured
/// audit logging that should see every event but must never be allowed to
/// block or fail task execution.
#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_event(&self, event: &Event);
}
