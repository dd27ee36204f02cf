//! Generic session storage contract (component C2, spec §4.2).
//!
//! ## Concurrency
//!
//! Implementations MUST guarantee strict per-session isolation: any number
//! of concurrent readers, a single writer, and append operations that only
//! briefly hold the writer lock. Operations on different sessions MUST NOT
//! block each other — use per-session locks, never one global lock.
//!
//! ## Authorization
//!
//! Every operation is scoped by `user_id`. A session owned by a different
//! user is indistinguishable from a missing one to other users: operations
//! return [`SessionError::Unauthorized`] without any side effect.

use async_trait::async_trait;

use crate::domain::{Artifact, Message, Session, SessionFilter, SessionSummary};
use crate::error::SessionResult;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new, empty session owned by `user_id`.
    async fn create(&self, user_id: &str, session_id: &str) -> SessionResult<Session>;

    /// Fetch a session, enforcing ownership.
    async fn get(&self, user_id: &str, session_id: &str) -> SessionResult<Session>;

    /// Append one message to the session's log. Durable: the write is
    /// flushed to the underlying store before this returns successfully.
    async fn append_message(
        &self,
        user_id: &str,
        session_id: &str,
        message: Message,
    ) -> SessionResult<()>;

    /// Append one artifact reference to the session.
    async fn append_artifact(
        &self,
        user_id: &str,
        session_id: &str,
        artifact: Artifact,
    ) -> SessionResult<()>;

    /// Atomically replace a contiguous range of the message log — the
    /// compare-and-swap primitive compaction is built on (spec §9: "design
    /// the session's message list as an append-only log with a
    /// compare-and-swap replace-range primitive, not as a freely mutable
    /// array"). `expected_len` guards against a concurrent writer having
    /// appended in between snapshot and replace.
    async fn replace_range(
        &self,
        user_id: &str,
        session_id: &str,
        range: std::ops::Range<usize>,
        expected_len: usize,
        replacement: Vec<Message>,
    ) -> SessionResult<()>;

    async fn list(&self, user_id: &str, filter: SessionFilter) -> SessionResult<Vec<SessionSummary>>;

    /// Idempotent delete: a second call returns `NotFound`, not success,
    /// and makes no further state change (spec §8 round-trip property).
    async fn delete(&self, user_id: &str, session_id: &str) -> SessionResult<()>;
}
