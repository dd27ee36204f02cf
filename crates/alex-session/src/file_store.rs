//! Reference [`SessionStore`] implementation: one JSON file per session
//! under `sessions_root` (spec §6 "Persisted session layout").
//!
//! Per-session mutual exclusion uses a sharded map of `tokio::sync::RwLock`
//! keyed by session id, rather than one lock guarding the whole store —
//! sessions for different users must never block each other.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::domain::{Artifact, Message, Session, SessionFilter, SessionSummary};
use crate::error::{SessionError, SessionResult};
use crate::store::SessionStore;

pub struct FileSessionStore {
    root: PathBuf,
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, session_id: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }

    async fn read_unlocked(&self, path: &Path) -> SessionResult<Session> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| SessionError::NotFound)?;
        serde_json::from_slice(&bytes).map_err(|e| SessionError::Storage(e.to_string()))
    }

    /// Write via a temp file + rename so a crash never leaves a partial
    /// session file on disk (spec §8 invariant 4).
    async fn write_unlocked(&self, session: &Session) -> SessionResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let path = self.path_for(&session.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let bytes =
            serde_json::to_vec_pretty(session).map_err(|e| SessionError::Storage(e.to_string()))?;

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(())
    }

    fn check_owner(session: &Session, user_id: &str) -> SessionResult<()> {
        if session.user_id != user_id {
            Err(SessionError::Unauthorized)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, user_id: &str, session_id: &str) -> SessionResult<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.write().await;
        let path = self.path_for(session_id);
        if path.exists() {
            let existing = self.read_unlocked(&path).await?;
            Self::check_owner(&existing, user_id)?;
            return Ok(existing);
        }
        let session = Session::new(session_id, user_id);
        self.write_unlocked(&session).await?;
        Ok(session)
    }

    async fn get(&self, user_id: &str, session_id: &str) -> SessionResult<Session> {
        let lock = self.lock_for(session_id);
        let _guard = lock.read().await;
        let session = self.read_unlocked(&self.path_for(session_id)).await?;
        Self::check_owner(&session, user_id)?;
        Ok(session)
    }

    async fn append_message(
        &self,
        user_id: &str,
        session_id: &str,
        message: Message,
    ) -> SessionResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.write().await;
        let path = self.path_for(session_id);
        let mut session = self.read_unlocked(&path).await?;
        Self::check_owner(&session, user_id)?;
        session.messages.push(message);
        session.updated_at = time::OffsetDateTime::now_utc();
        self.write_unlocked(&session).await
    }

    async fn append_artifact(
        &self,
        user_id: &str,
        session_id: &str,
        artifact: Artifact,
    ) -> SessionResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.write().await;
        let path = self.path_for(session_id);
        let mut session = self.read_unlocked(&path).await?;
        Self::check_owner(&session, user_id)?;
        session.artifacts.push(artifact);
        session.updated_at = time::OffsetDateTime::now_utc();
        self.write_unlocked(&session).await
    }

    async fn replace_range(
        &self,
        user_id: &str,
        session_id: &str,
        range: Range<usize>,
        expected_len: usize,
        replacement: Vec<Message>,
    ) -> SessionResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.write().await;
        let path = self.path_for(session_id);
        let mut session = self.read_unlocked(&path).await?;
        Self::check_owner(&session, user_id)?;

        if session.messages.len() != expected_len {
            return Err(SessionError::InvalidOperation(
                "compare-and-swap failed: message log changed concurrently".into(),
            ));
        }
        if range.end > session.messages.len() || range.start > range.end {
            return Err(SessionError::InvalidOperation(
                "replace_range out of bounds".into(),
            ));
        }

        session.messages.splice(range, replacement);
        session.updated_at = time::OffsetDateTime::now_utc();
        self.write_unlocked(&session).await
    }

    async fn list(&self, user_id: &str, filter: SessionFilter) -> SessionResult<Vec<SessionSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut summaries = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(session) = self.read_unlocked(&path).await else {
                continue;
            };
            if session.user_id != user_id {
                continue;
            }
            if let Some(needle) = &filter.contains {
                let matches = session
                    .messages
                    .iter()
                    .any(|m| m.content.contains(needle.as_str()));
                if !matches {
                    continue;
                }
            }
            summaries.push(SessionSummary::from(&session));
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, user_id: &str, session_id: &str) -> SessionResult<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.write().await;
        let path = self.path_for(session_id);
        let session = self.read_unlocked(&path).await?;
        Self::check_owner(&session, user_id)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionFilter;

    async fn store() -> (FileSessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FileSessionStore::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        let session = store.get("u1", "s1").await.unwrap();
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.user_id, "u1");
    }

    #[tokio::test]
    async fn get_by_wrong_user_is_unauthorized() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        let err = store.get("u2", "s1").await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthorized));
    }

    #[tokio::test]
    async fn append_message_persists_and_is_ordered() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        store
            .append_message("u1", "s1", Message::user("hello"))
            .await
            .unwrap();
        store
            .append_message("u1", "s1", Message::assistant("hi", vec![]))
            .await
            .unwrap();
        let session = store.get("u1", "s1").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "hello");
        assert_eq!(session.messages[1].content, "hi");
    }

    #[tokio::test]
    async fn replace_range_rejects_stale_expected_len() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        store
            .append_message("u1", "s1", Message::user("a"))
            .await
            .unwrap();
        let err = store
            .replace_range("u1", "s1", 0..1, 0, vec![Message::system("summary")])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn replace_range_swaps_atomically() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        store
            .append_message("u1", "s1", Message::user("a"))
            .await
            .unwrap();
        store
            .append_message("u1", "s1", Message::assistant("b", vec![]))
            .await
            .unwrap();
        store
            .replace_range(
                "u1",
                "s1",
                0..2,
                2,
                vec![Message::system("[compacted summary]")],
            )
            .await
            .unwrap();
        let session = store.get("u1", "s1").await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, "[compacted summary]");
    }

    #[tokio::test]
    async fn delete_is_idempotent_not_success_twice() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        store.delete("u1", "s1").await.unwrap();
        let err = store.delete("u1", "s1").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn list_scopes_by_user_and_filter() {
        let (store, _dir) = store().await;
        store.create("u1", "s1").await.unwrap();
        store.create("u2", "s2").await.unwrap();
        store
            .append_message("u1", "s1", Message::user("needle here"))
            .await
            .unwrap();

        let all_u1 = store.list("u1", SessionFilter::default()).await.unwrap();
        assert_eq!(all_u1.len(), 1);
        assert_eq!(all_u1[0].session_id, "s1");

        let filtered = store
            .list(
                "u1",
                SessionFilter {
                    contains: Some("needle".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        let filtered_miss = store
            .list(
                "u1",
                SessionFilter {
                    contains: Some("absent".into()),
                },
            )
            .await
            .unwrap();
        assert!(filtered_miss.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_to_same_session_do_not_lose_writes() {
        let (store, _dir) = store().await;
        let store = Arc::new(store);
        store.create("u1", "s1").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_message("u1", "s1", Message::user(format!("msg-{i}")))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let session = store.get("u1", "s1").await.unwrap();
        assert_eq!(session.messages.len(), 20);
    }
}
