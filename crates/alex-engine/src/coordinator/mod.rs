//! Coordinator (component C7, spec §4.7): binds task submission to the
//! ReAct Engine, the Broadcaster and the Session Store, and owns the
//! worker pool and per-task cancellation.

mod task;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use alex_session::domain::{Message, SessionFilter, SessionSummary, TaskStatus};
use alex_session::store::SessionStore;
use alex_tools::ToolRegistry;
use alex_llm::LlmPort;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{error, instrument};

use crate::broadcaster::Broadcaster;
use crate::error::EngineError;
use crate::execution::{run_task, EngineDeps, TaskContext, TaskOutcome};
use crate::policy::EnginePolicy;
use task::TaskHandle;

/// Everything the Coordinator needs to run tasks, bundled for
/// construction convenience (spec §4.7).
pub struct CoordinatorDeps {
    pub session_store: Arc<dyn SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmPort>,
    pub broadcaster: Broadcaster,
    pub policy: EnginePolicy,
    pub redactor: Arc<alex_events::Redactor>,
}

/// Owns the worker pool bounded by `max_concurrent_tasks` and the
/// registry of in-flight tasks used for `CancelTask`/`GetTask` (spec
/// §4.7, §5).
pub struct Coordinator {
    deps: EngineDeps,
    session_store: Arc<dyn SessionStore>,
    semaphore: Arc<Semaphore>,
    tasks: Arc<DashMap<String, Arc<TaskHandle>>>,
}

impl Coordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        let semaphore = Arc::new(Semaphore::new(deps.policy.max_concurrent_tasks));
        let engine_deps = EngineDeps {
            session_store: deps.session_store.clone(),
            tools: deps.tools,
            llm: deps.llm,
            broadcaster: deps.broadcaster,
            policy: deps.policy,
            redactor: deps.redactor,
        };
        Self {
            deps: engine_deps,
            session_store: deps.session_store,
            semaphore,
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Submit a new task: verify ownership, create/load the session,
    /// append the user message, spawn the engine, and return immediately
    /// after `task_started` is guaranteed to have been emitted (spec
    /// §4.7).
    #[instrument(skip(self, prompt), fields(%user_id, %session_id))]
    pub async fn submit_task(
        &self,
        user_id: &str,
        session_id: &str,
        prompt: &str,
        attachments: Vec<String>,
    ) -> Result<String, EngineError> {
        let session = self.session_store.create(user_id, session_id).await?;
        if session.user_id != user_id {
            return Err(EngineError::Unauthorized);
        }

        let mut user_message = Message::user(prompt.to_string());
        user_message.attachments = attachments;
        self.session_store
            .append_message(user_id, session_id, user_message.clone())
            .await?;

        let task_id = uuid::Uuid::new_v4().to_string();
        let handle = TaskHandle::new(task_id.clone(), session_id.to_string(), user_id.to_string());
        self.tasks.insert(task_id.clone(), handle.clone());

        let mut messages = session.messages;
        messages.push(user_message);

        let ctx = TaskContext {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            task_id: task_id.clone(),
            messages,
        };

        let deps = self.deps.clone();
        let semaphore = self.semaphore.clone();
        let cancel = handle.cancel.clone();
        let task_id_for_worker = task_id.clone();
        let task_timeout = self.deps.policy.task_timeout;

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            handle.set_status(TaskStatus::Running);

            // Every task carries a deadline (spec §5): fire the same
            // cancellation signal a `CancelTask` call would, rather than a
            // distinct code path, so both routes share one cooperative
            // cancel-check at every suspension point. Cancelling an
            // already-finished token is a harmless no-op.
            let deadline_cancel = cancel.clone();
            let deadline = tokio::spawn(async move {
                tokio::time::sleep(task_timeout).await;
                deadline_cancel.cancel();
            });

            let outcome = run_task(&deps, ctx, cancel).await;
            deadline.abort();

            // The handle stays registered after completion (rather than
            // being removed here) so `GetTask`/`CancelTask` can still
            // observe the terminal status instead of reporting `not_found`
            // for a task a client is actively polling (spec §8: cancelling
            // an already-terminal task is a no-op returning current status).
            handle.set_status(match &outcome {
                TaskOutcome::Completed { .. } => TaskStatus::Completed,
                TaskOutcome::Failed { .. } => TaskStatus::Failed,
                TaskOutcome::Cancelled => TaskStatus::Cancelled,
            });
            if let TaskOutcome::Failed { error } = &outcome {
                error!(task_id = %task_id_for_worker, %error, "task failed");
            }
        });

        Ok(task_id)
    }

    /// Request cancellation of an in-flight task. A no-op (but not an
    /// error) if the task has already finished (spec §4.7). Only the
    /// owning user may cancel a task (spec §3: session-scoped access).
    pub fn cancel_task(&self, user_id: &str, task_id: &str) -> Result<(), EngineError> {
        match self.tasks.get(task_id) {
            Some(handle) => {
                if handle.user_id != user_id {
                    return Err(EngineError::Unauthorized);
                }
                handle.cancel.cancel();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("task {task_id}"))),
        }
    }

    /// Current status of a task still tracked in-memory. Only the owning
    /// user may query it.
    pub fn get_task(&self, user_id: &str, task_id: &str) -> Result<TaskStatus, EngineError> {
        let handle = self
            .tasks
            .get(task_id)
            .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;
        if handle.user_id != user_id {
            return Err(EngineError::Unauthorized);
        }
        Ok(handle.status())
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, EngineError> {
        Ok(self.session_store.list(user_id, SessionFilter::default()).await?)
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), EngineError> {
        Ok(self.session_store.delete(user_id, session_id).await?)
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.deps.broadcaster
    }

    /// Fetch a full session, enforcing ownership the same way every other
    /// Session Store operation does.
    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Result<alex_session::domain::Session, EngineError> {
        Ok(self.session_store.get(user_id, session_id).await?)
    }
}
