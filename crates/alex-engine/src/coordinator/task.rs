use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use alex_session::domain::TaskStatus;

/// Bookkeeping for one in-flight (or recently finished) task, kept around
/// long enough for `GetTask`/`CancelTask` to find it (spec §4.7).
pub(crate) struct TaskHandle {
    pub task_id: String,
    pub session_id: String,
    pub user_id: String,
    pub cancel: CancellationToken,
    pub status: Mutex<TaskStatus>,
}

impl TaskHandle {
    pub(crate) fn new(task_id: String, session_id: String, user_id: String) -> Arc<Self> {
        Arc::new(Self {
            task_id,
            session_id,
            user_id,
            cancel: CancellationToken::new(),
            status: Mutex::new(TaskStatus::Pending),
        })
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        *self.status.lock() = status;
    }

    pub(crate) fn status(&self) -> TaskStatus {
        *self.status.lock()
    }
}
