use super::manager::AsyncTaskManager;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Progress movement, in percentage points, that triggers a ledger write
const PROGRESS_PERSIST_STEP: f64 = 10.0;

/// Handle given to a running cooperative task for reporting progress
///
/// Updates land in the local index immediately. Metadata changes, and
/// progress that has moved at least [`PROGRESS_PERSIST_STEP`] points since the
/// last write, are also mirrored into the task ledger so other instances see
/// them. Reports made after the task has finished are ignored.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: Uuid,
    manager: AsyncTaskManager,
    persisted_progress: Arc<Mutex<f64>>,
}

impl TaskContext {
    pub(crate) fn new(task_id: Uuid, manager: AsyncTaskManager) -> Self {
        Self {
            task_id,
            manager,
            persisted_progress: Arc::new(Mutex::new(0.0)),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Record progress in `[0, 100]`; values outside are clamped
    pub async fn report_progress(&self, progress: f64) {
        let Some(snapshot) = self
            .manager
            .update_running(self.task_id, |task| task.set_progress(progress))
        else {
            return;
        };

        let due = {
            let mut persisted = self.persisted_progress.lock();
            let moved = (snapshot.progress - *persisted).abs() >= PROGRESS_PERSIST_STEP;
            let reached_end = snapshot.progress >= 100.0 && *persisted < 100.0;
            if moved || reached_end {
                *persisted = snapshot.progress;
            }
            moved || reached_end
        };
        if due {
            self.manager.persist(&snapshot).await;
        }
    }

    pub async fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        if let Some(snapshot) = self
            .manager
            .update_running(self.task_id, move |task| task.insert_metadata(key, value))
        {
            self.manager.persist(&snapshot).await;
        }
    }
}
