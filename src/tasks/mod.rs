//! # Async Task Manager
//!
//! Fire-and-forget execution of user-scoped work. Submission records a
//! `pending` task and returns its id immediately; completion is observed by
//! polling [`AsyncTaskManager::get_task_status`] or awaiting
//! [`AsyncTaskManager::wait_for_completion`].

pub mod context;
pub mod errors;
pub mod ledger;
pub mod manager;

pub use context::TaskContext;
pub use errors::{TaskError, TaskResult};
pub use ledger::{InMemoryTaskLedger, TaskLedger};
pub use manager::{AsyncTaskManager, TaskManagerHealth, TaskManagerStats};
