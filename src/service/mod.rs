//! Business rules for users, boards and tasks.
//!
//! Services raise typed [`AppError`](crate::error::AppError)s and trigger push
//! events after a successful write. Store calls run inline on the caller's task.

mod boards;
mod tasks;
mod users;

#[cfg(test)]
mod tests;

pub use boards::BoardService;
pub use tasks::{build_task_query, TaskService};
pub use users::UserService;

use chrono::Utc;

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
