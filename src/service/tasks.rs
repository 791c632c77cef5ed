use super::now_ms;
use super::BoardService;
use crate::error::AppError;
use crate::protocol::{TaskFilters, TaskSortSpec, TaskView};
use crate::store::{Store, Task, TaskPriority, TaskQuery, TaskSort, TaskStatus};
use crate::subscription::PushDispatcher;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

fn parse_status(raw: &str) -> Result<TaskStatus, AppError> {
    TaskStatus::parse(raw).ok_or_else(|| AppError::validation(format!("Invalid status '{}'", raw)))
}

fn parse_priority(raw: &str) -> Result<TaskPriority, AppError> {
    TaskPriority::parse(raw)
        .ok_or_else(|| AppError::validation(format!("Invalid priority '{}'", raw)))
}

/// Turn `list_tasks` filters and sort options into a store query.
pub fn build_task_query(
    filters: Option<&TaskFilters>,
    sort: Option<&TaskSortSpec>,
) -> Result<TaskQuery, AppError> {
    let mut query = TaskQuery::default();

    if let Some(f) = filters {
        for s in &f.status {
            let status = parse_status(s)?;
            if !query.statuses.contains(&status) {
                query.statuses.push(status);
            }
        }
        for p in &f.priority {
            let priority = parse_priority(p)?;
            if !query.priorities.contains(&priority) {
                query.priorities.push(priority);
            }
        }
        query.due_before = f.due_before;
        query.due_after = f.due_after;
    }

    // Unrecognised sort keys and orders fall back to createdAt ascending.
    if let Some(s) = sort {
        query.sort = match s.by.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("due") | Some("duedate") => TaskSort::Due,
            Some("priority") => TaskSort::Priority,
            _ => TaskSort::CreatedAt,
        };
        query.descending = s
            .order
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("desc"));
    }

    Ok(query)
}

/// Task CRUD on boards the caller can access.
pub struct TaskService {
    store: Arc<Store>,
    boards: Arc<BoardService>,
    push: Arc<PushDispatcher>,
}

impl TaskService {
    pub fn new(store: Arc<Store>, boards: Arc<BoardService>, push: Arc<PushDispatcher>) -> Self {
        Self {
            store,
            boards,
            push,
        }
    }

    /// New tasks start in `todo`; priority defaults to medium.
    pub async fn add_task(
        &self,
        user_id: &str,
        board_id: &str,
        title: &str,
        description: Option<String>,
        priority: Option<&str>,
        due_date: Option<i64>,
    ) -> Result<Task, AppError> {
        self.boards.require_access(user_id, board_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::validation("Task title must not be empty"));
        }
        let priority = match priority {
            Some(p) => parse_priority(p)?,
            None => TaskPriority::Medium,
        };

        let task = Task {
            id: Uuid::new_v4().to_string(),
            board_id: board_id.to_string(),
            title: title.to_string(),
            description,
            status: TaskStatus::Todo,
            priority,
            due_date,
            created_at: now_ms(),
        };
        self.store.insert_task(&task)?;
        debug!(task_id = %task.id, board_id = %board_id, "Task added");

        self.push.task_added(user_id, &TaskView::from(&task)).await;
        Ok(task)
    }

    pub fn list_tasks(
        &self,
        user_id: &str,
        board_id: &str,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, AppError> {
        self.boards.require_access(user_id, board_id)?;
        Ok(self.store.list_tasks(board_id, query)?)
    }

    pub async fn update_task_status(
        &self,
        user_id: &str,
        board_id: &str,
        task_id: &str,
        new_status: &str,
    ) -> Result<Task, AppError> {
        self.boards.require_access(user_id, board_id)?;
        let status = parse_status(new_status)?;

        if !self.store.update_task_status(task_id, board_id, status)? {
            return Err(AppError::not_found("Task not found"));
        }
        let task = self
            .store
            .find_task(task_id, board_id)?
            .ok_or_else(|| AppError::not_found("Task not found"))?;
        debug!(task_id = %task_id, board_id = %board_id, status = status.as_db(), "Task status updated");

        self.push.task_updated(user_id, &TaskView::from(&task)).await;
        Ok(task)
    }

    pub async fn delete_task(&self, user_id: &str, board_id: &str, task_id: &str) -> Result<(), AppError> {
        self.boards.require_access(user_id, board_id)?;
        if !self.store.delete_task(task_id, board_id)? {
            return Err(AppError::not_found("Task not found"));
        }
        debug!(task_id = %task_id, board_id = %board_id, "Task deleted");

        self.push.task_deleted(user_id, board_id, task_id).await;
        Ok(())
    }
}
