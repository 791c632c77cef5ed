use super::{Store, StoreError, StoreResult, Task, TaskPriority, TaskQuery, TaskSort, TaskStatus};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const TASK_COLUMNS: &str =
    "id, board_id, title, description, status, priority, due_date, created_at";

type RawTask = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<i64>,
    i64,
);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_task(raw: RawTask) -> StoreResult<Task> {
    let (id, board_id, title, description, status, priority, due_date, created_at) = raw;
    let status = TaskStatus::from_db(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("task {} has status '{}'", id, status)))?;
    let priority = TaskPriority::from_db(&priority)
        .ok_or_else(|| StoreError::Corrupt(format!("task {} has priority '{}'", id, priority)))?;
    Ok(Task {
        id,
        board_id,
        title,
        description,
        status,
        priority,
        due_date,
        created_at,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

impl Store {
    pub fn insert_task(&self, task: &Task) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, board_id, title, description, status, priority, due_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id,
                task.board_id,
                task.title,
                task.description,
                task.status.as_db(),
                task.priority.as_db(),
                task.due_date,
                task.created_at
            ],
        )?;
        Ok(())
    }

    pub fn find_task(&self, task_id: &str, board_id: &str) -> StoreResult<Option<Task>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM tasks WHERE id = ?1 AND board_id = ?2",
                    TASK_COLUMNS
                ),
                params![task_id, board_id],
                read_raw,
            )
            .optional()?;
        raw.map(into_task).transpose()
    }

    /// Lists a board's tasks with optional filters. Ties are broken by
    /// creation time, oldest first.
    pub fn list_tasks(&self, board_id: &str, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let mut sql = format!("SELECT {} FROM tasks WHERE board_id = ?", TASK_COLUMNS);
        let mut args: Vec<SqlValue> = vec![SqlValue::Text(board_id.to_string())];

        if !query.statuses.is_empty() {
            sql.push_str(&format!(
                " AND status IN ({})",
                placeholders(query.statuses.len())
            ));
            args.extend(
                query
                    .statuses
                    .iter()
                    .map(|s| SqlValue::Text(s.as_db().to_string())),
            );
        }
        if !query.priorities.is_empty() {
            sql.push_str(&format!(
                " AND priority IN ({})",
                placeholders(query.priorities.len())
            ));
            args.extend(
                query
                    .priorities
                    .iter()
                    .map(|p| SqlValue::Text(p.as_db().to_string())),
            );
        }
        if let Some(before) = query.due_before {
            sql.push_str(" AND due_date IS NOT NULL AND due_date < ?");
            args.push(SqlValue::Integer(before));
        }
        if let Some(after) = query.due_after {
            sql.push_str(" AND due_date IS NOT NULL AND due_date >= ?");
            args.push(SqlValue::Integer(after));
        }

        let order = if query.descending { "DESC" } else { "ASC" };
        let key = match query.sort {
            TaskSort::CreatedAt => "created_at",
            TaskSort::Due => "due_date",
            TaskSort::Priority => {
                "CASE priority WHEN 'LOW' THEN 1 WHEN 'MEDIUM' THEN 2 WHEN 'HIGH' THEN 3 END"
            }
        };
        sql.push_str(&format!(" ORDER BY {} {}, created_at ASC, id ASC", key, order));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), read_raw)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(into_task(row?)?);
        }
        Ok(out)
    }

    /// Returns false if no such task exists on the board.
    pub fn update_task_status(
        &self,
        task_id: &str,
        board_id: &str,
        status: TaskStatus,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1 WHERE id = ?2 AND board_id = ?3",
            params![status.as_db(), task_id, board_id],
        )?;
        Ok(changed > 0)
    }

    /// Returns false if no such task exists on the board.
    pub fn delete_task(&self, task_id: &str, board_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND board_id = ?2",
            params![task_id, board_id],
        )?;
        Ok(changed > 0)
    }
}
