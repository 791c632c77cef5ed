//! Action payloads: request bodies in, client views out.
//!
//! Every field on the wire is camelCase. Status and priority are rendered in
//! their client spelling (`inProgress`, `high`).

use crate::error::AppError;
use crate::store::{Board, BoardAccess, MemberRecord, Role, Task, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deserialize a request payload. A missing payload reads as `{}`.
pub fn parse_payload<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    let payload = match payload {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(payload)
        .map_err(|e| AppError::validation(format!("Invalid payload: {}", e)))
}

/// Serialize a response payload.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// `register` and `login`.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBoardRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserToBoardRequest {
    pub board_id: String,
    pub user_id: String,
}

/// `view_board`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRef {
    pub board_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTaskRequest {
    pub board_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilters {
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub priority: Vec<String>,
    #[serde(default)]
    pub due_before: Option<i64>,
    #[serde(default)]
    pub due_after: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSortSpec {
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksRequest {
    pub board_id: String,
    #[serde(default)]
    pub filters: Option<TaskFilters>,
    #[serde(default)]
    pub sort: Option<TaskSortSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskStatusRequest {
    pub board_id: String,
    pub task_id: String,
    pub new_status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTaskRequest {
    pub board_id: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBoardRequest {
    pub board_id: String,
    pub udp_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeBoardRequest {
    pub board_id: String,
    /// When absent, every subscription this connection holds on the board goes.
    #[serde(default)]
    pub udp_port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub created_at: i64,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            created_at: user.created_at,
        }
    }
}

/// `register` / `login` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: UserView,
}

/// A board plus the caller's role on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: i64,
    pub role: String,
}

impl BoardSummary {
    pub fn new(board: &Board, role: Role) -> Self {
        Self {
            id: board.id.clone(),
            name: board.name.clone(),
            owner_id: board.owner_id.clone(),
            created_at: board.created_at,
            role: role.as_str().to_string(),
        }
    }
}

impl From<&BoardAccess> for BoardSummary {
    fn from(access: &BoardAccess) -> Self {
        Self::new(&access.board, access.role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMemberView {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub joined_at: i64,
}

impl From<&MemberRecord> for BoardMemberView {
    fn from(m: &MemberRecord) -> Self {
        Self {
            user_id: m.user_id.clone(),
            username: m.username.clone(),
            role: m.role.as_str().to_string(),
            joined_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<i64>,
    pub created_at: i64,
}

impl From<&Task> for TaskView {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.clone(),
            board_id: t.board_id.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            status: t.status.as_client().to_string(),
            priority: t.priority.as_client().to_string(),
            due_date: t.due_date,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewBoardResponse {
    pub board: BoardSummary,
    pub members: Vec<BoardMemberView>,
}

/// `{message}` acknowledgement for actions with nothing else to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub message: String,
}

impl AckResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
