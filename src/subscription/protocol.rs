use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Domain events pushed to board subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEventKind {
    TaskAdded,
    TaskUpdated,
    TaskDeleted,
    MemberAdded,
}

impl PushEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushEventKind::TaskAdded => "task_added",
            PushEventKind::TaskUpdated => "task_updated",
            PushEventKind::TaskDeleted => "task_deleted",
            PushEventKind::MemberAdded => "member_added",
        }
    }
}

impl fmt::Display for PushEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server → subscriber: one UDP datagram per event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub event: PushEventKind,
    pub board_id: String,
    pub ts: i64,
    pub actor_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Value>,
}

impl PushMessage {
    /// Member events carry their body under `member`, task events under `task`.
    pub fn new(
        event: PushEventKind,
        board_id: impl Into<String>,
        actor_user_id: impl Into<String>,
        ts: i64,
        body: Value,
    ) -> Self {
        let (task, member) = match event {
            PushEventKind::MemberAdded => (None, Some(body)),
            _ => (Some(body), None),
        };
        Self {
            msg_type: "push".to_string(),
            event,
            board_id: board_id.into(),
            ts,
            actor_user_id: actor_user_id.into(),
            task,
            member,
        }
    }
}
