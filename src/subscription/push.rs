use super::protocol::{PushEventKind, PushMessage};
use super::registry::SubscriptionRegistry;
use crate::protocol::{BoardMemberView, TaskView};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, warn};

/// Largest datagram we will send. Bigger events are dropped, never fragmented.
pub const MAX_DATAGRAM_LEN: usize = 60_000;

/// Outcome of one fanout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was addressed to
    pub attempted: usize,
    /// Datagrams handed to the OS without error
    pub delivered: usize,
}

/// Fire-and-forget UDP fanout of board events.
///
/// No acknowledgment, no retry, no ordering across subscribers. A failed send
/// to one subscriber is logged and the loop moves on.
pub struct PushDispatcher {
    registry: Arc<SubscriptionRegistry>,
    socket: UdpSocket,
}

impl PushDispatcher {
    pub fn new(socket: UdpSocket, registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry, socket }
    }

    /// Bind the outbound push socket.
    pub async fn bind(addr: SocketAddr, registry: Arc<SubscriptionRegistry>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket, registry))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Send `body` to every current subscriber of `board_id`.
    pub async fn publish(
        &self,
        event: PushEventKind,
        board_id: &str,
        actor_user_id: &str,
        body: Value,
    ) -> PublishReport {
        let subscribers = self.registry.subscribers_for_board(board_id);
        if subscribers.is_empty() {
            return PublishReport::default();
        }

        let message = PushMessage::new(
            event,
            board_id,
            actor_user_id,
            Utc::now().timestamp_millis(),
            body,
        );
        let bytes = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, event = %event, board_id = %board_id, "Failed to serialize push event");
                return PublishReport::default();
            }
        };

        let mut report = PublishReport {
            attempted: subscribers.len(),
            delivered: 0,
        };

        if bytes.len() > MAX_DATAGRAM_LEN {
            warn!(
                event = %event,
                board_id = %board_id,
                size = bytes.len(),
                "Push event exceeds datagram limit, dropped"
            );
            return report;
        }

        for sub in &subscribers {
            let target = SocketAddr::new(sub.address, sub.port);
            match self.socket.send_to(&bytes, target).await {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        connection_id = %sub.connection_id,
                        target = %target,
                        "Push send failed"
                    );
                }
            }
        }

        debug!(
            event = %event,
            board_id = %board_id,
            attempted = report.attempted,
            delivered = report.delivered,
            "Push fanout complete"
        );
        report
    }

    pub async fn task_added(&self, actor_user_id: &str, task: &TaskView) -> PublishReport {
        self.publish_view(PushEventKind::TaskAdded, &task.board_id, actor_user_id, task)
            .await
    }

    pub async fn task_updated(&self, actor_user_id: &str, task: &TaskView) -> PublishReport {
        self.publish_view(PushEventKind::TaskUpdated, &task.board_id, actor_user_id, task)
            .await
    }

    /// Deleted tasks are announced as `{id, boardId}` only.
    pub async fn task_deleted(
        &self,
        actor_user_id: &str,
        board_id: &str,
        task_id: &str,
    ) -> PublishReport {
        let body = json!({ "id": task_id, "boardId": board_id });
        self.publish(PushEventKind::TaskDeleted, board_id, actor_user_id, body)
            .await
    }

    pub async fn member_added(
        &self,
        actor_user_id: &str,
        board_id: &str,
        member: &BoardMemberView,
    ) -> PublishReport {
        self.publish_view(PushEventKind::MemberAdded, board_id, actor_user_id, member)
            .await
    }

    async fn publish_view<T: Serialize>(
        &self,
        event: PushEventKind,
        board_id: &str,
        actor_user_id: &str,
        view: &T,
    ) -> PublishReport {
        match serde_json::to_value(view) {
            Ok(body) => self.publish(event, board_id, actor_user_id, body).await,
            Err(e) => {
                error!(error = %e, event = %event, board_id = %board_id, "Failed to serialize push body");
                PublishReport::default()
            }
        }
    }
}
