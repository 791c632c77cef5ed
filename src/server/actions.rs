//! Action name → handler lookup table.
//!
//! Every handler has the same shape: it takes the request context and the raw
//! payload and returns the response payload. The connection handler does the
//! authentication gate before calling in, so handlers flagged `requires_auth`
//! can rely on `ctx.auth()`.

use super::RequestContext;
use crate::error::AppError;
use crate::protocol::{
    parse_payload, to_payload, AckResponse, AddTaskRequest, AddUserToBoardRequest, BoardRef,
    BoardSummary, CreateBoardRequest, Credentials, DeleteTaskRequest, ListTasksRequest,
    SubscribeBoardRequest, TaskView, UnsubscribeBoardRequest, UpdateTaskStatusRequest,
    ViewBoardResponse,
};
use crate::service::build_task_query;
use crate::store::Role;
use crate::subscription::Subscriber;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

pub type ActionFn = for<'a> fn(&'a RequestContext, Value) -> BoxFuture<'a, Result<Value, AppError>>;

#[derive(Clone, Copy)]
pub struct ActionSpec {
    pub requires_auth: bool,
    pub handler: ActionFn,
}

pub struct ActionTable {
    actions: HashMap<&'static str, ActionSpec>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// The full task-board action set.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("register", false, register);
        table.register("login", false, login);
        table.register("logout", true, logout);
        table.register("create_board", true, create_board);
        table.register("list_boards", true, list_boards);
        table.register("add_user_to_board", true, add_user_to_board);
        table.register("view_board", true, view_board);
        table.register("add_task", true, add_task);
        table.register("list_tasks", true, list_tasks);
        table.register("update_task_status", true, update_task_status);
        table.register("delete_task", true, delete_task);
        table.register("subscribe_board", true, subscribe_board);
        table.register("unsubscribe_board", true, unsubscribe_board);
        table
    }

    pub fn register(&mut self, name: &'static str, requires_auth: bool, handler: ActionFn) {
        self.actions.insert(
            name,
            ActionSpec {
                requires_auth,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn ack(message: &str) -> Result<Value, AppError> {
    to_payload(&AckResponse::new(message))
}

// --- users ---

fn register(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let req: Credentials = parse_payload(payload)?;
        let resp = ctx.state.users.register(&req.username, &req.password).await?;
        to_payload(&resp)
    }
    .boxed()
}

fn login(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let req: Credentials = parse_payload(payload)?;
        let resp = ctx.state.users.login(&req.username, &req.password).await?;
        to_payload(&resp)
    }
    .boxed()
}

fn logout(ctx: &RequestContext, _payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        ctx.state.users.logout(ctx.auth()?)?;
        ack("logged out")
    }
    .boxed()
}

// --- boards ---

fn create_board(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: CreateBoardRequest = parse_payload(payload)?;
        let board = ctx.state.boards.create_board(&auth.user_id, &req.name)?;
        let board = to_payload(&BoardSummary::new(&board, Role::Owner))?;
        Ok(json!({ "board": board }))
    }
    .boxed()
}

fn list_boards(ctx: &RequestContext, _payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let boards: Vec<BoardSummary> = ctx
            .state
            .boards
            .list_boards_for_user(&auth.user_id)?
            .iter()
            .map(BoardSummary::from)
            .collect();
        let boards = to_payload(&boards)?;
        Ok(json!({ "boards": boards }))
    }
    .boxed()
}

fn add_user_to_board(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: AddUserToBoardRequest = parse_payload(payload)?;
        ctx.state
            .boards
            .add_member(&auth.user_id, &req.board_id, &req.user_id)
            .await?;
        ack("member added")
    }
    .boxed()
}

fn view_board(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: BoardRef = parse_payload(payload)?;
        let (board, members) = ctx.state.boards.view_board(&auth.user_id, &req.board_id)?;
        to_payload(&ViewBoardResponse { board, members })
    }
    .boxed()
}

// --- tasks ---

fn add_task(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: AddTaskRequest = parse_payload(payload)?;
        let task = ctx
            .state
            .tasks
            .add_task(
                &auth.user_id,
                &req.board_id,
                &req.title,
                req.description,
                req.priority.as_deref(),
                req.due_date,
            )
            .await?;
        let task = to_payload(&TaskView::from(&task))?;
        Ok(json!({ "task": task }))
    }
    .boxed()
}

fn list_tasks(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: ListTasksRequest = parse_payload(payload)?;
        let query = build_task_query(req.filters.as_ref(), req.sort.as_ref())?;
        let tasks: Vec<TaskView> = ctx
            .state
            .tasks
            .list_tasks(&auth.user_id, &req.board_id, &query)?
            .iter()
            .map(TaskView::from)
            .collect();
        let tasks = to_payload(&tasks)?;
        Ok(json!({ "tasks": tasks }))
    }
    .boxed()
}

fn update_task_status(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: UpdateTaskStatusRequest = parse_payload(payload)?;
        let task = ctx
            .state
            .tasks
            .update_task_status(&auth.user_id, &req.board_id, &req.task_id, &req.new_status)
            .await?;
        let task = to_payload(&TaskView::from(&task))?;
        Ok(json!({ "task": task }))
    }
    .boxed()
}

fn delete_task(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: DeleteTaskRequest = parse_payload(payload)?;
        ctx.state
            .tasks
            .delete_task(&auth.user_id, &req.board_id, &req.task_id)
            .await?;
        ack("task deleted")
    }
    .boxed()
}

// --- subscriptions ---

fn subscribe_board(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: SubscribeBoardRequest = parse_payload(payload)?;
        if req.udp_port == 0 {
            return Err(AppError::validation("udpPort must be between 1 and 65535"));
        }
        ctx.state.boards.require_access(&auth.user_id, &req.board_id)?;

        let sub = Subscriber::new(
            ctx.connection_id.clone(),
            auth.user_id.clone(),
            ctx.peer.ip(),
            req.udp_port,
        );
        ctx.state.registry.subscribe(&req.board_id, sub);
        info!(
            connection_id = %ctx.connection_id,
            user_id = %auth.user_id,
            board_id = %req.board_id,
            target = %format!("{}:{}", ctx.peer.ip(), req.udp_port),
            "Subscribed to board"
        );
        ack("subscribed")
    }
    .boxed()
}

fn unsubscribe_board(ctx: &RequestContext, payload: Value) -> BoxFuture<'_, Result<Value, AppError>> {
    async move {
        let auth = ctx.auth()?;
        let req: UnsubscribeBoardRequest = parse_payload(payload)?;
        let removed = match req.udp_port {
            Some(port) => {
                let sub = Subscriber::new(
                    ctx.connection_id.clone(),
                    auth.user_id.clone(),
                    ctx.peer.ip(),
                    port,
                );
                usize::from(ctx.state.registry.unsubscribe(&req.board_id, &sub))
            }
            None => ctx
                .state
                .registry
                .unsubscribe_connection_from_board(&req.board_id, &ctx.connection_id),
        };
        info!(
            connection_id = %ctx.connection_id,
            board_id = %req.board_id,
            removed,
            "Unsubscribed from board"
        );
        ack("unsubscribed")
    }
    .boxed()
}
