use super::now_ms;
use crate::error::AppError;
use crate::protocol::{BoardMemberView, BoardSummary};
use crate::store::{Board, BoardAccess, Role, Store};
use crate::subscription::PushDispatcher;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct BoardService {
    store: Arc<Store>,
    push: Arc<PushDispatcher>,
}

impl BoardService {
    pub fn new(store: Arc<Store>, push: Arc<PushDispatcher>) -> Self {
        Self { store, push }
    }

    pub fn create_board(&self, owner_id: &str, name: &str) -> Result<Board, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Board name must not be empty"));
        }
        let board = Board {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            created_at: now_ms(),
        };
        self.store.insert_board(&board)?;
        info!(board_id = %board.id, owner_id = %owner_id, "Board created");
        Ok(board)
    }

    pub fn list_boards_for_user(&self, user_id: &str) -> Result<Vec<BoardAccess>, AppError> {
        Ok(self.store.list_boards_for_user(user_id)?)
    }

    /// The user's role on the board, or None if the board is missing or the
    /// user has no membership.
    pub fn check_access_role(&self, user_id: &str, board_id: &str) -> Result<Option<Role>, AppError> {
        match self.store.find_board(board_id)? {
            Some(board) => self.role_on(&board, user_id),
            None => Ok(None),
        }
    }

    /// FORBIDDEN unless the user holds a role on the board. A missing board
    /// looks the same as one the user cannot see.
    pub fn require_access(&self, user_id: &str, board_id: &str) -> Result<Role, AppError> {
        self.check_access_role(user_id, board_id)?
            .ok_or_else(|| AppError::forbidden("No access to this board"))
    }

    fn role_on(&self, board: &Board, user_id: &str) -> Result<Option<Role>, AppError> {
        if board.owner_id == user_id {
            return Ok(Some(Role::Owner));
        }
        Ok(self.store.member_role(&board.id, user_id)?)
    }

    pub fn view_board(
        &self,
        user_id: &str,
        board_id: &str,
    ) -> Result<(BoardSummary, Vec<BoardMemberView>), AppError> {
        let role = self.require_access(user_id, board_id)?;
        let board = self
            .store
            .find_board(board_id)?
            .ok_or_else(|| AppError::not_found("Board not found"))?;
        let members = self
            .store
            .list_members(board_id)?
            .iter()
            .map(BoardMemberView::from)
            .collect();
        Ok((BoardSummary::new(&board, role), members))
    }

    /// Owner-only. Announces the new member to the board's subscribers.
    pub async fn add_member(
        &self,
        requester_id: &str,
        board_id: &str,
        target_user_id: &str,
    ) -> Result<BoardMemberView, AppError> {
        let board = self
            .store
            .find_board(board_id)?
            .ok_or_else(|| AppError::not_found("Board not found"))?;
        if board.owner_id != requester_id {
            return Err(AppError::forbidden("Only the board owner can add members"));
        }
        let target = self
            .store
            .find_user_by_id(target_user_id)?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        if self.store.member_role(board_id, &target.id)?.is_some() {
            return Err(AppError::conflict("User is already a member of this board"));
        }

        let joined_at = now_ms();
        self.store
            .insert_member(board_id, &target.id, Role::Member, joined_at)
            .map_err(|e| {
                if e.is_constraint_violation() {
                    AppError::conflict("User is already a member of this board")
                } else {
                    AppError::from(e)
                }
            })?;
        info!(board_id = %board_id, user_id = %target.id, "Member added");

        let member = BoardMemberView {
            user_id: target.id,
            username: target.username,
            role: Role::Member.as_str().to_string(),
            joined_at,
        };
        self.push.member_added(requester_id, board_id, &member).await;
        Ok(member)
    }
}
