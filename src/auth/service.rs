use super::{AuthError, IssuedToken, TokenAuthenticator};
use crate::store::{Session, SessionStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Identity of an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub token_id: String,
    pub expires_at: i64,
}

/// Full authentication: a valid signed token AND a live session row.
#[derive(Clone)]
pub struct AuthService {
    tokens: Arc<TokenAuthenticator>,
    sessions: Arc<dyn SessionStore>,
}

impl AuthService {
    pub fn new(tokens: Arc<TokenAuthenticator>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { tokens, sessions }
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.authenticate_at(token, Utc::now().timestamp_millis())
    }

    pub fn authenticate_at(&self, token: &str, now_ms: i64) -> Result<AuthContext, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        let claims = self.tokens.validate_at(token, now_ms)?;

        let session = self
            .sessions
            .find_session(&claims.token_id)?
            .ok_or(AuthError::Revoked)?;
        if session.expires_at <= now_ms {
            return Err(AuthError::Revoked);
        }

        Ok(AuthContext {
            user_id: claims.user_id,
            username: claims.username,
            token_id: claims.token_id,
            expires_at: claims.expires_at,
        })
    }

    /// Mint a token and persist its session row.
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<IssuedToken, AuthError> {
        let expires_at = now_ms.saturating_add(ttl_ms);
        let issued = self.tokens.create(user_id, username, now_ms, expires_at);
        self.sessions.insert_session(&Session {
            token_id: issued.claims.token_id.clone(),
            user_id: user_id.to_string(),
            expires_at,
            created_at: now_ms,
        })?;
        debug!(user_id = %user_id, token_id = %issued.claims.token_id, "Session created");
        Ok(issued)
    }

    /// Delete the session row behind an authenticated context.
    pub fn revoke(&self, ctx: &AuthContext) -> Result<bool, AuthError> {
        let removed = self.sessions.delete_session(&ctx.token_id)?;
        debug!(user_id = %ctx.user_id, token_id = %ctx.token_id, removed, "Session revoked");
        Ok(removed)
    }

    pub fn sweep_expired(&self, now_ms: i64) -> Result<usize, AuthError> {
        Ok(self.sessions.delete_expired_sessions(now_ms)?)
    }
}
