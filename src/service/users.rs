use super::now_ms;
use crate::auth::{AuthContext, AuthService, PasswordHasher};
use crate::error::AppError;
use crate::protocol::{LoginResponse, UserView};
use crate::store::{Store, User};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 4;

/// register / login / logout.
pub struct UserService {
    store: Arc<Store>,
    hasher: Arc<dyn PasswordHasher>,
    auth: AuthService,
    token_ttl_ms: i64,
}

impl UserService {
    pub fn new(
        store: Arc<Store>,
        hasher: Arc<dyn PasswordHasher>,
        auth: AuthService,
        token_ttl_ms: i64,
    ) -> Self {
        Self {
            store,
            hasher,
            auth,
            token_ttl_ms,
        }
    }

    /// Create an account and log it in.
    pub async fn register(&self, username: &str, password: &str) -> Result<LoginResponse, AppError> {
        if username.trim().is_empty() {
            return Err(AppError::validation("Username must not be empty"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.store.find_user_by_username(username)?.is_some() {
            return Err(AppError::conflict("Username already taken"));
        }

        let password_hash = self.hash_password(password.to_string()).await?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash,
            created_at: now_ms(),
        };
        self.store.insert_user(&user).map_err(|e| {
            // Lost a race with a concurrent register of the same name.
            if e.is_constraint_violation() {
                AppError::conflict("Username already taken")
            } else {
                AppError::from(e)
            }
        })?;
        info!(user_id = %user.id, username = %user.username, "User registered");

        self.start_session(&user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AppError> {
        let user = self
            .store
            .find_user_by_username(username)?
            .ok_or_else(|| AppError::auth("Invalid username or password"))?;

        if !self
            .verify_password(password.to_string(), user.password_hash.clone())
            .await?
        {
            return Err(AppError::auth("Invalid username or password"));
        }

        info!(user_id = %user.id, "User logged in");
        self.start_session(&user)
    }

    /// Revoke the session behind an authenticated request.
    pub fn logout(&self, ctx: &AuthContext) -> Result<(), AppError> {
        self.auth.revoke(ctx)?;
        info!(user_id = %ctx.user_id, token_id = %ctx.token_id, "User logged out");
        Ok(())
    }

    fn start_session(&self, user: &User) -> Result<LoginResponse, AppError> {
        let issued = self
            .auth
            .issue(&user.id, &user.username, now_ms(), self.token_ttl_ms)?;
        Ok(LoginResponse {
            token: issued.token,
            expires_at: issued.claims.expires_at,
            user: UserView::from(user),
        })
    }

    // bcrypt is CPU-bound; keep it off the reactor threads.
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = Arc::clone(&self.hasher);
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))??;
        Ok(hash)
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AppError> {
        let hasher = Arc::clone(&self.hasher);
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))??;
        Ok(ok)
    }
}
