use super::{AppState, RequestContext};
use crate::auth::{AuthContext, AuthError, TokenAuthenticator};
use crate::error::AppError;
use crate::protocol::{read_frame, write_frame, Envelope, FrameError};
use crate::subscription::SubscriptionRegistry;
use futures::FutureExt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Sent if even the error envelope cannot be encoded.
const FALLBACK_ERROR: &[u8] =
    br#"{"type":"error","payload":{"error":{"code":"INTERNAL","message":"Internal server error"}}}"#;

/// Drops every subscription of a connection when the handler goes away,
/// whether it returned, panicked or was aborted.
struct SubscriptionGuard {
    registry: Arc<SubscriptionRegistry>,
    connection_id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let removed = self
            .registry
            .unsubscribe_all_for_connection(&self.connection_id);
        if removed > 0 {
            debug!(connection_id = %self.connection_id, removed, "Cleared connection subscriptions");
        }
    }
}

/// Serves one client: read a frame, answer it, repeat until the stream ends.
///
/// Requests on one connection are handled strictly in order. Only framing and
/// write failures end the connection; every per-request failure becomes an
/// error envelope.
pub struct ConnectionHandler {
    state: Arc<AppState>,
    connection_id: String,
    peer: SocketAddr,
}

impl ConnectionHandler {
    pub fn new(state: Arc<AppState>, peer: SocketAddr) -> Self {
        Self {
            state,
            connection_id: Uuid::new_v4().to_string(),
            peer,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub async fn run<S>(self, mut stream: S, mut shutdown: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _guard = SubscriptionGuard {
            registry: Arc::clone(&self.state.registry),
            connection_id: self.connection_id.clone(),
        };
        info!(connection_id = %self.connection_id, peer = %self.peer, "Connection opened");

        let reason = loop {
            let frame = tokio::select! {
                frame = read_frame(&mut stream) => frame,
                _ = shutdown.changed() => break "server shutdown",
            };

            let bytes = match frame {
                Ok(bytes) => bytes,
                Err(FrameError::Closed) => break "peer closed",
                Err(e) => {
                    warn!(connection_id = %self.connection_id, error = %e, "Framing error");
                    break "framing error";
                }
            };

            let response = self.handle_frame(&bytes).await;
            let encoded = response.encode().unwrap_or_else(|e| {
                error!(connection_id = %self.connection_id, error = %e, "Failed to encode response");
                FALLBACK_ERROR.to_vec()
            });

            if let Err(e) = write_frame(&mut stream, &encoded).await {
                warn!(connection_id = %self.connection_id, error = %e, "Failed to write response");
                break "write failed";
            }
        };

        info!(connection_id = %self.connection_id, peer = %self.peer, reason, "Connection closed");
    }

    /// Decode, authenticate and dispatch one request frame.
    pub async fn handle_frame(&self, bytes: &[u8]) -> Envelope {
        let env = match Envelope::decode_request(bytes) {
            Ok(env) => env,
            Err(failure) => {
                debug!(connection_id = %self.connection_id, error = %failure.error, "Rejected envelope");
                return Envelope::from_app_error(failure.req_id, &failure.error);
            }
        };

        let req_id = env.req_id.clone();
        let action = env.action.clone();

        let result = AssertUnwindSafe(self.dispatch(env))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::Internal(anyhow::anyhow!("action handler panicked"))));

        match result {
            Ok(payload) => Envelope::response(req_id, action, payload),
            Err(err) => {
                let action = action.as_deref().unwrap_or("");
                if err.is_server_fault() {
                    error!(
                        connection_id = %self.connection_id,
                        action = %action,
                        error = ?err,
                        "Request failed"
                    );
                } else {
                    debug!(
                        connection_id = %self.connection_id,
                        action = %action,
                        code = %err.code(),
                        message = %err,
                        "Request rejected"
                    );
                }
                Envelope::from_app_error(req_id, &err)
            }
        }
    }

    async fn dispatch(&self, env: Envelope) -> Result<serde_json::Value, AppError> {
        let name = env.action.as_deref().unwrap_or_default();
        let spec = *self
            .state
            .actions
            .get(name)
            .ok_or_else(|| AppError::validation(format!("Unknown action '{}'", name)))?;

        let auth = if spec.requires_auth {
            Some(self.authenticate(env.token.as_deref())?)
        } else {
            None
        };

        let ctx = RequestContext {
            state: Arc::clone(&self.state),
            connection_id: self.connection_id.clone(),
            peer: self.peer,
            auth,
        };
        (spec.handler)(&ctx, env.payload).await
    }

    fn authenticate(&self, token: Option<&str>) -> Result<AuthContext, AppError> {
        let token = token.unwrap_or_default();
        self.state.auth.authenticate(token).map_err(|e| {
            if !matches!(e, AuthError::MissingToken | AuthError::Store(_)) {
                let token_id = TokenAuthenticator::extract_token_id(token).unwrap_or_default();
                debug!(
                    connection_id = %self.connection_id,
                    token_id = %token_id,
                    error = %e,
                    "Authentication failed"
                );
            }
            AppError::from(e)
        })
    }
}
