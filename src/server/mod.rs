//! TCP acceptor, per-connection handlers and the shared application state.

pub mod actions;
pub mod connection;


pub use actions::{ActionFn, ActionSpec, ActionTable};
pub use connection::ConnectionHandler;

use crate::auth::{AuthContext, AuthService, BcryptHasher, PasswordHasher, TokenAuthenticator};
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::service::{BoardService, TaskService, UserService};
use crate::store::Store;
use crate::subscription::{PushDispatcher, SubscriptionRegistry};
use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Everything a request handler can reach.
pub struct AppState {
    pub auth: AuthService,
    pub users: UserService,
    pub boards: Arc<BoardService>,
    pub tasks: TaskService,
    pub registry: Arc<SubscriptionRegistry>,
    /// Owns the UDP socket; `Server::push_addr` reports its address.
    pub push: Arc<PushDispatcher>,
    pub actions: ActionTable,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        push: Arc<PushDispatcher>,
        tokens: TokenAuthenticator,
        hasher: Arc<dyn PasswordHasher>,
        token_ttl: Duration,
    ) -> Self {
        let registry = Arc::clone(push.registry());
        let auth = AuthService::new(Arc::new(tokens), store.clone());
        let ttl_ms = i64::try_from(token_ttl.as_millis()).unwrap_or(i64::MAX);
        let users = UserService::new(store.clone(), hasher, auth.clone(), ttl_ms);
        let boards = Arc::new(BoardService::new(store.clone(), push.clone()));
        let tasks = TaskService::new(store, boards.clone(), push.clone());
        Self {
            auth,
            users,
            boards,
            tasks,
            registry,
            push,
            actions: ActionTable::standard(),
        }
    }
}

/// Per-request view handed to action handlers.
pub struct RequestContext {
    pub state: Arc<AppState>,
    pub connection_id: String,
    pub peer: SocketAddr,
    /// Set for every action that requires authentication.
    pub auth: Option<AuthContext>,
}

impl RequestContext {
    pub fn auth(&self) -> Result<&AuthContext, AppError> {
        self.auth
            .as_ref()
            .ok_or_else(|| AppError::auth("Token missing"))
    }
}

/// Bound listeners plus shared state, ready to serve.
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_grace: Duration,
    sweep_interval: Duration,
}

impl Server {
    /// Open the store named in `config` and bind both sockets.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let store = Store::open(&config.storage.db_path)
            .with_context(|| format!("Failed to open database '{}'", config.storage.db_path))?;
        Self::bind_with_store(config, Arc::new(store)).await
    }

    pub async fn bind_with_store(config: &ServerConfig, store: Arc<Store>) -> Result<Self> {
        let tcp_addr = config.tcp_bind_addr();
        let listener = TcpListener::bind(&tcp_addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {}", tcp_addr))?;

        let udp_addr = config.udp_bind_addr();
        let socket = tokio::net::UdpSocket::bind(&udp_addr)
            .await
            .with_context(|| format!("Failed to bind UDP push socket on {}", udp_addr))?;

        let registry = Arc::new(SubscriptionRegistry::new());
        let push = Arc::new(PushDispatcher::new(socket, registry));
        let tokens = TokenAuthenticator::new(&config.secret_bytes())
            .context("Invalid token secret")?;
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.auth.bcrypt_cost));

        let state = Arc::new(AppState::new(store, push, tokens, hasher, config.token_ttl()));
        Ok(Self {
            listener,
            state,
            shutdown_grace: config.shutdown_grace(),
            sweep_interval: config.sweep_interval(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn push_addr(&self) -> std::io::Result<SocketAddr> {
        self.state.push.local_addr()
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Serve until `signal` resolves, then drain.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = self.run_with_shutdown(shutdown_rx);
        tokio::pin!(server);

        tokio::select! {
            res = &mut server => return res,
            _ = signal => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        }
        server.await
    }

    /// Run on a background task. The returned handle stops it.
    pub fn spawn(self) -> Result<RunningServer> {
        let local_addr = self.local_addr()?;
        let push_addr = self.push_addr()?;
        let registry = self.registry();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run_with_shutdown(shutdown_rx));
        Ok(RunningServer {
            local_addr,
            push_addr,
            registry,
            shutdown_tx,
            task,
        })
    }

    /// Accept loop. A change on `shutdown` (or its sender going away) stops
    /// accepting, tells every handler to finish, and waits up to the grace
    /// period before aborting the rest.
    pub async fn run_with_shutdown(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Server {
            listener,
            state,
            shutdown_grace,
            sweep_interval,
        } = self;

        let local_addr = listener.local_addr()?;
        info!(
            tcp = %local_addr,
            udp = %state.push.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            "Server listening"
        );

        let sweeper = tokio::spawn(sweep_sessions(
            state.auth.clone(),
            sweep_interval,
            shutdown.clone(),
        ));
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let handler = ConnectionHandler::new(Arc::clone(&state), peer);
                        connections.spawn(handler.run(stream, shutdown.clone()));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        // Typically fd exhaustion; back off instead of spinning.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection handler panicked");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        drop(listener);
        info!(active = connections.len(), "Shutting down, draining connections");

        let drained = tokio::time::timeout(shutdown_grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "Drain timeout reached, aborting remaining connections"
            );
            connections.shutdown().await;
        }

        sweeper.abort();
        info!("Server stopped");
        Ok(())
    }
}

/// Handle to a server running on a background task.
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub push_addr: SocketAddr,
    pub registry: Arc<SubscriptionRegistry>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.task.await.context("Server task failed")?
    }
}

async fn sweep_sessions(auth: AuthService, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match auth.sweep_expired(Utc::now().timestamp_millis()) {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Swept expired sessions"),
                    Err(e) => warn!(error = %e, "Session sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                debug!("Session sweeper stopping");
                break;
            }
        }
    }
}
