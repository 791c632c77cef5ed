// Signed-session auth and token validation
pub mod auth;

// TOML + environment configuration
pub mod config;

// Error codes surfaced to clients
pub mod error;

// Length-prefixed JSON wire protocol
pub mod protocol;

// TCP acceptor and per-connection handlers
pub mod server;

// User, board and task rules
pub mod service;

// SQLite persistence
pub mod store;

// Board subscriptions and UDP push
pub mod subscription;

pub use config::ServerConfig;
pub use error::{AppError, ErrorCode};
pub use server::{RunningServer, Server};
