use anyhow::{bail, Context, Result};
use rand::RngCore;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "TASKBOARD_CONFIG";

/// Complete server configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: NetworkConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// TCP request/response port. 0 picks an ephemeral port.
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// Source port of UDP pushes. 0 picks an ephemeral port.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// How long shutdown waits for in-flight connections before aborting them
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_tcp_port() -> u16 {
    5050
}

fn default_udp_port() -> u16 {
    5051
}

fn default_shutdown_grace() -> u64 {
    3
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            tcp_port: default_tcp_port(),
            udp_port: default_udp_port(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

/// Token and password settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret. Unset means a random per-process secret.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_token_ttl_hours() -> u64 {
    24
}

fn default_bcrypt_cost() -> u32 {
    12
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_hours: default_token_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "data/taskboard.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Expired-session sweeper
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl ServerConfig {
    /// File named by `TASKBOARD_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => load_config(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `TASKBOARD_*` overrides. Unparseable values are logged and skipped.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TASKBOARD_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("TASKBOARD_TCP_PORT") {
            override_parsed("TASKBOARD_TCP_PORT", &v, &mut self.server.tcp_port);
        }
        if let Some(v) = lookup("TASKBOARD_UDP_PORT") {
            override_parsed("TASKBOARD_UDP_PORT", &v, &mut self.server.udp_port);
        }
        if let Some(v) = lookup("TASKBOARD_DB_FILE") {
            self.storage.db_path = v;
        }
        if let Some(v) = lookup("TASKBOARD_SECRET") {
            self.auth.secret = Some(v);
        }
        if let Some(v) = lookup("TASKBOARD_TOKEN_TTL_HOURS") {
            override_parsed("TASKBOARD_TOKEN_TTL_HOURS", &v, &mut self.auth.token_ttl_hours);
        }
        if let Some(v) = lookup("TASKBOARD_BCRYPT_COST") {
            override_parsed("TASKBOARD_BCRYPT_COST", &v, &mut self.auth.bcrypt_cost);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind_addr.trim().is_empty() {
            bail!("server.bind_addr must not be empty");
        }
        if self.auth.token_ttl_hours == 0 {
            bail!("auth.token_ttl_hours must be greater than zero");
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            );
        }
        if self.server.tcp_port != 0 && self.server.tcp_port == self.server.udp_port {
            bail!(
                "server.tcp_port and server.udp_port must differ (both {})",
                self.server.tcp_port
            );
        }
        Ok(())
    }

    pub fn tcp_bind_addr(&self) -> String {
        join_host_port(&self.server.bind_addr, self.server.tcp_port)
    }

    pub fn udp_bind_addr(&self) -> String {
        join_host_port(&self.server.bind_addr, self.server.udp_port)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_hours.saturating_mul(3600))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_seconds.max(1))
    }

    /// Token signing key. Without a configured secret, tokens die with the process.
    pub fn secret_bytes(&self) -> Vec<u8> {
        match self.auth.secret.as_deref() {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                warn!("No token secret configured, using an ephemeral random secret");
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        }
    }
}

fn override_parsed<T: std::str::FromStr>(key: &str, raw: &str, slot: &mut T) {
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warn!(key = %key, value = %raw, "Ignoring unparseable environment override"),
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<ServerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: ServerConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.server.tcp_port, 5050);
        assert_eq!(config.server.udp_port, 5051);
        assert_eq!(config.server.shutdown_grace_seconds, 3);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.auth.bcrypt_cost, 12);
        assert!(config.auth.secret.is_none());
        assert_eq!(config.storage.db_path, "data/taskboard.db");
        assert_eq!(config.sessions.sweep_interval_seconds, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1"
            tcp_port = 7000
            udp_port = 7001
            shutdown_grace_seconds = 10

            [auth]
            secret = "s3cret"
            token_ttl_hours = 1
            bcrypt_cost = 10

            [storage]
            db_path = "/tmp/tb.db"

            [sessions]
            sweep_interval_seconds = 60
        "#;

        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.tcp_bind_addr(), "127.0.0.1:7000");
        assert_eq!(config.udp_bind_addr(), "127.0.0.1:7001");
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(config.auth.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.token_ttl(), Duration::from_secs(3600));
        assert_eq!(config.auth.bcrypt_cost, 10);
        assert_eq!(config.storage.db_path, "/tmp/tb.db");
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [auth]
            token_ttl_hours = 2
        "#;

        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.token_ttl_hours, 2);
        assert_eq!(config.auth.bcrypt_cost, 12); // Default
        assert_eq!(config.server.tcp_port, 5050); // Default
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config.apply_env_overrides(env(&[
            ("TASKBOARD_BIND_ADDR", "127.0.0.1"),
            ("TASKBOARD_TCP_PORT", "6000"),
            ("TASKBOARD_UDP_PORT", "6001"),
            ("TASKBOARD_DB_FILE", "/var/lib/tb.db"),
            ("TASKBOARD_SECRET", "from-env"),
            ("TASKBOARD_TOKEN_TTL_HOURS", "8"),
            ("TASKBOARD_BCRYPT_COST", "5"),
        ]));

        assert_eq!(config.tcp_bind_addr(), "127.0.0.1:6000");
        assert_eq!(config.server.udp_port, 6001);
        assert_eq!(config.storage.db_path, "/var/lib/tb.db");
        assert_eq!(config.secret_bytes(), b"from-env".to_vec());
        assert_eq!(config.auth.token_ttl_hours, 8);
        assert_eq!(config.auth.bcrypt_cost, 5);
    }

    #[test]
    fn test_unparseable_env_value_is_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env_overrides(env(&[("TASKBOARD_TCP_PORT", "not-a-port")]));
        assert_eq!(config.server.tcp_port, 5050);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ServerConfig::default();
        config.server.bind_addr = " ".into();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.auth.token_ttl_hours = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.auth.bcrypt_cost = 3;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.udp_port = config.server.tcp_port;
        assert!(config.validate().is_err());

        // Two ephemeral ports never collide.
        let mut config = ServerConfig::default();
        config.server.tcp_port = 0;
        config.server.udp_port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secret_generates_random_key() {
        let config = ServerConfig::default();
        let a = config.secret_bytes();
        let b = config.secret_bytes();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ipv6_bind_addr_is_bracketed() {
        let mut config = ServerConfig::default();
        config.server.bind_addr = "::1".into();
        assert_eq!(config.tcp_bind_addr(), "[::1]:5050");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ntcp_port = 9100\nudp_port = 9101").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.tcp_port, 9100);
        assert!(load_config("/nonexistent/taskboard.toml").is_err());
    }
}
