//! Configuration management for the FileDrive daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filedrive/config.toml`.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::auth::validate_username;

/// Default TCP port the daemon listens on.
pub const DEFAULT_PORT: u16 = 12345;

/// Default bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0:12345";

/// Default storage root, relative to the working directory.
pub const DEFAULT_STORAGE_ROOT: &str = "armazenamento";

/// Upper bound accepted for `server.max_connections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 10_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("bind must be a socket address such as 0.0.0.0:12345, got {0}")]
    InvalidBind(String),

    #[error("max_connections must be between 0 and 10000, got {0}")]
    InvalidMaxConnections(usize),

    #[error("max_size must be greater than 0, got {0}")]
    InvalidMaxSize(u64),

    #[error("invalid username {0:?}: must be non-empty, without path separators, and not start with '.'")]
    InvalidUsername(String),

    #[error("username {0:?} is configured more than once")]
    DuplicateUsername(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the FileDrive daemon.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Listener configuration.
    pub server: ServerConfig,

    /// File storage configuration.
    pub storage: StorageConfig,

    /// Credential configuration.
    pub auth: AuthConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to accept connections on.
    pub bind: String,

    /// Maximum concurrent sessions (0 = unlimited).
    pub max_connections: usize,
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subtree per user.
    pub root: PathBuf,

    /// Largest upload accepted, in bytes (default: 4GB).
    pub max_size: u64,
}

/// Credential configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Users allowed to log in.
    pub users: Vec<UserEntry>,

    /// Additional TOML file with a `users` table, read once at startup.
    pub credentials_file: Option<PathBuf>,
}

/// A username/password pair.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    /// Login name; also the name of the user's storage directory.
    pub username: String,
    /// Plaintext password, compared exactly.
    pub password: String,
}

impl UserEntry {
    /// Create a new entry.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEntry")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_connections: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            max_size: 4 * 1024 * 1024 * 1024, // 4GB
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: vec![
                UserEntry::new("usuario1", "senha1"),
                UserEntry::new("usuario2", "senha2"),
            ],
            credentials_file: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filedrive")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEDRIVE_BIND: Override listen address
    /// - FILEDRIVE_STORAGE_ROOT: Override storage root directory
    /// - FILEDRIVE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("FILEDRIVE_BIND") {
            if !bind.is_empty() {
                tracing::info!("Overriding bind from environment: {}", bind);
                self.server.bind = bind;
            }
        }

        if let Ok(root) = std::env::var("FILEDRIVE_STORAGE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding storage root from environment: {}", root);
                self.storage.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("FILEDRIVE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBind(self.server.bind.clone()));
        }

        if self.server.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(ConfigError::InvalidMaxConnections(
                self.server.max_connections,
            ));
        }

        if self.storage.max_size == 0 {
            return Err(ConfigError::InvalidMaxSize(self.storage.max_size));
        }

        let mut seen = HashSet::new();
        for user in &self.auth.users {
            if !validate_username(&user.username) {
                return Err(ConfigError::InvalidUsername(user.username.clone()));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(ConfigError::DuplicateUsername(user.username.clone()));
            }
        }

        Ok(())
    }

    /// Parsed listen address. Call after [`Config::validate`].
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/filedrive/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }
}

/// Format a TOML deserialization error for user-friendly display.
pub(crate) fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_file.is_none());
        assert_eq!(config.server.bind, "0.0.0.0:12345");
        assert_eq!(config.server.max_connections, 0);
        assert_eq!(config.storage.root, PathBuf::from("armazenamento"));
        assert_eq!(config.auth.users.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_users() {
        let config = Config::default();
        assert_eq!(config.auth.users[0], UserEntry::new("usuario1", "senha1"));
        assert_eq!(config.auth.users[1], UserEntry::new("usuario2", "senha2"));
    }

    #[test]
    fn test_default_bind_matches_port() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[server]
bind = "127.0.0.1:9000"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        // Other values should be defaults
        assert_eq!(config.server.max_connections, 0);
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.auth.users.len(), 2);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"
log_file = "/var/log/filedrive.log"

[server]
bind = "127.0.0.1:4000"
max_connections = 64

[storage]
root = "/srv/filedrive"
max_size = 1048576

[auth]
credentials_file = "/etc/filedrive/users.toml"

[[auth.users]]
username = "alice"
password = "wonderland"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(
            config.daemon.log_file,
            Some(PathBuf::from("/var/log/filedrive.log"))
        );
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.storage.root, PathBuf::from("/srv/filedrive"));
        assert_eq!(config.storage.max_size, 1_048_576);
        assert_eq!(config.auth.users, vec![UserEntry::new("alice", "wonderland")]);
        assert_eq!(
            config.auth.credentials_file,
            Some(PathBuf::from("/etc/filedrive/users.toml"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nbind = 1");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[server]
max_connections = "many"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[storage]\nmax_size = 42\n\n[[auth.users]]\nusername = \"bob\"\npassword = \"builder\"\n",
        )
        .unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.storage.max_size, 42);
        assert_eq!(loaded.auth.users, vec![UserEntry::new("bob", "builder")]);
        assert_eq!(loaded.server, ServerConfig::default());
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_load_default_reads_config_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("filedrive");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.toml"), "[server]\nmax_connections = 7\n").unwrap();

        let previous = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
        let loaded = Config::load_default();
        match previous {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(loaded.unwrap().server.max_connections, 7);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("filedrive/config.toml"));
    }

    #[test]
    fn test_user_entry_debug_redacts_password() {
        let entry = UserEntry::new("usuario1", "senha1");
        let debug = format!("{:?}", entry);
        assert!(debug.contains("usuario1"));
        assert!(!debug.contains("senha1"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.daemon.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bind() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBind("not an address".to_string()))
        );

        config.server.bind = "[::1]:12345".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_connections() {
        let mut config = Config::default();
        config.server.max_connections = MAX_CONNECTIONS_LIMIT + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxConnections(MAX_CONNECTIONS_LIMIT + 1))
        );

        config.server.max_connections = MAX_CONNECTIONS_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_size() {
        let mut config = Config::default();
        config.storage.max_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxSize(0)));
    }

    #[test]
    fn test_validate_unsafe_usernames() {
        for name in ["", "../etc", "a/b", "a\\b", ".hidden", "..", "nul\0"] {
            let mut config = Config::default();
            config.auth.users = vec![UserEntry::new(name, "pw")];
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidUsername(name.to_string())),
                "username {:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_validate_duplicate_usernames() {
        let mut config = Config::default();
        config.auth.users.push(UserEntry::new("usuario1", "other"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateUsername("usuario1".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_env_override_bind() {
        std::env::set_var("FILEDRIVE_BIND", "127.0.0.1:7777");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.bind, "127.0.0.1:7777");

        std::env::remove_var("FILEDRIVE_BIND");
    }

    #[test]
    #[serial]
    fn test_env_override_storage_root() {
        std::env::set_var("FILEDRIVE_STORAGE_ROOT", "/srv/drive");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.storage.root, PathBuf::from("/srv/drive"));

        std::env::remove_var("FILEDRIVE_STORAGE_ROOT");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("FILEDRIVE_BIND");
        std::env::set_var("FILEDRIVE_LOG_LEVEL", "debug");

        let mut config = Config::default();
        let original_level = config.daemon.log_level.clone();
        config.apply_env_overrides();

        assert_eq!(config.daemon.log_level, "debug");
        assert_ne!(config.daemon.log_level, original_level);

        std::env::remove_var("FILEDRIVE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("FILEDRIVE_BIND", "");
        std::env::set_var("FILEDRIVE_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        // Empty values are ignored
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.daemon.log_level, "info");

        std::env::remove_var("FILEDRIVE_BIND");
        std::env::remove_var("FILEDRIVE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("FILEDRIVE_BIND");
        std::env::remove_var("FILEDRIVE_STORAGE_ROOT");
        std::env::remove_var("FILEDRIVE_LOG_LEVEL");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());
    }
}
