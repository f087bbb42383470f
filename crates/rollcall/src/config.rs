//! Service configuration with TOML file support.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rollcall_core::{ServerSecret, TokenCodec};
use rollcall_delivery::{WorkerConfig, DEFAULT_LEASE};

use crate::error::{Result, RollcallError};
use crate::logging::LogFormat;

/// Environment variable overriding `server_secret`.
pub const ENV_SECRET: &str = "ROLLCALL_SECRET";
/// Environment variable overriding `queue_url`.
pub const ENV_QUEUE_URL: &str = "ROLLCALL_QUEUE_URL";
/// Environment variable overriding `public_base_url`.
pub const ENV_BASE_URL: &str = "ROLLCALL_BASE_URL";

/// Configuration for a Rollcall deployment.
///
/// Loaded from a TOML file via [`RollcallConfig::from_toml_file`], then
/// overridden from the environment with [`RollcallConfig::apply_env`].
/// Every verifier instance must share the same `server_secret`.
#[derive(Clone, Serialize, Deserialize)]
pub struct RollcallConfig {
    /// Key for check-in tokens.
    #[serde(default)]
    pub server_secret: String,

    /// `sqlite://<path>` or `memory://`.
    #[serde(default = "default_queue_url")]
    pub queue_url: String,

    /// Base of the public verification URL embedded in certificates.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// SQLite database holding the ledger.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory for rendered certificates.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Send registration and attendance notifications.
    #[serde(default)]
    pub notify_participants: bool,

    /// Upper bound on one delivery attempt, in seconds.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "debug,rollcall=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_queue_url() -> String {
    "sqlite://rollcall-queue.db".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("rollcall.db")
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_delivery_timeout_secs() -> u64 {
    30
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl RollcallConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RollcallError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RollcallError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RollcallError::Config(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(secret) = get(ENV_SECRET) {
            self.server_secret = secret;
        }
        if let Some(url) = get(ENV_QUEUE_URL) {
            self.queue_url = url;
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.public_base_url = url;
        }
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.server_secret.len() < ServerSecret::MIN_LEN {
            return Err(RollcallError::Config(format!(
                "server_secret must be at least {} bytes",
                ServerSecret::MIN_LEN
            )));
        }
        if !(self.public_base_url.starts_with("http://")
            || self.public_base_url.starts_with("https://"))
        {
            return Err(RollcallError::Config(format!(
                "public_base_url must be an http(s) URL, got {:?}",
                self.public_base_url
            )));
        }
        if !(self.queue_url.starts_with("sqlite://") || self.queue_url.starts_with("memory:")) {
            return Err(RollcallError::Config(format!(
                "unsupported queue_url {:?}",
                self.queue_url
            )));
        }
        if self.delivery_timeout_secs == 0 {
            return Err(RollcallError::Config(
                "delivery_timeout_secs must be positive".into(),
            ));
        }
        if self.delivery_timeout_secs >= DEFAULT_LEASE.as_secs() {
            return Err(RollcallError::Config(format!(
                "delivery_timeout_secs must stay below the {}s queue lease",
                DEFAULT_LEASE.as_secs()
            )));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn server_secret(&self) -> Result<ServerSecret> {
        Ok(ServerSecret::new(self.server_secret.as_bytes().to_vec())?)
    }

    pub fn token_codec(&self) -> Result<TokenCodec> {
        Ok(TokenCodec::new(&self.server_secret()?)?)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
        }
    }

    pub fn log_format(&self) -> Result<LogFormat> {
        self.log_format.parse()
    }
}

impl Default for RollcallConfig {
    fn default() -> Self {
        Self {
            server_secret: String::new(),
            queue_url: default_queue_url(),
            public_base_url: default_public_base_url(),
            database_path: default_database_path(),
            documents_dir: default_documents_dir(),
            notify_participants: false,
            delivery_timeout_secs: default_delivery_timeout_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

impl fmt::Debug for RollcallConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollcallConfig")
            .field("server_secret", &"<redacted>")
            .field("queue_url", &self.queue_url)
            .field("public_base_url", &self.public_base_url)
            .field("database_path", &self.database_path)
            .field("documents_dir", &self.documents_dir)
            .field("notify_participants", &self.notify_participants)
            .field("delivery_timeout_secs", &self.delivery_timeout_secs)
            .field("log_format", &self.log_format)
            .field("log_level", &self.log_level)
            .finish()
    }
}
