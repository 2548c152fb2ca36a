//! Settings for the dropminer binary.
//!
//! TOML settings file, credential resolution (env + keyring + plaintext),
//! and translation into `dropminer_core::MinerConfig` plus the transport,
//! retry and push-pool settings of `dropminer_api`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dropminer_api::{PoolConfig, RetryPolicy, TransportConfig};
use dropminer_core::MinerConfig;

/// Keyring service the password is stored under.
pub const KEYRING_SERVICE: &str = "dropminer";
/// Env var consulted before the keyring.
pub const PASSWORD_ENV: &str = "DROPMINER_PASSWORD";

/// Push-topic slots kept back for the account-level topics.
const RESERVED_TOPICS: usize = 2;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Account to log in with. The login form asks if unset.
    pub username: Option<String>,

    /// Password (plaintext; prefer the keyring or `DROPMINER_PASSWORD`).
    pub password: Option<String>,

    /// Games to mine first, best first.
    #[serde(default)]
    pub priority: Vec<String>,

    /// Games that are never mined.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Only mine games listed in `priority`.
    #[serde(default)]
    pub priority_only: bool,

    /// Cookie file location. Defaults to the platform data dir.
    pub cookies_path: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Attempts per request before a connection failure is fatal.
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_topics_per_connection")]
    pub topics_per_connection: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            priority: Vec::new(),
            exclude: Vec::new(),
            priority_only: false,
            cookies_path: None,
            timeout: default_timeout(),
            request_attempts: default_request_attempts(),
            max_connections: default_max_connections(),
            topics_per_connection: default_topics_per_connection(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_request_attempts() -> u32 {
    5
}
fn default_max_connections() -> usize {
    8
}
fn default_topics_per_connection() -> usize {
    50
}

impl Config {
    /// Reject settings the miner cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(invalid("timeout", "must be at least 1 second"));
        }
        if self.request_attempts == 0 {
            return Err(invalid("request_attempts", "must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be at least 1"));
        }
        if self.max_connections * self.topics_per_connection <= RESERVED_TOPICS {
            return Err(invalid(
                "topics_per_connection",
                &format!(
                    "total topic budget must exceed the {RESERVED_TOPICS} account-level topics"
                ),
            ));
        }
        if let Some(game) = self.priority.iter().find(|g| self.exclude.contains(g)) {
            return Err(invalid(
                "exclude",
                &format!("'{game}' is both prioritized and excluded"),
            ));
        }
        Ok(())
    }

    /// Game selection rules for the miner.
    pub fn miner_config(&self) -> MinerConfig {
        let mut config = MinerConfig::default().with_priority_list(self.priority.iter().cloned());
        config.exclude = self.exclude.iter().cloned().collect();
        config.priority_only = self.priority_only;
        config
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::default().with_timeout(Duration::from_secs(self.timeout))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_attempts(self.request_attempts)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            topics_per_connection: self.topics_per_connection,
            ..PoolConfig::default()
        }
    }

    /// Configured cookie file, or `cookies.json` in the platform data dir.
    pub fn cookies_path(&self) -> PathBuf {
        self.cookies_path.clone().unwrap_or_else(|| {
            ProjectDirs::from("com", "dropminer", "dropminer").map_or_else(
                || dirs_fallback().join("cookies.json"),
                |dirs| dirs.data_dir().join("cookies.json"),
            )
        })
    }

    /// Resolve the account password: env var, then keyring, then the
    /// plaintext setting.
    pub fn resolve_password(&self) -> Option<SecretString> {
        let from_env = std::env::var(PASSWORD_ENV).ok();
        let from_keyring = self.username.as_deref().and_then(|username| {
            keyring::Entry::new(KEYRING_SERVICE, &keyring_key(username))
                .ok()?
                .get_password()
                .ok()
        });
        self.pick_password(from_env, from_keyring)
    }

    fn pick_password(
        &self,
        from_env: Option<String>,
        from_keyring: Option<String>,
    ) -> Option<SecretString> {
        from_env
            .filter(|pw| !pw.is_empty())
            .or(from_keyring)
            .or_else(|| self.password.clone())
            .map(SecretString::from)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Keyring entry name for an account's password.
pub fn keyring_key(username: &str) -> String {
    format!("{username}/password")
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "dropminer", "dropminer").map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("dropminer");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load settings from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load settings from `path` + environment. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DROPMINER_").ignore(&["password"]));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load settings, falling back to defaults on any error.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize settings to TOML and write them to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
