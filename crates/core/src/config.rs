//! Settings: broker addresses, client identity and command table
//!
//! Layered with figment: built-in defaults, then the TOML settings file,
//! then `DUNEBUGGER_*` environment variables (nested keys split on `__`).
//! The value is built once at startup and shared read-only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::transport::ReconnectConfig;
use crate::types::CommandTable;
use crate::{CoreError, Result};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DUNEBUGGER_";
/// History file name used when none is configured
const DEFAULT_HISTORY_FILE: &str = ".dunebugger_terminal_history";

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Line-editing history file; `~/` is expanded
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    #[serde(default)]
    pub message_queue: MessageQueueSettings,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// Commands known before the core sends its own list
    #[serde(default)]
    pub commands: CommandTable,
}

/// Broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageQueueSettings {
    pub servers: Vec<String>,
    pub client_id: String,
    pub subject_root: String,
}

/// Reconnect and keepalive timing, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectSettings {
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_max_pings")]
    pub max_pings_outstanding: usize,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_retry_interval() -> u64 {
    10
}
fn default_ping_interval() -> u64 {
    5
}
fn default_max_pings() -> usize {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            history_file: None,
            message_queue: MessageQueueSettings::default(),
            reconnect: ReconnectSettings::default(),
            commands: CommandTable::new(),
        }
    }
}

impl Default for MessageQueueSettings {
    fn default() -> Self {
        Self {
            servers: vec!["nats://127.0.0.1:4222".into()],
            client_id: "terminal".into(),
            subject_root: "dunebugger".into(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
            ping_interval_secs: default_ping_interval(),
            max_pings_outstanding: default_max_pings(),
        }
    }
}

impl From<&ReconnectSettings> for ReconnectConfig {
    fn from(s: &ReconnectSettings) -> Self {
        ReconnectConfig {
            retry_interval: Duration::from_secs(s.retry_interval_secs),
            ping_interval: Duration::from_secs(s.ping_interval_secs),
            max_pings_outstanding: s.max_pings_outstanding,
        }
    }
}

impl Settings {
    /// Figment stack used by [`Settings::load`]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings from `path` plus the environment
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Settings = Self::figment(path).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check connection parameters are usable as subject tokens
    pub fn validate(&self) -> Result<()> {
        let mq = &self.message_queue;
        if mq.servers.is_empty() {
            return Err(CoreError::Config("message_queue.servers is empty".into()));
        }
        check_token("message_queue.client_id", &mq.client_id)?;
        check_token("message_queue.subject_root", &mq.subject_root)?;
        if self.reconnect.retry_interval_secs == 0 {
            return Err(CoreError::Config(
                "reconnect.retry_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.message_queue.client_id
    }

    pub fn subject_root(&self) -> &str {
        &self.message_queue.subject_root
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::from(&self.reconnect)
    }

    /// Resolved history file path, `None` when no home directory is known
    pub fn history_path(&self) -> Option<PathBuf> {
        match &self.history_file {
            Some(path) => expand_home(path),
            None => dirs::home_dir().map(|home| home.join(DEFAULT_HISTORY_FILE)),
        }
    }
}

fn check_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::Config(format!("{} is empty", field)));
    }
    if value.contains(['.', '*', '>', ' ']) {
        return Err(CoreError::Config(format!(
            "{} must be a single subject token, got '{}'",
            field, value
        )));
    }
    Ok(())
}

fn expand_home(path: &Path) -> Option<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map(|home| home.join(rest)),
        Err(_) => Some(path.to_path_buf()),
    }
}
