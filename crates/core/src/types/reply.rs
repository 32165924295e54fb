//! Typed reply bodies sent by the core

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One row of a `show_gpio_status` reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpioPin {
    #[serde(deserialize_with = "scalar_to_string")]
    pub pin: String,
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub label: String,
    pub mode: String,
    pub state: String,
    #[serde(default, deserialize_with = "scalar_to_string")]
    pub switch: String,
}

/// Body of a `log_message` reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
}

/// Body of a `terminal_command_reply`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandReply {
    pub message: String,
    #[serde(default = "default_success")]
    pub success: bool,
    /// Severity of an unsuccessful reply (`error`, `warning`, ...)
    #[serde(default)]
    pub level: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Body of a `version_info` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub component: String,
    pub version: String,
    pub build: String,
    pub commit: String,
    pub full_version: String,
}

impl VersionInfo {
    pub const UNKNOWN: &'static str = "unknown";

    /// Build version info, deriving `full_version`
    ///
    /// `full_version` is `{version}-{build}+{short commit}` when the commit is
    /// known and `{version}-{build}` otherwise.
    pub fn new(
        component: impl Into<String>,
        version: impl Into<String>,
        build: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        let version = version.into();
        let build = build.into();
        let commit = commit.into();
        let full_version = if commit == Self::UNKNOWN {
            format!("{}-{}", version, build)
        } else {
            let short: String = commit.chars().take(7).collect();
            format!("{}-{}+{}", version, build, short)
        };
        Self {
            component: component.into(),
            version,
            build,
            commit,
            full_version,
        }
    }
}

/// Accept strings, numbers and booleans, rendering them as text
fn scalar_to_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar, got {}",
            other
        ))),
    }
}
