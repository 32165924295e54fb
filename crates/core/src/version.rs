//! Version information reported on `get_version`
//!
//! Sources, first match wins:
//! 1. A `VERSION` file, either JSON `{version, build, commit}` or plain text
//! 2. Build-time `DUNEBUGGER_BUILD` / `DUNEBUGGER_COMMIT` with the crate version

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::types::VersionInfo;

/// Name of the release version file
pub const VERSION_FILE: &str = "VERSION";

#[derive(Debug, Deserialize)]
struct VersionFile {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default = "unknown")]
    build: String,
    #[serde(default = "unknown")]
    commit: String,
}

fn default_version() -> String {
    "0.0.0".into()
}

fn unknown() -> String {
    VersionInfo::UNKNOWN.into()
}

/// Resolve version info for `component`, looking for a version file in `dir`
pub fn load_version_info(component: &str, dir: &Path) -> VersionInfo {
    let path = dir.join(VERSION_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            debug!("Version read from {}", path.display());
            parse_version_file(component, &content)
        }
        Err(_) => build_version_info(component),
    }
}

/// Version info baked in at compile time
pub fn build_version_info(component: &str) -> VersionInfo {
    VersionInfo::new(
        component,
        env!("CARGO_PKG_VERSION"),
        option_env!("DUNEBUGGER_BUILD").unwrap_or("dev"),
        option_env!("DUNEBUGGER_COMMIT").unwrap_or(VersionInfo::UNKNOWN),
    )
}

fn parse_version_file(component: &str, content: &str) -> VersionInfo {
    let content = content.trim();
    match serde_json::from_str::<VersionFile>(content) {
        Ok(file) => VersionInfo::new(component, file.version, file.build, file.commit),
        Err(_) => VersionInfo::new(component, content, "release", VersionInfo::UNKNOWN),
    }
}
