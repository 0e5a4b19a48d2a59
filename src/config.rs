//! Armature Configuration
//!
//! Loads and saves the agent's configuration from `~/.armature/config.json`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::auth::keys::get_armature_dir;
use crate::types::{default_config, AgentConfig};

/// Config file name within the armature directory.
const CONFIG_FILENAME: &str = "config.json";

/// Returns the full path to the config file: `~/.armature/config.json`.
pub fn get_config_path() -> PathBuf {
    get_armature_dir().join(CONFIG_FILENAME)
}

/// Load the agent config from disk, merging missing fields with defaults.
///
/// Returns `None` if the config file does not exist or cannot be parsed.
pub fn load_config() -> Option<AgentConfig> {
    let config_path = get_config_path();
    if !config_path.exists() {
        return None;
    }

    let contents = fs::read_to_string(&config_path).ok()?;
    let mut config: AgentConfig = serde_json::from_str(&contents).ok()?;

    let defaults = default_config();

    if config.model.endpoint.is_empty() {
        config.model.endpoint = defaults.model.endpoint;
    }
    if config.model.model.is_empty() {
        config.model.model = defaults.model.model;
    }
    if config.serve_port == 0 {
        config.serve_port = defaults.serve_port;
    }

    Some(config)
}

/// Save the agent config to disk at `~/.armature/config.json`.
///
/// Creates the armature directory with mode 0o700 if it does not exist.
/// The config file is written with mode 0o600 since it may contain API keys.
pub fn save_config(config: &AgentConfig) -> Result<()> {
    let dir = get_armature_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create armature directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }

    let config_path = get_config_path();
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&config_path, &json).context("Failed to write config file")?;
    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }

    #[test]
    fn test_default_config_values() {
        let config = default_config();
        assert_eq!(config.serve_port, 8888);
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.tool_servers.is_empty());
    }
}
