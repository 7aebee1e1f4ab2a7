use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use shell_platform::service::ServiceRegistration;

use crate::lifecycle::DEFAULT_STATUS_TIMEOUT;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AGENT_SHELL_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Name the OS service manager registers the agent under
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Name shown in service consoles
    #[serde(default = "default_display_name")]
    pub display_name: String,

    #[serde(default = "default_description")]
    pub description: String,

    /// How long start/stop wait for the service to settle
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,

    /// Heartbeat interval of the hosted agent in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Write logs to this file instead of stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_service_name() -> String {
    "ServerResourceAgent".to_string()
}
fn default_display_name() -> String {
    "Server Resource Agent".to_string()
}
fn default_description() -> String {
    "Hosts the server resource agent as a background service".to_string()
}
fn default_status_timeout() -> u64 {
    DEFAULT_STATUS_TIMEOUT.as_secs()
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            display_name: default_display_name(),
            description: default_description(),
            status_timeout_secs: default_status_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl ShellConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("org", "agent-shell", "agent-shell") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("agent-shell.json")
        }
    }

    /// Config path from `AGENT_SHELL_CONFIG`, falling back to the default path
    pub fn resolve_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path)
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Load config if the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Start/stop wait, never shorter than one second
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Registration metadata for running `executable` as this service.
    /// No launch arguments: a bare invocation is service mode.
    pub fn registration(&self, executable: PathBuf) -> ServiceRegistration {
        ServiceRegistration {
            name: self.service_name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            executable,
            launch_arguments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShellConfig::default();
        assert_eq!(config.service_name, "ServerResourceAgent");
        assert_eq!(config.status_timeout(), Duration::from_secs(10));
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ShellConfig =
            serde_json::from_str(r#"{ "service_name": "CustomAgent", "status_timeout_secs": 3 }"#)
                .unwrap();
        assert_eq!(config.service_name, "CustomAgent");
        assert_eq!(config.status_timeout(), Duration::from_secs(3));
        assert_eq!(config.display_name, "Server Resource Agent");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_status_timeout_never_zero() {
        let config: ShellConfig = serde_json::from_str(r#"{ "status_timeout_secs": 0 }"#).unwrap();
        assert_eq!(config.status_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_heartbeat_interval_never_zero() {
        let config = ShellConfig {
            heartbeat_interval_secs: 0,
            ..ShellConfig::default()
        };
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("shell-core-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let config = ShellConfig {
            service_name: "SavedAgent".to_string(),
            log_file: Some(PathBuf::from("/var/log/agent-shell.log")),
            ..ShellConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = ShellConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("shell-core-config-does-not-exist.json");
        assert_eq!(ShellConfig::load_or_default(&path).unwrap(), ShellConfig::default());
    }

    #[test]
    fn test_registration_has_no_launch_arguments() {
        let reg = ShellConfig::default().registration(PathBuf::from("/opt/agent-shell"));
        assert_eq!(reg.name, "ServerResourceAgent");
        assert!(reg.launch_arguments.is_empty());
    }
}
