use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use shell_core::{Invocation, Shell, ShellConfig, ShellError};

mod agent;
mod logging;
mod platform;

fn main() -> Result<()> {
    let invocation = Invocation::from_env();
    let config_path = ShellConfig::resolve_path();
    let (config, config_error) = load_config(&config_path);

    // Flushes the file writer on drop; keep until exit
    let _log_guard = logging::init(&config);

    info!(
        "agent-shell v{} starting (os={}, arch={}, host={})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
    );
    info!("config: {}", config_path.display());

    let invocation = settle_invocation(invocation, config_error)?;
    info!("mode: {}", invocation.name());

    let manager = platform::service_manager();
    let host = platform::service_host();
    let executable = std::env::current_exe().context("failed to resolve own executable path")?;

    let shell = Shell::new(&config, manager.as_ref(), host.as_ref(), executable)
        .privileged(platform::is_elevated());
    let agent = Arc::new(agent::ResourceAgent::new(config.heartbeat_interval()));

    if let Err(e) = shell.dispatch(invocation, agent) {
        error!("{} failed: {:#}", config.service_name, e);
        return Err(e.into());
    }

    info!("agent-shell exiting");
    Ok(())
}

/// Config for this run. A file that fails to load still yields the defaults,
/// so logging can start and record the failure.
fn load_config(path: &Path) -> (ShellConfig, Option<anyhow::Error>) {
    match ShellConfig::load_or_default(path) {
        Ok(config) => (config, None),
        Err(e) => (
            ShellConfig::default(),
            Some(e.context(format!("failed to load config from {}", path.display()))),
        ),
    }
}

/// Log every startup failure, then return the one to exit with.
/// A usage error wins over a config error.
fn settle_invocation(
    invocation: Result<Invocation, ShellError>,
    config_error: Option<anyhow::Error>,
) -> Result<Invocation> {
    if let Some(e) = &config_error {
        error!("{:#}", e);
    }
    let invocation = invocation.map_err(|e| {
        error!("{}", e);
        e
    })?;

    match config_error {
        Some(e) => Err(e),
        None => Ok(invocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("agent-shell-main-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        let path = write_config("malformed", "{bad");

        let (config, error) = load_config(&path);

        assert_eq!(config, ShellConfig::default());
        let message = format!("{:#}", error.unwrap());
        assert!(message.contains("failed to load config from"));
        assert!(message.contains("failed to parse config JSON"));
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_valid_config_loads_without_error() {
        let path = write_config("valid", r#"{ "service_name": "FileAgent" }"#);

        let (config, error) = load_config(&path);

        assert!(error.is_none());
        assert_eq!(config.service_name, "FileAgent");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_usage_error_wins_over_config_error() {
        let err = settle_invocation(
            Invocation::parse(["--bogus"]),
            Some(anyhow::anyhow!("failed to parse config JSON")),
        )
        .unwrap_err();

        let shell = err.downcast_ref::<ShellError>().unwrap();
        assert!(shell.is_usage());
    }

    #[test]
    fn test_config_error_stops_a_valid_invocation() {
        let err = settle_invocation(
            Ok(Invocation::Install),
            Some(anyhow::anyhow!("failed to parse config JSON")),
        )
        .unwrap_err();

        assert!(err.to_string().contains("failed to parse config JSON"));
    }

    #[test]
    fn test_clean_startup_keeps_invocation() {
        let invocation = settle_invocation(Ok(Invocation::Uninstall), None).unwrap();
        assert_eq!(invocation, Invocation::Uninstall);
    }
}
