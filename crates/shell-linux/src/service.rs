//! Linux systemd service management: install/uninstall/start/stop the agent unit.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use shell_platform::service::{
    InstallState, InstallStep, ServiceError, ServiceManager, ServiceRegistration, ServiceStatus,
};

const UNIT_DIR: &str = "/etc/systemd/system";

pub struct SystemdServiceManager {
    /// Directory unit files are written to
    unit_dir: PathBuf,
}

impl SystemdServiceManager {
    pub fn new() -> Self {
        Self::with_unit_dir(UNIT_DIR)
    }

    pub fn with_unit_dir(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
        }
    }

    fn unit_path(&self, service_name: &str) -> PathBuf {
        self.unit_dir.join(format!("{}.service", unit_name(service_name)))
    }

    fn remove_unit_file(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

impl Default for SystemdServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// systemd unit name for a service name: `ServerResourceAgent` becomes
/// `server-resource-agent`, spaces and underscores become dashes.
pub fn unit_name(service_name: &str) -> String {
    let mut out = String::with_capacity(service_name.len() + 4);
    let mut prev_lower = false;
    for c in service_name.trim().chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
            prev_lower = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

pub fn generate_unit_file(registration: &ServiceRegistration) -> String {
    let mut exec = quote_arg(&registration.executable.to_string_lossy());
    for arg in &registration.launch_arguments {
        exec.push(' ');
        exec.push_str(&quote_arg(&arg.to_string_lossy()));
    }

    format!(
        r#"[Unit]
Description={display_name}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exec}
Restart=on-failure
RestartSec=10
KillSignal=SIGTERM
TimeoutStopSec=10

[Install]
WantedBy=multi-user.target
"#,
        display_name = registration.display_name,
        exec = exec,
    )
}

/// Parse `systemctl show --property=LoadState,ActiveState` output.
pub fn parse_show_output(service_name: &str, stdout: &str) -> Result<ServiceStatus> {
    let mut load_state = None;
    let mut active_state = None;
    for line in stdout.lines() {
        match line.trim().split_once('=') {
            Some(("LoadState", v)) => load_state = Some(v),
            Some(("ActiveState", v)) => active_state = Some(v),
            _ => {}
        }
    }

    match load_state {
        Some("not-found") | None => {
            return Err(ServiceError::NotInstalled(service_name.to_string()).into())
        }
        Some(_) => {}
    }

    match active_state {
        Some("active") | Some("reloading") => Ok(ServiceStatus::Running),
        Some("inactive") | Some("failed") => Ok(ServiceStatus::Stopped),
        Some("activating") => Ok(ServiceStatus::StartPending),
        Some("deactivating") => Ok(ServiceStatus::StopPending),
        Some(other) => bail!("unknown ActiveState '{}' for {}", other, service_name),
        None => bail!("systemctl show reported no ActiveState for {}", service_name),
    }
}

fn systemctl(args: &[&str]) -> Result<String> {
    debug!("systemctl {}", args.join(" "));
    let output = std::process::Command::new("systemctl")
        .args(args)
        .output()
        .with_context(|| format!("failed to run systemctl {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("systemctl {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl ServiceManager for SystemdServiceManager {
    fn query_status(&self, name: &str) -> Result<ServiceStatus> {
        let unit = unit_name(name);
        let stdout = systemctl(&["show", &unit, "--property=LoadState,ActiveState"])?;
        parse_show_output(name, &stdout)
    }

    fn start(&self, name: &str) -> Result<()> {
        info!("starting systemd unit: {}", unit_name(name));
        systemctl(&["start", "--no-block", &unit_name(name)])?;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        info!("stopping systemd unit: {}", unit_name(name));
        systemctl(&["stop", "--no-block", &unit_name(name)])?;
        Ok(())
    }

    fn install(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()> {
        let path = self.unit_path(&registration.name);
        info!("installing systemd unit: {}", path.display());

        std::fs::create_dir_all(&self.unit_dir)
            .with_context(|| format!("failed to create {}", self.unit_dir.display()))?;
        std::fs::write(&path, generate_unit_file(registration))
            .with_context(|| format!("failed to write {}", path.display()))?;
        state.record(InstallStep::UnitWritten(path));

        systemctl(&["daemon-reload"])?;
        state.record(InstallStep::Reloaded);
        Ok(())
    }

    fn commit(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()> {
        systemctl(&["enable", &unit_name(&registration.name)])?;
        state.record(InstallStep::Enabled);
        state.mark_committed();
        info!("systemd unit enabled: {}", unit_name(&registration.name));
        Ok(())
    }

    fn rollback(&self, registration: &ServiceRegistration, state: &InstallState) -> Result<()> {
        let unit = unit_name(&registration.name);
        let mut first_error = None;
        let mut reload = false;

        for step in state.steps().iter().rev() {
            let result = match step {
                InstallStep::Enabled => systemctl(&["disable", &unit]).map(|_| ()),
                InstallStep::UnitWritten(path) => self.remove_unit_file(path),
                InstallStep::Reloaded => {
                    reload = true;
                    Ok(())
                }
                InstallStep::Registered | InstallStep::RecoveryConfigured => Ok(()),
            };
            if let Err(e) = result {
                warn!("rollback step {:?} failed: {:#}", step, e);
                first_error.get_or_insert(e);
            }
        }

        if reload {
            if let Err(e) = systemctl(&["daemon-reload"]) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.context(format!("rollback of {} incomplete", unit))),
            None => Ok(()),
        }
    }

    fn uninstall(&self, registration: &ServiceRegistration) -> Result<()> {
        let unit = unit_name(&registration.name);
        info!("uninstalling systemd unit: {}", unit);

        if let Err(e) = systemctl(&["disable", &unit]) {
            warn!("failed to disable {}: {:#}", unit, e);
        }

        self.remove_unit_file(&self.unit_path(&registration.name))?;
        systemctl(&["daemon-reload"])?;

        info!("systemd unit removed: {}", unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(executable: &str) -> ServiceRegistration {
        ServiceRegistration {
            name: "ServerResourceAgent".to_string(),
            display_name: "Server Resource Agent".to_string(),
            description: "Hosts the server resource agent".to_string(),
            executable: executable.into(),
            launch_arguments: vec![],
        }
    }

    #[test]
    fn test_unit_name_from_camel_case() {
        assert_eq!(unit_name("ServerResourceAgent"), "server-resource-agent");
    }

    #[test]
    fn test_unit_name_from_spaces_and_punctuation() {
        assert_eq!(unit_name("CloudStack ServerResource"), "cloud-stack-server-resource");
        assert_eq!(unit_name("my_agent  svc "), "my-agent-svc");
        assert_eq!(unit_name("agent-shell"), "agent-shell");
    }

    #[test]
    fn test_unit_file_has_exec_start_without_arguments() {
        let unit = generate_unit_file(&registration("/opt/agent/agent-shell"));
        assert!(unit.contains("ExecStart=/opt/agent/agent-shell\n"));
        assert!(unit.contains("Description=Server Resource Agent\n"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_unit_file_quotes_paths_with_spaces() {
        let unit = generate_unit_file(&registration("/opt/my agent/agent-shell"));
        assert!(unit.contains("ExecStart=\"/opt/my agent/agent-shell\"\n"));
    }

    #[test]
    fn test_parse_running_unit() {
        let out = "LoadState=loaded\nActiveState=active\n";
        assert_eq!(parse_show_output("a", out).unwrap(), ServiceStatus::Running);
    }

    #[test]
    fn test_parse_property_order_does_not_matter() {
        let out = "ActiveState=deactivating\nLoadState=loaded\n";
        assert_eq!(parse_show_output("a", out).unwrap(), ServiceStatus::StopPending);
    }

    #[test]
    fn test_parse_failed_unit_is_stopped() {
        let out = "LoadState=loaded\nActiveState=failed\n";
        assert_eq!(parse_show_output("a", out).unwrap(), ServiceStatus::Stopped);
    }

    #[test]
    fn test_parse_missing_unit_is_not_installed() {
        let out = "LoadState=not-found\nActiveState=inactive\n";
        let err = parse_show_output("a", out).unwrap_err();
        assert!(err.downcast_ref::<ServiceError>().is_some());
    }

    #[test]
    fn test_parse_unknown_active_state_errors() {
        let out = "LoadState=loaded\nActiveState=maintenance\n";
        assert!(parse_show_output("a", out).is_err());
    }

    #[test]
    fn test_rollback_removes_written_unit_file() {
        let dir = std::env::temp_dir().join(format!("shell-linux-rollback-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mgr = SystemdServiceManager::with_unit_dir(&dir);
        let reg = registration("/opt/agent/agent-shell");

        let path = mgr.unit_path(&reg.name);
        std::fs::write(&path, generate_unit_file(&reg)).unwrap();

        let mut state = InstallState::new();
        state.record(InstallStep::UnitWritten(path.clone()));
        mgr.rollback(&reg, &state).unwrap();

        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
