//! Windows Service Control Manager (SCM): install/uninstall/start/stop the agent service.

use std::ffi::OsStr;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
    ServiceType,
};
use windows_service::service_manager::{ServiceManager as Scm, ServiceManagerAccess};

use shell_platform::service::{
    InstallState, InstallStep, ServiceManager, ServiceRegistration, ServiceStatus,
};

/// Restart after 10s, 30s, then 60s; reset the failure count daily.
const RECOVERY_ACTIONS: &str = "actions=restart/10000/restart/30000/restart/60000";
const RECOVERY_RESET: &str = "reset=86400";

pub struct WindowsServiceManager;

fn connect(access: ServiceManagerAccess) -> Result<Scm> {
    Scm::local_computer(None::<&str>, access)
        .context("failed to connect to the service control manager")
}

fn open(name: &str, access: ServiceAccess) -> Result<Service> {
    connect(ServiceManagerAccess::CONNECT)?
        .open_service(name, access)
        .with_context(|| format!("failed to open service {}", name))
}

fn map_state(state: ServiceState) -> ServiceStatus {
    match state {
        ServiceState::Stopped => ServiceStatus::Stopped,
        ServiceState::StartPending => ServiceStatus::StartPending,
        ServiceState::StopPending => ServiceStatus::StopPending,
        ServiceState::Running => ServiceStatus::Running,
        ServiceState::ContinuePending => ServiceStatus::ContinuePending,
        ServiceState::PausePending => ServiceStatus::PausePending,
        ServiceState::Paused => ServiceStatus::Paused,
    }
}

impl ServiceManager for WindowsServiceManager {
    fn query_status(&self, name: &str) -> Result<ServiceStatus> {
        let service = open(name, ServiceAccess::QUERY_STATUS)?;
        let status = service
            .query_status()
            .with_context(|| format!("failed to query status of {}", name))?;
        Ok(map_state(status.current_state))
    }

    fn start(&self, name: &str) -> Result<()> {
        info!("starting service: {}", name);
        let service = open(name, ServiceAccess::START)?;
        service
            .start(&[] as &[&OsStr])
            .with_context(|| format!("failed to start {}", name))
    }

    fn stop(&self, name: &str) -> Result<()> {
        info!("stopping service: {}", name);
        let service = open(name, ServiceAccess::STOP)?;
        service
            .stop()
            .with_context(|| format!("failed to stop {}", name))?;
        Ok(())
    }

    fn install(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()> {
        info!("installing Windows service: {}", registration.name);

        let scm = connect(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
        let info = ServiceInfo {
            name: registration.name.clone().into(),
            display_name: registration.display_name.clone().into(),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: registration.executable.clone(),
            launch_arguments: registration.launch_arguments.clone(),
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };

        let service = scm
            .create_service(&info, ServiceAccess::CHANGE_CONFIG | ServiceAccess::QUERY_STATUS)
            .with_context(|| format!("failed to create service {}", registration.name))?;
        state.record(InstallStep::Registered);

        service
            .set_description(&registration.description)
            .context("failed to set service description")?;

        info!("service registered: {}", registration.name);
        Ok(())
    }

    fn commit(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()> {
        // Recovery: restart on failure
        let output = std::process::Command::new("sc.exe")
            .args(["failure", &registration.name, RECOVERY_RESET, RECOVERY_ACTIONS])
            .output()
            .context("failed to run sc.exe failure")?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            bail!("sc.exe failure failed: {}", stdout.trim());
        }
        state.record(InstallStep::RecoveryConfigured);
        state.mark_committed();

        info!("service installed: {}", registration.name);
        Ok(())
    }

    fn rollback(&self, registration: &ServiceRegistration, state: &InstallState) -> Result<()> {
        if !state.contains(&InstallStep::Registered) {
            return Ok(());
        }
        warn!("rolling back registration of {}", registration.name);
        open(&registration.name, ServiceAccess::DELETE)?
            .delete()
            .with_context(|| format!("failed to delete service {}", registration.name))
    }

    fn uninstall(&self, registration: &ServiceRegistration) -> Result<()> {
        info!("uninstalling Windows service: {}", registration.name);
        open(&registration.name, ServiceAccess::DELETE)?
            .delete()
            .with_context(|| format!("failed to delete service {}", registration.name))?;
        info!("service uninstalled: {}", registration.name);
        Ok(())
    }
}
