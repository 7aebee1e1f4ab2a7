use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

/// Current state of a registered service as reported by the OS service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::StartPending => "start pending",
            ServiceStatus::StopPending => "stop pending",
            ServiceStatus::Running => "running",
            ServiceStatus::ContinuePending => "continue pending",
            ServiceStatus::PausePending => "pause pending",
            ServiceStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Metadata the OS needs to register the agent as a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    /// Name the service manager knows the service by
    pub name: String,
    /// Human readable name shown in service consoles
    pub display_name: String,
    pub description: String,
    /// Binary the service manager launches
    pub executable: PathBuf,
    /// Arguments passed on launch (empty means service mode)
    pub launch_arguments: Vec<OsString>,
}

/// One completed step of an install, recorded so it can be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    /// Service created in the service manager's database
    Registered,
    /// Unit file written to disk
    UnitWritten(PathBuf),
    /// Service manager reloaded its configuration
    Reloaded,
    /// Service enabled for automatic start
    Enabled,
    /// Restart-on-failure policy applied
    RecoveryConfigured,
}

/// Transactional state carried from install through commit or rollback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallState {
    steps: Vec<InstallStep>,
    committed: bool,
}

impl InstallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: InstallStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[InstallStep] {
        &self.steps
    }

    pub fn contains(&self, step: &InstallStep) -> bool {
        self.steps.contains(step)
    }

    pub fn mark_committed(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service '{0}' is not installed")]
    NotInstalled(String),
    #[error("service '{0}' is already installed")]
    AlreadyInstalled(String),
}

/// Capability interface over the host's service manager.
///
/// Every call opens its own handle and releases it before returning.
pub trait ServiceManager: Send + Sync {
    /// Query the current status. Fails if the service cannot be opened.
    fn query_status(&self, name: &str) -> Result<ServiceStatus>;

    /// Request a start without waiting for it to complete
    fn start(&self, name: &str) -> Result<()>;

    /// Request a stop without waiting for it to complete
    fn stop(&self, name: &str) -> Result<()>;

    /// First install phase. Every completed step is recorded in `state`,
    /// including on failure, so a rollback knows what to undo.
    fn install(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()>;

    /// Second install phase, finalizing the registration.
    fn commit(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()>;

    /// Undo the steps recorded in `state`, most recent first.
    fn rollback(&self, registration: &ServiceRegistration, state: &InstallState) -> Result<()>;

    /// Remove the service registration
    fn uninstall(&self, registration: &ServiceRegistration) -> Result<()>;
}
