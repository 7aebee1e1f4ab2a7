//! Install/uninstall/start/stop flows against a [`ServiceManager`].
//!
//! Every flow is idempotent: when the registration is already in the
//! requested state it returns without touching the service manager beyond a
//! status query. Failures are logged here and returned to the caller.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use shell_platform::service::{InstallState, ServiceManager, ServiceRegistration, ServiceStatus};

use crate::error::ShellError;

pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The registration state as the shell sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotInstalled,
    Stopped,
    Running,
    /// Installed but in a transitional or paused state
    Other(ServiceStatus),
}

/// True if the service manager can report a status for `name`.
/// Any query failure counts as not installed.
pub fn is_installed(manager: &dyn ServiceManager, name: &str) -> bool {
    match manager.query_status(name) {
        Ok(_) => true,
        Err(e) => {
            debug!("treating {} as not installed: {:#}", name, e);
            false
        }
    }
}

pub fn is_running(manager: &dyn ServiceManager, name: &str) -> bool {
    if !is_installed(manager, name) {
        return false;
    }
    matches!(manager.query_status(name), Ok(ServiceStatus::Running))
}

pub fn run_state(manager: &dyn ServiceManager, name: &str) -> RunState {
    match manager.query_status(name) {
        Ok(ServiceStatus::Running) => RunState::Running,
        Ok(ServiceStatus::Stopped) => RunState::Stopped,
        Ok(other) => RunState::Other(other),
        Err(_) => RunState::NotInstalled,
    }
}

#[derive(Debug)]
enum WaitFailure {
    Query(anyhow::Error),
    TimedOut(ServiceStatus),
}

/// Poll until `name` reports `target` or `timeout` passes.
fn wait_for_status(
    manager: &dyn ServiceManager,
    name: &str,
    target: ServiceStatus,
    timeout: Duration,
) -> Result<(), WaitFailure> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = manager.query_status(name).map_err(WaitFailure::Query)?;
        if status == target {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitFailure::TimedOut(status));
        }
        debug!("{} is {}, waiting for {}", name, status, target);
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Two-phase install: `begin` then `commit`, `rollback` on failure of either.
pub struct InstallTransaction<'a> {
    manager: &'a dyn ServiceManager,
    registration: &'a ServiceRegistration,
    state: InstallState,
}

impl<'a> InstallTransaction<'a> {
    pub fn new(manager: &'a dyn ServiceManager, registration: &'a ServiceRegistration) -> Self {
        Self {
            manager,
            registration,
            state: InstallState::new(),
        }
    }

    pub fn begin(&mut self) -> anyhow::Result<()> {
        self.manager.install(self.registration, &mut self.state)
    }

    pub fn commit(&mut self) -> anyhow::Result<()> {
        self.manager.commit(self.registration, &mut self.state)
    }

    pub fn rollback(&self) -> anyhow::Result<()> {
        self.manager.rollback(self.registration, &self.state)
    }

    pub fn state(&self) -> &InstallState {
        &self.state
    }

    /// Begin and commit. On failure the recorded steps are rolled back; a
    /// rollback failure is attached to the error without replacing its cause.
    pub fn run(mut self) -> Result<InstallState, ShellError> {
        let outcome = match self.begin() {
            Ok(()) => self.commit(),
            Err(e) => Err(e),
        };

        let cause = match outcome {
            Ok(()) => return Ok(self.state),
            Err(cause) => cause,
        };

        warn!(
            "install of {} failed after {} step(s), rolling back",
            self.registration.name,
            self.state.steps().len()
        );
        let rollback = match self.rollback() {
            Ok(()) => None,
            Err(e) => {
                warn!("rollback of {} failed: {:#}", self.registration.name, e);
                Some(e)
            }
        };

        Err(ShellError::Install {
            service: self.registration.name.clone(),
            cause,
            rollback,
        })
    }
}

/// Lifecycle operations for one service registration.
pub struct Lifecycle<'a> {
    manager: &'a dyn ServiceManager,
    registration: ServiceRegistration,
    timeout: Duration,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        manager: &'a dyn ServiceManager,
        registration: ServiceRegistration,
        timeout: Duration,
    ) -> Self {
        Self {
            manager,
            registration,
            timeout,
        }
    }

    pub fn registration(&self) -> &ServiceRegistration {
        &self.registration
    }

    fn name(&self) -> &str {
        &self.registration.name
    }

    pub fn is_installed(&self) -> bool {
        is_installed(self.manager, self.name())
    }

    pub fn is_running(&self) -> bool {
        is_running(self.manager, self.name())
    }

    pub fn run_state(&self) -> RunState {
        run_state(self.manager, self.name())
    }

    pub fn install(&self) -> Result<(), ShellError> {
        if self.is_installed() {
            info!("service {} already installed", self.name());
            return Ok(());
        }

        match InstallTransaction::new(self.manager, &self.registration).run() {
            Ok(state) => {
                info!(
                    "service {} installed ({} step(s))",
                    self.name(),
                    state.steps().len()
                );
                Ok(())
            }
            Err(e) => {
                error!("error occurred installing service: {}", e);
                Err(e)
            }
        }
    }

    pub fn uninstall(&self) -> Result<(), ShellError> {
        if !self.is_installed() {
            info!("service {} not installed, nothing to uninstall", self.name());
            return Ok(());
        }

        self.manager.uninstall(&self.registration).map_err(|cause| {
            let e = ShellError::Uninstall {
                service: self.name().to_string(),
                cause,
            };
            error!("error occurred uninstalling service: {}", e);
            e
        })?;

        info!("service {} uninstalled", self.name());
        Ok(())
    }

    pub fn start(&self) -> Result<(), ShellError> {
        if !self.is_installed() {
            info!("service {} not installed, nothing to start", self.name());
            return Ok(());
        }

        let result = self.transition(ServiceStatus::Running);
        if let Err(e) = &result {
            error!("error occurred starting service: {}", e);
        }
        result
    }

    pub fn stop(&self) -> Result<(), ShellError> {
        if !self.is_installed() {
            info!("service {} not installed, nothing to stop", self.name());
            return Ok(());
        }

        let result = self.transition(ServiceStatus::Stopped);
        if let Err(e) = &result {
            error!("error occurred stopping service: {}", e);
        }
        result
    }

    /// Request `target` (Running or Stopped) unless already there, then wait for it.
    fn transition(&self, target: ServiceStatus) -> Result<(), ShellError> {
        let name = self.name();
        let failed = |cause: anyhow::Error| match target {
            ServiceStatus::Running => ShellError::Start {
                service: name.to_string(),
                cause,
            },
            _ => ShellError::Stop {
                service: name.to_string(),
                cause,
            },
        };

        let current = self.manager.query_status(name).map_err(failed)?;
        if current == target {
            info!("service {} already {}", name, target);
            return Ok(());
        }

        let requested = match target {
            ServiceStatus::Running => self.manager.start(name),
            _ => self.manager.stop(name),
        };
        requested.map_err(failed)?;

        match wait_for_status(self.manager, name, target, self.timeout) {
            Ok(()) => {
                info!("service {} is {}", name, target);
                Ok(())
            }
            Err(WaitFailure::Query(cause)) => Err(failed(cause)),
            Err(WaitFailure::TimedOut(last)) => Err(ShellError::Timeout {
                service: name.to_string(),
                expected: target,
                last,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shell_platform::memory::{Call, MemoryServiceManager, Transition};
    use shell_platform::service::InstallStep;

    const SHORT_TIMEOUT: Duration = Duration::from_millis(50);

    fn registration() -> ServiceRegistration {
        ServiceRegistration {
            name: "TestAgent".to_string(),
            display_name: "Test Agent".to_string(),
            description: "test".to_string(),
            executable: "/opt/test/agent-shell".into(),
            launch_arguments: vec![],
        }
    }

    fn lifecycle(manager: &MemoryServiceManager) -> Lifecycle<'_> {
        Lifecycle::new(manager, registration(), SHORT_TIMEOUT)
    }

    #[test]
    fn test_default_timeout_is_ten_seconds() {
        assert_eq!(DEFAULT_STATUS_TIMEOUT, Duration::from_secs(10));
    }

    #[test]
    fn test_query_failure_means_not_installed() {
        let mgr = MemoryServiceManager::new();
        assert!(!is_installed(&mgr, "TestAgent"));
        assert!(!is_running(&mgr, "TestAgent"));
        assert_eq!(run_state(&mgr, "TestAgent"), RunState::NotInstalled);
        assert_eq!(mgr.mutating_calls(), 0);
    }

    #[test]
    fn test_is_running_only_when_running() {
        let stopped = MemoryServiceManager::with_status(ServiceStatus::Stopped);
        assert!(is_installed(&stopped, "TestAgent"));
        assert!(!is_running(&stopped, "TestAgent"));

        let running = MemoryServiceManager::with_status(ServiceStatus::Running);
        assert!(is_running(&running, "TestAgent"));

        let pending = MemoryServiceManager::with_status(ServiceStatus::StartPending);
        assert!(!is_running(&pending, "TestAgent"));
        assert_eq!(
            run_state(&pending, "TestAgent"),
            RunState::Other(ServiceStatus::StartPending)
        );
    }

    #[test]
    fn test_install_registers_and_commits() {
        let mgr = MemoryServiceManager::new();
        lifecycle(&mgr).install().unwrap();

        assert_eq!(mgr.status(), Some(ServiceStatus::Stopped));
        assert_eq!(mgr.registration(), Some(registration()));
        assert_eq!(
            mgr.calls(),
            vec![Call::QueryStatus, Call::Install, Call::Commit]
        );
    }

    #[test]
    fn test_install_twice_is_noop() {
        let mgr = MemoryServiceManager::new();
        let lc = lifecycle(&mgr);
        lc.install().unwrap();
        lc.install().unwrap();

        let installs = mgr.calls().iter().filter(|c| **c == Call::Install).count();
        assert_eq!(installs, 1);
        assert!(matches!(lc.run_state(), RunState::Stopped | RunState::Running));
    }

    #[test]
    fn test_install_failure_rolls_back() {
        let mgr = MemoryServiceManager::new().fail_on(Call::Install);
        let err = lifecycle(&mgr).install().unwrap_err();

        match err {
            ShellError::Install {
                service, rollback, ..
            } => {
                assert_eq!(service, "TestAgent");
                assert!(rollback.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(mgr.calls().contains(&Call::Rollback));
        assert!(!mgr.calls().contains(&Call::Commit));
        assert_eq!(mgr.status(), None);
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let mgr = MemoryServiceManager::new().fail_on(Call::Commit);
        let err = lifecycle(&mgr).install().unwrap_err();

        assert!(matches!(err, ShellError::Install { rollback: None, .. }));
        assert!(mgr.calls().ends_with(&[Call::Commit, Call::Rollback]));
        assert_eq!(mgr.status(), None);
    }

    #[test]
    fn test_rollback_failure_keeps_install_cause() {
        let mgr = MemoryServiceManager::new()
            .fail_on(Call::Install)
            .fail_on(Call::Rollback);
        let err = lifecycle(&mgr).install().unwrap_err();

        let message = err.to_string();
        match err {
            ShellError::Install {
                cause, rollback, ..
            } => {
                assert!(cause.to_string().contains("Install"));
                assert!(rollback.unwrap().to_string().contains("Rollback"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(message.contains("rollback also failed"));
    }

    #[test]
    fn test_transaction_records_state() {
        let mgr = MemoryServiceManager::new();
        let reg = registration();
        let mut tx = InstallTransaction::new(&mgr, &reg);
        tx.begin().unwrap();
        assert!(!tx.state().is_committed());
        tx.commit().unwrap();
        assert!(tx.state().is_committed());
        assert_eq!(
            tx.state().steps(),
            &[InstallStep::Registered, InstallStep::Enabled]
        );
    }

    #[test]
    fn test_uninstall_when_not_installed_is_noop() {
        let mgr = MemoryServiceManager::new();
        lifecycle(&mgr).uninstall().unwrap();
        assert_eq!(mgr.calls(), vec![Call::QueryStatus]);
    }

    #[test]
    fn test_uninstall_removes_registration() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Stopped);
        let lc = lifecycle(&mgr);
        lc.uninstall().unwrap();
        assert!(!lc.is_installed());
    }

    #[test]
    fn test_uninstall_failure_is_returned() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Stopped).fail_on(Call::Uninstall);
        let err = lifecycle(&mgr).uninstall().unwrap_err();
        assert!(matches!(err, ShellError::Uninstall { .. }));
        assert_eq!(mgr.status(), Some(ServiceStatus::Stopped));
    }

    #[test]
    fn test_start_not_installed_never_calls_start() {
        let mgr = MemoryServiceManager::new();
        lifecycle(&mgr).start().unwrap();
        assert!(!mgr.calls().contains(&Call::Start));
    }

    #[test]
    fn test_start_reaches_running() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Stopped);
        lifecycle(&mgr).start().unwrap();
        assert_eq!(mgr.status(), Some(ServiceStatus::Running));
    }

    #[test]
    fn test_start_when_running_is_noop() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Running);
        lifecycle(&mgr).start().unwrap();
        assert!(!mgr.calls().contains(&Call::Start));
    }

    #[test]
    fn test_start_timeout() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Stopped)
            .start_transition(Transition::Hang);
        let started = Instant::now();
        let err = lifecycle(&mgr).start().unwrap_err();

        match err {
            ShellError::Timeout {
                expected,
                last,
                timeout,
                ..
            } => {
                assert_eq!(expected, ServiceStatus::Running);
                assert_eq!(last, ServiceStatus::StartPending);
                assert_eq!(timeout, SHORT_TIMEOUT);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() >= SHORT_TIMEOUT);
    }

    #[test]
    fn test_start_failure_is_returned() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Stopped).fail_on(Call::Start);
        let err = lifecycle(&mgr).start().unwrap_err();
        assert!(matches!(err, ShellError::Start { .. }));
    }

    #[test]
    fn test_stop_reaches_stopped() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Running);
        lifecycle(&mgr).stop().unwrap();
        assert_eq!(mgr.status(), Some(ServiceStatus::Stopped));
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Stopped);
        lifecycle(&mgr).stop().unwrap();
        assert!(!mgr.calls().contains(&Call::Stop));
    }

    #[test]
    fn test_stop_not_installed_is_noop() {
        let mgr = MemoryServiceManager::new();
        lifecycle(&mgr).stop().unwrap();
        assert_eq!(mgr.mutating_calls(), 0);
    }

    #[test]
    fn test_stop_timeout() {
        let mgr = MemoryServiceManager::with_status(ServiceStatus::Running)
            .stop_transition(Transition::Hang);
        let err = lifecycle(&mgr).stop().unwrap_err();
        assert!(matches!(
            err,
            ShellError::Timeout {
                expected: ServiceStatus::Stopped,
                last: ServiceStatus::StopPending,
                ..
            }
        ));
    }
}
