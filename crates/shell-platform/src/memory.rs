//! In-memory service manager and host, for exercising lifecycle flows
//! without touching the real OS service manager.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};

use crate::host::{stop_channel, ServiceEntry, ServiceHost};
use crate::service::{
    InstallState, InstallStep, ServiceError, ServiceManager, ServiceRegistration, ServiceStatus,
};

/// A call made against [`MemoryServiceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    QueryStatus,
    Start,
    Stop,
    Install,
    Commit,
    Rollback,
    Uninstall,
}

/// How a start or stop request settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    /// Target state is reached as soon as it is requested
    #[default]
    Immediate,
    /// Service hangs in the pending state forever
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    status: Option<ServiceStatus>,
    registration: Option<ServiceRegistration>,
    calls: Vec<Call>,
    failing: HashSet<Call>,
    start: Transition,
    stop: Transition,
}

#[derive(Debug, Default)]
pub struct MemoryServiceManager {
    inner: Mutex<Inner>,
}

impl MemoryServiceManager {
    /// A manager with no service registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager where the service is already registered with `status`
    pub fn with_status(status: ServiceStatus) -> Self {
        let manager = Self::new();
        manager.lock().status = Some(status);
        manager
    }

    /// Make every subsequent `call` fail
    pub fn fail_on(self, call: Call) -> Self {
        self.lock().failing.insert(call);
        self
    }

    pub fn start_transition(self, transition: Transition) -> Self {
        self.lock().start = transition;
        self
    }

    pub fn stop_transition(self, transition: Transition) -> Self {
        self.lock().stop = transition;
        self
    }

    /// Current status, `None` when not registered
    pub fn status(&self) -> Option<ServiceStatus> {
        self.lock().status
    }

    pub fn registration(&self) -> Option<ServiceRegistration> {
        self.lock().registration.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls other than status queries
    pub fn mutating_calls(&self) -> usize {
        self.lock().calls.iter().filter(|c| **c != Call::QueryStatus).count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, call: Call) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.failing.contains(&call) {
            bail!("injected {:?} failure", call);
        }
        Ok(inner)
    }
}

impl ServiceManager for MemoryServiceManager {
    fn query_status(&self, name: &str) -> Result<ServiceStatus> {
        let inner = self.enter(Call::QueryStatus)?;
        inner
            .status
            .ok_or_else(|| ServiceError::NotInstalled(name.to_string()).into())
    }

    fn start(&self, name: &str) -> Result<()> {
        let mut inner = self.enter(Call::Start)?;
        if inner.status.is_none() {
            return Err(ServiceError::NotInstalled(name.to_string()).into());
        }
        inner.status = Some(match inner.start {
            Transition::Immediate => ServiceStatus::Running,
            Transition::Hang => ServiceStatus::StartPending,
        });
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        let mut inner = self.enter(Call::Stop)?;
        if inner.status.is_none() {
            return Err(ServiceError::NotInstalled(name.to_string()).into());
        }
        inner.status = Some(match inner.stop {
            Transition::Immediate => ServiceStatus::Stopped,
            Transition::Hang => ServiceStatus::StopPending,
        });
        Ok(())
    }

    fn install(&self, registration: &ServiceRegistration, state: &mut InstallState) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(Call::Install);
        if inner.status.is_some() {
            return Err(ServiceError::AlreadyInstalled(registration.name.clone()).into());
        }

        // Registration lands before an injected failure so rollback has work to do
        inner.status = Some(ServiceStatus::Stopped);
        inner.registration = Some(registration.clone());
        state.record(InstallStep::Registered);

        if inner.failing.contains(&Call::Install) {
            bail!("injected Install failure");
        }
        Ok(())
    }

    fn commit(&self, _registration: &ServiceRegistration, state: &mut InstallState) -> Result<()> {
        let _inner = self.enter(Call::Commit)?;
        state.record(InstallStep::Enabled);
        state.mark_committed();
        Ok(())
    }

    fn rollback(&self, _registration: &ServiceRegistration, state: &InstallState) -> Result<()> {
        let mut inner = self.enter(Call::Rollback)?;
        if state.contains(&InstallStep::Registered) {
            inner.status = None;
            inner.registration = None;
        }
        Ok(())
    }

    fn uninstall(&self, registration: &ServiceRegistration) -> Result<()> {
        let mut inner = self.enter(Call::Uninstall)?;
        if inner.status.is_none() {
            return Err(ServiceError::NotInstalled(registration.name.clone()).into());
        }
        inner.status = None;
        inner.registration = None;
        Ok(())
    }
}

/// Service host that runs the entry inline with stop already requested.
#[derive(Debug, Default)]
pub struct MemoryServiceHost {
    runs: Mutex<Vec<String>>,
}

impl MemoryServiceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service names the host was asked to run
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ServiceHost for MemoryServiceHost {
    fn run(&self, service_name: &str, entry: ServiceEntry) -> Result<()> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(service_name.to_string());

        let (trigger, signal) = stop_channel();
        trigger.trigger();
        entry(signal)
    }
}
