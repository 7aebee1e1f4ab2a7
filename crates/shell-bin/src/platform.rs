//! Selects the service manager and host backends for this platform.

use shell_platform::host::ServiceHost;
use shell_platform::service::ServiceManager;

#[cfg(target_os = "linux")]
pub fn service_manager() -> Box<dyn ServiceManager> {
    Box::new(shell_linux::service::SystemdServiceManager::new())
}

#[cfg(target_os = "windows")]
pub fn service_manager() -> Box<dyn ServiceManager> {
    Box::new(shell_windows::service::WindowsServiceManager)
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn service_manager() -> Box<dyn ServiceManager> {
    Box::new(unsupported::Unsupported)
}

#[cfg(target_os = "linux")]
pub fn service_host() -> Box<dyn ServiceHost> {
    Box::new(shell_linux::host::SystemdServiceHost)
}

#[cfg(target_os = "windows")]
pub fn service_host() -> Box<dyn ServiceHost> {
    Box::new(shell_windows::host::WindowsServiceHost)
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn service_host() -> Box<dyn ServiceHost> {
    Box::new(unsupported::Unsupported)
}

/// Whether this process may register services
pub fn is_elevated() -> bool {
    #[cfg(target_os = "windows")]
    {
        shell_windows::elevation::is_elevated()
    }
    #[cfg(target_os = "linux")]
    {
        shell_linux::privilege::is_root()
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        false
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod unsupported {
    use anyhow::{bail, Result};

    use shell_platform::host::{ServiceEntry, ServiceHost};
    use shell_platform::service::{
        InstallState, ServiceManager, ServiceRegistration, ServiceStatus,
    };

    /// Backend for platforms without a supported service manager. Status queries
    /// fail, so the service always reads as not installed; console mode still works.
    pub struct Unsupported;

    impl ServiceManager for Unsupported {
        fn query_status(&self, _name: &str) -> Result<ServiceStatus> {
            bail!("service management not supported on this platform")
        }

        fn start(&self, _name: &str) -> Result<()> {
            bail!("service management not supported on this platform")
        }

        fn stop(&self, _name: &str) -> Result<()> {
            bail!("service management not supported on this platform")
        }

        fn install(&self, _registration: &ServiceRegistration, _state: &mut InstallState) -> Result<()> {
            bail!("service installation not supported on this platform")
        }

        fn commit(&self, _registration: &ServiceRegistration, _state: &mut InstallState) -> Result<()> {
            bail!("service installation not supported on this platform")
        }

        fn rollback(&self, _registration: &ServiceRegistration, _state: &InstallState) -> Result<()> {
            Ok(())
        }

        fn uninstall(&self, _registration: &ServiceRegistration) -> Result<()> {
            bail!("service management not supported on this platform")
        }
    }

    impl ServiceHost for Unsupported {
        fn run(&self, _service_name: &str, _entry: ServiceEntry) -> Result<()> {
            bail!("running as a service is not supported on this platform, use --console")
        }
    }
}
