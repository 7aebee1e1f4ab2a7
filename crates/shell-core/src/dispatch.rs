//! Top-level dispatch: one invocation, one action.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use shell_platform::host::{ServiceHost, StopSignal};
use shell_platform::service::ServiceManager;

use crate::agent::AgentMain;
use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::invocation::Invocation;
use crate::lifecycle::Lifecycle;

pub struct Shell<'a> {
    config: &'a ShellConfig,
    manager: &'a dyn ServiceManager,
    host: &'a dyn ServiceHost,
    executable: PathBuf,
    privileged: bool,
}

impl<'a> Shell<'a> {
    pub fn new(
        config: &'a ShellConfig,
        manager: &'a dyn ServiceManager,
        host: &'a dyn ServiceHost,
        executable: PathBuf,
    ) -> Self {
        Self {
            config,
            manager,
            host,
            executable,
            privileged: false,
        }
    }

    /// Whether the process may register services (Administrator / root)
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn lifecycle(&self) -> Lifecycle<'a> {
        Lifecycle::new(
            self.manager,
            self.config.registration(self.executable.clone()),
            self.config.status_timeout(),
        )
    }

    pub fn dispatch(&self, invocation: Invocation, agent: Arc<dyn AgentMain>) -> Result<(), ShellError> {
        let name = &self.config.service_name;
        match invocation {
            Invocation::Service => {
                info!("{} running as a service", name);
                self.run_service(agent)
            }
            Invocation::Install => {
                self.require_privileges("install")?;
                info!("installing and starting {}", name);
                let lifecycle = self.lifecycle();
                lifecycle.install()?;
                lifecycle.start()?;
                info!("{} installed, running: {}", name, lifecycle.is_running());
                Ok(())
            }
            Invocation::Uninstall => {
                self.require_privileges("uninstall")?;
                info!("stopping and uninstalling {}", name);
                let lifecycle = self.lifecycle();
                lifecycle.stop()?;
                lifecycle.uninstall()?;
                info!("{} uninstalled, state: {:?}", name, lifecycle.run_state());
                Ok(())
            }
            Invocation::Console { args } => {
                info!("{} running as console app", name);
                block_on_agent(async move { agent.run_console(args).await })
            }
        }
    }

    fn require_privileges(&self, action: &'static str) -> Result<(), ShellError> {
        if self.privileged {
            Ok(())
        } else {
            error!("{} requires an elevated (Administrator/root) session", action);
            Err(ShellError::NotElevated(action))
        }
    }

    fn run_service(&self, agent: Arc<dyn AgentMain>) -> Result<(), ShellError> {
        let entry = Box::new(move |stop: StopSignal| -> anyhow::Result<()> {
            block_on_agent(async move { agent.run_as_service(stop).await })?;
            Ok(())
        });

        self.host
            .run(&self.config.service_name, entry)
            .map_err(|e| match e.downcast::<ShellError>() {
                Ok(shell) => shell,
                Err(e) => ShellError::Host(e),
            })
    }
}

/// Drive an agent entry point to completion on a fresh runtime.
fn block_on_agent<F>(fut: F) -> Result<(), ShellError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(fut).map_err(ShellError::Agent)
}
