use std::time::Duration;

use shell_platform::service::ServiceStatus;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("unsupported invocation: {0:?}")]
    UnsupportedInvocation(Vec<String>),

    #[error("{0} requires administrative privileges")]
    NotElevated(&'static str),

    /// Install failed; `rollback` holds a failure of the cleanup that followed
    #[error("failed to install service {service}: {cause:#}{}", rollback_note(.rollback))]
    Install {
        service: String,
        cause: anyhow::Error,
        rollback: Option<anyhow::Error>,
    },

    #[error("failed to uninstall service {service}: {cause:#}")]
    Uninstall { service: String, cause: anyhow::Error },

    #[error("failed to start service {service}: {cause:#}")]
    Start { service: String, cause: anyhow::Error },

    #[error("failed to stop service {service}: {cause:#}")]
    Stop { service: String, cause: anyhow::Error },

    #[error("service {service} did not become {expected} within {timeout:?} (last status: {last})")]
    Timeout {
        service: String,
        expected: ServiceStatus,
        last: ServiceStatus,
        timeout: Duration,
    },

    #[error("agent failed: {0:#}")]
    Agent(anyhow::Error),

    #[error("service host failed: {0:#}")]
    Host(anyhow::Error),

    #[error("failed to build agent runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn rollback_note(rollback: &Option<anyhow::Error>) -> String {
    match rollback {
        Some(e) => format!(" (rollback also failed: {:#})", e),
        None => String::new(),
    }
}

impl ShellError {
    pub fn is_usage(&self) -> bool {
        matches!(self, ShellError::UnsupportedInvocation(_))
    }
}
