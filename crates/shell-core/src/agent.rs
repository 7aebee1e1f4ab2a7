use anyhow::Result;
use async_trait::async_trait;

use shell_platform::host::StopSignal;

/// Entry points of the agent hosted by the shell.
#[async_trait]
pub trait AgentMain: Send + Sync {
    /// Run until the service framework requests a stop through `stop`.
    async fn run_as_service(&self, stop: StopSignal) -> Result<()>;

    /// Run in the foreground. `args` is the full argument list, `--console` included.
    async fn run_console(&self, args: Vec<String>) -> Result<()>;
}
