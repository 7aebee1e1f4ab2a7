//! Placeholder agent: logs a heartbeat until asked to stop.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use shell_core::AgentMain;
use shell_platform::host::{stop_channel, StopSignal};

pub struct ResourceAgent {
    heartbeat: Duration,
}

impl ResourceAgent {
    pub fn new(heartbeat: Duration) -> Self {
        Self { heartbeat }
    }

    /// Beat until `stop` fires. Returns the number of heartbeats logged.
    async fn run_until_stopped(&self, mut stop: StopSignal) -> u64 {
        let mut interval = tokio::time::interval(self.heartbeat);
        interval.tick().await; // consume the immediate first tick
        let mut beats = 0u64;

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = interval.tick() => {
                    beats += 1;
                    info!("agent heartbeat #{}", beats);
                }
            }
        }

        info!("agent stopping after {} heartbeats", beats);
        beats
    }
}

#[async_trait]
impl AgentMain for ResourceAgent {
    async fn run_as_service(&self, stop: StopSignal) -> Result<()> {
        info!("agent started (service)");
        self.run_until_stopped(stop).await;
        Ok(())
    }

    async fn run_console(&self, args: Vec<String>) -> Result<()> {
        info!("agent started (console), arguments: {:?}", args);
        let (trigger, stop) = stop_channel();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received");
                    trigger.trigger();
                }
                Err(e) => {
                    warn!("failed to listen for ctrl-c: {}", e);
                    // Keep the trigger alive so the agent is not stopped spuriously
                    std::future::pending::<()>().await;
                    drop(trigger);
                }
            }
        });

        self.run_until_stopped(stop).await;
        Ok(())
    }
}
