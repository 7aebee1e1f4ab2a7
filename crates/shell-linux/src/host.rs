//! Foreground service host for systemd `Type=simple` units.
//!
//! systemd launches the binary directly and signals SIGTERM to stop it, so
//! hosting the service means running the entry and translating SIGTERM (or
//! Ctrl+C when run by hand) into a stop request.

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use shell_platform::host::{stop_channel, ServiceEntry, ServiceHost, StopTrigger};

pub struct SystemdServiceHost;

impl ServiceHost for SystemdServiceHost {
    fn run(&self, service_name: &str, entry: ServiceEntry) -> Result<()> {
        info!("running {} under systemd", service_name);

        let (trigger, signal) = stop_channel();
        std::thread::Builder::new()
            .name("stop-signals".to_string())
            .spawn(move || {
                if let Err(e) = watch_stop_signals(trigger) {
                    error!("stop signal watcher failed: {:#}", e);
                }
            })
            .context("failed to spawn stop signal watcher")?;

        entry(signal)
    }
}

fn watch_stop_signals(trigger: StopTrigger) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    runtime.block_on(async move {
        let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            _ = terminate.recv() => info!("received SIGTERM, stopping"),
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, stopping"),
        }
        trigger.trigger();
        Ok::<_, anyhow::Error>(())
    })
}
