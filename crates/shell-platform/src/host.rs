//! Handing control to the OS service framework.

use anyhow::Result;
use tokio::sync::watch;

/// Entry point run once the service framework has started the service.
pub type ServiceEntry = Box<dyn FnOnce(StopSignal) -> Result<()> + Send>;

/// Creates a connected stop trigger/signal pair.
pub fn stop_channel() -> (StopTrigger, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopTrigger { tx }, StopSignal { rx })
}

/// Requests the running agent to stop.
#[derive(Debug, Clone)]
pub struct StopTrigger {
    tx: watch::Sender<bool>,
}

impl StopTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with every receiver dropped
        self.tx.send_replace(true);
    }
}

/// Resolves once a stop has been requested.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until stop is requested. Also returns if the trigger is dropped.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

pub trait ServiceHost {
    /// Run `entry` under the OS service framework, blocking until the
    /// service has stopped.
    fn run(&self, service_name: &str, entry: ServiceEntry) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_signal_resolves_after_trigger() {
        let (trigger, mut signal) = stop_channel();
        assert!(!signal.is_stopped());

        trigger.trigger();
        signal.stopped().await;
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_signal_resolves_when_trigger_dropped() {
        let (trigger, mut signal) = stop_channel();
        drop(trigger);
        signal.stopped().await;
        assert!(!signal.is_stopped());
    }

    #[tokio::test]
    async fn test_cloned_signals_all_observe_stop() {
        let (trigger, signal) = stop_channel();
        let mut a = signal.clone();
        let mut b = signal;
        trigger.trigger();
        a.stopped().await;
        b.stopped().await;
    }
}
