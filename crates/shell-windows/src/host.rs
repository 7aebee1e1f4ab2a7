//! Runs the agent under the Windows service dispatcher.
//!
//! The SCM calls back into a plain `extern "system"` function, so the entry
//! point and its outcome are handed across through two process-wide slots
//! that are written once per dispatcher run.

use std::ffi::OsString;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle};
use windows_service::{define_windows_service, service_dispatcher};

use shell_platform::host::{stop_channel, ServiceEntry, ServiceHost};

struct PendingService {
    name: String,
    entry: ServiceEntry,
}

static PENDING: Mutex<Option<PendingService>> = Mutex::new(None);
static OUTCOME: Mutex<Option<Result<()>>> = Mutex::new(None);

define_windows_service!(ffi_service_main, service_main);

pub struct WindowsServiceHost;

impl ServiceHost for WindowsServiceHost {
    fn run(&self, service_name: &str, entry: ServiceEntry) -> Result<()> {
        *PENDING
            .lock()
            .map_err(|_| anyhow!("service hand-off slot poisoned"))? = Some(PendingService {
            name: service_name.to_string(),
            entry,
        });

        // Blocks until the service has stopped
        service_dispatcher::start(service_name, ffi_service_main)
            .context("failed to start service dispatcher (was this launched by the SCM?)")?;

        OUTCOME
            .lock()
            .map_err(|_| anyhow!("service outcome slot poisoned"))?
            .take()
            .unwrap_or(Ok(()))
    }
}

fn service_main(_arguments: Vec<OsString>) {
    let pending = PENDING.lock().ok().and_then(|mut slot| slot.take());
    let result = match pending {
        Some(pending) => run_service(pending),
        None => Err(anyhow!("service started without an entry point")),
    };

    if let Err(e) = &result {
        error!("service terminated with error: {:#}", e);
    }
    if let Ok(mut slot) = OUTCOME.lock() {
        *slot = Some(result);
    }
}

fn run_service(pending: PendingService) -> Result<()> {
    let (trigger, signal) = stop_channel();

    let event_handler = move |control| -> ServiceControlHandlerResult {
        match control {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                info!("service control manager requested stop");
                trigger.trigger();
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }
    };

    let status_handle = service_control_handler::register(&pending.name, event_handler)
        .context("failed to register service control handler")?;

    report(
        &status_handle,
        ServiceState::Running,
        ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
        0,
    )?;
    info!("service {} running", pending.name);

    let result = (pending.entry)(signal);

    report(&status_handle, ServiceState::StopPending, ServiceControlAccept::empty(), 0)?;
    let exit_code = if result.is_ok() { 0 } else { 1 };
    report(&status_handle, ServiceState::Stopped, ServiceControlAccept::empty(), exit_code)?;

    result
}

fn report(
    handle: &ServiceStatusHandle,
    state: ServiceState,
    controls_accepted: ServiceControlAccept,
    exit_code: u32,
) -> Result<()> {
    let wait_hint = match state {
        ServiceState::StopPending => Duration::from_secs(10),
        _ => Duration::default(),
    };
    handle
        .set_service_status(ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: state,
            controls_accepted,
            exit_code: ServiceExitCode::Win32(exit_code),
            checkpoint: 0,
            wait_hint,
            process_id: None,
        })
        .with_context(|| format!("failed to report service state {:?}", state))
}
