// Linux platform implementations

#[cfg(target_os = "linux")]
pub mod host;

#[cfg(target_os = "linux")]
pub mod privilege;

#[cfg(target_os = "linux")]
pub mod service;
