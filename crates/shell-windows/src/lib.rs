// Windows platform implementations

#[cfg(target_os = "windows")]
pub mod elevation;

#[cfg(target_os = "windows")]
pub mod host;

#[cfg(target_os = "windows")]
pub mod service;
