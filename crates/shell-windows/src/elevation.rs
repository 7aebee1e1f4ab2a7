//! UAC elevation check. Creating or deleting an SCM service needs an
//! Administrator token, so `--install` and `--uninstall` are refused without one.

use tracing::debug;
use windows::core::Result;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// Access token of this process, closed on drop.
struct ProcessToken(HANDLE);

impl ProcessToken {
    fn open() -> Result<Self> {
        let mut handle = HANDLE::default();
        unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle)? };
        Ok(Self(handle))
    }

    fn elevation(&self) -> Result<TOKEN_ELEVATION> {
        let mut elevation = TOKEN_ELEVATION::default();
        let mut written = 0u32;
        unsafe {
            GetTokenInformation(
                self.0,
                TokenElevation,
                Some(&mut elevation as *mut TOKEN_ELEVATION as *mut _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut written,
            )?;
        }
        Ok(elevation)
    }
}

impl Drop for ProcessToken {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// Whether this process may register services with the SCM.
/// A token that cannot be read counts as not elevated.
pub fn is_elevated() -> bool {
    match ProcessToken::open().and_then(|token| token.elevation()) {
        Ok(elevation) => elevation.TokenIsElevated != 0,
        Err(e) => {
            debug!("could not read process token elevation: {}", e);
            false
        }
    }
}
