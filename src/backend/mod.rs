//! Native window-system backends.
//!
//! Each submodule implements [`PlatformBackend`](crate::traits::PlatformBackend)
//! for one desktop:
//!
//! * [`x11`]: X11 with an EWMH-compliant window manager, via `x11rb`.
//! * [`win32`]: Win32 + DWM, with virtual desktops through COM.
//! * [`macos`]: CoreGraphics window list + Accessibility API.
//!
//! [`probe`] connects to whichever one the crate was built for.  Nothing
//! outside this module references native types.

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(windows)]
mod virtual_desktops;
#[cfg(windows)]
pub mod win32;
#[cfg(all(unix, not(target_os = "macos")))]
pub mod x11;

#[cfg(not(any(unix, windows)))]
compile_error!("rearrange supports X11, Windows and macOS only");

use crate::model::{Wid, WorkspaceId};

/// Errors produced by a backend.
///
/// Transient errors concern a single window and leave the session usable;
/// fatal ones mean the backend itself is gone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("window {0} no longer exists")]
    WindowGone(Wid),
    #[error("unknown workspace {0}")]
    UnknownWorkspace(WorkspaceId),
    #[error("native call failed: {0}")]
    Native(String),
    #[error("lost connection to the window system: {0}")]
    ConnectionLost(String),
    #[error("window system unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether the session can carry on after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::WindowGone(_)
                | BackendError::UnknownWorkspace(_)
                | BackendError::Native(_)
        )
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
pub type NativeBackend = x11::X11Backend;
#[cfg(windows)]
pub type NativeBackend = win32::Win32Backend;
#[cfg(target_os = "macos")]
pub type NativeBackend = macos::MacBackend;

/// Connect to the window system of the running desktop.
pub fn probe() -> Result<NativeBackend, BackendError> {
    NativeBackend::connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(BackendError::WindowGone(Wid(1)).is_transient());
        assert!(BackendError::UnknownWorkspace(WorkspaceId(1003)).is_transient());
        assert!(BackendError::Native("BadMatch".into()).is_transient());
        assert!(!BackendError::ConnectionLost("broken pipe".into()).is_transient());
        assert!(!BackendError::Unavailable("no DISPLAY".into()).is_transient());
    }

    #[test]
    fn messages() {
        assert_eq!(
            BackendError::WindowGone(Wid(0x2a)).to_string(),
            "window 0x2a no longer exists"
        );
    }
}
