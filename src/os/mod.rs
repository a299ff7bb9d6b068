//! OS window-control layer for the watchdog.
//!
//! This module isolates the window-focus and responsiveness primitives the
//! supervisor needs:
//! - Main-window lookup for a process id
//! - Foreground/topmost enforcement
//! - Hung-window (responsiveness) checks
//! - Graceful close requests (WM_CLOSE on Windows)
//! - Bounded wait-for-input-idle after launch

#[cfg(windows)]
pub mod windows;

#[cfg(windows)]
pub use windows::Win32WindowControl as PlatformWindowControl;

#[cfg(not(windows))]
pub mod stub;

#[cfg(not(windows))]
pub use stub::StubWindowControl as PlatformWindowControl;


use thiserror::Error;

/// Opaque platform window handle (HWND on Windows)
pub type WindowHandle = usize;

/// Window-control errors
#[derive(Error, Debug)]
pub enum OsError {
    #[error("Close request failed: {reason}")]
    CloseRequestFailed { reason: String },

    #[error("Foreground switch failed: {reason}")]
    ForegroundFailed { reason: String },

    #[error("Window positioning failed: {reason}")]
    WindowPosFailed { reason: String },

    #[error("Process handle unavailable for pid {pid}: {reason}")]
    ProcessHandleUnavailable { pid: u32, reason: String },
}

/// Result type for window-control operations
pub type Result<T> = std::result::Result<T, OsError>;

/// Capability interface over OS window primitives.
///
/// Platforms without a windowing system provide a no-op implementation, so
/// the supervisor can run headless: no window means "always responsive" and
/// every enforcement call degrades to a no-op.
pub trait WindowControl: Send + Sync {
    /// Find the main (visible, unowned, top-level) window of a process.
    fn find_main_window(&self, pid: u32) -> Option<WindowHandle>;

    /// Handle of the window currently in the foreground, if any.
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Whether the window is still processing input within the OS-bounded
    /// check. Windows without a responsiveness concept report `true`.
    fn is_responding(&self, window: WindowHandle) -> bool;

    /// Ask the window to close gracefully.
    fn request_close(&self, window: WindowHandle) -> Result<()>;

    /// Switch to the window as if the user had alt-tabbed to it.
    fn switch_to(&self, window: WindowHandle) -> Result<()>;

    /// Bring the window to the foreground.
    fn set_foreground(&self, window: WindowHandle) -> Result<()>;

    /// Mark the window topmost and show it without resizing or moving it.
    fn set_topmost(&self, window: WindowHandle) -> Result<()>;

    /// Best-effort bounded wait until the process is ready for input.
    fn wait_input_idle(&self, pid: u32, timeout_ms: u32);
}
