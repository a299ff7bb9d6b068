//! Stub window control for platforms without a supported windowing API
//!
//! Reports no windows and treats every process as responsive, so the
//! supervisor runs headless: the unresponsive path never triggers and the
//! graceful-close step of termination is skipped.

use super::{Result, WindowControl, WindowHandle};

/// No-op window control
pub struct StubWindowControl;

impl StubWindowControl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubWindowControl {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowControl for StubWindowControl {
    fn find_main_window(&self, _pid: u32) -> Option<WindowHandle> {
        None
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }

    fn is_responding(&self, _window: WindowHandle) -> bool {
        true
    }

    fn request_close(&self, _window: WindowHandle) -> Result<()> {
        Ok(()) // No-op
    }

    fn switch_to(&self, _window: WindowHandle) -> Result<()> {
        Ok(()) // No-op
    }

    fn set_foreground(&self, _window: WindowHandle) -> Result<()> {
        Ok(()) // No-op
    }

    fn set_topmost(&self, _window: WindowHandle) -> Result<()> {
        Ok(()) // No-op
    }

    fn wait_input_idle(&self, _pid: u32, _timeout_ms: u32) {
        // No-op
    }
}
