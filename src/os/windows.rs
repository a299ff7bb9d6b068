//! Win32 window control
//!
//! Implements [`WindowControl`] on top of the Win32 user/threading APIs:
//! EnumWindows for main-window discovery, IsHungAppWindow for the
//! responsiveness check, WM_CLOSE for graceful close requests, and
//! WaitForInputIdle for the bounded post-launch wait.

use std::sync::atomic::{AtomicUsize, Ordering};

use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::{
    OpenProcess, WaitForInputIdle, PROCESS_QUERY_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindow, GetWindowThreadProcessId, IsHungAppWindow,
    IsWindowVisible, PostMessageW, SetForegroundWindow, SetWindowPos, SwitchToThisWindow,
    GW_OWNER, HWND_TOPMOST, SWP_NOMOVE, SWP_NOSIZE, SWP_SHOWWINDOW, WM_CLOSE,
};

use super::{OsError, Result, WindowControl, WindowHandle};

/// Win32-backed window control
pub struct Win32WindowControl;

impl Win32WindowControl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Win32WindowControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Data passed through LPARAM to the EnumWindows callback
struct FindWindowData {
    pid: u32,
    hwnd: AtomicUsize,
}

/// Callback for EnumWindows to find the main window of a process.
///
/// The main window is the first visible, unowned top-level window whose
/// owning thread belongs to the target process.
unsafe extern "system" fn enum_windows_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let data = &*(lparam.0 as *const FindWindowData);

    let mut window_pid: u32 = 0;
    GetWindowThreadProcessId(hwnd, Some(&mut window_pid));

    if window_pid != data.pid {
        return BOOL(1); // Continue enumeration
    }

    if !IsWindowVisible(hwnd).as_bool() {
        return BOOL(1);
    }

    if GetWindow(hwnd, GW_OWNER).0 != 0 {
        return BOOL(1); // Owned windows are not the main window
    }

    data.hwnd.store(hwnd.0 as usize, Ordering::SeqCst);
    BOOL(0) // Stop enumeration
}

impl WindowControl for Win32WindowControl {
    fn find_main_window(&self, pid: u32) -> Option<WindowHandle> {
        let data = FindWindowData {
            pid,
            hwnd: AtomicUsize::new(0),
        };

        unsafe {
            // EnumWindows reports an error when the callback stops the
            // enumeration early; that is the found case, not a failure.
            let _ = EnumWindows(
                Some(enum_windows_callback),
                LPARAM(&data as *const FindWindowData as isize),
            );
        }

        match data.hwnd.load(Ordering::SeqCst) {
            0 => None,
            hwnd => Some(hwnd),
        }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0 == 0 {
            None
        } else {
            Some(hwnd.0 as usize)
        }
    }

    fn is_responding(&self, window: WindowHandle) -> bool {
        unsafe { !IsHungAppWindow(HWND(window as isize)).as_bool() }
    }

    fn request_close(&self, window: WindowHandle) -> Result<()> {
        unsafe {
            PostMessageW(HWND(window as isize), WM_CLOSE, WPARAM(0), LPARAM(0)).map_err(|e| {
                OsError::CloseRequestFailed {
                    reason: e.to_string(),
                }
            })
        }
    }

    fn switch_to(&self, window: WindowHandle) -> Result<()> {
        unsafe {
            SwitchToThisWindow(HWND(window as isize), BOOL(1));
        }
        Ok(())
    }

    fn set_foreground(&self, window: WindowHandle) -> Result<()> {
        let ok = unsafe { SetForegroundWindow(HWND(window as isize)) };
        if ok.as_bool() {
            Ok(())
        } else {
            Err(OsError::ForegroundFailed {
                reason: "SetForegroundWindow returned FALSE".to_string(),
            })
        }
    }

    fn set_topmost(&self, window: WindowHandle) -> Result<()> {
        unsafe {
            SetWindowPos(
                HWND(window as isize),
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOSIZE | SWP_NOMOVE | SWP_SHOWWINDOW,
            )
            .map_err(|e| OsError::WindowPosFailed {
                reason: e.to_string(),
            })
        }
    }

    fn wait_input_idle(&self, pid: u32, timeout_ms: u32) {
        unsafe {
            let handle = match OpenProcess(PROCESS_QUERY_INFORMATION, BOOL(0), pid) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::debug!(pid, error = %e, "OpenProcess failed, skipping input-idle wait");
                    return;
                }
            };

            WaitForInputIdle(handle, timeout_ms);
            let _ = CloseHandle(handle);
        }
    }
}
