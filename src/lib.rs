//! vigil - supervised-process watchdog
//!
//! This crate provides the core functionality for vigil including:
//! - Launching a configured executable with hook scripts and an
//!   environment overlay
//! - Crash detection and delayed automatic restarts
//! - Escalating termination (graceful close, kill, OS utility) with an
//!   orphan sweep
//! - Rolling CPU/memory health sampling
//! - Window focus enforcement on platforms with a windowing API

pub mod config;
pub mod logging;
pub mod os;
pub mod watchdog;

// Re-export commonly used items
pub use config::{validate, ConfigError, WatchdogConfig};
pub use logging::{init_default_logging, init_logging, LoggingConfig, LoggingSystem};
pub use os::{PlatformWindowControl, WindowControl, WindowHandle};
pub use watchdog::{ExecKind, UsageWindow, Watchdog, WatchdogState, NUM_SAMPLES};
