//! Watchdog Module
//!
//! Supervises a single external process: launches it, watches liveness and
//! resource usage, restarts it after crashes, and escalates termination when
//! asked to stop it.

pub mod launcher;
pub mod metrics;
pub mod supervisor;
pub mod termination;

#[cfg(test)]
mod tests;

pub use metrics::{UsageWindow, NUM_SAMPLES};
pub use supervisor::{ExecCallback, ExecKind, Watchdog, WatchdogError, WatchdogState};
