//! Watchdog supervisor
//!
//! Owns the supervised child process and drives the crash-recovery state
//! machine. The owner thread calls `start`, `stop`, `monitor` and
//! `update_metrics`; background threads (exit listener, delayed restart,
//! unresponsive-confirmation probe, output readers) only observe shared
//! state and become no-ops when a generation bump or the disposed flag
//! tells them they are stale.

use std::path::Path;
use std::process::Child;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::System;
use thiserror::Error;

use crate::config::{self, ConfigError, WatchdogConfig};
use crate::os::{PlatformWindowControl, WindowControl};

use super::launcher;
use super::metrics::{self, UsageWindow};
use super::termination;

/// Poll interval of the exit-listener thread
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bounded wait for the child to become ready for input after launch
const INPUT_IDLE_TIMEOUT_MS: u32 = 5_000;

/// Watchdog errors.
///
/// These never escape the public operations; they are logged and folded
/// into state (monitoring stays false, Stop still completes).
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start process: {0}")]
    ProcessStartFailed(String),

    #[error("Watchdog has been shut down")]
    Disposed,
}

/// Why a process started or stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    /// Deliberate start or stop requested by the owner
    Normal,
    /// Crash-triggered restart, or a stop caused by a crash or a confirmed
    /// unresponsive process
    Crashed,
}

/// Watchdog state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// No process under supervision
    Idle,
    /// Process running and monitored
    Running,
    /// Crash observed, delayed restart pending
    Restarting,
}

/// Callback invoked on process start/stop notifications
pub type ExecCallback = Box<dyn Fn(ExecKind) + Send + Sync>;

/// Supervised child with the identifiers needed after it is gone
struct ChildHandle {
    child: Child,
    pid: u32,
}

struct Inner {
    config: Mutex<WatchdogConfig>,
    child: Mutex<Option<ChildHandle>>,
    state: Mutex<WatchdogState>,

    /// Display name of the supervised executable, kept after exit so orphan
    /// sweeps still know what to look for
    cached_name: Mutex<String>,

    monitoring: AtomicBool,
    /// Set before a deliberate stop touches the process so the exit
    /// listener never reports the exit as a crash
    expecting_exit: AtomicBool,
    disposed: AtomicBool,
    /// Collapses unresponsive-confirmation probes to one outstanding
    probe_pending: AtomicBool,
    /// Bumped on every start and stop; stale background threads compare
    /// their snapshot against this and bow out
    generation: AtomicU64,

    usage: Mutex<UsageWindow>,
    /// Total physical memory in bytes, `-1.0` when unobtainable
    max_memory: f64,
    cpu_count: usize,
    system: Mutex<System>,

    window_control: Box<dyn WindowControl>,

    started_callbacks: Mutex<Vec<ExecCallback>>,
    stopped_callbacks: Mutex<Vec<ExecCallback>>,
}

/// Watchdog supervisor
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    /// Create a new watchdog with the given configuration and the platform
    /// window control.
    pub fn new(config: WatchdogConfig) -> Self {
        Self::with_window_control(config, Box::new(PlatformWindowControl::new()))
    }

    /// Create a new watchdog with an explicit window-control implementation.
    pub fn with_window_control(config: WatchdogConfig, window_control: Box<dyn WindowControl>) -> Self {
        let system = System::new_all();
        let max_memory = metrics::max_memory_budget(&system);
        let cpu_count = system.cpus().len();

        Self {
            inner: Arc::new(Inner {
                config: Mutex::new(config),
                child: Mutex::new(None),
                state: Mutex::new(WatchdogState::Idle),
                cached_name: Mutex::new(String::new()),
                monitoring: AtomicBool::new(false),
                expecting_exit: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                probe_pending: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                usage: Mutex::new(UsageWindow::new()),
                max_memory,
                cpu_count,
                system: Mutex::new(system),
                window_control,
                started_callbacks: Mutex::new(Vec::new()),
                stopped_callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback fired after every successful start.
    pub fn on_process_started(&self, callback: ExecCallback) {
        self.inner.started_callbacks.lock().push(callback);
    }

    /// Register a callback fired after every completed stop.
    pub fn on_process_stopped(&self, callback: ExecCallback) {
        self.inner.stopped_callbacks.lock().push(callback);
    }

    /// Replace the configuration used for the next start.
    pub fn set_config(&self, config: WatchdogConfig) {
        *self.inner.config.lock() = config;
    }

    pub fn config(&self) -> WatchdogConfig {
        self.inner.config.lock().clone()
    }

    /// Whether a process is currently under supervision.
    pub fn monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WatchdogState {
        *self.inner.state.lock()
    }

    /// Display name of the supervised executable, cached across exits.
    pub fn cached_name(&self) -> String {
        self.inner.cached_name.lock().clone()
    }

    /// Seed the cached display name, letting a fresh watchdog sweep orphans
    /// left behind by a previous instance.
    pub fn set_cached_name(&self, name: impl Into<String>) {
        *self.inner.cached_name.lock() = name.into();
    }

    /// Most recent CPU fraction, `0.0` while not monitoring.
    pub fn last_cpu_usage(&self) -> f64 {
        if !self.monitoring() {
            return 0.0;
        }
        self.inner.usage.lock().last_cpu()
    }

    /// Most recent memory fraction, `0.0` while not monitoring.
    pub fn last_memory_usage(&self) -> f64 {
        if !self.monitoring() {
            return 0.0;
        }
        self.inner.usage.lock().last_memory()
    }

    /// Snapshot of the rolling usage window.
    pub fn usage_window(&self) -> UsageWindow {
        self.inner.usage.lock().clone()
    }

    /// Reset the usage window to zeros. The window otherwise persists
    /// across restarts.
    pub fn clear_usage_window(&self) {
        self.inner.usage.lock().clear();
    }

    /// Start the supervised process, stopping any previous instance first.
    ///
    /// Never returns an error: every failure is logged and leaves the
    /// watchdog idle, observable as the absence of a started notification.
    pub fn start(&self, kind: ExecKind) {
        start_process(&self.inner, kind);
    }

    /// Stop the supervised process, escalating until it is gone.
    ///
    /// Safe to call when nothing is running. Every call completes the whole
    /// escalation-and-sweep sequence and fires the stopped notification
    /// exactly once, regardless of step failures.
    pub fn stop(&self, kind: ExecKind) {
        stop_process(&self.inner, kind);
    }

    /// Run one monitoring tick: responsiveness check and, if configured,
    /// always-on-top enforcement.
    pub fn monitor(&self) {
        monitor_tick(&self.inner);
    }

    /// Run one metrics tick, appending a sample to the usage window.
    pub fn update_metrics(&self) {
        update_metrics_tick(&self.inner);
    }

    /// Stop the process and refuse all future starts.
    pub fn shutdown(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        stop_process(&self.inner, ExecKind::Normal);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// File stem of the executable, used as the display name for logs, orphan
/// sweeps and the name-based termination fallback.
fn display_name(executable: &Path) -> String {
    executable
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn fire_started(inner: &Inner, kind: ExecKind) {
    for callback in inner.started_callbacks.lock().iter() {
        callback(kind);
    }
}

fn fire_stopped(inner: &Inner, kind: ExecKind) {
    for callback in inner.stopped_callbacks.lock().iter() {
        callback(kind);
    }
}

fn start_process(inner: &Arc<Inner>, kind: ExecKind) {
    match try_start(inner, kind) {
        Ok(()) => {}
        Err(WatchdogError::Disposed) => {
            tracing::warn!("Start refused, watchdog is shut down");
        }
        Err(e) => {
            tracing::error!(error = %e, "Start failed");
            // A failure after the spawn leaves a half-started child behind;
            // run the full stop sequence so nothing lingers.
            if inner.child.lock().is_some() {
                stop_process(inner, ExecKind::Normal);
            } else {
                *inner.state.lock() = WatchdogState::Idle;
            }
        }
    }
}

fn try_start(inner: &Arc<Inner>, kind: ExecKind) -> Result<(), WatchdogError> {
    if inner.disposed.load(Ordering::SeqCst) {
        return Err(WatchdogError::Disposed);
    }

    // A previous instance is stopped the normal way before anything new
    // is spawned; a fresh watchdog skips this so a plain first start does
    // not announce a phantom stop.
    if inner.monitoring.load(Ordering::SeqCst) || inner.child.lock().is_some() {
        stop_process(inner, ExecKind::Normal);
    }

    let validated = {
        let mut config = inner.config.lock();
        config::validate(&mut config)?;
        config.clone()
    };

    let name = display_name(&validated.executable);
    *inner.cached_name.lock() = name.clone();

    // Remove leftovers of earlier runs before spawning a new instance.
    termination::sweep_orphans(&mut inner.system.lock(), &name);

    if !validated.start_script.as_os_str().is_empty() {
        launcher::run_script(&validated.start_script);
    }

    tracing::info!(executable = %validated.executable.display(), ?kind, "Starting process");
    let mut child = launcher::launch(&validated)
        .map_err(|e| WatchdogError::ProcessStartFailed(e.to_string()))?;
    let pid = child.id();

    if validated.capture_output {
        launcher::spawn_output_readers(&mut child, &name);
    }

    *inner.child.lock() = Some(ChildHandle { child, pid });

    // Give GUI processes a bounded chance to finish initializing, then
    // refuse to report a process started that is already hung. Processes
    // without a window pass the gate.
    let responsive = match inner.window_control.find_main_window(pid) {
        Some(window) => {
            inner.window_control.wait_input_idle(pid, INPUT_IDLE_TIMEOUT_MS);
            inner.window_control.is_responding(window)
        }
        None => true,
    };
    if !responsive {
        return Err(WatchdogError::ProcessStartFailed(
            "process is not responding after launch".to_string(),
        ));
    }

    inner.expecting_exit.store(false, Ordering::SeqCst);
    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    inner.monitoring.store(true, Ordering::SeqCst);
    *inner.state.lock() = WatchdogState::Running;

    spawn_exit_listener(inner, generation);

    tracing::info!(pid, %name, "Process started");
    fire_started(inner, kind);
    Ok(())
}

/// Watch for the child exiting on its own.
///
/// Polls `try_wait` and treats any exit not announced through
/// `expecting_exit` as a crash. A generation bump or a vanished child
/// handle means supervision moved on, and the listener ends quietly.
fn spawn_exit_listener(inner: &Arc<Inner>, generation: u64) {
    let inner = Arc::clone(inner);
    thread::spawn(move || loop {
        thread::sleep(EXIT_POLL_INTERVAL);

        if inner.disposed.load(Ordering::SeqCst)
            || inner.generation.load(Ordering::SeqCst) != generation
        {
            return;
        }

        let mut guard = inner.child.lock();
        let Some(handle) = guard.as_mut() else {
            return;
        };

        match handle.child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                if inner.expecting_exit.load(Ordering::SeqCst) {
                    return;
                }
                let pid = handle.pid;
                *guard = None;
                drop(guard);
                tracing::warn!(pid, %status, "Process exited unexpectedly");
                handle_crash(&inner);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Exit poll failed");
            }
        }
    });
}

/// React to a crash observed by the exit listener: notify, run the crash
/// hook and schedule the delayed restart.
fn handle_crash(inner: &Arc<Inner>) {
    inner.monitoring.store(false, Ordering::SeqCst);
    *inner.state.lock() = WatchdogState::Restarting;

    fire_stopped(inner, ExecKind::Crashed);

    let (crash_script, delay) = {
        let config = inner.config.lock();
        (config.crash_script.clone(), config.restart_delay_secs)
    };
    if !crash_script.as_os_str().is_empty() {
        launcher::run_script(&crash_script);
    }

    schedule_restart(inner, delay);
}

/// Arm the delayed crash restart.
///
/// The sleep holds only the shared state; when it fires it re-checks the
/// monitoring and disposed flags and refuses to act when the owner started
/// or shut down the watchdog in the meantime.
fn schedule_restart(inner: &Arc<Inner>, delay_secs: u64) {
    let inner = Arc::clone(inner);
    thread::spawn(move || {
        tracing::info!(delay_secs, "Restart scheduled");
        thread::sleep(Duration::from_secs(delay_secs));

        if inner.disposed.load(Ordering::SeqCst) {
            tracing::debug!("Restart cancelled, watchdog shut down");
            return;
        }
        if inner.monitoring.load(Ordering::SeqCst) {
            tracing::debug!("Restart skipped, a process is already monitored");
            return;
        }

        start_process(&inner, ExecKind::Crashed);
    });
}

fn stop_process(inner: &Arc<Inner>, kind: ExecKind) {
    // Announce the exit before touching the process so the listener never
    // mistakes it for a crash; the generation bump retires the listener
    // and any pending probe.
    inner.expecting_exit.store(true, Ordering::SeqCst);
    inner.generation.fetch_add(1, Ordering::SeqCst);
    inner.monitoring.store(false, Ordering::SeqCst);

    let handle = inner.child.lock().take();
    let name = inner.cached_name.lock().clone();

    if let Some(mut handle) = handle {
        termination::escalate(&mut handle.child, &name, inner.window_control.as_ref());
    }

    // Runs whether or not a handle existed; a watchdog restarted without a
    // live handle can still clean up by cached name.
    termination::sweep_orphans(&mut inner.system.lock(), &name);

    *inner.state.lock() = WatchdogState::Idle;
    tracing::info!(%name, ?kind, "Process stopped");
    fire_stopped(inner, kind);

    if kind == ExecKind::Crashed && !inner.disposed.load(Ordering::SeqCst) {
        *inner.state.lock() = WatchdogState::Restarting;
        let (crash_script, delay) = {
            let config = inner.config.lock();
            (config.crash_script.clone(), config.restart_delay_secs)
        };
        if !crash_script.as_os_str().is_empty() {
            launcher::run_script(&crash_script);
        }
        schedule_restart(inner, delay);
    }
}

fn monitor_tick(inner: &Arc<Inner>) {
    if !inner.monitoring.load(Ordering::SeqCst) {
        return;
    }

    let pid = match inner.child.lock().as_ref() {
        Some(handle) => handle.pid,
        None => return,
    };

    let config = inner.config.lock().clone();

    let window = inner.window_control.find_main_window(pid);
    let Some(window) = window else {
        // No window means no responsiveness concept and nothing to keep
        // on top.
        return;
    };

    if !inner.window_control.is_responding(window) {
        tracing::warn!(pid, "Process is not responding");
        if config.assume_crash_if_unresponsive {
            schedule_unresponsive_probe(inner, config.unresponsive_wait_secs);
        }
        return;
    }

    if config.force_always_on_top {
        enforce_topmost(inner, window);
    }
}

/// Confirm an unresponsive process after the configured grace period, then
/// treat it as crashed.
///
/// At most one probe is outstanding; further unresponsive ticks while it is
/// pending change nothing.
fn schedule_unresponsive_probe(inner: &Arc<Inner>, wait_secs: u64) {
    if inner.probe_pending.swap(true, Ordering::SeqCst) {
        return;
    }

    let generation = inner.generation.load(Ordering::SeqCst);
    let inner = Arc::clone(inner);
    thread::spawn(move || {
        tracing::info!(wait_secs, "Unresponsive process, confirmation probe armed");
        thread::sleep(Duration::from_secs(wait_secs));
        inner.probe_pending.store(false, Ordering::SeqCst);

        if inner.disposed.load(Ordering::SeqCst)
            || inner.generation.load(Ordering::SeqCst) != generation
            || !inner.monitoring.load(Ordering::SeqCst)
        {
            return;
        }

        let pid = match inner.child.lock().as_ref() {
            Some(handle) => handle.pid,
            None => return,
        };

        let still_hung = match inner.window_control.find_main_window(pid) {
            Some(window) => !inner.window_control.is_responding(window),
            None => false,
        };

        if still_hung {
            tracing::warn!(pid, "Process confirmed unresponsive, treating as crashed");
            stop_process(&inner, ExecKind::Crashed);
        } else {
            tracing::info!(pid, "Process recovered before the probe fired");
        }
    });
}

/// Keep the window focused and topmost, the way a kiosk supervisor holds
/// its application in front. Nothing to do while the window already has
/// the foreground.
fn enforce_topmost(inner: &Inner, window: crate::os::WindowHandle) {
    if inner.window_control.foreground_window() == Some(window) {
        return;
    }
    if let Err(e) = inner.window_control.switch_to(window) {
        tracing::debug!(error = %e, "switch_to failed");
    }
    if let Err(e) = inner.window_control.set_foreground(window) {
        tracing::debug!(error = %e, "set_foreground failed");
    }
    if let Err(e) = inner.window_control.set_topmost(window) {
        tracing::debug!(error = %e, "set_topmost failed");
    }
}

fn update_metrics_tick(inner: &Arc<Inner>) {
    if !inner.monitoring.load(Ordering::SeqCst) {
        inner.usage.lock().push(0.0, 0.0);
        return;
    }

    let pid = match inner.child.lock().as_ref() {
        Some(handle) => handle.pid,
        None => {
            inner.usage.lock().push(0.0, 0.0);
            return;
        }
    };

    let sample = metrics::sample_process(
        &mut inner.system.lock(),
        pid,
        inner.max_memory,
        inner.cpu_count,
    )
    .unwrap_or_default();

    inner.usage.lock().push(sample.cpu, sample.memory);
}
