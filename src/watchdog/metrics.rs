//! Health sampling data structures
//!
//! Holds the rolling usage window the supervisor fills on every metrics tick
//! and the fraction math that converts raw sysinfo samples into the 0..=1
//! values the window stores.

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Number of samples retained in the usage window
pub const NUM_SAMPLES: usize = 100;

/// Rolling window of CPU and memory usage fractions.
///
/// Zero-initialized so consumers always observe a full window; appending
/// slides every series left by one and writes the new sample at the end.
/// `indices` is the fixed `0..99` x-axis for plotting.
#[derive(Debug, Clone)]
pub struct UsageWindow {
    cpu: [f64; NUM_SAMPLES],
    memory: [f64; NUM_SAMPLES],
    indices: [f64; NUM_SAMPLES],
}

impl Default for UsageWindow {
    fn default() -> Self {
        let mut indices = [0.0; NUM_SAMPLES];
        for (i, slot) in indices.iter_mut().enumerate() {
            *slot = i as f64;
        }
        Self {
            cpu: [0.0; NUM_SAMPLES],
            memory: [0.0; NUM_SAMPLES],
            indices,
        }
    }
}

impl UsageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample pair, discarding the oldest.
    pub fn push(&mut self, cpu: f64, memory: f64) {
        self.cpu.copy_within(1.., 0);
        self.memory.copy_within(1.., 0);
        self.cpu[NUM_SAMPLES - 1] = cpu;
        self.memory[NUM_SAMPLES - 1] = memory;
    }

    /// Most recent CPU fraction.
    pub fn last_cpu(&self) -> f64 {
        self.cpu[NUM_SAMPLES - 1]
    }

    /// Most recent memory fraction.
    pub fn last_memory(&self) -> f64 {
        self.memory[NUM_SAMPLES - 1]
    }

    pub fn cpu(&self) -> &[f64; NUM_SAMPLES] {
        &self.cpu
    }

    pub fn memory(&self) -> &[f64; NUM_SAMPLES] {
        &self.memory
    }

    /// Fixed x-axis sequence for plotting.
    pub fn indices(&self) -> &[f64; NUM_SAMPLES] {
        &self.indices
    }

    /// Reset both series to zero, keeping the index sequence.
    pub fn clear(&mut self) {
        self.cpu = [0.0; NUM_SAMPLES];
        self.memory = [0.0; NUM_SAMPLES];
    }
}

/// One CPU/memory sample for a process, already normalized to fractions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSample {
    pub cpu: f64,
    pub memory: f64,
}

/// Total physical memory in bytes, or the `-1.0` sentinel when the amount
/// cannot be determined.
pub fn max_memory_budget(system: &System) -> f64 {
    match system.total_memory() {
        0 => -1.0,
        bytes => bytes as f64,
    }
}

/// Sample the process once through `system`.
///
/// Returns `None` when the process is gone or cannot be inspected; the
/// caller records `0.0` in that case. Memory is the working set over the
/// max-memory budget, clamped to `0.0` when the budget is not positive so
/// the fraction is never negative or NaN. CPU is `cpu_usage()` normalized
/// by processor count times 100.
pub fn sample_process(
    system: &mut System,
    pid: u32,
    max_memory: f64,
    cpu_count: usize,
) -> Option<UsageSample> {
    let sys_pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    let process = system.process(sys_pid)?;

    let memory = if max_memory > 0.0 {
        process.memory() as f64 / max_memory
    } else {
        0.0
    };

    let cpu = if cpu_count > 0 {
        process.cpu_usage() as f64 / (cpu_count as f64 * 100.0)
    } else {
        0.0
    };

    Some(UsageSample { cpu, memory })
}
