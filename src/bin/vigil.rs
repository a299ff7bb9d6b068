//! vigil - process supervisor CLI
//!
//! Supervises a single executable: starts it, restarts it after crashes,
//! samples its CPU and memory usage, and optionally keeps its main window
//! focused and topmost.
//!
//! Usage:
//!   vigil --executable <path> [OPTIONS]

use std::path::PathBuf;
use std::time::Duration;

use vigil::logging::{self, LogLevel, LogOutput, LoggingConfig};
use vigil::watchdog::{ExecKind, Watchdog};
use vigil::WatchdogConfig;

/// Interval between monitor and metrics ticks
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Command line arguments
struct Args {
    /// Path to the supervised executable
    executable: PathBuf,
    /// Working directory for the supervised process
    working_dir: PathBuf,
    /// Argument string passed to the executable
    arguments: String,
    /// Script run before every (re)start
    start_script: PathBuf,
    /// Script run before every crash-triggered restart
    crash_script: PathBuf,
    /// Newline-delimited KEY=VALUE environment overlay
    environment: String,
    /// Delay before a crash-triggered restart, in seconds
    restart_delay: u64,
    /// Grace period for an unresponsive process, in seconds
    unresponsive_wait: u64,
    /// Redirect and log the child's stdout/stderr
    capture_output: bool,
    /// Treat an unresponsive process as crashed
    assume_crash_if_unresponsive: bool,
    /// Keep the child's main window topmost and focused
    always_on_top: bool,
    /// Directory for log files
    log_dir: Option<PathBuf>,
    /// Enable verbose logging
    verbose: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut executable = None;
        let mut working_dir = PathBuf::new();
        let mut arguments = String::new();
        let mut start_script = PathBuf::new();
        let mut crash_script = PathBuf::new();
        let mut environment = String::new();
        let mut restart_delay = 5u64;
        let mut unresponsive_wait = 30u64;
        let mut capture_output = false;
        let mut assume_crash_if_unresponsive = false;
        let mut always_on_top = false;
        let mut log_dir = None;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--executable" | "-e" => {
                    executable = args.next().map(PathBuf::from);
                }
                "--workdir" | "-w" => {
                    working_dir = args.next().map(PathBuf::from).unwrap_or_default();
                }
                "--args" | "-a" => {
                    arguments = args.next().unwrap_or_default();
                }
                "--start-script" => {
                    start_script = args.next().map(PathBuf::from).unwrap_or_default();
                }
                "--crash-script" => {
                    crash_script = args.next().map(PathBuf::from).unwrap_or_default();
                }
                "--env" => {
                    // Repeatable; entries accumulate into the overlay.
                    if let Some(entry) = args.next() {
                        if !environment.is_empty() {
                            environment.push('\n');
                        }
                        environment.push_str(&entry);
                    }
                }
                "--delay" | "-d" => {
                    if let Some(val) = args.next() {
                        restart_delay = val.parse().map_err(|_| "Invalid delay value")?;
                    }
                }
                "--wait" => {
                    if let Some(val) = args.next() {
                        unresponsive_wait = val.parse().map_err(|_| "Invalid wait value")?;
                    }
                }
                "--capture-output" | "-c" => {
                    capture_output = true;
                }
                "--assume-crash-if-unresponsive" => {
                    assume_crash_if_unresponsive = true;
                }
                "--always-on-top" => {
                    always_on_top = true;
                }
                "--log-dir" => {
                    log_dir = args.next().map(PathBuf::from);
                }
                "--verbose" | "-v" => {
                    verbose = true;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }

        let executable = executable.ok_or("--executable is required")?;

        Ok(Self {
            executable,
            working_dir,
            arguments,
            start_script,
            crash_script,
            environment,
            restart_delay,
            unresponsive_wait,
            capture_output,
            assume_crash_if_unresponsive,
            always_on_top,
            log_dir,
            verbose,
        })
    }
}

fn print_help() {
    println!(
        r#"vigil - Process Supervisor

USAGE:
    vigil [OPTIONS] --executable <PATH>

OPTIONS:
    -e, --executable <PATH>           Path to the supervised executable (required)
    -w, --workdir <PATH>              Working directory for the supervised process
    -a, --args <STRING>               Argument string passed to the executable
        --start-script <PATH>         Script run before every (re)start
        --crash-script <PATH>         Script run before every crash-triggered restart
        --env <KEY=VALUE>             Environment overlay entry (repeatable)
    -d, --delay <SECS>                Delay before a crash restart (default: 5)
        --wait <SECS>                 Grace period for an unresponsive process (default: 30)
    -c, --capture-output              Redirect and log the child's stdout/stderr
        --assume-crash-if-unresponsive
                                      Treat an unresponsive process as crashed
        --always-on-top               Keep the child's main window topmost and focused
        --log-dir <PATH>              Also write logs to daily files in this directory
    -v, --verbose                     Enable verbose logging
    -h, --help                        Print this help message

DESCRIPTION:
    vigil launches the configured executable and supervises it:
    1. Runs the start script, sweeps same-named orphans, then spawns the process
    2. Restarts it after the configured delay when it exits unexpectedly
    3. Optionally confirms unresponsive processes and treats them as crashed
    4. Samples CPU and memory usage into a rolling window every tick
"#
    );
}

fn init_logging(args: &Args) -> Result<logging::LoggingSystem, logging::LoggingError> {
    let config = LoggingConfig {
        level: if args.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        },
        output: if args.log_dir.is_some() {
            LogOutput::Both
        } else {
            LogOutput::Console
        },
        log_directory: args.log_dir.clone(),
        ..Default::default()
    };
    logging::init_logging(config)
}

fn run(args: Args) {
    let config = WatchdogConfig {
        working_dir: args.working_dir,
        executable: args.executable.clone(),
        arguments: args.arguments,
        start_script: args.start_script,
        crash_script: args.crash_script,
        environment: args.environment,
        restart_delay_secs: args.restart_delay,
        unresponsive_wait_secs: args.unresponsive_wait,
        capture_output: args.capture_output,
        assume_crash_if_unresponsive: args.assume_crash_if_unresponsive,
        force_always_on_top: args.always_on_top,
    };

    tracing::info!("Starting vigil");
    tracing::info!("Supervising: {:?}", args.executable);
    tracing::info!("Restart delay: {}s", args.restart_delay);

    let watchdog = Watchdog::new(config);
    watchdog.on_process_started(Box::new(|kind| {
        tracing::info!(?kind, "Process started");
    }));
    watchdog.on_process_stopped(Box::new(|kind| {
        tracing::info!(?kind, "Process stopped");
    }));

    watchdog.start(ExecKind::Normal);

    // Supervision loop; the watchdog restarts crashes on its own, the loop
    // only drives the periodic checks.
    loop {
        std::thread::sleep(TICK_INTERVAL);
        watchdog.monitor();
        watchdog.update_metrics();

        tracing::debug!(
            cpu = watchdog.last_cpu_usage(),
            memory = watchdog.last_memory_usage(),
            monitoring = watchdog.monitoring(),
            "Tick"
        );
    }
}

fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let _logging = match init_logging(&args) {
        Ok(system) => system,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    run(args);
}
