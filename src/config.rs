//! Watchdog configuration and path validation.
//!
//! All path-like fields are normalized to absolute paths and checked for
//! existence before a launch is allowed. The executable is mandatory; the
//! hook scripts and working directory are optional and are silently cleared
//! when they do not exist.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Executable path missing or not a runnable file: {path}")]
    InvalidExecutable { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for a supervised process.
///
/// An empty `PathBuf` means "not set" for every path field. The owner may
/// mutate fields freely between runs; [`validate`] is invoked at the top of
/// every start attempt and re-normalizes whatever is currently stored.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Working directory for the supervised process
    pub working_dir: PathBuf,

    /// Path to the supervised executable (mandatory)
    pub executable: PathBuf,

    /// Command-line argument string passed to the executable
    pub arguments: String,

    /// Script executed synchronously before every (re)start
    pub start_script: PathBuf,

    /// Script executed synchronously before every crash-triggered restart
    pub crash_script: PathBuf,

    /// Newline-delimited `KEY=VALUE` environment overlay
    pub environment: String,

    /// Delay before a crash-triggered restart, in seconds
    pub restart_delay_secs: u64,

    /// How long an unresponsive process is given before it is treated as
    /// crashed, in seconds
    pub unresponsive_wait_secs: u64,

    /// Redirect and log the child's stdout/stderr
    pub capture_output: bool,

    /// Treat a process that stops responding as crashed
    pub assume_crash_if_unresponsive: bool,

    /// Keep the child's main window topmost and focused
    pub force_always_on_top: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::new(),
            executable: PathBuf::new(),
            arguments: String::new(),
            start_script: PathBuf::new(),
            crash_script: PathBuf::new(),
            environment: String::new(),
            restart_delay_secs: 0,
            unresponsive_wait_secs: 0,
            capture_output: false,
            assume_crash_if_unresponsive: false,
            force_always_on_top: false,
        }
    }
}

/// Normalize and verify every path field of `config` in place.
///
/// Relative paths are resolved against the current working directory. The
/// executable must exist and be of the platform's runnable kind, otherwise
/// it is cleared and the config is reported unusable. Scripts and the
/// working directory are cleared individually when absent without failing
/// the whole config.
pub fn validate(config: &mut WatchdogConfig) -> Result<(), ConfigError> {
    config.executable = normalize(&config.executable)?;
    config.crash_script = normalize(&config.crash_script)?;
    config.start_script = normalize(&config.start_script)?;
    config.working_dir = normalize(&config.working_dir)?;

    if !is_runnable(&config.executable) {
        let path = config.executable.display().to_string();
        config.executable = PathBuf::new();
        return Err(ConfigError::InvalidExecutable { path });
    }

    if !config.crash_script.as_os_str().is_empty() && !config.crash_script.is_file() {
        config.crash_script = PathBuf::new();
    }

    if !config.start_script.as_os_str().is_empty() && !config.start_script.is_file() {
        config.start_script = PathBuf::new();
    }

    if !config.working_dir.as_os_str().is_empty() && !config.working_dir.is_dir() {
        config.working_dir = PathBuf::new();
    }

    Ok(())
}

/// Resolve a path against the current working directory; empty stays empty.
fn normalize(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Ok(PathBuf::new());
    }

    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(std::path::absolute(path)?)
}

/// Check that the executable exists and is of the platform's runnable kind.
#[cfg(windows)]
fn is_runnable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("exe"))
            .unwrap_or(false)
}

#[cfg(not(windows))]
fn is_runnable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn empty_config_is_invalid() {
        let mut config = WatchdogConfig::default();
        assert!(validate(&mut config).is_err());
        assert!(config.executable.as_os_str().is_empty());
    }

    #[test]
    fn missing_executable_is_cleared_and_invalid() {
        let mut config = WatchdogConfig {
            executable: PathBuf::from("/nonexistent/binary"),
            ..Default::default()
        };
        assert!(validate(&mut config).is_err());
        assert!(config.executable.as_os_str().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "not a program").unwrap();

        let mut config = WatchdogConfig {
            executable: path,
            ..Default::default()
        };
        assert!(validate(&mut config).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn valid_executable_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.sh");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        make_executable(&path);

        let mut config = WatchdogConfig {
            executable: path.clone(),
            ..Default::default()
        };
        assert!(validate(&mut config).is_ok());
        assert_eq!(config.executable, path);
    }

    #[cfg(unix)]
    #[test]
    fn absent_optional_paths_are_cleared_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("run.sh");
        std::fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
        make_executable(&exe);

        let mut config = WatchdogConfig {
            executable: exe,
            start_script: PathBuf::from("/no/such/start.sh"),
            crash_script: PathBuf::from("/no/such/crash.sh"),
            working_dir: PathBuf::from("/no/such/dir"),
            ..Default::default()
        };

        assert!(validate(&mut config).is_ok());
        assert!(config.start_script.as_os_str().is_empty());
        assert!(config.crash_script.as_os_str().is_empty());
        assert!(config.working_dir.as_os_str().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn relative_paths_are_normalized_to_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("run.sh");
        std::fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
        make_executable(&exe);

        let cwd = std::env::current_dir().unwrap();
        let relative = pathdiff(&exe, &cwd).unwrap_or_else(|| exe.clone());

        let mut config = WatchdogConfig {
            executable: relative,
            ..Default::default()
        };
        assert!(validate(&mut config).is_ok());
        assert!(config.executable.is_absolute());
    }

    // Minimal relative-path construction for the normalization test; falls
    // back to the absolute path when the tempdir is on another root.
    fn pathdiff(target: &Path, base: &Path) -> Option<PathBuf> {
        let mut ups = PathBuf::new();
        let mut base = base.to_path_buf();
        loop {
            if let Ok(stripped) = target.strip_prefix(&base) {
                return Some(ups.join(stripped));
            }
            if !base.pop() {
                return None;
            }
            ups.push("..");
        }
    }
}
