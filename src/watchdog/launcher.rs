//! Process launching
//!
//! Builds and spawns the supervised process: argument tokenization, working
//! directory, the environment overlay with OS-style variable expansion,
//! optional stdout/stderr capture, and the synchronous hook scripts that run
//! before starts and crash-triggered restarts.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;

use crate::config::WatchdogConfig;

/// Parse the newline-delimited `KEY=VALUE` overlay into pairs.
///
/// Per non-blank line, the name is everything left of the first `=`,
/// trimmed; the value is the remaining `=`-separated pieces re-joined
/// without a separator, then trimmed. Lines with a blank name are skipped.
/// Non-blank values get OS-style environment expansion.
pub fn parse_environment_overlay(overlay: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();

    for line in overlay.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let mut pieces = line.split('=');
        let name = pieces.next().unwrap_or("").trim().to_string();
        if name.is_empty() {
            continue;
        }

        let value = pieces.collect::<Vec<_>>().concat().trim().to_string();
        let value = if value.is_empty() {
            value
        } else {
            expand_env_vars(&value)
        };

        entries.push((name, value));
    }

    entries
}

/// Expand environment variable references the way the host OS shell writes
/// them: `%NAME%` on Windows, `$NAME` and `${NAME}` elsewhere. References to
/// unset variables are left untouched.
#[cfg(windows)]
pub fn expand_env_vars(value: &str) -> String {
    use regex::Regex;
    let Ok(pattern) = Regex::new(r"%([^%]+)%") else {
        return value.to_string();
    };
    pattern
        .replace_all(value, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(not(windows))]
pub fn expand_env_vars(value: &str) -> String {
    use regex::Regex;
    let Ok(pattern) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
    else {
        return value.to_string();
    };
    pattern
        .replace_all(value, |caps: &regex::Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Run a hook script synchronously and wait for it to finish.
///
/// Failures are logged and swallowed; a broken hook never blocks the
/// supervision sequence it is hooked into.
pub fn run_script(script: &Path) {
    if script.as_os_str().is_empty() {
        return;
    }

    tracing::info!(script = %script.display(), "Running hook script");
    match Command::new(script).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!(script = %script.display(), %status, "Hook script exited with failure");
        }
        Err(e) => {
            tracing::error!(script = %script.display(), error = %e, "Failed to run hook script");
        }
    }
}

/// Spawn the supervised process described by `config`.
///
/// The argument string is tokenized shell-style. Overlay entries are applied
/// with `Command::env` and so override inherited variables. When capture is
/// enabled both output streams are piped; call [`spawn_output_readers`] on
/// the returned child to drain them.
pub fn launch(config: &WatchdogConfig) -> std::io::Result<Child> {
    let mut command = Command::new(&config.executable);

    if !config.arguments.trim().is_empty() {
        let tokens = shlex::split(&config.arguments).unwrap_or_else(|| {
            tracing::warn!(
                arguments = %config.arguments,
                "Argument string has unbalanced quoting, passing it as a single argument"
            );
            vec![config.arguments.clone()]
        });
        command.args(tokens);
    }

    if !config.working_dir.as_os_str().is_empty() {
        command.current_dir(&config.working_dir);
    }

    for (name, value) in parse_environment_overlay(&config.environment) {
        command.env(name, value);
    }

    if config.capture_output {
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
    }

    command.spawn()
}

/// Drain the child's piped output on two background threads.
///
/// Each stdout line is logged at info, each stderr line at error, tagged
/// with the child's display name. The threads exit on EOF and touch no
/// supervisor state, so they may outlive the supervision of this child.
pub fn spawn_output_readers(child: &mut Child, name: &str) {
    if let Some(stdout) = child.stdout.take() {
        let name = name.to_string();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => tracing::info!(process = %name, "{}", line),
                    Err(_) => break,
                }
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let name = name.to_string();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => tracing::error!(process = %name, "{}", line),
                    Err(_) => break,
                }
            }
        });
    }
}
