//! Tests for the watchdog module
//!
//! Property tests cover the pure data paths (usage window, environment
//! overlay parsing); scenario tests drive a real watchdog over short-lived
//! shell processes and are gated to Unix where such processes are cheap to
//! fabricate.

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    use crate::watchdog::launcher::parse_environment_overlay;
    use crate::watchdog::metrics::{UsageWindow, NUM_SAMPLES};

    mod usage_window_retention {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Property: appended samples are retained newest-last, in
            /// order, and everything older than the window is zero.
            #[test]
            fn window_keeps_the_newest_samples_in_order(
                samples in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0), 1..50)
            ) {
                let mut window = UsageWindow::new();
                for &(cpu, memory) in &samples {
                    window.push(cpu, memory);
                }

                let k = samples.len();
                for (i, &(cpu, memory)) in samples.iter().enumerate() {
                    let slot = NUM_SAMPLES - k + i;
                    prop_assert_eq!(window.cpu()[slot], cpu);
                    prop_assert_eq!(window.memory()[slot], memory);
                }
                for slot in 0..NUM_SAMPLES - k {
                    prop_assert_eq!(window.cpu()[slot], 0.0);
                    prop_assert_eq!(window.memory()[slot], 0.0);
                }
            }

            /// Property: the window never grows; pushing any number of
            /// samples leaves exactly NUM_SAMPLES slots.
            #[test]
            fn window_length_is_constant(
                samples in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0), 0..300)
            ) {
                let mut window = UsageWindow::new();
                for &(cpu, memory) in &samples {
                    window.push(cpu, memory);
                }
                prop_assert_eq!(window.cpu().len(), NUM_SAMPLES);
                prop_assert_eq!(window.memory().len(), NUM_SAMPLES);
                if let Some(&(cpu, memory)) = samples.last() {
                    prop_assert_eq!(window.last_cpu(), cpu);
                    prop_assert_eq!(window.last_memory(), memory);
                }
            }

            /// Property: the index sequence is the fixed 0..NUM_SAMPLES
            /// ramp no matter what was pushed.
            #[test]
            fn indices_are_invariant(
                samples in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0), 0..120)
            ) {
                let mut window = UsageWindow::new();
                for &(cpu, memory) in &samples {
                    window.push(cpu, memory);
                }
                for (i, &index) in window.indices().iter().enumerate() {
                    prop_assert_eq!(index, i as f64);
                }
            }
        }
    }

    mod overlay_parsing {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Property: a simple KEY=VALUE line round-trips with
            /// whitespace trimmed off both sides.
            #[test]
            fn simple_pairs_parse_trimmed(
                name in "[A-Z][A-Z0-9_]{0,15}",
                value in "[a-z0-9/._-]{0,20}"
            ) {
                let overlay = format!(" {} = {} ", name, value);
                let entries = parse_environment_overlay(&overlay);
                prop_assert_eq!(entries.len(), 1);
                prop_assert_eq!(&entries[0].0, &name);
                prop_assert_eq!(&entries[0].1, &value);
            }

            /// Property: extra '=' pieces are re-joined without a
            /// separator, so the parsed value is the concatenation.
            #[test]
            fn extra_equals_pieces_concatenate(
                name in "[A-Z][A-Z0-9_]{0,15}",
                pieces in prop::collection::vec("[a-z0-9]{1,6}", 2..5)
            ) {
                let overlay = format!("{}={}", name, pieces.join("="));
                let entries = parse_environment_overlay(&overlay);
                prop_assert_eq!(entries.len(), 1);
                prop_assert_eq!(&entries[0].1, &pieces.concat());
            }

            /// Property: blank lines and lines with blank names never
            /// produce entries, whatever surrounds them.
            #[test]
            fn blank_names_are_skipped(
                value in "[a-z0-9]{0,10}",
                name in "[A-Z][A-Z0-9_]{0,15}"
            ) {
                let overlay = format!("\n   \n={}\n{}=kept\n", value, name);
                let entries = parse_environment_overlay(&overlay);
                prop_assert_eq!(entries.len(), 1);
                prop_assert_eq!(&entries[0].0, &name);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod scenario_tests {
    use std::path::{Path, PathBuf};
    use std::sync::mpsc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::config::WatchdogConfig;
    use crate::watchdog::{ExecKind, Watchdog};

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Watchdog whose stopped notifications land on the returned channel.
    fn watchdog_with_events(config: WatchdogConfig) -> (Watchdog, mpsc::Receiver<ExecKind>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let watchdog = Watchdog::new(config);
        watchdog.on_process_stopped(Box::new(move |kind| {
            let _ = tx.lock().send(kind);
        }));
        (watchdog, rx)
    }

    #[test]
    fn start_with_invalid_config_is_a_no_op() {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        watchdog.start(ExecKind::Normal);
        assert!(!watchdog.monitoring());
        assert_eq!(watchdog.last_cpu_usage(), 0.0);
        assert_eq!(watchdog.last_memory_usage(), 0.0);
    }

    #[test]
    fn every_stop_notifies_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write_script(dir.path(), "run.sh", "sleep 30");

        let (watchdog, stopped) = watchdog_with_events(WatchdogConfig {
            executable: exe,
            ..Default::default()
        });

        watchdog.start(ExecKind::Normal);
        assert!(watchdog.monitoring());
        assert_eq!(watchdog.cached_name(), "run");

        watchdog.stop(ExecKind::Normal);
        assert!(!watchdog.monitoring());
        assert_eq!(
            stopped.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Normal)
        );

        // A stop with nothing running still completes and notifies once.
        watchdog.stop(ExecKind::Normal);
        assert_eq!(
            stopped.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Normal)
        );
        assert!(stopped.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn crash_is_reported_and_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write_script(dir.path(), "crasher.sh", "sleep 0.2\nexit 3");

        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Mutex::new(started_tx);

        let (watchdog, stopped) = watchdog_with_events(WatchdogConfig {
            executable: exe,
            restart_delay_secs: 0,
            ..Default::default()
        });
        watchdog.on_process_started(Box::new(move |kind| {
            let _ = started_tx.lock().send(kind);
        }));

        watchdog.start(ExecKind::Normal);
        assert!(watchdog.monitoring());
        assert_eq!(
            started_rx.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Normal)
        );

        // Exit listener notices the crash, then the delayed restart fires.
        assert_eq!(
            stopped.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Crashed)
        );
        assert_eq!(
            started_rx.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Crashed)
        );

        watchdog.shutdown();
    }

    #[test]
    fn hook_scripts_follow_start_and_crash_paths() {
        let dir = tempfile::tempdir().unwrap();
        let start_marker = dir.path().join("started");
        let crash_marker = dir.path().join("crashed");
        let exe = write_script(dir.path(), "run.sh", "sleep 30");
        let start_script = write_script(
            dir.path(),
            "start.sh",
            &format!("touch {}", start_marker.display()),
        );
        let crash_script = write_script(
            dir.path(),
            "crash.sh",
            &format!("touch {}", crash_marker.display()),
        );

        let (watchdog, stopped) = watchdog_with_events(WatchdogConfig {
            executable: exe,
            start_script,
            crash_script,
            ..Default::default()
        });

        watchdog.start(ExecKind::Normal);
        assert!(watchdog.monitoring());
        assert!(start_marker.exists());

        // A deliberate stop must not run the crash script.
        watchdog.stop(ExecKind::Normal);
        assert_eq!(
            stopped.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Normal)
        );
        assert!(!crash_marker.exists());
    }

    #[test]
    fn crash_script_runs_on_crash_stop() {
        let dir = tempfile::tempdir().unwrap();
        let crash_marker = dir.path().join("crashed");
        let exe = write_script(dir.path(), "run.sh", "sleep 30");
        let crash_script = write_script(
            dir.path(),
            "crash.sh",
            &format!("touch {}", crash_marker.display()),
        );

        let (watchdog, stopped) = watchdog_with_events(WatchdogConfig {
            executable: exe,
            crash_script,
            // Keep the post-crash restart far away so shutdown wins.
            restart_delay_secs: 60,
            ..Default::default()
        });

        watchdog.start(ExecKind::Normal);
        assert!(watchdog.monitoring());

        // A stop classified as crashed runs the crash hook.
        watchdog.stop(ExecKind::Crashed);
        assert_eq!(
            stopped.recv_timeout(Duration::from_secs(5)),
            Ok(ExecKind::Crashed)
        );
        assert!(crash_marker.exists());

        watchdog.shutdown();
    }

    #[test]
    fn metrics_tick_fills_the_window_while_monitoring() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write_script(dir.path(), "run.sh", "sleep 30");

        let (watchdog, _stopped) = watchdog_with_events(WatchdogConfig {
            executable: exe,
            ..Default::default()
        });

        watchdog.start(ExecKind::Normal);
        watchdog.update_metrics();

        let window = watchdog.usage_window();
        assert!(window.last_memory() >= 0.0);
        assert!(window.last_cpu() >= 0.0);

        watchdog.stop(ExecKind::Normal);
        assert_eq!(watchdog.last_cpu_usage(), 0.0);
        assert_eq!(watchdog.last_memory_usage(), 0.0);
    }
}
