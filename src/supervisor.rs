/// Self-detaching supervision.
///
/// The first invocation re-launches the current executable in a new session
/// with the guard variable set and the whole command serialised into one
/// argument, then returns. The re-launched worker sees the guard and does the
/// actual monitoring. Exactly one re-spawn happens per user invocation.
use crate::error::WatchdogError;
use crate::invocation::serialize_tokens;
use crate::signals::ignore_hangup;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

/// Guard variable marking the detached worker. Set only by [`spawn_detached`].
pub const GUARD_VAR: &str = "WATCHDOG_DETACHED";
const GUARD_VALUE: &str = "1";

/// Which side of the hand-off this process is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Launched by the user; must hand off and return.
    Original { command: String },
    /// Launched by [`spawn_detached`]; runs the job.
    Detached { command: String },
}

impl Phase {
    /// Decide the phase from the positional arguments and the guard value.
    ///
    /// The worker receives its command as a single pre-serialised argument,
    /// which is taken as-is.
    pub fn resolve(args: &[String], guard: Option<&str>) -> Self {
        if guard == Some(GUARD_VALUE) {
            Phase::Detached {
                command: args.join(" "),
            }
        } else {
            Phase::Original {
                command: serialize_tokens(args),
            }
        }
    }
}

/// Start `exe` as a detached worker for `command`, returning its pid.
///
/// The worker gets its own session (so it has no controlling terminal and
/// survives the caller), ignores SIGHUP, and has its stdio pointed at
/// `worker_log` or `/dev/null`. The child is not waited on.
pub fn spawn_detached(
    exe: &Path,
    command: &str,
    worker_log: Option<&Path>,
) -> Result<u32, WatchdogError> {
    let (stdout, stderr) = match worker_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| WatchdogError::Io {
                    context: format!("failed to open worker log {}", path.display()),
                    source: e,
                })?;
            let file_err = file.try_clone().map_err(|e| WatchdogError::Io {
                context: format!("failed to open worker log {}", path.display()),
                source: e,
            })?;
            (Stdio::from(file), Stdio::from(file_err))
        }
        None => (Stdio::null(), Stdio::null()),
    };

    let mut cmd = Command::new(exe);
    cmd.arg(command)
        .env(GUARD_VAR, GUARD_VALUE)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    // SAFETY: setsid and signal(SIG_IGN) are async-signal-safe and touch no
    // state shared with the parent.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            ignore_hangup().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(|e| WatchdogError::Spawn {
        program: exe.display().to_string(),
        source: e,
    })?;
    let pid = child.id();
    tracing::info!(pid, command, "detached worker started");
    Ok(pid)
}

/// Original-phase entry: re-launch this binary as the worker.
pub fn hand_off(command: &str, worker_log: Option<&Path>) -> Result<u32, WatchdogError> {
    let exe = std::env::current_exe().map_err(|e| WatchdogError::Io {
        context: "cannot locate own executable".to_string(),
        source: e,
    })?;
    spawn_detached(&exe, command, worker_log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Write an executable stand-in for the worker binary.
    fn fake_worker(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-worker");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Retry on ETXTBSY: a sibling test thread may still hold the freshly
    /// written script open across its own fork.
    fn spawn_retrying(exe: &Path, command: &str, log: Option<&Path>) -> u32 {
        for _ in 0..50 {
            match spawn_detached(exe, command, log) {
                Ok(pid) => return pid,
                Err(WatchdogError::Spawn { source, .. }) if source.raw_os_error() == Some(26) => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => panic!("spawn failed: {e}"),
            }
        }
        panic!("executable stayed busy");
    }

    fn wait_for_file(path: &Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if contents.ends_with('\n') {
                    return contents;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("worker never wrote {}", path.display());
    }

    #[test]
    fn test_phase_without_guard_is_original() {
        let phase = Phase::resolve(&args(&["echo", "a b"]), None);
        assert_eq!(
            phase,
            Phase::Original {
                command: "echo 'a b'".to_string()
            }
        );
    }

    #[test]
    fn test_phase_with_guard_is_detached_verbatim() {
        let phase = Phase::resolve(&args(&["echo 'a b'"]), Some("1"));
        assert_eq!(
            phase,
            Phase::Detached {
                command: "echo 'a b'".to_string()
            }
        );
    }

    #[test]
    fn test_phase_ignores_unexpected_guard_value() {
        let phase = Phase::resolve(&args(&["ls"]), Some("yes"));
        assert!(matches!(phase, Phase::Original { .. }));
    }

    #[test]
    fn test_spawn_passes_guard_and_single_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("seen.txt");
        let exe = fake_worker(
            dir.path(),
            &format!(
                "printf '%s|%s|%s\\n' \"${GUARD_VAR}\" \"$#\" \"$1\" > {}",
                out.display()
            ),
        );

        spawn_retrying(&exe, "echo 'a  b' && ls", None);
        assert_eq!(wait_for_file(&out), "1|1|echo 'a  b' && ls\n");
    }

    #[test]
    fn test_spawn_returns_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("late.txt");
        let exe = fake_worker(dir.path(), &format!("sleep 1; echo done > {}", out.display()));

        let start = Instant::now();
        let pid = spawn_retrying(&exe, "anything", None);
        assert!(pid > 0);
        assert!(start.elapsed() < Duration::from_millis(900));
        assert!(!out.exists());
        assert_eq!(wait_for_file(&out), "done\n");
    }

    #[test]
    fn test_worker_runs_in_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sid.txt");
        // A session leader's sid (field 6 of /proc/<pid>/stat) equals its pid.
        let exe = fake_worker(
            dir.path(),
            &format!(
                "read -r stat < /proc/$$/stat; set -- $stat; echo \"$1 $6\" > {}",
                out.display()
            ),
        );

        spawn_retrying(&exe, "x", None);
        let line = wait_for_file(&out);
        let ids: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "unexpected ps output: {line:?}");
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn test_worker_log_receives_output() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("worker.log");
        let exe = fake_worker(dir.path(), "echo to-stdout; echo to-stderr >&2");

        spawn_retrying(&exe, "x", Some(&log));
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let contents = std::fs::read_to_string(&log).unwrap_or_default();
            if contents.contains("to-stdout") && contents.contains("to-stderr") {
                break;
            }
            assert!(Instant::now() < deadline, "worker log incomplete: {contents:?}");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let err = spawn_detached(Path::new("/nonexistent/watchdog-bin"), "x", None).unwrap_err();
        assert!(matches!(err, WatchdogError::Spawn { .. }));
    }
}
