use std::path::PathBuf;

/// Fatal conditions that end a watchdog run.
///
/// Notification delivery failures are deliberately absent: they are carried
/// as [`crate::notifier::NotificationResult`] values and never abort a run.
#[derive(Debug)]
pub enum WatchdogError {
    /// The webhook endpoint variable is unset or empty.
    MissingEndpoint { var: &'static str },
    /// The optional tuning file exists but could not be read or parsed.
    ConfigFile { path: PathBuf, detail: String },
    /// A child process (worker, command, submission) could not be started.
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// I/O failure while draining output or writing the capture artifact.
    Io {
        context: String,
        source: std::io::Error,
    },
    /// The scheduler rejected the submission (non-zero exit).
    Submission { code: Option<i32>, stderr: String },
    /// The submission succeeded but no job id could be found in its output.
    Extraction { stdout: String },
    /// SIGINT/SIGTERM arrived while polling the scheduler.
    Interrupted { job_id: String },
}

impl WatchdogError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            WatchdogError::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

impl std::fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogError::MissingEndpoint { var } => {
                write!(f, "{var} is not set; cannot deliver notifications")
            }
            WatchdogError::ConfigFile { path, detail } => {
                write!(f, "invalid config file {}: {}", path.display(), detail)
            }
            WatchdogError::Spawn { program, source } => {
                write!(f, "failed to spawn {program}: {source}")
            }
            WatchdogError::Io { context, source } => write!(f, "{context}: {source}"),
            WatchdogError::Submission { code, stderr } => match code {
                Some(code) => write!(f, "job submission failed (exit {code}): {stderr}"),
                None => write!(f, "job submission killed by signal: {stderr}"),
            },
            WatchdogError::Extraction { stdout } => {
                write!(f, "could not find a job id in submission output: {stdout:?}")
            }
            WatchdogError::Interrupted { job_id } => write!(
                f,
                "monitoring of job {job_id} interrupted; the job itself is still running"
            ),
        }
    }
}

impl std::error::Error for WatchdogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchdogError::Spawn { source, .. } => Some(source),
            WatchdogError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_interrupted_exit_code() {
        let err = WatchdogError::Interrupted {
            job_id: "12".to_string(),
        };
        assert_eq!(err.exit_code(), 130);
        assert!(err.to_string().contains("still running"));
    }

    #[test]
    fn test_other_failures_exit_one() {
        let err = WatchdogError::MissingEndpoint {
            var: "SLACK_WEBHOOK_URL",
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            err.to_string(),
            "SLACK_WEBHOOK_URL is not set; cannot deliver notifications"
        );

        let err = WatchdogError::Extraction {
            stdout: "queued".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_spawn_error_exposes_source() {
        let err = WatchdogError::Spawn {
            program: "sbatch".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("failed to spawn sbatch"));
    }

    #[test]
    fn test_submission_display_includes_code() {
        let err = WatchdogError::Submission {
            code: Some(1),
            stderr: "invalid partition".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "job submission failed (exit 1): invalid partition"
        );
    }
}
