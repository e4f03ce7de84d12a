/// Batch-scheduler strategy: submit, pull the job id out of the submission
/// output, then poll the queue listing until the id is gone.
use super::Completion;
use crate::capture::shell_command;
use crate::config::SchedulerConfig;
use crate::error::WatchdogError;
use crate::message::{self, JobContext};
use crate::supervisor::GUARD_VAR;
use regex::Regex;
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

static JOB_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Submitted batch job (\d+)").unwrap());

/// Raw result of running the submit command.
#[derive(Debug)]
pub struct Submission {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run the submission command, keeping stdout and stderr apart.
pub async fn submit(command: &str) -> Result<Submission, WatchdogError> {
    tracing::info!(command, "submitting batch job");
    let output = shell_command(command)
        .output()
        .await
        .map_err(|e| WatchdogError::Spawn {
            program: "sh".to_string(),
            source: e,
        })?;

    Ok(Submission {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Pull the numeric job id out of `Submitted batch job <digits>`.
pub fn extract_job_id(stdout: &str) -> Option<String> {
    JOB_ID_PATTERN
        .captures(stdout)
        .map(|caps| caps[1].to_string())
}

/// A queue that can be asked whether a job is still listed.
pub trait JobRegistry: Send + Sync {
    fn contains<'a>(&'a self, job_id: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Queries the scheduler's job listing for one job id
/// (`squeue -h -o %i -j <id>`).
///
/// Once a finished job ages out of the controller, `squeue -j` exits
/// non-zero with "Invalid job id specified"; that counts as absent. Any other
/// failure counts as still queued.
pub struct SqueueRegistry {
    queue_command: String,
}

impl SqueueRegistry {
    pub fn new(queue_command: impl Into<String>) -> Self {
        Self {
            queue_command: queue_command.into(),
        }
    }
}

impl JobRegistry for SqueueRegistry {
    fn contains<'a>(&'a self, job_id: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let output = Command::new(&self.queue_command)
                .args(["-h", "-o", "%i", "-j", job_id])
                .env_remove(GUARD_VAR)
                .stdin(Stdio::null())
                .output()
                .await;
            match output {
                Ok(out) if out.status.success() => {
                    listing_contains(&String::from_utf8_lossy(&out.stdout), job_id)
                }
                Ok(out) if is_unknown_job(&String::from_utf8_lossy(&out.stderr)) => {
                    tracing::debug!(job_id, "queue no longer knows the job");
                    false
                }
                Ok(out) => {
                    tracing::warn!(
                        exit_code = ?out.status.code(),
                        stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                        "queue listing failed, assuming job still queued"
                    );
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        command = %self.queue_command,
                        "could not run queue listing, assuming job still queued"
                    );
                    true
                }
            }
        })
    }
}

/// Whether a failed queue query says the job id is unknown.
pub fn is_unknown_job(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("invalid job id")
}

/// Whether a one-id-per-line listing mentions `job_id`, directly or as an
/// array element (`<id>_<n>`, `<id>_[1-10]`).
pub fn listing_contains(listing: &str, job_id: &str) -> bool {
    listing.lines().map(str::trim).any(|line| {
        line == job_id
            || line
                .strip_prefix(job_id)
                .is_some_and(|rest| rest.starts_with('_'))
    })
}

/// Sleep `interval`, query, repeat until `job_id` is absent.
///
/// Returns the number of queries made. `cancel` resolving first aborts with
/// [`WatchdogError::Interrupted`]; the job itself is left alone.
pub async fn poll_until_gone<R, C>(
    registry: &R,
    job_id: &str,
    interval: Duration,
    cancel: C,
) -> Result<u32, WatchdogError>
where
    R: JobRegistry + ?Sized,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let mut queries = 0u32;

    loop {
        let present = tokio::select! {
            _ = &mut cancel => {
                tracing::warn!(job_id, queries, "polling interrupted");
                return Err(WatchdogError::Interrupted { job_id: job_id.to_string() });
            }
            present = async {
                tokio::time::sleep(interval).await;
                registry.contains(job_id).await
            } => present,
        };
        queries += 1;
        tracing::debug!(job_id, queries, present, "queue polled");

        if !present {
            tracing::info!(job_id, queries, "job no longer queued");
            return Ok(queries);
        }
    }
}

/// First `max_lines` lines of the submission script, or a placeholder.
pub fn script_excerpt(script: Option<&Path>, max_lines: usize) -> String {
    let Some(path) = script else {
        return "(submission script not found)".to_string();
    };
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to open submission script");
            return format!("(submission script {} could not be read)", path.display());
        }
    };

    // Only the head is read; bytes that are not UTF-8 are replaced, not fatal.
    let lines: Result<Vec<String>, _> = BufReader::new(file)
        .split(b'\n')
        .take(max_lines)
        .map(|line| {
            line.map(|bytes| {
                let text = String::from_utf8_lossy(&bytes);
                text.strip_suffix('\r').unwrap_or(&text[..]).to_string()
            })
        })
        .collect();
    match lines {
        Ok(lines) => lines.join("\n"),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to read submission script");
            format!("(submission script {} could not be read)", path.display())
        }
    }
}

/// Submit `command` and block until the resulting job leaves the queue.
pub async fn await_completion<R, C>(
    command: &str,
    script: Option<&Path>,
    scheduler: &SchedulerConfig,
    interval: Duration,
    registry: &R,
    ctx: &JobContext,
    cancel: C,
) -> Result<Completion, WatchdogError>
where
    R: JobRegistry + ?Sized,
    C: Future<Output = ()>,
{
    let submission = submit(command).await?;
    if !submission.status.success() {
        return Err(WatchdogError::Submission {
            code: submission.status.code(),
            stderr: submission.stderr.trim().to_string(),
        });
    }

    let job_id = extract_job_id(&submission.stdout).ok_or_else(|| WatchdogError::Extraction {
        stdout: submission.stdout.trim().to_string(),
    })?;
    tracing::info!(job_id = %job_id, interval_secs = interval.as_secs(), "watching batch job");

    poll_until_gone(registry, &job_id, interval, cancel).await?;

    let excerpt = script_excerpt(script, scheduler.script_excerpt_lines);
    Ok(Completion {
        message: message::scheduler_finished(ctx, command, &job_id, &excerpt),
        artifact: None,
    })
}
