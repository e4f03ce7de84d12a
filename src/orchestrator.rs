/// Worker-side wiring: pick a completion strategy for the command, wait for
/// the job, send the single notification, and fall back to the local
/// artifact when delivery fails.
use crate::config::Config;
use crate::detector::{direct, scheduler, scheduler::JobRegistry};
use crate::error::WatchdogError;
use crate::invocation::Invocation;
use crate::message::{self, JobContext};
use crate::notifier::{NotificationResult, Notifier};
use std::future::Future;

/// Monitor `command` to completion and report it.
///
/// Returns the delivery outcome; a failed delivery is not an error. In
/// scheduler mode a rejected submission is reported through `notifier`
/// before the error is returned. `cancel` only matters while polling.
pub async fn run<N, R, C>(
    config: &Config,
    command: &str,
    ctx: &JobContext,
    notifier: &N,
    registry: &R,
    cancel: C,
) -> Result<NotificationResult, WatchdogError>
where
    N: Notifier + ?Sized,
    R: JobRegistry + ?Sized,
    C: Future<Output = ()>,
{
    let tuning = &config.tuning;
    let invocation = Invocation::classify(command, &tuning.scheduler);
    tracing::info!(?invocation, "monitoring");

    let completion = match &invocation {
        Invocation::Direct { command } => {
            direct::await_completion(command, &tuning.capture, ctx).await
        }
        Invocation::Scheduler { command, script } => {
            scheduler::await_completion(
                command,
                script.as_deref(),
                &tuning.scheduler,
                tuning.poll.interval(),
                registry,
                ctx,
                cancel,
            )
            .await
        }
    };

    let completion = match completion {
        Ok(completion) => completion,
        Err(WatchdogError::Submission { code, stderr }) => {
            let text = message::submission_failed(ctx, invocation.command(), &stderr);
            let result = notifier.send(&text).await;
            if !result.is_success() {
                tracing::warn!(error = %result.detail, "submission failure could not be reported");
            }
            return Err(WatchdogError::Submission { code, stderr });
        }
        Err(err) => return Err(err),
    };

    let result = notifier.send(&completion.message).await;
    if !result.is_success() {
        if let Some(artifact) = completion.artifact {
            tracing::info!(
                artifact = %artifact.path().display(),
                "recording delivery failure in place of captured output"
            );
            artifact.replace_with_failure(&result.detail)?;
        }
    }
    Ok(result)
}
