use super::Completion;
use crate::capture::{run_captured, CaptureArtifact};
use crate::config::CaptureConfig;
use crate::error::WatchdogError;
use crate::message::{self, JobContext};

/// Run `command` to completion, persist its output, and describe the result.
///
/// The exit status is reported but never changes the outcome: any exit
/// yields a completion.
pub async fn await_completion(
    command: &str,
    capture: &CaptureConfig,
    ctx: &JobContext,
) -> Result<Completion, WatchdogError> {
    let run = run_captured(command, capture.chunk_size).await?;
    let artifact = CaptureArtifact::create(&capture.artifact_dir, chrono::Local::now(), &run.output)?;
    let message = message::direct_finished(ctx, command, &artifact.file_name(), run.status.code());

    Ok(Completion {
        message,
        artifact: Some(artifact),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> JobContext {
        JobContext {
            host: "h".to_string(),
            cwd: PathBuf::from("/w"),
        }
    }

    #[tokio::test]
    async fn test_echo_hello_artifact_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let capture = CaptureConfig {
            chunk_size: 2,
            artifact_dir: dir.path().to_path_buf(),
        };

        let completion = await_completion("echo hello", &capture, &ctx()).await.unwrap();
        let artifact = completion.artifact.unwrap();

        assert_eq!(std::fs::read_to_string(artifact.path()).unwrap(), "hello\n");
        let name = artifact.file_name();
        assert!(name.starts_with("monitor_") && name.ends_with(".log"));
        assert!(completion.message.contains(&name));
        // The message references the file, not the captured text.
        assert!(!completion.message.contains("hello\n"));
    }

    #[tokio::test]
    async fn test_failing_command_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let capture = CaptureConfig {
            chunk_size: 8192,
            artifact_dir: dir.path().to_path_buf(),
        };

        let completion = await_completion("false", &capture, &ctx()).await.unwrap();
        assert!(completion.message.contains("*Exit status:* 1"));
        assert!(completion.artifact.is_some());
    }
}
