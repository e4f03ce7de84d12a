/// Notification text, in the webhook's mrkdwn dialect.
use std::path::PathBuf;

/// Where the watchdog is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub host: String,
    pub cwd: PathBuf,
}

impl JobContext {
    pub fn detect() -> Self {
        let host = nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown-host".to_string());
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { host, cwd }
    }

    fn header(&self) -> String {
        format!(
            "*Host:* `{}`\n*Directory:* `{}`",
            self.host,
            self.cwd.display()
        )
    }
}

pub fn direct_finished(
    ctx: &JobContext,
    command: &str,
    artifact_name: &str,
    exit_code: Option<i32>,
) -> String {
    let exit = match exit_code {
        Some(code) => code.to_string(),
        None => "killed by signal".to_string(),
    };
    format!(
        "✅ *Command finished*\n{}\n*Command:* `{}`\n*Exit status:* {}\n*Output saved to:* `{}`",
        ctx.header(),
        command,
        exit,
        artifact_name
    )
}

pub fn scheduler_finished(ctx: &JobContext, command: &str, job_id: &str, excerpt: &str) -> String {
    format!(
        "✅ *Batch job {}* has left the queue\n{}\n*Command:* `{}`\n*Script:*\n```\n{}\n```",
        job_id,
        ctx.header(),
        command,
        excerpt.trim_end()
    )
}

pub fn submission_failed(ctx: &JobContext, command: &str, stderr: &str) -> String {
    format!(
        "❌ *Job submission failed*\n{}\n*Command:* `{}`\n```\n{}\n```",
        ctx.header(),
        command,
        stderr.trim()
    )
}
