mod capture;
mod config;
mod detector;
mod error;
mod invocation;
mod message;
mod notifier;
mod orchestrator;
mod signals;
mod supervisor;

use clap::Parser;
use config::Config;
use detector::scheduler::SqueueRegistry;
use error::WatchdogError;
use message::JobContext;
use notifier::WebhookNotifier;
use std::process::ExitCode;
use supervisor::{Phase, GUARD_VAR};

/// Run a command or batch submission in the background and post a webhook
/// notification when it finishes.
///
/// Every argument belongs to the monitored command; there are no flags.
#[derive(Parser, Debug)]
#[command(
    name = "watchdog",
    about,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// Command to monitor (a `sbatch ...` submission is polled until the job leaves the queue)
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("WATCHDOG_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let (config, phase) = match prepare(&cli.command, |key| std::env::var(key).ok()) {
        Ok(prepared) => prepared,
        Err(e) => return fail(&e),
    };

    match phase {
        Phase::Original { command } => {
            match supervisor::hand_off(&command, config.tuning.detach.worker_log.as_deref()) {
                Ok(pid) => {
                    println!("✅ Monitoring in background (pid {pid}): {command}");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e),
            }
        }
        Phase::Detached { command } => run_worker(&config, &command).await,
    }
}

/// Resolve configuration, then decide which phase this process is in.
///
/// Configuration comes first in both phases: without an endpoint there is no
/// `Config`, so neither a hand-off nor a notifier can be built and nothing is
/// ever sent.
fn prepare<F>(args: &[String], lookup: F) -> Result<(Config, Phase), WatchdogError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = Config::from_lookup(&lookup)?;
    let guard = lookup(GUARD_VAR);
    Ok((config, Phase::resolve(args, guard.as_deref())))
}

async fn run_worker(config: &Config, command: &str) -> ExitCode {
    let ctx = JobContext::detect();
    let notifier = WebhookNotifier::new(config.endpoint.clone(), config.tuning.notify.timeout());
    let registry = SqueueRegistry::new(config.tuning.scheduler.queue_command.clone());

    let result = orchestrator::run(
        config,
        command,
        &ctx,
        &notifier,
        &registry,
        signals::stop_requested(),
    )
    .await;

    match result {
        Ok(delivery) if delivery.is_success() => {
            println!("✅ Notification sent");
            ExitCode::SUCCESS
        }
        Ok(delivery) => {
            eprintln!("❌ Notification failed: {}", delivery.detail);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn fail(err: &WatchdogError) -> ExitCode {
    match err {
        WatchdogError::Interrupted { .. } => eprintln!("⚠️ {err}"),
        _ => eprintln!("❌ {err}"),
    }
    tracing::error!(error = %err, "watchdog failed");
    ExitCode::from(err.exit_code())
}
