/// Signal handling for the detached worker.
///
/// SIGINT and SIGTERM both mean "stop watching": the poll loop gives up and
/// the watchdog exits, leaving the scheduler's job untouched. SIGHUP is
/// ignored so closing the launching terminal cannot reach the worker.
use nix::sys::signal::{signal, SigHandler, Signal};
use tokio::signal::unix::{signal as unix_signal, SignalKind};

/// Resolve on the first SIGINT or SIGTERM.
///
/// If a handler cannot be installed that signal is simply not watched.
pub async fn stop_requested() {
    let mut term = match unix_signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            None
        }
    };
    let term_recv = async {
        match term.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    let int_recv = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = int_recv => tracing::info!("SIGINT received"),
        _ = term_recv => tracing::info!("SIGTERM received"),
    }
}

/// Ignore SIGHUP in the calling process.
///
/// Async-signal-safe, so it may run between fork and exec.
pub fn ignore_hangup() -> nix::Result<()> {
    // SAFETY: installing SIG_IGN touches no Rust state and no handler code runs.
    unsafe { signal(Signal::SIGHUP, SigHandler::SigIgn) }.map(|_| ())
}
