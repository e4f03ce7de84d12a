//! Completion detection.
//!
//! Two strategies share one contract: block until the job is over and hand
//! back the notification text (plus, in direct mode, the capture artifact the
//! fallback write targets).
//!
//! - [`direct`] runs the command itself and waits for it to exit.
//! - [`scheduler`] submits a batch job and polls the queue until the job id
//!   disappears.

pub mod direct;
pub mod scheduler;

use crate::capture::CaptureArtifact;

/// What a finished job leaves behind for the orchestrator.
#[derive(Debug)]
pub struct Completion {
    pub message: String,
    pub artifact: Option<CaptureArtifact>,
}
