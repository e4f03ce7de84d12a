use crate::error::WatchdogError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the webhook URL notifications are posted to.
pub const ENDPOINT_VAR: &str = "SLACK_WEBHOOK_URL";
/// Environment variable pointing at an explicit tuning file.
pub const CONFIG_PATH_VAR: &str = "WATCHDOG_CONFIG";
/// Tuning file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "watchdog.toml";

/// Everything a watchdog run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub tuning: Tuning,
}

/// Optional knobs loaded from `watchdog.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Tuning {
    pub poll: PollConfig,
    pub capture: CaptureConfig,
    pub notify: NotifyConfig,
    pub scheduler: SchedulerConfig,
    pub detach: DetachConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub chunk_size: usize,
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub submit_command: String,
    pub queue_command: String,
    pub script_excerpt_lines: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DetachConfig {
    /// Where the detached worker's stdout/stderr go. Discarded when unset.
    pub worker_log: Option<PathBuf>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            artifact_dir: PathBuf::from("."),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit_command: "sbatch".to_string(),
            queue_command: "squeue".to_string(),
            script_excerpt_lines: 50,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Resolve configuration through an arbitrary variable lookup.
    ///
    /// The endpoint is checked first so a missing URL fails before any file
    /// is touched.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WatchdogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENDPOINT_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(WatchdogError::MissingEndpoint { var: ENDPOINT_VAR })?;

        let tuning = match lookup(CONFIG_PATH_VAR) {
            Some(path) => load_tuning(Path::new(&path))?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    load_tuning(default_path)?
                } else {
                    Tuning::default()
                }
            }
        };

        Ok(Self { endpoint, tuning })
    }
}

/// Parse a tuning file. Every field is optional.
pub fn load_tuning(path: &Path) -> Result<Tuning, WatchdogError> {
    let contents = std::fs::read_to_string(path).map_err(|e| WatchdogError::ConfigFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let tuning: Tuning = toml::from_str(&contents).map_err(|e| WatchdogError::ConfigFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), ?tuning, "loaded tuning file");
    Ok(tuning)
}
