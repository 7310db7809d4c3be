//! Runtime settings, read from flags with environment fallbacks (`.env` is loaded first).

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::ConfigError;
use crate::executor::ExecutorSettings;
use crate::hands::LaunchConfig;
use crate::providers::Catalog;
use crate::types::{DEFAULT_COOLDOWN, DEFAULT_POLL_INTERVAL, DEFAULT_RESERVATION_BUDGET};

#[derive(Debug, Clone, Args)]
pub struct SettingsArgs {
    /// Pause after a successful reservation before starting the next one.
    #[arg(long, global = true, env = "CHECKIN_COOLDOWN_SECS", default_value_t = DEFAULT_COOLDOWN.as_secs())]
    pub cooldown_secs: u64,

    /// Wall-clock budget for a single reservation.
    #[arg(long, global = true, env = "CHECKIN_BUDGET_SECS", default_value_t = DEFAULT_RESERVATION_BUDGET.as_secs())]
    pub budget_secs: u64,

    #[arg(long, global = true, env = "CHECKIN_POLL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_ms: u64,

    /// Where failure screenshots are written.
    #[arg(long, global = true, env = "CHECKIN_ARTIFACT_DIR", default_value = ".")]
    pub artifact_dir: PathBuf,

    #[arg(long, global = true, env = "CHECKIN_HEADLESS")]
    pub headless: bool,

    #[arg(long, global = true, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// JSON file overriding the built-in provider tables.
    #[arg(long = "providers", global = true, env = "CHECKIN_PROVIDERS")]
    pub providers_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub cooldown: Duration,
    pub budget: Duration,
    pub poll_interval: Duration,
    pub artifact_dir: PathBuf,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub providers_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            budget: DEFAULT_RESERVATION_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
            artifact_dir: PathBuf::from("."),
            headless: false,
            chrome_path: None,
            providers_file: None,
        }
    }
}

impl From<SettingsArgs> for Settings {
    fn from(args: SettingsArgs) -> Self {
        Self {
            cooldown: Duration::from_secs(args.cooldown_secs),
            budget: Duration::from_secs(args.budget_secs),
            poll_interval: Duration::from_millis(args.poll_ms.max(1)),
            artifact_dir: args.artifact_dir,
            headless: args.headless,
            chrome_path: args.chrome_path,
            providers_file: args.providers_file,
        }
    }
}

impl Settings {
    pub fn executor(&self) -> ExecutorSettings {
        ExecutorSettings {
            poll_interval: self.poll_interval,
            budget: self.budget,
            artifact_dir: self.artifact_dir.clone(),
            ..Default::default()
        }
    }

    pub fn launch(&self) -> LaunchConfig {
        LaunchConfig {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            ..Default::default()
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog, ConfigError> {
        Catalog::load(self.providers_file.as_deref())
    }

    /// Flags that make a child `check-in` process run with these same settings.
    pub fn child_args(&self) -> Vec<String> {
        let mut args = vec![
            "--cooldown-secs".to_string(),
            self.cooldown.as_secs().to_string(),
            "--budget-secs".to_string(),
            self.budget.as_secs().to_string(),
            "--poll-ms".to_string(),
            self.poll_interval.as_millis().to_string(),
            "--artifact-dir".to_string(),
            self.artifact_dir.display().to_string(),
        ];
        if self.headless {
            args.push("--headless".to_string());
        }
        if let Some(path) = &self.chrome_path {
            args.push("--chrome-path".to_string());
            args.push(path.display().to_string());
        }
        if let Some(path) = &self.providers_file {
            args.push("--providers".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}
