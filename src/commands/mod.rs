pub mod dashboard;
pub mod init;
pub mod record;
pub mod sessions;
pub mod simulate;
pub mod system;

use std::path::Path;

use anyhow::{Context, Result};
use agent_integrity::{Config, IntegrityService, build_notifier};

/// Load config and open the service stored under `dir`.
pub fn open_service(dir: &Path) -> Result<(IntegrityService, Config)> {
    let config = Config::load(dir).context("Failed to load config")?;
    let notifier = build_notifier(dir, &config.notify).context("Failed to set up learning notifier")?;
    let service = IntegrityService::open(dir, &config, notifier);
    Ok((service, config))
}

/// Format an optional score, or "-" when absent.
pub fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.2}", s))
}
