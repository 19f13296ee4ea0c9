use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use agent_integrity::scheduler;

/// Run the synthetic feedback and integrity check timers.
pub fn run(dir: &Path, ticks: Option<u64>) -> Result<()> {
    let (service, config) = super::open_service(dir)?;
    let service = Arc::new(service);
    let agents = config.agents.defaults.clone();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    rt.block_on(scheduler::run(service, &config.scheduler, agents, ticks))
}
