//! List learning sessions
//!
//! Sessions live in memory only, so this reads them back from the JSONL
//! learning queue when that sink is configured.

use anyhow::{Context, Result};
use std::path::Path;

use agent_integrity::{Config, JsonlNotifier, LearningEvent, NotifySink};

pub fn run(dir: &Path, agent: Option<&str>, json: bool) -> Result<()> {
    let config = Config::load(dir).context("Failed to load config")?;
    if config.notify.sink != NotifySink::Jsonl {
        anyhow::bail!("Learning sessions are only kept on disk with the jsonl notify sink");
    }

    let queue = JsonlNotifier::new(dir.join(&config.notify.jsonl_file));
    let events: Vec<LearningEvent> = queue
        .read_events()
        .context("Failed to read learning queue")?
        .into_iter()
        .filter(|e| agent.is_none_or(|a| e.agent_id == a))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No learning sessions.");
        return Ok(());
    }
    for event in &events {
        let session = &event.session;
        println!(
            "{}  {:<22} task {}",
            session.triggered_at.format("%Y-%m-%d %H:%M:%S"),
            event.agent_id,
            session.trigger_task.task_id
        );
        println!("    reason: {}", session.reason);
        println!("    plan:   {}", session.improvement_plan);
    }
    Ok(())
}
