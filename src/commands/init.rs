use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use agent_integrity::{Config, FileSnapshotStore, PersistenceGateway, SnapshotStore};
use std::sync::Arc;
use std::time::Duration;

/// Default content for `<dir>/.gitignore`
const GITIGNORE_CONTENT: &str = r#"# Integrity tracker gitignore
# Snapshot and learning queue are runtime state
performance.json
learning.jsonl
.*.lock
"#;

pub fn run(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).context("Failed to create data directory")?;

    let created = Config::init(dir)?;
    let config = Config::load(dir)?;

    let gitignore_path = dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, GITIGNORE_CONTENT).context("Failed to create .gitignore")?;
    }

    let snapshot_path = config.storage.snapshot_path(dir);
    let timeout = Duration::from_millis(config.storage.save_timeout_ms);
    let store = FileSnapshotStore::new(&snapshot_path).with_lock_timeout(timeout);
    if store.read_all()?.is_none() {
        let gateway = PersistenceGateway::new(Arc::new(store), timeout, config.agents.defaults.clone());
        let snapshot = gateway.load();
        gateway
            .save(&snapshot)
            .context("Failed to write initial snapshot")?;
        println!(
            "Seeded {} agents into {}",
            snapshot.performance.len(),
            snapshot_path.display()
        );
    }

    if created {
        println!("Initialized integrity tracker at {}", dir.display());
    } else {
        println!("Config already present at {}", dir.join("config.toml").display());
    }
    Ok(())
}
