//! Configuration for the integrity tracker
//!
//! Configuration is stored in `<dir>/config.toml` and controls scoring
//! thresholds, the default agent set, snapshot storage, learning
//! notifications, and the synthetic feedback scheduler.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::performance::DEFAULT_AGENTS;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Scoring thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Agents seeded on first run
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Snapshot storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Learning notification sink
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Synthetic feedback / integrity check timers
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Thresholds used when scoring tasks and building the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    /// Self-rating divergence above which the truth score is penalized
    #[serde(default = "default_truth_score_threshold")]
    pub truth_score_threshold: f64,

    /// Client rating at or below which a learning session is triggered
    #[serde(default = "default_learning_trigger_rating")]
    pub learning_trigger_rating: f64,

    /// Average rating below which the dashboard flags an agent for improvement
    #[serde(default = "default_min_rating_for_good")]
    pub min_rating_for_good: f64,

    /// Number of most recent tasks inspected for the dashboard feedback list
    #[serde(default = "default_recent_feedback_window")]
    pub recent_feedback_window: usize,
}

fn default_truth_score_threshold() -> f64 {
    0.2
}

fn default_learning_trigger_rating() -> f64 {
    3.0
}

fn default_min_rating_for_good() -> f64 {
    4.0
}

fn default_recent_feedback_window() -> usize {
    10
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            truth_score_threshold: default_truth_score_threshold(),
            learning_trigger_rating: default_learning_trigger_rating(),
            min_rating_for_good: default_min_rating_for_good(),
            recent_feedback_window: default_recent_feedback_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Agent ids pre-populated when no snapshot exists
    #[serde(default = "default_agent_ids")]
    pub defaults: Vec<String>,
}

fn default_agent_ids() -> Vec<String> {
    DEFAULT_AGENTS.iter().map(|s| s.to_string()).collect()
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            defaults: default_agent_ids(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Snapshot file, relative to the data directory unless absolute (`~` is expanded)
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,

    /// Upper bound on a single snapshot write, in milliseconds
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: u64,
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("performance.json")
}

fn default_save_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
            save_timeout_ms: default_save_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Resolve the snapshot path against the data directory.
    pub fn snapshot_path(&self, dir: &Path) -> PathBuf {
        let path = expand_tilde(&self.snapshot_file);
        if path.is_absolute() {
            path
        } else {
            dir.join(path)
        }
    }
}

/// Where learning sessions are delivered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifySink {
    Log,
    #[default]
    Jsonl,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifyConfig {
    #[serde(default)]
    pub sink: NotifySink,

    /// File written by the `jsonl` sink, relative to the data directory
    #[serde(default = "default_jsonl_file")]
    pub jsonl_file: PathBuf,

    /// Endpoint for the `webhook` sink
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub webhook_url: String,

    /// Per-request timeout for the `webhook` sink, in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

fn default_jsonl_file() -> PathBuf {
    PathBuf::from("learning.jsonl")
}

fn default_webhook_timeout_ms() -> u64 {
    3000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sink: NotifySink::default(),
            jsonl_file: default_jsonl_file(),
            webhook_url: String::new(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Seconds between synthetic feedback recordings
    #[serde(default = "default_synthetic_interval")]
    pub synthetic_interval_secs: u64,

    /// Seconds between system integrity log lines
    #[serde(default = "default_integrity_check_interval")]
    pub integrity_check_interval_secs: u64,
}

fn default_synthetic_interval() -> u64 {
    30
}

fn default_integrity_check_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            synthetic_interval_secs: default_synthetic_interval(),
            integrity_check_interval_secs: default_integrity_check_interval(),
        }
    }
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

impl Config {
    /// Load `<dir>/config.toml`, or defaults when there is no such file.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Write `<dir>/config.toml`, creating `dir` if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let config_path = dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write {}", config_path.display()))
    }

    /// Write a default config unless one exists. Returns whether a file was created.
    pub fn init(dir: &Path) -> Result<bool> {
        if dir.join("config.toml").exists() {
            return Ok(false);
        }
        Self::default().save(dir)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scoring.truth_score_threshold, 0.2);
        assert_eq!(config.scoring.learning_trigger_rating, 3.0);
        assert_eq!(config.scoring.min_rating_for_good, 4.0);
        assert_eq!(config.scoring.recent_feedback_window, 10);
        assert_eq!(config.agents.defaults.len(), DEFAULT_AGENTS.len());
        assert_eq!(config.notify.sink, NotifySink::Jsonl);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.scoring.learning_trigger_rating = 2.5;
        config.agents.defaults = vec!["solo".to_string()];
        config.save(temp_dir.path()).unwrap();

        let loaded = Config::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.scoring.learning_trigger_rating, 2.5);
        assert_eq!(loaded.agents.defaults, vec!["solo".to_string()]);
    }

    #[test]
    fn test_init_config() {
        let temp_dir = TempDir::new().unwrap();

        // First init should create file
        let created = Config::init(temp_dir.path()).unwrap();
        assert!(created);

        // Second init should not overwrite
        let created = Config::init(temp_dir.path()).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_load_reports_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("config.toml"), "[scoring\n").unwrap();

        let err = Config::load(temp_dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[scoring]
truth_score_threshold = 0.5

[notify]
sink = "webhook"
webhook_url = "http://localhost:8080/learn"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scoring.truth_score_threshold, 0.5);
        assert_eq!(config.scoring.learning_trigger_rating, 3.0);
        assert_eq!(config.notify.sink, NotifySink::Webhook);
        assert_eq!(config.notify.webhook_url, "http://localhost:8080/learn");
        assert_eq!(config.storage.save_timeout_ms, 5000);
    }

    #[test]
    fn test_snapshot_path_resolution() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.snapshot_path(Path::new("/data")),
            PathBuf::from("/data/performance.json")
        );

        let absolute = StorageConfig {
            snapshot_file: PathBuf::from("/var/lib/integrity.json"),
            ..StorageConfig::default()
        };
        assert_eq!(
            absolute.snapshot_path(Path::new("/data")),
            PathBuf::from("/var/lib/integrity.json")
        );
    }
}
