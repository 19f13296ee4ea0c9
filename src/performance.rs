//! Performance store: per-agent task history and aggregate statistics.
//!
//! Every agent owns one [`AgentPerformanceRecord`] holding an append-only list
//! of [`TaskRecord`]s. Aggregates (`average_rating`, `total_tasks`,
//! `error_count`) are maintained on append; the average is always recomputed
//! from the full task list rather than adjusted incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Lowest rating a client or agent may give.
pub const MIN_RATING: f64 = 1.0;
/// Highest rating a client or agent may give.
pub const MAX_RATING: f64 = 5.0;

/// Agents seeded on first run when no snapshot exists.
pub const DEFAULT_AGENTS: &[&str] = &[
    "resume_writer",
    "cover_letter_writer",
    "linkedin_optimizer",
    "ats_optimizer",
    "quality_reviewer",
];

/// Agent id -> performance record.
pub type PerformanceStore = BTreeMap<String, AgentPerformanceRecord>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be between 1 and 5, got {value}")]
    RatingOutOfRange { field: &'static str, value: f64 },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Outcome of a task as judged by the client's rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NoFeedback,
    Excellent,
    Good,
    Acceptable,
    Poor,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::NoFeedback => write!(f, "no_feedback"),
            Outcome::Excellent => write!(f, "excellent"),
            Outcome::Good => write!(f, "good"),
            Outcome::Acceptable => write!(f, "acceptable"),
            Outcome::Poor => write!(f, "poor"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Classify a task outcome from the client's rating.
///
/// A task with feedback text but no numeric rating has nothing to grade and
/// is reported as `NoFeedback` as well.
pub fn classify_outcome(client_rating: Option<f64>) -> Outcome {
    match client_rating {
        None => Outcome::NoFeedback,
        Some(r) if r >= 4.5 => Outcome::Excellent,
        Some(r) if r >= 4.0 => Outcome::Good,
        Some(r) if r >= 3.0 => Outcome::Acceptable,
        Some(r) if r >= 2.0 => Outcome::Poor,
        Some(_) => Outcome::Failed,
    }
}

/// A task submitted for recording, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
    pub agent_id: String,
    /// Generated from the agent id and the current time when absent.
    #[serde(default)]
    pub task_id: Option<String>,
    pub task_type: String,
    #[serde(default)]
    pub client_rating: Option<f64>,
    #[serde(default)]
    pub client_feedback: Option<String>,
    #[serde(default)]
    pub agent_self_rating: Option<f64>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl TaskInput {
    /// Check required fields and rating ranges. Must pass before any state is touched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.agent_id.trim().is_empty() {
            return Err(ValidationError::MissingField("agent_id"));
        }
        if self.task_type.trim().is_empty() {
            return Err(ValidationError::MissingField("task_type"));
        }
        if let Some(id) = &self.task_id {
            if id.trim().is_empty() {
                return Err(ValidationError::MissingField("task_id"));
            }
        }
        if let Some(r) = self.client_rating {
            validate_rating("client_rating", r)?;
        }
        if let Some(r) = self.agent_self_rating {
            validate_rating("agent_self_rating", r)?;
        }
        Ok(())
    }
}

/// Reject NaN and anything outside `[MIN_RATING, MAX_RATING]`.
pub fn validate_rating(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_nan() || !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(ValidationError::RatingOutOfRange { field, value });
    }
    Ok(())
}

static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Derive a task id from the agent id, a timestamp and a process-wide counter.
pub fn generate_task_id(agent_id: &str, at: DateTime<Utc>) -> String {
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(agent_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("task-{}", &digest[..12])
}

/// A single completed task. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_self_rating: Option<f64>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub actual_outcome: Outcome,
    pub improvement_needed: bool,
}

impl TaskRecord {
    /// Build a record from validated input.
    ///
    /// `learning_trigger_rating` is the rating at or below which the task is
    /// flagged as needing improvement.
    pub fn from_input(input: &TaskInput, learning_trigger_rating: f64, now: DateTime<Utc>) -> Self {
        let task_id = input
            .task_id
            .clone()
            .unwrap_or_else(|| generate_task_id(&input.agent_id, now));
        TaskRecord {
            task_id,
            task_type: input.task_type.clone(),
            timestamp: now,
            client_rating: input.client_rating,
            client_feedback: input.client_feedback.clone(),
            agent_self_rating: input.agent_self_rating,
            execution_time_ms: input.execution_time_ms,
            errors: input.errors.clone(),
            actual_outcome: classify_outcome(input.client_rating),
            improvement_needed: input
                .client_rating
                .is_some_and(|r| r <= learning_trigger_rating),
        }
    }

    /// Both the client and the agent rated this task.
    pub fn jointly_rated(&self) -> Option<(f64, f64)> {
        Some((self.client_rating?, self.agent_self_rating?))
    }
}

/// Aggregated task history for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformanceRecord {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub improvement_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl AgentPerformanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task and refresh the aggregates.
    pub fn append(&mut self, task: TaskRecord) {
        self.error_count += task.errors.len() as u32;
        self.last_updated = Some(task.timestamp);
        self.tasks.push(task);
        self.total_tasks = self.tasks.len() as u32;
        self.average_rating = recalculate_average_rating(&self.tasks);
    }

    /// Tasks that carry a client rating, in insertion order.
    pub fn rated_tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.client_rating.is_some())
    }
}

/// Mean client rating over rated tasks, or 0 when none are rated.
pub fn recalculate_average_rating(tasks: &[TaskRecord]) -> f64 {
    let ratings: Vec<f64> = tasks.iter().filter_map(|t| t.client_rating).collect();
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().sum::<f64>() / ratings.len() as f64
}

/// Fresh store pre-populated with empty records for `agents`.
pub fn seed_store(agents: &[String]) -> PerformanceStore {
    agents
        .iter()
        .map(|id| (id.clone(), AgentPerformanceRecord::new()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rating: Option<f64>) -> TaskInput {
        TaskInput {
            agent_id: "worker_A".into(),
            task_id: Some("t1".into()),
            task_type: "resume_generation".into(),
            client_rating: rating,
            ..TaskInput::default()
        }
    }

    #[test]
    fn test_classify_outcome_thresholds() {
        assert_eq!(classify_outcome(None), Outcome::NoFeedback);
        assert_eq!(classify_outcome(Some(5.0)), Outcome::Excellent);
        assert_eq!(classify_outcome(Some(4.5)), Outcome::Excellent);
        assert_eq!(classify_outcome(Some(4.49)), Outcome::Good);
        assert_eq!(classify_outcome(Some(4.0)), Outcome::Good);
        assert_eq!(classify_outcome(Some(3.0)), Outcome::Acceptable);
        assert_eq!(classify_outcome(Some(2.0)), Outcome::Poor);
        assert_eq!(classify_outcome(Some(1.9)), Outcome::Failed);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(input(Some(5.0)).validate().is_ok());
        assert!(input(Some(1.0)).validate().is_ok());
        assert_eq!(
            input(Some(5.5)).validate(),
            Err(ValidationError::RatingOutOfRange {
                field: "client_rating",
                value: 5.5
            })
        );
        assert!(input(Some(0.0)).validate().is_err());
        assert!(input(Some(f64::NAN)).validate().is_err());

        let mut bad_self = input(Some(3.0));
        bad_self.agent_self_rating = Some(6.0);
        assert!(matches!(
            bad_self.validate(),
            Err(ValidationError::RatingOutOfRange {
                field: "agent_self_rating",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut no_agent = input(None);
        no_agent.agent_id = "  ".into();
        assert_eq!(
            no_agent.validate(),
            Err(ValidationError::MissingField("agent_id"))
        );

        let mut no_type = input(None);
        no_type.task_type.clear();
        assert_eq!(
            no_type.validate(),
            Err(ValidationError::MissingField("task_type"))
        );
    }

    #[test]
    fn test_improvement_needed_boundary() {
        let now = Utc::now();
        assert!(TaskRecord::from_input(&input(Some(3.0)), 3.0, now).improvement_needed);
        assert!(!TaskRecord::from_input(&input(Some(3.1)), 3.0, now).improvement_needed);
        assert!(!TaskRecord::from_input(&input(None), 3.0, now).improvement_needed);
    }

    #[test]
    fn test_generated_task_id() {
        let mut i = input(None);
        i.task_id = None;
        let record = TaskRecord::from_input(&i, 3.0, Utc::now());
        assert!(record.task_id.starts_with("task-"));
        assert_eq!(record.task_id.len(), "task-".len() + 12);

        let at = Utc::now();
        assert_ne!(generate_task_id("a", at), generate_task_id("a", at));
    }

    #[test]
    fn test_append_recomputes_average() {
        let now = Utc::now();
        let mut record = AgentPerformanceRecord::new();
        record.append(TaskRecord::from_input(&input(Some(5.0)), 3.0, now));
        record.append(TaskRecord::from_input(&input(None), 3.0, now));
        assert_eq!(record.average_rating, 5.0);
        record.append(TaskRecord::from_input(&input(Some(2.0)), 3.0, now));
        assert_eq!(record.average_rating, 3.5);
        assert_eq!(record.total_tasks, 3);
        assert_eq!(record.tasks.len(), 3);
        assert_eq!(record.rated_tasks().count(), 2);
    }

    #[test]
    fn test_append_counts_errors() {
        let mut i = input(Some(2.0));
        i.errors = vec!["timeout".into(), "bad pdf".into()];
        let mut record = AgentPerformanceRecord::new();
        record.append(TaskRecord::from_input(&i, 3.0, Utc::now()));
        record.append(TaskRecord::from_input(&i, 3.0, Utc::now()));
        assert_eq!(record.error_count, 4);
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        assert_eq!(recalculate_average_rating(&[]), 0.0);
    }

    #[test]
    fn test_seed_store_matches_lazy_creation() {
        let store = seed_store(&["a".to_string()]);
        assert_eq!(store["a"], AgentPerformanceRecord::new());
    }
}
