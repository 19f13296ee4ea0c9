//! Read-only dashboard over a performance/integrity snapshot.
//!
//! Agents are ranked by average rating, lowest first, so the agents that need
//! attention are at the top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::integrity::integrity_status;
use crate::performance::{AgentPerformanceRecord, Outcome};
use crate::persistence::Snapshot;

pub const FULL_STAR: char = '★';
pub const HALF_STAR: char = '◐';
pub const EMPTY_STAR: char = '☆';
pub const NO_RATINGS_LABEL: &str = "No ratings yet";

/// One rated task as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFeedback {
    pub task_id: String,
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

/// Per-agent dashboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub average_rating: f64,
    pub star_display: String,
    pub total_tasks: u32,
    pub error_count: u32,
    pub improvement_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_rating_accuracy: Option<f64>,
    pub overconfidence_count: u32,
    pub underconfidence_count: u32,
    pub total_evaluations: u32,
    pub integrity_status: String,
    pub recent_feedback: Vec<RecentFeedback>,
    pub improvement_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    /// Sorted by `average_rating`, ascending.
    pub agents: Vec<AgentSummary>,
    pub system_integrity: f64,
    pub total_agents: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemIntegrityReport {
    pub system_integrity: f64,
    pub total_agents: usize,
    pub status: String,
}

/// Five-symbol rating bar, or [`NO_RATINGS_LABEL`] for a zero average.
pub fn star_display(average_rating: f64) -> String {
    if average_rating <= 0.0 {
        return NO_RATINGS_LABEL.to_string();
    }
    let rating = average_rating.min(5.0);
    let full = rating.floor() as usize;
    let half = usize::from(full < 5 && rating - rating.floor() >= 0.5);
    let empty = 5 - full - half;

    let mut bar = String::new();
    bar.extend(std::iter::repeat_n(FULL_STAR, full));
    bar.extend(std::iter::repeat_n(HALF_STAR, half));
    bar.extend(std::iter::repeat_n(EMPTY_STAR, empty));
    bar
}

/// Rated tasks among the last `window` tasks, oldest first.
pub fn recent_feedback(record: &AgentPerformanceRecord, window: usize) -> Vec<RecentFeedback> {
    let start = record.tasks.len().saturating_sub(window);
    record.tasks[start..]
        .iter()
        .filter_map(|t| {
            Some(RecentFeedback {
                task_id: t.task_id.clone(),
                rating: t.client_rating?,
                feedback: t.client_feedback.clone(),
                outcome: t.actual_outcome,
                timestamp: t.timestamp,
            })
        })
        .collect()
}

/// Every agent known to either store.
fn known_agents(snapshot: &Snapshot) -> BTreeSet<&str> {
    snapshot
        .performance
        .keys()
        .chain(snapshot.integrity.keys())
        .map(String::as_str)
        .collect()
}

/// Mean truth score over every agent in either store.
///
/// Agents never scored count as 1.0. An empty store is fully honest.
pub fn system_integrity(snapshot: &Snapshot) -> f64 {
    let agents = known_agents(snapshot);
    if agents.is_empty() {
        return 1.0;
    }
    let total: f64 = agents
        .iter()
        .map(|id| snapshot.integrity.get(*id).map_or(1.0, |r| r.truth_score))
        .sum();
    total / agents.len() as f64
}

pub fn system_integrity_report(snapshot: &Snapshot) -> SystemIntegrityReport {
    let score = system_integrity(snapshot);
    SystemIntegrityReport {
        system_integrity: score,
        total_agents: known_agents(snapshot).len(),
        status: integrity_status(Some(score)).to_string(),
    }
}

fn summarize(agent_id: &str, record: &AgentPerformanceRecord, snapshot: &Snapshot, scoring: &ScoringConfig) -> AgentSummary {
    let integrity = snapshot.integrity.get(agent_id);
    AgentSummary {
        agent_id: agent_id.to_string(),
        average_rating: record.average_rating,
        star_display: star_display(record.average_rating),
        total_tasks: record.total_tasks,
        error_count: record.error_count,
        improvement_count: record.improvement_count,
        truth_score: integrity.map(|i| i.truth_score),
        self_rating_accuracy: integrity.map(|i| i.self_rating_accuracy),
        overconfidence_count: integrity.map_or(0, |i| i.overconfidence_count),
        underconfidence_count: integrity.map_or(0, |i| i.underconfidence_count),
        total_evaluations: integrity.map_or(0, |i| i.total_evaluations),
        integrity_status: integrity_status(integrity.map(|i| i.truth_score)).to_string(),
        recent_feedback: recent_feedback(record, scoring.recent_feedback_window),
        improvement_needed: record.average_rating < scoring.min_rating_for_good,
        last_updated: record.last_updated,
    }
}

/// Build the dashboard from a point-in-time snapshot.
pub fn build_dashboard(snapshot: &Snapshot, scoring: &ScoringConfig, now: DateTime<Utc>) -> DashboardView {
    let mut agents: Vec<AgentSummary> = snapshot
        .performance
        .iter()
        .map(|(id, record)| summarize(id, record, snapshot, scoring))
        .collect();
    agents.sort_by(|a, b| {
        a.average_rating
            .partial_cmp(&b.average_rating)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });

    DashboardView {
        total_agents: agents.len(),
        agents,
        system_integrity: system_integrity(snapshot),
        last_updated: now,
    }
}
