//! Integrity scoring: how closely an agent's self-rating tracks the client's.
//!
//! The truth score is re-derived from the most recent jointly-rated task on
//! every update. It is not smoothed over history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gap between self-rating and client rating beyond which the agent counts as
/// over- or under-confident.
pub const CONFIDENCE_MARGIN: f64 = 0.5;

/// Penalty applied to the truth score per rating point of divergence.
pub const PENALTY_PER_POINT: f64 = 0.1;

/// Agent id -> integrity record.
pub type IntegrityStore = BTreeMap<String, AgentIntegrityRecord>;

/// Honesty metrics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIntegrityRecord {
    pub truth_score: f64,
    pub self_rating_accuracy: f64,
    #[serde(default)]
    pub overconfidence_count: u32,
    #[serde(default)]
    pub underconfidence_count: u32,
    #[serde(default)]
    pub total_evaluations: u32,
}

impl Default for AgentIntegrityRecord {
    /// New agents start with the benefit of the doubt.
    fn default() -> Self {
        AgentIntegrityRecord {
            truth_score: 1.0,
            self_rating_accuracy: 1.0,
            overconfidence_count: 0,
            underconfidence_count: 0,
            total_evaluations: 0,
        }
    }
}

impl AgentIntegrityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one jointly-rated task into the record.
    ///
    /// `truth_score_threshold` is the divergence at or below which no penalty
    /// is applied.
    pub fn update(&mut self, client_rating: f64, agent_self_rating: f64, truth_score_threshold: f64) {
        let difference = (client_rating - agent_self_rating).abs();

        self.total_evaluations += 1;
        if agent_self_rating > client_rating + CONFIDENCE_MARGIN {
            self.overconfidence_count += 1;
        }
        if agent_self_rating < client_rating - CONFIDENCE_MARGIN {
            self.underconfidence_count += 1;
        }

        self.self_rating_accuracy = 1.0 - (difference / 5.0).min(1.0);

        let accuracy_penalty = if difference > truth_score_threshold {
            difference * PENALTY_PER_POINT
        } else {
            0.0
        };
        self.truth_score = (1.0 - accuracy_penalty).clamp(0.0, 1.0);
    }
}

/// Apply an evaluation to `agent_id`, creating its record if unseen.
pub fn update_integrity(
    store: &mut IntegrityStore,
    agent_id: &str,
    client_rating: f64,
    agent_self_rating: f64,
    truth_score_threshold: f64,
) -> AgentIntegrityRecord {
    let record = store.entry(agent_id.to_string()).or_default();
    record.update(client_rating, agent_self_rating, truth_score_threshold);
    record.clone()
}

/// Human label for a truth score. `None` means the agent was never scored.
pub fn integrity_status(truth_score: Option<f64>) -> &'static str {
    match truth_score {
        None => "Unknown",
        Some(s) if s >= 0.9 => "Honest",
        Some(s) if s >= 0.7 => "Mostly Honest",
        Some(s) if s >= 0.5 => "Questionable",
        Some(_) => "Low Integrity",
    }
}

/// Fresh store pre-populated with optimistic records for `agents`.
pub fn seed_store(agents: &[String]) -> IntegrityStore {
    agents
        .iter()
        .map(|id| (id.clone(), AgentIntegrityRecord::new()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_exact_agreement_keeps_full_score() {
        let mut r = AgentIntegrityRecord::new();
        r.update(5.0, 5.0, 0.2);
        assert_eq!(r.truth_score, 1.0);
        assert_eq!(r.self_rating_accuracy, 1.0);
        assert_eq!(r.total_evaluations, 1);
        assert_eq!(r.overconfidence_count, 0);
        assert_eq!(r.underconfidence_count, 0);
    }

    #[test]
    fn test_overconfident_agent_is_penalized() {
        let mut r = AgentIntegrityRecord::new();
        r.update(2.0, 5.0, 0.2);
        assert!(approx(r.truth_score, 0.7));
        assert!(approx(r.self_rating_accuracy, 0.4));
        assert_eq!(r.overconfidence_count, 1);
        assert_eq!(r.underconfidence_count, 0);
    }

    #[test]
    fn test_underconfident_agent_is_counted() {
        let mut r = AgentIntegrityRecord::new();
        r.update(5.0, 3.0, 0.2);
        assert_eq!(r.underconfidence_count, 1);
        assert!(approx(r.truth_score, 0.8));
    }

    #[test]
    fn test_small_divergence_within_threshold() {
        let mut r = AgentIntegrityRecord::new();
        r.update(4.0, 4.1, 0.2);
        assert_eq!(r.truth_score, 1.0);
        assert_eq!(r.overconfidence_count, 0);
    }

    #[test]
    fn test_margin_is_exclusive() {
        let mut r = AgentIntegrityRecord::new();
        r.update(4.0, 4.5, 0.2);
        assert_eq!(r.overconfidence_count, 0);
        assert!(approx(r.truth_score, 0.95));
    }

    #[test]
    fn test_score_reflects_latest_evaluation_only() {
        let mut r = AgentIntegrityRecord::new();
        r.update(1.0, 5.0, 0.2);
        assert!(approx(r.truth_score, 0.6));
        r.update(4.0, 4.0, 0.2);
        assert_eq!(r.truth_score, 1.0);
        assert_eq!(r.total_evaluations, 2);
        assert_eq!(r.overconfidence_count, 1);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        // threshold 0 with maximal divergence still cannot go negative
        let mut r = AgentIntegrityRecord::new();
        r.update(1.0, 5.0, 0.0);
        assert!(r.truth_score >= 0.0 && r.truth_score <= 1.0);
        assert!(r.self_rating_accuracy >= 0.0 && r.self_rating_accuracy <= 1.0);
    }

    #[test]
    fn test_update_integrity_creates_record() {
        let mut store = IntegrityStore::new();
        let r = update_integrity(&mut store, "new_agent", 3.0, 3.0, 0.2);
        assert_eq!(r.total_evaluations, 1);
        assert!(store.contains_key("new_agent"));
    }

    #[test]
    fn test_integrity_status_tiers() {
        assert_eq!(integrity_status(None), "Unknown");
        assert_eq!(integrity_status(Some(1.0)), "Honest");
        assert_eq!(integrity_status(Some(0.9)), "Honest");
        assert_eq!(integrity_status(Some(0.7)), "Mostly Honest");
        assert_eq!(integrity_status(Some(0.5)), "Questionable");
        assert_eq!(integrity_status(Some(0.49)), "Low Integrity");
    }
}
