//! Recording service: the single entry point that mutates agent state.
//!
//! `record_task_performance` runs validation, append, integrity scoring,
//! learning triggers and persistence while holding a lock scoped to the
//! target agent. Different agents are recorded in parallel.
//!
//! Reads go through a published snapshot that each recording refreshes with
//! the agent's complete records before it saves, so readers never see a
//! half-applied task. Snapshots are queued for the writer while `published`
//! is read-locked, so queue order matches publish order. Waiting for the
//! write happens after the agent lock is released.
//!
//! Lock order: agent slot, then `published`, then the gateway's writer
//! state. `slots` is only held long enough to fetch or create a slot.

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ScoringConfig};
use crate::dashboard::{self, DashboardView, SystemIntegrityReport};
use crate::integrity::AgentIntegrityRecord;
use crate::learning::{self, LearningSession};
use crate::notify::LearningNotifier;
use crate::performance::{AgentPerformanceRecord, TaskInput, TaskRecord, ValidationError};
use crate::persistence::{FileSnapshotStore, PersistenceGateway, Snapshot, SnapshotStore};

/// Caller-visible failure. Persistence and notification problems are logged
/// instead of returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Working state for one agent.
#[derive(Debug, Default)]
struct AgentState {
    performance: AgentPerformanceRecord,
    integrity: Option<AgentIntegrityRecord>,
    /// Not persisted; only `improvement_count` survives a restart.
    sessions: Vec<LearningSession>,
}

impl AgentState {
    fn fresh() -> Self {
        AgentState {
            performance: AgentPerformanceRecord::new(),
            integrity: Some(AgentIntegrityRecord::new()),
            sessions: Vec::new(),
        }
    }
}

type Slot = Arc<Mutex<AgentState>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct IntegrityService {
    scoring: ScoringConfig,
    slots: Mutex<HashMap<String, Slot>>,
    published: RwLock<Snapshot>,
    gateway: PersistenceGateway,
    notifier: Arc<dyn LearningNotifier>,
}

impl IntegrityService {
    /// Build a service, loading state through `gateway`.
    pub fn new(scoring: ScoringConfig, gateway: PersistenceGateway, notifier: Arc<dyn LearningNotifier>) -> Self {
        let snapshot = gateway.load();

        let mut slots: HashMap<String, Slot> = HashMap::new();
        for (id, record) in &snapshot.performance {
            let state = AgentState {
                performance: record.clone(),
                integrity: snapshot.integrity.get(id).cloned(),
                sessions: Vec::new(),
            };
            slots.insert(id.clone(), Arc::new(Mutex::new(state)));
        }
        for (id, record) in &snapshot.integrity {
            slots.entry(id.clone()).or_insert_with(|| {
                Arc::new(Mutex::new(AgentState {
                    performance: AgentPerformanceRecord::new(),
                    integrity: Some(record.clone()),
                    sessions: Vec::new(),
                }))
            });
        }

        IntegrityService {
            scoring,
            slots: Mutex::new(slots),
            published: RwLock::new(snapshot),
            gateway,
            notifier,
        }
    }

    /// Build a service backed by a custom snapshot medium.
    pub fn with_store(config: &Config, store: Arc<dyn SnapshotStore>, notifier: Arc<dyn LearningNotifier>) -> Self {
        let gateway = PersistenceGateway::new(
            store,
            Duration::from_millis(config.storage.save_timeout_ms),
            config.agents.defaults.clone(),
        );
        Self::new(config.scoring.clone(), gateway, notifier)
    }

    /// Build a service whose snapshot lives under `dir` as configured.
    pub fn open(dir: &Path, config: &Config, notifier: Arc<dyn LearningNotifier>) -> Self {
        let store = FileSnapshotStore::new(config.storage.snapshot_path(dir))
            .with_lock_timeout(Duration::from_millis(config.storage.save_timeout_ms));
        Self::with_store(config, Arc::new(store), notifier)
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    fn slot(&self, agent_id: &str) -> Slot {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(agent_id.to_string()).or_insert_with(|| {
            debug!(agent_id, "creating records for new agent");
            Arc::new(Mutex::new(AgentState::fresh()))
        }))
    }

    fn existing_slot(&self, agent_id: &str) -> Option<Slot> {
        lock(&self.slots).get(agent_id).cloned()
    }

    /// Record a completed task and return the stored record.
    ///
    /// Fails only on invalid input, before anything is changed.
    pub fn record_task_performance(&self, input: TaskInput) -> Result<TaskRecord, RecordError> {
        input.validate()?;

        let agent_id = input.agent_id.as_str();
        let slot = self.slot(agent_id);
        let mut state = lock(&slot);

        let now = Utc::now();
        let task = TaskRecord::from_input(&input, self.scoring.learning_trigger_rating, now);
        state.performance.append(task.clone());
        debug!(
            agent_id,
            task_id = %task.task_id,
            outcome = %task.actual_outcome,
            average_rating = state.performance.average_rating,
            "task recorded"
        );

        if let Some((client_rating, self_rating)) = task.jointly_rated() {
            let integrity = state.integrity.get_or_insert_with(AgentIntegrityRecord::new);
            integrity.update(client_rating, self_rating, self.scoring.truth_score_threshold);
            debug!(
                agent_id,
                truth_score = integrity.truth_score,
                accuracy = integrity.self_rating_accuracy,
                "integrity updated"
            );
        }

        if let Some(session) = learning::maybe_trigger(&task, self.scoring.learning_trigger_rating, now) {
            state.performance.improvement_count += 1;
            info!(
                agent_id,
                task_id = %task.task_id,
                reason = %session.reason,
                "learning session triggered"
            );
            if let Err(e) = self.notifier.notify_learning(agent_id, &session) {
                warn!(agent_id, error = %e, "failed to deliver learning notification");
            }
            state.sessions.push(session);
        }

        self.publish(agent_id, &state);
        drop(state);
        self.persist();

        Ok(task)
    }

    fn publish(&self, agent_id: &str, state: &AgentState) {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        published
            .performance
            .insert(agent_id.to_string(), state.performance.clone());
        if let Some(integrity) = &state.integrity {
            published
                .integrity
                .insert(agent_id.to_string(), integrity.clone());
        }
    }

    fn persist(&self) {
        let submitted = {
            let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
            self.gateway.submit(&published)
        };
        if let Err(e) = submitted.and_then(|generation| self.gateway.wait_for(generation)) {
            warn!(error = %e, "failed to save performance snapshot");
        }
    }

    /// Consistent copy of every agent's persisted records.
    pub fn snapshot(&self) -> Snapshot {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ranked view of all agents, worst average rating first.
    pub fn get_performance_dashboard(&self) -> DashboardView {
        dashboard::build_dashboard(&self.snapshot(), &self.scoring, Utc::now())
    }

    pub fn get_system_integrity(&self) -> SystemIntegrityReport {
        dashboard::system_integrity_report(&self.snapshot())
    }

    /// Learning sessions raised for `agent_id` since this service started.
    pub fn learning_sessions(&self, agent_id: &str) -> Vec<LearningSession> {
        self.existing_slot(agent_id)
            .map(|slot| lock(&slot).sessions.clone())
            .unwrap_or_default()
    }

    pub fn performance(&self, agent_id: &str) -> Option<AgentPerformanceRecord> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .performance
            .get(agent_id)
            .cloned()
    }

    pub fn integrity(&self, agent_id: &str) -> Option<AgentIntegrityRecord> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .integrity
            .get(agent_id)
            .cloned()
    }

    /// Known agent ids, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.slots).keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::persistence::PersistenceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    impl LearningNotifier for CountingNotifier {
        fn notify_learning(&self, _agent_id: &str, _session: &LearningSession) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenStore;

    impl SnapshotStore for BrokenStore {
        fn read_all(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
            Err(PersistenceError::Lock("disk on fire".into()))
        }
        fn write_all(&self, _bytes: &[u8]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Lock("disk on fire".into()))
        }
    }

    fn task(agent: &str, rating: Option<f64>, self_rating: Option<f64>) -> TaskInput {
        TaskInput {
            agent_id: agent.into(),
            task_id: None,
            task_type: "resume_generation".into(),
            client_rating: rating,
            agent_self_rating: self_rating,
            execution_time_ms: 900,
            ..TaskInput::default()
        }
    }

    #[test]
    fn test_open_seeds_default_agents() {
        let tmp = TempDir::new().unwrap();
        let service = IntegrityService::open(tmp.path(), &Config::default(), Arc::new(CountingNotifier::default()));
        assert_eq!(service.agent_ids().len(), Config::default().agents.defaults.len());
        assert_eq!(service.integrity("resume_writer").unwrap().truth_score, 1.0);
    }

    #[test]
    fn test_invalid_rating_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let service = IntegrityService::open(tmp.path(), &Config::default(), Arc::new(CountingNotifier::default()));
        let before = service.snapshot();

        let err = service
            .record_task_performance(task("ghost", Some(7.0), None))
            .unwrap_err();
        assert!(matches!(err, RecordError::Validation(_)));
        assert_eq!(service.snapshot(), before);
        assert!(!service.agent_ids().contains(&"ghost".to_string()));
        assert!(!tmp.path().join("performance.json").exists());
    }

    #[test]
    fn test_learning_session_counts_and_notifies() {
        let tmp = TempDir::new().unwrap();
        let notifier = Arc::new(CountingNotifier::default());
        let service = IntegrityService::open(tmp.path(), &Config::default(), notifier.clone());

        service.record_task_performance(task("a", Some(3.0), None)).unwrap();
        service.record_task_performance(task("a", Some(3.1), None)).unwrap();

        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
        assert_eq!(service.learning_sessions("a").len(), 1);
        assert_eq!(service.performance("a").unwrap().improvement_count, 1);
        assert!(service.learning_sessions("nobody").is_empty());
    }

    #[test]
    fn test_broken_storage_does_not_fail_recording() {
        let service = IntegrityService::with_store(
            &Config::default(),
            Arc::new(BrokenStore),
            Arc::new(CountingNotifier::default()),
        );
        // load fell back to defaults
        assert!(service.performance("quality_reviewer").is_some());

        let record = service
            .record_task_performance(task("a", Some(4.0), Some(4.0)))
            .unwrap();
        assert_eq!(record.client_rating, Some(4.0));
        assert_eq!(service.performance("a").unwrap().total_tasks, 1);
    }

    #[test]
    fn test_unscored_loaded_agent_gains_integrity_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("performance.json");
        let mut snapshot = Snapshot::default();
        snapshot
            .performance
            .insert("legacy".into(), AgentPerformanceRecord::new());
        std::fs::write(&path, snapshot.to_bytes().unwrap()).unwrap();

        let service = IntegrityService::open(tmp.path(), &Config::default(), Arc::new(CountingNotifier::default()));
        assert!(service.integrity("legacy").is_none());
        service
            .record_task_performance(task("legacy", Some(2.0), Some(5.0)))
            .unwrap();
        assert_eq!(service.integrity("legacy").unwrap().overconfidence_count, 1);
    }
}
