pub mod config;
pub mod dashboard;
pub mod integrity;
pub mod learning;
pub mod notify;
pub mod performance;
pub mod persistence;
pub mod scheduler;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod test_helpers;

pub use config::{Config, NotifyConfig, NotifySink, ScoringConfig};
pub use dashboard::{AgentSummary, DashboardView, RecentFeedback, SystemIntegrityReport};
pub use integrity::{AgentIntegrityRecord, IntegrityStore, integrity_status};
pub use learning::{LearningSession, SessionStatus};
pub use notify::{JsonlNotifier, LearningEvent, LearningNotifier, LogNotifier, NotifyError, build_notifier};
#[cfg(feature = "webhook")]
pub use notify::WebhookNotifier;
pub use performance::{
    AgentPerformanceRecord, Outcome, PerformanceStore, TaskInput, TaskRecord, ValidationError,
};
pub use persistence::{FileSnapshotStore, PersistenceError, PersistenceGateway, Snapshot, SnapshotStore};
pub use service::{IntegrityService, RecordError};
