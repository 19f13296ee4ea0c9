use crate::config::Config;
use crate::learning::LearningSession;
use crate::notify::{LearningEvent, LearningNotifier, NotifyError};
use crate::performance::TaskInput;
use crate::service::IntegrityService;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Create a task for `agent_id` with the given ratings and all other fields defaulted.
pub fn make_task(agent_id: &str, client_rating: Option<f64>, agent_self_rating: Option<f64>) -> TaskInput {
    TaskInput {
        agent_id: agent_id.to_string(),
        task_id: None,
        task_type: "resume_generation".to_string(),
        client_rating,
        agent_self_rating,
        execution_time_ms: 1000,
        ..TaskInput::default()
    }
}

/// Create a task carrying client feedback text.
pub fn make_task_with_feedback(
    agent_id: &str,
    client_rating: f64,
    agent_self_rating: Option<f64>,
    feedback: &str,
) -> TaskInput {
    TaskInput {
        client_feedback: Some(feedback.to_string()),
        ..make_task(agent_id, Some(client_rating), agent_self_rating)
    }
}

/// Notifier that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LearningEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<LearningEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl LearningNotifier for RecordingNotifier {
    fn notify_learning(&self, agent_id: &str, session: &LearningSession) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(LearningEvent {
            agent_id: agent_id.to_string(),
            session: session.clone(),
        });
        Ok(())
    }
}

/// Notifier whose learner is always unreachable.
#[derive(Debug, Default)]
pub struct FailingNotifier;

impl LearningNotifier for FailingNotifier {
    fn notify_learning(&self, _agent_id: &str, _session: &LearningSession) -> Result<(), NotifyError> {
        Err(NotifyError::Http("learner unreachable".to_string()))
    }
}

/// Open a service under `dir` with default config and a recording notifier.
pub fn open_service(dir: &Path) -> (IntegrityService, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = IntegrityService::open(dir, &Config::default(), notifier.clone());
    (service, notifier)
}
