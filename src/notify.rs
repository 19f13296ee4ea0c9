//! Learning notification sinks.
//!
//! Every learning session is handed to a [`LearningNotifier`]. Delivery is
//! best-effort: callers log failures and carry on.
//!
//! Sinks:
//! - `log`: emits the session through `tracing`
//! - `jsonl`: appends one JSON object per session to a file the learner tails
//! - `webhook`: POSTs the session from a background worker thread

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{NotifyConfig, NotifySink};
use crate::learning::LearningSession;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("notification worker has shut down")]
    Disconnected,
    #[error("{0}")]
    Config(String),
}

/// Payload delivered to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub agent_id: String,
    pub session: LearningSession,
}

/// Receives learning sessions as they are triggered.
pub trait LearningNotifier: Send + Sync {
    fn notify_learning(&self, agent_id: &str, session: &LearningSession) -> Result<(), NotifyError>;
}

/// Writes sessions to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LearningNotifier for LogNotifier {
    fn notify_learning(&self, agent_id: &str, session: &LearningSession) -> Result<(), NotifyError> {
        info!(
            agent_id,
            task_id = %session.trigger_task.task_id,
            reason = %session.reason,
            plan = %session.improvement_plan,
            "learning session triggered"
        );
        Ok(())
    }
}

/// Appends each session as a JSON line.
#[derive(Debug, Clone)]
pub struct JsonlNotifier {
    path: PathBuf,
}

impl JsonlNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlNotifier { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every event written so far.
    pub fn read_events(&self) -> Result<Vec<LearningEvent>, NotifyError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(NotifyError::from))
            .collect()
    }
}

impl LearningNotifier for JsonlNotifier {
    fn notify_learning(&self, agent_id: &str, session: &LearningSession) -> Result<(), NotifyError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let event = LearningEvent {
            agent_id: agent_id.to_string(),
            session: session.clone(),
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;

#[cfg(feature = "webhook")]
mod webhook {
    use super::{LearningEvent, LearningNotifier, NotifyError};
    use crate::learning::LearningSession;
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Sender};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tracing::{debug, warn};

    /// POSTs sessions to an HTTP endpoint from a dedicated worker thread.
    ///
    /// `notify_learning` only queues the event; delivery errors surface in the
    /// log.
    pub struct WebhookNotifier {
        sender: Mutex<Option<Sender<LearningEvent>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
    }

    impl WebhookNotifier {
        pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
            let url = url.into();
            if url.trim().is_empty() {
                return Err(NotifyError::Config("webhook_url is not set".to_string()));
            }
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| NotifyError::Http(e.to_string()))?;

            let (tx, rx) = mpsc::channel::<LearningEvent>();
            let worker = thread::Builder::new()
                .name("learning-webhook".to_string())
                .spawn(move || {
                    for event in rx {
                        match client.post(&url).json(&event).send() {
                            Ok(resp) if resp.status().is_success() => {
                                debug!(agent_id = %event.agent_id, "learning webhook delivered");
                            }
                            Ok(resp) => {
                                warn!(
                                    agent_id = %event.agent_id,
                                    status = %resp.status(),
                                    "learning webhook rejected"
                                );
                            }
                            Err(e) => {
                                warn!(agent_id = %event.agent_id, error = %e, "learning webhook failed");
                            }
                        }
                    }
                })?;

            Ok(WebhookNotifier {
                sender: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
            })
        }

        /// Stop accepting events and wait for queued ones to be attempted.
        pub fn shutdown(&self) {
            self.sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = handle.join();
            }
        }
    }

    impl LearningNotifier for WebhookNotifier {
        fn notify_learning(&self, agent_id: &str, session: &LearningSession) -> Result<(), NotifyError> {
            let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
            let sender = guard.as_ref().ok_or(NotifyError::Disconnected)?;
            sender
                .send(LearningEvent {
                    agent_id: agent_id.to_string(),
                    session: session.clone(),
                })
                .map_err(|_| NotifyError::Disconnected)
        }
    }

    impl Drop for WebhookNotifier {
        fn drop(&mut self) {
            self.shutdown();
        }
    }
}

/// Build the sink selected in config. Relative paths resolve against `dir`.
pub fn build_notifier(dir: &Path, config: &NotifyConfig) -> Result<Arc<dyn LearningNotifier>, NotifyError> {
    match config.sink {
        NotifySink::Log => Ok(Arc::new(LogNotifier)),
        NotifySink::Jsonl => Ok(Arc::new(JsonlNotifier::new(dir.join(&config.jsonl_file)))),
        #[cfg(feature = "webhook")]
        NotifySink::Webhook => Ok(Arc::new(WebhookNotifier::new(
            config.webhook_url.clone(),
            std::time::Duration::from_millis(config.webhook_timeout_ms),
        )?)),
        #[cfg(not(feature = "webhook"))]
        NotifySink::Webhook => Err(NotifyError::Config(
            "webhook sink requires the `webhook` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::SessionStatus;
    use crate::performance::{Outcome, TaskRecord};
    use chrono::Utc;
    use tempfile::TempDir;

    fn session() -> LearningSession {
        LearningSession {
            triggered_at: Utc::now(),
            trigger_task: TaskRecord {
                task_id: "t9".into(),
                task_type: "cover_letter".into(),
                timestamp: Utc::now(),
                client_rating: Some(2.0),
                client_feedback: None,
                agent_self_rating: None,
                execution_time_ms: 0,
                errors: vec![],
                actual_outcome: Outcome::Poor,
                improvement_needed: true,
            },
            reason: "Severely low rating, needs comprehensive review".into(),
            improvement_plan: "Open with a stronger hook".into(),
            status: SessionStatus::Active,
        }
    }

    #[test]
    fn test_jsonl_appends_events() {
        let tmp = TempDir::new().unwrap();
        let notifier = JsonlNotifier::new(tmp.path().join("nested").join("learning.jsonl"));
        notifier.notify_learning("a", &session()).unwrap();
        notifier.notify_learning("b", &session()).unwrap();

        let events = notifier.read_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].agent_id, "a");
        assert_eq!(events[1].agent_id, "b");
        assert_eq!(events[1].session.trigger_task.task_id, "t9");
    }

    #[test]
    fn test_jsonl_read_missing_file() {
        let tmp = TempDir::new().unwrap();
        let notifier = JsonlNotifier::new(tmp.path().join("none.jsonl"));
        assert!(notifier.read_events().unwrap().is_empty());
    }

    #[test]
    fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify_learning("a", &session()).is_ok());
    }

    #[test]
    fn test_build_notifier_jsonl_relative_to_dir() {
        let tmp = TempDir::new().unwrap();
        let config = NotifyConfig::default();
        let notifier = build_notifier(tmp.path(), &config).unwrap();
        notifier.notify_learning("a", &session()).unwrap();
        assert!(tmp.path().join(&config.jsonl_file).exists());
    }

    #[cfg(feature = "webhook")]
    #[test]
    fn test_webhook_requires_url() {
        let result = WebhookNotifier::new("", std::time::Duration::from_millis(10));
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }

    #[cfg(feature = "webhook")]
    #[test]
    fn test_webhook_rejects_after_shutdown() {
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:9/learn", std::time::Duration::from_millis(50))
                .unwrap();
        notifier.shutdown();
        assert!(matches!(
            notifier.notify_learning("a", &session()),
            Err(NotifyError::Disconnected)
        ));
    }
}
