//! Periodic callers of the recording service.
//!
//! Two timers drive a running [`IntegrityService`] from the outside:
//! - synthetic feedback: records a randomly rated task for a random agent
//! - integrity check: logs the current system integrity
//!
//! Neither keeps state of its own; they only call the public service API.

use anyhow::{Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::performance::TaskInput;
use crate::service::IntegrityService;

const TASK_TYPES: &[&str] = &[
    "resume_generation",
    "cover_letter",
    "linkedin_optimization",
    "ats_optimization",
    "quality_review",
];

const FEEDBACK: &[&str] = &[
    "Great work, very tailored",
    "Felt a bit generic",
    "Delivery was slow",
    "Some dates were inaccurate",
    "Good but could be shorter",
];

const ERRORS: &[&str] = &["pdf render failed", "template missing", "upstream timeout"];

/// Build one synthetic task for a random agent in `agents`.
///
/// Ratings land on half-point steps. The self-rating drifts from the client
/// rating by up to two points, biased upward, so integrity scoring sees both
/// honest and overconfident agents.
pub fn synthetic_task<R: Rng + ?Sized>(rng: &mut R, agents: &[String]) -> Option<TaskInput> {
    let agent_id = agents.choose(rng)?.clone();
    let task_type = TASK_TYPES.choose(rng).copied().unwrap_or("resume_generation");

    let client_rating = f64::from(rng.gen_range(2..=10_u8)) / 2.0;
    let drift = f64::from(rng.gen_range(-2..=4_i8)) / 2.0;
    let self_rating = (client_rating + drift).clamp(1.0, 5.0);

    let client_feedback = rng
        .gen_bool(0.6)
        .then(|| FEEDBACK.choose(rng).map(|f| f.to_string()))
        .flatten();
    let errors = if rng.gen_bool(0.1) {
        ERRORS.choose(rng).map(|e| vec![e.to_string()]).unwrap_or_default()
    } else {
        Vec::new()
    };

    Some(TaskInput {
        agent_id,
        task_id: None,
        task_type: task_type.to_string(),
        client_rating: Some(client_rating),
        client_feedback,
        agent_self_rating: rng.gen_bool(0.8).then_some(self_rating),
        execution_time_ms: rng.gen_range(200..=8000),
        errors,
    })
}

/// Run both timers until Ctrl-C, or until `max_ticks` synthetic tasks are recorded.
pub async fn run(
    service: Arc<IntegrityService>,
    config: &SchedulerConfig,
    agents: Vec<String>,
    max_ticks: Option<u64>,
) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let mut synthetic = interval(Duration::from_secs(config.synthetic_interval_secs.max(1)));
    let mut check = interval(Duration::from_secs(config.integrity_check_interval_secs.max(1)));
    synthetic.set_missed_tick_behavior(MissedTickBehavior::Delay);
    check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = synthetic.tick() => {
                let Some(input) = synthetic_task(&mut rng, &agents) else {
                    warn!("no agents configured for synthetic feedback");
                    continue;
                };
                let svc = Arc::clone(&service);
                let recorded = tokio::task::spawn_blocking(move || svc.record_task_performance(input))
                    .await
                    .context("synthetic recording task panicked")?;
                match recorded {
                    Ok(task) => info!(
                        task_id = %task.task_id,
                        rating = ?task.client_rating,
                        outcome = %task.actual_outcome,
                        "synthetic feedback recorded"
                    ),
                    Err(e) => warn!(error = %e, "synthetic feedback rejected"),
                }
                ticks += 1;
                if max_ticks.is_some_and(|max| ticks >= max) {
                    log_integrity(&service);
                    return Ok(());
                }
            }
            _ = check.tick() => log_integrity(&service),
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("scheduler stopped");
                return Ok(());
            }
        }
    }
}

fn log_integrity(service: &IntegrityService) {
    let report = service.get_system_integrity();
    info!(
        system_integrity = report.system_integrity,
        total_agents = report.total_agents,
        status = %report.status,
        "integrity check"
    );
}
