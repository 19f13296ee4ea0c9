//! Learning triggers: diagnose poorly rated tasks and prescribe a fix.
//!
//! A task rated at or below the trigger rating produces a [`LearningSession`]
//! with a diagnosis (`reason`) and an `improvement_plan`. What the learner
//! does with the session is outside this crate; sessions are only recorded
//! and handed to a [`crate::notify::LearningNotifier`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::performance::TaskRecord;

/// Plan used when the task type has no entry in [`improvement_plan_for`].
pub const DEFAULT_IMPROVEMENT_PLAN: &str = "Review task requirements and raise overall output quality";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Closing a session is up to the external learner.
    Active,
}

/// A corrective-action event raised by a poor client rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSession {
    pub triggered_at: DateTime<Utc>,
    pub trigger_task: TaskRecord,
    pub reason: String,
    pub improvement_plan: String,
    pub status: SessionStatus,
}

fn mentions(feedback: Option<&str>, needle: &str) -> bool {
    feedback.is_some_and(|f| f.to_lowercase().contains(needle))
}

/// Feedback text, treating blank strings as absent.
fn feedback_text(task: &TaskRecord) -> Option<&str> {
    task.client_feedback
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

/// Diagnose why a task went badly. The first matching rule wins.
pub fn diagnose(task: &TaskRecord) -> String {
    if !task.errors.is_empty() {
        return format!("Technical errors detected: {}", task.errors.join(", "));
    }

    let feedback = feedback_text(task);
    if feedback.is_some() {
        if mentions(feedback, "generic") {
            return "Output too generic, needs more personalization".to_string();
        }
        if mentions(feedback, "slow") {
            return "Response time too slow, needs optimization".to_string();
        }
        if mentions(feedback, "inaccurate") {
            return "Accuracy issues reported, needs fact-checking".to_string();
        }
        return task.client_feedback.clone().unwrap_or_default();
    }

    match task.client_rating {
        Some(r) if r <= 2.0 => "Severely low rating, needs comprehensive review".to_string(),
        _ => "Rating below quality threshold".to_string(),
    }
}

/// Base improvement plan for a task type.
pub fn improvement_plan_for(task_type: &str) -> &'static str {
    match task_type {
        "resume_generation" => "Tailor resume structure and keywords to the target role",
        "cover_letter" => "Open with a stronger hook and tie achievements to the job description",
        "linkedin_optimization" => "Sharpen the headline and summary with industry keywords",
        "ats_optimization" => "Raise keyword coverage and simplify formatting for ATS parsing",
        "quality_review" => "Tighten the review checklist and flag factual inconsistencies",
        _ => DEFAULT_IMPROVEMENT_PLAN,
    }
}

/// Build the improvement plan: the task type's base plan plus targeted suffixes.
pub fn build_improvement_plan(task: &TaskRecord) -> String {
    let mut plan = improvement_plan_for(&task.task_type).to_string();
    if mentions(feedback_text(task), "generic") {
        plan.push_str(", focus on personalization");
    }
    if !task.errors.is_empty() {
        plan.push_str(", fix technical issues");
    }
    plan
}

/// Produce a learning session if `task` is rated at or below `learning_trigger_rating`.
pub fn maybe_trigger(
    task: &TaskRecord,
    learning_trigger_rating: f64,
    now: DateTime<Utc>,
) -> Option<LearningSession> {
    let rating = task.client_rating?;
    if rating > learning_trigger_rating {
        return None;
    }
    Some(LearningSession {
        triggered_at: now,
        trigger_task: task.clone(),
        reason: diagnose(task),
        improvement_plan: build_improvement_plan(task),
        status: SessionStatus::Active,
    })
}
