//! Record a task outcome for an agent
//!
//! Usage:
//!   integrity record --agent resume_writer --task-type resume_generation \
//!       --rating 2 --self-rating 5 --feedback "too generic"

use anyhow::Result;
use std::path::Path;

use agent_integrity::TaskInput;

pub fn run(dir: &Path, input: TaskInput, json: bool) -> Result<()> {
    let (service, _config) = super::open_service(dir)?;
    let agent_id = input.agent_id.clone();
    let record = service.record_task_performance(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Recorded task '{}' for {}", record.task_id, agent_id);
    println!("  Outcome:     {}", record.actual_outcome);
    if let Some(rating) = record.client_rating {
        println!("  Rating:      {:.1}", rating);
    }
    if let Some(performance) = service.performance(&agent_id) {
        println!(
            "  Average:     {:.2} over {} tasks",
            performance.average_rating, performance.total_tasks
        );
    }
    if let Some(integrity) = service.integrity(&agent_id) {
        println!("  Truth score: {:.2}", integrity.truth_score);
    }
    if let Some(session) = service.learning_sessions(&agent_id).last() {
        println!("  Learning:    {}", session.reason);
        println!("  Plan:        {}", session.improvement_plan);
    }
    Ok(())
}
