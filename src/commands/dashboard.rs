//! Show the performance dashboard
//!
//! Agents are listed worst average rating first.
//!
//! Usage:
//!   integrity dashboard
//!   integrity dashboard --json

use anyhow::Result;
use std::path::Path;

use agent_integrity::DashboardView;

use super::fmt_score;

pub fn run(dir: &Path, json: bool) -> Result<()> {
    let (service, _config) = super::open_service(dir)?;
    let view = service.get_performance_dashboard();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        output_table(&view);
    }
    Ok(())
}

fn output_table(view: &DashboardView) {
    if view.agents.is_empty() {
        println!("No agents recorded yet.");
        return;
    }

    println!(
        "{:<22} {:<15} {:>6} {:>6} {:>6} {:>7}  {:<15} {}",
        "AGENT", "RATING", "AVG", "TASKS", "ERRORS", "TRUTH", "INTEGRITY", "FLAG"
    );
    for agent in &view.agents {
        println!(
            "{:<22} {:<15} {:>6.2} {:>6} {:>6} {:>7}  {:<15} {}",
            agent.agent_id,
            agent.star_display,
            agent.average_rating,
            agent.total_tasks,
            agent.error_count,
            fmt_score(agent.truth_score),
            agent.integrity_status,
            if agent.improvement_needed { "needs improvement" } else { "" }
        );
        if let Some(latest) = agent.recent_feedback.last() {
            let text = latest.feedback.as_deref().unwrap_or("(no comment)");
            println!("{:<22} last: {:.1} {} - {}", "", latest.rating, latest.outcome, text);
        }
    }

    println!();
    println!(
        "System integrity: {:.2} across {} agents (as of {})",
        view.system_integrity,
        view.total_agents,
        view.last_updated.to_rfc3339()
    );
}
