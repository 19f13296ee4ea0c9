use anyhow::Result;
use std::path::Path;

pub fn run(dir: &Path, json: bool) -> Result<()> {
    let (service, _config) = super::open_service(dir)?;
    let report = service.get_system_integrity();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "System integrity: {:.2} ({}) across {} agents",
            report.system_integrity, report.status, report.total_agents
        );
    }
    Ok(())
}
