use anyhow::Result;

use crate::commands::{CommandReport, manager_or_issue};

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("uptime-stats");
    let Some(manager) = manager_or_issue(&mut report) else {
        return Ok(report);
    };

    let reply = manager.uptime_stats();
    if !reply.ok {
        report.issue(reply.message);
        return Ok(report);
    }

    report.detail(reply.message);
    report.detail(format!("total_starts={}", reply.total_starts));
    report.detail(format!("manual_starts={}", reply.manual_starts));
    report.detail(format!("auto_starts={}", reply.auto_starts));
    report.detail(format!("manual_stops={}", reply.manual_stops));
    report.detail(format!("auto_stops={}", reply.auto_stops));
    report.detail(format!(
        "last_start={}",
        reply.last_start.as_deref().unwrap_or("never")
    ));
    report.detail(format!(
        "last_stop={}",
        reply.last_stop.as_deref().unwrap_or("never")
    ));
    for day in &reply.daily {
        report.detail(format!("daily date={} starts={}", day.date, day.starts));
    }

    Ok(report)
}
