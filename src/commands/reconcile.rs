use anyhow::Result;
use std::fs;

use crate::commands::CommandReport;
use crate::warden::paths::resolve_paths;
use crate::warden::recorder::UptimeRecorder;
use crate::warden::replay;

/// Standalone recovery path: rebuild the derived stats and sessions files
/// purely by replaying the append-only events log. Needs no compose dir
/// and no docker binary.
pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("reconcile");

    let paths = match resolve_paths() {
        Ok(paths) => paths,
        Err(err) => {
            report.issue(format!("{err:#}"));
            return Ok(report);
        }
    };

    if !paths.events_log.exists() {
        report.issue(format!(
            "events log not found: {}; nothing to replay",
            paths.events_log.display()
        ));
        return Ok(report);
    }

    let raw = match fs::read_to_string(&paths.events_log) {
        Ok(raw) => raw,
        Err(err) => {
            report.issue(format!(
                "failed to read {}: {err}",
                paths.events_log.display()
            ));
            return Ok(report);
        }
    };

    let summary = replay::replay_lines(raw.lines());

    let recorder = UptimeRecorder::new(paths.clone());
    if let Err(err) = recorder.replace_sessions(&summary.sessions) {
        report.issue(format!("failed to write rebuilt sessions: {err:#}"));
        return Ok(report);
    }
    if let Err(err) = recorder.replace_stats(&summary.stats) {
        report.issue(format!("failed to write rebuilt stats: {err:#}"));
        return Ok(report);
    }

    report.detail(format!(
        "repair complete: {} sessions, {} total starts",
        summary.sessions_rebuilt, summary.stats.total_starts
    ));
    report.detail(format!("sessions_kept={}", summary.sessions.len()));
    report.detail(format!(
        "duplicates_ignored={}",
        summary.anomalies.duplicates_ignored
    ));
    report.detail(format!(
        "out_of_order_stops={}",
        summary.anomalies.out_of_order_stops
    ));
    report.detail(format!(
        "stops_without_session={}",
        summary.anomalies.stops_without_session
    ));
    report.detail(format!("sessions_file={}", paths.sessions_file.display()));
    report.detail(format!("stats_file={}", paths.stats_file.display()));

    Ok(report)
}
