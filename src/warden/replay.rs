use crate::warden::recorder::{
    SESSION_HISTORY_LIMIT, SessionRecord, UptimeStats, duration_hours,
};
use crate::warden::util;
use chrono::NaiveDateTime;

const VALID_START_REASONS: &[&str] = &["manual_start_confirmed", "auto_detected"];
// `idle_timeout` has no producer today; it is recognized here as a reserved
// stop reason so logs that carry it still replay.
const VALID_STOP_REASONS: &[&str] = &["manual_stop", "auto_detected", "idle_timeout"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLogLine {
    pub timestamp: NaiveDateTime,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayAnomalies {
    pub duplicates_ignored: u64,
    pub out_of_order_stops: u64,
    pub stops_without_session: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub stats: UptimeStats,
    /// Most-recent `SESSION_HISTORY_LIMIT` sessions, oldest first.
    pub sessions: Vec<SessionRecord>,
    /// Sessions reconstructed before the history window was applied.
    pub sessions_rebuilt: usize,
    pub anomalies: ReplayAnomalies,
}

/// Parse one `<ISO-8601> - <KIND> - <reason>` line; anything else is None.
pub fn parse_log_line(line: &str) -> Option<ParsedLogLine> {
    let mut parts = line.trim().splitn(3, " - ");
    let timestamp = util::parse_timestamp(parts.next()?.trim())?;
    let kind = parts.next()?.trim().to_string();
    if kind.is_empty() {
        return None;
    }
    let reason = parts.next().unwrap_or("").trim().to_string();
    Some(ParsedLogLine {
        timestamp,
        kind,
        reason,
    })
}

fn is_start_event(line: &ParsedLogLine) -> bool {
    matches!(line.kind.as_str(), "SERVICE_START" | "SERVICE_START_CONFIRMED")
        && VALID_START_REASONS.contains(&line.reason.as_str())
}

fn is_stop_event(line: &ParsedLogLine) -> bool {
    line.kind == "SERVICE_STOP" && VALID_STOP_REASONS.contains(&line.reason.as_str())
}

/// Deterministic replay of the events log from empty state. Unparsable
/// lines are skipped, anomalies are counted instead of aborting, and the
/// output is exactly what the live recorder would have produced for a
/// clean history.
pub fn replay_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> ReplaySummary {
    let mut open_start: Option<(NaiveDateTime, String)> = None;
    let mut sessions: Vec<SessionRecord> = Vec::new();
    let mut stats = UptimeStats::default();
    let mut anomalies = ReplayAnomalies::default();

    for raw in lines {
        let Some(line) = parse_log_line(raw) else {
            continue;
        };

        if is_start_event(&line) {
            if open_start.is_none() {
                *stats.daily.entry(util::day_key(line.timestamp)).or_insert(0) += 1;
                stats.total_starts += 1;
                stats.last_start = Some(util::format_timestamp(line.timestamp));
                open_start = Some((line.timestamp, line.reason));
            } else {
                anomalies.duplicates_ignored += 1;
            }
            continue;
        }

        if is_stop_event(&line) {
            stats.last_stop = Some(util::format_timestamp(line.timestamp));
            match open_start.take() {
                Some((start_ts, start_reason)) => {
                    if line.timestamp < start_ts {
                        anomalies.out_of_order_stops += 1;
                        // The stop never happened in session order; keep the
                        // session open.
                        open_start = Some((start_ts, start_reason));
                        continue;
                    }
                    sessions.push(SessionRecord {
                        start: util::format_timestamp(start_ts),
                        end: util::format_timestamp(line.timestamp),
                        duration_hours: duration_hours(start_ts, line.timestamp),
                        start_reason,
                        stop_reason: line.reason,
                    });
                }
                None => anomalies.stops_without_session += 1,
            }
            continue;
        }

        // Health issues, start failures, and unknown kinds are not session
        // boundaries.
    }

    let sessions_rebuilt = sessions.len();
    if sessions.len() > SESSION_HISTORY_LIMIT {
        let excess = sessions.len() - SESSION_HISTORY_LIMIT;
        sessions.drain(..excess);
    }

    ReplaySummary {
        stats,
        sessions,
        sessions_rebuilt,
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ts: &str, kind: &str, reason: &str) -> String {
        format!("{ts} - {kind} - {reason}")
    }

    #[test]
    fn round_trip_rebuilds_one_session_with_rounded_duration() {
        let log = vec![
            line("2024-05-01T10:00:00", "SERVICE_START_CONFIRMED", "manual_start_confirmed"),
            line("2024-05-01T13:30:00", "SERVICE_STOP", "manual_stop"),
        ];
        let summary = replay_lines(log.iter().map(String::as_str));

        assert_eq!(summary.sessions_rebuilt, 1);
        let session = &summary.sessions[0];
        assert_eq!(session.start, "2024-05-01T10:00:00.000000");
        assert_eq!(session.end, "2024-05-01T13:30:00.000000");
        assert_eq!(session.duration_hours, 3.5);
        assert_eq!(session.start_reason, "manual_start_confirmed");
        assert_eq!(session.stop_reason, "manual_stop");
        assert_eq!(summary.stats.total_starts, 1);
        assert_eq!(summary.stats.daily.get("2024-05-01"), Some(&1));
        assert_eq!(summary.anomalies, ReplayAnomalies::default());
    }

    #[test]
    fn replay_is_idempotent_over_an_unchanged_log() {
        let log = vec![
            line("2024-05-01T10:00:00", "SERVICE_START", "auto_detected"),
            line("2024-05-01T11:00:00", "SERVICE_STOP", "auto_detected"),
            line("2024-05-02T09:00:00", "SERVICE_START", "auto_detected"),
            line("2024-05-02T09:30:00", "SERVICE_STOP", "idle_timeout"),
        ];
        let first = replay_lines(log.iter().map(String::as_str));
        let second = replay_lines(log.iter().map(String::as_str));
        assert_eq!(first, second);
        assert_eq!(first.sessions.len(), 2);
        assert_eq!(first.sessions[1].stop_reason, "idle_timeout");
    }

    #[test]
    fn duplicate_start_is_counted_once_and_keeps_one_session_open() {
        let log = vec![
            line("2024-05-01T10:00:00", "SERVICE_START", "auto_detected"),
            line("2024-05-01T10:05:00", "SERVICE_START_CONFIRMED", "manual_start_confirmed"),
            line("2024-05-01T11:00:00", "SERVICE_STOP", "manual_stop"),
        ];
        let summary = replay_lines(log.iter().map(String::as_str));

        assert_eq!(summary.anomalies.duplicates_ignored, 1);
        assert_eq!(summary.sessions.len(), 1);
        // The first start owns the session.
        assert_eq!(summary.sessions[0].start, "2024-05-01T10:00:00.000000");
        assert_eq!(summary.stats.total_starts, 1);
    }

    #[test]
    fn out_of_order_stop_is_discarded_without_closing() {
        let log = vec![
            line("2024-05-01T10:00:00", "SERVICE_START", "auto_detected"),
            line("2024-05-01T09:00:00", "SERVICE_STOP", "auto_detected"),
            line("2024-05-01T12:00:00", "SERVICE_STOP", "auto_detected"),
        ];
        let summary = replay_lines(log.iter().map(String::as_str));

        assert_eq!(summary.anomalies.out_of_order_stops, 1);
        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.sessions[0].end, "2024-05-01T12:00:00.000000");
        // last_stop tracks every recognized stop, session or not.
        assert_eq!(
            summary.stats.last_stop,
            Some("2024-05-01T12:00:00.000000".to_string())
        );
    }

    #[test]
    fn stop_without_session_is_counted_and_still_updates_last_stop() {
        let log = vec![line("2024-05-01T08:00:00", "SERVICE_STOP", "manual_stop")];
        let summary = replay_lines(log.iter().map(String::as_str));

        assert_eq!(summary.anomalies.stops_without_session, 1);
        assert!(summary.sessions.is_empty());
        assert_eq!(
            summary.stats.last_stop,
            Some("2024-05-01T08:00:00.000000".to_string())
        );
    }

    #[test]
    fn duplicate_marker_and_failures_and_garbage_are_ignored() {
        let log = vec![
            "not a log line".to_string(),
            line("2024-05-01T10:00:00", "SERVICE_START", "manual_start_ignored_duplicate"),
            line("garbage-timestamp", "SERVICE_START", "auto_detected"),
            line("2024-05-01T10:01:00", "START_FAILED", "manual_start_timeout"),
            line("2024-05-01T10:02:00", "SERVICE_HEALTH_ISSUE", "unhealthy_persisted"),
        ];
        let summary = replay_lines(log.iter().map(String::as_str));

        assert_eq!(summary.stats.total_starts, 0);
        assert!(summary.sessions.is_empty());
        assert_eq!(summary.anomalies, ReplayAnomalies::default());
    }

    #[test]
    fn session_window_keeps_most_recent_hundred() {
        let mut log = Vec::new();
        for day in 0..104 {
            let date = format!("2024-01-{:02}", (day % 28) + 1);
            log.push(format!("{date}T01:00:0{} - SERVICE_START - auto_detected", day % 10));
            log.push(format!("{date}T02:00:0{} - SERVICE_STOP - auto_detected", day % 10));
        }
        let summary = replay_lines(log.iter().map(String::as_str));

        assert_eq!(summary.sessions_rebuilt, 104);
        assert_eq!(summary.sessions.len(), SESSION_HISTORY_LIMIT);
        assert_eq!(summary.stats.total_starts, 104);
    }

    #[test]
    fn parse_log_line_handles_missing_reason_and_offsets() {
        let no_reason = parse_log_line("2024-05-01T10:00:00 - SERVICE_STOP").expect("parsed");
        assert_eq!(no_reason.reason, "");

        let offset = parse_log_line("2024-05-01T10:00:00+02:00 - SERVICE_START - auto_detected");
        assert!(offset.is_some());

        assert!(parse_log_line("").is_none());
        assert!(parse_log_line("2024-05-01T10:00:00").is_none());
    }
}
