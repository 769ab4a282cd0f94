use crate::warden::paths::WardenPaths;
use crate::warden::util;
use crate::warden::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Most-recent sessions kept in the derived sessions file.
pub const SESSION_HISTORY_LIMIT: usize = 100;

/// Event kinds written to the append-only events log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventKind {
    ServiceStart,
    ServiceStop,
    ServiceStartConfirmed,
    StartFailed,
    ServiceHealthIssue,
}

impl LogEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventKind::ServiceStart => "SERVICE_START",
            LogEventKind::ServiceStop => "SERVICE_STOP",
            LogEventKind::ServiceStartConfirmed => "SERVICE_START_CONFIRMED",
            LogEventKind::StartFailed => "START_FAILED",
            LogEventKind::ServiceHealthIssue => "SERVICE_HEALTH_ISSUE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub start: String,
    pub end: String,
    pub duration_hours: f64,
    pub start_reason: String,
    pub stop_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UptimeStats {
    pub total_starts: u64,
    pub daily: BTreeMap<String, u64>,
    pub last_start: Option<String>,
    pub last_stop: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsAction {
    Start,
    Stop,
}

/// Elapsed hours between two timestamps, rounded to 2 decimals.
pub fn duration_hours(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let hours = end.signed_duration_since(start).num_milliseconds() as f64 / 3_600_000.0;
    (hours * 100.0).round() / 100.0
}

/// Durable uptime history: the append-only events log plus the derived
/// stats and sessions files. All file IO goes through one lock; derived
/// files are rewritten wholesale via temp-file-then-persist, and write
/// failures are logged rather than propagated: the events log stays the
/// source of truth and the reconcile command is the recovery path.
pub struct UptimeRecorder {
    paths: WardenPaths,
    io: Mutex<()>,
}

impl UptimeRecorder {
    pub fn new(paths: WardenPaths) -> Self {
        Self {
            paths,
            io: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &WardenPaths {
        &self.paths
    }

    fn lock_io(&self) -> MutexGuard<'_, ()> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn warn_io(&self, action: &'static str, path: &Path, err: &anyhow::Error) {
        warn::emit(WarnEvent {
            code: "PERSIST_FAILED",
            stage: "recorder",
            action,
            service: "na",
            path: &path.display().to_string(),
            retry: "reconcile-rebuilds-derived-files",
            reason: "io-error",
            err: &format!("{err:#}"),
        });
    }

    /// Append one `<timestamp> - <kind> - <reason>` line. Best-effort: a
    /// write failure must never roll back the transition that produced it.
    pub fn append_event(&self, kind: LogEventKind, reason: &str) {
        let timestamp = util::format_timestamp(util::now_local());
        let mut line = format!("{timestamp} - {}", kind.as_str());
        if !reason.is_empty() {
            line.push_str(&format!(" - {reason}"));
        }
        line.push('\n');

        let _io = self.lock_io();
        if let Err(err) = self.append_line(&line) {
            self.warn_io("append-event", &self.paths.events_log, &err);
        }
    }

    fn append_line(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.paths.events_log.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.events_log)
            .with_context(|| format!("failed to open {}", self.paths.events_log.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to write {}", self.paths.events_log.display()))?;
        Ok(())
    }

    /// Record a completed session, keeping the most-recent
    /// `SESSION_HISTORY_LIMIT` entries.
    pub fn record_session(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        start_reason: &str,
        stop_reason: &str,
    ) {
        let session = SessionRecord {
            start: util::format_timestamp(start),
            end: util::format_timestamp(end),
            duration_hours: duration_hours(start, end),
            start_reason: start_reason.to_string(),
            stop_reason: stop_reason.to_string(),
        };

        let _io = self.lock_io();
        let mut sessions: Vec<SessionRecord> = self.load_json_or_default(&self.paths.sessions_file);
        sessions.push(session);
        if sessions.len() > SESSION_HISTORY_LIMIT {
            let excess = sessions.len() - SESSION_HISTORY_LIMIT;
            sessions.drain(..excess);
        }
        if let Err(err) = write_json_atomic(&self.paths.sessions_file, &sessions) {
            self.warn_io("save-sessions", &self.paths.sessions_file, &err);
        }
    }

    /// Update the stats snapshot: `Start` bumps the total and today's
    /// bucket and stamps `last_start`; `Stop` stamps `last_stop`.
    pub fn update_stats(&self, action: StatsAction, now: NaiveDateTime) {
        let _io = self.lock_io();
        let mut stats: UptimeStats = self.load_json_or_default(&self.paths.stats_file);
        match action {
            StatsAction::Start => {
                *stats.daily.entry(util::day_key(now)).or_insert(0) += 1;
                stats.total_starts += 1;
                stats.last_start = Some(util::format_timestamp(now));
            }
            StatsAction::Stop => {
                stats.last_stop = Some(util::format_timestamp(now));
            }
        }
        if let Err(err) = write_json_atomic(&self.paths.stats_file, &stats) {
            self.warn_io("save-stats", &self.paths.stats_file, &err);
        }
    }

    pub fn stats(&self) -> UptimeStats {
        let _io = self.lock_io();
        self.load_json_or_default(&self.paths.stats_file)
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        let _io = self.lock_io();
        self.load_json_or_default(&self.paths.sessions_file)
    }

    pub fn event_lines(&self) -> Result<Vec<String>> {
        let _io = self.lock_io();
        if !self.paths.events_log.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.paths.events_log)
            .with_context(|| format!("failed to read {}", self.paths.events_log.display()))?;
        Ok(raw.lines().map(ToOwned::to_owned).collect())
    }

    pub fn recent_event_lines(&self, lines: usize) -> Result<Vec<String>> {
        let mut all = self.event_lines()?;
        if lines > 0 && all.len() > lines {
            all.drain(..all.len() - lines);
        }
        Ok(all)
    }

    /// Wholesale replacement used by the reconcile command; unlike the live
    /// write path, failures here are hard errors.
    pub fn replace_sessions(&self, sessions: &[SessionRecord]) -> Result<()> {
        let _io = self.lock_io();
        write_json_atomic(&self.paths.sessions_file, &sessions)
    }

    pub fn replace_stats(&self, stats: &UptimeStats) -> Result<()> {
        let _io = self.lock_io();
        write_json_atomic(&self.paths.stats_file, stats)
    }

    /// Load a derived JSON file, falling back to defaults. A corrupt file is
    /// backed up aside so the bytes stay inspectable, then replaced on the
    /// next rewrite.
    fn load_json_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> T {
        if !path.exists() {
            return T::default();
        }
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                self.warn_io("load-derived-file", path, &err.into());
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                let stamp = util::now_epoch_secs().unwrap_or(0);
                let backup = path.with_extension(format!("json.corrupt.{stamp}"));
                let _ = fs::write(&backup, &raw);
                warn::emit(WarnEvent {
                    code: "DERIVED_FILE_CORRUPT",
                    stage: "recorder",
                    action: "load-derived-file",
                    service: "na",
                    path: &path.display().to_string(),
                    retry: "run-reconcile",
                    reason: "json-parse-failed",
                    err: &format!("{err}"),
                });
                T::default()
            }
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("no parent directory for {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    let data = serde_json::to_string_pretty(value)?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.write_all(b"\n"))
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::paths::WardenPaths;
    use chrono::{Duration, NaiveDate};
    use tempfile::tempdir;

    fn paths_in(dir: &Path) -> WardenPaths {
        WardenPaths {
            warden_home: dir.to_path_buf(),
            data_dir: dir.to_path_buf(),
            events_log: dir.join("events.log"),
            stats_file: dir.join("stats.json"),
            sessions_file: dir.join("sessions.json"),
        }
    }

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .expect("date")
            .and_hms_opt(12, 0, 0)
            .expect("time")
            + Duration::seconds(secs)
    }

    #[test]
    fn duration_hours_rounds_to_two_decimals() {
        assert_eq!(duration_hours(at(0), at(3600)), 1.0);
        assert_eq!(duration_hours(at(0), at(5400)), 1.5);
        // 1234 seconds = 0.34277... hours
        assert_eq!(duration_hours(at(0), at(1234)), 0.34);
    }

    #[test]
    fn append_event_writes_parseable_lines() {
        let tmp = tempdir().expect("tempdir");
        let recorder = UptimeRecorder::new(paths_in(tmp.path()));

        recorder.append_event(LogEventKind::ServiceStart, "auto_detected");
        recorder.append_event(LogEventKind::StartFailed, "manual_start_timeout");

        let lines = recorder.event_lines().expect("lines");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" - SERVICE_START - auto_detected"));
        assert!(lines[1].contains(" - START_FAILED - manual_start_timeout"));
        let timestamp = lines[0].split(" - ").next().expect("timestamp field");
        assert!(util::parse_timestamp(timestamp).is_some());
    }

    #[test]
    fn record_session_keeps_most_recent_hundred() {
        let tmp = tempdir().expect("tempdir");
        let recorder = UptimeRecorder::new(paths_in(tmp.path()));

        for i in 0..(SESSION_HISTORY_LIMIT as i64 + 5) {
            recorder.record_session(at(i * 100), at(i * 100 + 60), "auto_detected", "auto_detected");
        }

        let sessions = recorder.sessions();
        assert_eq!(sessions.len(), SESSION_HISTORY_LIMIT);
        // Oldest five were trimmed.
        assert_eq!(sessions[0].start, util::format_timestamp(at(500)));
    }

    #[test]
    fn update_stats_buckets_by_day_and_stamps_markers() {
        let tmp = tempdir().expect("tempdir");
        let recorder = UptimeRecorder::new(paths_in(tmp.path()));

        recorder.update_stats(StatsAction::Start, at(0));
        recorder.update_stats(StatsAction::Start, at(10));
        recorder.update_stats(StatsAction::Stop, at(20));

        let stats = recorder.stats();
        assert_eq!(stats.total_starts, 2);
        assert_eq!(stats.daily.get("2024-05-01"), Some(&2));
        assert_eq!(stats.last_start, Some(util::format_timestamp(at(10))));
        assert_eq!(stats.last_stop, Some(util::format_timestamp(at(20))));
    }

    #[test]
    fn corrupt_stats_file_is_backed_up_and_replaced_by_defaults() {
        let tmp = tempdir().expect("tempdir");
        let paths = paths_in(tmp.path());
        fs::write(&paths.stats_file, "{ this is not json").expect("seed corrupt file");
        let recorder = UptimeRecorder::new(paths.clone());

        let stats = recorder.stats();
        assert_eq!(stats, UptimeStats::default());

        let backups = fs::read_dir(tmp.path())
            .expect("read dir")
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .contains("json.corrupt.")
            })
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn recent_event_lines_returns_tail_only() {
        let tmp = tempdir().expect("tempdir");
        let recorder = UptimeRecorder::new(paths_in(tmp.path()));
        for _ in 0..5 {
            recorder.append_event(LogEventKind::ServiceStart, "auto_detected");
        }
        recorder.append_event(LogEventKind::ServiceStop, "auto_detected");

        let tail = recorder.recent_event_lines(2).expect("tail");
        assert_eq!(tail.len(), 2);
        assert!(tail[1].contains("SERVICE_STOP"));
    }
}
