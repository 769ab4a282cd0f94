use crate::compose::{CommandOutput, ContainerSnapshot, ProcessControl};
use crate::warden::config::WardenConfig;
use crate::warden::events::{Event, EventBus, EventKind, EventListener};
use crate::warden::health::{self, ConsolidatedHealth};
use crate::warden::paths::WardenPaths;
use crate::warden::recorder::{LogEventKind, StatsAction, UptimeRecorder};
use crate::warden::replay;
use crate::warden::util;
use crate::warden::warn::{self, WarnEvent};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, LockResult, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// In-memory view the monitor loop, the start watcher, and foreground
/// callers reconcile against. Only ever touched under the state lock.
#[derive(Debug, Clone, Default)]
pub struct ManagerState {
    pub last_known_running: Option<bool>,
    pub last_effective_health: Option<ConsolidatedHealth>,
    pub unhealthy_since: Option<NaiveDateTime>,
    pub current_session_start: Option<NaiveDateTime>,
    pub start_pending: bool,
    pub start_requested_at: Option<NaiveDateTime>,
}

/// Shared stop flag with a condvar so the monitor's poll sleep is
/// interruptible: shutdown wakes it immediately instead of waiting out the
/// interval.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn trigger(&self) {
        *relock(self.stopped.lock()) = true;
        self.condvar.notify_all();
    }

    fn is_triggered(&self) -> bool {
        *relock(self.stopped.lock())
    }

    fn wait(&self) {
        let mut stopped = relock(self.stopped.lock());
        while !*stopped {
            stopped = relock(self.condvar.wait(stopped));
        }
    }

    /// Sleep up to `timeout`; returns true when the stop was triggered.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let stopped = relock(self.stopped.lock());
        if *stopped {
            return true;
        }
        match self.condvar.wait_timeout(stopped, timeout) {
            Ok((stopped, _)) => *stopped,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

fn relock<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub enum StartOutcome {
    Pending,
    AlreadyRunning,
    Starting { details: String },
    Failed { message: String },
}

#[derive(Debug, Clone)]
pub enum StopOutcome {
    Stopped { details: String },
    Failed { message: String },
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub snapshots: Vec<ContainerSnapshot>,
    pub any_running: bool,
    pub health: ConsolidatedHealth,
    pub effective_health: ConsolidatedHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReply {
    pub status: String,
    pub message: String,
    pub containers: Vec<ContainerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsReply {
    pub ok: bool,
    pub message: String,
    pub logs: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStarts {
    pub date: String,
    pub starts: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeStatsReply {
    pub ok: bool,
    pub message: String,
    pub total_starts: u64,
    pub manual_starts: u64,
    pub auto_starts: u64,
    pub manual_stops: u64,
    pub auto_stops: u64,
    pub last_start: Option<String>,
    pub last_stop: Option<String>,
    pub daily: Vec<DailyStarts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeLogReply {
    pub ok: bool,
    pub message: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoricUptimeReply {
    pub ok: bool,
    pub message: String,
    pub total_uptime_hours: f64,
    pub total_sessions: usize,
    pub average_session_hours: f64,
    pub longest_session_hours: f64,
    pub uptime_by_day: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStatusReply {
    pub ok: bool,
    pub message: String,
    pub monitor_running: bool,
    pub check_interval_secs: u64,
    pub last_known_status: String,
    pub auto_detected_events: u64,
    pub current_session_active: bool,
}

/// Lifecycle manager for one compose-controlled service: debounced health
/// monitoring, supervised manual starts, durable uptime history, and the
/// query surface the notification collaborator reads.
#[derive(Clone)]
pub struct ServiceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: WardenConfig,
    controller: Box<dyn ProcessControl>,
    recorder: UptimeRecorder,
    bus: EventBus,
    state: Mutex<ManagerState>,
    stop: StopSignal,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    watcher_handle: Mutex<Option<JoinHandle<()>>>,
}

enum CycleStep {
    Record(LogEventKind, &'static str),
    CloseSession { start: NaiveDateTime, end: NaiveDateTime },
    Stats(StatsAction),
    Emit(Event),
}

impl ServiceManager {
    pub fn new(
        config: WardenConfig,
        paths: WardenPaths,
        controller: Box<dyn ProcessControl>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                controller,
                recorder: UptimeRecorder::new(paths),
                bus: EventBus::default(),
                state: Mutex::new(ManagerState::default()),
                stop: StopSignal::default(),
                monitor_handle: Mutex::new(None),
                watcher_handle: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.inner.config
    }

    pub fn recorder(&self) -> &UptimeRecorder {
        &self.inner.recorder
    }

    pub fn register_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.bus.register(listener);
    }

    pub fn unregister_event_listener(&self, listener: &Arc<dyn EventListener>) {
        self.inner.bus.unregister(listener);
    }

    /// Start the background monitor thread. Idempotent: a live monitor is
    /// left alone.
    pub fn start_monitoring(&self) {
        let mut handle = relock(self.inner.monitor_handle.lock());
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        match thread::Builder::new()
            .name("service-monitor".to_string())
            .spawn(move || ManagerInner::monitor_loop(inner))
        {
            Ok(spawned) => *handle = Some(spawned),
            Err(err) => warn::emit(WarnEvent {
                code: "MONITOR_SPAWN_FAILED",
                stage: "monitor",
                action: "spawn-thread",
                service: "na",
                path: "na",
                retry: "call-start-monitoring-again",
                reason: "thread-spawn-failed",
                err: &format!("{err}"),
            }),
        }
    }

    pub fn request_stop(&self) {
        self.inner.stop.trigger();
    }

    /// Block until the stop signal fires (daemon foreground wait).
    pub fn wait_for_stop(&self) {
        self.inner.stop.wait();
    }

    /// Request monitor stop and join it within `join_timeout`. Watcher
    /// threads are not cancelled; they run to their own bounded deadline.
    pub fn shutdown(&self, join_timeout: Duration) {
        self.inner.stop.trigger();
        let handle = relock(self.inner.monitor_handle.lock()).take();
        let Some(handle) = handle else {
            return;
        };
        let deadline = Instant::now() + join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(25));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            warn::emit(WarnEvent {
                code: "MONITOR_JOIN_TIMEOUT",
                stage: "shutdown",
                action: "join-monitor",
                service: "na",
                path: "na",
                retry: "none",
                reason: "monitor-still-running",
                err: "na",
            });
        }
    }

    /// Run exactly one monitor cycle against the given clock reading.
    pub fn poll_once(&self, now: NaiveDateTime) -> CycleOutcome {
        self.inner.run_cycle(now)
    }

    /// Asynchronous manual start. Returns as soon as the start command is
    /// issued; a supervising watcher resolves the attempt to exactly one
    /// terminal outcome delivered through the event bus.
    pub fn start(&self) -> StartOutcome {
        let inner = &self.inner;
        {
            let st = inner.lock_state();
            if st.start_pending {
                return StartOutcome::Pending;
            }
            if st.current_session_start.is_some() {
                return StartOutcome::AlreadyRunning;
            }
        }

        let already_running = inner
            .controller
            .query_snapshot()
            .iter()
            .any(ContainerSnapshot::is_running);
        let now = util::now_local();
        {
            let mut st = inner.lock_state();
            if st.start_pending {
                return StartOutcome::Pending;
            }
            if already_running || st.current_session_start.is_some() {
                return StartOutcome::AlreadyRunning;
            }
            // Reserve the attempt before issuing the command so a concurrent
            // caller reads it as pending; rolled back if the command fails.
            st.start_pending = true;
            st.start_requested_at = Some(now);
        }

        let output = match inner.controller.issue_start() {
            Ok(out) if out.success => out,
            Ok(out) => {
                inner.take_start_pending();
                return StartOutcome::Failed {
                    message: command_failure("start", &out),
                };
            }
            Err(err) => {
                inner.take_start_pending();
                return StartOutcome::Failed {
                    message: format!("start command failed: {err:#}"),
                };
            }
        };

        inner.bus.dispatch(&Event::new(
            EventKind::ServerStart,
            "service is starting (manual request)",
        ));

        let watcher_inner = Arc::clone(inner);
        match thread::Builder::new()
            .name("start-watcher".to_string())
            .spawn(move || watcher_inner.run_start_watcher())
        {
            Ok(handle) => {
                *relock(inner.watcher_handle.lock()) = Some(handle);
            }
            Err(err) => {
                inner.take_start_pending();
                return StartOutcome::Failed {
                    message: format!("failed to spawn start watcher: {err}"),
                };
            }
        }

        StartOutcome::Starting {
            details: output.stdout.trim().to_string(),
        }
    }

    /// Block until the current start watcher (if any) reaches its terminal
    /// outcome. The watcher's own deadline bounds this.
    pub fn join_start_watcher(&self) {
        let handle = relock(self.inner.watcher_handle.lock()).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Manual stop: issues the external stop command and closes any open
    /// session. Command failure mutates nothing.
    pub fn stop_service(&self) -> StopOutcome {
        let inner = &self.inner;
        let output = match inner.controller.issue_stop() {
            Ok(out) if out.success => out,
            Ok(out) => {
                return StopOutcome::Failed {
                    message: command_failure("stop", &out),
                };
            }
            Err(err) => {
                return StopOutcome::Failed {
                    message: format!("stop command failed: {err:#}"),
                };
            }
        };

        inner.bus.dispatch(&Event::new(
            EventKind::ServerStop,
            "service stopping (manual request)",
        ));

        let now = util::now_local();
        let closed = inner.lock_state().current_session_start.take();
        if let Some(start) = closed {
            inner
                .recorder
                .record_session(start, now, "manual_start", "manual_stop");
        }
        inner
            .recorder
            .append_event(LogEventKind::ServiceStop, "manual_stop");
        inner.recorder.update_stats(StatsAction::Stop, now);

        StopOutcome::Stopped {
            details: output.stdout.trim().to_string(),
        }
    }

    pub fn status(&self) -> StatusReply {
        match self.inner.controller.query_snapshot_checked() {
            Ok(snapshots) => {
                let agg = health::aggregate(&snapshots);
                let mut message = match agg.health {
                    ConsolidatedHealth::Running => "service is running".to_string(),
                    ConsolidatedHealth::Starting => "service is starting".to_string(),
                    ConsolidatedHealth::Unhealthy => {
                        "service health: unhealthy (may still be initializing)".to_string()
                    }
                    ConsolidatedHealth::Stopped => "service is stopped".to_string(),
                };
                if agg.health == ConsolidatedHealth::Running
                    && let Some(probe) = self.inner.run_status_probe(&snapshots)
                    && !probe.trim().is_empty()
                {
                    message.push('\n');
                    message.push_str(probe.trim());
                }
                StatusReply {
                    status: agg.health.as_str().to_string(),
                    message,
                    containers: snapshots,
                    error: None,
                }
            }
            Err(err) => StatusReply {
                status: "error".to_string(),
                message: "error checking service status".to_string(),
                containers: Vec::new(),
                error: Some(format!("{err:#}")),
            },
        }
    }

    pub fn logs(&self, lines: usize) -> LogsReply {
        match self.inner.controller.fetch_logs(lines) {
            Ok(logs) => LogsReply {
                ok: true,
                message: format!("last {lines} lines of service logs"),
                logs,
            },
            Err(err) => LogsReply {
                ok: false,
                message: format!("failed to fetch service logs: {err:#}"),
                logs: String::new(),
            },
        }
    }

    pub fn uptime_stats(&self) -> UptimeStatsReply {
        let stats = self.inner.recorder.stats();
        let mut manual_starts = 0u64;
        let mut auto_starts = 0u64;
        let mut manual_stops = 0u64;
        let mut auto_stops = 0u64;

        match self.inner.recorder.event_lines() {
            Ok(lines) => {
                for raw in &lines {
                    let Some(line) = replay::parse_log_line(raw) else {
                        continue;
                    };
                    match line.kind.as_str() {
                        "SERVICE_START" | "SERVICE_START_CONFIRMED" => {
                            if line.reason.starts_with("manual_start") {
                                manual_starts += 1;
                            } else if line.reason == "auto_detected" {
                                auto_starts += 1;
                            }
                        }
                        "SERVICE_STOP" => {
                            if line.reason == "manual_stop" {
                                manual_stops += 1;
                            } else if line.reason == "auto_detected" {
                                auto_stops += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Err(err) => {
                return UptimeStatsReply {
                    ok: false,
                    message: format!("failed to read events log: {err:#}"),
                    total_starts: stats.total_starts,
                    manual_starts: 0,
                    auto_starts: 0,
                    manual_stops: 0,
                    auto_stops: 0,
                    last_start: stats.last_start,
                    last_stop: stats.last_stop,
                    daily: Vec::new(),
                };
            }
        }

        let today = util::now_local();
        let daily = (0..7)
            .map(|offset| {
                let date = util::day_key(today - chrono::Duration::days(offset));
                DailyStarts {
                    starts: stats.daily.get(&date).copied().unwrap_or(0),
                    date,
                }
            })
            .collect();

        UptimeStatsReply {
            ok: true,
            message: "service uptime statistics".to_string(),
            total_starts: stats.total_starts,
            manual_starts,
            auto_starts,
            manual_stops,
            auto_stops,
            last_start: stats.last_start,
            last_stop: stats.last_stop,
            daily,
        }
    }

    pub fn uptime_log(&self, lines: usize) -> UptimeLogReply {
        match self.inner.recorder.recent_event_lines(lines) {
            Ok(recent) => UptimeLogReply {
                ok: true,
                message: format!("last {} uptime events", recent.len()),
                lines: recent,
            },
            Err(err) => UptimeLogReply {
                ok: false,
                message: format!("failed to read events log: {err:#}"),
                lines: Vec::new(),
            },
        }
    }

    pub fn historic_uptime(&self) -> HistoricUptimeReply {
        let sessions = self.inner.recorder.sessions();
        if sessions.is_empty() {
            return HistoricUptimeReply {
                ok: true,
                message: "no historic session data available yet".to_string(),
                total_uptime_hours: 0.0,
                total_sessions: 0,
                average_session_hours: 0.0,
                longest_session_hours: 0.0,
                uptime_by_day: BTreeMap::new(),
            };
        }

        let total_sessions = sessions.len();
        let total_uptime_hours: f64 = sessions.iter().map(|s| s.duration_hours).sum();
        let longest_session_hours = sessions
            .iter()
            .map(|s| s.duration_hours)
            .fold(0.0_f64, f64::max);
        let average_session_hours = total_uptime_hours / total_sessions as f64;

        let mut uptime_by_day: BTreeMap<String, f64> = BTreeMap::new();
        for session in &sessions {
            let Some(start) = util::parse_timestamp(&session.start) else {
                continue;
            };
            let entry = uptime_by_day.entry(util::day_key(start)).or_insert(0.0);
            *entry = round2(*entry + session.duration_hours);
        }

        HistoricUptimeReply {
            ok: true,
            message: "historic uptime statistics".to_string(),
            total_uptime_hours: round2(total_uptime_hours),
            total_sessions,
            average_session_hours: round2(average_session_hours),
            longest_session_hours: round2(longest_session_hours),
            uptime_by_day,
        }
    }

    pub fn monitoring_status(&self) -> MonitoringStatusReply {
        let monitor_running = relock(self.inner.monitor_handle.lock())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());

        let mut auto_detected_events = 0u64;
        match self.inner.recorder.event_lines() {
            Ok(lines) => {
                for raw in &lines {
                    if let Some(line) = replay::parse_log_line(raw)
                        && line.reason == "auto_detected"
                    {
                        auto_detected_events += 1;
                    }
                }
            }
            Err(err) => {
                return MonitoringStatusReply {
                    ok: false,
                    message: format!("failed to read events log: {err:#}"),
                    monitor_running,
                    check_interval_secs: self.inner.config.monitor.interval_secs,
                    last_known_status: "unknown".to_string(),
                    auto_detected_events: 0,
                    current_session_active: false,
                };
            }
        }

        let st = self.inner.lock_state();
        MonitoringStatusReply {
            ok: true,
            message: "monitoring status".to_string(),
            monitor_running,
            check_interval_secs: self.inner.config.monitor.interval_secs,
            last_known_status: match st.last_known_running {
                Some(true) => "running".to_string(),
                _ => "stopped".to_string(),
            },
            auto_detected_events,
            current_session_active: st.current_session_start.is_some(),
        }
    }

    #[cfg(test)]
    fn inner(&self) -> &Arc<ManagerInner> {
        &self.inner
    }
}

impl ManagerInner {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        relock(self.state.lock())
    }

    fn start_pending(&self) -> bool {
        self.lock_state().start_pending
    }

    /// Clear the pending flag, returning whether this call owned it. Keeps
    /// the one-terminal-outcome-per-attempt guarantee.
    fn take_start_pending(&self) -> bool {
        let mut st = self.lock_state();
        if st.start_pending {
            st.start_pending = false;
            st.start_requested_at = None;
            true
        } else {
            false
        }
    }

    fn monitor_loop(inner: Arc<ManagerInner>) {
        let interval = Duration::from_secs(inner.config.monitor.interval_secs);
        loop {
            if inner.stop.is_triggered() {
                break;
            }
            inner.run_cycle(util::now_local());
            if inner.stop.wait_timeout(interval) {
                break;
            }
        }
    }

    /// One debounce/transition cycle: sample, classify, compare against the
    /// last known state, and flush the resulting log/stats/event actions
    /// outside the state lock.
    fn run_cycle(&self, now: NaiveDateTime) -> CycleOutcome {
        let snapshots = self.controller.query_snapshot();
        let agg = health::aggregate(&snapshots);
        let grace = self.config.monitor.health_grace_secs;

        let mut steps: Vec<CycleStep> = Vec::new();
        let effective;
        {
            let mut st = self.lock_state();
            st.unhealthy_since = health::track_unhealthy_since(st.unhealthy_since, agg.health, now);
            effective = health::effective_health(agg.health, st.unhealthy_since, now, grace);

            if let Some(last_running) = st.last_known_running
                && last_running != agg.any_running
            {
                if agg.any_running {
                    if st.current_session_start.is_none() {
                        st.current_session_start = Some(now);
                    }
                    steps.push(CycleStep::Record(LogEventKind::ServiceStart, "auto_detected"));
                    steps.push(CycleStep::Stats(StatsAction::Start));
                    steps.push(CycleStep::Emit(Event::with_containers(
                        EventKind::ServerStart,
                        "service started (auto-detected)",
                        snapshots.clone(),
                    )));
                } else {
                    if let Some(start) = st.current_session_start.take() {
                        steps.push(CycleStep::CloseSession { start, end: now });
                    }
                    steps.push(CycleStep::Record(LogEventKind::ServiceStop, "auto_detected"));
                    steps.push(CycleStep::Stats(StatsAction::Stop));
                    steps.push(CycleStep::Emit(Event::with_containers(
                        EventKind::ServerStop,
                        "service stopped (auto-detected)",
                        snapshots.clone(),
                    )));
                }
            }

            if st.last_effective_health != Some(effective) {
                match effective {
                    ConsolidatedHealth::Unhealthy => {
                        steps.push(CycleStep::Record(
                            LogEventKind::ServiceHealthIssue,
                            "unhealthy_persisted",
                        ));
                        steps.push(CycleStep::Emit(Event::with_containers(
                            EventKind::HealthUnhealthy,
                            "service health: unhealthy (persisted beyond grace window)",
                            snapshots.clone(),
                        )));
                    }
                    ConsolidatedHealth::Running => {
                        steps.push(CycleStep::Emit(Event::with_containers(
                            EventKind::HealthOk,
                            "service health: ok (running)",
                            snapshots.clone(),
                        )));
                    }
                    _ => {}
                }
            }

            st.last_effective_health = Some(effective);
            st.last_known_running = Some(agg.any_running);
        }

        for step in steps {
            match step {
                CycleStep::Record(kind, reason) => self.recorder.append_event(kind, reason),
                CycleStep::CloseSession { start, end } => {
                    self.recorder
                        .record_session(start, end, "auto_detected", "auto_detected");
                }
                CycleStep::Stats(action) => self.recorder.update_stats(action, now),
                CycleStep::Emit(event) => self.bus.dispatch(&event),
            }
        }

        CycleOutcome {
            snapshots,
            any_running: agg.any_running,
            health: agg.health,
            effective_health: effective,
        }
    }

    /// Supervise one start attempt to exactly one terminal outcome:
    /// confirmation, fast failure, or deadline timeout.
    fn run_start_watcher(&self) {
        let start_cfg = &self.config.start;
        let started = Instant::now();
        let deadline = Duration::from_secs(start_cfg.timeout_secs);
        let early_fail_window = Duration::from_secs(start_cfg.early_fail_window_secs);
        let settle = Duration::from_secs(start_cfg.settle_secs);
        let poll = Duration::from_secs(start_cfg.poll_interval_secs);

        while self.start_pending() && started.elapsed() < deadline {
            let snapshots = self.controller.query_snapshot();
            let now = util::now_local();

            if snapshots.iter().any(ContainerSnapshot::is_exited) {
                self.fail_start(
                    "container_exited_during_start",
                    "service failed to start (container exited during start)".to_string(),
                    snapshots,
                );
                return;
            }

            if snapshots.is_empty() && started.elapsed() >= early_fail_window {
                self.fail_start(
                    "no_containers_after_start",
                    format!(
                        "service did not start (no containers present after {}s)",
                        start_cfg.early_fail_window_secs
                    ),
                    snapshots,
                );
                return;
            }

            let any_running = snapshots.iter().any(ContainerSnapshot::is_running);
            let blocked = snapshots
                .iter()
                .any(|s| s.is_unhealthy() || s.is_starting());
            if any_running
                && !blocked
                && started.elapsed() >= settle
                && self.probe_ready()
            {
                self.confirm_start(snapshots, now);
                return;
            }

            thread::sleep(poll);
        }

        if self.take_start_pending() {
            self.recorder
                .append_event(LogEventKind::StartFailed, "manual_start_timeout");
            self.bus.dispatch(&Event::with_containers(
                EventKind::ManualStartFailed,
                format!(
                    "service did not become healthy within {}s",
                    start_cfg.timeout_secs
                ),
                self.controller.query_snapshot(),
            ));
        }
    }

    /// Independent readiness re-check using the same criteria as the status
    /// query: any container running and nothing unhealthy or starting.
    fn probe_ready(&self) -> bool {
        let snapshots = self.controller.query_snapshot();
        if snapshots.is_empty() {
            return false;
        }
        let agg = health::aggregate(&snapshots);
        agg.any_running && agg.health == ConsolidatedHealth::Running
    }

    fn confirm_start(&self, containers: Vec<ContainerSnapshot>, now: NaiveDateTime) {
        let opened = {
            let mut st = self.lock_state();
            st.start_pending = false;
            st.start_requested_at = None;
            if st.current_session_start.is_none() {
                st.current_session_start = Some(now);
                true
            } else {
                // Raced with auto-detection: the session already exists,
                // leave it and the stats untouched.
                false
            }
        };

        if opened {
            self.recorder
                .append_event(LogEventKind::ServiceStartConfirmed, "manual_start_confirmed");
            self.recorder.update_stats(StatsAction::Start, now);
            self.bus.dispatch(&Event::with_containers(
                EventKind::ManualStartConfirmed,
                "service started successfully",
                containers,
            ));
        } else {
            self.recorder
                .append_event(LogEventKind::ServiceStart, "manual_start_ignored_duplicate");
            self.bus.dispatch(&Event::with_containers(
                EventKind::ManualStartDuplicate,
                "service already running; duplicate start ignored",
                containers,
            ));
        }
    }

    fn fail_start(&self, reason: &'static str, message: String, containers: Vec<ContainerSnapshot>) {
        if !self.take_start_pending() {
            return;
        }
        self.recorder.append_event(LogEventKind::StartFailed, reason);
        self.bus.dispatch(&Event::with_containers(
            EventKind::ManualStartFailed,
            message,
            containers,
        ));
    }

    fn run_status_probe(&self, snapshots: &[ContainerSnapshot]) -> Option<String> {
        let probe = &self.config.service.status_probe;
        if probe.is_empty() {
            return None;
        }
        let service = self
            .config
            .service
            .exec_service
            .clone()
            .or_else(|| snapshots.first().map(|s| s.service.clone()))?;
        let output = self.controller.exec_in_service(&service, probe);
        Some(util::truncate_with_ellipsis(&output, 1000))
    }
}

fn command_failure(verb: &str, out: &CommandOutput) -> String {
    format!(
        "{verb} command failed (exit {}): {}",
        out.exit_code
            .map_or_else(|| "signal".to_string(), |code| code.to_string()),
        out.stderr.trim()
    )
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
