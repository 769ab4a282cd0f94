use crate::compose::ContainerSnapshot;
use chrono::NaiveDateTime;

/// Single derived health classification across all snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidatedHealth {
    Running,
    Starting,
    Unhealthy,
    Stopped,
}

impl ConsolidatedHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidatedHealth::Running => "running",
            ConsolidatedHealth::Starting => "starting",
            ConsolidatedHealth::Unhealthy => "unhealthy",
            ConsolidatedHealth::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStatus {
    pub any_running: bool,
    pub health: ConsolidatedHealth,
}

/// Collapse a snapshot list into one aggregate. Unhealthy wins over
/// starting, starting over running; no snapshots means stopped.
pub fn aggregate(snapshots: &[ContainerSnapshot]) -> AggregateStatus {
    let any_running = snapshots.iter().any(ContainerSnapshot::is_running);
    let health = if snapshots.iter().any(ContainerSnapshot::is_unhealthy) {
        ConsolidatedHealth::Unhealthy
    } else if snapshots.iter().any(ContainerSnapshot::is_starting) {
        ConsolidatedHealth::Starting
    } else if any_running {
        ConsolidatedHealth::Running
    } else {
        ConsolidatedHealth::Stopped
    };
    AggregateStatus {
        any_running,
        health,
    }
}

/// Advance the unhealthy-since marker for this poll cycle: set on the first
/// unhealthy observation, held while it persists, cleared otherwise.
pub fn track_unhealthy_since(
    previous: Option<NaiveDateTime>,
    health: ConsolidatedHealth,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    match health {
        ConsolidatedHealth::Unhealthy => Some(previous.unwrap_or(now)),
        _ => None,
    }
}

/// Grace window: an unhealthy reading younger than `grace_secs` is reported
/// as starting, suppressing alarms during normal warm-up.
pub fn effective_health(
    health: ConsolidatedHealth,
    unhealthy_since: Option<NaiveDateTime>,
    now: NaiveDateTime,
    grace_secs: u64,
) -> ConsolidatedHealth {
    if health == ConsolidatedHealth::Unhealthy
        && let Some(since) = unhealthy_since
        && now.signed_duration_since(since).num_seconds() < grace_secs as i64
    {
        return ConsolidatedHealth::Starting;
    }
    health
}
