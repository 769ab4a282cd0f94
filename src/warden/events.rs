use crate::compose::ContainerSnapshot;
use crate::warden::warn::{self, WarnEvent};
use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ServerStart,
    ServerStop,
    HealthUnhealthy,
    HealthOk,
    ManualStartConfirmed,
    ManualStartDuplicate,
    ManualStartFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ServerStart => "server_start",
            EventKind::ServerStop => "server_stop",
            EventKind::HealthUnhealthy => "health_unhealthy",
            EventKind::HealthOk => "health_ok",
            EventKind::ManualStartConfirmed => "manual_start_confirmed",
            EventKind::ManualStartDuplicate => "manual_start_duplicate",
            EventKind::ManualStartFailed => "manual_start_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerSnapshot>>,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            containers: None,
        }
    }

    pub fn with_containers(
        kind: EventKind,
        message: impl Into<String>,
        containers: Vec<ContainerSnapshot>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            containers: Some(containers),
        }
    }
}

/// Single-method listener seam for the notification collaborator. Slow
/// listeners must offload blocking work themselves; dispatch is synchronous.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<()>;
}

/// Order-preserving, duplicate-free listener registry. Listener identity is
/// `Arc` pointer identity, so registering the same handle twice is a no-op.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Arc<dyn EventListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, listener: Arc<dyn EventListener>) {
        let mut listeners = self.lock_listeners();
        if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn unregister(&self, listener: &Arc<dyn EventListener>) {
        self.lock_listeners()
            .retain(|known| !Arc::ptr_eq(known, listener));
    }

    /// Invoke every listener in registration order. A failing listener is
    /// logged and never suppresses delivery to the rest.
    pub fn dispatch(&self, event: &Event) {
        let listeners = self.lock_listeners().clone();
        for listener in listeners {
            if let Err(err) = listener.on_event(event) {
                warn::emit(WarnEvent {
                    code: "LISTENER_FAILED",
                    stage: "dispatch",
                    action: "on-event",
                    service: "na",
                    path: "na",
                    retry: "none",
                    reason: event.kind.as_str(),
                    err: &format!("{err:#}"),
                });
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock_listeners().len()
    }
}
