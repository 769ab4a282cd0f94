pub mod historic_uptime;
pub mod logs;
pub mod monitoring_status;
pub mod reconcile;
pub mod start;
pub mod status;
pub mod stop;
pub mod uptime_log;
pub mod uptime_stats;
pub mod watch;

use crate::compose::ComposeController;
use crate::warden::config;
use crate::warden::paths;
use crate::warden::service::ServiceManager;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

pub fn build_manager() -> Result<ServiceManager> {
    let config = config::load_config()?;
    let paths = paths::resolve_paths()?;
    let controller = ComposeController::new(&config.service.compose_dir)?;
    Ok(ServiceManager::new(config, paths, Box::new(controller)))
}

pub fn ensure_docker_available(report: &mut CommandReport) -> bool {
    if crate::compose::controller::docker_available() {
        return true;
    }
    report.issue("docker binary unavailable; set WARDEN_DOCKER_BIN or ensure docker is on PATH");
    false
}

/// Build the manager, downgrading expected setup failures (bad config,
/// missing compose dir, no docker binary) into report issues.
pub fn manager_or_issue(report: &mut CommandReport) -> Option<ServiceManager> {
    if !ensure_docker_available(report) {
        return None;
    }
    match build_manager() {
        Ok(manager) => Some(manager),
        Err(err) => {
            report.issue(format!("{err:#}"));
            None
        }
    }
}
