use crate::error::WardenError;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Directory holding the compose file the managed service runs from.
    pub compose_dir: String,
    /// Service to target with `exec` probes; detected from the first
    /// snapshot when unset.
    pub exec_service: Option<String>,
    /// Optional command run inside the exec service when status reports
    /// running; its output is appended to the status message.
    pub status_probe: Vec<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            compose_dir: ".".to_string(),
            exec_service: None,
            status_probe: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub interval_secs: u64,
    pub health_grace_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            health_grace_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartSection {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    /// Minimum delay between the start request and a confirmable poll.
    pub settle_secs: u64,
    /// Zero containers persisting past this window fails the start early.
    pub early_fail_window_secs: u64,
}

impl Default for StartSection {
    fn default() -> Self {
        Self {
            timeout_secs: 360,
            poll_interval_secs: 5,
            settle_secs: 5,
            early_fail_window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    pub service: ServiceSection,
    pub monitor: MonitorSection,
    pub start: StartSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialWardenConfig {
    service: Option<ServiceSection>,
    monitor: Option<MonitorSection>,
    start: Option<StartSection>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_opt_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_words(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split_whitespace()
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() { fallback.to_vec() } else { out }
        }
        Err(_) => fallback.to_vec(),
    }
}

fn validate(cfg: &WardenConfig) -> Result<()> {
    if cfg.service.compose_dir.trim().is_empty() {
        return Err(anyhow!("invalid compose dir: cannot be empty"));
    }
    if cfg.monitor.interval_secs == 0 {
        return Err(anyhow!("invalid monitor interval: must be >= 1 second"));
    }
    if cfg.start.timeout_secs == 0 {
        return Err(anyhow!("invalid start timeout: must be >= 1 second"));
    }
    if cfg.start.poll_interval_secs == 0 {
        return Err(anyhow!("invalid start poll interval: must be >= 1 second"));
    }
    if cfg.start.poll_interval_secs > cfg.start.timeout_secs {
        return Err(anyhow!(
            "invalid start windows: require poll_interval_secs <= timeout_secs"
        ));
    }
    if cfg.start.early_fail_window_secs > cfg.start.timeout_secs {
        return Err(anyhow!(
            "invalid start windows: require early_fail_window_secs <= timeout_secs"
        ));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("WARDEN_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    if let Ok(home_override) = env::var("WARDEN_HOME") {
        let trimmed = home_override.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed).join("warden.toml"));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".warden").join("warden.toml"))
}

fn merge_file_config(base: &mut WardenConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialWardenConfig = toml::from_str(&raw).map_err(|err| {
        anyhow!(WardenError::InvalidConfig(format!(
            "{}: {err}",
            path.display()
        )))
    })?;
    if let Some(service) = parsed.service {
        base.service = service;
    }
    if let Some(monitor) = parsed.monitor {
        base.monitor = monitor;
    }
    if let Some(start) = parsed.start {
        base.start = start;
    }
    Ok(())
}

pub fn load_config() -> Result<WardenConfig> {
    let mut cfg = WardenConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.service.compose_dir = env_or_string("WARDEN_COMPOSE_DIR", &cfg.service.compose_dir);
    cfg.service.exec_service = env_or_opt_string("WARDEN_EXEC_SERVICE", cfg.service.exec_service);
    cfg.service.status_probe = env_or_words("WARDEN_STATUS_PROBE", &cfg.service.status_probe);
    cfg.monitor.interval_secs = env_or_u64("WARDEN_MONITOR_INTERVAL_SECS", cfg.monitor.interval_secs);
    cfg.monitor.health_grace_secs =
        env_or_u64("WARDEN_HEALTH_GRACE_SECS", cfg.monitor.health_grace_secs);
    cfg.start.timeout_secs = env_or_u64("WARDEN_START_TIMEOUT_SECS", cfg.start.timeout_secs);
    cfg.start.poll_interval_secs =
        env_or_u64("WARDEN_START_POLL_INTERVAL_SECS", cfg.start.poll_interval_secs);
    cfg.start.settle_secs = env_or_u64("WARDEN_START_SETTLE_SECS", cfg.start.settle_secs);
    cfg.start.early_fail_window_secs = env_or_u64(
        "WARDEN_START_EARLY_FAIL_SECS",
        cfg.start.early_fail_window_secs,
    );

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::{WardenConfig, validate};

    #[test]
    fn default_config_validates() {
        assert!(validate(&WardenConfig::default()).is_ok());
    }

    #[test]
    fn zero_monitor_interval_is_rejected() {
        let mut cfg = WardenConfig::default();
        cfg.monitor.interval_secs = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn poll_interval_longer_than_timeout_is_rejected() {
        let mut cfg = WardenConfig::default();
        cfg.start.timeout_secs = 5;
        cfg.start.poll_interval_secs = 10;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_toml_overrides_only_named_sections() {
        let raw = "[monitor]\ninterval_secs = 15\nhealth_grace_secs = 30\n";
        let parsed: super::PartialWardenConfig = toml::from_str(raw).expect("parse");
        let mut cfg = WardenConfig::default();
        if let Some(monitor) = parsed.monitor {
            cfg.monitor = monitor;
        }
        assert_eq!(cfg.monitor.interval_secs, 15);
        assert_eq!(cfg.start.timeout_secs, 360);
    }
}
