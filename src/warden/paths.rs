use anyhow::Result;
use std::env;
use std::path::PathBuf;

/// Resolved on-disk layout. Every file has an env override so tests (and
/// unusual deployments) can redirect it without touching the defaults.
#[derive(Debug, Clone)]
pub struct WardenPaths {
    pub warden_home: PathBuf,
    pub data_dir: PathBuf,
    pub events_log: PathBuf,
    pub stats_file: PathBuf,
    pub sessions_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

fn warden_home_from_inputs(home: PathBuf, warden_home_env: Option<&str>) -> PathBuf {
    match warden_home_env {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => home.join(".warden"),
    }
}

pub fn resolve_paths() -> Result<WardenPaths> {
    let home = required_home_dir()?;
    let warden_home_env = env::var("WARDEN_HOME").ok();
    let warden_home = warden_home_from_inputs(home, warden_home_env.as_deref());

    let data_dir = env_or_default_path("WARDEN_DATA_DIR", warden_home.clone());
    let events_log = env_or_default_path("WARDEN_EVENTS_LOG", data_dir.join("events.log"));
    let stats_file = env_or_default_path("WARDEN_STATS_FILE", data_dir.join("stats.json"));
    let sessions_file = env_or_default_path("WARDEN_SESSIONS_FILE", data_dir.join("sessions.json"));

    Ok(WardenPaths {
        warden_home,
        data_dir,
        events_log,
        stats_file,
        sessions_file,
    })
}
