use crate::warden::paths::WardenPaths;
use crate::warden::util::now_epoch_secs;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

pub const DAEMON_LOCK_FILE: &str = "warden.daemon.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonLockPayload {
    pub pid: u32,
    #[serde(default)]
    pub started_at_epoch_secs: u64,
    #[serde(default)]
    pub build_uuid: String,
    #[serde(default)]
    pub warden_home: String,
}

pub fn daemon_lock_path(paths: &WardenPaths) -> PathBuf {
    paths.data_dir.join(DAEMON_LOCK_FILE)
}

/// Take the exclusive daemon lock and stamp it with this process's
/// identity. The returned file must stay open for the daemon's lifetime.
pub fn acquire_daemon_lock(paths: &WardenPaths) -> Result<File> {
    fs::create_dir_all(&paths.data_dir)
        .with_context(|| format!("failed to create {}", paths.data_dir.display()))?;

    let lock_path = daemon_lock_path(paths);
    let mut lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open daemon lock {}", lock_path.display()))?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::WouldBlock => {
            anyhow::bail!(
                "warden monitor daemon already running (lock: {})",
                lock_path.display()
            );
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to lock daemon file {}", lock_path.display()));
        }
    }

    let payload = DaemonLockPayload {
        pid: std::process::id(),
        started_at_epoch_secs: now_epoch_secs().unwrap_or(0),
        build_uuid: env!("BUILD_UUID").to_string(),
        warden_home: paths.warden_home.display().to_string(),
    };

    lock_file
        .set_len(0)
        .with_context(|| format!("failed to truncate daemon lock {}", lock_path.display()))?;
    writeln!(&mut lock_file, "{}", serde_json::to_string(&payload)?)
        .with_context(|| format!("failed to write daemon lock {}", lock_path.display()))?;

    Ok(lock_file)
}

pub fn parse_daemon_lock_payload(raw: &str) -> Option<DaemonLockPayload> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(payload) = serde_json::from_str::<DaemonLockPayload>(trimmed) {
        return Some(payload);
    }

    // Backward compatibility: older lockfiles stored only a PID line.
    let pid = trimmed.lines().next()?.trim().parse::<u32>().ok()?;
    Some(DaemonLockPayload {
        pid,
        started_at_epoch_secs: 0,
        build_uuid: String::new(),
        warden_home: String::new(),
    })
}

pub fn read_daemon_lock_payload(paths: &WardenPaths) -> Result<Option<DaemonLockPayload>> {
    let lock_path = daemon_lock_path(paths);
    if !lock_path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&lock_path)
        .with_context(|| format!("failed to read daemon lock {}", lock_path.display()))?;
    Ok(parse_daemon_lock_payload(&raw))
}
