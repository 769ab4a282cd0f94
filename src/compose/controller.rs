use crate::error::WardenError;
use crate::warden::util::run_command_with_optional_timeout;
use crate::warden::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const COMPOSE_COMMAND_TIMEOUT_SECS: u64 = 60;

const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Point-in-time report of one container unit, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSnapshot {
    pub service: String,
    pub state: String,
    pub health: String,
}

impl ContainerSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn is_exited(&self) -> bool {
        self.state.contains("exited") || self.state.contains("dead")
    }

    pub fn is_unhealthy(&self) -> bool {
        self.health.contains("unhealthy")
    }

    pub fn is_starting(&self) -> bool {
        self.health.contains("starting") || self.state.contains("starting")
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// The external process-control collaborator. The monitor, the start
/// watcher, and the query surface all go through this seam; tests script it.
pub trait ProcessControl: Send + Sync {
    fn query_snapshot_checked(&self) -> Result<Vec<ContainerSnapshot>>;

    /// Tolerant snapshot query: any failure degrades to "no containers" so a
    /// broken tool reads as a stopped service instead of crashing the monitor.
    fn query_snapshot(&self) -> Vec<ContainerSnapshot> {
        match self.query_snapshot_checked() {
            Ok(snapshots) => snapshots,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "SAMPLER_FAILED",
                    stage: "sampler",
                    action: "query-snapshot",
                    service: "na",
                    path: "na",
                    retry: "retry-next-poll",
                    reason: "snapshot-query-failed",
                    err: &format!("{err:#}"),
                });
                Vec::new()
            }
        }
    }

    fn issue_start(&self) -> Result<CommandOutput>;

    fn issue_stop(&self) -> Result<CommandOutput>;

    fn fetch_logs(&self, lines: usize) -> Result<String>;

    /// Best-effort exec inside `service`; failures degrade to empty output.
    fn exec_in_service(&self, service: &str, command: &[String]) -> String;
}

fn ensure_executable_path(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("docker binary path does not exist: {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("docker binary path is not a file: {}", path.display());
    }
    Ok(())
}

fn resolve_docker_bin() -> Result<String> {
    if let Ok(custom) = env::var("WARDEN_DOCKER_BIN") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            ensure_executable_path(Path::new(trimmed))?;
            return Ok(trimmed.to_string());
        }
    }

    let found = which::which("docker")
        .map_err(|err| WardenError::MissingDockerBinary(err.to_string()))?;
    Ok(found.to_string_lossy().to_string())
}

pub fn docker_available() -> bool {
    resolve_docker_bin().is_ok()
}

/// Strip 7-bit ANSI escape sequences from tool output before it is relayed
/// into status messages.
pub fn strip_ansi_codes(input: &str) -> String {
    match Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])") {
        Ok(re) => re.replace_all(input, "").into_owned(),
        Err(_) => input.to_string(),
    }
}

fn snapshot_from_value(value: &Value) -> Option<ContainerSnapshot> {
    let obj = value.as_object()?;
    let lower_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase()
    };
    let service = obj
        .get("Service")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    Some(ContainerSnapshot {
        service,
        state: lower_field("State"),
        health: lower_field("Health"),
    })
}

/// `docker compose ps --format json` emits either a JSON array or one JSON
/// object per line depending on the compose version. Unparsable records are
/// skipped independently rather than failing the whole query.
pub fn parse_snapshot_output(raw: &str) -> Vec<ContainerSnapshot> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(data) = serde_json::from_str::<Value>(trimmed) {
        let records = match data {
            Value::Array(items) => items,
            other => vec![other],
        };
        return records.iter().filter_map(snapshot_from_value).collect();
    }

    trimmed
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            serde_json::from_str::<Value>(line)
                .ok()
                .as_ref()
                .and_then(snapshot_from_value)
        })
        .collect()
}

pub struct ComposeController {
    compose_dir: PathBuf,
}

impl ComposeController {
    pub fn new(compose_dir: impl Into<PathBuf>) -> Result<Self> {
        let compose_dir = compose_dir.into();
        if !compose_dir.exists() {
            anyhow::bail!(WardenError::InvalidComposeDir(format!(
                "directory does not exist: {}",
                compose_dir.display()
            )));
        }
        if !COMPOSE_FILE_NAMES
            .iter()
            .any(|name| compose_dir.join(name).exists())
        {
            anyhow::bail!(WardenError::InvalidComposeDir(format!(
                "no compose file found in {}",
                compose_dir.display()
            )));
        }
        Ok(Self { compose_dir })
    }

    fn run_compose(&self, args: &[&str]) -> Result<CommandOutput> {
        let bin = resolve_docker_bin()?;
        let mut cmd = Command::new(&bin);
        cmd.arg("compose").args(args).current_dir(&self.compose_dir);
        let output =
            run_command_with_optional_timeout(&mut cmd, Some(COMPOSE_COMMAND_TIMEOUT_SECS))
                .with_context(|| format!("failed to run `{bin} compose {}`", args.join(" ")))?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

impl ProcessControl for ComposeController {
    fn query_snapshot_checked(&self) -> Result<Vec<ContainerSnapshot>> {
        let out = self.run_compose(&["ps", "--format", "json"])?;
        if !out.success {
            anyhow::bail!(
                "docker compose ps failed (exit {:?}): {}",
                out.exit_code,
                out.stderr.trim()
            );
        }
        Ok(parse_snapshot_output(&out.stdout))
    }

    fn issue_start(&self) -> Result<CommandOutput> {
        self.run_compose(&["up", "-d"])
    }

    fn issue_stop(&self) -> Result<CommandOutput> {
        self.run_compose(&["down"])
    }

    fn fetch_logs(&self, lines: usize) -> Result<String> {
        let tail = lines.to_string();
        let out = self.run_compose(&["logs", "--tail", &tail])?;
        if !out.success {
            anyhow::bail!(
                "docker compose logs failed (exit {:?}): {}",
                out.exit_code,
                out.stderr.trim()
            );
        }
        Ok(out.stdout)
    }

    fn exec_in_service(&self, service: &str, command: &[String]) -> String {
        let mut args = vec!["exec", "-T", service];
        args.extend(command.iter().map(String::as_str));
        match self.run_compose(&args) {
            Ok(out) if out.success => strip_ansi_codes(&out.stdout),
            Ok(out) => {
                warn::emit(WarnEvent {
                    code: "EXEC_FAILED",
                    stage: "controller",
                    action: "exec-in-service",
                    service,
                    path: "na",
                    retry: "none",
                    reason: "exec-nonzero-exit",
                    err: out.stderr.trim(),
                });
                String::new()
            }
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "EXEC_FAILED",
                    stage: "controller",
                    action: "exec-in-service",
                    service,
                    path: "na",
                    retry: "none",
                    reason: "exec-spawn-failed",
                    err: &format!("{err:#}"),
                });
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContainerSnapshot, parse_snapshot_output, strip_ansi_codes};

    fn snapshot(service: &str, state: &str, health: &str) -> ContainerSnapshot {
        ContainerSnapshot {
            service: service.to_string(),
            state: state.to_string(),
            health: health.to_string(),
        }
    }

    #[test]
    fn parses_json_array_output() {
        let raw = r#"[
            {"Service":"app","State":"Running","Health":"Healthy"},
            {"Service":"db","State":"exited","Health":""}
        ]"#;
        let parsed = parse_snapshot_output(raw);
        assert_eq!(
            parsed,
            vec![
                snapshot("app", "running", "healthy"),
                snapshot("db", "exited", ""),
            ]
        );
    }

    #[test]
    fn parses_one_object_per_line_and_skips_garbage() {
        let raw = concat!(
            "{\"Service\":\"app\",\"State\":\"running\",\"Health\":\"starting\"}\n",
            "not json at all\n",
            "{\"Service\":\"db\",\"State\":\"running\",\"Health\":\"unhealthy\"}\n",
        );
        let parsed = parse_snapshot_output(raw);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_starting());
        assert!(parsed[1].is_unhealthy());
    }

    #[test]
    fn single_object_is_normalized_to_one_snapshot() {
        let parsed = parse_snapshot_output(r#"{"Service":"app","State":"running"}"#);
        assert_eq!(parsed, vec![snapshot("app", "running", "")]);
    }

    #[test]
    fn empty_or_hopeless_output_yields_no_snapshots() {
        assert!(parse_snapshot_output("").is_empty());
        assert!(parse_snapshot_output("   \n  ").is_empty());
        assert!(parse_snapshot_output("total garbage").is_empty());
    }

    #[test]
    fn missing_fields_default_rather_than_fail() {
        let parsed = parse_snapshot_output(r#"{"State":"running"}"#);
        assert_eq!(parsed, vec![snapshot("unknown", "running", "")]);
    }

    #[test]
    fn snapshot_predicates_match_compose_vocabulary() {
        assert!(snapshot("a", "running", "").is_running());
        assert!(snapshot("a", "exited (0)", "").is_exited());
        assert!(snapshot("a", "dead", "").is_exited());
        assert!(snapshot("a", "running", "unhealthy").is_unhealthy());
        assert!(!snapshot("a", "running", "healthy").is_unhealthy());
        assert!(snapshot("a", "running", "health: starting").is_starting());
        assert!(snapshot("a", "starting", "").is_starting());
    }

    #[test]
    fn strip_ansi_codes_removes_color_sequences() {
        let colored = "\x1b[32mok\x1b[0m players: \x1b[1m3\x1b[0m";
        assert_eq!(strip_ansi_codes(colored), "ok players: 3");
    }
}
