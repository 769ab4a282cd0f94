use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands;

#[derive(Debug, Parser)]
#[command(name = "warden")]
#[command(about = "Compose-service lifecycle manager: monitoring, uptime history, log-replay repair")]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the service and supervise it to confirmation or failure.
    Start(StartArgs),
    /// Stop the service and close the open uptime session.
    Stop,
    /// Show consolidated container status.
    Status,
    /// Show the tail of the service logs.
    Logs(LogsArgs),
    /// Show start/stop counters and the 7-day series.
    UptimeStats,
    /// Show the tail of the append-only events log.
    UptimeLog(UptimeLogArgs),
    /// Aggregate recorded sessions into historic uptime figures.
    HistoricUptime,
    /// Report monitor daemon liveness and auto-detection counters.
    MonitoringStatus,
    /// Run the monitor: one foreground cycle, or --daemon for the loop.
    Watch(WatchArgs),
    /// Rebuild stats and sessions by replaying the events log.
    Reconcile,
}

#[derive(Debug, Args, Default)]
pub struct StartArgs {
    /// Return as soon as the start command is issued instead of waiting
    /// for the watcher's terminal outcome.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct LogsArgs {
    #[arg(long, default_value_t = 20)]
    pub lines: usize,
}

#[derive(Debug, Args)]
pub struct UptimeLogArgs {
    #[arg(long, default_value_t = 10)]
    pub lines: usize,
}

#[derive(Debug, Args, Default)]
pub struct WatchArgs {
    #[arg(long)]
    pub once: bool,
    #[arg(long)]
    pub daemon: bool,
}

fn print_report(report: &commands::CommandReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("command: {}", report.command);
    println!("ok: {}", report.ok);
    if !report.details.is_empty() {
        println!("details:");
        for detail in &report.details {
            println!("- {detail}");
        }
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("- {issue}");
        }
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match &cli.command {
        Command::Start(args) => commands::start::run(&commands::start::StartOptions {
            no_wait: args.no_wait,
        })?,
        Command::Stop => commands::stop::run()?,
        Command::Status => commands::status::run()?,
        Command::Logs(args) => commands::logs::run(args.lines)?,
        Command::UptimeStats => commands::uptime_stats::run()?,
        Command::UptimeLog(args) => commands::uptime_log::run(args.lines)?,
        Command::HistoricUptime => commands::historic_uptime::run()?,
        Command::MonitoringStatus => commands::monitoring_status::run()?,
        Command::Watch(args) => commands::watch::run(&commands::watch::WatchOptions {
            once: args.once,
            daemon: args.daemon,
        })?,
        Command::Reconcile => commands::reconcile::run()?,
    };

    print_report(&report, cli.json)?;

    if report.ok {
        Ok(())
    } else {
        std::process::exit(2);
    }
}
