use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use accumulator::SessionAccumulator;
use events::ReplaySummary;
use report::{EcoReport, NO_DATA_MESSAGE, ReportClock, query_report, render_report, session_report};

mod accumulator;
mod config;
mod debug_log;
mod estimate;
mod events;
mod grade;
mod intern;
mod mcp;
mod models;
mod report;
mod types;
mod utils;
mod watcher;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "ecotrail")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use comma-separated number formatting
    #[arg(long, global = true)]
    number_comma: bool,

    /// Use human-readable number formatting (k, m, b, t)
    #[arg(short = 'H', long, global = true)]
    number_human: bool,

    /// Locale for number formatting (en, de, fr, es, it, ja, ko, zh)
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Number of decimal places for human-readable formatting
    #[arg(long, global = true)]
    decimal_places: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an event log and print carbon reports
    Report(ReportArgs),
    /// Follow a growing event log and reprint the report as events arrive
    Watch(WatchArgs),
    /// Run as an MCP (Model Context Protocol) server
    Mcp,
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// Newline-delimited JSON event log; reads stdin when omitted
    #[arg(long)]
    events: Option<PathBuf>,

    /// Only report on this session
    #[arg(long)]
    session: Option<String>,

    /// Output the report figures as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct WatchArgs {
    /// Event log to follow
    file: PathBuf,

    /// Only report on this session
    #[arg(long)]
    session: Option<String>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key (grid-intensity, clamp-negative-deltas, session-ttl-minutes, number-comma, number-human, locale, decimal-places)
        key: String,
        /// Configuration value
        value: String,
    },
}

/// Settings shared by the report-producing subcommands.
struct ReportContext {
    config: config::Config,
    grid_intensity: f64,
    format_options: utils::NumberFormatOptions,
}

#[derive(Serialize)]
struct SessionReport<'a> {
    session_id: &'a str,
    #[serde(flatten)]
    report: EcoReport,
}

#[tokio::main]
async fn main() {
    debug_log::init();

    let cli = Cli::parse();

    // Load config file to get defaults
    let config = match config::Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            utils::warn_once(format!("Warning: ignoring config file: {e:#}"));
            config::Config::default()
        }
    };

    // Create format options merging config defaults with CLI overrides
    let format_options = utils::NumberFormatOptions {
        use_comma: cli.number_comma || config.formatting.number_comma,
        use_human: cli.number_human || config.formatting.number_human,
        locale: cli.locale.unwrap_or_else(|| config.formatting.locale.clone()),
        decimal_places: cli
            .decimal_places
            .unwrap_or(config.formatting.decimal_places),
    };

    let ctx = ReportContext {
        grid_intensity: config.effective_grid_intensity(),
        config,
        format_options,
    };
    debug_log::log(
        "MAIN",
        "start",
        &format!("grid intensity {} gCO2/kWh", ctx.grid_intensity),
    );

    match cli.command {
        Commands::Report(args) => {
            if let Err(e) = run_report(args, &ctx) {
                eprintln!("Error generating report: {e:#}");
                std::process::exit(1);
            }
        }
        Commands::Watch(args) => {
            if let Err(e) = run_watch(args, &ctx) {
                eprintln!("Error watching event log: {e:#}");
                std::process::exit(1);
            }
        }
        Commands::Mcp => {
            if let Err(e) = mcp::run_mcp_server(&ctx.config, ctx.format_options.clone()).await {
                eprintln!("MCP server error: {e:#}");
                std::process::exit(1);
            }
        }
        Commands::Config(config_args) => {
            handle_config_subcommand(config_args);
        }
    }
}

fn run_report(args: ReportArgs, ctx: &ReportContext) -> Result<()> {
    let accumulator = SessionAccumulator::with_policy(ctx.config.negative_delta_policy());

    let summary = match &args.events {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open event log {}", path.display()))?;
            events::replay_events(BufReader::new(file), &accumulator)?
        }
        None => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                anyhow::bail!("No event log given. Pass --events FILE or pipe events on stdin");
            }
            events::replay_events(stdin.lock(), &accumulator)?
        }
    };
    report_skipped_lines(&summary);

    // A replayed log is reported as it stood at its last event
    if args.json {
        let json = render_json(&accumulator, args.session.as_deref(), ReportClock::LastEvent, ctx)?;
        println!("{json}");
    } else {
        let text = render_text(&accumulator, args.session.as_deref(), ReportClock::LastEvent, ctx);
        println!("{text}");
    }

    Ok(())
}

fn run_watch(args: WatchArgs, ctx: &ReportContext) -> Result<()> {
    let accumulator = SessionAccumulator::with_policy(ctx.config.negative_delta_policy());
    let file_watcher = watcher::FileWatcher::new(&args.file)?;
    let mut tailer = watcher::EventLogTailer::new(&args.file);

    let summary = tailer.poll(&accumulator)?;
    report_skipped_lines(&summary);
    println!("{}", live_report(&accumulator, args.session.as_deref(), ctx));
    eprintln!("👀 Watching {} (Ctrl-C to stop)", tailer.path().display());

    loop {
        let Some(first) = file_watcher.recv_timeout(Duration::from_secs(1)) else {
            evict_idle(&accumulator, ctx);
            continue;
        };

        // Editors and loggers emit bursts of events; handle them as one change
        let mut changed = false;
        let mut pending = Some(first);
        while let Some(event) = pending {
            match event {
                watcher::WatcherEvent::LogChanged => changed = true,
                watcher::WatcherEvent::LogRemoved => tailer.reset(),
                watcher::WatcherEvent::Error(e) => utils::warn_once(format!("Warning: {e}")),
            }
            pending = file_watcher.try_recv();
        }

        if changed {
            let summary = tailer.poll(&accumulator)?;
            report_skipped_lines(&summary);
            if summary.recorded > 0 || summary.sessions_ended > 0 {
                println!("{}", live_report(&accumulator, args.session.as_deref(), ctx));
            }
        }
        evict_idle(&accumulator, ctx);
    }
}

fn evict_idle(accumulator: &SessionAccumulator, ctx: &ReportContext) {
    if let Some(ttl) = ctx.config.session_ttl() {
        let evicted = accumulator.evict_idle(ttl, Utc::now());
        if evicted > 0 {
            debug_log::log(
                "MAIN",
                "evict",
                &format!("{evicted} idle, {} still tracked", accumulator.len()),
            );
        }
    }
}

fn report_skipped_lines(summary: &ReplaySummary) {
    if summary.malformed > 0 {
        eprintln!(
            "⚠️  Skipped {} undecodable event line(s)",
            summary.malformed
        );
    }
}

/// Reports for a log that is still being written, timed against the wall clock.
fn live_report(accumulator: &SessionAccumulator, session: Option<&str>, ctx: &ReportContext) -> String {
    match session {
        Some(id) => query_report(accumulator, id, ctx.grid_intensity, &ctx.format_options),
        None => render_text(accumulator, None, ReportClock::Now, ctx),
    }
}

/// Session ids to report on: the requested one, or every known session.
fn selected_sessions(accumulator: &SessionAccumulator, session: Option<&str>) -> Vec<String> {
    match session {
        Some(id) => vec![id.to_string()],
        None => accumulator.session_ids(),
    }
}

/// Markdown reports for one session, or for every session with data.
fn render_text(
    accumulator: &SessionAccumulator,
    session: Option<&str>,
    clock: ReportClock,
    ctx: &ReportContext,
) -> String {
    if accumulator.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }

    let reports: Vec<(String, EcoReport)> = selected_sessions(accumulator, session)
        .into_iter()
        .filter_map(|id| {
            let report = session_report(accumulator, &id, ctx.grid_intensity, clock)?;
            Some((id, report))
        })
        .collect();

    match reports.as_slice() {
        [] => NO_DATA_MESSAGE.to_string(),
        [(_, report)] if session.is_some() => render_report(report, &ctx.format_options),
        _ => reports
            .iter()
            .map(|(id, report)| {
                format!(
                    "# Session {id}\n\n{}",
                    render_report(report, &ctx.format_options)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn render_json(
    accumulator: &SessionAccumulator,
    session: Option<&str>,
    clock: ReportClock,
    ctx: &ReportContext,
) -> Result<String> {
    let session_ids = selected_sessions(accumulator, session);
    let reports: Vec<SessionReport> = session_ids
        .iter()
        .filter_map(|id| {
            Some(SessionReport {
                session_id: id,
                report: session_report(accumulator, id, ctx.grid_intensity, clock)?,
            })
        })
        .collect();

    simd_json::to_string_pretty(&reports).context("Failed to serialize reports")
}

fn handle_config_subcommand(config_args: ConfigArgs) {
    match config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => {
            if let Err(e) = config::create_default_config(overwrite) {
                eprintln!("Error creating config: {e:#}");
                std::process::exit(1);
            }
        }
        ConfigSubcommands::Show => {
            if let Err(e) = config::show_config() {
                eprintln!("Error showing config: {e:#}");
                std::process::exit(1);
            }
        }
        ConfigSubcommands::Set { key, value } => {
            if let Err(e) = config::set_config_value(&key, &value) {
                eprintln!("Error setting config: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
