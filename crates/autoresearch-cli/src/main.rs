use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use autoresearch_core::{
    Config, ConfigLoader, Event, EventCollector, ResearchOptions, RunStatus, TelemetryOptions,
    TraceSummary, build_engine, init_telemetry, remove_session_logs,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::Input;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "autoresearch",
    version,
    about = "Self-correcting multi-step research from the terminal"
)]
struct Cli {
    /// Configuration file (defaults to $AUTORESEARCH_CONFIG or ./autoresearch.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a topic and print the report.
    Run(RunArgs),
    /// Delete every session-log record of a run.
    Forget(ForgetArgs),
    /// Render a persisted trace file.
    Trace(TraceArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Topic to research. Prompted for interactively when omitted.
    #[arg(long)]
    topic: Option<String>,

    /// Retry ceiling per subtopic (overrides `workflow.max_attempts`).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Directory to write `<run_id>.json` / `<run_id>.md` traces into.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Append a redacted record of the run to the session log.
    #[arg(long, default_value_t = false)]
    session_log: bool,

    /// Suppress progress lines.
    #[arg(long, short, default_value_t = false)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ForgetArgs {
    /// Run ID whose records should be removed.
    #[arg(long)]
    run_id: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TraceFormat {
    Markdown,
    Mermaid,
}

#[derive(Args, Debug)]
struct TraceArgs {
    /// Path to a `<run_id>.json` trace.
    #[arg(long)]
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = TraceFormat::Markdown)]
    format: TraceFormat,
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = ConfigLoader::load(cli.config.clone())?;
    init_telemetry(TelemetryOptions {
        env_filter: config.logging.level.clone(),
        with_ansi: true,
    })?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args, config).await,
            Command::Forget(args) => forget_command(args),
            Command::Trace(args) => trace_command(args),
        }
    })
}

async fn run_command(args: RunArgs, config: Config) -> Result<ExitCode> {
    let topic = match args.topic {
        Some(topic) => topic,
        None => Input::<String>::new()
            .with_prompt("Research topic")
            .interact_text()
            .context("failed to read topic")?,
    };
    let max_attempts = args.max_attempts.unwrap_or(config.workflow.max_attempts);

    let engine = build_engine(&config)?;
    let cancel = CancellationToken::new();
    let (events, receiver) = EventCollector::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            ctrl_c.cancel();
        }
    });
    let printer = tokio::spawn(print_progress(receiver, args.quiet));

    let mut options = ResearchOptions::new(&topic)
        .with_max_attempts(max_attempts)
        .with_events(events)
        .with_cancellation(cancel)
        .with_session_log(args.session_log);
    if let Some(dir) = args.trace_dir {
        options = options.with_trace_dir(dir);
    }

    info!(%topic, max_attempts, "starting research run");
    let result = engine.run_with_options(options).await;
    printer.await.ok();

    match result {
        Ok(outcome) => {
            println!("{}", outcome.report);
            if let Some(path) = outcome.trace_path {
                eprintln!("trace written to {}", path.display());
            }
            eprintln!("run id: {}", outcome.run_id);
            Ok(ExitCode::SUCCESS)
        }
        Err(aborted) => {
            eprintln!("error: {aborted}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Drains the progress channel until the engine drops its sender.
async fn print_progress(mut receiver: UnboundedReceiver<Event>, quiet: bool) {
    while let Some(event) = receiver.recv().await {
        if quiet {
            continue;
        }
        match event {
            Event::Transition {
                state,
                subtopic,
                tool,
                ..
            } => match subtopic {
                Some(subtopic) => eprintln!("• {} [{subtopic}]", state.label(tool)),
                None => eprintln!("• {}", state.label(tool)),
            },
            Event::Decision {
                decision,
                attempt_count,
                ..
            } => eprintln!("  decision: {decision} (attempt {attempt_count})"),
            Event::Degraded { node, reason, .. } => eprintln!("  ! {node}: {reason}"),
            Event::Finished { status, .. } => match status {
                RunStatus::Completed => eprintln!("• finished"),
                RunStatus::Aborted { reason } => eprintln!("• aborted: {reason}"),
            },
        }
    }
}

fn forget_command(args: ForgetArgs) -> Result<ExitCode> {
    let removed = remove_session_logs(&args.run_id)?;
    info!(run_id = %args.run_id, removed, "session log records removed");
    println!("removed {removed} record(s) for {}", args.run_id);
    Ok(ExitCode::SUCCESS)
}

fn trace_command(args: TraceArgs) -> Result<ExitCode> {
    let raw = std::fs::read(&args.file)
        .with_context(|| format!("failed to read trace {}", args.file.display()))?;
    let events: Vec<Event> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse trace {}", args.file.display()))?;
    let summary = TraceSummary::from_events(&events);
    match args.format {
        TraceFormat::Markdown => println!("{}", summary.render_markdown()),
        TraceFormat::Mermaid => println!("{}", summary.render_mermaid()),
    }
    Ok(ExitCode::SUCCESS)
}
