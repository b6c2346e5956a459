use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scribe_core::config::AppConfig;
use scribe_core::error::ScribeError;
use scribe_core::event::EventBus;
use scribe_core::types::{Context, PlanStatus};

use scribe_agent::{
    assemble, resolve_root, synthesize, to_document, DocumentParser, RunLogger, RunOutcome,
};

#[derive(Parser)]
#[command(name = "scribe", version, about = "Plan graph execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scribe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a command with the root executor, run it, and print the report
    Run {
        /// The command handed to the planner (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
        /// Root planning executor id
        #[arg(long)]
        executor: Option<String>,
        /// Initial context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },
    /// Parse and synthesize a plan document, then print it normalized
    Plan {
        /// Plan document (JSON or XML)
        file: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scribe=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Some(Commands::Run {
            command,
            executor,
            context,
        }) => {
            let mut text = command.join(" ");
            if text.is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            let context = parse_context(context.as_deref())?;
            run(&config, executor.as_deref(), &text, &context).await?;
        }
        Some(Commands::Plan { file }) => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read plan document {}", file.display()))?;
            let doc = DocumentParser::parse(&raw)?;
            if doc.nodes.len() > config.runtime.max_nodes {
                return Err(ScribeError::PlanTooLarge {
                    count: doc.nodes.len(),
                    limit: config.runtime.max_nodes,
                }
                .into());
            }
            let assembly = assemble(
                &config,
                Arc::new(EventBus::default()),
                CancellationToken::new(),
            )
            .await?;
            let registry = assembly.executors.read().await;
            let graph = synthesize(&doc, &*registry, None)?;
            println!("{}", serde_json::to_string_pretty(&to_document(&graph))?);
        }
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn parse_context(raw: Option<&str>) -> anyhow::Result<Context> {
    let Some(raw) = raw else {
        return Ok(Context::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw).context("--context is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--context must be a JSON object"),
    }
}

async fn run(
    config: &AppConfig,
    requested_root: Option<&str>,
    command: &str,
    context: &Context,
) -> anyhow::Result<()> {
    let root = resolve_root(config, requested_root)?;
    let events = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel_clone.cancel();
    });

    // Spawn RunLogger if logging is enabled
    let logger = if config.log.enabled {
        let log_cancel = CancellationToken::new();
        let handle = RunLogger::new(config.log_dir()).spawn(&events, log_cancel.clone());
        Some((handle, log_cancel))
    } else {
        None
    };

    let assembly = assemble(config, events.clone(), cancel).await?;
    let result = assembly.runner.run_outcome(&root, command, context).await;

    if let Some((handle, log_cancel)) = logger {
        log_cancel.cancel();
        if let Ok(Some(path)) = handle.await {
            info!(path = %path.display(), "Run log written");
        }
    }

    let RunOutcome { report, error } = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(e) = error {
        return Err(e.into());
    }
    if report.status != PlanStatus::Complete {
        anyhow::bail!("plan '{}' finished with status {}", report.title, report.status);
    }
    Ok(())
}
