//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use personagraph_core::stages::temporal::format_records;
use personagraph_core::{Answer, Assistant};
use personagraph_rules::{Connector, filter_experiences};
use personagraph_services::{ExperienceSource, JsonExperienceFile};
use personagraph_shared::{AppConfig, ExperienceRecord, init_config, load_config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// personagraph: answer questions in a persona's voice, grounded in its history.
#[derive(Parser)]
#[command(
    name = "personagraph",
    version,
    about = "Answer questions about a persona's work history, in the persona's own tone.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a single question and print the answer.
    Ask {
        /// The question. Multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print run id, classification and node path as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive session. Type `quit`, `exit` or `q` to leave.
    Chat,

    /// Run the temporal filter over the experience file.
    Filter {
        /// Temporal connector, e.g. `antes`, `después`, `since`, `during`.
        #[arg(short, long)]
        connector: Option<String>,

        /// Explicit year or range, e.g. `2020` or `2017-2019`.
        #[arg(short, long)]
        range: Option<String>,

        /// Entity whose own period anchors the reference year.
        #[arg(short, long)]
        entity: Option<String>,

        /// Experience file (defaults to `data.experience_path`).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "personagraph=warn",
        1 => "personagraph=info",
        2 => "personagraph=debug",
        _ => "personagraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask { question, json } => cmd_ask(&question.join(" "), json).await,
        Command::Chat => cmd_chat().await,
        Command::Filter {
            connector,
            range,
            entity,
            file,
        } => {
            cmd_filter(
                connector.as_deref(),
                range.as_deref(),
                entity.as_deref(),
                file,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn build_assistant() -> Result<Assistant> {
    let config = load_config()?;
    Ok(Assistant::from_config(&config)?)
}

fn print_json(answer: &Answer) -> Result<()> {
    let path: Vec<&str> = answer.path.iter().map(|id| id.as_str()).collect();
    let value = serde_json::json!({
        "run_id": answer.run_id,
        "answer": answer.text,
        "classification": answer.classification,
        "path": path,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn cmd_ask(question: &str, json: bool) -> Result<()> {
    let assistant = build_assistant()?;
    let answer = assistant.answer(question).await?;
    info!(run_id = %answer.run_id, "answered");

    if json {
        print_json(&answer)?;
    } else {
        println!("{}", answer.text);
    }
    Ok(())
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q")
}

async fn cmd_chat() -> Result<()> {
    let assistant = build_assistant()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Escribí tu pregunta (quit, exit o q para salir).");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            break;
        }

        match assistant.answer(line).await {
            Ok(answer) => println!("{}\n", answer.text),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(error = %e, "question skipped"),
        }
    }

    println!("¡Chau!");
    Ok(())
}

async fn cmd_filter(
    connector: Option<&str>,
    range: Option<&str>,
    entity: Option<&str>,
    file: Option<PathBuf>,
) -> Result<()> {
    if let Some(word) = connector.filter(|w| Connector::parse(w).is_none()) {
        return Err(eyre!(
            "unknown connector '{word}': expected one of antes, después, desde, hasta, durante, en, before, after, since, until, during"
        ));
    }

    let path = match file {
        Some(path) => path,
        None => PathBuf::from(load_config()?.data.experience_path),
    };
    let records: Vec<ExperienceRecord> = JsonExperienceFile::new(&path).load_all().await?;
    let kept: Vec<ExperienceRecord> = filter_experiences(&records, connector, range, entity)
        .into_iter()
        .cloned()
        .collect();

    info!(total = records.len(), kept = kept.len(), "filter applied");
    if kept.is_empty() {
        println!("(no matching records)");
    } else {
        println!("{}", format_records(&kept));
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
