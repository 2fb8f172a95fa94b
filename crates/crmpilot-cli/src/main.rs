#![deny(unsafe_code)]

//! CrmPilot CLI: chat with the CRM agent from a terminal.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crmpilot_config::AppConfig;
use crmpilot_core::crm::tools::definitions;
use crmpilot_core::llm::create_provider;
use crmpilot_core::{
    BasePrompt, ConversationState, Credentials, Orchestrator, ToolRegistry, ZohoClient,
    register_crm_tools, validate_query,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CrmPilot, an LLM agent that works your Zoho CRM.
#[derive(Parser)]
#[command(name = "crmpilot", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "crmpilot.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation.
    Chat,

    /// Run a single conversation step and print the answer.
    Ask {
        /// The message to send.
        text: Vec<String>,
    },

    /// Validate and normalize a COQL query without running it.
    Validate {
        /// The query to check.
        query: String,
    },

    /// List the tools exposed to the model.
    Tools,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;
    init_tracing(cli.verbose, &config.logging.level);
    if !from_file {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Chat => cmd_chat(&config).await?,
        Commands::Ask { text } => cmd_ask(&config, &text.join(" ")).await?,
        Commands::Validate { query } => {
            if !cmd_validate(&query)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Tools => cmd_tools(),
        Commands::Config { show } => cmd_config(&config, &cli.config, show)?,
    }

    Ok(ExitCode::SUCCESS)
}

/// `RUST_LOG` wins, then `-v`, then `[logging].level`.
fn init_tracing(verbose: u8, configured: &str) {
    let fallback = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Wire the CRM client, tool registry, provider and prompt together.
async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let credentials = Credentials::from_env(config)?;

    let client = ZohoClient::new(&config.crm, &credentials).context("building CRM client")?;
    let mut tools = ToolRegistry::new();
    register_crm_tools(&mut tools, Arc::new(client));

    let provider = create_provider(&config.llm, credentials.llm_api_key.clone());
    let prompt = BasePrompt::from_config(&config.agent)
        .await
        .context("reading system prompt file")?;

    info!(
        provider = provider.name(),
        model = %config.llm.model,
        tools = tools.len(),
        "agent ready"
    );
    Ok(Orchestrator::new(config, provider, tools, prompt))
}

async fn cmd_chat(config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut state = ConversationState::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("CrmPilot ready. /reset starts over, /state shows the session, Ctrl-D quits.");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/reset" => {
                state = ConversationState::new();
                println!("Session cleared.");
                continue;
            }
            "/state" => {
                print_state(&state, config);
                continue;
            }
            _ => {}
        }

        match orchestrator.step(&mut state, line).await {
            Ok(outcome) => {
                if outcome.summarized() {
                    info!(summary_count = state.summary_count(), "conversation summarized");
                }
                println!("{}\n", outcome.reply);
            }
            // The session stays usable; the human can rephrase or retry.
            Err(e) => {
                warn!(error = %e, "step failed");
                eprintln!("error: {e}\n");
            }
        }
    }
    Ok(())
}

fn print_state(state: &ConversationState, config: &AppConfig) {
    println!("messages:      {}", state.len());
    println!("summaries:     {}", state.summary_count());
    println!(
        "next summary:  after {} messages",
        state.summarization_threshold(config.agent.summary_interval)
    );
    match state.summary() {
        Some(summary) => println!("summary:\n{summary}"),
        None => println!("summary:       (none)"),
    }
}

async fn cmd_ask(config: &AppConfig, text: &str) -> Result<()> {
    anyhow::ensure!(!text.trim().is_empty(), "nothing to ask");
    let orchestrator = build_orchestrator(config).await?;
    let mut state = ConversationState::new();
    let outcome = orchestrator.step(&mut state, text).await?;
    println!("{}", outcome.reply);
    Ok(())
}

/// Print the validation result; returns whether the query is valid.
fn cmd_validate(query: &str) -> Result<bool> {
    let result = validate_query(query);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.valid)
}

fn cmd_tools() {
    for def in definitions() {
        let summary = def.description.lines().next().unwrap_or_default();
        println!("{:<28} {summary}", def.name);
    }
}

fn cmd_config(config: &AppConfig, path: &Path, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("serializing config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", path.display());
    }
    Ok(())
}

/// Load `path`, or the defaults when it does not exist. The flag reports
/// whether the file was read.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}
