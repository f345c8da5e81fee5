//! SoundScape CLI - generate audio from prompts.
//!
//! A command-line front end for the SoundScape generation pipeline.

#![allow(clippy::print_stdout, clippy::print_stderr)] // CLI program intentionally prints

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use soundscape::config::{self, IssueLevel, SoundscapeConfig};
use soundscape::prelude::*;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// SoundScape - turn prompts into sound
#[derive(Parser)]
#[command(name = "soundscape")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = config::CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate audio for a prompt
    Generate(GenerateArgs),

    /// List past generations, most recent first
    History(UserArgs),

    /// Delete a history entry
    Delete(EntryArgs),

    /// Generate again from a history entry
    Regenerate(EntryArgs),

    /// List predefined prompts
    Predefined,

    /// Send one request through the HTTP service boundary
    Api(ApiArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments shared by per-user commands
#[derive(Args)]
struct UserArgs {
    /// User the command acts for
    #[arg(short, long, env = "SOUNDSCAPE_USER", default_value = "local")]
    user: String,
}

/// Arguments for the generate command
#[derive(Args)]
struct GenerateArgs {
    /// Prompt describing the sound
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,

    /// Model: musicgen, audiogen, text_to_speech or predefined
    #[arg(short, long, default_value = "musicgen")]
    model: String,

    #[command(flatten)]
    user: UserArgs,
}

/// Arguments for commands addressing one history entry
#[derive(Args)]
struct EntryArgs {
    /// History entry id
    id: HistoryId,

    #[command(flatten)]
    user: UserArgs,
}

/// Arguments for the api command
#[derive(Args)]
struct ApiArgs {
    /// HTTP method
    method: String,

    /// Request path, e.g. /history/42
    path: String,

    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Validate configuration
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "soundscape={level},soundscape_cli={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.unwrap_or_else(config::config_path);

    match cli.command {
        Commands::Generate(args) => cmd_generate(args, &config_file).await,
        Commands::History(args) => cmd_history(args, &config_file).await,
        Commands::Delete(args) => cmd_delete(args, &config_file).await,
        Commands::Regenerate(args) => cmd_regenerate(args, &config_file).await,
        Commands::Predefined => cmd_predefined(&config_file).await,
        Commands::Api(args) => cmd_api(args, &config_file).await,
        Commands::Config(args) => cmd_config(args, &config_file).await,
    }
}

async fn load(config_file: &Path) -> Result<SoundscapeConfig> {
    config::load_config(Some(config_file))
        .await
        .with_context(|| format!("failed to load {}", config_file.display()))
}

fn open_session(config: &SoundscapeConfig, user: &str) -> Result<SessionController> {
    let pipeline = config.build_pipeline()?;
    Ok(SessionController::new(
        user,
        Arc::new(pipeline),
        Arc::new(config.predefined_table()),
    ))
}

/// Drive one generation to its outcome, cancelling on Ctrl-C.
async fn run_generation(
    session: &SessionController,
    start: impl Future<Output = std::result::Result<SessionOutcome, SessionError>>,
) -> Result<()> {
    tokio::pin!(start);

    let outcome = tokio::select! {
        outcome = &mut start => outcome?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling...");
            session.cancel();
            start.await?
        }
    };

    match outcome.phase {
        SessionPhase::Succeeded => {
            if let Some(result) = outcome.result {
                println!("Audio:  {}", result.audio_url);
                println!("Source: {}", result.source_kind);
                if let Some(id) = result.history_id {
                    println!("Entry:  {id}");
                }
            }
            if let Some(warning) = outcome.warning {
                println!("Warning: {warning}");
            }
            Ok(())
        }
        SessionPhase::Cancelled => {
            if let Some(result) = outcome.result {
                println!("Cancelled after upload; audio kept at {}", result.audio_url);
            } else {
                println!("Cancelled.");
            }
            Ok(())
        }
        SessionPhase::Failed(reason) => Err(anyhow!(reason)),
        phase => Err(anyhow!("unexpected session phase: {phase:?}")),
    }
}

async fn cmd_generate(args: GenerateArgs, config_file: &Path) -> Result<()> {
    let kind: ModelKind = args.model.parse()?;
    let prompt = args.prompt.join(" ");
    let session = open_session(&load(config_file).await?, &args.user.user)?;
    run_generation(&session, session.start(&prompt, kind)).await
}

async fn cmd_history(args: UserArgs, config_file: &Path) -> Result<()> {
    let session = open_session(&load(config_file).await?, &args.user)?;
    let records = session.refresh_history().await?;

    if records.is_empty() {
        println!("No history for user {}.", args.user);
        return Ok(());
    }
    for record in records {
        println!(
            "{:>6}  {:<14}  {}  {}",
            record.id,
            record.model_kind,
            record.prompt,
            record.audio_url.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn cmd_delete(args: EntryArgs, config_file: &Path) -> Result<()> {
    let session = open_session(&load(config_file).await?, &args.user.user)?;
    session.delete(args.id).await?;
    println!("Deleted entry {}.", args.id);
    Ok(())
}

async fn cmd_regenerate(args: EntryArgs, config_file: &Path) -> Result<()> {
    let session = open_session(&load(config_file).await?, &args.user.user)?;
    let record = session
        .record(args.id)
        .await?
        .ok_or_else(|| anyhow!("history entry {} not found", args.id))?;

    println!("Regenerating \"{}\" with {}", record.prompt, record.model_kind);
    run_generation(&session, session.regenerate(&record)).await
}

async fn cmd_predefined(config_file: &Path) -> Result<()> {
    let config = load(config_file).await?;
    for (prompt, url) in config.predefined_table().iter() {
        println!("{prompt:<12} {url}");
    }
    Ok(())
}

async fn cmd_api(args: ApiArgs, config_file: &Path) -> Result<()> {
    let config = load(config_file).await?;
    let service = SoundscapeService::new(
        Arc::new(config.build_pipeline()?),
        Arc::new(config.predefined_table()),
    );
    let response = service
        .handle(&args.method, &args.path, args.body.as_deref())
        .await;

    println!("{}", response.status);
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        bail!("request failed with status {}", response.status);
    }
    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_file: &Path) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            let config = load(config_file).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Init { force } => {
            config::init_config(config_file, force)
                .await
                .context("failed to initialize config")?;
            println!("Configuration created: {}", config_file.display());
        }
        ConfigCommands::Validate => {
            let config = load(config_file).await?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.level == IssueLevel::Error) {
                bail!("configuration has errors");
            }
            println!("Configuration is valid");
        }
    }

    Ok(())
}
