//! Threadwise CLI
//!
//! Loads a content snapshot, indexes it and answers one query against it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use threadwise::config::{
    config_path, load_config, load_config_from_path, save_config, validate_config, LogFormat,
};
use threadwise::core::{ContentItem, Scope};
use threadwise::ratelimit::Category;
use threadwise::{AppServices, CompanionRequest, Config, VERSION};

#[derive(Parser)]
#[command(
    name = "threadwise",
    author = "Threadwise Contributors",
    version = VERSION,
    about = "Threadwise - grounded answers over community discussions",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, short, global = true, env = "THREADWISE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query with citations
    Ask {
        /// JSON array of posts and comments to index first
        #[arg(long)]
        content: PathBuf,
        /// Retrieval scope: global, community:<id> or thread:<id>
        #[arg(long, default_value = "global")]
        scope: Scope,
        /// Number of citations
        #[arg(long)]
        k: Option<usize>,
        /// Caller identity for rate limiting
        #[arg(long, default_value = "cli")]
        caller: String,
        /// The question
        query: String,
    },

    /// Print the grounding context for a query without generating an answer
    Ground {
        /// JSON array of posts and comments to index first
        #[arg(long)]
        content: PathBuf,
        /// Retrieval scope: global, community:<id> or thread:<id>
        #[arg(long, default_value = "global")]
        scope: Scope,
        /// Number of citations
        #[arg(long)]
        k: Option<usize>,
        /// Rate limit category the request is charged to
        #[arg(long, default_value = "moderation")]
        category: Category,
        /// Caller identity for rate limiting
        #[arg(long, default_value = "cli")]
        caller: String,
        /// The query
        query: String,
    },

    /// Validate the configuration
    CheckConfig,

    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the user config path)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) if path.exists() => {
            let mut config = load_config_from_path(path)?;
            threadwise::config::apply_env_overrides(&mut config);
            config
        }
        _ => load_config()?,
    };

    init_tracing(&config)?;

    match cli.command {
        Commands::Ask {
            content,
            scope,
            k,
            caller,
            query,
        } => ask(&config, &content, scope, k, caller, query).await,
        Commands::Ground {
            content,
            scope,
            k,
            category,
            caller,
            query,
        } => ground(&config, &content, scope, k, category, caller, query).await,
        Commands::CheckConfig => check_config(&config),
        Commands::InitConfig { path, force } => init_config(path.or(cli.config), force),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::from_default_env()
            .add_directive(format!("threadwise={}", config.log.level).parse()?),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
    Ok(())
}

async fn load_services(config: &Config, content: &Path) -> anyhow::Result<AppServices> {
    let services = AppServices::from_config(config)?;

    let raw = std::fs::read_to_string(content)
        .with_context(|| format!("Failed to read content file {}", content.display()))?;
    let items: Vec<ContentItem> = serde_json::from_str(&raw)
        .with_context(|| format!("Content file {} is not a JSON array of items", content.display()))?;

    services.sync.on_upsert_batch(&items).await?;
    info!("Indexed {} items from {}", services.index.len(), content.display());
    Ok(services)
}

async fn ask(
    config: &Config,
    content: &Path,
    scope: Scope,
    k: Option<usize>,
    caller: String,
    query: String,
) -> anyhow::Result<()> {
    let services = load_services(config, content).await?;

    let mut request = CompanionRequest::new(query, caller).in_scope(scope);
    if let Some(k) = k {
        request = request.with_k(k);
    }

    let reply = services.orchestrator.respond(request).await;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if !reply.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

async fn ground(
    config: &Config,
    content: &Path,
    scope: Scope,
    k: Option<usize>,
    category: Category,
    caller: String,
    query: String,
) -> anyhow::Result<()> {
    let services = load_services(config, content).await?;

    let mut request = CompanionRequest::new(query, caller).in_scope(scope);
    if let Some(k) = k {
        request = request.with_k(k);
    }

    let reply = services.orchestrator.respond_grounding(request, category).await;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if !reply.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    let result = validate_config(config);
    println!("{}", result);

    if !result.valid {
        bail!("configuration has {} error(s)", result.errors.len());
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    save_config(&Config::default(), &path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
