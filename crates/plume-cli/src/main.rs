//! Plume CLI - resilient publishing to an unstable CMS surface
//!
//! Usage:
//!   plume init-config               Write a default plume.toml
//!   plume publish --title .. --body ..   Publish a single post
//!   plume batch <file>              Publish a JSON batch of posts
//!   plume accounts                  List accounts with saved sessions

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use plume_core::{PlumeConfig, PublishOutcome, PublishRequest};
use plume_publish::{BrowserBackend, PublishEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "plume")]
#[command(author, version, about = "Resilient browser-automation publisher")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = "plume.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig,

    /// Publish a single post
    Publish {
        /// Post title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Post body text
        #[arg(short, long, conflicts_with = "body_file")]
        body: Option<String>,

        /// Read the post body from a file
        #[arg(long, value_name = "FILE")]
        body_file: Option<PathBuf>,

        /// Hashtags to append (repeatable)
        #[arg(short = 'g', long = "tag")]
        tags: Vec<String>,

        /// Media files to attach (repeatable)
        #[arg(short, long = "media")]
        media: Vec<PathBuf>,

        /// Account to publish under (overrides config)
        #[arg(short, long)]
        account: Option<String>,

        /// Run the browser headless (overrides config)
        #[arg(long)]
        headless: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Publish a batch of posts from a JSON file
    Batch {
        /// JSON file holding an array of publish requests
        file: PathBuf,

        /// Seconds to wait between posts (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run the browser headless (overrides config)
        #[arg(long)]
        headless: bool,

        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },

    /// List accounts with a saved session on disk
    Accounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::InitConfig => cmd_init_config(&cli.config),
        Commands::Publish {
            title,
            body,
            body_file,
            tags,
            media,
            account,
            headless,
            json,
        } => {
            cmd_publish(
                &cli.config,
                title,
                body,
                body_file,
                tags,
                media,
                account,
                headless,
                json,
            )
            .await
        }
        Commands::Batch {
            file,
            interval,
            headless,
            json,
        } => cmd_batch(&cli.config, file, interval, headless, json).await,
        Commands::Accounts => cmd_accounts(&cli.config),
    }
}

fn cmd_init_config(path: &PathBuf) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    PlumeConfig::init(path).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_publish(
    config_path: &PathBuf,
    title: String,
    body: Option<String>,
    body_file: Option<PathBuf>,
    tags: Vec<String>,
    media: Vec<PathBuf>,
    account: Option<String>,
    headless: bool,
    json: bool,
) -> Result<()> {
    let mut config = PlumeConfig::load_or_default(config_path)?;
    if headless {
        config.publish.headless = true;
    }

    let body = match (body, body_file) {
        (Some(text), _) => text,
        (None, Some(file)) => std::fs::read_to_string(&file)
            .with_context(|| format!("reading body from {}", file.display()))?,
        (None, None) => String::new(),
    };

    let request = PublishRequest {
        title,
        body,
        hashtags: tags,
        media_paths: media,
        account_id: account.unwrap_or_else(|| config.publish.account_id.clone()),
    };

    let settings = config.publish.clone();
    let engine = PublishEngine::new(BrowserBackend::new(Arc::new(config)), settings);
    let outcome = engine.publish(&request).await;

    print_outcome(&outcome, json)?;
    if !outcome.is_success() {
        bail!("publish failed");
    }
    Ok(())
}

async fn cmd_batch(
    config_path: &PathBuf,
    file: PathBuf,
    interval: Option<u64>,
    headless: bool,
    json: bool,
) -> Result<()> {
    let mut config = PlumeConfig::load_or_default(config_path)?;
    if headless {
        config.publish.headless = true;
    }
    if let Some(secs) = interval {
        config.publish.post_interval_secs = secs;
    }

    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("reading batch from {}", file.display()))?;
    let requests: Vec<PublishRequest> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;
    if requests.is_empty() {
        bail!("batch file contains no requests");
    }

    let settings = config.publish.clone();
    let engine = PublishEngine::new(BrowserBackend::new(Arc::new(config)), settings);
    let outcomes = engine.publish_batch(&requests).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for (i, outcome) in outcomes.iter().enumerate() {
            print!("[{}/{}] ", i + 1, outcomes.len());
            print_outcome(outcome, false)?;
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        bail!("{} of {} posts failed", failed, outcomes.len());
    }
    Ok(())
}

fn cmd_accounts(config_path: &PathBuf) -> Result<()> {
    let config = PlumeConfig::load_or_default(config_path)?;
    let dir = &config.paths.cookies_dir;
    if !dir.exists() {
        println!("No saved sessions ({} does not exist)", dir.display());
        return Ok(());
    }

    let mut accounts: Vec<(String, Option<std::time::SystemTime>)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            // Session records sit next to the jars; only jars count.
            if !name.ends_with(".json") || name.ends_with(".session.json") {
                return None;
            }
            let account = name.trim_end_matches(".json").to_string();
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            Some((account, modified))
        })
        .collect();
    accounts.sort();

    if accounts.is_empty() {
        println!("No saved sessions in {}", dir.display());
        return Ok(());
    }
    for (account, modified) in accounts {
        match modified.and_then(|t| t.elapsed().ok()) {
            Some(age) => println!("{}  (saved {}h ago)", account, age.as_secs() / 3600),
            None => println!("{}", account),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &PublishOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    if outcome.is_success() {
        match (&outcome.post_id, &outcome.post_url) {
            (Some(id), Some(url)) => {
                println!("Published (id {}, attempt {}): {}", id, outcome.attempts, url)
            }
            (Some(id), None) => println!("Published (id {}, attempt {})", id, outcome.attempts),
            _ => println!("Published (attempt {})", outcome.attempts),
        }
    } else {
        let kind = outcome
            .error_kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "Failed after {} attempt(s): {}",
            outcome.attempts, kind
        );
    }
    Ok(())
}
