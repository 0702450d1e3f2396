//! reply-batch - Drive a batch of references through the reply pipeline
//!
//! Starts the tenant's batch session and streams progress until it reaches
//! a terminal state. Ctrl-C requests a cooperative stop: the loop finishes
//! its current suspension point and tears the session down cleanly.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use libreplycast::acquisition::api::HttpStatusFetcher;
use libreplycast::acquisition::browser::BrowserResolver;
use libreplycast::generation::{OpenAiGenerator, ReplyGenerator};
use libreplycast::{
    AcquireEngine, BatchManager, BatchPolicy, Config, CredentialPool, Database, ReplycastError,
    Result, Tone,
};

#[derive(Parser, Debug)]
#[command(name = "reply-batch")]
#[command(version)]
#[command(about = "Batch-draft replies to a list of posts")]
#[command(long_about = "\
reply-batch - Batch-draft replies to a list of posts

DESCRIPTION:
    reply-batch runs a list of post references through deduplication, the
    shared content cache, credential-rotation acquisition, and reply
    generation, queueing each draft for review. One batch runs per tenant
    at a time; a second start while one is processing fails. When the
    credential pool is exhausted the batch pauses for the configured
    cooldown and retries the reference once before moving on.

USAGE EXAMPLES:
    # Draft witty replies to two posts
    reply-batch --tone witty 1234567890123456789 9876543210987654321

    # References from a file, one per line
    reply-batch --tenant 3 --file posts.txt

    Press Ctrl-C to stop after the current reference.

CONFIGURATION:
    Configuration file: ~/.config/replycast/config.toml
    Override with REPLYCAST_CONFIG.

EXIT CODES:
    0 - Batch reached a terminal state
    1 - Batch could not start
    2 - No credentials configured
    3 - Invalid input
")]
struct Cli {
    /// Post references (status URLs, intent URLs, or raw ids)
    references: Vec<String>,

    /// Read references from a file, one per line
    #[arg(short, long)]
    file: Option<String>,

    /// Tenant to run the batch for
    #[arg(short, long, default_value_t = 1)]
    tenant: i64,

    /// Reply tone: professional, casual, witty, or friendly
    #[arg(long, default_value = "professional")]
    tone: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("warn")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let tone: Tone = cli.tone.parse().map_err(ReplycastError::InvalidInput)?;
    let references = collect_references(&cli)?;

    let db = Arc::new(Database::new(&config.database.path).await?);
    let pool = CredentialPool::new(config.credentials.clone(), db.clone());
    let fetcher = Arc::new(HttpStatusFetcher::new(&config.network)?);
    let fallback = Arc::new(BrowserResolver::new(config.browser.clone()));
    let engine = Arc::new(AcquireEngine::new(pool, fetcher, fallback, &config.network));
    let generator: Arc<dyn ReplyGenerator> =
        Arc::new(OpenAiGenerator::from_config(&config.generation)?);
    let policy = BatchPolicy::from_config(&config.batch, &config.generation);

    let manager = Arc::new(BatchManager::new(db, engine, generator, policy));
    let total = references.len();
    manager.clone().start(cli.tenant, references, tone).await?;
    eprintln!("Processing {} references for tenant {}...", total, cli.tenant);

    // Ctrl-C requests a cooperative stop; the loop observes the token at
    // its next suspension point.
    let stopper = manager.clone();
    let tenant = cli.tenant;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping after the current reference...");
            stopper.stop(tenant).await;
        }
    });

    let mut last_cursor = usize::MAX;
    loop {
        let status = manager.status(cli.tenant);
        if !status.processing {
            break;
        }
        if status.cursor != last_cursor {
            last_cursor = status.cursor;
            if let Some(current) = &status.current {
                eprintln!("[{}/{}] {}", status.cursor + 1, status.total, current);
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    println!(
        "Batch finished. Review drafts with: reply-queue list --tenant {}",
        cli.tenant
    );
    Ok(())
}

fn collect_references(cli: &Cli) -> Result<Vec<String>> {
    let mut references = cli.references.clone();

    if let Some(file) = &cli.file {
        let content = std::fs::read_to_string(file).map_err(|e| {
            ReplycastError::InvalidInput(format!("cannot read reference file {}: {}", file, e))
        })?;
        references.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    if references.is_empty() {
        return Err(ReplycastError::InvalidInput(
            "no references supplied; pass them as arguments or with --file".to_string(),
        ));
    }
    Ok(references)
}
