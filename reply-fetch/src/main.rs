//! reply-fetch - Resolve the text of a single post
//!
//! Unix-style tool that runs one reference through the shared cache and the
//! credential-rotation acquisition engine, then prints the text to stdout.

use clap::Parser;
use std::sync::Arc;
use tracing::warn;

use libreplycast::acquisition::api::HttpStatusFetcher;
use libreplycast::acquisition::browser::BrowserResolver;
use libreplycast::ident::extract_post_id;
use libreplycast::{AcquireEngine, Config, CredentialPool, Database, Result};

#[derive(Parser, Debug)]
#[command(name = "reply-fetch")]
#[command(version)]
#[command(about = "Resolve the text of a post")]
#[command(long_about = "\
reply-fetch - Resolve the text of a post

DESCRIPTION:
    reply-fetch normalizes a post reference (status URL, intent URL, or raw
    id), checks the shared content cache, and otherwise resolves the text
    through the credential-rotation engine with its browser fallback. The
    resolved text is printed to stdout and written back to the cache.

USAGE EXAMPLES:
    # Resolve by URL
    reply-fetch \"https://x.com/someone/status/1234567890123456789\"

    # Resolve by raw id for tenant 3
    reply-fetch --tenant 3 1234567890123456789

    # Bypass the shared cache
    reply-fetch --fresh 1234567890123456789

CONFIGURATION:
    Configuration file: ~/.config/replycast/config.toml
    Override with REPLYCAST_CONFIG.

EXIT CODES:
    0 - Success
    1 - Resolution failed
    2 - No credentials configured
    3 - Invalid input
")]
struct Cli {
    /// Post reference: status URL, intent URL, or raw id
    reference: String,

    /// Tenant whose credential pool to use
    #[arg(short, long, default_value_t = 1)]
    tenant: i64,

    /// Skip the shared cache and acquire fresh
    #[arg(long)]
    fresh: bool,

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
            .with_env_filter("error")
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
    let db = Arc::new(Database::new(&config.database.path).await?);

    let item_id = extract_post_id(&cli.reference)?;

    if !cli.fresh {
        if let Some(text) = db.get_cached_content(&item_id).await? {
            println!("{}", text);
            return Ok(());
        }
    }

    let pool = CredentialPool::new(config.credentials.clone(), db.clone());
    let fetcher = Arc::new(HttpStatusFetcher::new(&config.network)?);
    let fallback = Arc::new(BrowserResolver::new(config.browser.clone()));
    let engine = AcquireEngine::new(pool, fetcher, fallback, &config.network);

    let source_url = cli.reference.starts_with("http").then_some(cli.reference.as_str());
    let text = engine.resolve(&item_id, cli.tenant, source_url).await?;

    // Write-through so other tenants skip this acquisition.
    if let Err(e) = db.put_cached_content(&item_id, &text).await {
        warn!(%e, "failed to cache resolved text");
    }

    println!("{}", text);
    Ok(())
}
