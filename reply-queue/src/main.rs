//! reply-queue - Manage the pending-review reply queue
//!
//! Unix-style tool for reviewing generated drafts: list them, approve them
//! into history, or drop them, plus views over history, activity logs, and
//! daily stats.

use clap::{Parser, Subcommand};
use libreplycast::{Config, Database, QueueItem, ReplycastError, Result};

#[derive(Parser, Debug)]
#[command(name = "reply-queue")]
#[command(version)]
#[command(about = "Manage the pending-review reply queue")]
#[command(long_about = "\
reply-queue - Manage the pending-review reply queue

DESCRIPTION:
    reply-queue is a Unix-style tool for reviewing the draft replies a
    batch produced. Drafts wait in the queue until a human approves them
    into history or removes them.

COMMANDS:
    list        List pending drafts
    approve     Move a draft into history as approved
    remove      Delete a draft from the queue
    history     Show recently resolved replies
    logs        Show recent batch activity
    stats       Show today's counters

USAGE EXAMPLES:
    # List tenant 1's pending drafts
    reply-queue list

    # List as JSON
    reply-queue list --format json

    # Approve draft 42 for tenant 3
    reply-queue --tenant 3 approve 42

    # Tail the batch activity log
    reply-queue logs --limit 20

CONFIGURATION:
    Configuration file: ~/.config/replycast/config.toml
    Override with REPLYCAST_CONFIG.

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Tenant whose data to operate on
    #[arg(short, long, global = true, default_value_t = 1)]
    tenant: i64,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List pending drafts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Approve a draft into history
    Approve {
        /// Queue item id
        queue_id: i64,
    },

    /// Remove a draft from the queue
    Remove {
        /// Queue item id
        queue_id: i64,
    },

    /// Show recently resolved replies
    History {
        /// Maximum entries to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show recent batch activity
    Logs {
        /// Maximum lines to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show today's counters
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
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
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::List { format } => cmd_list(&db, cli.tenant, &format).await?,
        Commands::Approve { queue_id } => cmd_approve(&db, cli.tenant, queue_id).await?,
        Commands::Remove { queue_id } => cmd_remove(&db, cli.tenant, queue_id).await?,
        Commands::History { limit } => cmd_history(&db, cli.tenant, limit).await?,
        Commands::Logs { limit } => cmd_logs(&db, cli.tenant, limit).await?,
        Commands::Stats { format } => cmd_stats(&db, cli.tenant, &format).await?,
    }

    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(ReplycastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

async fn cmd_list(db: &Database, tenant: i64, format: &str) -> Result<()> {
    validate_format(format)?;
    let items = db.list_queue(tenant).await?;

    if format == "json" {
        output_list_json(&items);
    } else {
        output_list_text(&items);
    }
    Ok(())
}

fn output_list_json(items: &[QueueItem]) {
    let json: Vec<serde_json::Value> = items
        .iter()
        .map(|item| {
            serde_json::json!({
                "id": item.id,
                "item_id": item.item_id,
                "source_text": item.source_text,
                "reply_text": item.reply_text,
                "created_at": item.created_at,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}

fn output_list_text(items: &[QueueItem]) {
    if items.is_empty() {
        println!("Queue is empty.");
        return;
    }

    for item in items {
        let source = item.source_text.as_deref().unwrap_or("");
        println!(
            "{} | post {} | {} -> {}",
            item.id.unwrap_or_default(),
            item.item_id,
            truncate(source, 40),
            truncate(&item.reply_text, 60)
        );
    }
}

async fn cmd_approve(db: &Database, tenant: i64, queue_id: i64) -> Result<()> {
    if db.approve_queue_item(queue_id, tenant).await? {
        println!("Approved draft {} into history.", queue_id);
        Ok(())
    } else {
        Err(ReplycastError::InvalidInput(format!(
            "No queue item {} for tenant {}",
            queue_id, tenant
        )))
    }
}

async fn cmd_remove(db: &Database, tenant: i64, queue_id: i64) -> Result<()> {
    if db.remove_from_queue(queue_id, tenant).await? {
        println!("Removed draft {}.", queue_id);
        Ok(())
    } else {
        Err(ReplycastError::InvalidInput(format!(
            "No queue item {} for tenant {}",
            queue_id, tenant
        )))
    }
}

async fn cmd_history(db: &Database, tenant: i64, limit: usize) -> Result<()> {
    let entries = db.recent_history(tenant, limit).await?;
    if entries.is_empty() {
        println!("No history yet.");
        return Ok(());
    }

    for entry in entries {
        println!(
            "{} | post {} | {} | {}",
            format_timestamp(entry.recorded_at),
            entry.item_id,
            entry.status,
            truncate(&entry.reply_text, 60)
        );
    }
    Ok(())
}

async fn cmd_logs(db: &Database, tenant: i64, limit: usize) -> Result<()> {
    let entries = db.recent_logs(tenant, limit).await?;
    for entry in entries {
        println!(
            "{} [{}] {}",
            format_timestamp(entry.logged_at),
            entry.level,
            entry.message
        );
    }
    Ok(())
}

async fn cmd_stats(db: &Database, tenant: i64, format: &str) -> Result<()> {
    validate_format(format)?;
    let stats = db.stats_today(tenant).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::json!({
                "day": stats.day,
                "acquired": stats.acquired,
                "generated": stats.generated,
                "queued": stats.queued,
            })
        );
    } else {
        println!("{}: acquired {} | generated {} | queued {}",
            stats.day, stats.acquired, stats.generated, stats.queued);
    }
    Ok(())
}

fn truncate(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
