//! reply-creds - Manage tenant acquisition credentials
//!
//! Maintains each tenant's private credential sub-pool (appended after the
//! shared system pool during rotation) and imports browser session
//! profiles for the fallback scraper.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use libreplycast::{Config, Credential, Database, ReplycastError, Result};

#[derive(Parser, Debug)]
#[command(name = "reply-creds")]
#[command(version)]
#[command(about = "Manage tenant acquisition credentials")]
#[command(long_about = "\
reply-creds - Manage tenant acquisition credentials

DESCRIPTION:
    reply-creds maintains the per-tenant credential sub-pools used by the
    acquisition engine. The shared system pool lives in the config file;
    this tool manages the tenant rows stored in the database, plus browser
    session profiles for the fallback scraper.

COMMANDS:
    add             Append a credential to the tenant's sub-pool
    list            List the tenant's credentials (secrets masked)
    remove          Delete a credential by id
    profile-import  Import a browser session profile (cookie export JSON)

USAGE EXAMPLES:
    # Add a credential for tenant 3
    reply-creds --tenant 3 add \\
        --api-key K --api-secret S \\
        --access-token T --access-secret TS --bearer B

    # List tenant 3's credentials
    reply-creds --tenant 3 list

    # Import a session profile for the browser fallback
    reply-creds --tenant 3 profile-import session.json

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Tenant whose credentials to manage
    #[arg(short, long, global = true, default_value_t = 1)]
    tenant: i64,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append a credential to the tenant's sub-pool
    Add {
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        api_secret: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        access_secret: String,
        #[arg(long)]
        bearer: String,
    },

    /// List the tenant's credentials with secrets masked
    List,

    /// Delete a credential by id
    Remove {
        /// Credential row id (see list output)
        credential_id: i64,
    },

    /// Import a browser session profile (cookie export JSON)
    ProfileImport {
        /// Path to the profile JSON file
        file: String,
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
        Commands::Add {
            api_key,
            api_secret,
            access_token,
            access_secret,
            bearer,
        } => {
            let credential = Credential {
                api_key,
                api_secret,
                access_token,
                access_secret,
                bearer,
            };
            let id = db.add_tenant_credential(cli.tenant, &credential).await?;
            println!("Added credential {} for tenant {}.", id, cli.tenant);
        }

        Commands::List => {
            let creds = db.tenant_credentials(cli.tenant).await?;
            if creds.is_empty() {
                println!("Tenant {} has no private credentials.", cli.tenant);
            }
            for (index, cred) in creds.iter().enumerate() {
                println!("#{} | api_key {} | secrets ********", index + 1, cred.api_key);
            }
        }

        Commands::Remove { credential_id } => {
            if db.delete_tenant_credential(credential_id, cli.tenant).await? {
                println!("Removed credential {}.", credential_id);
            } else {
                return Err(ReplycastError::InvalidInput(format!(
                    "No credential {} for tenant {}",
                    credential_id, cli.tenant
                )));
            }
        }

        Commands::ProfileImport { file } => {
            import_profile(&config, cli.tenant, &file)?;
        }
    }

    Ok(())
}

/// Validate and copy a session profile into the tenant's profile
/// directory, where the browser fallback picks one at random.
fn import_profile(config: &Config, tenant: i64, file: &str) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        ReplycastError::InvalidInput(format!("cannot read profile {}: {}", file, e))
    })?;

    let parsed: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        ReplycastError::InvalidInput(format!("profile {} is not valid JSON: {}", file, e))
    })?;
    if parsed.get("cookies").and_then(|c| c.as_array()).is_none() {
        return Err(ReplycastError::InvalidInput(format!(
            "profile {} has no \"cookies\" array",
            file
        )));
    }

    let base = PathBuf::from(shellexpand::tilde(&config.browser.profiles_dir).to_string());
    let tenant_dir = base.join(tenant.to_string());
    std::fs::create_dir_all(&tenant_dir)
        .map_err(|e| ReplycastError::InvalidInput(format!("cannot create profile dir: {}", e)))?;

    let name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "profile.json".to_string());
    let target = tenant_dir.join(&name);
    std::fs::write(&target, content)
        .map_err(|e| ReplycastError::InvalidInput(format!("cannot write profile: {}", e)))?;

    println!("Imported profile to {}.", target.display());
    Ok(())
}
