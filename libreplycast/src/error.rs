//! Error types for Replycast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReplycastError>;

#[derive(Error, Debug)]
pub enum ReplycastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ReplycastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ReplycastError::InvalidInput(_) => 3,
            ReplycastError::Acquire(AcquireError::NotConfigured(_)) => 2,
            ReplycastError::Acquire(_) => 1,
            ReplycastError::Generate(_) => 1,
            ReplycastError::Batch(_) => 1,
            ReplycastError::Browser(_) => 1,
            ReplycastError::Config(_) => 1,
            ReplycastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Terminal outcomes of a full resolution attempt.
///
/// Per-credential failures never surface individually; they are folded into
/// the `Exhausted` summary. `NotFound` is authoritative and short-circuits
/// the credential rotation, so it carries no attempt detail.
#[derive(Error, Debug, Clone)]
pub enum AcquireError {
    #[error("no acquisition credentials configured for tenant {0}")]
    NotConfigured(i64),

    #[error("post {0} not found (deleted or private)")]
    NotFound(String),

    // Display keeps the word "exhausted" so durable log lines stay greppable,
    // but callers match the variant, never the text.
    #[error("all {attempts} credentials exhausted for post {item_id}: {summary}")]
    Exhausted {
        item_id: String,
        attempts: usize,
        summary: String,
    },
}

impl AcquireError {
    /// True when the caller should apply the timed rate-limit backoff
    /// before retrying once.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, AcquireError::Exhausted { .. })
    }
}

/// Outcome of a single credential attempt against the primary fetch path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("rate limited")]
    RateLimited,

    #[error("forbidden")]
    Forbidden,

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Transient(String),
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("generation call failed: {0}")]
    Failed(String),

    #[error("generation call timed out after {0}s")]
    TimedOut(u64),

    #[error("generation returned empty output")]
    Empty,
}

#[derive(Error, Debug, Clone)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("page interaction failed: {0}")]
    Page(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("a batch is already running for tenant {0}")]
    AlreadyRunning(i64),

    #[error("no input references supplied")]
    NoInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = ReplycastError::InvalidInput("bad reference".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_configured() {
        let error = ReplycastError::Acquire(AcquireError::NotConfigured(7));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let not_found = ReplycastError::Acquire(AcquireError::NotFound("123".to_string()));
        assert_eq!(not_found.exit_code(), 1);

        let batch = ReplycastError::Batch(BatchError::AlreadyRunning(1));
        assert_eq!(batch.exit_code(), 1);

        let config = ReplycastError::Config(ConfigError::MissingField("database.path".into()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_exhausted_display_contains_marker() {
        let error = AcquireError::Exhausted {
            item_id: "1234567890123456789".to_string(),
            attempts: 3,
            summary: "credential #1: rate limited; credential #2: rate limited".to_string(),
        };
        let message = format!("{}", error);
        assert!(message.contains("exhausted"));
        assert!(message.contains("1234567890123456789"));
        assert!(error.is_exhausted());
    }

    #[test]
    fn test_not_found_is_not_exhausted() {
        let error = AcquireError::NotFound("42".to_string());
        assert!(!error.is_exhausted());
        assert!(format!("{}", error).contains("deleted or private"));
    }

    #[test]
    fn test_error_conversion_from_acquire_error() {
        let acquire = AcquireError::NotConfigured(3);
        let error: ReplycastError = acquire.into();
        match error {
            ReplycastError::Acquire(AcquireError::NotConfigured(3)) => {}
            _ => panic!("Expected ReplycastError::Acquire"),
        }
    }

    #[test]
    fn test_fetch_error_display() {
        assert_eq!(format!("{}", FetchError::RateLimited), "rate limited");
        assert_eq!(format!("{}", FetchError::NotFound), "not found");
        assert_eq!(
            format!("{}", FetchError::Transient("connection reset".into())),
            "connection reset"
        );
    }

    #[test]
    fn test_generate_error_display() {
        let error = ReplycastError::Generate(GenerateError::TimedOut(30));
        assert!(format!("{}", error).contains("timed out after 30s"));
    }

    #[test]
    fn test_batch_error_display() {
        let error = BatchError::AlreadyRunning(12);
        assert_eq!(
            format!("{}", error),
            "a batch is already running for tenant 12"
        );
    }
}
