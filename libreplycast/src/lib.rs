//! Replycast - draft replies to social posts from the command line
//!
//! This library resolves the text of remote posts through a rotating pool
//! of API credentials (with a browser-automation fallback), generates
//! draft replies, and parks them in a per-tenant review queue.

pub mod acquisition;
pub mod batch;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod db;
pub mod dedup;
pub mod error;
pub mod generation;
pub mod ident;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use acquisition::AcquireEngine;
pub use batch::{BatchManager, BatchPolicy};
pub use config::Config;
pub use credentials::CredentialPool;
pub use db::Database;
pub use error::{ReplycastError, Result};
pub use types::{BatchSnapshot, Credential, QueueItem, Tone};
