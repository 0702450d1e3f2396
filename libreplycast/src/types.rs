//! Core types for Replycast

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One set of access keys granting one identity's quota against the
/// primary acquisition API.
///
/// Credentials are immutable once loaded and only ever rotated through;
/// the pool rebuilds them from the authoritative store on every call.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_secret: String,
    pub bearer: String,
}

// Secret material must not leak through debug logging.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &self.api_key)
            .field("api_secret", &"********")
            .field("access_token", &"********")
            .field("access_secret", &"********")
            .field("bearer", &"********")
            .finish()
    }
}

/// A generated draft reply awaiting human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Option<i64>,
    pub tenant_id: i64,
    pub item_id: String,
    pub source_text: Option<String>,
    pub reply_text: String,
    pub created_at: i64,
}

/// A reply a tenant has resolved (approved or recorded out-of-band).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub tenant_id: i64,
    pub item_id: String,
    pub source_text: Option<String>,
    pub reply_text: String,
    pub status: String,
    pub recorded_at: i64,
}

/// A durable per-tenant activity log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Option<i64>,
    pub tenant_id: i64,
    pub message: String,
    pub level: LogLevel,
    pub logged_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// Daily activity counters for one tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: String,
    pub acquired: i64,
    pub generated: i64,
    pub queued: i64,
}

/// The voice a generated reply should take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Professional,
    Casual,
    Witty,
    Friendly,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Tone::Professional, Tone::Casual, Tone::Witty, Tone::Friendly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Witty => "witty",
            Tone::Friendly => "friendly",
        }
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "professional" => Ok(Tone::Professional),
            "casual" => Ok(Tone::Casual),
            "witty" => Ok(Tone::Witty),
            "friendly" => Ok(Tone::Friendly),
            _ => Err(format!(
                "Invalid tone: '{}'. Valid options: professional, casual, witty, friendly",
                s
            )),
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a tenant's batch session.
///
/// `processing: false` with zeroed counters means no session exists; the
/// snapshot is always well-defined, never a stuck intermediate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub processing: bool,
    pub cursor: usize,
    pub total: usize,
    pub current: Option<String>,
}
