//! Mock acquisition seams for testing
//!
//! Scriptable implementations of `StatusFetcher` and `FallbackResolver`
//! with call counters, so engine and orchestrator behavior can be verified
//! without credentials, network access, or a browser. Available in all
//! builds to support integration tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{BrowserError, FetchError, Result};
use crate::types::Credential;

use super::{FallbackResolver, StatusFetcher, StatusPayload};

type FetchOutcome = std::result::Result<StatusPayload, FetchError>;

/// Scripted primary fetcher. Outcomes are consumed in order; once the
/// script is empty the default outcome repeats.
pub struct MockFetcher {
    script: Mutex<VecDeque<FetchOutcome>>,
    default: FetchOutcome,
    calls: Mutex<usize>,
}

impl MockFetcher {
    pub fn script(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            default: Err(FetchError::Transient("script exhausted".to_string())),
            calls: Mutex::new(0),
        }
    }

    /// Every call succeeds with the given standard text.
    pub fn always_text(text: &str) -> Self {
        Self::always_payload(StatusPayload {
            text: text.to_string(),
            note_text: None,
        })
    }

    pub fn always_payload(payload: StatusPayload) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Ok(payload),
            calls: Mutex::new(0),
        }
    }

    pub fn always_err(err: FetchError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Err(err),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl StatusFetcher for MockFetcher {
    async fn fetch_status(
        &self,
        _credential: &Credential,
        _item_id: &str,
    ) -> std::result::Result<StatusPayload, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Scripted browser fallback recording the URLs it was asked to render.
pub struct MockFallback {
    outcome: FallbackOutcome,
    calls: Mutex<usize>,
    urls: Mutex<Vec<String>>,
}

enum FallbackOutcome {
    Text(String),
    Nothing,
    Failure(String),
}

impl MockFallback {
    /// Fallback captures the given text.
    pub fn returning(text: &str) -> Self {
        Self {
            outcome: FallbackOutcome::Text(text.to_string()),
            calls: Mutex::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Fallback completes without capturing anything.
    pub fn none() -> Self {
        Self {
            outcome: FallbackOutcome::Nothing,
            calls: Mutex::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Fallback fails mechanically (launch error etc.).
    pub fn failing(detail: &str) -> Self {
        Self {
            outcome: FallbackOutcome::Failure(detail.to_string()),
            calls: Mutex::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn seen_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FallbackResolver for MockFallback {
    async fn resolve_via_page(
        &self,
        url: &str,
        _item_id: &str,
        _tenant_id: i64,
    ) -> Result<Option<String>> {
        *self.calls.lock().unwrap() += 1;
        self.urls.lock().unwrap().push(url.to_string());
        match &self.outcome {
            FallbackOutcome::Text(text) => Ok(Some(text.clone())),
            FallbackOutcome::Nothing => Ok(None),
            FallbackOutcome::Failure(detail) => {
                Err(BrowserError::Launch(detail.clone()).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            access_token: "t".to_string(),
            access_secret: "ts".to_string(),
            bearer: "b".to_string(),
        }
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let fetcher = MockFetcher::script(vec![Err(FetchError::RateLimited)]);
        let first = fetcher.fetch_status(&credential(), "1").await;
        assert_eq!(first.unwrap_err(), FetchError::RateLimited);

        // script exhausted, default transient error repeats
        let second = fetcher.fetch_status(&credential(), "1").await;
        assert!(matches!(second.unwrap_err(), FetchError::Transient(_)));
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_records_urls() {
        let fallback = MockFallback::returning("text");
        let result = fallback
            .resolve_via_page("https://example.social/p/1", "1", 7)
            .await
            .unwrap();
        assert_eq!(result, Some("text".to_string()));
        assert_eq!(fallback.seen_urls(), vec!["https://example.social/p/1"]);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_fallback() {
        let fallback = MockFallback::failing("no chrome");
        let result = fallback.resolve_via_page("u", "1", 7).await;
        assert!(result.is_err());
    }
}
