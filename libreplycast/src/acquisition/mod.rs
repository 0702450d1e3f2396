//! Content acquisition with credential rotation and browser fallback
//!
//! The engine tries every available credential against the primary
//! structured-data API, classifying each failure, then falls back to a
//! browser-automation scrape when the whole pool is spent. A resolution
//! either yields text, a typed authoritative failure, or an `Exhausted`
//! summary the orchestrator uses to trigger its rate-limit backoff.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::credentials::CredentialPool;
use crate::error::{AcquireError, FetchError, Result};
use crate::ident::canonical_status_url;
use crate::types::Credential;

pub mod api;
pub mod browser;
pub mod extract;

// Mock seams are available in all builds so integration tests can drive the
// engine and the orchestrator without credentials or a browser.
pub mod mock;

/// Payload returned by the primary structured-data fetch. Carries both the
/// standard text and, for long posts, the extended note text.
#[derive(Debug, Clone, Default)]
pub struct StatusPayload {
    pub text: String,
    pub note_text: Option<String>,
}

impl StatusPayload {
    /// The text a resolution should use: long-form when present.
    pub fn best_text(&self) -> &str {
        match &self.note_text {
            Some(note) if !note.is_empty() => note,
            _ => &self.text,
        }
    }
}

/// Primary acquisition seam: one structured fetch under one credential.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(
        &self,
        credential: &Credential,
        item_id: &str,
    ) -> std::result::Result<StatusPayload, FetchError>;
}

/// Secondary acquisition seam: resolve text by rendering the canonical URL
/// and inspecting intercepted structured responses. `Ok(None)` means the
/// wait window elapsed without a capture.
#[async_trait]
pub trait FallbackResolver: Send + Sync {
    async fn resolve_via_page(
        &self,
        url: &str,
        item_id: &str,
        tenant_id: i64,
    ) -> Result<Option<String>>;
}

pub struct AcquireEngine {
    pool: CredentialPool,
    fetcher: Arc<dyn StatusFetcher>,
    fallback: Arc<dyn FallbackResolver>,
    credential_cooldown: Duration,
    status_url_base: String,
}

impl AcquireEngine {
    pub fn new(
        pool: CredentialPool,
        fetcher: Arc<dyn StatusFetcher>,
        fallback: Arc<dyn FallbackResolver>,
        network: &NetworkConfig,
    ) -> Self {
        Self {
            pool,
            fetcher,
            fallback,
            credential_cooldown: Duration::from_secs(network.credential_cooldown_secs),
            status_url_base: network.status_url.clone(),
        }
    }

    /// Resolve the text of one post for one tenant.
    ///
    /// Rotates through a freshly built, shuffled credential pool, then runs
    /// the browser fallback once. Writing a success to the content cache is
    /// the caller's job, not the engine's.
    ///
    /// # Errors
    ///
    /// - `AcquireError::NotConfigured` when the tenant has no credentials
    ///   anywhere.
    /// - `AcquireError::NotFound` the moment the primary path reports the
    ///   post deleted or private; remaining credentials and the fallback are
    ///   skipped because no other identity can change that answer.
    /// - `AcquireError::Exhausted` when every credential and the fallback
    ///   failed, carrying the per-attempt summary.
    pub async fn resolve(
        &self,
        item_id: &str,
        tenant_id: i64,
        source_url: Option<&str>,
    ) -> Result<String> {
        let mut credentials = self.pool.credentials_for(tenant_id).await?;
        if credentials.is_empty() {
            return Err(AcquireError::NotConfigured(tenant_id).into());
        }

        // Uniform shuffle spreads load across callers resolving many posts
        // at once; this is load balancing, not security randomness.
        credentials.shuffle(&mut rand::thread_rng());

        let mut attempts: Vec<String> = Vec::with_capacity(credentials.len() + 1);

        for (index, credential) in credentials.iter().enumerate() {
            if index > 0 {
                sleep(self.credential_cooldown).await;
            }

            debug!(
                tenant_id,
                item_id,
                credential = index + 1,
                "trying primary fetch"
            );

            match self.fetcher.fetch_status(credential, item_id).await {
                Ok(payload) => {
                    let text = payload.best_text();
                    if text.is_empty() {
                        warn!(item_id, credential = index + 1, "empty response");
                        attempts.push(format!("credential #{}: empty response", index + 1));
                        continue;
                    }
                    info!(tenant_id, item_id, "resolved via primary API");
                    return Ok(text.to_string());
                }
                // Deleted/private is authoritative: no other credential can
                // see a post that no longer exists.
                Err(FetchError::NotFound) => {
                    info!(item_id, "post not found, aborting rotation");
                    return Err(AcquireError::NotFound(item_id.to_string()).into());
                }
                Err(err) => {
                    warn!(item_id, credential = index + 1, %err, "primary fetch failed");
                    attempts.push(format!("credential #{}: {}", index + 1, err));
                }
            }
        }

        info!(tenant_id, item_id, "credential pool spent, trying browser fallback");

        let constructed;
        let url = match source_url {
            Some(url) => url,
            None => {
                constructed = canonical_status_url(&self.status_url_base, item_id);
                &constructed
            }
        };

        match self.fallback.resolve_via_page(url, item_id, tenant_id).await {
            Ok(Some(text)) if !text.is_empty() => {
                info!(tenant_id, item_id, "resolved via browser fallback");
                return Ok(text);
            }
            Ok(_) => attempts.push("fallback: no text captured".to_string()),
            Err(err) => attempts.push(format!("fallback: {}", err)),
        }

        Err(AcquireError::Exhausted {
            item_id: item_id.to_string(),
            attempts: credentials.len(),
            summary: attempts.join("; "),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockFallback, MockFetcher};
    use super::*;
    use crate::db::Database;
    use crate::error::ReplycastError;

    fn network() -> NetworkConfig {
        NetworkConfig {
            credential_cooldown_secs: 0,
            ..Default::default()
        }
    }

    fn credential(tag: &str) -> Credential {
        Credential {
            api_key: format!("key-{}", tag),
            api_secret: String::new(),
            access_token: String::new(),
            access_secret: String::new(),
            bearer: format!("bearer-{}", tag),
        }
    }

    async fn engine_with(
        system: Vec<Credential>,
        fetcher: Arc<MockFetcher>,
        fallback: Arc<MockFallback>,
    ) -> AcquireEngine {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let pool = CredentialPool::new(system, db);
        AcquireEngine::new(pool, fetcher, fallback, &network())
    }

    #[tokio::test]
    async fn test_empty_pool_is_not_configured() {
        let fetcher = Arc::new(MockFetcher::always_text("unused"));
        let fallback = Arc::new(MockFallback::none());
        let engine = engine_with(Vec::new(), fetcher.clone(), fallback.clone()).await;

        let err = engine.resolve("111", 1, None).await.unwrap_err();
        match err {
            ReplycastError::Acquire(AcquireError::NotConfigured(1)) => {}
            other => panic!("expected NotConfigured, got {:?}", other),
        }
        // neither path was touched
        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let fetcher = Arc::new(MockFetcher::always_text("hello"));
        let fallback = Arc::new(MockFallback::none());
        let engine = engine_with(
            vec![credential("a"), credential("b"), credential("c")],
            fetcher.clone(),
            fallback.clone(),
        )
        .await;

        let text = engine.resolve("111", 1, None).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_note_text_preferred() {
        let fetcher = Arc::new(MockFetcher::always_payload(StatusPayload {
            text: "short".to_string(),
            note_text: Some("the long form".to_string()),
        }));
        let fallback = Arc::new(MockFallback::none());
        let engine = engine_with(vec![credential("a")], fetcher, fallback).await;

        assert_eq!(engine.resolve("111", 1, None).await.unwrap(), "the long form");
    }

    #[tokio::test]
    async fn test_rate_limited_rotates_to_next_credential() {
        let fetcher = Arc::new(MockFetcher::script(vec![
            Err(FetchError::RateLimited),
            Err(FetchError::Forbidden),
            Ok(StatusPayload {
                text: "third time lucky".to_string(),
                note_text: None,
            }),
        ]));
        let fallback = Arc::new(MockFallback::none());
        let engine = engine_with(
            vec![credential("a"), credential("b"), credential("c")],
            fetcher.clone(),
            fallback.clone(),
        )
        .await;

        let text = engine.resolve("111", 1, None).await.unwrap();
        assert_eq!(text, "third time lucky");
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_not_found_short_circuits() {
        let fetcher = Arc::new(MockFetcher::script(vec![
            Err(FetchError::NotFound),
            Ok(StatusPayload {
                text: "never reached".to_string(),
                note_text: None,
            }),
        ]));
        let fallback = Arc::new(MockFallback::returning("never reached either"));
        let engine = engine_with(
            vec![credential("a"), credential("b"), credential("c")],
            fetcher.clone(),
            fallback.clone(),
        )
        .await;

        let err = engine.resolve("404404404404404", 1, None).await.unwrap_err();
        match err {
            ReplycastError::Acquire(AcquireError::NotFound(id)) => {
                assert_eq!(id, "404404404404404");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
        // remaining credentials skipped, fallback never invoked
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_rescues_exhausted_rotation() {
        let fetcher = Arc::new(MockFetcher::always_err(FetchError::RateLimited));
        let fallback = Arc::new(MockFallback::returning("world"));
        let engine = engine_with(
            vec![credential("a"), credential("b"), credential("c")],
            fetcher.clone(),
            fallback.clone(),
        )
        .await;

        let text = engine.resolve("222", 1, None).await.unwrap();
        assert_eq!(text, "world");
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_carries_attempt_summary() {
        let fetcher = Arc::new(MockFetcher::always_err(FetchError::RateLimited));
        let fallback = Arc::new(MockFallback::none());
        let engine = engine_with(
            vec![credential("a"), credential("b")],
            fetcher,
            fallback.clone(),
        )
        .await;

        let err = engine.resolve("333", 1, None).await.unwrap_err();
        match err {
            ReplycastError::Acquire(acquire) => {
                assert!(acquire.is_exhausted());
                let message = format!("{}", acquire);
                assert!(message.contains("exhausted"));
                assert!(message.contains("rate limited"));
                assert!(message.contains("no text captured"));
            }
            other => panic!("expected Acquire error, got {:?}", other),
        }
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_gets_constructed_url_when_none_supplied() {
        let fetcher = Arc::new(MockFetcher::always_err(FetchError::Unauthorized));
        let fallback = Arc::new(MockFallback::returning("scraped"));
        let engine = engine_with(vec![credential("a")], fetcher, fallback.clone()).await;

        engine.resolve("5555555555555555", 1, None).await.unwrap();
        let urls = fallback.seen_urls();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with("/5555555555555555"));
    }

    #[tokio::test]
    async fn test_fallback_gets_supplied_source_url() {
        let fetcher = Arc::new(MockFetcher::always_err(FetchError::Unauthorized));
        let fallback = Arc::new(MockFallback::returning("scraped"));
        let engine = engine_with(vec![credential("a")], fetcher, fallback.clone()).await;

        engine
            .resolve("666", 1, Some("https://example.social/p/666"))
            .await
            .unwrap();
        assert_eq!(fallback.seen_urls(), vec!["https://example.social/p/666"]);
    }

    #[tokio::test]
    async fn test_empty_response_counts_as_failure() {
        let fetcher = Arc::new(MockFetcher::script(vec![
            Ok(StatusPayload::default()),
            Ok(StatusPayload {
                text: "real text".to_string(),
                note_text: None,
            }),
        ]));
        let fallback = Arc::new(MockFallback::none());
        let engine = engine_with(
            vec![credential("a"), credential("b")],
            fetcher.clone(),
            fallback,
        )
        .await;

        assert_eq!(engine.resolve("777", 1, None).await.unwrap(), "real text");
        assert_eq!(fetcher.call_count(), 2);
    }
}
