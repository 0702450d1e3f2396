//! End-to-end pipeline tests over a real on-disk database
//!
//! These drive the batch manager through the mock acquisition and
//! generation seams, with migrations applied to a tempfile database the
//! way the binaries do it.

use std::sync::Arc;
use std::time::Duration;

use libreplycast::acquisition::mock::{MockFallback, MockFetcher};
use libreplycast::acquisition::{AcquireEngine, StatusPayload};
use libreplycast::batch::{BatchManager, BatchPolicy};
use libreplycast::config::NetworkConfig;
use libreplycast::error::FetchError;
use libreplycast::generation::MockGenerator;
use libreplycast::{Credential, CredentialPool, Database, Tone};
use tempfile::TempDir;

fn fast_policy() -> BatchPolicy {
    BatchPolicy {
        cooldown: Duration::from_secs(1),
        item_delay: Duration::from_millis(1),
        retry_attempts: 3,
        attempt_timeout: Duration::from_secs(5),
        generation_timeout: Duration::from_secs(5),
    }
}

fn credential(tag: &str) -> Credential {
    Credential {
        api_key: format!("key-{}", tag),
        api_secret: "secret".to_string(),
        access_token: "token".to_string(),
        access_secret: "token-secret".to_string(),
        bearer: format!("bearer-{}", tag),
    }
}

fn no_credential_cooldown() -> NetworkConfig {
    NetworkConfig {
        credential_cooldown_secs: 0,
        ..Default::default()
    }
}

async fn disk_db() -> (TempDir, Arc<Database>) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("replycast.db");
    let db = Database::new(&path.to_string_lossy()).await.unwrap();
    (temp, Arc::new(db))
}

#[tokio::test]
async fn cached_item_enqueues_without_network_then_fresh_item_acquires() {
    let (_temp, db) = disk_db().await;

    // "111..." already resolved by some other tenant
    db.put_cached_content("111111111111111111", "hello").await.unwrap();

    let fetcher = Arc::new(MockFetcher::always_payload(StatusPayload {
        text: "fresh text".to_string(),
        note_text: None,
    }));
    let fallback = Arc::new(MockFallback::none());
    let generator = Arc::new(MockGenerator::replying("sounds great"));

    let pool = CredentialPool::new(vec![credential("a")], db.clone());
    let engine = Arc::new(AcquireEngine::new(
        pool,
        fetcher.clone(),
        fallback.clone(),
        &no_credential_cooldown(),
    ));
    let manager = Arc::new(BatchManager::new(
        db.clone(),
        engine,
        generator.clone(),
        fast_policy(),
    ));

    manager
        .clone()
        .start(
            1,
            vec![
                "111111111111111111".to_string(),
                "222222222222222222".to_string(),
            ],
            Tone::Professional,
        )
        .await
        .unwrap();
    assert!(manager.wait_until_idle(1, Duration::from_secs(10)).await);

    // the cached item made no network calls at all
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(fallback.call_count(), 0);

    let queue = db.list_queue(1).await.unwrap();
    assert_eq!(queue.len(), 2);

    let cached = queue.iter().find(|q| q.item_id == "111111111111111111").unwrap();
    assert_eq!(cached.source_text.as_deref(), Some("hello"));
    assert_eq!(cached.reply_text, "sounds great");

    // the generator saw the cached text verbatim
    assert!(generator
        .calls()
        .iter()
        .any(|(text, _)| text == "hello"));
}

#[tokio::test]
async fn fallback_text_is_cached_under_the_item_id() {
    let (_temp, db) = disk_db().await;

    // three credentials, every primary attempt rate limited
    let fetcher = Arc::new(MockFetcher::always_err(FetchError::RateLimited));
    let fallback = Arc::new(MockFallback::returning("world"));
    let generator = Arc::new(MockGenerator::replying("draft"));

    let pool = CredentialPool::new(
        vec![credential("a"), credential("b"), credential("c")],
        db.clone(),
    );
    let engine = Arc::new(AcquireEngine::new(
        pool,
        fetcher.clone(),
        fallback.clone(),
        &no_credential_cooldown(),
    ));
    let manager = Arc::new(BatchManager::new(
        db.clone(),
        engine,
        generator,
        fast_policy(),
    ));

    manager
        .clone()
        .start(1, vec!["333333333333333333".to_string()], Tone::Casual)
        .await
        .unwrap();
    assert!(manager.wait_until_idle(1, Duration::from_secs(10)).await);

    // every credential was tried before the fallback rescued the item
    assert_eq!(fetcher.call_count(), 3);
    assert_eq!(fallback.call_count(), 1);

    // the resolved text was written through to the shared cache
    assert_eq!(
        db.get_cached_content("333333333333333333").await.unwrap(),
        Some("world".to_string())
    );

    let queue = db.list_queue(1).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].source_text.as_deref(), Some("world"));
}

#[tokio::test]
async fn one_tenants_resolution_short_circuits_anothers() {
    let (_temp, db) = disk_db().await;

    let fetcher = Arc::new(MockFetcher::always_text("resolved once"));
    let fallback = Arc::new(MockFallback::none());
    let generator = Arc::new(MockGenerator::replying("draft"));

    let pool = CredentialPool::new(vec![credential("a")], db.clone());
    let engine = Arc::new(AcquireEngine::new(
        pool,
        fetcher.clone(),
        fallback,
        &no_credential_cooldown(),
    ));
    let manager = Arc::new(BatchManager::new(
        db.clone(),
        engine,
        generator,
        fast_policy(),
    ));

    manager
        .clone()
        .start(1, vec!["444444444444444444".to_string()], Tone::Friendly)
        .await
        .unwrap();
    assert!(manager.wait_until_idle(1, Duration::from_secs(10)).await);

    manager
        .clone()
        .start(2, vec!["444444444444444444".to_string()], Tone::Friendly)
        .await
        .unwrap();
    assert!(manager.wait_until_idle(2, Duration::from_secs(10)).await);

    // tenant 2 was served from the shared cache
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(db.list_queue(1).await.unwrap().len(), 1);
    assert_eq!(db.list_queue(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn review_flow_approve_then_dedup_holds() {
    let (_temp, db) = disk_db().await;

    let fetcher = Arc::new(MockFetcher::always_text("post text"));
    let fallback = Arc::new(MockFallback::none());
    let generator = Arc::new(MockGenerator::replying("draft"));

    let pool = CredentialPool::new(vec![credential("a")], db.clone());
    let engine = Arc::new(AcquireEngine::new(
        pool,
        fetcher.clone(),
        fallback,
        &no_credential_cooldown(),
    ));
    let manager = Arc::new(BatchManager::new(
        db.clone(),
        engine,
        generator,
        fast_policy(),
    ));

    manager
        .clone()
        .start(1, vec!["555555555555555555".to_string()], Tone::Witty)
        .await
        .unwrap();
    assert!(manager.wait_until_idle(1, Duration::from_secs(10)).await);

    let queue = db.list_queue(1).await.unwrap();
    let queue_id = queue[0].id.unwrap();
    assert!(db.approve_queue_item(queue_id, 1).await.unwrap());

    // a later batch for the same reference is a no-op
    manager
        .clone()
        .start(1, vec!["555555555555555555".to_string()], Tone::Witty)
        .await
        .unwrap();
    assert!(manager.wait_until_idle(1, Duration::from_secs(10)).await);

    assert!(db.list_queue(1).await.unwrap().is_empty());
    assert_eq!(db.recent_history(1, 10).await.unwrap().len(), 1);
    // the only acquisition was the first batch's
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn batch_logs_reach_the_durable_log() {
    let (_temp, db) = disk_db().await;

    let fetcher = Arc::new(MockFetcher::always_text("post text"));
    let fallback = Arc::new(MockFallback::none());
    let generator = Arc::new(MockGenerator::replying("draft"));

    let pool = CredentialPool::new(vec![credential("a")], db.clone());
    let engine = Arc::new(AcquireEngine::new(
        pool,
        fetcher,
        fallback,
        &no_credential_cooldown(),
    ));
    let manager = Arc::new(BatchManager::new(
        db.clone(),
        engine,
        generator,
        fast_policy(),
    ));

    manager
        .clone()
        .start(1, vec!["666666666666666666".to_string()], Tone::Professional)
        .await
        .unwrap();
    assert!(manager.wait_until_idle(1, Duration::from_secs(10)).await);

    let logs = db.recent_logs(1, 100).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("Started batch")));
    assert!(logs.iter().any(|l| l.message.contains("review queue")));
    assert!(logs
        .iter()
        .any(|l| l.message.contains("Batch processing complete")));
}
