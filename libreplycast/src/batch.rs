//! Batch orchestration
//!
//! One background task per tenant drives a list of input references through
//! dedup → cache → acquisition → generation → queue insertion, strictly
//! sequentially. The session registry enforces at most one live session per
//! tenant; cancellation is cooperative through a token observed at every
//! iteration boundary and inside every sleep, so even the multi-minute
//! rate-limit cooldown reacts within a second. However the task ends —
//! completion, stop, or a panic caught at the top — the session is torn
//! down in a guaranteed cleanup step so status never reports a stuck
//! "processing forever" state.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acquisition::AcquireEngine;
use crate::cache::ContentCache;
use crate::config::{BatchConfig, GenerationConfig};
use crate::db::{Database, StatKind};
use crate::dedup::DedupGuard;
use crate::error::{BatchError, ReplycastError, Result};
use crate::generation::{sanitize_reply, ReplyGenerator};
use crate::ident::extract_post_id;
use crate::types::{BatchSnapshot, LogLevel, Tone};

/// Timing and retry knobs for the batch loop.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    /// Backoff applied once per reference when acquisition is exhausted.
    pub cooldown: Duration,
    /// Throttle between references.
    pub item_delay: Duration,
    /// Bounded attempts for a single reference's acquisition.
    pub retry_attempts: u32,
    /// Timeout on each acquisition attempt.
    pub attempt_timeout: Duration,
    /// Timeout on the generation call.
    pub generation_timeout: Duration,
}

impl BatchPolicy {
    pub fn from_config(batch: &BatchConfig, generation: &GenerationConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(batch.cooldown_secs),
            item_delay: Duration::from_millis(batch.item_delay_ms),
            retry_attempts: batch.retry_attempts,
            attempt_timeout: Duration::from_secs(batch.attempt_timeout_secs),
            generation_timeout: Duration::from_secs(generation.timeout_secs),
        }
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default(), &GenerationConfig::default())
    }
}

struct SessionState {
    total: usize,
    cursor: AtomicUsize,
    current: Mutex<Option<String>>,
    processing: AtomicBool,
}

struct SessionHandle {
    state: Arc<SessionState>,
    cancel: CancellationToken,
}

enum LoopEnd {
    Completed,
    Stopped,
}

enum StepOutcome {
    Done,
    Skipped,
    Stopped,
}

enum AcquireOutcome {
    Text { text: String, fresh: bool },
    Exhausted,
    Failed(String),
    Stopped,
}

pub struct BatchManager {
    db: Arc<Database>,
    cache: ContentCache,
    dedup: DedupGuard,
    engine: Arc<AcquireEngine>,
    generator: Arc<dyn ReplyGenerator>,
    policy: BatchPolicy,
    sessions: Mutex<HashMap<i64, SessionHandle>>,
}

impl BatchManager {
    pub fn new(
        db: Arc<Database>,
        engine: Arc<AcquireEngine>,
        generator: Arc<dyn ReplyGenerator>,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            cache: ContentCache::new(db.clone()),
            dedup: DedupGuard::new(db.clone()),
            db,
            engine,
            generator,
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a batch session for a tenant.
    ///
    /// Fails with `BatchError::AlreadyRunning` — creating nothing — when the
    /// tenant already has a processing session. The liveness check and the
    /// insert happen under one lock, so racing starts cannot both win.
    pub async fn start(
        self: Arc<Self>,
        tenant_id: i64,
        references: Vec<String>,
        tone: Tone,
    ) -> Result<()> {
        if references.is_empty() {
            return Err(BatchError::NoInput.into());
        }

        let state = Arc::new(SessionState {
            total: references.len(),
            cursor: AtomicUsize::new(0),
            current: Mutex::new(None),
            processing: AtomicBool::new(true),
        });
        let cancel = CancellationToken::new();

        {
            let mut sessions = self.sessions.lock().unwrap();
            if let Some(existing) = sessions.get(&tenant_id) {
                if existing.state.processing.load(Ordering::SeqCst) {
                    return Err(BatchError::AlreadyRunning(tenant_id).into());
                }
            }
            sessions.insert(
                tenant_id,
                SessionHandle {
                    state: state.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        self.log(
            tenant_id,
            format!("Started batch processing for {} references", references.len()),
            LogLevel::Info,
        )
        .await;

        tokio::spawn(async move {
            self.drive(tenant_id, references, tone, state, cancel).await;
        });

        Ok(())
    }

    /// Signal a tenant's running session to stop. Cooperative: the loop
    /// observes the token at its next suspension point. Returns false when
    /// nothing was running.
    pub async fn stop(&self, tenant_id: i64) -> bool {
        let signalled = {
            let sessions = self.sessions.lock().unwrap();
            match sessions.get(&tenant_id) {
                Some(handle) if handle.state.processing.load(Ordering::SeqCst) => {
                    handle.cancel.cancel();
                    true
                }
                _ => false,
            }
        };

        if signalled {
            self.log(tenant_id, "Stopping batch process...".to_string(), LogLevel::Warning)
                .await;
        }
        signalled
    }

    /// Current snapshot for a tenant; idle default when no session exists.
    pub fn status(&self, tenant_id: i64) -> BatchSnapshot {
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(&tenant_id) {
            Some(handle) => BatchSnapshot {
                processing: handle.state.processing.load(Ordering::SeqCst),
                cursor: handle.state.cursor.load(Ordering::SeqCst),
                total: handle.state.total,
                current: handle.state.current.lock().unwrap().clone(),
            },
            None => BatchSnapshot::default(),
        }
    }

    /// Wait until the tenant has no processing session, polling the
    /// registry. Returns false if the deadline elapses first.
    pub async fn wait_until_idle(&self, tenant_id: i64, deadline: Duration) -> bool {
        let poll = Duration::from_millis(50);
        let mut waited = Duration::ZERO;
        while self.status(tenant_id).processing {
            if waited >= deadline {
                return false;
            }
            sleep(poll).await;
            waited += poll;
        }
        true
    }

    async fn drive(
        &self,
        tenant_id: i64,
        references: Vec<String>,
        tone: Tone,
        state: Arc<SessionState>,
        cancel: CancellationToken,
    ) {
        let outcome = AssertUnwindSafe(self.run_loop(tenant_id, &references, tone, &state, &cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(LoopEnd::Completed) => {
                self.log(tenant_id, "Batch processing complete".to_string(), LogLevel::Success)
                    .await;
            }
            Ok(LoopEnd::Stopped) => {
                self.log(
                    tenant_id,
                    "Batch processing stopped by user".to_string(),
                    LogLevel::Warning,
                )
                .await;
            }
            Err(panic) => {
                self.log(
                    tenant_id,
                    format!("Batch processing crashed: {}", panic_detail(panic)),
                    LogLevel::Error,
                )
                .await;
            }
        }

        // Guaranteed teardown on every exit path, the crash included. The
        // pointer check keeps a newer session, started after our processing
        // flag dropped, from being evicted by this cleanup.
        state.processing.store(false, Ordering::SeqCst);
        *state.current.lock().unwrap() = None;
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(handle) = sessions.get(&tenant_id) {
            if Arc::ptr_eq(&handle.state, &state) {
                sessions.remove(&tenant_id);
            }
        }
    }

    async fn run_loop(
        &self,
        tenant_id: i64,
        references: &[String],
        tone: Tone,
        state: &SessionState,
        cancel: &CancellationToken,
    ) -> LoopEnd {
        for (index, reference) in references.iter().enumerate() {
            if cancel.is_cancelled() {
                return LoopEnd::Stopped;
            }

            state.cursor.store(index, Ordering::SeqCst);
            *state.current.lock().unwrap() = Some(reference.clone());

            self.log(
                tenant_id,
                format!("[{}/{}] Processing: {}", index + 1, references.len(), reference),
                LogLevel::Info,
            )
            .await;

            match self.process_reference(tenant_id, reference, tone, cancel).await {
                StepOutcome::Done | StepOutcome::Skipped => {}
                StepOutcome::Stopped => return LoopEnd::Stopped,
            }

            // Throttle outbound call rate between references.
            if self.pause(self.policy.item_delay, cancel).await {
                return LoopEnd::Stopped;
            }
        }

        LoopEnd::Completed
    }

    /// One reference through the whole pipeline. Failures here are
    /// per-item: they are logged and the batch moves on.
    async fn process_reference(
        &self,
        tenant_id: i64,
        reference: &str,
        tone: Tone,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let item_id = match extract_post_id(reference) {
            Ok(id) => id,
            Err(e) => {
                self.log(tenant_id, format!("Skipping reference: {}", e), LogLevel::Warning)
                    .await;
                return StepOutcome::Skipped;
            }
        };

        match self.dedup.has_processed(tenant_id, &item_id).await {
            Ok(true) => {
                self.log(
                    tenant_id,
                    format!("Skipping {}: already queued or in history", item_id),
                    LogLevel::Warning,
                )
                .await;
                return StepOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                self.log(
                    tenant_id,
                    format!("Dedup check failed for {}: {}", item_id, e),
                    LogLevel::Error,
                )
                .await;
                return StepOutcome::Skipped;
            }
        }

        // A cache read failure must never block acquisition; treat it as a
        // miss.
        let cached = match self.cache.get(&item_id).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(tenant_id, %item_id, %e, "cache read failed, acquiring fresh");
                None
            }
        };

        let (text, fresh) = match cached {
            Some(text) => {
                self.log(
                    tenant_id,
                    format!("Found {} in shared cache, skipping acquisition", item_id),
                    LogLevel::Info,
                )
                .await;
                (text, false)
            }
            None => {
                self.log(tenant_id, format!("Acquiring {}...", item_id), LogLevel::Info)
                    .await;
                match self.acquire_step(tenant_id, &item_id, cancel).await {
                    AcquireOutcome::Text { text, fresh } => (text, fresh),
                    AcquireOutcome::Stopped => return StepOutcome::Stopped,
                    AcquireOutcome::Exhausted => {
                        // Rate-limit pause policy: cool down once, retry the
                        // same reference once, then give up on it.
                        self.log(
                            tenant_id,
                            format!(
                                "Rate limit reached. Pausing for {}s...",
                                self.policy.cooldown.as_secs()
                            ),
                            LogLevel::Warning,
                        )
                        .await;
                        if self.cooldown(tenant_id, cancel).await {
                            return StepOutcome::Stopped;
                        }
                        self.log(
                            tenant_id,
                            format!("Resuming, retrying {}", item_id),
                            LogLevel::Info,
                        )
                        .await;
                        match self.acquire_step(tenant_id, &item_id, cancel).await {
                            AcquireOutcome::Text { text, fresh } => (text, fresh),
                            AcquireOutcome::Stopped => return StepOutcome::Stopped,
                            AcquireOutcome::Exhausted => {
                                self.log(
                                    tenant_id,
                                    format!("Still exhausted after cooldown, skipping {}", item_id),
                                    LogLevel::Error,
                                )
                                .await;
                                return StepOutcome::Skipped;
                            }
                            AcquireOutcome::Failed(detail) => {
                                self.log(
                                    tenant_id,
                                    format!("Retry after cooldown failed: {}", detail),
                                    LogLevel::Error,
                                )
                                .await;
                                return StepOutcome::Skipped;
                            }
                        }
                    }
                    AcquireOutcome::Failed(detail) => {
                        self.log(
                            tenant_id,
                            format!("Acquisition failed for {}: {}", item_id, detail),
                            LogLevel::Error,
                        )
                        .await;
                        return StepOutcome::Skipped;
                    }
                }
            }
        };

        if fresh {
            // Best-effort write-through; a cache failure is non-fatal.
            if let Err(e) = self.cache.put(&item_id, &text).await {
                warn!(tenant_id, %item_id, %e, "failed to cache resolved text");
            }
            if let Err(e) = self.db.bump_stat(tenant_id, StatKind::Acquired).await {
                warn!(tenant_id, %e, "failed to bump acquired stat");
            }
        }

        self.log(tenant_id, "Generating reply...".to_string(), LogLevel::Info)
            .await;

        let reply = match timeout(
            self.policy.generation_timeout,
            self.generator.generate(&text, tone),
        )
        .await
        {
            Ok(Ok(reply)) => sanitize_reply(&reply),
            Ok(Err(e)) => {
                self.log(tenant_id, format!("Generation failed: {}", e), LogLevel::Error)
                    .await;
                return StepOutcome::Skipped;
            }
            Err(_) => {
                self.log(
                    tenant_id,
                    format!(
                        "Generation timed out after {}s",
                        self.policy.generation_timeout.as_secs()
                    ),
                    LogLevel::Error,
                )
                .await;
                return StepOutcome::Skipped;
            }
        };

        if reply.is_empty() {
            self.log(
                tenant_id,
                format!("Generation returned an empty reply for {}", item_id),
                LogLevel::Error,
            )
            .await;
            return StepOutcome::Skipped;
        }

        if let Err(e) = self.db.bump_stat(tenant_id, StatKind::Generated).await {
            warn!(tenant_id, %e, "failed to bump generated stat");
        }

        match self.db.enqueue(tenant_id, &item_id, &text, &reply).await {
            Ok(_) => {
                self.log(
                    tenant_id,
                    format!("Added draft reply for {} to review queue", item_id),
                    LogLevel::Success,
                )
                .await;
                if let Err(e) = self.db.bump_stat(tenant_id, StatKind::Queued).await {
                    warn!(tenant_id, %e, "failed to bump queued stat");
                }
                StepOutcome::Done
            }
            Err(e) => {
                self.log(tenant_id, format!("Failed to queue reply: {}", e), LogLevel::Error)
                    .await;
                StepOutcome::Skipped
            }
        }
    }

    /// Bounded acquisition wrapper: retries timed-out attempts with
    /// exponential backoff. Typed failures pass through immediately —
    /// `Exhausted` goes to the cooldown path, everything else skips the
    /// reference.
    async fn acquire_step(
        &self,
        tenant_id: i64,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> AcquireOutcome {
        let max_attempts = self.policy.retry_attempts.max(1);

        for attempt in 1..=max_attempts {
            match timeout(
                self.policy.attempt_timeout,
                self.engine.resolve(item_id, tenant_id, None),
            )
            .await
            {
                Ok(Ok(text)) => return AcquireOutcome::Text { text, fresh: true },
                Ok(Err(ReplycastError::Acquire(e))) if e.is_exhausted() => {
                    return AcquireOutcome::Exhausted;
                }
                Ok(Err(e)) => return AcquireOutcome::Failed(e.to_string()),
                Err(_) => {
                    if attempt < max_attempts {
                        let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                        warn!(
                            tenant_id,
                            item_id, attempt, "acquisition attempt timed out, backing off"
                        );
                        if self.pause(backoff, cancel).await {
                            return AcquireOutcome::Stopped;
                        }
                    }
                }
            }
        }

        AcquireOutcome::Failed(format!(
            "acquisition timed out after {} attempts",
            max_attempts
        ))
    }

    /// The rate-limit cooldown, sliced into one-second waits so the stop
    /// token interrupts promptly. Progress notices go to the durable log
    /// once a minute and through the final ten seconds. Returns true when
    /// stopped.
    async fn cooldown(&self, tenant_id: i64, cancel: &CancellationToken) -> bool {
        let mut remaining = self.policy.cooldown.as_secs();
        while remaining > 0 {
            if remaining % 60 == 0 || remaining <= 10 {
                self.log(
                    tenant_id,
                    format!("Resuming in {}m {}s...", remaining / 60, remaining % 60),
                    LogLevel::Warning,
                )
                .await;
            }
            if self.pause(Duration::from_secs(1), cancel).await {
                return true;
            }
            remaining -= 1;
        }
        false
    }

    /// Interruptible sleep. True when the stop token fired first.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }

    /// Mirror a batch event to tracing and the tenant's durable log.
    async fn log(&self, tenant_id: i64, message: String, level: LogLevel) {
        match level {
            LogLevel::Error => error!(tenant_id, "{}", message),
            LogLevel::Warning => warn!(tenant_id, "{}", message),
            _ => info!(tenant_id, "{}", message),
        }
        if let Err(e) = self.db.append_log(tenant_id, &message, level).await {
            warn!(tenant_id, %e, "failed to write activity log");
        }
    }
}

fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
