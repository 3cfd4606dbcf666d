//! Event Coalescing Queue
//!
//! Merges bursts of change notifications for the same media key into one
//! resolution call. Each key has at most one pending batch whose debounce
//! deadline is pushed back by every new notification until the batch reaches
//! its hard cap. Batches live in a sharded map, so unrelated keys never
//! serialize on a single lock, and flushes for the same key are serialized.

use crate::concurrency::KeyLockManager;
use crate::config::CoalescerConfig;
use crate::decision::DateDecision;
use crate::error::{ApiError, NotificationError};
use crate::notification::{ChangeNotification, HintPayload};
use crate::resolve::{ResolveRequest, Resolver};
use crate::types::MediaKey;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const REPORT_CHANNEL_CAPACITY: usize = 256;

/// Where a key sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Idle,
    Pending,
    Flushing,
}

/// Result of a successful `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new batch was opened for the key.
    Opened,
    /// The notification joined an existing batch, now holding `hints` entries.
    Merged { hints: usize },
}

/// How one flush ended
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    Resolved(DateDecision),
    Failed(String),
    Panicked(String),
}

impl FlushOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, FlushOutcome::Resolved(_))
    }
}

/// Broadcast after every flush, successful or not
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub key: MediaKey,
    pub hints: usize,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub flushed_at: DateTime<Utc>,
    pub outcome: FlushOutcome,
}

/// Coalescer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Notifications accepted
    pub submitted: u64,
    /// Notifications rejected as malformed or after shutdown
    pub rejected: u64,
    /// Batches opened
    pub batches: u64,
    pub resolved: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Keys with a pending batch right now
    pub pending: usize,
}

/// What a shutdown drain managed to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub flushed: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// Per-key mutable batch state
#[derive(Debug)]
struct PendingBatch {
    key: MediaKey,
    merged_hints: Vec<HintPayload>,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    opened_at: Instant,
    deadline: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl PendingBatch {
    fn request(&self) -> ResolveRequest {
        ResolveRequest::new(self.key.clone())
            .with_first_seen(self.first_seen_at)
            .with_hints(self.merged_hints.clone())
    }
}

struct Inner {
    batches: DashMap<MediaKey, PendingBatch>,
    /// Flushes running or waiting for the per-key flush lock
    flushing: DashMap<MediaKey, usize>,
    flush_locks: KeyLockManager<MediaKey>,
    resolver: Arc<dyn Resolver>,
    config: CoalescerConfig,
    runtime: Handle,
    accepting: AtomicBool,
    generation: AtomicU64,
    /// Batches opened and not yet finished flushing
    outstanding: AtomicUsize,
    idle: Notify,
    stats: RwLock<CoalescerStats>,
    reports: broadcast::Sender<FlushReport>,
}

/// Marks a key as flushing for as long as it lives. A consumed ticket also
/// accounts for its batch being finished when dropped.
struct FlushTicket {
    inner: Arc<Inner>,
    key: MediaKey,
    consumed: bool,
}

impl FlushTicket {
    fn begin(inner: &Arc<Inner>, key: &MediaKey) -> Self {
        *inner.flushing.entry(key.clone()).or_insert(0) += 1;
        Self {
            inner: Arc::clone(inner),
            key: key.clone(),
            consumed: false,
        }
    }

    fn consume(mut self) -> Self {
        self.consumed = true;
        self
    }
}

impl Drop for FlushTicket {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.inner.flushing.entry(self.key.clone()) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
        if self.consumed {
            self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
            self.inner.idle.notify_waiters();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "resolver panicked".to_string()
    }
}

impl Inner {
    async fn run_timer(self: Arc<Self>, key: MediaKey, generation: u64) {
        loop {
            let deadline = match self.batches.get(&key) {
                Some(batch) if batch.generation == generation => batch.deadline,
                _ => return,
            };
            tokio::time::sleep_until(deadline).await;

            let ticket = FlushTicket::begin(&self, &key);
            let removed = self.batches.remove_if(&key, |_, batch| {
                batch.generation == generation && batch.deadline <= Instant::now()
            });
            if let Some((_, batch)) = removed {
                self.flush_batch(batch, ticket.consume()).await;
                return;
            }
        }
    }

    async fn flush_batch(&self, batch: PendingBatch, _ticket: FlushTicket) -> FlushReport {
        let _flush_guard = self.flush_locks.lock(&batch.key).await;
        let request = batch.request();
        debug!(
            key = %batch.key,
            hints = batch.merged_hints.len(),
            "Flushing coalesced batch"
        );

        let result = AssertUnwindSafe(self.resolver.resolve(request))
            .catch_unwind()
            .await;
        let outcome = match result {
            Ok(Ok(decision)) => FlushOutcome::Resolved(decision),
            Ok(Err(e)) => {
                error!(key = %batch.key, error = %e, "Flush failed, key returns to idle");
                FlushOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(key = %batch.key, panic = %message, "Resolver panicked during flush");
                FlushOutcome::Panicked(message)
            }
        };

        {
            let mut stats = self.stats.write();
            match &outcome {
                FlushOutcome::Resolved(_) => stats.resolved += 1,
                FlushOutcome::Failed(_) => stats.failed += 1,
                FlushOutcome::Panicked(_) => stats.panicked += 1,
            }
        }

        let report = FlushReport {
            key: batch.key.clone(),
            hints: batch.merged_hints.len(),
            first_seen_at: batch.first_seen_at,
            last_seen_at: batch.last_seen_at,
            flushed_at: Utc::now(),
            outcome,
        };
        // No subscribers is fine
        let _ = self.reports.send(report.clone());
        report
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Debouncing front door to a `Resolver`
#[derive(Clone)]
pub struct EventCoalescer {
    inner: Arc<Inner>,
}

impl EventCoalescer {
    /// Create a coalescer whose timers run on the current tokio runtime.
    pub fn new(resolver: Arc<dyn Resolver>, config: CoalescerConfig) -> Result<Self, ApiError> {
        let runtime = Handle::try_current().map_err(|e| {
            ApiError::ConfigError(format!("Coalescer needs a tokio runtime: {}", e))
        })?;
        Ok(Self::with_runtime(resolver, config, runtime))
    }

    pub fn with_runtime(resolver: Arc<dyn Resolver>, config: CoalescerConfig, runtime: Handle) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                batches: DashMap::new(),
                flushing: DashMap::new(),
                flush_locks: KeyLockManager::new(),
                resolver,
                config,
                runtime,
                accepting: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
                idle: Notify::new(),
                stats: RwLock::new(CoalescerStats::default()),
                reports,
            }),
        }
    }

    /// Enqueue a notification. Never blocks on timers or flushes.
    pub fn submit(&self, notification: ChangeNotification) -> Result<SubmitOutcome, NotificationError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            self.inner.stats.write().rejected += 1;
            debug!(key = %notification.key, "Notification refused during shutdown");
            return Err(NotificationError::ShuttingDown);
        }
        if let Err(e) = notification.validate() {
            self.inner.stats.write().rejected += 1;
            warn!(error = %e, "Dropping malformed notification");
            return Err(e);
        }

        let now = Instant::now();
        let debounce = self.inner.config.debounce();
        let max_wait = self.inner.config.max_wait();
        let ChangeNotification {
            key,
            hint,
            received_at,
        } = notification;

        let outcome = match self.inner.batches.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let batch = entry.get_mut();
                batch.merged_hints.push(hint);
                batch.last_seen_at = batch.last_seen_at.max(received_at);
                let cap = batch.opened_at + max_wait;
                if now < cap {
                    batch.deadline = (now + debounce).min(cap);
                }
                SubmitOutcome::Merged {
                    hints: batch.merged_hints.len(),
                }
            }
            Entry::Vacant(entry) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
                self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
                let mut batch = entry.insert(PendingBatch {
                    key: key.clone(),
                    merged_hints: vec![hint],
                    first_seen_at: received_at,
                    last_seen_at: received_at,
                    opened_at: now,
                    deadline: now + debounce.min(max_wait),
                    generation,
                    timer: None,
                });
                // The timer blocks on this shard until the entry guard drops.
                let timer = self
                    .inner
                    .runtime
                    .spawn(Arc::clone(&self.inner).run_timer(key.clone(), generation));
                batch.timer = Some(timer);
                self.inner.stats.write().batches += 1;
                SubmitOutcome::Opened
            }
        };

        self.inner.stats.write().submitted += 1;
        debug!(key = %key, outcome = ?outcome, "Notification accepted");
        Ok(outcome)
    }

    pub fn key_state(&self, key: &MediaKey) -> KeyState {
        if self.inner.batches.contains_key(key) {
            KeyState::Pending
        } else if self.inner.flushing.contains_key(key) {
            KeyState::Flushing
        } else {
            KeyState::Idle
        }
    }

    pub fn pending_keys(&self) -> Vec<MediaKey> {
        let mut keys: Vec<MediaKey> = self
            .inner
            .batches
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CoalescerStats {
        let mut stats = self.inner.stats.read().clone();
        stats.pending = self.inner.batches.len();
        stats
    }

    /// Receive a report for every flush from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FlushReport> {
        self.inner.reports.subscribe()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting notifications and flush every pending batch now.
    ///
    /// Waits up to `timeout` for the drain, including flushes already in
    /// progress. Flushes still running at the deadline are abandoned; cache
    /// writes are per key and atomic, so nothing is left half written.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.inner.accepting.store(false, Ordering::SeqCst);

        let keys: Vec<MediaKey> = self
            .inner
            .batches
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut tasks = JoinSet::new();
        for key in keys {
            let ticket = FlushTicket::begin(&self.inner, &key);
            if let Some((_, mut batch)) = self.inner.batches.remove(&key) {
                if let Some(timer) = batch.timer.take() {
                    timer.abort();
                }
                let inner = Arc::clone(&self.inner);
                let ticket = ticket.consume();
                tasks.spawn_on(
                    async move { inner.flush_batch(batch, ticket).await },
                    &self.inner.runtime,
                );
            }
        }

        let total = tasks.len();
        info!(batches = total, timeout_ms = timeout.as_millis() as u64, "Draining coalescer");

        let mut report = ShutdownReport::default();
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(flush) if flush.outcome.is_resolved() => report.flushed += 1,
                    _ => report.failed += 1,
                }
            }
            self.inner.wait_idle().await;
        })
        .await;

        if drained.is_err() {
            tasks.abort_all();
            report.abandoned = total - report.flushed - report.failed;
            warn!(
                abandoned = report.abandoned,
                still_flushing = self.inner.outstanding.load(Ordering::SeqCst),
                "Drain timed out, abandoning remaining batches"
            );
        }

        info!(
            flushed = report.flushed,
            failed = report.failed,
            abandoned = report.abandoned,
            "Coalescer stopped"
        );
        report
    }
}
