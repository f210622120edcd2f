//! Debounced snapshot persistence for a graph document.
//!
//! The adapter subscribes to the document's local update events. Every update
//! pushes the deadline of a single [`DebounceTimer`] forward; the host polls
//! [`PersistenceAdapter::maybe_save`] (typically once per frame) and a snapshot
//! is written only after the timer ran out undisturbed.

use crate::config::PersistenceConfig;
use crate::crdt::{EncodedState, GraphDocument, Subscription};
use crate::storage::{BoxFuture, SnapshotRecord, SnapshotStore, StorageResult};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Source of the current time for debounce decisions.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A single cancellable deadline.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// The default quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the timer with the default delay.
    pub fn arm(&mut self, now: Instant) {
        self.arm_after(now, self.delay);
    }

    /// (Re)start the timer with a custom delay.
    pub fn arm_after(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel and report true if the deadline has passed.
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Result of a save attempt. Failures are reported here, never as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// No write was due.
    NotDue,
    /// A snapshot was written.
    Saved(SnapshotRecord),
    /// The write failed; the message is already logged.
    Failed(String),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

/// Persists one project's graph document to a [`SnapshotStore`].
pub struct PersistenceAdapter<S: SnapshotStore, C: Clock = SystemClock> {
    project_id: String,
    store: Arc<S>,
    clock: Arc<C>,
    config: PersistenceConfig,
    timer: Arc<Mutex<DebounceTimer>>,
    subscription: Option<Subscription>,
    consecutive_failures: u32,
    last_saved: Option<SnapshotRecord>,
}

impl<S: SnapshotStore> PersistenceAdapter<S, SystemClock> {
    /// Create an adapter driven by the wall clock.
    pub fn new(project_id: impl Into<String>, store: Arc<S>, config: &PersistenceConfig) -> Self {
        Self::with_clock(project_id, store, Arc::new(SystemClock), config)
    }
}

impl<S: SnapshotStore, C: Clock> PersistenceAdapter<S, C> {
    pub fn with_clock(
        project_id: impl Into<String>,
        store: Arc<S>,
        clock: Arc<C>,
        config: &PersistenceConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            store,
            clock,
            config: config.clone(),
            timer: Arc::new(Mutex::new(DebounceTimer::new(config.debounce()))),
            subscription: None,
            consecutive_failures: 0,
            last_saved: None,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether the adapter is subscribed to document updates.
    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }

    /// Whether a debounced write is scheduled.
    pub fn has_pending_save(&self) -> bool {
        self.timer().is_pending()
    }

    /// When the scheduled write becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer().deadline()
    }

    /// The most recent successful write.
    pub fn last_saved(&self) -> Option<&SnapshotRecord> {
        self.last_saved.as_ref()
    }

    /// Writes that failed since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn timer(&self) -> MutexGuard<'_, DebounceTimer> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the latest snapshot into `doc`, then start watching it for updates.
    ///
    /// Returns whether a snapshot was applied. A snapshot that fails to
    /// import is logged and skipped. Calling `start` on a running adapter
    /// does nothing.
    pub async fn start(&mut self, doc: &mut GraphDocument) -> StorageResult<bool> {
        if self.is_running() {
            return Ok(false);
        }

        let mut applied = false;
        if let Some(update) = self.store.load_latest_snapshot(&self.project_id).await? {
            match doc.import(&update) {
                Ok(()) => {
                    log::debug!(
                        "Loaded snapshot for project {} ({} bytes)",
                        self.project_id,
                        update.len()
                    );
                    applied = true;
                }
                Err(e) => log::warn!("Ignoring unreadable snapshot for project {}: {}", self.project_id, e),
            }
        }

        let timer = Arc::clone(&self.timer);
        let clock = Arc::clone(&self.clock);
        self.subscription = Some(doc.subscribe_local_updates(move |_| {
            timer.lock().unwrap_or_else(|e| e.into_inner()).arm(clock.now());
        }));
        Ok(applied)
    }

    /// Write a snapshot if the debounce deadline has passed.
    ///
    /// The document state is captured before the returned future is polled,
    /// so `doc` is free to change while the write is in flight.
    pub fn maybe_save(&mut self, doc: &GraphDocument) -> BoxFuture<'_, SaveOutcome> {
        let now = self.clock.now();
        if !self.timer().take_if_due(now) {
            return Box::pin(async { SaveOutcome::NotDue });
        }
        self.save_state(doc.encode_state())
    }

    /// Cancel any pending timer and write a snapshot immediately.
    pub fn force_save(&mut self, doc: &GraphDocument) -> BoxFuture<'_, SaveOutcome> {
        self.timer().cancel();
        self.save_state(doc.encode_state())
    }

    /// Cancel the pending timer and stop watching the document. Idempotent.
    pub fn stop(&mut self) {
        self.timer().cancel();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            log::debug!("Stopped persistence for project {}", self.project_id);
        }
    }

    fn save_state(
        &mut self,
        state: Result<EncodedState, crate::crdt::GraphError>,
    ) -> BoxFuture<'_, SaveOutcome> {
        Box::pin(async move {
            let state = match state {
                Ok(state) => state,
                Err(e) => {
                    log::error!("Failed to encode project {}: {}", self.project_id, e);
                    return SaveOutcome::Failed(e.to_string());
                }
            };

            match self.store.save_snapshot(&self.project_id, &state).await {
                Ok(record) => {
                    log::debug!(
                        "Saved snapshot {} for project {} ({} bytes)",
                        record.id,
                        self.project_id,
                        record.update.len()
                    );
                    self.consecutive_failures = 0;
                    self.prune().await;
                    self.last_saved = Some(record.clone());
                    SaveOutcome::Saved(record)
                }
                Err(e) => {
                    log::error!("Failed to save project {}: {}", self.project_id, e);
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    self.schedule_retry();
                    SaveOutcome::Failed(e.to_string())
                }
            }
        })
    }

    async fn prune(&self) {
        let keep = self.config.max_snapshots_per_project;
        if keep == 0 {
            return;
        }
        match self.store.prune(&self.project_id, keep).await {
            Ok(0) => {}
            Ok(removed) => log::debug!("Pruned {} old snapshots of project {}", removed, self.project_id),
            Err(e) => log::warn!("Failed to prune snapshots of project {}: {}", self.project_id, e),
        }
    }

    fn schedule_retry(&self) {
        if !self.config.retry_on_failure || !self.is_running() {
            return;
        }
        let delay = backoff_delay(&self.config, self.consecutive_failures);
        log::warn!("Retrying save of project {} in {:?}", self.project_id, delay);
        self.timer().arm_after(self.clock.now(), delay);
    }
}

impl<S: SnapshotStore, C: Clock> Drop for PersistenceAdapter<S, C> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delay before retry number `failures` (1-based): the debounce period
/// doubled per failure, capped at the configured maximum.
fn backoff_delay(config: &PersistenceConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    config
        .debounce()
        .saturating_mul(1u32 << exponent)
        .min(config.max_retry_delay())
}

/// Create a platform-appropriate storage backend.
#[cfg(not(target_arch = "wasm32"))]
pub fn create_default_storage() -> StorageResult<Arc<crate::storage::FileStorage>> {
    Ok(Arc::new(crate::storage::FileStorage::default_location()?))
}

#[cfg(target_arch = "wasm32")]
pub fn create_default_storage() -> StorageResult<Arc<crate::storage::IndexedDbStorage>> {
    Ok(Arc::new(crate::storage::IndexedDbStorage::new()))
}

/// Platform-specific snapshot storage.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformStorage = crate::storage::FileStorage;

#[cfg(target_arch = "wasm32")]
pub type PlatformStorage = crate::storage::IndexedDbStorage;

/// Persistence adapter over the platform storage and wall clock.
pub type PlatformPersistenceAdapter = PersistenceAdapter<PlatformStorage>;

/// Create a persistence adapter for a project using the default storage.
pub fn create_persistence_adapter(
    project_id: impl Into<String>,
    config: &PersistenceConfig,
) -> StorageResult<PlatformPersistenceAdapter> {
    Ok(PersistenceAdapter::new(project_id, create_default_storage()?, config))
}
