//! The known-case synchronizer.
//!
//! One round fetches every pending day in order, hands each payload to the
//! matcher, persists the day, and finally closes the matching session.
//! Callers arriving while a round is in flight join it instead of starting
//! another, and every caller gets exactly one result.
//!
//! # Round lifecycle
//!
//! ```text
//! Idle ──▶ Planning ──▶ Fetching(day)* ──▶ Finalizing ──▶ Done
//!              │              │                 │
//!              └──────────────┴─────────────────┴──▶ Cancelled
//! ```
//!
//! Round state lives behind one mutex that is never held across an
//! `.await`. The fetch is the only suspension point; a day's `receive` and
//! its persisted timestamp happen together under the lock, so cancellation
//! either sees both or neither.

use crate::config::SyncDescriptor;
use crate::core::DayDate;
use crate::matcher::{MatchError, Matcher};
use crate::service::{NetworkError, RemoteKeyService};
use crate::sync::planner::{pending_days, prune_timestamps};
use crate::sync::store::{StoreError, SyncStore};
use crate::transparency::{create_shared_log, SharedTransparencyLog, TransparencyStats};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Outcome delivered to every caller of a round.
pub type SyncResult = Result<SyncReport, SyncError>;

type Completion = Box<dyn FnOnce(SyncResult) + Send + 'static>;

/// Errors surfaced by a sync round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("networking error: {0}")]
    Network(#[from] NetworkError),
    #[error("matching error: {0}")]
    Matching(#[from] MatchError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("sync cancelled")]
    Cancelled,
    /// The round task stopped without producing a result, e.g. because the
    /// runtime shut down.
    #[error("sync round interrupted")]
    Interrupted,
}

/// Summary of a successful round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Identifier used in log output for this round
    pub round_id: Uuid,
    /// Days requested from the key service, oldest first
    pub days_fetched: Vec<DayDate>,
    /// Days whose timestamp was persisted, oldest first
    pub days_synced: Vec<DayDate>,
    /// Latest publication watermark reported by the service
    pub published_until: Option<DateTime<Utc>>,
    /// When the service is next expected to publish a batch
    pub next_batch_release: DateTime<Utc>,
}

/// Phase of the most recent round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round has run yet
    Idle,
    Planning,
    Fetching(DayDate),
    Finalizing,
    /// The round delivered its result
    Done,
    Cancelled,
}

struct InFlightRound {
    round_id: Uuid,
    completions: Vec<Completion>,
    handle: Option<JoinHandle<()>>,
}

struct RoundState {
    /// Bumped on every start and cancel; a round only acts while it matches.
    generation: u64,
    phase: RoundPhase,
    in_flight: Option<InFlightRound>,
}

struct Inner {
    descriptor: SyncDescriptor,
    service: Arc<dyn RemoteKeyService>,
    matcher: Arc<dyn Matcher>,
    store: Arc<dyn SyncStore>,
    transparency: SharedTransparencyLog,
    state: Mutex<RoundState>,
}

/// Fetches known-case key batches and feeds them to a matcher.
///
/// Safe to share across threads; `sync` may be called from any thread,
/// inside or outside the runtime the synchronizer was built with.
pub struct KnownCaseSynchronizer {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl KnownCaseSynchronizer {
    /// Create a synchronizer whose rounds run on `runtime`.
    pub fn new(
        descriptor: SyncDescriptor,
        service: Arc<dyn RemoteKeyService>,
        matcher: Arc<dyn Matcher>,
        store: Arc<dyn SyncStore>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor,
                service,
                matcher,
                store,
                transparency: create_shared_log(),
                state: Mutex::new(RoundState {
                    generation: 0,
                    phase: RoundPhase::Idle,
                    in_flight: None,
                }),
            }),
            runtime,
        }
    }

    /// Record activity in the given transparency log.
    ///
    /// Has no effect once a round has been started.
    pub fn with_transparency_log(mut self, log: SharedTransparencyLog) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.transparency = log;
        }
        self
    }

    pub fn descriptor(&self) -> &SyncDescriptor {
        &self.inner.descriptor
    }

    /// Sync all pending days as of `now` and report through `completion`.
    ///
    /// If a round is already in flight the completion joins it and no new
    /// request is made. Completions run in registration order, outside the
    /// synchronizer's lock, on the thread that concludes the round.
    pub fn sync<F>(&self, now: DateTime<Utc>, completion: F)
    where
        F: FnOnce(SyncResult) + Send + 'static,
    {
        let mut state = self.inner.state.lock();

        if let Some(round) = state.in_flight.as_mut() {
            tracing::debug!(round = %round.round_id, "Joining sync round in flight");
            round.completions.push(Box::new(completion));
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let round_id = Uuid::new_v4();
        state.phase = RoundPhase::Planning;
        state.in_flight = Some(InFlightRound {
            round_id,
            completions: vec![Box::new(completion)],
            handle: None,
        });

        drop(state);

        // Built before spawning so a task dropped unpolled, e.g. by a runtime
        // that has shut down, still concludes the round.
        let guard = RoundGuard {
            inner: self.inner.clone(),
            generation,
            armed: true,
        };
        let handle = self.runtime.spawn(async move {
            let result = guard.inner.run_round(guard.generation, round_id, now).await;
            guard.finish(result);
        });

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            // Cancelled before the handle could be stored.
            handle.abort();
        } else if let Some(round) = state.in_flight.as_mut() {
            round.handle = Some(handle);
        }
    }

    /// Sync and await the round's result.
    pub fn sync_async(&self, now: DateTime<Utc>) -> impl Future<Output = SyncResult> + Send {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sync(now, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(SyncError::Interrupted)) }
    }

    /// Sync and block the current thread until the round's result arrives.
    ///
    /// Must not be called from a thread driving the synchronizer's runtime.
    pub fn sync_blocking(&self, now: DateTime<Utc>) -> SyncResult {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.sync(now, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or(Err(SyncError::Interrupted))
    }

    /// Cancel the round in flight, if any.
    ///
    /// Every waiting caller receives [`SyncError::Cancelled`], the pending
    /// request is dropped, and no further day is persisted for the round.
    /// Days persisted before the cancel stay persisted.
    pub fn cancel_sync(&self) {
        let round = {
            let mut state = self.inner.state.lock();
            let Some(round) = state.in_flight.take() else {
                return;
            };
            state.generation += 1;
            state.phase = RoundPhase::Cancelled;
            round
        };

        if let Some(handle) = round.handle {
            handle.abort();
        }
        self.inner.transparency.record_round_cancelled();
        tracing::info!(
            round = %round.round_id,
            waiting = round.completions.len(),
            "Sync round cancelled"
        );

        for completion in round.completions {
            completion(Err(SyncError::Cancelled));
        }
    }

    /// Whether a round is in flight.
    pub fn is_syncing(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Phase of the current or most recent round.
    pub fn phase(&self) -> RoundPhase {
        self.inner.state.lock().phase
    }

    pub fn stats(&self) -> TransparencyStats {
        self.inner.transparency.stats()
    }
}

impl Inner {
    async fn run_round(&self, generation: u64, round_id: Uuid, now: DateTime<Utc>) -> SyncResult {
        let parameters = self.store.networking_parameters();
        let mut timestamps = self.store.last_sync_timestamps();
        let days = pending_days(now, &timestamps, parameters.days_to_check);
        prune_timestamps(&mut timestamps, now, parameters.days_to_check);

        tracing::info!(
            round = %round_id,
            app = %self.descriptor.app_id,
            pending = days.len(),
            "Starting sync round"
        );

        let mut report = SyncReport {
            round_id,
            days_fetched: Vec::with_capacity(days.len()),
            days_synced: Vec::with_capacity(days.len()),
            published_until: None,
            next_batch_release: parameters.next_batch_release(now),
        };

        for day in days {
            self.enter_phase(generation, RoundPhase::Fetching(day))?;

            self.transparency.record_request();
            let batch = self.service.fetch(day).await.map_err(|e| {
                tracing::warn!(round = %round_id, %day, "Fetching key batch failed: {e}");
                SyncError::Network(e)
            })?;
            report.days_fetched.push(day);
            if batch.published_until.is_some() {
                report.published_until = batch.published_until;
            }

            {
                let state = self.state.lock();
                if state.generation != generation {
                    return Err(SyncError::Cancelled);
                }

                match batch.payload() {
                    Some(payload) => self.matcher.receive(payload, day).map_err(|e| {
                        tracing::warn!(round = %round_id, %day, "Matcher rejected key batch: {e}");
                        SyncError::Matching(e)
                    })?,
                    None => tracing::debug!(round = %round_id, %day, "No keys published"),
                }

                timestamps.insert(day, now);
                self.store.set_last_sync_timestamps(timestamps.clone())?;
                drop(state);
            }

            self.transparency.record_day_synced();
            report.days_synced.push(day);
        }

        self.enter_phase(generation, RoundPhase::Finalizing)?;
        self.matcher.finalize(now).map_err(|e| {
            tracing::warn!(round = %round_id, "Finalizing matching session failed: {e}");
            SyncError::Matching(e)
        })?;

        Ok(report)
    }

    fn enter_phase(&self, generation: u64, phase: RoundPhase) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return Err(SyncError::Cancelled);
        }
        state.phase = phase;
        Ok(())
    }

    /// Deliver `result` to every completion of the round, unless the round
    /// was cancelled in the meantime.
    fn conclude_round(&self, generation: u64, result: SyncResult) {
        let round = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.phase = RoundPhase::Done;
            match state.in_flight.take() {
                Some(round) => round,
                None => return,
            }
        };

        match &result {
            Ok(report) => {
                self.transparency.record_round_completed();
                tracing::info!(
                    round = %round.round_id,
                    fetched = report.days_fetched.len(),
                    synced = report.days_synced.len(),
                    waiting = round.completions.len(),
                    "Sync round finished"
                );
            }
            Err(e) => {
                self.transparency.record_round_failed();
                tracing::error!(round = %round.round_id, "Sync round failed: {e}");
            }
        }

        for completion in round.completions {
            completion(result.clone());
        }
    }
}

/// Concludes the round with [`SyncError::Interrupted`] if its task is
/// dropped before producing a result, whether it panicked or never ran.
/// After a cancel the generation no longer matches and this does nothing.
struct RoundGuard {
    inner: Arc<Inner>,
    generation: u64,
    armed: bool,
}

impl RoundGuard {
    fn finish(mut self, result: SyncResult) {
        self.armed = false;
        self.inner.conclude_round(self.generation, result);
    }
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        if self.armed {
            self.inner.conclude_round(self.generation, Err(SyncError::Interrupted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchError;
    use crate::service::{AuthMethod, DelayedKeyModel, ExposeeModel, KeyBatch, OutstandingPublish};
    use crate::sync::MemorySyncStore;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct StaticService;

    #[async_trait]
    impl RemoteKeyService for StaticService {
        async fn fetch(&self, _day: DayDate) -> Result<KeyBatch, NetworkError> {
            Ok(KeyBatch::new(Some(vec![1, 2, 3]), None))
        }

        async fn publish(
            &self,
            _exposees: &[ExposeeModel],
            _auth: &AuthMethod,
        ) -> Result<OutstandingPublish, NetworkError> {
            Err(NetworkError::Transport("unsupported".to_string()))
        }

        async fn publish_delayed(
            &self,
            _key: &DelayedKeyModel,
            _token: &str,
        ) -> Result<(), NetworkError> {
            Ok(())
        }
    }

    struct NoopMatcher;

    impl Matcher for NoopMatcher {
        fn receive(&self, _data: &[u8], _day: DayDate) -> Result<(), MatchError> {
            Ok(())
        }

        fn finalize(&self, _now: DateTime<Utc>) -> Result<(), MatchError> {
            Ok(())
        }
    }

    fn synchronizer() -> KnownCaseSynchronizer {
        KnownCaseSynchronizer::new(
            SyncDescriptor::new("test", "http://bucket", "http://report"),
            Arc::new(StaticService),
            Arc::new(NoopMatcher),
            Arc::new(MemorySyncStore::default()),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_phase_transitions_to_done() {
        let sync = synchronizer();
        assert_eq!(sync.phase(), RoundPhase::Idle);

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let report = sync.sync_async(now).await.unwrap();

        assert_eq!(report.days_fetched.len(), 10);
        assert_eq!(sync.phase(), RoundPhase::Done);
        assert!(!sync.is_syncing());
        assert_eq!(sync.stats().rounds_completed, 1);
    }

    #[tokio::test]
    async fn test_cancel_without_round_is_noop() {
        let sync = synchronizer();
        sync.cancel_sync();
        assert_eq!(sync.phase(), RoundPhase::Idle);
        assert_eq!(sync.stats().rounds_cancelled, 0);
    }

    #[test]
    fn test_sync_blocking_from_outside_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let sync = KnownCaseSynchronizer::new(
            SyncDescriptor::new("test", "http://bucket", "http://report"),
            Arc::new(StaticService),
            Arc::new(NoopMatcher),
            Arc::new(MemorySyncStore::default()),
            runtime.handle().clone(),
        );

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let report = sync.sync_blocking(now).unwrap();
        assert_eq!(report.days_synced.len(), 10);
        assert_eq!(
            report.next_batch_release,
            Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap()
        );
    }
}
