//! Scan Session Coordinator
//!
//! Decides where one physical scan ends and the next begins. Every entry
//! point, including timer firings, runs under one mutex, so batches, mode
//! changes and user decisions form a single total order.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

use crate::analysis::IngredientMatcher;
use crate::capture::RecognitionBatch;
use crate::catalog::{filter_for_mode, CatalogHandle, ReferenceIngredient, ScanMode};
use crate::config::{MatchingConfig, SessionConfig};
use crate::error::Result;
use crate::session::state::{ScanSession, SessionSnapshot, SessionState};
use crate::session::timer::{GapTimer, Scheduler, TimerAction};
use crate::shared::{ClearReason, SessionSignal};
use crate::storage::{HistoryStore, SessionRecord};

/// Backlog above which per-batch `MatchesUpdated` signals are skipped
///
/// Lifecycle signals are always delivered. A lagging observer can catch up on
/// the live match set through [`SessionCoordinator::snapshot`].
pub const MAX_PENDING_UPDATES: usize = 64;

/// What happened to a batch handed to [`SessionCoordinator::on_batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Dropped because a result is on display
    Paused,
    /// No lines; nothing changes
    Empty,
    /// Matched and folded into the session
    Processed {
        /// Matches in this batch
        matched: usize,
        /// Canonical names seen for the first time in this session
        discovered: Vec<String>,
        /// Gap timer armed after this batch
        gap: Duration,
    },
}

struct Inner {
    session: ScanSession,
    gap_timer: GapTimer,
    banner_timer: GapTimer,
}

struct Shared {
    inner: Mutex<Inner>,
    catalog: CatalogHandle,
    matcher: IngredientMatcher,
    config: SessionConfig,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn HistoryStore>,
    signals: Sender<SessionSignal>,
}

/// Stateful owner of the current scan session
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionCoordinator {
    shared: Arc<Shared>,
}

impl SessionCoordinator {
    /// Create a coordinator and the receiving end of its signal channel
    ///
    /// The receiver should be drained continuously or dropped. While it is
    /// held without being read, per-batch updates stop once
    /// [`MAX_PENDING_UPDATES`] signals are queued.
    pub fn new(
        catalog: CatalogHandle,
        store: Arc<dyn HistoryStore>,
        scheduler: Arc<dyn Scheduler>,
        config: SessionConfig,
        matching: MatchingConfig,
    ) -> (Self, Receiver<SessionSignal>) {
        let (signals, receiver) = unbounded();
        let shared = Shared {
            inner: Mutex::new(Inner {
                session: ScanSession::new(config.default_mode),
                gap_timer: GapTimer::new(),
                banner_timer: GapTimer::new(),
            }),
            catalog,
            matcher: IngredientMatcher::new(matching),
            config,
            scheduler,
            store,
            signals,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        )
    }

    /// Feed one recognition batch
    pub fn on_batch(&self, batch: RecognitionBatch) -> BatchOutcome {
        self.shared.on_batch(batch)
    }

    /// Switch the category filter; always empties the session
    pub fn on_mode_change(&self, mode: ScanMode) {
        self.shared.on_mode_change(mode)
    }

    /// Persist the session awaiting a decision
    ///
    /// Returns `Ok(None)` outside AwaitingDecision. If the store fails the
    /// session keeps waiting so the user can retry or discard.
    pub fn on_save(&self) -> Result<Option<SessionRecord>> {
        self.shared.on_save()
    }

    /// Drop the current session without persisting it
    ///
    /// Returns false when there was nothing to discard.
    pub fn on_discard(&self) -> bool {
        self.shared.on_discard()
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().session.state()
    }

    pub fn mode(&self) -> ScanMode {
        self.shared.inner.lock().session.mode()
    }

    /// Ingredients accumulated so far in the current session
    pub fn accumulated(&self) -> Vec<ReferenceIngredient> {
        self.shared.inner.lock().session.accumulated().to_vec()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let catalog_size = self.shared.catalog.len();
        self.shared.inner.lock().session.snapshot(catalog_size)
    }

    /// Delay of the outstanding gap check, if any
    pub fn pending_gap(&self) -> Option<Duration> {
        self.shared.inner.lock().gap_timer.pending_delay()
    }

    /// Cancel outstanding timers; the session itself is left as is
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        inner.gap_timer.cancel();
        inner.banner_timer.cancel();
    }
}

impl Shared {
    fn emit(&self, signal: SessionSignal) {
        // Observers may have gone away; the session carries on regardless
        let _ = self.signals.send(signal);
    }

    fn on_batch(self: &Arc<Self>, batch: RecognitionBatch) -> BatchOutcome {
        let mut inner = self.inner.lock();

        if inner.session.state().is_paused() {
            debug!("Batch ignored while {:?}", inner.session.state());
            return BatchOutcome::Paused;
        }

        inner.session.note_batch(batch.joined_text(), batch.latency);

        if batch.is_empty() {
            return BatchOutcome::Empty;
        }

        inner.gap_timer.cancel();

        if inner.session.state() == SessionState::Idle {
            let session_id = inner.session.begin();
            let mode = inner.session.mode();
            info!("=== NEW SCAN SESSION STARTED === ({}, {})", session_id, mode);
            self.emit(SessionSignal::SessionStarted { session_id, mode });
        }

        let catalog = self.catalog.snapshot();
        let candidates = filter_for_mode(&catalog, inner.session.mode());
        let matches = if candidates.is_empty() {
            debug!("Catalog empty for {}, batch matches nothing", inner.session.mode());
            Vec::new()
        } else {
            self.matcher.match_lines(&batch.lines, &candidates)
        };

        let discovered = inner.session.absorb(&matches);
        if !discovered.is_empty() {
            let names: Vec<&str> = discovered.iter().map(|i| i.name.as_str()).collect();
            info!("New ingredients: {:?}", names);
            if let Some(session_id) = inner.session.id() {
                self.emit(SessionSignal::IngredientsDiscovered {
                    session_id,
                    ingredients: discovered.clone(),
                });
            }
        }

        if self.signals.len() < MAX_PENDING_UPDATES {
            self.emit(SessionSignal::MatchesUpdated {
                batch_matches: matches.clone(),
                accumulated: inner.session.accumulated().to_vec(),
            });
        } else {
            debug!("Signal backlog full, skipping match update");
        }

        let gap = if matches.is_empty() {
            self.config.weak_gap()
        } else {
            self.config.strong_gap()
        };
        debug!(
            "Batch of {} lines matched {} (latency {:?}), gap check in {:?}",
            batch.lines.len(),
            matches.len(),
            batch.latency,
            gap
        );
        self.arm_gap_check(&mut inner, gap);

        BatchOutcome::Processed {
            matched: matches.len(),
            discovered: discovered.into_iter().map(|i| i.name).collect(),
            gap,
        }
    }

    fn arm_gap_check(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        let weak = Arc::downgrade(self);
        inner
            .gap_timer
            .arm(self.scheduler.as_ref(), delay, |generation| {
                fire_with(weak, move |shared| shared.on_gap_elapsed(generation, delay))
            });
    }

    fn arm_banner(self: &Arc<Self>, inner: &mut Inner) {
        let weak = Arc::downgrade(self);
        inner.banner_timer.arm(
            self.scheduler.as_ref(),
            self.config.clean_banner(),
            |generation| fire_with(weak, move |shared| shared.on_banner_elapsed(generation)),
        );
    }

    fn on_gap_elapsed(self: &Arc<Self>, generation: u64, delay: Duration) {
        let mut inner = self.inner.lock();

        if !inner.gap_timer.fire(generation) {
            debug!("Stale gap check ignored");
            return;
        }
        if inner.session.state() != SessionState::Accumulating {
            return;
        }

        info!("=== GAP DETECTED ({}ms) ===", delay.as_millis());

        if inner.session.accumulated().is_empty() {
            inner.session.set_state(SessionState::Idle);
            return;
        }

        let ingredients = inner.session.accumulated().to_vec();
        if inner.session.has_harmful() {
            info!("Hazardous session settled, awaiting decision");
            inner.session.set_state(SessionState::AwaitingDecision);
            self.emit(SessionSignal::ResultPopupShown { ingredients });
        } else {
            info!("Safe scan complete, showing completion banner");
            inner.session.set_state(SessionState::SettledClean);
            self.emit(SessionSignal::CompletionBannerShown { ingredients });
            self.arm_banner(&mut inner);
        }
    }

    fn on_banner_elapsed(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();

        if !inner.banner_timer.fire(generation) {
            debug!("Stale banner expiry ignored");
            return;
        }
        if inner.session.state() != SessionState::SettledClean {
            return;
        }

        let mode = inner.session.mode();
        inner.session.reset(mode);
        self.emit(SessionSignal::CompletionBannerHidden);
        self.emit(SessionSignal::SessionCleared {
            reason: ClearReason::Settled,
        });
    }

    fn on_mode_change(&self, mode: ScanMode) {
        let mut inner = self.inner.lock();
        inner.gap_timer.cancel();
        inner.banner_timer.cancel();

        self.hide_result(inner.session.state());
        inner.session.reset(mode);

        info!("Switched mode to {}", mode);
        self.emit(SessionSignal::SessionCleared {
            reason: ClearReason::ModeChanged,
        });
    }

    fn on_save(&self) -> Result<Option<SessionRecord>> {
        let mut inner = self.inner.lock();

        if inner.session.state() != SessionState::AwaitingDecision {
            debug!("Save ignored while {:?}", inner.session.state());
            return Ok(None);
        }

        let record = inner.session.to_record(now_millis());
        info!(
            "Saving {} ingredients to history",
            record.matched_ingredients.len()
        );
        if let Err(e) = self.store.save(&record) {
            error!("Failed to save scan: {}", e);
            return Err(e);
        }

        let mode = inner.session.mode();
        inner.session.reset(mode);
        self.emit(SessionSignal::ResultPopupHidden);
        self.emit(SessionSignal::RecordSaved(record.clone()));
        self.emit(SessionSignal::SessionCleared {
            reason: ClearReason::Saved,
        });
        Ok(Some(record))
    }

    fn on_discard(&self) -> bool {
        let mut inner = self.inner.lock();

        let state = inner.session.state();
        if state == SessionState::Idle {
            return false;
        }

        inner.gap_timer.cancel();
        inner.banner_timer.cancel();
        self.hide_result(state);

        let mode = inner.session.mode();
        inner.session.reset(mode);
        info!("Scan discarded");
        self.emit(SessionSignal::SessionCleared {
            reason: ClearReason::Discarded,
        });
        true
    }

    fn hide_result(&self, state: SessionState) {
        match state {
            SessionState::AwaitingDecision => self.emit(SessionSignal::ResultPopupHidden),
            SessionState::SettledClean => self.emit(SessionSignal::CompletionBannerHidden),
            SessionState::Idle | SessionState::Accumulating => {}
        }
    }
}

/// Wrap a callback so it only runs while the coordinator is alive
fn fire_with<F>(weak: Weak<Shared>, f: F) -> TimerAction
where
    F: FnOnce(&Arc<Shared>) + Send + 'static,
{
    Box::new(move || {
        if let Some(shared) = weak.upgrade() {
            f(&shared);
        }
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::HazardLevel;
    use crate::error::ScanError;
    use crate::session::timer::ManualScheduler;
    use crate::storage::MemoryHistory;

    const STRONG: Duration = Duration::from_millis(1200);
    const WEAK: Duration = Duration::from_millis(500);
    const BANNER: Duration = Duration::from_millis(2000);

    struct Harness {
        coordinator: SessionCoordinator,
        signals: Receiver<SessionSignal>,
        scheduler: ManualScheduler,
        history: Arc<MemoryHistory>,
        catalog: CatalogHandle,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_catalog(catalog())
        }

        fn with_catalog(ingredients: Vec<ReferenceIngredient>) -> Self {
            let scheduler = ManualScheduler::new();
            let history = Arc::new(MemoryHistory::new());
            let catalog = CatalogHandle::new(ingredients);
            let (coordinator, signals) = SessionCoordinator::new(
                catalog.clone(),
                history.clone(),
                Arc::new(scheduler.clone()),
                SessionConfig::default(),
                MatchingConfig::default(),
            );
            Self {
                coordinator,
                signals,
                scheduler,
                history,
                catalog,
            }
        }

        fn feed(&self, lines: &[&str]) -> BatchOutcome {
            self.coordinator
                .on_batch(RecognitionBatch::new(lines.iter().copied(), Duration::from_millis(30)))
        }

        fn advance(&self, by: Duration) {
            self.scheduler.advance(by);
        }

        fn drain(&self) -> Vec<SessionSignal> {
            self.signals.try_iter().collect()
        }
    }

    fn catalog() -> Vec<ReferenceIngredient> {
        vec![
            ReferenceIngredient::new("Red 40", HazardLevel::High).with_categories(["FOOD"]),
            ReferenceIngredient::new("Citric Acid", HazardLevel::Low),
            ReferenceIngredient::new("Parabens", HazardLevel::Medium).with_categories(["COSMETICS"]),
            ReferenceIngredient::new("Glycerin", HazardLevel::Low).with_categories(["COSMETICS"]),
        ]
    }

    fn discovered_count(signals: &[SessionSignal], name: &str) -> usize {
        signals
            .iter()
            .filter(|s| match s {
                SessionSignal::IngredientsDiscovered { ingredients, .. } => {
                    ingredients.iter().any(|i| i.name == name)
                }
                _ => false,
            })
            .count()
    }

    fn popup_shown(signals: &[SessionSignal]) -> bool {
        signals
            .iter()
            .any(|s| matches!(s, SessionSignal::ResultPopupShown { .. }))
    }

    #[test]
    fn test_first_batch_opens_session() {
        let h = Harness::new();
        assert_eq!(h.coordinator.state(), SessionState::Idle);

        let outcome = h.feed(&["Ingredients: sugar, red 40"]);
        assert_eq!(
            outcome,
            BatchOutcome::Processed {
                matched: 1,
                discovered: vec!["Red 40".to_string()],
                gap: STRONG,
            }
        );
        assert_eq!(h.coordinator.state(), SessionState::Accumulating);

        let signals = h.drain();
        assert!(matches!(
            signals[0],
            SessionSignal::SessionStarted {
                mode: ScanMode::Food,
                ..
            }
        ));
        assert_eq!(discovered_count(&signals, "Red 40"), 1);
    }

    #[test]
    fn test_empty_batch_ignored_while_idle() {
        let h = Harness::new();
        assert_eq!(h.feed(&[]), BatchOutcome::Empty);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert_eq!(h.scheduler.pending(), 0);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_empty_batch_does_not_reset_gap_timer() {
        let h = Harness::new();
        h.feed(&["water"]);
        assert_eq!(h.coordinator.pending_gap(), Some(WEAK));

        h.advance(Duration::from_millis(400));
        assert_eq!(h.feed(&[]), BatchOutcome::Empty);

        // First deadline still applies
        h.advance(Duration::from_millis(100));
        assert_eq!(h.coordinator.state(), SessionState::Idle);
    }

    #[test]
    fn test_repeated_matches_notify_once() {
        let h = Harness::new();
        h.feed(&["Red 40"]);
        h.advance(Duration::from_millis(300));
        h.feed(&["Red 40"]);
        h.advance(Duration::from_millis(300));
        h.feed(&[]);
        h.advance(Duration::from_millis(300));
        h.feed(&["Red 40"]);

        let signals = h.drain();
        assert_eq!(discovered_count(&signals, "Red 40"), 1);
        assert_eq!(h.coordinator.accumulated().len(), 1);
    }

    #[test]
    fn test_gap_threshold_follows_current_batch_only() {
        let h = Harness::new();

        let matched = h.feed(&["Red 40"]);
        assert!(matches!(matched, BatchOutcome::Processed { gap, .. } if gap == STRONG));

        let unmatched = h.feed(&["net wt 12 oz"]);
        assert!(matches!(unmatched, BatchOutcome::Processed { gap, .. } if gap == WEAK));
        assert_eq!(h.coordinator.pending_gap(), Some(WEAK));
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn test_empty_session_times_out_silently() {
        let h = Harness::new();
        h.feed(&["nutrition facts"]);
        h.drain();

        h.advance(WEAK);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert!(h.drain().is_empty());
        assert!(h.history.is_empty());
    }

    #[test]
    fn test_clean_session_auto_clears() {
        let h = Harness::new();
        h.feed(&["citric acid"]);
        h.drain();

        h.advance(STRONG);
        assert_eq!(h.coordinator.state(), SessionState::SettledClean);
        let signals = h.drain();
        assert!(signals
            .iter()
            .any(|s| matches!(s, SessionSignal::CompletionBannerShown { .. })));
        assert!(!popup_shown(&signals));

        // Batches are refused while the banner is up
        assert_eq!(h.feed(&["Red 40"]), BatchOutcome::Paused);

        h.advance(BANNER);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert!(h.coordinator.accumulated().is_empty());
        let signals = h.drain();
        assert!(matches!(signals[0], SessionSignal::CompletionBannerHidden));
        assert!(matches!(
            signals[1],
            SessionSignal::SessionCleared {
                reason: ClearReason::Settled
            }
        ));
        assert!(h.history.is_empty());
    }

    #[test]
    fn test_hazardous_session_waits_for_decision() {
        let h = Harness::new();
        h.feed(&["citric acid", "red 40"]);
        h.advance(STRONG);

        assert_eq!(h.coordinator.state(), SessionState::AwaitingDecision);
        assert!(popup_shown(&h.drain()));

        // Never auto-dismissed
        h.advance(Duration::from_secs(60));
        assert_eq!(h.coordinator.state(), SessionState::AwaitingDecision);
        assert_eq!(h.feed(&["Parabens"]), BatchOutcome::Paused);
        assert_eq!(h.coordinator.accumulated().len(), 2);
    }

    #[test]
    fn test_save_persists_record() {
        let h = Harness::new();
        h.feed(&["red 40"]);
        h.feed(&["citric acid"]);
        h.advance(STRONG);
        h.drain();

        let record = h.coordinator.on_save().unwrap().unwrap();
        assert_eq!(record.product_name, "Food Scan");
        assert_eq!(record.category, "FOOD");
        assert!(!record.is_clean);
        assert_eq!(
            record.matched_ingredients,
            vec!["Citric Acid".to_string(), "Red 40".to_string()]
        );

        assert_eq!(h.history.records(), vec![record]);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert!(h.coordinator.accumulated().is_empty());

        let signals = h.drain();
        assert!(signals
            .iter()
            .any(|s| matches!(s, SessionSignal::RecordSaved(_))));
        assert!(signals.iter().any(|s| matches!(
            s,
            SessionSignal::SessionCleared {
                reason: ClearReason::Saved
            }
        )));
    }

    #[test]
    fn test_save_outside_decision_is_noop() {
        let h = Harness::new();
        assert!(h.coordinator.on_save().unwrap().is_none());

        h.feed(&["red 40"]);
        assert!(h.coordinator.on_save().unwrap().is_none());
        assert_eq!(h.coordinator.state(), SessionState::Accumulating);
        assert!(h.history.is_empty());
    }

    #[test]
    fn test_discard_does_not_persist() {
        let h = Harness::new();
        h.feed(&["red 40"]);
        h.advance(STRONG);
        assert_eq!(h.coordinator.state(), SessionState::AwaitingDecision);

        assert!(h.coordinator.on_discard());
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert!(h.coordinator.accumulated().is_empty());
        assert!(h.history.is_empty());
        assert!(!h.coordinator.on_discard());
    }

    #[test]
    fn test_discard_before_gap_fires_has_no_side_effects() {
        let h = Harness::new();
        h.feed(&["red 40"]);
        assert_eq!(h.coordinator.pending_gap(), Some(STRONG));

        assert!(h.coordinator.on_discard());
        h.drain();

        h.advance(STRONG * 2);
        let signals = h.drain();
        assert!(!popup_shown(&signals));
        assert!(signals.is_empty());
        assert!(h.history.is_empty());
        assert_eq!(h.coordinator.state(), SessionState::Idle);
    }

    #[test]
    fn test_mode_change_clears_everything() {
        let h = Harness::new();
        h.feed(&["red 40"]);
        h.advance(STRONG);
        assert_eq!(h.coordinator.state(), SessionState::AwaitingDecision);

        h.coordinator.on_mode_change(ScanMode::Cosmetics);
        assert_eq!(h.coordinator.accumulated().len(), 0);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert_eq!(h.coordinator.mode(), ScanMode::Cosmetics);

        let signals = h.drain();
        assert!(signals
            .iter()
            .any(|s| matches!(s, SessionSignal::ResultPopupHidden)));
    }

    #[test]
    fn test_mode_change_mid_session_cancels_gap() {
        let h = Harness::new();
        h.feed(&["red 40"]);
        h.coordinator.on_mode_change(ScanMode::Cosmetics);
        assert_eq!(h.coordinator.accumulated().len(), 0);
        assert_eq!(h.scheduler.pending(), 0);

        h.advance(STRONG);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        assert!(!popup_shown(&h.drain()));
    }

    #[test]
    fn test_mode_change_during_banner() {
        let h = Harness::new();
        h.feed(&["citric acid"]);
        h.advance(STRONG);
        assert_eq!(h.coordinator.state(), SessionState::SettledClean);

        h.coordinator.on_mode_change(ScanMode::Cosmetics);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
        h.drain();

        h.advance(BANNER);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_mode_filter_applies_to_matching() {
        let h = Harness::new();
        h.coordinator.on_mode_change(ScanMode::Cosmetics);

        let outcome = h.feed(&["red 40", "parabens"]);
        assert!(matches!(
            outcome,
            BatchOutcome::Processed { ref discovered, .. } if discovered == &vec!["Parabens".to_string()]
        ));
    }

    #[test]
    fn test_empty_catalog_times_out() {
        let h = Harness::with_catalog(Vec::new());
        let outcome = h.feed(&["red 40"]);
        assert!(matches!(outcome, BatchOutcome::Processed { matched: 0, gap, .. } if gap == WEAK));

        h.advance(WEAK);
        assert_eq!(h.coordinator.state(), SessionState::Idle);
    }

    #[test]
    fn test_catalog_refresh_seen_by_next_batch() {
        let h = Harness::with_catalog(Vec::new());
        h.feed(&["red 40"]);
        h.catalog.replace(catalog());

        let outcome = h.feed(&["red 40"]);
        assert!(matches!(outcome, BatchOutcome::Processed { matched: 1, .. }));
        assert_eq!(h.coordinator.snapshot().catalog_size, 4);
    }

    #[test]
    fn test_snapshot_carries_diagnostics() {
        let h = Harness::new();
        h.feed(&["sugar,", "red 40"]);

        let snapshot = h.coordinator.snapshot();
        assert_eq!(snapshot.state, SessionState::Accumulating);
        assert_eq!(snapshot.recognized_text, "sugar, red 40");
        assert_eq!(snapshot.last_latency, Some(Duration::from_millis(30)));
        assert_eq!(snapshot.last_batch_matches.len(), 1);
        assert!(snapshot.session_id.is_some());
    }

    #[test]
    fn test_undrained_receiver_backlog_is_bounded() {
        let h = Harness::new();
        for _ in 0..500 {
            h.feed(&["red 40"]);
        }
        assert!(h.signals.len() <= MAX_PENDING_UPDATES);

        // Lifecycle signals still get through
        h.advance(STRONG);
        let signals = h.drain();
        assert!(matches!(
            signals.last(),
            Some(SessionSignal::ResultPopupShown { .. })
        ));
        assert_eq!(discovered_count(&signals, "Red 40"), 1);

        // Updates resume once the observer has caught up
        h.coordinator.on_discard();
        h.drain();
        h.feed(&["red 40"]);
        assert!(h
            .drain()
            .iter()
            .any(|s| matches!(s, SessionSignal::MatchesUpdated { .. })));
    }

    struct FailingStore;

    impl HistoryStore for FailingStore {
        fn save(&self, _record: &SessionRecord) -> Result<()> {
            Err(ScanError::Persistence("disk full".to_string()))
        }
    }

    #[test]
    fn test_failed_save_keeps_session() {
        let scheduler = ManualScheduler::new();
        let (coordinator, _signals) = SessionCoordinator::new(
            CatalogHandle::new(catalog()),
            Arc::new(FailingStore),
            Arc::new(scheduler.clone()),
            SessionConfig::default(),
            MatchingConfig::default(),
        );

        coordinator.on_batch(RecognitionBatch::new(["red 40"], Duration::ZERO));
        scheduler.advance(STRONG);

        assert!(coordinator.on_save().is_err());
        assert_eq!(coordinator.state(), SessionState::AwaitingDecision);
        assert!(coordinator.on_discard());
    }

    #[test]
    fn test_dropped_coordinator_timers_are_inert() {
        let h = Harness::new();
        h.feed(&["red 40"]);
        let Harness {
            coordinator,
            scheduler,
            ..
        } = h;
        drop(coordinator);

        scheduler.advance(STRONG);
        assert_eq!(scheduler.pending(), 0);
    }
}
