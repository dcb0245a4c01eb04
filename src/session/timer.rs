//! Cancelable delayed actions
//!
//! The coordinator never sleeps itself. It asks a [`Scheduler`] to run an
//! action later and keeps the returned [`ScheduledTask`] in a single-slot
//! [`GapTimer`]. Arming the slot cancels whatever was pending, and every
//! action carries the generation it was armed with so a firing that lost a
//! race against cancellation can recognise itself as stale.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

/// Work to run once the delay has elapsed
pub type TimerAction = Box<dyn FnOnce() + Send + 'static>;

/// Runs actions after a delay
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, action: TimerAction) -> ScheduledTask;
}

/// Handle to a scheduled action
///
/// Dropping the handle leaves the action scheduled; call [`cancel`](Self::cancel)
/// to withdraw it.
pub struct ScheduledTask {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduledTask {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Withdraw the action if it has not started yet
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("cancelable", &self.cancel.is_some())
            .finish()
    }
}

/// Scheduler backed by tokio timers
///
/// An aborted task only stops at an await point, so an action that has
/// started running always completes.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context
    ///
    /// Panics outside a tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: TimerAction) -> ScheduledTask {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        ScheduledTask::new(move || task.abort())
    }
}

#[derive(Default)]
struct ManualQueue {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), TimerAction>,
}

/// Deterministic scheduler driven by an explicit virtual clock
///
/// Nothing fires until [`advance`](Self::advance) moves the clock past the
/// action's deadline. Actions due at the same instant fire in scheduling order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<ManualQueue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.queue.lock().now
    }

    /// Number of actions still waiting to fire
    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Move the clock forward, firing every action that falls due
    ///
    /// Actions scheduled by fired actions are honoured within the same call
    /// when their deadline is inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.queue.lock().now + by;
        loop {
            let due = {
                let mut queue = self.queue.lock();
                let key = match queue.pending.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => {
                        queue.now = target;
                        return;
                    }
                };
                queue.now = key.0;
                queue.pending.remove(&key)
            };
            if let Some(action) = due {
                trace!("Manual scheduler firing action");
                action();
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, action: TimerAction) -> ScheduledTask {
        let key = {
            let mut queue = self.queue.lock();
            let key = (queue.now + delay, queue.next_id);
            queue.next_id += 1;
            queue.pending.insert(key, action);
            key
        };
        let queue: Weak<Mutex<ManualQueue>> = Arc::downgrade(&self.queue);
        ScheduledTask::new(move || {
            if let Some(queue) = queue.upgrade() {
                queue.lock().pending.remove(&key);
            }
        })
    }
}

/// Single-slot debounce timer
///
/// At most one task is outstanding; arming always cancels the previous one.
#[derive(Debug, Default)]
pub struct GapTimer {
    generation: u64,
    task: Option<ScheduledTask>,
    delay: Option<Duration>,
}

impl GapTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending task and schedule a new one
    ///
    /// `make_action` receives the generation the action must present when it
    /// fires.
    pub fn arm<F>(&mut self, scheduler: &dyn Scheduler, delay: Duration, make_action: F)
    where
        F: FnOnce(u64) -> TimerAction,
    {
        self.cancel();
        let generation = self.generation;
        self.task = Some(scheduler.schedule(delay, make_action(generation)));
        self.delay = Some(delay);
    }

    /// Withdraw the pending task; a late firing becomes a no-op
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        self.delay = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Claim a firing; false if the task was cancelled or re-armed meanwhile
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.task.is_some() && self.generation == generation {
            self.task = None;
            self.delay = None;
            self.generation = self.generation.wrapping_add(1);
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Delay of the pending task
    pub fn pending_delay(&self) -> Option<Duration> {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_action(counter: &Arc<AtomicUsize>) -> TimerAction {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_scheduler_fires_at_deadline() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let _task = scheduler.schedule(Duration::from_millis(500), counter_action(&fired));

        scheduler.advance(Duration::from_millis(499));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.now(), Duration::from_millis(500));
    }

    #[test]
    fn test_manual_scheduler_cancel() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let task = scheduler.schedule(Duration::from_millis(100), counter_action(&fired));

        task.cancel();
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_scheduler_chained_actions() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let inner_fired = fired.clone();
        let _task = scheduler.schedule(
            Duration::from_millis(100),
            Box::new(move || {
                let _ = inner_scheduler.schedule(
                    Duration::from_millis(100),
                    counter_action(&inner_fired),
                );
            }),
        );

        scheduler.advance(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gap_timer_rearm_cancels_previous() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = GapTimer::new();

        timer.arm(&scheduler, Duration::from_millis(500), |_| counter_action(&fired));
        timer.arm(&scheduler, Duration::from_millis(1200), |_| counter_action(&fired));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(timer.pending_delay(), Some(Duration::from_millis(1200)));

        scheduler.advance(Duration::from_millis(600));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        scheduler.advance(Duration::from_millis(600));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gap_timer_stale_generation_rejected() {
        let scheduler = ManualScheduler::new();
        let mut timer = GapTimer::new();
        let mut armed_with = None;

        timer.arm(&scheduler, Duration::from_millis(10), |generation| {
            armed_with = Some(generation);
            Box::new(|| {})
        });
        let generation = armed_with.unwrap();

        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.fire(generation));
    }

    #[test]
    fn test_gap_timer_fires_once() {
        let scheduler = ManualScheduler::new();
        let mut timer = GapTimer::new();
        let mut armed_with = None;

        timer.arm(&scheduler, Duration::from_millis(10), |generation| {
            armed_with = Some(generation);
            Box::new(|| {})
        });
        let generation = armed_with.unwrap();

        assert!(timer.fire(generation));
        assert!(!timer.fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_and_cancels() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));

        let _kept = scheduler.schedule(Duration::from_millis(200), counter_action(&fired));
        let cancelled = scheduler.schedule(Duration::from_millis(100), counter_action(&fired));
        cancelled.cancel();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
