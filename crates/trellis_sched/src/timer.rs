//! # Timer Pool
//!
//! Deadline callbacks run by lightweight fibers.
//!
//! ```text
//!   submit ──> BoundedChannel<Arc<TimerState>> ──> dispatcher (TIMER thread)
//!                                                      │ spawn
//!                                                      v
//!             ┌──────────── fiber (tokio task on a TIMER worker) ───────────┐
//!             │ loop:                                                        │
//!             │   arm notifier                                               │
//!             │   upgrade weak ref ── gone ──> exit                          │
//!             │   cancelled / shutdown ──────> exit                          │
//!             │   deadline passed ──> fire, next_deadline += interval        │
//!             │   else wait(notifier | deadline)                             │
//!             └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A keep-alive timer is owned by the pool and its handle is weak. Any other
//! timer is owned by its handle; dropping the handle ends the timer at its
//! next wake.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::Notify;
use trellis_core::{
    BoundedChannel, CoreError, Mutex, SharedClock, ThreadKind, ThreadKindRegistry, Timestamp,
};

use crate::config::TimerPoolConfig;
use crate::error::{SchedError, SchedResult};

/// How long `shutdown` waits for fibers that are mid-callback.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type Callback = Box<dyn FnMut() + Send>;

/// How many times a repeating timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Fire this many times in total. `Times(0)` never fires.
    Times(u32),
    /// Fire until cancelled or dropped.
    Forever,
}

/// Identifies a timer within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// A timer description, consumed by [`TimerPool::submit`].
pub struct Timer {
    deadline: Timestamp,
    interval: Duration,
    repeat: Repeat,
    keep_alive: bool,
    callback: Callback,
}

impl Timer {
    /// Fires once at `deadline`.
    pub fn once<F>(deadline: Timestamp, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            deadline,
            interval: Duration::ZERO,
            repeat: Repeat::Times(1),
            keep_alive: false,
            callback: Box::new(callback),
        }
    }

    /// Fires at `first`, then every `interval` while `repeat` allows.
    ///
    /// A zero interval makes the timer one-shot.
    pub fn repeating<F>(first: Timestamp, interval: Duration, repeat: Repeat, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            deadline: first,
            interval,
            repeat,
            keep_alive: false,
            callback: Box::new(callback),
        }
    }

    /// Hands ownership to the pool: the timer runs even when every handle is
    /// dropped.
    #[must_use]
    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("deadline", &self.deadline)
            .field("interval", &self.interval)
            .field("repeat", &self.repeat)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

struct TimerState {
    id: TimerId,
    next_deadline: AtomicU64,
    interval: Duration,
    repeat: Repeat,
    keep_alive: bool,
    cancelled: AtomicBool,
    fired: AtomicU64,
    callback: Mutex<Callback>,
}

impl TimerState {
    fn deadline(&self) -> Timestamp {
        Timestamp::from_nanos(self.next_deadline.load(Ordering::Acquire))
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn budget_left(&self) -> bool {
        match self.repeat {
            Repeat::Forever => true,
            Repeat::Times(n) => self.fired.load(Ordering::Acquire) < u64::from(n),
        }
    }

    /// Runs the callback once. Returns true if the timer should keep going.
    fn fire(&self, pool: &PoolShared) -> bool {
        let mut callback = self.callback.lock();
        // Checked under the callback lock so no firing starts after
        // cancel() or shutdown() returned.
        if self.is_cancelled() || pool.is_shutdown() || !self.budget_left() {
            return false;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (callback)()));
        drop(callback);

        let fired = self.fired.fetch_add(1, Ordering::AcqRel) + 1;
        pool.fired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(timer = self.id.0, fired, "timer fired");
        if outcome.is_err() {
            tracing::error!(timer = self.id.0, "timer callback panicked, timer stopped");
            return false;
        }

        if self.interval.is_zero() || !self.budget_left() {
            return false;
        }
        let next = self.deadline().saturating_add(self.interval);
        self.next_deadline.store(next.as_nanos(), Ordering::Release);
        true
    }
}

struct PoolShared {
    channel: BoundedChannel<Arc<TimerState>>,
    wake: Notify,
    shutdown: AtomicBool,
    clock: SharedClock,
    anchored: Mutex<HashMap<TimerId, Arc<TimerState>>>,
    next_id: AtomicU64,
    submitted: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
    active: AtomicU64,
}

impl PoolShared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Handle to a submitted timer.
///
/// Owning for ordinary timers (dropping it ends the timer), weak for
/// keep-alive timers.
pub struct TimerHandle {
    id: TimerId,
    timer: HandleRef,
    pool: Weak<PoolShared>,
}

enum HandleRef {
    Owned(Arc<TimerState>),
    Weak(Weak<TimerState>),
}

impl TimerHandle {
    fn state(&self) -> Option<Arc<TimerState>> {
        match &self.timer {
            HandleRef::Owned(state) => Some(Arc::clone(state)),
            HandleRef::Weak(state) => state.upgrade(),
        }
    }

    /// The timer's id.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// Cancels the timer and wakes its fiber. No firing starts after this
    /// returns. Idempotent.
    pub fn cancel(&self) {
        let Some(state) = self.state() else {
            return;
        };
        if state.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.cancelled.fetch_add(1, Ordering::Relaxed);
            pool.wake.notify_waiters();
        }
        // Wait out a firing already in progress, unless we are inside it.
        if !state.callback.is_locked_by_this_thread() {
            drop(state.callback.lock());
        }
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state().map_or(true, |state| state.is_cancelled())
    }

    /// Number of times the callback ran.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.state()
            .map_or(0, |state| state.fired.load(Ordering::Acquire))
    }

    /// The next deadline, if the timer still exists.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.state().map(|state| state.deadline())
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("owned", &matches!(self.timer, HandleRef::Owned(_)))
            .finish()
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Timers accepted by `submit`.
    pub submitted: u64,
    /// Callback runs.
    pub fired: u64,
    /// Timers cancelled.
    pub cancelled: u64,
    /// Fibers currently alive.
    pub active: u64,
}

/// Fixed-size pool of timer fibers.
pub struct TimerPool {
    shared: Arc<PoolShared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    runtime: Mutex<Option<Runtime>>,
}

impl TimerPool {
    /// Builds the runtime and starts the dispatcher thread.
    ///
    /// # Errors
    ///
    /// `Runtime` if the tokio runtime cannot be built, `Spawn` if the
    /// dispatcher thread cannot be created.
    pub fn start(
        config: &TimerPoolConfig,
        clock: SharedClock,
        registry: Arc<ThreadKindRegistry>,
    ) -> SchedResult<Self> {
        let runtime = {
            let on_start = Arc::clone(&registry);
            let on_stop = Arc::clone(&registry);
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.worker_threads.max(1))
                .thread_name("trellis-timer-worker")
                .enable_time()
                .on_thread_start(move || match on_start.register(ThreadKind::Timer) {
                    Ok(registration) => registration.detach(),
                    Err(err) => tracing::warn!(error = %err, "timer worker not registered"),
                })
                .on_thread_stop(move || on_stop.unregister())
                .build()
                .map_err(|err| SchedError::Runtime(err.to_string()))?
        };

        let shared = Arc::new(PoolShared {
            channel: BoundedChannel::new(config.channel_capacity),
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
            clock,
            anchored: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            submitted: AtomicU64::new(0),
            fired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            active: AtomicU64::new(0),
        });

        // Fibers sleep in real time; a clock that jumps must wake them.
        let weak = Arc::downgrade(&shared);
        shared.clock.on_jump(Box::new(move || match weak.upgrade() {
            Some(pool) => {
                pool.wake.notify_waiters();
                true
            }
            None => false,
        }));

        let dispatcher = {
            let shared = Arc::clone(&shared);
            let handle = runtime.handle().clone();
            thread::Builder::new()
                .name("trellis-timer".to_string())
                .spawn(move || dispatch(&shared, &handle, &registry))
                .map_err(|err| SchedError::Spawn(err.to_string()))?
        };

        tracing::info!(workers = config.worker_threads.max(1), "timer pool started");
        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// The clock deadlines are measured against.
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.shared.clock
    }

    /// Submits a timer. Blocks while the dispatcher channel is full.
    ///
    /// # Errors
    ///
    /// `Core(ChannelClosed)` after [`shutdown`](Self::shutdown).
    pub fn submit(&self, timer: Timer) -> SchedResult<TimerHandle> {
        if self.shared.is_shutdown() {
            return Err(CoreError::ChannelClosed.into());
        }
        let id = TimerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(TimerState {
            id,
            next_deadline: AtomicU64::new(timer.deadline.as_nanos()),
            interval: timer.interval,
            repeat: timer.repeat,
            keep_alive: timer.keep_alive,
            cancelled: AtomicBool::new(false),
            fired: AtomicU64::new(0),
            callback: Mutex::new(timer.callback),
        });

        let handle_ref = if state.keep_alive {
            self.shared.anchored.lock().insert(id, Arc::clone(&state));
            HandleRef::Weak(Arc::downgrade(&state))
        } else {
            HandleRef::Owned(Arc::clone(&state))
        };

        if let Err(err) = self.shared.channel.push(state) {
            self.shared.anchored.lock().remove(&id);
            return Err(SchedError::from(CoreError::from(err)));
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);

        Ok(TimerHandle {
            id,
            timer: handle_ref,
            pool: Arc::downgrade(&self.shared),
        })
    }

    /// Cancels a timer. Same as [`TimerHandle::cancel`].
    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> TimerStats {
        TimerStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            fired: self.shared.fired.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            active: self.shared.active.load(Ordering::Relaxed),
        }
    }

    /// Returns true until [`shutdown`](Self::shutdown) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shared.is_shutdown()
    }

    /// Stops every timer and tears the pool down. Idempotent.
    ///
    /// No callback starts after this returns.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.channel.close();
        self.shared.wake.notify_waiters();

        if let Some(dispatcher) = self.dispatcher.lock().take() {
            if dispatcher.join().is_err() {
                tracing::error!("timer dispatcher panicked");
            }
        }
        if let Some(runtime) = self.runtime.lock().take() {
            if Handle::try_current().is_ok() {
                // Inside a runtime (a timer callback): blocking is not allowed.
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
            }
            tracing::info!("timer pool stopped");
        }
        self.shared.anchored.lock().clear();
    }
}

impl Drop for TimerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TimerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerPool")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn dispatch(shared: &Arc<PoolShared>, runtime: &Handle, registry: &Arc<ThreadKindRegistry>) {
    let _registration = match registry.register(ThreadKind::Timer) {
        Ok(registration) => Some(registration),
        Err(err) => {
            tracing::warn!(error = %err, "timer dispatcher not registered");
            None
        }
    };

    // Pops until the channel is closed and drained.
    while let Ok(state) = shared.channel.pop() {
        if shared.is_shutdown() {
            continue;
        }
        let id = state.id;
        let weak = Arc::downgrade(&state);
        drop(state);
        shared.active.fetch_add(1, Ordering::Relaxed);
        runtime.spawn(fiber(Arc::clone(shared), id, weak));
    }
}

async fn fiber(shared: Arc<PoolShared>, id: TimerId, timer: Weak<TimerState>) {
    loop {
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        // Armed before the checks below, so a cancel or shutdown racing them
        // still wakes this fiber.
        let _ = notified.as_mut().enable();

        let Some(state) = timer.upgrade() else {
            break;
        };
        if state.is_cancelled() || shared.is_shutdown() {
            break;
        }

        let now = shared.clock.now();
        let deadline = state.deadline();
        if now >= deadline {
            if !state.fire(&shared) {
                break;
            }
            continue;
        }
        drop(state);

        let remaining = deadline.saturating_duration_since(now);
        tokio::select! {
            () = tokio::time::sleep(remaining) => {}
            () = &mut notified => {}
        }
    }

    shared.anchored.lock().remove(&id);
    shared.active.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use trellis_core::{ManualClock, MonotonicClock};

    fn pool() -> (TimerPool, SharedClock, Arc<ThreadKindRegistry>) {
        let clock = MonotonicClock::shared();
        let registry = ThreadKindRegistry::new();
        let pool = TimerPool::start(
            &TimerPoolConfig::minimal(),
            Arc::clone(&clock),
            Arc::clone(&registry),
        )
        .unwrap();
        (pool, clock, registry)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_one_shot_fires_once() {
        let (pool, clock, _) = pool();
        let (count, callback) = counter();
        let deadline = clock.now().saturating_add(Duration::from_millis(10));
        let handle = pool.submit(Timer::once(deadline, callback)).unwrap();

        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(handle.fired(), 1);
    }

    #[test]
    fn test_repeat_budget() {
        let (pool, clock, _) = pool();
        let (count, callback) = counter();
        let timer = Timer::repeating(
            clock.now(),
            Duration::from_millis(2),
            Repeat::Times(3),
            callback,
        );
        let _handle = pool.submit(timer).unwrap();

        assert!(wait_until(|| count.load(Ordering::SeqCst) == 3));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(wait_until(|| pool.stats().active == 0));
    }

    #[test]
    fn test_cancel_before_deadline_never_fires() {
        let (pool, clock, _) = pool();
        let (count, callback) = counter();
        let deadline = clock.now().saturating_add(Duration::from_millis(50));
        let handle = pool.submit(Timer::once(deadline, callback)).unwrap();

        pool.cancel(&handle);
        assert!(handle.is_cancelled());
        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().cancelled, 1);
    }

    #[test]
    fn test_dropping_owning_handle_ends_timer() {
        let (pool, clock, _) = pool();
        let (count, callback) = counter();
        let deadline = clock.now().saturating_add(Duration::from_millis(30));
        drop(pool.submit(Timer::once(deadline, callback)).unwrap());

        thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_keep_alive_outlives_handle() {
        let (pool, clock, _) = pool();
        let (count, callback) = counter();
        let deadline = clock.now().saturating_add(Duration::from_millis(10));
        drop(
            pool.submit(Timer::once(deadline, callback).keep_alive())
                .unwrap(),
        );

        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_callbacks_run_on_timer_threads() {
        let (pool, clock, registry) = pool();
        let kind = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&kind);
        let probe = Arc::clone(&registry);
        let _handle = pool
            .submit(Timer::once(clock.now(), move || {
                *sink.lock() = Some(probe.get_kind());
            }))
            .unwrap();

        assert!(wait_until(|| kind.lock().is_some()));
        assert_eq!(*kind.lock(), Some(ThreadKind::Timer));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_final() {
        let (pool, clock, _) = pool();
        let (count, callback) = counter();
        let timer = Timer::repeating(
            clock.now().saturating_add(Duration::from_millis(20)),
            Duration::from_millis(5),
            Repeat::Forever,
            callback,
        );
        let _handle = pool.submit(timer).unwrap();

        pool.shutdown();
        pool.shutdown();
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after);
        assert!(!pool.is_running());
        assert!(matches!(
            pool.submit(Timer::once(clock.now(), || {})),
            Err(SchedError::Core(CoreError::ChannelClosed))
        ));
    }

    #[test]
    fn test_manual_clock_jump_fires_parked_timer() {
        let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
        let pool = TimerPool::start(
            &TimerPoolConfig::minimal(),
            Arc::clone(&clock) as SharedClock,
            ThreadKindRegistry::new(),
        )
        .unwrap();
        let (count, callback) = counter();
        let handle = pool
            .submit(Timer::once(Timestamp::from_millis(3_600_000), callback))
            .unwrap();

        // Let the fiber park on its hour-long sleep.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(7_200));
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
        assert_eq!(handle.fired(), 1);
    }

    #[test]
    fn test_manual_clock_drives_repeats() {
        let clock = Arc::new(ManualClock::new(Timestamp::ZERO));
        let pool = TimerPool::start(
            &TimerPoolConfig::minimal(),
            Arc::clone(&clock) as SharedClock,
            ThreadKindRegistry::new(),
        )
        .unwrap();
        let (count, callback) = counter();
        let _handle = pool
            .submit(Timer::repeating(
                Timestamp::from_millis(1_000),
                Duration::from_secs(60),
                Repeat::Times(3),
                callback,
            ))
            .unwrap();

        clock.set(Timestamp::from_millis(1_000));
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
        clock.advance(Duration::from_secs(60));
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 2));
        clock.advance(Duration::from_secs(600));
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 3));

        thread::sleep(Duration::from_millis(20));
        clock.advance(Duration::from_secs(600));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
