//! # Scheduler
//!
//! Owns the property graph and the EVENT thread that mutates it.
//!
//! ```text
//!   schedule(batch) ─┐
//!   post(t, event)  ─┼─> Queue { pending, enqueued, completed, shutdown }
//!   schedule_all()  ─┘          │ ready.notify
//!                               v
//!                EVENT: drain ─> stable sort by timestamp ─> apply each
//!                               │                              │
//!                        idle.notify_all            observers, feeds,
//!                        (wait_idle)                accumulated changes
//! ```
//!
//! Observers run after the graph lock is released, so they may call back
//! into the scheduler to read values, take a snapshot or freeze the graph.
//!
//! Stopping lets the batch in flight finish and discards the rest of the
//! queue. Discarded work still counts as completed so `wait_idle` returns.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use trellis_core::{
    Batch, BatchOutcome, ChangeSet, Condvar, GraphSnapshot, Mutex, ObserverId,
    PendingNotifications, PropertyGraph, PropertyId, PropertyValue, ThreadKind,
    ThreadKindRegistry, Timestamp,
};

use crate::config::SchedulerConfig;
use crate::error::{SchedError, SchedResult};
use crate::freeze::FreezeGuard;

type EventHandler = Box<dyn FnOnce(&PropertyGraph, &mut Batch) + Send>;

enum Work {
    Batch(Batch),
    Event(EventHandler),
}

struct Queued {
    timestamp: Timestamp,
    work: Work,
}

#[derive(Default)]
struct Queue {
    pending: Vec<Queued>,
    enqueued: u64,
    completed: u64,
    shutdown: bool,
    exited: bool,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    events: AtomicU64,
    commands_applied: AtomicU64,
    commands_rejected: AtomicU64,
    discarded: AtomicU64,
    feed_drops: AtomicU64,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
    idle: Condvar,
    feeds: Mutex<Vec<Sender<ChangeSet>>>,
    accumulated: Mutex<ChangeSet>,
    counters: Counters,
}

impl Shared {
    /// Marks `count` items done. Returns true if shutdown was requested.
    fn complete(&self, count: u64) -> bool {
        let mut queue = self.queue.lock();
        queue.completed += count;
        let shutdown = queue.shutdown;
        drop(queue);
        self.idle.notify_all();
        shutdown
    }

    fn publish(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        self.feeds.lock().retain(|feed| match feed.try_send(changes.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters.feed_drops.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(changed = changes.len(), "change feed full, dropping change-set");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        self.accumulated.lock().merge(changes.clone());
    }
}

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Batches applied (including those produced by events).
    pub batches_applied: u64,
    /// Events run.
    pub events_handled: u64,
    /// Commands that succeeded.
    pub commands_applied: u64,
    /// Commands that were rejected and logged.
    pub commands_rejected: u64,
    /// Queued work discarded by `stop`.
    pub discarded: u64,
    /// Change-sets dropped because a feed was full.
    pub feed_drops: u64,
    /// Work enqueued but not yet completed.
    pub pending: u64,
}

/// Marks the queue as exited when the EVENT thread leaves, panics included.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut queue = self.0.queue.lock();
        queue.exited = true;
        queue.completed = queue.enqueued;
        queue.pending.clear();
        drop(queue);
        self.0.idle.notify_all();
    }
}

/// The EVENT thread and the graph it owns.
pub struct Scheduler {
    shared: Arc<Shared>,
    graph: Arc<Mutex<PropertyGraph>>,
    registry: Arc<ThreadKindRegistry>,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Starts the EVENT thread over an empty graph.
    ///
    /// # Errors
    ///
    /// `Core(DuplicateSingleton)` if another live thread is registered as
    /// `Event`; `Spawn` if the thread could not be created.
    pub fn start(config: SchedulerConfig, registry: Arc<ThreadKindRegistry>) -> SchedResult<Self> {
        Self::with_graph(config, registry, PropertyGraph::new())
    }

    /// Starts the EVENT thread over an existing graph.
    ///
    /// # Errors
    ///
    /// As [`start`](Self::start).
    pub fn with_graph(
        config: SchedulerConfig,
        registry: Arc<ThreadKindRegistry>,
        graph: PropertyGraph,
    ) -> SchedResult<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            ready: Condvar::new(),
            idle: Condvar::new(),
            feeds: Mutex::new(Vec::new()),
            accumulated: Mutex::new(ChangeSet::default()),
            counters: Counters::default(),
        });
        let graph = Arc::new(Mutex::new(graph));

        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let handle = {
            let shared = Arc::clone(&shared);
            let graph = Arc::clone(&graph);
            let registry = Arc::clone(&registry);
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || {
                    let registration = match registry.register(ThreadKind::Event) {
                        Ok(registration) => registration,
                        Err(err) => {
                            let _ = started_tx.send(Err(err));
                            return;
                        }
                    };
                    let _ = started_tx.send(Ok(()));
                    let _exit = ExitGuard(Arc::clone(&shared));
                    tracing::info!("event thread started");
                    event_loop(&shared, &graph, &registry);
                    tracing::info!("event thread stopped");
                    drop(registration);
                })
                .map_err(|err| SchedError::Spawn(err.to_string()))?
        };

        match started_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err.into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(SchedError::Spawn(
                    "event thread exited during start-up".to_string(),
                ));
            }
        }

        Ok(Self {
            shared,
            graph,
            registry,
            handle: Mutex::new(Some(handle)),
            config,
        })
    }

    fn enqueue(&self, items: impl IntoIterator<Item = Queued>) -> SchedResult<()> {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown || queue.exited {
            return Err(SchedError::Stopped);
        }
        let before = queue.pending.len();
        queue.pending.extend(items);
        let added = (queue.pending.len() - before) as u64;
        queue.enqueued += added;
        drop(queue);
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Enqueues a batch and returns immediately.
    ///
    /// # Errors
    ///
    /// `Stopped` after [`stop`](Self::stop).
    pub fn schedule(&self, batch: Batch) -> SchedResult<()> {
        let timestamp = batch.timestamp();
        self.enqueue([Queued {
            timestamp,
            work: Work::Batch(batch),
        }])
    }

    /// Enqueues several batches at once; the EVENT thread sees all of them
    /// in the same drain.
    ///
    /// # Errors
    ///
    /// `Stopped` after [`stop`](Self::stop).
    pub fn schedule_all(&self, batches: impl IntoIterator<Item = Batch>) -> SchedResult<()> {
        self.enqueue(batches.into_iter().map(|batch| Queued {
            timestamp: batch.timestamp(),
            work: Work::Batch(batch),
        }))
    }

    /// Enqueues an event: `handler` runs on the EVENT thread with read access
    /// to the graph and fills a batch stamped `timestamp`, which is applied
    /// right after.
    ///
    /// # Errors
    ///
    /// `Stopped` after [`stop`](Self::stop).
    pub fn post<F>(&self, timestamp: Timestamp, handler: F) -> SchedResult<()>
    where
        F: FnOnce(&PropertyGraph, &mut Batch) + Send + 'static,
    {
        self.enqueue([Queued {
            timestamp,
            work: Work::Event(Box::new(handler)),
        }])
    }

    /// Blocks until everything enqueued before this call has been applied
    /// (or discarded by a stop).
    ///
    /// Returns at once on the EVENT thread itself (from an observer), which
    /// would otherwise wait on the batch it is delivering.
    pub fn wait_idle(&self) {
        if self.registry.is_current(ThreadKind::Event) {
            return;
        }
        let mut queue = self.shared.queue.lock();
        let target = queue.enqueued;
        while queue.completed < target && !queue.exited {
            self.shared.idle.wait(&mut queue);
        }
    }

    /// Drains the change-set accumulated since the previous call.
    #[must_use]
    pub fn take_changes(&self) -> ChangeSet {
        std::mem::take(&mut *self.shared.accumulated.lock())
    }

    /// Subscribes to per-batch change-sets with the configured capacity.
    #[must_use]
    pub fn change_feed(&self) -> Receiver<ChangeSet> {
        self.change_feed_with_capacity(self.config.change_feed_capacity)
    }

    /// Subscribes to per-batch change-sets. When the receiver falls
    /// `capacity` sets behind, further sets are dropped with a warning.
    #[must_use]
    pub fn change_feed_with_capacity(&self, capacity: usize) -> Receiver<ChangeSet> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.shared.feeds.lock().push(tx);
        rx
    }

    /// Read access to the graph. Blocks while a batch is being applied.
    ///
    /// # Panics
    ///
    /// In debug builds, when called from an event handler passed to
    /// [`post`](Self::post) (the EVENT thread already holds the graph).
    #[must_use]
    pub fn freeze(&self) -> FreezeGuard<'_> {
        FreezeGuard::new(self.graph.lock())
    }

    /// Copies every value out of the graph.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.lock().snapshot()
    }

    /// The current value of `id`, cloned.
    #[must_use]
    pub fn value(&self, id: PropertyId) -> Option<PropertyValue> {
        self.graph.lock().get(id).cloned()
    }

    /// Registers a per-property observer; it runs on the EVENT thread once
    /// the batch is applied and the graph lock released.
    pub fn observe<F>(&self, property: PropertyId, callback: F) -> ObserverId
    where
        F: Fn(PropertyId, &PropertyValue) + Send + Sync + 'static,
    {
        self.graph.lock().observe(property, callback)
    }

    /// Registers a whole change-set observer; it runs on the EVENT thread
    /// like [`observe`](Self::observe).
    pub fn observe_all<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        self.graph.lock().observe_all(callback)
    }

    /// Removes an observer.
    pub fn unobserve(&self, observer: ObserverId) -> bool {
        self.graph.lock().unobserve(observer)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        let queue = self.shared.queue.lock();
        SchedulerStats {
            batches_applied: counters.batches.load(Ordering::Relaxed),
            events_handled: counters.events.load(Ordering::Relaxed),
            commands_applied: counters.commands_applied.load(Ordering::Relaxed),
            commands_rejected: counters.commands_rejected.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
            feed_drops: counters.feed_drops.load(Ordering::Relaxed),
            pending: queue.enqueued - queue.completed,
        }
    }

    /// The registry the EVENT thread is registered in.
    #[must_use]
    pub fn registry(&self) -> &Arc<ThreadKindRegistry> {
        &self.registry
    }

    /// Returns true until [`stop`](Self::stop) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let queue = self.shared.queue.lock();
        !queue.shutdown && !queue.exited
    }

    /// Stops the EVENT thread and joins it. Idempotent.
    ///
    /// The batch being applied finishes; queued work is discarded.
    pub fn stop(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
        }
        self.shared.ready.notify_all();

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Stopped from an observer: the loop exits after this batch.
            return;
        }
        if handle.join().is_err() {
            tracing::error!("event thread panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn event_loop(shared: &Shared, graph: &Mutex<PropertyGraph>, registry: &ThreadKindRegistry) {
    loop {
        let mut drained = {
            let mut queue = shared.queue.lock();
            while queue.pending.is_empty() && !queue.shutdown {
                shared.ready.wait(&mut queue);
            }
            if queue.shutdown {
                let discarded = queue.pending.len() as u64;
                queue.pending.clear();
                queue.completed += discarded;
                drop(queue);
                shared.counters.discarded.fetch_add(discarded, Ordering::Relaxed);
                shared.idle.notify_all();
                return;
            }
            std::mem::take(&mut queue.pending)
        };

        // Stable: equal timestamps keep enqueue order.
        drained.sort_by_key(|item| item.timestamp);

        let mut items = drained.into_iter();
        while let Some(item) = items.next() {
            let (outcome, notifications) = apply(shared, graph, registry, item);
            notifications.deliver();
            record(shared, &outcome);
            shared.publish(&outcome.changes);

            if shared.complete(1) {
                let discarded = items.len() as u64;
                shared.counters.discarded.fetch_add(discarded, Ordering::Relaxed);
                shared.complete(discarded);
                return;
            }
        }
    }
}

fn apply(
    shared: &Shared,
    graph: &Mutex<PropertyGraph>,
    registry: &ThreadKindRegistry,
    item: Queued,
) -> (BatchOutcome, PendingNotifications) {
    debug_assert!(
        registry.is_current(ThreadKind::Event),
        "graph mutated off the EVENT thread"
    );
    let mut graph = graph.lock();
    let outcome = match item.work {
        Work::Batch(batch) => graph.apply_batch_deferred(&batch),
        Work::Event(handler) => {
            shared.counters.events.fetch_add(1, Ordering::Relaxed);
            let mut batch = Batch::new(item.timestamp);
            handler(&graph, &mut batch);
            graph.apply_batch_deferred(&batch)
        }
    };
    let notifications = graph.pending_notifications(&outcome.changes);
    (outcome, notifications)
}

fn record(shared: &Shared, outcome: &BatchOutcome) {
    let counters = &shared.counters;
    counters.batches.fetch_add(1, Ordering::Relaxed);
    counters
        .commands_applied
        .fetch_add(outcome.applied as u64, Ordering::Relaxed);
    counters
        .commands_rejected
        .fetch_add(outcome.rejected.len() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use trellis_core::{CoreError, Expression};

    fn id(serial: u64) -> PropertyId {
        PropertyId::new(serial, 0)
    }

    fn ts(nanos: u64) -> Timestamp {
        Timestamp::from_nanos(nanos)
    }

    fn scheduler() -> Scheduler {
        Scheduler::start(SchedulerConfig::default(), ThreadKindRegistry::new()).unwrap()
    }

    #[test]
    fn test_batches_apply_on_event_thread() {
        let sched = scheduler();
        let registry = Arc::clone(sched.registry());
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        sched.observe_all(move |_| sink.lock().push(registry.get_kind()));

        sched
            .schedule(Batch::builder(ts(1)).create(id(1), 1_i64).build())
            .unwrap();
        sched.wait_idle();

        assert_eq!(*kinds.lock(), vec![ThreadKind::Event]);
        assert_eq!(sched.value(id(1)), Some(PropertyValue::Int(1)));
    }

    #[test]
    fn test_errors_are_absorbed() {
        let sched = scheduler();
        let batch = Batch::builder(ts(1))
            .set_value(id(9), 1_i64)
            .create(id(1), 5_i64)
            .build();
        sched.schedule(batch).unwrap();
        sched.wait_idle();

        let stats = sched.stats();
        assert_eq!(stats.commands_applied, 1);
        assert_eq!(stats.commands_rejected, 1);
        assert_eq!(stats.pending, 0);
        assert!(sched.is_running());
    }

    #[test]
    fn test_post_reads_graph_and_applies() {
        let sched = scheduler();
        sched
            .schedule(Batch::builder(ts(1)).create(id(1), 20_i64).build())
            .unwrap();
        sched
            .post(ts(2), |graph, batch| {
                let current = graph.get(id(1)).and_then(PropertyValue::as_int).unwrap_or(0);
                batch.push(id(1), trellis_core::CommandOp::SetValue((current + 1).into()));
            })
            .unwrap();
        sched.wait_idle();

        assert_eq!(sched.value(id(1)), Some(PropertyValue::Int(21)));
        assert_eq!(sched.stats().events_handled, 1);
    }

    #[test]
    fn test_take_changes_accumulates_and_drains() {
        let sched = scheduler();
        sched
            .schedule_all([
                Batch::builder(ts(1)).create(id(1), 1_i64).build(),
                Batch::builder(ts(2)).create(id(2), 2_i64).build(),
            ])
            .unwrap();
        sched.wait_idle();

        let changes = sched.take_changes();
        assert_eq!(changes.iter().collect::<Vec<_>>(), vec![id(1), id(2)]);
        assert!(sched.take_changes().is_empty());
    }

    #[test]
    fn test_change_feed_receives_each_batch() {
        let sched = scheduler();
        let feed = sched.change_feed();
        sched
            .schedule(Batch::builder(ts(1)).create(id(1), 1_i64).build())
            .unwrap();
        sched
            .schedule(Batch::builder(ts(2)).set_value(id(1), 2_i64).build())
            .unwrap();

        let first = feed.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = feed.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.contains(id(1)));
        assert_eq!(second.timestamp(), ts(2));
    }

    #[test]
    fn test_full_feed_drops_with_count() {
        let sched = scheduler();
        let _feed = sched.change_feed_with_capacity(1);
        for serial in 1..=3 {
            sched
                .schedule(Batch::builder(ts(serial)).create(id(serial), 0_i64).build())
                .unwrap();
        }
        sched.wait_idle();
        assert_eq!(sched.stats().feed_drops, 2);
    }

    #[test]
    fn test_freeze_gives_consistent_view() {
        let sched = scheduler();
        let double = Expression::new(vec![id(1)], |inputs| {
            PropertyValue::Int(inputs.int(0).unwrap_or_default() * 2)
        });
        sched
            .schedule(
                Batch::builder(ts(1))
                    .create(id(1), 4_i64)
                    .create(id(2), 0_i64)
                    .set_expression(id(2), double)
                    .build(),
            )
            .unwrap();
        sched.wait_idle();

        let frozen = sched.freeze();
        assert_eq!(frozen.get(id(2)), Some(&PropertyValue::Int(8)));
        assert!(frozen.validate().is_ok());
    }

    #[test]
    fn test_stop_is_idempotent_and_rejects_work() {
        let sched = scheduler();
        sched.stop();
        sched.stop();
        assert!(!sched.is_running());
        assert_eq!(
            sched.schedule(Batch::new(ts(1))),
            Err(SchedError::Stopped)
        );
        sched.wait_idle();
    }

    #[test]
    fn test_stop_discards_queued_work() {
        let sched = scheduler();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let applied = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&applied);
        sched.observe_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let remote = Arc::clone(&gate);
        sched
            .post(ts(1), move |_, _| {
                let (lock, cvar) = &*remote;
                let mut open = lock.lock();
                while !*open {
                    cvar.wait(&mut open);
                }
            })
            .unwrap();
        for serial in 1..=5 {
            sched
                .schedule(Batch::builder(ts(1 + serial)).create(id(serial), 0_i64).build())
                .unwrap();
        }

        // Release the blocked event after the stop request is in.
        let releaser = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                let (lock, cvar) = &*gate;
                *lock.lock() = true;
                cvar.notify_all();
            })
        };
        sched.stop();
        releaser.join().unwrap();

        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert_eq!(sched.stats().pending, 0);
    }

    #[test]
    fn test_second_event_thread_rejected() {
        let registry = ThreadKindRegistry::new();
        let first = Scheduler::start(SchedulerConfig::default(), Arc::clone(&registry)).unwrap();
        let err = Scheduler::start(SchedulerConfig::default(), Arc::clone(&registry)).unwrap_err();
        assert!(matches!(
            err,
            SchedError::Core(CoreError::DuplicateSingleton {
                kind: ThreadKind::Event,
                ..
            })
        ));

        first.stop();
        assert!(Scheduler::start(SchedulerConfig::default(), registry).is_ok());
    }

    #[test]
    fn test_observers_may_call_back_into_scheduler() {
        let sched = Arc::new(scheduler());
        let weak = Arc::downgrade(&sched);
        let (tx, rx) = crossbeam_channel::unbounded();
        sched.observe(id(1), move |_, value| {
            let Some(sched) = weak.upgrade() else {
                return;
            };
            sched.wait_idle();
            let read = sched.value(id(1));
            let total = sched.snapshot().len();
            let frozen = sched.freeze().get(id(2)).cloned();
            let _ = tx.send((value.clone(), read, total, frozen));
        });

        sched
            .schedule(
                Batch::builder(ts(1))
                    .create(id(2), 8_i64)
                    .create(id(1), 3_i64)
                    .build(),
            )
            .unwrap();
        let (value, read, total, frozen) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(value, PropertyValue::Int(3));
        assert_eq!(read, Some(PropertyValue::Int(3)));
        assert_eq!(total, 2);
        assert_eq!(frozen, Some(PropertyValue::Int(8)));

        sched.wait_idle();
        sched
            .schedule(Batch::builder(ts(2)).set_value(id(1), 4_i64).build())
            .unwrap();
        let (value, ..) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(value, PropertyValue::Int(4));
        sched.wait_idle();
    }
}
