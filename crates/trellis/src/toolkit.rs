//! # Toolkit
//!
//! Explicit start-up and tear-down of the whole spine. The thread calling
//! [`Toolkit::init`] becomes the UI thread.
//!
//! ```text
//!   UI thread                 EVENT thread              RENDER thread
//!   ─────────                 ────────────              ─────────────
//!   batch() ─ schedule ──────> apply, propagate
//!                              observers, changes
//!   synchronize():
//!     wait_idle <──────────── idle
//!     take_changes
//!     bindings.affected ─ request_redraw ─────────────> draw dirty windows
//! ```
//!
//! Windows only hear about a mutation after the EVENT thread has finished
//! it, so a draw never observes a half-applied batch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trellis_core::{
    Batch, BatchBuilder, GraphSnapshot, MonotonicClock, Mutex, PropertyId,
    PropertyIdAllocator, PropertyValue, SharedClock, ThreadKind, ThreadKindRegistry,
    ThreadRegistration, Timestamp,
};
use trellis_render::{RenderManager, Window, WindowId};
use trellis_sched::{Scheduler, Timer, TimerHandle, TimerPool};

use crate::binding::WindowBindings;
use crate::config::TrellisConfig;
use crate::error::{ToolkitError, ToolkitResult};

/// A running toolkit: graph, EVENT thread, RENDER thread and timer pool.
pub struct Toolkit {
    clock: SharedClock,
    registry: Arc<ThreadKindRegistry>,
    ids: PropertyIdAllocator,
    scheduler: Scheduler,
    render: RenderManager,
    timers: TimerPool,
    bindings: Mutex<WindowBindings>,
    ui: Mutex<Option<ThreadRegistration>>,
    shut_down: AtomicBool,
    config: TrellisConfig,
}

impl Toolkit {
    /// Starts a toolkit with its own clock on the process-wide registry.
    ///
    /// Only one toolkit can run per process: a second `init` while the
    /// first is alive fails with `DuplicateSingleton`.
    ///
    /// # Errors
    ///
    /// See [`init_with`](Self::init_with).
    pub fn init(config: TrellisConfig) -> ToolkitResult<Self> {
        Self::init_with(config, MonotonicClock::shared(), ThreadKindRegistry::global())
    }

    /// Starts a toolkit over a given clock and registry.
    ///
    /// Registers the calling thread as `MainUi`, then starts the scheduler,
    /// the render manager and the timer pool in that order. Anything started
    /// before a failure is stopped again.
    ///
    /// # Errors
    ///
    /// `DuplicateSingleton` (wrapped) if another live thread already holds
    /// `MainUi`, `Event` or `Render` in `registry`; spawn and runtime errors
    /// from the subsystems.
    pub fn init_with(
        config: TrellisConfig,
        clock: SharedClock,
        registry: Arc<ThreadKindRegistry>,
    ) -> ToolkitResult<Self> {
        let ui = registry.register(ThreadKind::MainUi)?;
        let scheduler = Scheduler::start(config.scheduler.clone(), Arc::clone(&registry))?;
        let render = RenderManager::start(config.render.clone(), Arc::clone(&registry))?;
        let timers = TimerPool::start(&config.timers, Arc::clone(&clock), Arc::clone(&registry))?;
        tracing::info!("toolkit initialised");

        Ok(Self {
            clock,
            registry,
            ids: PropertyIdAllocator::new(),
            scheduler,
            render,
            timers,
            bindings: Mutex::new(WindowBindings::new()),
            ui: Mutex::new(Some(ui)),
            shut_down: AtomicBool::new(false),
            config,
        })
    }

    fn ensure_running(&self) -> ToolkitResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ToolkitError::ShutDown);
        }
        Ok(())
    }

    /// A fresh property id.
    #[must_use]
    pub fn allocate_id(&self) -> PropertyId {
        self.ids.allocate()
    }

    /// The current time on the toolkit clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// A batch builder stamped with the current time.
    #[must_use]
    pub fn batch(&self) -> BatchBuilder {
        Batch::builder(self.clock.now())
    }

    /// Hands a batch to the EVENT thread.
    ///
    /// # Errors
    ///
    /// `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn schedule(&self, batch: Batch) -> ToolkitResult<()> {
        self.ensure_running()?;
        Ok(self.scheduler.schedule(batch)?)
    }

    /// Redraws `window` whenever one of `properties` changes or is deleted.
    pub fn bind_window(&self, window: Arc<dyn Window>, properties: impl IntoIterator<Item = PropertyId>) {
        let id = window.id();
        self.bindings.lock().bind(window, properties);
        tracing::debug!(window = %id, "window bound");
    }

    /// Forgets every binding of `window`. Returns false if it was not bound.
    pub fn unbind_window(&self, window: WindowId) -> bool {
        self.bindings.lock().unbind(window)
    }

    /// Requests a redraw of `window` regardless of property changes.
    ///
    /// # Errors
    ///
    /// `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn invalidate(&self, window: Arc<dyn Window>) -> ToolkitResult<()> {
        self.ensure_running()?;
        Ok(self.render.request_redraw([window])?)
    }

    /// The UI thread's synchronization point.
    ///
    /// Waits until the EVENT thread is idle, collects every property changed
    /// since the last call and queues the bound windows for a redraw.
    /// Returns the number of windows queued.
    ///
    /// This consumes the scheduler's accumulated changes; do not mix it with
    /// direct calls to `Scheduler::take_changes`.
    ///
    /// # Errors
    ///
    /// `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn synchronize(&self) -> ToolkitResult<usize> {
        self.ensure_running()?;
        self.scheduler.wait_idle();
        let changes = self.scheduler.take_changes();
        if changes.is_empty() {
            return Ok(0);
        }
        let windows = self.bindings.lock().affected(&changes);
        let count = windows.len();
        if count > 0 {
            self.render.request_redraw(windows)?;
        }
        tracing::debug!(changed = changes.len(), windows = count, "synchronized");
        Ok(count)
    }

    /// Runs `callback` on a timer thread after `delay`.
    ///
    /// # Errors
    ///
    /// `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn after<F>(&self, delay: Duration, callback: F) -> ToolkitResult<TimerHandle>
    where
        F: FnMut() + Send + 'static,
    {
        self.submit_timer(Timer::once(self.clock.now().saturating_add(delay), callback))
    }

    /// Submits a timer to the pool.
    ///
    /// # Errors
    ///
    /// `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn submit_timer(&self, timer: Timer) -> ToolkitResult<TimerHandle> {
        self.ensure_running()?;
        Ok(self.timers.submit(timer)?)
    }

    /// Current value of `id`, read under a freeze.
    #[must_use]
    pub fn value(&self, id: PropertyId) -> Option<PropertyValue> {
        self.scheduler.value(id)
    }

    /// A copy of every value.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        self.scheduler.snapshot()
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The render manager.
    #[must_use]
    pub const fn render(&self) -> &RenderManager {
        &self.render
    }

    /// The timer pool.
    #[must_use]
    pub const fn timers(&self) -> &TimerPool {
        &self.timers
    }

    /// The toolkit clock.
    #[must_use]
    pub const fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// The thread registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ThreadKindRegistry> {
        &self.registry
    }

    /// The configuration the toolkit was started with.
    #[must_use]
    pub const fn config(&self) -> &TrellisConfig {
        &self.config
    }

    /// Returns true until [`shutdown`](Self::shutdown) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shut_down.load(Ordering::Acquire)
    }

    /// Stops the timer pool, the RENDER thread and the EVENT thread, in that
    /// order, and releases the UI thread. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.timers.shutdown();
        self.render.stop();
        self.scheduler.stop();
        drop(self.ui.lock().take());
        tracing::info!("toolkit shut down");
    }
}

impl Drop for Toolkit {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolkit")
            .field("running", &self.is_running())
            .field("scheduler", &self.scheduler)
            .field("render", &self.render)
            .field("bindings", &*self.bindings.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Aabr, Expression};
    use trellis_render::HeadlessWindow;

    fn toolkit() -> Toolkit {
        Toolkit::init_with(
            TrellisConfig::minimal(),
            MonotonicClock::shared(),
            ThreadKindRegistry::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_init_registers_ui_thread() {
        let toolkit = toolkit();
        assert_eq!(toolkit.registry().get_kind(), ThreadKind::MainUi);

        toolkit.shutdown();
        assert_eq!(toolkit.registry().get_kind(), ThreadKind::Anonymous);
    }

    #[test]
    fn test_synchronize_redraws_bound_windows() {
        let toolkit = toolkit();
        let width = toolkit.allocate_id();
        let doubled = toolkit.allocate_id();
        let unrelated = toolkit.allocate_id();

        let bound = Arc::new(HeadlessWindow::new(WindowId::new(1), Aabr::from_size(1.0, 1.0)));
        let idle = Arc::new(HeadlessWindow::new(WindowId::new(2), Aabr::from_size(1.0, 1.0)));
        toolkit.bind_window(bound.clone() as Arc<dyn Window>, [doubled]);
        toolkit.bind_window(idle.clone() as Arc<dyn Window>, [unrelated]);

        let twice = Expression::new(vec![width], |inputs| {
            PropertyValue::Int(inputs.int(0).unwrap_or_default() * 2)
        });
        let setup = toolkit
            .batch()
            .create(width, 10_i64)
            .create(doubled, 0_i64)
            .set_expression(doubled, twice)
            .create(unrelated, 0_i64)
            .build();
        toolkit.schedule(setup).unwrap();
        assert_eq!(toolkit.synchronize().unwrap(), 2);
        toolkit.render().wait_idle();
        assert_eq!((bound.draws(), idle.draws()), (1, 1));

        toolkit
            .schedule(toolkit.batch().set_value(width, 11_i64).build())
            .unwrap();
        assert_eq!(toolkit.synchronize().unwrap(), 1);
        toolkit.render().wait_idle();
        assert_eq!((bound.draws(), idle.draws()), (2, 1));
        assert_eq!(toolkit.value(doubled), Some(PropertyValue::Int(22)));

        assert_eq!(toolkit.synchronize().unwrap(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let toolkit = toolkit();
        toolkit.shutdown();
        toolkit.shutdown();
        assert!(!toolkit.is_running());
        assert_eq!(toolkit.synchronize(), Err(ToolkitError::ShutDown));
        assert!(toolkit.after(Duration::from_millis(1), || {}).is_err());
    }
}
