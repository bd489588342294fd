//! # Render Manager
//!
//! Owns the dirty-window set and the RENDER thread that drains it.
//!
//! Windows are drawn round-robin in insertion order. A window marked dirty
//! again while it is being drawn goes to the back of the queue. A failed
//! draw is logged and the window is not re-queued.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use trellis_core::{Condvar, Mutex, ThreadKind, ThreadKindRegistry};

use crate::config::RenderConfig;
use crate::dirty::WindowDirtySet;
use crate::error::{RenderError, RenderResult};
use crate::window::{Window, WindowId};

#[derive(Default)]
struct State {
    dirty: WindowDirtySet,
    drawing: Option<WindowId>,
    shutdown: bool,
    exited: bool,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    draw_failures: AtomicU64,
    context_failures: AtomicU64,
    requests: AtomicU64,
    coalesced: AtomicU64,
    last_frame_us: AtomicU64,
}

struct Shared {
    state: Mutex<State>,
    ready: Condvar,
    idle: Condvar,
    counters: Counters,
}

/// Point-in-time render statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames drawn successfully.
    pub frames_drawn: u64,
    /// Draws that returned an error or panicked.
    pub draw_failures: u64,
    /// Draws skipped because the context could not be made current.
    pub context_failures: u64,
    /// Windows passed to `request_redraw`.
    pub requests: u64,
    /// Requests for a window that was already queued.
    pub coalesced: u64,
    /// Duration of the most recent draw (microseconds).
    pub last_frame_us: u64,
}

/// Marks the state as exited when the RENDER thread leaves, panics included.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.exited = true;
        state.drawing = None;
        drop(state);
        self.0.idle.notify_all();
    }
}

/// The RENDER thread and its queue of dirty windows.
pub struct RenderManager {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: RenderConfig,
}

impl RenderManager {
    /// Starts the RENDER thread.
    ///
    /// # Errors
    ///
    /// `Core(DuplicateSingleton)` if another live thread is registered as
    /// `Render`; `Spawn` if the thread could not be created.
    pub fn start(config: RenderConfig, registry: Arc<ThreadKindRegistry>) -> RenderResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
            idle: Condvar::new(),
            counters: Counters::default(),
        });

        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || {
                    let registration = match registry.register(ThreadKind::Render) {
                        Ok(registration) => registration,
                        Err(err) => {
                            let _ = started_tx.send(Err(err));
                            return;
                        }
                    };
                    let _ = started_tx.send(Ok(()));
                    let _exit = ExitGuard(Arc::clone(&shared));
                    tracing::info!("render thread started");
                    render_loop(&shared);
                    tracing::info!("render thread stopped");
                    drop(registration);
                })
                .map_err(|err| RenderError::Spawn(err.to_string()))?
        };

        match started_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err.into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(RenderError::Spawn(
                    "render thread exited during start-up".to_string(),
                ));
            }
        }

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            config,
        })
    }

    /// Queues windows for drawing; a window already queued keeps its place.
    ///
    /// # Errors
    ///
    /// `Stopped` after [`stop`](Self::stop).
    pub fn request_redraw<I>(&self, windows: I) -> RenderResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Window>>,
    {
        let counters = &self.shared.counters;
        let mut state = self.shared.state.lock();
        if state.shutdown || state.exited {
            return Err(RenderError::Stopped);
        }
        let mut added = 0_usize;
        for window in windows {
            counters.requests.fetch_add(1, Ordering::Relaxed);
            if state.dirty.insert(window) {
                added += 1;
            } else {
                counters.coalesced.fetch_add(1, Ordering::Relaxed);
            }
        }
        drop(state);
        if added > 0 {
            self.shared.ready.notify_one();
        }
        Ok(())
    }

    /// Number of windows waiting to be drawn.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().dirty.len()
    }

    /// The window being drawn right now, if any.
    #[must_use]
    pub fn drawing(&self) -> Option<WindowId> {
        self.shared.state.lock().drawing
    }

    /// Blocks until the queue is empty and no window is being drawn.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while (!state.dirty.is_empty() || state.drawing.is_some()) && !state.exited {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        let counters = &self.shared.counters;
        RenderStats {
            frames_drawn: counters.frames.load(Ordering::Relaxed),
            draw_failures: counters.draw_failures.load(Ordering::Relaxed),
            context_failures: counters.context_failures.load(Ordering::Relaxed),
            requests: counters.requests.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            last_frame_us: counters.last_frame_us.load(Ordering::Relaxed),
        }
    }

    /// Returns true until [`stop`](Self::stop) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let state = self.shared.state.lock();
        !state.shutdown && !state.exited
    }

    /// Stops the RENDER thread and joins it. Idempotent.
    ///
    /// The frame being drawn finishes; queued windows are dropped.
    pub fn stop(&self) {
        self.shared.state.lock().shutdown = true;
        self.shared.ready.notify_all();

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("render thread panicked");
        }
        self.shared.state.lock().dirty.clear();
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RenderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderManager")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn render_loop(shared: &Shared) {
    loop {
        let window = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(window) = state.dirty.pop_front() {
                    state.drawing = Some(window.id());
                    break window;
                }
                shared.idle.notify_all();
                shared.ready.wait(&mut state);
            }
        };

        draw_window(&*window, &shared.counters);

        shared.state.lock().drawing = None;
        shared.idle.notify_all();
    }
}

fn draw_window(window: &dyn Window, counters: &Counters) {
    let id = window.id();
    let scope = match window.make_current() {
        Ok(scope) => scope,
        Err(err) => {
            counters.context_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(window = %id, error = %err, "could not bind context, skipping draw");
            return;
        }
    };
    let context = scope.context();
    if !context.is_current() {
        counters.context_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            window = %id,
            error = %RenderError::ContextNotCurrent(id),
            "context lost after binding, skipping draw"
        );
        return;
    }

    let started = Instant::now();
    context.set_render_area(window.render_area());
    context.begin_frame();
    let result = panic::catch_unwind(AssertUnwindSafe(|| window.draw()));
    context.finish_frame();
    drop(scope);

    let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    counters.last_frame_us.store(elapsed, Ordering::Relaxed);
    match result {
        Ok(Ok(())) => {
            counters.frames.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(window = %id, frame_us = elapsed, "window drawn");
        }
        Ok(Err(err)) => {
            counters.draw_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(window = %id, error = %err, "draw failed");
        }
        Err(_) => {
            counters.draw_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(window = %id, "draw panicked");
        }
    }
}
