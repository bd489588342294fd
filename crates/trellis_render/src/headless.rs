//! # Headless Backend
//!
//! In-memory [`Window`] and [`GraphicsContext`] implementations. They record
//! what the render thread does to them, and can be told to misbehave, which
//! is all tests and the demo need.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use trellis_core::{Aabr, Mutex};

use crate::error::{RenderError, RenderResult};
use crate::window::{GraphicsContext, Window, WindowId};

/// A context with no backing surface.
#[derive(Debug)]
pub struct HeadlessContext {
    window: WindowId,
    owner: Mutex<Option<ThreadId>>,
    area: Mutex<Aabr>,
    frames_begun: AtomicU64,
    frames_finished: AtomicU64,
    refuse_bind: AtomicBool,
    detached: AtomicBool,
}

impl HeadlessContext {
    /// Creates an unbound context for `window`.
    #[must_use]
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            owner: Mutex::new(None),
            area: Mutex::new(Aabr::default()),
            frames_begun: AtomicU64::new(0),
            frames_finished: AtomicU64::new(0),
            refuse_bind: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        }
    }

    /// Makes `make_current` fail.
    pub fn set_refuse_bind(&self, refuse: bool) {
        self.refuse_bind.store(refuse, Ordering::Release);
    }

    /// Makes `make_current` succeed while `is_current` keeps reporting false,
    /// like a driver that silently lost the context.
    pub fn set_detached(&self, detached: bool) {
        self.detached.store(detached, Ordering::Release);
    }

    /// Frames started.
    #[must_use]
    pub fn frames_begun(&self) -> u64 {
        self.frames_begun.load(Ordering::Acquire)
    }

    /// Frames presented.
    #[must_use]
    pub fn frames_finished(&self) -> u64 {
        self.frames_finished.load(Ordering::Acquire)
    }

    /// The last area set.
    #[must_use]
    pub fn render_area(&self) -> Aabr {
        *self.area.lock()
    }

    /// Returns true if some thread has the context bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.owner.lock().is_some()
    }
}

impl GraphicsContext for HeadlessContext {
    fn make_current(&self) -> RenderResult<()> {
        if self.refuse_bind.load(Ordering::Acquire) {
            return Err(RenderError::ContextNotCurrent(self.window));
        }
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        match *owner {
            Some(holder) if holder != me => Err(RenderError::ContextNotCurrent(self.window)),
            _ => {
                *owner = Some(me);
                Ok(())
            }
        }
    }

    fn done_current(&self) {
        let mut owner = self.owner.lock();
        if *owner == Some(thread::current().id()) {
            *owner = None;
        }
    }

    fn is_current(&self) -> bool {
        !self.detached.load(Ordering::Acquire)
            && *self.owner.lock() == Some(thread::current().id())
    }

    fn set_render_area(&self, area: Aabr) {
        *self.area.lock() = area;
    }

    fn begin_frame(&self) {
        self.frames_begun.fetch_add(1, Ordering::AcqRel);
    }

    fn finish_frame(&self) {
        self.frames_finished.fetch_add(1, Ordering::AcqRel);
    }
}

type DrawHook = Box<dyn Fn(WindowId) -> RenderResult<()> + Send + Sync>;

/// A window that draws nothing and counts how often it was asked to.
pub struct HeadlessWindow {
    id: WindowId,
    context: HeadlessContext,
    area: Mutex<Aabr>,
    draws: AtomicU64,
    hook: Option<DrawHook>,
}

impl HeadlessWindow {
    /// Creates a window covering `area`.
    #[must_use]
    pub fn new(id: WindowId, area: Aabr) -> Self {
        Self {
            id,
            context: HeadlessContext::new(id),
            area: Mutex::new(area),
            draws: AtomicU64::new(0),
            hook: None,
        }
    }

    /// Runs `hook` on every draw; its result becomes the draw result.
    #[must_use]
    pub fn with_draw_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(WindowId) -> RenderResult<()> + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// The window's context.
    #[must_use]
    pub const fn context(&self) -> &HeadlessContext {
        &self.context
    }

    /// Resizes the window.
    pub fn set_render_area(&self, area: Aabr) {
        *self.area.lock() = area;
    }

    /// Number of `draw` calls.
    #[must_use]
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Acquire)
    }
}

impl Window for HeadlessWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn graphics_context(&self) -> &dyn GraphicsContext {
        &self.context
    }

    fn render_area(&self) -> Aabr {
        *self.area.lock()
    }

    fn draw(&self) -> RenderResult<()> {
        self.draws.fetch_add(1, Ordering::AcqRel);
        match &self.hook {
            Some(hook) => hook(self.id),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for HeadlessWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessWindow")
            .field("id", &self.id)
            .field("draws", &self.draws())
            .finish_non_exhaustive()
    }
}
