//! # Windows and Graphics Contexts
//!
//! Collaborator traits implemented by a windowing backend. All methods take
//! `&self`: implementations guard their own state so a window can be shared
//! between the UI thread and the RENDER thread.

use std::fmt;

use trellis_core::Aabr;

use crate::error::RenderResult;

/// Identifies a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    /// Creates an id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// A graphics context that can be bound to one thread at a time.
pub trait GraphicsContext: Send + Sync {
    /// Binds the context to the calling thread.
    ///
    /// Prefer [`ContextScope::acquire`], which releases it again.
    fn make_current(&self) -> RenderResult<()>;

    /// Unbinds the context from the calling thread.
    fn done_current(&self);

    /// Returns true if the context is bound to the calling thread.
    fn is_current(&self) -> bool;

    /// Sets the area subsequent frames draw into.
    fn set_render_area(&self, area: Aabr);

    /// Starts a frame.
    fn begin_frame(&self);

    /// Finishes (presents) a frame.
    fn finish_frame(&self);
}

/// A drawable window.
pub trait Window: Send + Sync {
    /// Stable identity, used to deduplicate redraw requests.
    fn id(&self) -> WindowId;

    /// The window's graphics context.
    fn graphics_context(&self) -> &dyn GraphicsContext;

    /// Area to render into.
    fn render_area(&self) -> Aabr;

    /// Draws the window's contents. Called between `begin_frame` and
    /// `finish_frame` with the context current.
    fn draw(&self) -> RenderResult<()>;

    /// Binds the window's context for the lifetime of the returned scope.
    fn make_current(&self) -> RenderResult<ContextScope<'_>> {
        ContextScope::acquire(self.graphics_context())
    }
}

/// Scoped binding of a [`GraphicsContext`]; dropping it calls
/// `done_current`.
#[must_use = "the context is released as soon as the scope is dropped"]
pub struct ContextScope<'a> {
    context: &'a dyn GraphicsContext,
}

impl<'a> ContextScope<'a> {
    /// Makes `context` current until the scope is dropped.
    ///
    /// # Errors
    ///
    /// Whatever `make_current` reports; nothing is bound in that case.
    pub fn acquire(context: &'a dyn GraphicsContext) -> RenderResult<Self> {
        context.make_current()?;
        Ok(Self { context })
    }

    /// The bound context.
    #[must_use]
    pub fn context(&self) -> &'a dyn GraphicsContext {
        self.context
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.context.done_current();
    }
}

impl fmt::Debug for ContextScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextScope")
            .field("current", &self.context.is_current())
            .finish()
    }
}
