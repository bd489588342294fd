//! # Trellis
//!
//! The concurrency spine of a UI toolkit built around a property graph.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           TOOLKIT                            │
//! ├──────────────┬──────────────────┬──────────────┬─────────────┤
//! │  UI thread   │   EVENT thread   │ RENDER thread│ timer pool  │
//! │  (caller)    │   Scheduler      │ RenderManager│ TimerPool   │
//! │  batches ──────> PropertyGraph  │ dirty windows│ tokio fibers│
//! │  synchronize <── change-sets    │              │             │
//! │  bindings ──────────────────────> redraw       │             │
//! ├──────────────┴──────────────────┴──────────────┴─────────────┤
//! │  ThreadKindRegistry  │  SharedClock  │  TrellisConfig (TOML) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. **Explicit lifetime** - nothing starts before [`Toolkit::init`] and
//!    everything stops in [`Toolkit::shutdown`].
//! 2. **One clock** - every timestamp in a toolkit comes from its clock.
//! 3. **Singletons are enforced** - one UI, one EVENT and one RENDER thread
//!    per registry.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis::{Aabr, HeadlessWindow, Toolkit, TrellisConfig, Window, WindowId};
//!
//! let toolkit = Toolkit::init(TrellisConfig::default())?;
//! let width = toolkit.allocate_id();
//! let window: Arc<dyn Window> =
//!     Arc::new(HeadlessWindow::new(WindowId::new(1), Aabr::from_size(640.0, 480.0)));
//! toolkit.bind_window(window, [width]);
//!
//! toolkit.schedule(toolkit.batch().create(width, 640.0_f64).build())?;
//! toolkit.synchronize()?;
//! toolkit.shutdown();
//! # Ok::<(), trellis::ToolkitError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod binding;
pub mod config;
pub mod error;
pub mod toolkit;

pub use binding::WindowBindings;
pub use config::TrellisConfig;
pub use error::{ToolkitError, ToolkitResult};
pub use toolkit::Toolkit;

pub use trellis_core::{
    Aabr, Batch, BatchBuilder, ChangeSet, Clock, Color, CoreError, Expression, Inputs,
    ManualClock, MonotonicClock, PropertyGraph, PropertyId, PropertyValue, SharedClock,
    ThreadKind, ThreadKindRegistry, Timestamp, ValueKind, Vec2,
};
pub use trellis_render::{
    GraphicsContext, HeadlessContext, HeadlessWindow, RenderConfig, RenderError, RenderManager,
    Window, WindowId,
};
pub use trellis_sched::{
    Repeat, SchedError, Scheduler, SchedulerConfig, Timer, TimerHandle, TimerPool,
    TimerPoolConfig,
};
