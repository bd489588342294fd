//! # Trellis Render
//!
//! The RENDER thread and the windows it draws.
//!
//! ## Architecture
//!
//! ```text
//!   request_redraw([w1, w2, w1]) ──> WindowDirtySet  [w1, w2]   (dedup, FIFO)
//!                                         │ ready.notify
//!                                         v
//!   RENDER thread: pop front ──> scoped make_current ──> is_current?
//!                                   │                        │ no: log, skip
//!                                   v                        v yes
//!                      done_current on every exit   set_render_area
//!                                                   begin_frame
//!                                                   window.draw()
//!                                                   finish_frame
//! ```
//!
//! The graphics backend is consumed through the [`Window`] and
//! [`GraphicsContext`] traits; [`headless`] implements them in memory.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod dirty;
pub mod error;
pub mod headless;
pub mod manager;
pub mod window;

pub use config::RenderConfig;
pub use dirty::WindowDirtySet;
pub use error::{RenderError, RenderResult};
pub use headless::{HeadlessContext, HeadlessWindow};
pub use manager::{RenderManager, RenderStats};
pub use window::{ContextScope, GraphicsContext, Window, WindowId};
