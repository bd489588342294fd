//! # Trellis Demo
//!
//! Headless walkthrough of the whole spine: two windows bound to a small
//! property graph, animated by a repeating timer.
//!
//! ```bash
//! # Default configuration
//! RUST_LOG=debug cargo run --bin trellis_demo
//!
//! # From a TOML file
//! cargo run --bin trellis_demo -- trellis.toml
//! ```
//!
//! Exits with code 1 if the toolkit cannot start, including when a UI
//! thread is already registered.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use trellis::{
    Aabr, Expression, HeadlessWindow, PropertyValue, Repeat, Timer, Toolkit, ToolkitError,
    ToolkitResult, TrellisConfig, Window, WindowId,
};

const FRAMES: u32 = 5;
const TICK: Duration = Duration::from_millis(16);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                       TRELLIS DEMO v0.1.0");
    println!("                          HEADLESS MODE");
    println!("═══════════════════════════════════════════════════════════════════");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_duplicate_singleton() => {
            tracing::error!(error = %err, "another UI thread is already running");
            ExitCode::from(1)
        }
        Err(err) => {
            tracing::error!(error = %err, "demo failed");
            ExitCode::from(1)
        }
    }
}

fn load_config() -> ToolkitResult<TrellisConfig> {
    match std::env::args().nth(1) {
        Some(path) => TrellisConfig::load(path),
        None => Ok(TrellisConfig::default()),
    }
}

fn run() -> Result<(), ToolkitError> {
    let toolkit = Toolkit::init(load_config()?)?;

    let width = toolkit.allocate_id();
    let height = toolkit.allocate_id();
    let area = toolkit.allocate_id();
    let title = toolkit.allocate_id();

    let canvas = Arc::new(HeadlessWindow::new(WindowId::new(1), Aabr::from_size(640.0, 480.0)));
    let status = Arc::new(HeadlessWindow::new(WindowId::new(2), Aabr::from_size(640.0, 24.0)));
    toolkit.bind_window(canvas.clone() as Arc<dyn Window>, [width, height, area]);
    toolkit.bind_window(status.clone() as Arc<dyn Window>, [title, area]);

    let area_of = Expression::new(vec![width, height], |inputs| {
        PropertyValue::Float(inputs.float(0).unwrap_or_default() * inputs.float(1).unwrap_or_default())
    });
    toolkit.schedule(
        toolkit
            .batch()
            .create(width, 640.0_f64)
            .create(height, 480.0_f64)
            .create(area, 0.0_f64)
            .set_expression(area, area_of)
            .create(title, "trellis")
            .build(),
    )?;
    let queued = toolkit.synchronize()?;
    tracing::info!(windows = queued, "initial layout");

    // The timer only signals; batches are built on the UI thread.
    let (tick_tx, tick_rx) = crossbeam_channel::bounded(FRAMES as usize);
    let first = toolkit.now().saturating_add(TICK);
    let ticker = toolkit.submit_timer(Timer::repeating(first, TICK, Repeat::Times(FRAMES), move || {
        let _ = tick_tx.try_send(());
    }))?;

    for frame in 1..=FRAMES {
        if tick_rx.recv_timeout(Duration::from_secs(1)).is_err() {
            tracing::warn!(frame, "timer tick missed");
            break;
        }
        let grown = 640.0 + f64::from(frame) * 10.0;
        toolkit.schedule(toolkit.batch().set_value(width, grown).build())?;
        let queued = toolkit.synchronize()?;
        tracing::info!(frame, width = grown, windows = queued, "frame");
    }
    ticker.cancel();

    toolkit.schedule(toolkit.batch().set_value(title, "trellis (done)").build())?;
    toolkit.synchronize()?;
    toolkit.render().wait_idle();

    let area_value = toolkit.value(area).and_then(|value| value.as_float()).unwrap_or_default();
    let render = toolkit.render().stats();
    let sched = toolkit.scheduler().stats();
    let timers = toolkit.timers().stats();
    toolkit.shutdown();

    println!();
    println!("  area             : {area_value}");
    println!("  canvas draws     : {}", canvas.draws());
    println!("  status draws     : {}", status.draws());
    println!("  batches applied  : {}", sched.batches_applied);
    println!("  commands rejected: {}", sched.commands_rejected);
    println!("  frames drawn     : {}", render.frames_drawn);
    println!("  redraws coalesced: {}", render.coalesced);
    println!("  timer firings    : {}", timers.fired);
    Ok(())
}
