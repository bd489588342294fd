//! # Monotonic Clock
//!
//! The single source of every timestamp in a toolkit instance. Timestamps are
//! nanoseconds since the clock's origin, so values from one clock compare
//! across threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::sync::Mutex;

/// Nanoseconds since the origin of the clock that produced it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from raw nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the raw nanoseconds.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns `self + d`, saturating at the maximum timestamp.
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Returns the time elapsed from `earlier` to `self` (zero if `earlier` is later).
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Callback run when a clock jumps. Returning false unregisters it.
pub type ClockWaker = Box<dyn Fn() -> bool + Send + Sync>;

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Current reading. Never decreases.
    fn now(&self) -> Timestamp;

    /// Time elapsed since `t` (zero if `t` is in the future).
    fn duration_since(&self, t: Timestamp) -> Duration {
        self.now().saturating_duration_since(t)
    }

    /// Registers `waker` to run whenever the clock moves by anything other
    /// than the passage of real time. Deadline waiters use it to re-check.
    ///
    /// Clocks that follow real time never jump and drop the waker.
    fn on_jump(&self, waker: ClockWaker) {
        drop(waker);
    }
}

/// Shared handle to the toolkit's clock.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-time monotonic clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Creates a shared clock.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        Timestamp(nanos)
    }
}

/// Clock that only moves when told to. Used for deterministic tests.
///
/// Every move runs the wakers registered through [`Clock::on_jump`].
#[derive(Default)]
pub struct ManualClock {
    nanos: AtomicU64,
    wakers: Mutex<Vec<ClockWaker>>,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos()),
            wakers: Mutex::new(Vec::new()),
        }
    }

    /// Moves the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::AcqRel);
        self.wake();
    }

    /// Jumps to `t`. Earlier values are ignored, the clock stays monotonic.
    pub fn set(&self, t: Timestamp) {
        self.nanos.fetch_max(t.as_nanos(), Ordering::AcqRel);
        self.wake();
    }

    fn wake(&self) {
        self.wakers.lock().retain(|waker| waker());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.nanos.load(Ordering::Acquire))
    }

    fn on_jump(&self, waker: ClockWaker) {
        self.wakers.lock().push(waker);
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now())
            .field("wakers", &self.wakers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_never_decreases() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new(Timestamp::from_millis(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Timestamp::from_millis(15));

        // Going backwards is ignored.
        clock.set(Timestamp::from_millis(1));
        assert_eq!(clock.now(), Timestamp::from_millis(15));

        assert_eq!(
            clock.duration_since(Timestamp::from_millis(5)),
            Duration::from_millis(10)
        );
        assert_eq!(
            clock.duration_since(Timestamp::from_millis(50)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_manual_clock_runs_wakers_until_they_retire() {
        let clock = ManualClock::new(Timestamp::ZERO);
        let hits = Arc::new(AtomicU64::new(0));
        let counted = Arc::clone(&hits);
        clock.on_jump(Box::new(move || counted.fetch_add(1, Ordering::SeqCst) < 1));

        clock.advance(Duration::from_secs(1));
        clock.set(Timestamp::from_millis(5_000));
        clock.advance(Duration::from_secs(1));
        assert_eq!(hits.load(Ordering::SeqCst), 2, "retired after returning false");

        // Real-time clocks never jump.
        MonotonicClock::new().on_jump(Box::new(|| panic!("never called")));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(1).saturating_add(Duration::from_micros(500));
        assert_eq!(t.as_nanos(), 1_500_000);
        assert_eq!(
            Timestamp::from_nanos(u64::MAX).saturating_add(Duration::from_secs(1)),
            Timestamp::from_nanos(u64::MAX)
        );
    }
}
