//! # Property Identifiers
//!
//! A property id is split into two parts:
//! - A 64-bit serial drawn from a monotonically increasing generator
//! - A 32-bit generation counter, bumped when a serial is recycled, so a
//!   handle kept across a delete is detected as stale

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to a property node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId {
    serial: u64,
    generation: u32,
}

impl PropertyId {
    const INVALID_SERIAL: u64 = u64::MAX;

    /// Creates an id from its parts.
    #[inline]
    #[must_use]
    pub const fn new(serial: u64, generation: u32) -> Self {
        Self { serial, generation }
    }

    /// The invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            serial: Self::INVALID_SERIAL,
            generation: 0,
        }
    }

    /// Checks if this is the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.serial == Self::INVALID_SERIAL
    }

    /// The serial portion.
    #[inline]
    #[must_use]
    pub const fn serial(self) -> u64 {
        self.serial
    }

    /// The generation portion.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// The same serial, one generation later.
    #[inline]
    #[must_use]
    pub const fn next_generation(self) -> Self {
        Self {
            serial: self.serial,
            generation: self.generation.wrapping_add(1),
        }
    }
}

impl Default for PropertyId {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            f.write_str("#invalid")
        } else {
            write!(f, "#{}v{}", self.serial, self.generation)
        }
    }
}

/// Thread-safe generator of fresh property ids.
#[derive(Debug)]
pub struct PropertyIdAllocator {
    next: AtomicU64,
}

impl PropertyIdAllocator {
    /// Creates an allocator whose first serial is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a never-before-seen id at generation 0.
    pub fn allocate(&self) -> PropertyId {
        let serial = self.next.fetch_add(1, Ordering::Relaxed);
        PropertyId::new(serial, 0)
    }

    /// Returns the id to reuse `deleted`'s serial with.
    ///
    /// Old handles to `deleted` stay stale: lookups compare generations.
    #[must_use]
    pub const fn recycle(&self, deleted: PropertyId) -> PropertyId {
        deleted.next_generation()
    }
}

impl Default for PropertyIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
