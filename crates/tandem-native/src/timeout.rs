// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Native timeout encodings.
//!
//! Two shapes, as toolkits usually offer both: an integer millisecond count
//! where any negative value blocks forever, and a deadline.

use std::time::{Duration, Instant};

/// Milliseconds. Negative means "block forever", zero means "don't block".
pub type Msecs = i64;

/// The canonical "block forever" millisecond value.
pub const FOREVER: Msecs = -1;

/// Absolute point in time a wait gives up at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Forever,
    At(Instant),
}

impl Deadline {
    /// Deadline `msecs` from now. Negative → `Forever`.
    pub fn from_msecs(msecs: Msecs) -> Self {
        if msecs < 0 {
            return Deadline::Forever;
        }
        Self::after(Duration::from_millis(msecs as u64))
    }

    /// Deadline `duration` from now. Saturates to `Forever` on overflow.
    pub fn after(duration: Duration) -> Self {
        match Instant::now().checked_add(duration) {
            Some(at) => Deadline::At(at),
            None => Deadline::Forever,
        }
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, Deadline::Forever)
    }

    /// Time left before the deadline. `None` for `Forever`.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Forever => None,
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    pub fn has_expired(&self) -> bool {
        match self {
            Deadline::Forever => false,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }
}
