//! Per-packet sequence counter with 31-bit wraparound

use serde::{Deserialize, Serialize};
use std::fmt;

/// A sequence number in `[0, 2^31 - 1]` that wraps back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u32")]
pub struct Counter(u32);

impl Counter {
    /// Largest counter value before wrapping.
    pub const MAX: u32 = (1 << 31) - 1;

    pub const ZERO: Counter = Counter(0);

    /// Returns `None` for values outside the 31-bit counter space.
    pub const fn new(value: u32) -> Option<Self> {
        if value <= Self::MAX { Some(Self(value)) } else { None }
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// The counter expected after this one.
    pub const fn successor(self) -> Self {
        if self.0 == Self::MAX { Self(0) } else { Self(self.0 + 1) }
    }

    /// Whether `self` is the valid next counter after `last`.
    pub fn follows(self, last: Counter) -> bool {
        self == last.successor()
    }
}

impl TryFrom<u64> for Counter {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(Counter::new)
            .ok_or_else(|| format!("counter {value} outside 31-bit range"))
    }
}

impl From<Counter> for u32 {
    fn from(counter: Counter) -> Self {
        counter.0
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
