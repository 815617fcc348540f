//! Monotonic time types used throughout the runtime.
//!
//! Every timeout and scheduling decision in this crate is expressed in terms
//! of [`Instant`] and [`Duration`] re-exported here. Wall-clock time is never
//! consulted: a device rebooting its RTC mid-flight must not perturb any
//! in-flight timeout.

use std::ops::{Add, Sub};
use std::time::Duration as StdDuration;

/// A monotonic instant, millisecond resolution or better.
///
/// This is a thin wrapper around [`std::time::Instant`] rather than a
/// re-export so call sites read `time::Instant`/`time::Duration` the same
/// way on every platform, including ones where `std::time::Instant` is
/// backed by something other than the OS monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(std::time::Instant);

pub type Duration = StdDuration;

impl Instant {
    /// Returns the current monotonic instant.
    pub fn now() -> Instant {
        Instant(std::time::Instant::now())
    }

    /// Saturating duration since an earlier instant.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    /// The instant `duration` in the future, saturating at the representable
    /// maximum rather than panicking.
    pub fn checked_add(&self, duration: Duration) -> Option<Instant> {
        self.0.checked_add(duration).map(Instant)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0 + rhs)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0 - rhs)
    }
}

/// Returns whichever of two optional future deadlines is sooner.
///
/// Used by [`crate::action::ActionProcessor::tick`] to fold each action's
/// requested `Delay` into a single next wake-up time.
pub fn min_future(current: Instant, candidate: Instant) -> Instant {
    std::cmp::min(current, candidate)
}

/// A modular index over a power-of-two ring, used by the safe-stream chunk
/// bookkeeping ([`crate::safe_stream::SendingChunkList`]).
///
/// Arithmetic wraps at `ring_size`; `ring_size` must be a power of two so the
/// wrap is a mask rather than a division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingIndex {
    value: u32,
    mask: u32,
}

impl RingIndex {
    /// Creates a new index. `ring_size` must be a power of two; `value` is
    /// taken modulo `ring_size`.
    pub fn new(value: u32, ring_size: u32) -> RingIndex {
        assert!(ring_size.is_power_of_two(), "ring size must be a power of two");
        RingIndex {
            value: value & (ring_size - 1),
            mask: ring_size - 1,
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Distance travelling forward from `self` to `other`, always in
    /// `[0, ring_size)`. This is what makes ring order well defined relative
    /// to a chosen `begin` reference.
    pub fn forward_distance(&self, other: RingIndex) -> u32 {
        debug_assert_eq!(self.mask, other.mask, "indices from different rings");
        other.value.wrapping_sub(self.value) & self.mask
    }

    pub fn add(&self, delta: u32) -> RingIndex {
        RingIndex {
            value: self.value.wrapping_add(delta) & self.mask,
            mask: self.mask,
        }
    }

    /// Ordering of `self` and `other` relative to a `begin` reference point:
    /// whichever has the smaller forward distance from `begin` is "earlier".
    pub fn cmp_from(&self, other: RingIndex, begin: RingIndex) -> std::cmp::Ordering {
        begin.forward_distance(*self).cmp(&begin.forward_distance(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_ring_size() {
        let idx = RingIndex::new(17, 8);
        assert_eq!(idx.value(), 1);
    }

    #[test]
    fn forward_distance_wraps() {
        let ring = 16;
        let a = RingIndex::new(14, ring);
        let b = RingIndex::new(2, ring);
        assert_eq!(a.forward_distance(b), 4);
    }

    #[test]
    fn cmp_from_orders_relative_to_begin() {
        let ring = 16;
        let begin = RingIndex::new(12, ring);
        let a = RingIndex::new(14, ring);
        let b = RingIndex::new(2, ring);
        assert_eq!(a.cmp_from(b, begin), std::cmp::Ordering::Less);
    }
}
