//! Primitives shared by every timer in the crate: the wrapping 32-bit
//! millisecond counter and the sleep budget handed to the event loop.
//!
//! All due times are absolute values of a free-running `u32` millisecond
//! counter that wraps roughly every 49.7 days. Two instants are compared by
//! looking at their unsigned difference: a difference larger than half of the
//! counter space means the first instant lies in the past of the second.
//! Relative delays are capped at a quarter of the space so that a pending
//! deadline can never drift into the ambiguous half.

/// Largest unsigned distance still read as "not earlier".
pub const MAX_TIMEOUT_SPAN: u32 = 0x7fff_ffff;

/// Longest relative delay the scheduler accepts, in milliseconds.
pub const MAX_TIMEOUT_MS: u32 = u32::MAX / 4;

/// `true` when `t` is strictly earlier than `reference`, across wraparound.
#[inline]
pub const fn is_before(t: u32, reference: u32) -> bool {
    t.wrapping_sub(reference) > MAX_TIMEOUT_SPAN
}

/// `true` when `t` is strictly later than `reference`, across wraparound.
#[inline]
pub const fn is_after(t: u32, reference: u32) -> bool {
    is_before(reference, t)
}

/// Milliseconds left until `due`, saturated to zero once `due` has passed.
#[inline]
pub const fn remaining_ms(due: u32, now: u32) -> u32 {
    if is_before(due, now) {
        0
    } else {
        due.wrapping_sub(now)
    }
}

/// How long the event loop may block before the next timeout is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepBudget {
    /// No timeout is pending: block until a message arrives.
    Infinite,
    /// Block at most this many milliseconds (zero means "fire now").
    Millis(u32),
}

impl SleepBudget {
    /// Sentinel used when the budget must travel as a raw `u32`.
    pub const INFINITE_MS: u32 = u32::MAX;

    /// Raw millisecond view, [`Self::INFINITE_MS`] for an empty list.
    #[inline]
    pub const fn as_millis(self) -> u32 {
        match self {
            SleepBudget::Infinite => Self::INFINITE_MS,
            SleepBudget::Millis(ms) => ms,
        }
    }

    /// `true` when no timeout is pending.
    #[inline]
    pub const fn is_infinite(self) -> bool {
        matches!(self, SleepBudget::Infinite)
    }
}
