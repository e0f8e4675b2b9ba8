//! Time sources: the wrapping millisecond counter every deadline is measured
//! against, and the asynchronous wait the mailbox loop sleeps on.
use core::future::Future;

/// Millisecond counter abstraction (the `sys_now()` seam of the stack).
pub trait Clock {
    /// Current value of the free-running counter; wraps at `u32::MAX`.
    fn now_ms(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Asynchronous delay. Dropping the future mid-wait must be harmless: the
/// mailbox loop abandons it whenever a message or an early wake arrives.
pub trait Delay {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl Future<Output = ()> + 'a;
}

/// [`Clock`] reading the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap the rest of the crate expects.
        embassy_time::Instant::now().as_millis() as u32
    }
}

/// [`Delay`] built on `embassy_time::Timer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyDelay;

impl Delay for EmbassyDelay {
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl Future<Output = ()> + 'a {
        embassy_time::Timer::after_millis(u64::from(millis))
    }
}
