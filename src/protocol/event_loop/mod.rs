//! Mailbox wait with timeout processing, for stacks running the timers from
//! an async task.
//!
//! [`CoreLock`] is the shared form of the engine: an embassy-sync blocking
//! mutex around the [`Timers`] plus a wake signal. Any task may arm or cancel
//! timeouts through [`CoreLock::lock`]; when that shortens the sleep the
//! stack task is honoring, the signal is raised and [`CoreLock::fetch`]
//! recomputes its budget.
//!
//! `fetch` waits on three things at once: the next mailbox message, the
//! delay until the soonest timeout, and the wake signal. Timeouts are fired
//! with the lock held; the message is returned as soon as it arrives.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::core::SleepBudget;
use crate::error::TimerError;
use crate::protocol::timers::Timers;
use crate::protocol::traits::clock::{Clock, Delay};
use crate::protocol::traits::scheduler::TimerHooks;

/// Timer engine guarded for use from several tasks.
pub struct CoreLock<M: RawMutex, C: Clock, K, A, const N: usize> {
    timers: Mutex<M, RefCell<Timers<C, K, A, N>>>,
    wake: Signal<M, ()>,
}

impl<M, C, K, A, const N: usize> CoreLock<M, C, K, A, N>
where
    M: RawMutex,
    C: Clock,
    K: Copy + PartialEq,
    A: Copy + PartialEq,
{
    pub const fn new(timers: Timers<C, K, A, N>) -> Self {
        Self {
            timers: Mutex::new(RefCell::new(timers)),
            wake: Signal::new(),
        }
    }

    /// Run `f` with the core lock held.
    ///
    /// Must not be re-entered from inside `f`.
    pub fn lock<R>(&self, f: impl FnOnce(&mut Timers<C, K, A, N>) -> R) -> R {
        let (result, wake) = self.timers.lock(|cell| {
            let mut timers = cell.borrow_mut();
            let result = f(&mut timers);
            (result, timers.take_wake_request())
        });
        if wake {
            #[cfg(feature = "defmt")]
            defmt::trace!("early wake requested");
            self.wake.signal(());
        }
        result
    }

    /// Signal raised when the honored sleep became too long.
    pub fn wake_signal(&self) -> &Signal<M, ()> {
        &self.wake
    }

    /// Polled mode: fire whatever is due right now.
    pub fn poll_timeouts<H: TimerHooks<K, A>>(&self, hooks: &mut H) -> Result<usize, TimerError> {
        self.lock(|timers| timers.check_timeouts(hooks))
    }

    /// Wait for the next mailbox message, firing timeouts while waiting.
    ///
    /// Returns early with the first error a drain reports; the mailbox is not
    /// touched in that case.
    pub async fn fetch<H, T, D, const CAP: usize>(
        &self,
        hooks: &mut H,
        mailbox: &Channel<M, T, CAP>,
        delay: &mut D,
    ) -> Result<T, TimerError>
    where
        H: TimerHooks<K, A>,
        D: Delay,
    {
        loop {
            self.wake.reset();
            let budget = self.lock(|timers| timers.sleep_budget());

            match budget {
                SleepBudget::Millis(0) => {
                    self.fire_due(hooks)?;
                }
                SleepBudget::Infinite => {
                    let recv = mailbox.receive();
                    let woken = self.wake.wait();
                    pin_mut!(recv);
                    pin_mut!(woken);

                    match select(recv, woken).await {
                        Either::Left((message, _)) => {
                            self.lock(|timers| timers.end_wait());
                            return Ok(message);
                        }
                        Either::Right(_) => {
                            #[cfg(feature = "defmt")]
                            defmt::trace!("woken from infinite wait");
                        }
                    }
                }
                SleepBudget::Millis(millis) => {
                    let recv = mailbox.receive();
                    let sleep = delay.delay_ms(millis);
                    let woken = self.wake.wait();
                    pin_mut!(recv);
                    pin_mut!(sleep);
                    pin_mut!(woken);

                    match select(recv, select(sleep, woken)).await {
                        Either::Left((message, _)) => {
                            self.lock(|timers| timers.end_wait());
                            return Ok(message);
                        }
                        Either::Right((Either::Left(_), _)) => {
                            self.fire_due(hooks)?;
                        }
                        Either::Right((Either::Right(_), _)) => {
                            #[cfg(feature = "defmt")]
                            defmt::trace!("woken before {} ms elapsed", millis);
                        }
                    }
                }
            }
        }
    }

    fn fire_due<H: TimerHooks<K, A>>(&self, hooks: &mut H) -> Result<usize, TimerError> {
        self.lock(|timers| {
            timers.end_wait();
            timers.check_timeouts(hooks)
        })
    }
}
