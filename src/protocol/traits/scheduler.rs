//! Seams between the timer engine and the protocols it serves.
//!
//! [`Scheduler`] is what a timeout handler sees of the engine while it runs:
//! enough to arm and cancel its own timeouts, toggle cyclic timers and ask for
//! the TCP timers to be re-evaluated. [`TimerHooks`] is implemented by the
//! embedding stack and receives every expiry.
use crate::error::TimerError;
use crate::protocol::cyclic::CyclicTimer;
use crate::protocol::traits::tcp_view::TcpConnections;

/// Timer operations available while the core lock is held.
pub trait Scheduler<K, A> {
    /// Current value of the engine clock.
    fn now(&self) -> u32;

    /// Arm `handler(arg)` to run `delay_ms` from now.
    fn schedule_relative(&mut self, delay_ms: u32, handler: K, arg: A) -> Result<(), TimerError>;

    /// Arm `handler(arg)` for the absolute tick `due`.
    fn schedule_absolute(&mut self, due: u32, handler: K, arg: A) -> Result<(), TimerError>;

    /// Drop the first pending `handler(arg)`; `false` when none was pending.
    fn cancel(&mut self, handler: K, arg: A) -> bool;

    /// Enable or disable a cyclic timer of the registry.
    fn set_cyclic_timer_enabled(
        &mut self,
        timer: CyclicTimer,
        enabled: bool,
    ) -> Result<(), TimerError>;

    /// Re-evaluate the TCP timers once the current handler returns.
    ///
    /// Used when a handler changed connection membership and cannot hand the
    /// connection lists to the engine itself.
    fn request_tcp_timer_check(&mut self);
}

/// Callbacks into the embedding stack. All of them run with the core lock
/// held and must not block.
pub trait TimerHooks<K, A> {
    /// Connection lists consulted by the adaptive TCP timers.
    type Tcp: TcpConnections;

    /// A one-shot timeout armed through [`Scheduler::schedule_relative`] fell due.
    fn on_timeout(&mut self, timers: &mut dyn Scheduler<K, A>, handler: K, arg: A);

    /// A running cyclic timer fell due.
    fn on_cyclic(&mut self, timers: &mut dyn Scheduler<K, A>, timer: CyclicTimer);

    /// Snapshot source for TCP wake prediction.
    fn tcp_connections(&self) -> &Self::Tcp;

    /// Coarse TCP housekeeping pass (retransmission, FIN/SYN/LAST-ACK/TIME-WAIT).
    fn tcp_slow_tick(&mut self, _tcp_ticks: u32) {}

    /// Fine TCP housekeeping pass (delayed ACK, deferred close, refused data).
    fn tcp_fast_tick(&mut self, _tcp_ticks: u32) {}
}
