//! Timer machinery of the stack: the engine and its registry of recurring
//! timers, the adaptive TCP timers, the mailbox loop, the traits the
//! embedding stack implements, and the PAP state machines built on top.
pub mod cyclic;
pub mod event_loop;
pub mod pap;
pub mod tcp_timers;
pub mod timers;
pub mod traits;
