//! `korri-timeouts` library: the timer and protocol-timeout engine of an
//! embedded TCP/IP stack, in a `no_std` environment. The crate exposes the
//! wrapping millisecond arithmetic, a pool-backed timeout list, the registry
//! of recurring stack timers, the adaptive TCP housekeeping timers and the
//! async mailbox loop that drives them.
#![cfg_attr(not(test), no_std)]
//==================================================================================
/// Wrapping 32-bit millisecond arithmetic and the sleep budget.
pub mod core;
/// Scheduling errors (pool exhaustion, contract violations).
pub mod error;
/// Fixed-capacity timeout list.
pub mod infra;
/// Timer engine, cyclic registry, TCP timers, event loop and PAP.
pub mod protocol;
//==================================================================================
pub use crate::core::{SleepBudget, MAX_TIMEOUT_MS};
pub use crate::error::TimerError;
pub use crate::protocol::timers::{Handler, Timers};
