//! Abstraction traits used by the engine: time sources, the scheduler seam
//! handed to timeout handlers, and the read-only TCP connection view.
pub mod clock;
pub mod scheduler;
pub mod tcp_view;
