//! Error definitions shared across library modules.
//! Timer scheduling can only fail for two reasons: the node pool is full, or
//! the caller broke a contract (delay too long, unknown registry entry).
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors surfaced by the timeout list, the cyclic registry and the engine.
pub enum TimerError {
    /// Every node of the fixed pool is already holding a pending timeout.
    #[error("Timeout pool exhausted ({capacity} slots in use)")]
    PoolExhausted { capacity: usize },

    /// Relative delay beyond a quarter of the 32-bit counter space.
    #[error("Timeout too long: {requested} ms, max is {max} ms")]
    TimeoutTooLong { requested: u32, max: u32 },

    /// The cyclic timer is not part of the registry table.
    #[error("Unknown cyclic timer")]
    UnknownCyclicTimer,

    /// TCP housekeeping timers are armed by the TCP layer, not toggled.
    #[error("Cyclic timer is started on demand")]
    OnDemandTimer,

    /// The cyclic table has more entries than the registry can track.
    #[error("Cyclic timer table too large (capacity {capacity})")]
    RegistryFull { capacity: usize },
}
