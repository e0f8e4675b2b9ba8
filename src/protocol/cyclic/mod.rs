//! Registry of recurring ("cyclic") stack timers: ARP, DHCP, reassembly,
//! neighbour discovery and friends.
//!
//! Each entry is kept alive by a one-shot timeout that re-arms itself after
//! every firing. The registry only holds the per-entry status and decides what
//! a firing leads to; the engine owns the timeout list and applies the
//! decision. Status transitions:
//!
//! ```text
//! Idle --enable--> Running --disable--> Stopping --next firing--> Idle
//!                     ^                    |
//!                     +------enable--------+
//! ```
//!
//! The two TCP entries are armed on demand by the adaptive TCP timers and
//! cannot be toggled here.
use crate::core::is_before;
use crate::error::TimerError;
use crate::protocol::tcp_timers::{TCP_FAST_INTERVAL_MS, TCP_SLOW_INTERVAL_MS};

//==================================================================================Constants
/// Largest table the registry can track.
pub const MAX_CYCLIC_TIMERS: usize = 16;

pub const IP_REASS_INTERVAL_MS: u32 = 1_000;
pub const ARP_INTERVAL_MS: u32 = 1_000;
pub const DHCP_COARSE_INTERVAL_MS: u32 = 60_000;
pub const DHCP_FINE_INTERVAL_MS: u32 = 500;
pub const AUTOIP_INTERVAL_MS: u32 = 100;
pub const IGMP_INTERVAL_MS: u32 = 100;
pub const DNS_INTERVAL_MS: u32 = 1_000;
pub const ND6_INTERVAL_MS: u32 = 1_000;
pub const IP6_REASS_INTERVAL_MS: u32 = 1_000;
pub const MLD6_INTERVAL_MS: u32 = 100;
pub const DHCP6_INTERVAL_MS: u32 = 500;

//==================================================================================Enums and Structs
/// Identity of a cyclic timer handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CyclicTimer {
    TcpSlow,
    TcpFast,
    Ip4Reassembly,
    Arp,
    DhcpCoarse,
    DhcpFine,
    AutoIp,
    Igmp,
    Dns,
    Nd6,
    Ip6Reassembly,
    Mld6,
    Dhcp6,
    /// Application-defined entry of a custom table.
    Custom(u16),
}

/// Lifecycle of one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CyclicStatus {
    /// Not armed.
    Idle,
    /// Armed; the handler runs on every firing.
    Running,
    /// Disabled while armed; the next firing retires it.
    Stopping,
}

/// How an entry starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Armed by [`crate::protocol::timers::Timers::init`].
    Running,
    /// Left idle until enabled.
    Idle,
    /// Armed by the TCP layer through the adaptive TCP timers.
    OnDemand,
}

/// Immutable description of a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicTimerSpec {
    pub timer: CyclicTimer,
    pub interval_ms: u32,
    pub activation: Activation,
}

impl CyclicTimerSpec {
    pub const fn new(timer: CyclicTimer, interval_ms: u32, activation: Activation) -> Self {
        Self {
            timer,
            interval_ms,
            activation,
        }
    }
}

/// Stack-internal timers of a dual-stack build.
pub const DEFAULT_CYCLIC_TIMERS: &[CyclicTimerSpec] = &[
    CyclicTimerSpec::new(CyclicTimer::TcpSlow, TCP_SLOW_INTERVAL_MS, Activation::OnDemand),
    CyclicTimerSpec::new(CyclicTimer::TcpFast, TCP_FAST_INTERVAL_MS, Activation::OnDemand),
    CyclicTimerSpec::new(CyclicTimer::Ip4Reassembly, IP_REASS_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::Arp, ARP_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::DhcpCoarse, DHCP_COARSE_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::DhcpFine, DHCP_FINE_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::AutoIp, AUTOIP_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::Igmp, IGMP_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::Dns, DNS_INTERVAL_MS, Activation::Running),
    CyclicTimerSpec::new(CyclicTimer::Nd6, ND6_INTERVAL_MS, Activation::Idle),
    CyclicTimerSpec::new(CyclicTimer::Ip6Reassembly, IP6_REASS_INTERVAL_MS, Activation::Idle),
    CyclicTimerSpec::new(CyclicTimer::Mld6, MLD6_INTERVAL_MS, Activation::Idle),
    CyclicTimerSpec::new(CyclicTimer::Dhcp6, DHCP6_INTERVAL_MS, Activation::Idle),
];

const _: () = assert!(DEFAULT_CYCLIC_TIMERS.len() <= MAX_CYCLIC_TIMERS);

/// Which rule produced the next due time of a cyclic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RearmPath {
    /// `last_due + interval`: handler latency and wake jitter absorbed.
    DriftCorrected,
    /// `now + interval`: the corrected time had already passed.
    Overload,
}

/// What a firing leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclicStep {
    /// Arm the next instance at `due`.
    Rearm { due: u32, path: RearmPath },
    /// Do not re-arm; the entry is idle now.
    Retire,
}

/// Result of an enable/disable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    /// The entry left `Idle`: arm a first instance `interval_ms` from now.
    Arm { interval_ms: u32 },
    /// Nothing to arm (already pending, or just flagged for stopping).
    Unchanged,
}

//==================================================================================Rearm rule
/// Next due time of a cyclic timer that was due at `last_due` and finished
/// running at `now`.
pub fn next_cyclic_due(last_due: u32, interval_ms: u32, now: u32) -> (u32, RearmPath) {
    let corrected = last_due.wrapping_add(interval_ms);
    if is_before(corrected, now) {
        (now.wrapping_add(interval_ms), RearmPath::Overload)
    } else {
        (corrected, RearmPath::DriftCorrected)
    }
}

//==================================================================================Registry
/// Mutable status for every entry of a static table.
#[derive(Debug, Clone)]
pub struct CyclicRegistry {
    table: &'static [CyclicTimerSpec],
    status: [CyclicStatus; MAX_CYCLIC_TIMERS],
}

impl Default for CyclicRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CyclicRegistry {
    /// Registry over [`DEFAULT_CYCLIC_TIMERS`].
    pub const fn standard() -> Self {
        Self::build(DEFAULT_CYCLIC_TIMERS)
    }

    /// Registry over a custom table.
    pub fn new(table: &'static [CyclicTimerSpec]) -> Result<Self, TimerError> {
        if table.len() > MAX_CYCLIC_TIMERS {
            return Err(TimerError::RegistryFull {
                capacity: MAX_CYCLIC_TIMERS,
            });
        }
        Ok(Self::build(table))
    }

    const fn build(table: &'static [CyclicTimerSpec]) -> Self {
        let mut status = [CyclicStatus::Idle; MAX_CYCLIC_TIMERS];
        let mut i = 0;
        while i < table.len() && i < MAX_CYCLIC_TIMERS {
            if let Activation::Running = table[i].activation {
                status[i] = CyclicStatus::Running;
            }
            i += 1;
        }
        Self { table, status }
    }

    pub fn table(&self) -> &'static [CyclicTimerSpec] {
        self.table
    }

    fn index_of(&self, timer: CyclicTimer) -> Option<usize> {
        self.table.iter().position(|spec| spec.timer == timer)
    }

    pub fn spec(&self, timer: CyclicTimer) -> Option<&'static CyclicTimerSpec> {
        let table = self.table;
        table.iter().find(|spec| spec.timer == timer)
    }

    pub fn status(&self, timer: CyclicTimer) -> Option<CyclicStatus> {
        self.index_of(timer).map(|idx| self.status[idx])
    }

    /// Entries to arm at start-up.
    pub fn startup(&self) -> impl Iterator<Item = CyclicTimerSpec> + '_ {
        self.table
            .iter()
            .zip(self.status.iter())
            .filter(|(spec, status)| {
                spec.activation != Activation::OnDemand && **status == CyclicStatus::Running
            })
            .map(|(spec, _)| *spec)
    }

    /// Whether a firing of `timer` must run its handler.
    pub fn should_invoke(&self, timer: CyclicTimer) -> bool {
        self.status(timer) == Some(CyclicStatus::Running)
    }

    /// Decide what happens once `timer`, due at `last_due`, has run.
    ///
    /// The status is read here rather than before the handler ran, since the
    /// handler may have toggled its own entry.
    pub fn after_fire(&mut self, timer: CyclicTimer, last_due: u32, now: u32) -> CyclicStep {
        let Some(idx) = self.index_of(timer) else {
            return CyclicStep::Retire;
        };
        match self.status[idx] {
            CyclicStatus::Running => {
                let (due, path) = next_cyclic_due(last_due, self.table[idx].interval_ms, now);
                CyclicStep::Rearm { due, path }
            }
            CyclicStatus::Stopping => {
                self.status[idx] = CyclicStatus::Idle;
                #[cfg(feature = "defmt")]
                defmt::debug!("cyclic timer {} stopped", timer);
                CyclicStep::Retire
            }
            CyclicStatus::Idle => CyclicStep::Retire,
        }
    }

    /// Apply an enable/disable request.
    pub fn set_enabled(
        &mut self,
        timer: CyclicTimer,
        enabled: bool,
    ) -> Result<EnableOutcome, TimerError> {
        let idx = self
            .index_of(timer)
            .ok_or(TimerError::UnknownCyclicTimer)?;
        let spec = self.table[idx];
        if spec.activation == Activation::OnDemand {
            return Err(TimerError::OnDemandTimer);
        }

        let current = self.status[idx];
        let (next, outcome) = match (current, enabled) {
            (CyclicStatus::Running, false) => (CyclicStatus::Stopping, EnableOutcome::Unchanged),
            (CyclicStatus::Idle, true) => (
                CyclicStatus::Running,
                EnableOutcome::Arm {
                    interval_ms: spec.interval_ms,
                },
            ),
            // The instance still pending keeps serving the entry.
            (CyclicStatus::Stopping, true) => (CyclicStatus::Running, EnableOutcome::Unchanged),
            (status, _) => (status, EnableOutcome::Unchanged),
        };
        self.status[idx] = next;

        #[cfg(feature = "defmt")]
        defmt::debug!("cyclic timer {}: {} -> {}", timer, current, next);

        Ok(outcome)
    }

    /// Undo an `Idle -> Running` transition whose first instance could not be armed.
    pub(crate) fn revert_enable(&mut self, timer: CyclicTimer) {
        if let Some(idx) = self.index_of(timer) {
            self.status[idx] = CyclicStatus::Idle;
        }
    }
}
