//! Read-only view of the TCP connection lists.
//!
//! The TCP layer owns its connections; the adaptive TCP timers only need a
//! handful of per-connection stamps and flags to predict the next moment any
//! connection needs attention. [`ConnectionTimers`] is that snapshot, and
//! [`TcpConnections`] hands out fresh snapshots every time a prediction runs,
//! so nothing is cached across calls.

/// TCP connection states, as seen by the timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// Timer-relevant state of one connection.
///
/// Every `*_tick` field is a value of the TCP tick counter (one tick per slow
/// interval) stamped by the TCP layer when the corresponding timer started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimers {
    pub state: TcpState,
    /// Unacknowledged segments are in flight (retransmission timer running).
    pub has_unacked: bool,
    /// Tick at which the retransmission timer was (re)started.
    pub retransmit_tick: u32,
    /// Retransmission timeout, in ticks.
    pub rto_ticks: u32,
    /// Zero-window probe backoff step; `0` when the persist timer is off.
    pub persist_backoff: u8,
    /// Tick of the last zero-window probe.
    pub persist_tick: u32,
    /// Tick at which FIN-WAIT-1 was entered.
    pub fin_wait1_tick: u32,
    /// Tick of the last activity (the generic per-connection timer).
    pub activity_tick: u32,
    /// The local side has also closed its receive half.
    pub rx_closed: bool,
    /// The out-of-order queue holds segments.
    pub has_ooseq: bool,
    /// An ACK is being delayed.
    pub ack_delay: bool,
    /// A close was requested while data was still queued.
    pub close_pending: bool,
    /// Inbound data was refused by the application and awaits redelivery.
    pub has_refused_data: bool,
}

impl ConnectionTimers {
    /// Connection in `state` with no timer running.
    pub const fn new(state: TcpState) -> Self {
        Self {
            state,
            has_unacked: false,
            retransmit_tick: 0,
            rto_ticks: 0,
            persist_backoff: 0,
            persist_tick: 0,
            fin_wait1_tick: 0,
            activity_tick: 0,
            rx_closed: false,
            has_ooseq: false,
            ack_delay: false,
            close_pending: false,
            has_refused_data: false,
        }
    }

    /// Whether the fast timer has work for this connection.
    pub const fn needs_fast_timer(&self) -> bool {
        self.ack_delay || self.close_pending || self.has_refused_data
    }
}

/// Source of connection snapshots, implemented by the TCP layer.
pub trait TcpConnections {
    /// Connections exchanging data (every state but TIME-WAIT).
    fn active(&self) -> impl Iterator<Item = ConnectionTimers> + '_;
    /// Connections sitting out their 2×MSL quarantine.
    fn time_wait(&self) -> impl Iterator<Item = ConnectionTimers> + '_;
}

/// Stack without TCP: no connection ever needs the TCP timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConnections;

impl TcpConnections for NoConnections {
    fn active(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        core::iter::empty()
    }

    fn time_wait(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        core::iter::empty()
    }
}

/// Connection lists kept as plain slices.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionSnapshot<'a> {
    pub active: &'a [ConnectionTimers],
    pub time_wait: &'a [ConnectionTimers],
}

impl<'a> TcpConnections for ConnectionSnapshot<'a> {
    fn active(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        self.active.iter().copied()
    }

    fn time_wait(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        self.time_wait.iter().copied()
    }
}
