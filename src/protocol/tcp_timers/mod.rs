//! Adaptive TCP housekeeping timers.
//!
//! The slow (coarse) and fast (fine) TCP timers only run while some
//! connection needs them. Whenever connection membership changes, or after a
//! timer fires, the controller scans the read-only connection view and
//! predicts how long the stack may stay idle before a connection deadline
//! falls due. The engine turns the resulting [`TimerAction`] into list
//! operations.
//!
//! Since the slow timer no longer ticks every interval, the TCP tick counter
//! is rebuilt from wall time instead of being incremented per tick.
use crate::protocol::traits::tcp_view::{ConnectionTimers, TcpConnections, TcpState};

//==================================================================================Constants
/// Coarse TCP timer period.
pub const TCP_SLOW_INTERVAL_MS: u32 = 500;
/// Fine TCP timer period.
pub const TCP_FAST_INTERVAL_MS: u32 = 250;
/// FIN-WAIT-1 / FIN-WAIT-2 give-up time.
pub const TCP_FIN_WAIT_TIMEOUT_MS: u32 = 20_000;
/// SYN-RECEIVED give-up time.
pub const TCP_SYN_RCVD_TIMEOUT_MS: u32 = 20_000;
/// Maximum segment lifetime.
pub const TCP_MSL_MS: u32 = 60_000;
/// Out-of-order segments are dropped after this many RTOs of inactivity.
pub const TCP_OOSEQ_TIMEOUT_RTO: u32 = 6;
/// Longest sleep a prediction may ever ask for.
pub const TCP_MAX_IDLE_MS: u32 = 675_000;
/// Zero-window probe backoff, in slow ticks per step.
pub const TCP_PERSIST_BACKOFF: [u8; 7] = [3, 6, 12, 24, 48, 96, 120];

//==================================================================================Config
/// Tunables of the adaptive TCP timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpTimerConfig {
    pub slow_interval_ms: u32,
    pub fast_interval_ms: u32,
    pub fin_wait_timeout_ms: u32,
    pub syn_rcvd_timeout_ms: u32,
    pub msl_ms: u32,
    pub ooseq_timeout_rto: u32,
    pub max_idle_ms: u32,
    pub persist_backoff: [u8; 7],
}

impl TcpTimerConfig {
    pub const DEFAULT: Self = Self {
        slow_interval_ms: TCP_SLOW_INTERVAL_MS,
        fast_interval_ms: TCP_FAST_INTERVAL_MS,
        fin_wait_timeout_ms: TCP_FIN_WAIT_TIMEOUT_MS,
        syn_rcvd_timeout_ms: TCP_SYN_RCVD_TIMEOUT_MS,
        msl_ms: TCP_MSL_MS,
        ooseq_timeout_rto: TCP_OOSEQ_TIMEOUT_RTO,
        max_idle_ms: TCP_MAX_IDLE_MS,
        persist_backoff: TCP_PERSIST_BACKOFF,
    };

    /// A fixed timeout expressed in slow ticks.
    fn ticks(&self, timeout_ms: u32) -> i64 {
        i64::from(timeout_ms / self.slow_interval_ms.max(1))
    }
}

impl Default for TcpTimerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

//==================================================================================Enums
/// Which of the two TCP timers an operation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TcpTimerKind {
    Slow,
    Fast,
}

/// What the engine must do with one TCP timer after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerAction {
    /// Drop any stale instance and arm a fresh one `delay_ms` from now.
    Arm { delay_ms: u32 },
    /// Needed and already pending.
    Keep,
    /// Not needed: drop any pending instance.
    Cancel,
}

//==================================================================================Prediction
/// Ticks left until a timer started at `start` with a length of `length`
/// ticks expires, converted to milliseconds. Negative once overdue.
fn deadline_ms(length: i64, start: u32, ticks: u32, cfg: &TcpTimerConfig) -> i64 {
    let elapsed = i64::from(ticks.wrapping_sub(start));
    (length - elapsed) * i64::from(cfg.slow_interval_ms)
}

/// Every deadline an active connection contributes, folded into `min`.
fn active_deadline(conn: &ConnectionTimers, ticks: u32, cfg: &TcpTimerConfig) -> Option<i64> {
    let mut min: Option<i64> = None;
    let mut take = |value: i64| {
        min = Some(min.map_or(value, |current| current.min(value)));
    };

    if conn.has_unacked {
        take(deadline_ms(
            i64::from(conn.rto_ticks),
            conn.retransmit_tick,
            ticks,
            cfg,
        ));
    }

    if conn.persist_backoff > 0 {
        let step = usize::from(conn.persist_backoff - 1).min(cfg.persist_backoff.len() - 1);
        take(deadline_ms(
            i64::from(cfg.persist_backoff[step]),
            conn.persist_tick,
            ticks,
            cfg,
        ));
    }

    let fin_wait = cfg.ticks(cfg.fin_wait_timeout_ms);
    match conn.state {
        TcpState::FinWait1 => take(deadline_ms(fin_wait, conn.fin_wait1_tick, ticks, cfg)),
        TcpState::FinWait2 if conn.rx_closed => {
            take(deadline_ms(fin_wait, conn.activity_tick, ticks, cfg))
        }
        TcpState::SynRcvd => take(deadline_ms(
            cfg.ticks(cfg.syn_rcvd_timeout_ms),
            conn.activity_tick,
            ticks,
            cfg,
        )),
        TcpState::LastAck => take(deadline_ms(
            2 * cfg.ticks(cfg.msl_ms),
            conn.activity_tick,
            ticks,
            cfg,
        )),
        _ => {}
    }

    #[cfg(feature = "tcp-ooseq")]
    if conn.has_ooseq {
        let retention = i64::from(conn.rto_ticks) * i64::from(cfg.ooseq_timeout_rto);
        take(deadline_ms(retention, conn.activity_tick, ticks, cfg));
    }

    min
}

/// Milliseconds until the slow timer has work, or `None` when no connection
/// carries a slow-timer deadline.
pub fn slow_timer_next_wake<T: TcpConnections>(
    conns: &T,
    ticks: u32,
    cfg: &TcpTimerConfig,
) -> Option<u32> {
    let two_msl = 2 * cfg.ticks(cfg.msl_ms);
    let active = conns
        .active()
        .filter_map(|conn| active_deadline(&conn, ticks, cfg));
    let time_wait = conns
        .time_wait()
        .map(|conn| deadline_ms(two_msl, conn.activity_tick, ticks, cfg));
    let min = active.chain(time_wait).min()?;

    let slow = i64::from(cfg.slow_interval_ms);
    let wake = if min > i64::from(cfg.max_idle_ms) {
        #[cfg(feature = "defmt")]
        defmt::warn!("tcp slow prediction {} ms above idle ceiling, clamped", min);
        slow
    } else {
        min.max(slow)
    };

    #[cfg(feature = "defmt")]
    defmt::debug!("tcp slow timer next wake in {} ms", wake);

    u32::try_from(wake).ok()
}

/// The fast interval if any active connection has fast-timer work.
pub fn fast_timer_next_wake<T: TcpConnections>(conns: &T, cfg: &TcpTimerConfig) -> Option<u32> {
    conns
        .active()
        .any(|conn| conn.needs_fast_timer())
        .then_some(cfg.fast_interval_ms)
}

//==================================================================================Controller
/// Pending flags and tick counter of the two TCP timers.
#[derive(Debug, Clone)]
pub struct TcpTimerController {
    config: TcpTimerConfig,
    slow_pending: bool,
    fast_pending: bool,
    /// Wall time of the first evaluation; anchors the tick counter.
    first_run: Option<u32>,
    ticks: u32,
}

impl Default for TcpTimerController {
    fn default() -> Self {
        Self::new(TcpTimerConfig::DEFAULT)
    }
}

impl TcpTimerController {
    pub const fn new(config: TcpTimerConfig) -> Self {
        Self {
            config,
            slow_pending: false,
            fast_pending: false,
            first_run: None,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &TcpTimerConfig {
        &self.config
    }

    /// Rebuild the tick counter from wall time and return it.
    pub fn compensate_ticks(&mut self, now: u32) -> u32 {
        match self.first_run {
            None => {
                self.first_run = Some(now);
                self.ticks = 0;
            }
            Some(start) => {
                self.ticks = now.wrapping_sub(start) / self.config.slow_interval_ms.max(1);
            }
        }
        self.ticks
    }

    /// Current value of the TCP tick counter.
    pub fn tcp_ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_pending(&self, kind: TcpTimerKind) -> bool {
        match kind {
            TcpTimerKind::Slow => self.slow_pending,
            TcpTimerKind::Fast => self.fast_pending,
        }
    }

    /// Override a pending flag, used when arming an instance failed.
    pub fn set_pending(&mut self, kind: TcpTimerKind, pending: bool) {
        match kind {
            TcpTimerKind::Slow => self.slow_pending = pending,
            TcpTimerKind::Fast => self.fast_pending = pending,
        }
    }

    /// Predicted wake delay of one timer against the current tick counter.
    pub fn next_wake<T: TcpConnections>(&self, kind: TcpTimerKind, conns: &T) -> Option<u32> {
        match kind {
            TcpTimerKind::Slow => slow_timer_next_wake(conns, self.ticks, &self.config),
            TcpTimerKind::Fast => fast_timer_next_wake(conns, &self.config),
        }
    }

    /// Evaluate one timer after a connection change.
    ///
    /// An `Arm` result already counts as pending; the engine resets the flag
    /// if arming fails.
    pub fn plan<T: TcpConnections>(&mut self, kind: TcpTimerKind, conns: &T) -> TimerAction {
        let action = match self.next_wake(kind, conns) {
            Some(_) if self.is_pending(kind) => TimerAction::Keep,
            Some(delay_ms) => {
                self.set_pending(kind, true);
                TimerAction::Arm { delay_ms }
            }
            None => {
                self.set_pending(kind, false);
                TimerAction::Cancel
            }
        };

        #[cfg(feature = "defmt")]
        defmt::debug!("tcp {} timer: {}", kind, action);

        action
    }

    /// Evaluate one timer right after its housekeeping pass ran.
    pub fn plan_after_fire<T: TcpConnections>(
        &mut self,
        kind: TcpTimerKind,
        conns: &T,
    ) -> TimerAction {
        self.set_pending(kind, false);
        self.plan(kind, conns)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
