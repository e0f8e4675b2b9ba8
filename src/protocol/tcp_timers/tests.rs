//! TCP wake prediction and controller tests.
use super::*;
use crate::protocol::traits::tcp_view::{ConnectionSnapshot, NoConnections};

const CFG: TcpTimerConfig = TcpTimerConfig::DEFAULT;

fn established() -> ConnectionTimers {
    ConnectionTimers::new(TcpState::Established)
}

fn snapshot<'a>(
    active: &'a [ConnectionTimers],
    time_wait: &'a [ConnectionTimers],
) -> ConnectionSnapshot<'a> {
    ConnectionSnapshot { active, time_wait }
}

//==================================================================================SLOW_PREDICTION
#[test]
/// Idle established connections need no slow timer.
fn test_slow_not_needed_without_deadlines() {
    let active = [established(), established()];
    assert_eq!(slow_timer_next_wake(&snapshot(&active, &[]), 0, &CFG), None);
    assert_eq!(slow_timer_next_wake(&NoConnections, 0, &CFG), None);
}

#[test]
/// Retransmission deadline: RTO minus elapsed ticks, in milliseconds.
fn test_slow_retransmission_deadline() {
    let mut conn = established();
    conn.has_unacked = true;
    conn.rto_ticks = 6;
    conn.retransmit_tick = 10;

    // 2 of 6 ticks elapsed: 4 ticks = 2000 ms left.
    let active = [conn];
    assert_eq!(slow_timer_next_wake(&snapshot(&active, &[]), 12, &CFG), Some(2_000));
}

#[test]
/// An overdue retransmission asks for exactly one slow interval.
fn test_slow_overdue_retransmission() {
    let mut conn = established();
    conn.has_unacked = true;
    conn.rto_ticks = 2;
    conn.retransmit_tick = 0;

    let active = [conn];
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &[]), 50, &CFG),
        Some(TCP_SLOW_INTERVAL_MS)
    );
}

#[test]
/// The soonest deadline across both lists wins.
fn test_slow_minimum_across_lists() {
    let mut persist = established();
    persist.persist_backoff = 2; // 6 ticks
    persist.persist_tick = 100;

    let mut fin_wait = ConnectionTimers::new(TcpState::FinWait1);
    fin_wait.fin_wait1_tick = 90; // 40 ticks total

    let mut time_wait = ConnectionTimers::new(TcpState::TimeWait);
    time_wait.activity_tick = 0; // 240 ticks total

    let active = [persist, fin_wait];
    let parked = [time_wait];
    // persist: 6 - 2 = 4 ticks, fin-wait-1: 40 - 12 = 28 ticks, time-wait: 240 - 102 = 138.
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &parked), 102, &CFG),
        Some(2_000)
    );
}

#[test]
/// FIN-WAIT-2 only counts once the receive half is closed too.
fn test_slow_fin_wait2_requires_rx_closed() {
    let mut conn = ConnectionTimers::new(TcpState::FinWait2);
    conn.activity_tick = 0;
    let active = [conn];
    assert_eq!(slow_timer_next_wake(&snapshot(&active, &[]), 10, &CFG), None);

    conn.rx_closed = true;
    let active = [conn];
    // 40 - 10 = 30 ticks.
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &[]), 10, &CFG),
        Some(15_000)
    );
}

#[test]
/// SYN-RECEIVED and LAST-ACK deadlines.
fn test_slow_handshake_and_last_ack() {
    let syn = ConnectionTimers::new(TcpState::SynRcvd);
    let active = [syn];
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &[]), 0, &CFG),
        Some(TCP_SYN_RCVD_TIMEOUT_MS)
    );

    let last_ack = ConnectionTimers::new(TcpState::LastAck);
    let active = [last_ack];
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &[]), 0, &CFG),
        Some(2 * TCP_MSL_MS)
    );
}

#[cfg(feature = "tcp-ooseq")]
#[test]
/// Out-of-order data is retained for a fixed number of RTOs.
fn test_slow_ooseq_retention() {
    let mut conn = established();
    conn.has_ooseq = true;
    conn.rto_ticks = 3;
    conn.activity_tick = 4;

    let active = [conn];
    // 18 - 2 = 16 ticks.
    assert_eq!(slow_timer_next_wake(&snapshot(&active, &[]), 6, &CFG), Some(8_000));
}

#[test]
/// Predictions never go below one slow interval nor above the idle ceiling.
fn test_slow_prediction_bounds() {
    let mut conn = established();
    conn.has_unacked = true;
    conn.rto_ticks = 1;
    conn.retransmit_tick = 0;
    let active = [conn];
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &[]), 1, &CFG),
        Some(TCP_SLOW_INTERVAL_MS)
    );

    // An inconsistent RTO far beyond the ceiling collapses to one interval.
    conn.rto_ticks = 10_000;
    let active = [conn];
    assert_eq!(
        slow_timer_next_wake(&snapshot(&active, &[]), 0, &CFG),
        Some(TCP_SLOW_INTERVAL_MS)
    );
}

//==================================================================================FAST_PREDICTION
#[test]
/// A delayed ACK needs the fast timer at its fixed interval; clearing it does not.
fn test_fast_timer_follows_ack_delay() {
    let mut conn = established();
    conn.ack_delay = true;
    let active = [conn];
    assert_eq!(
        fast_timer_next_wake(&snapshot(&active, &[]), &CFG),
        Some(TCP_FAST_INTERVAL_MS)
    );

    conn.ack_delay = false;
    let active = [conn];
    assert_eq!(fast_timer_next_wake(&snapshot(&active, &[]), &CFG), None);
}

#[test]
/// Deferred close and refused data also need the fast timer.
fn test_fast_timer_other_flags() {
    let mut closing = established();
    closing.close_pending = true;
    let mut refused = established();
    refused.has_refused_data = true;

    for conn in [closing, refused] {
        let active = [conn];
        assert!(fast_timer_next_wake(&snapshot(&active, &[]), &CFG).is_some());
    }
}

//==================================================================================CONTROLLER
#[test]
/// Ticks are rebuilt from wall time, anchored at the first evaluation.
fn test_tick_compensation() {
    let mut controller = TcpTimerController::default();
    assert_eq!(controller.compensate_ticks(1_000), 0);
    assert_eq!(controller.compensate_ticks(1_499), 0);
    assert_eq!(controller.compensate_ticks(1_500), 1);
    assert_eq!(controller.compensate_ticks(6_200), 10);
    assert_eq!(controller.tcp_ticks(), 10);
}

#[test]
/// Tick compensation survives the counter wrap.
fn test_tick_compensation_across_wrap() {
    let mut controller = TcpTimerController::default();
    controller.compensate_ticks(u32::MAX - 499);
    assert_eq!(controller.compensate_ticks(1_000), 3);
}

#[test]
/// Arm once, keep while pending, cancel when no longer needed.
fn test_plan_lifecycle() {
    let mut controller = TcpTimerController::default();
    let mut conn = established();
    conn.ack_delay = true;
    let active = [conn];
    let busy = snapshot(&active, &[]);

    assert_eq!(
        controller.plan(TcpTimerKind::Fast, &busy),
        TimerAction::Arm { delay_ms: 250 }
    );
    assert!(controller.is_pending(TcpTimerKind::Fast));
    assert_eq!(controller.plan(TcpTimerKind::Fast, &busy), TimerAction::Keep);

    assert_eq!(
        controller.plan(TcpTimerKind::Fast, &NoConnections),
        TimerAction::Cancel
    );
    assert!(!controller.is_pending(TcpTimerKind::Fast));
    assert!(!controller.is_pending(TcpTimerKind::Slow));
}

#[test]
/// After a firing the timer re-arms while still needed.
fn test_plan_after_fire_rearms() {
    let mut controller = TcpTimerController::default();
    let mut conn = established();
    conn.close_pending = true;
    let active = [conn];
    let busy = snapshot(&active, &[]);

    controller.plan(TcpTimerKind::Fast, &busy);
    assert_eq!(
        controller.plan_after_fire(TcpTimerKind::Fast, &busy),
        TimerAction::Arm { delay_ms: 250 }
    );
    assert!(controller.is_pending(TcpTimerKind::Fast));

    assert_eq!(
        controller.plan_after_fire(TcpTimerKind::Fast, &NoConnections),
        TimerAction::Cancel
    );
}
