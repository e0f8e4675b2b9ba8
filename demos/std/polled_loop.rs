//! Polled integration example: a run-to-completion main loop driving the
//! timer engine from a simulated millisecond counter.
//!
//! The loop asks the engine how long it may sleep, "sleeps" by advancing the
//! counter, then fires whatever fell due. A TCP connection with a delayed ACK
//! shows the fast TCP timer arming itself and going idle again.

use korri_timeouts::protocol::cyclic::CyclicTimer;
use korri_timeouts::protocol::traits::clock::Clock;
use korri_timeouts::protocol::traits::scheduler::{Scheduler, TimerHooks};
use korri_timeouts::protocol::traits::tcp_view::{ConnectionTimers, TcpConnections, TcpState};
use korri_timeouts::{SleepBudget, Timers};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Clone, Default)]
struct SimClock(Rc<Cell<u32>>);

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timeout {
    DhcpRetry,
}

#[derive(Default)]
struct Connections {
    active: Vec<ConnectionTimers>,
}

impl TcpConnections for Connections {
    fn active(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        self.active.iter().copied()
    }

    fn time_wait(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        std::iter::empty()
    }
}

struct Stack {
    clock: SimClock,
    conns: Connections,
}

impl TimerHooks<Timeout, u8> for Stack {
    type Tcp = Connections;

    fn on_timeout(&mut self, timers: &mut dyn Scheduler<Timeout, u8>, handler: Timeout, attempt: u8) {
        println!("[{:>5} ms] {:?} attempt {}", self.clock.now_ms(), handler, attempt);
        if attempt < 3 {
            // Exponential backoff between retries.
            let delay = 400 << attempt;
            if let Err(err) = timers.schedule_relative(delay, handler, attempt + 1) {
                println!("  cannot re-arm: {}", err);
            }
        }
    }

    fn on_cyclic(&mut self, _timers: &mut dyn Scheduler<Timeout, u8>, timer: CyclicTimer) {
        if matches!(timer, CyclicTimer::Arp | CyclicTimer::Dns) {
            println!("[{:>5} ms] cyclic {:?}", self.clock.now_ms(), timer);
        }
    }

    fn tcp_connections(&self) -> &Connections {
        &self.conns
    }

    fn tcp_fast_tick(&mut self, tcp_ticks: u32) {
        println!("[{:>5} ms] tcp fast pass (tick {})", self.clock.now_ms(), tcp_ticks);
        for conn in self.conns.active.iter_mut() {
            conn.ack_delay = false;
        }
    }
}

fn main() {
    println!("=== Polled timer loop ===\n");

    let clock = SimClock::default();
    let mut timers: Timers<SimClock, Timeout, u8, 32> = Timers::new(clock.clone());
    let mut stack = Stack {
        clock: clock.clone(),
        conns: Connections::default(),
    };

    timers.init().expect("cyclic table fits the pool");
    timers
        .schedule_relative(200, Timeout::DhcpRetry, 1)
        .expect("pool has room");

    let mut conn = ConnectionTimers::new(TcpState::Established);
    conn.ack_delay = true;
    stack.conns.active.push(conn);
    timers
        .tcp_timer_needed(&stack.conns)
        .expect("pool has room");

    while clock.now_ms() < 3_000 {
        let sleep = match timers.sleep_budget() {
            SleepBudget::Infinite => break,
            SleepBudget::Millis(ms) => ms,
        };
        clock.0.set(clock.now_ms() + sleep);
        timers.end_wait();
        if let Err(err) = timers.check_timeouts(&mut stack) {
            println!("timer error: {}", err);
        }
    }

    println!(
        "\n{} timeouts pending, fast TCP timer {}",
        timers.pending(),
        if timers.tcp_fast_pending() { "armed" } else { "idle" }
    );
}
