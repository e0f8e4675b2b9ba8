/// Test doubles to drive the timer engine during integration tests.
use korri_timeouts::protocol::cyclic::CyclicTimer;
use korri_timeouts::protocol::pap::{PapLink, PapTimer, Upap};
use korri_timeouts::protocol::traits::clock::{Clock, Delay};
use korri_timeouts::protocol::traits::scheduler::{Scheduler, TimerHooks};
use korri_timeouts::protocol::traits::tcp_view::{ConnectionTimers, TcpConnections};
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use tokio::time::{sleep, Duration, Instant};

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Hand-advanced millisecond counter shared between the test and the engine.
pub struct MockClock(Rc<Cell<u32>>);

#[allow(dead_code)]
impl MockClock {
    pub fn at(now: u32) -> Self {
        Self(Rc::new(Cell::new(now)))
    }

    pub fn set(&self, now: u32) {
        self.0.set(now);
    }

    pub fn advance(&self, millis: u32) {
        self.0.set(self.0.get().wrapping_add(millis));
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}

#[derive(Clone, Copy)]
#[allow(dead_code)]
/// Clock following tokio time, so paused-time tests stay deterministic.
pub struct TokioClock {
    origin: Instant,
}

#[allow(dead_code)]
impl TokioClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

#[allow(dead_code)]
/// Delay based on `tokio::time::sleep`.
pub struct TokioDelay;

impl Delay for TokioDelay {
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl Future<Output = ()> + 'a {
        sleep(Duration::from_millis(u64::from(millis)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
/// Handler keys of the simulated stack.
pub enum StackTimer {
    Tick,
    Pap(PapTimer),
}

impl From<PapTimer> for StackTimer {
    fn from(timer: PapTimer) -> Self {
        StackTimer::Pap(timer)
    }
}

#[derive(Default)]
#[allow(dead_code)]
/// Connection lists owned by the simulated TCP layer.
pub struct ConnectionList {
    pub active: Vec<ConnectionTimers>,
    pub time_wait: Vec<ConnectionTimers>,
}

impl TcpConnections for ConnectionList {
    fn active(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        self.active.iter().copied()
    }

    fn time_wait(&self) -> impl Iterator<Item = ConnectionTimers> + '_ {
        self.time_wait.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
/// Everything PAP asked the link to do.
pub enum LinkEvent {
    Request(u8),
    Response(u8, bool),
    WithPeerSuccess,
    WithPeerFailure,
    PeerSuccess,
    PeerFailure,
}

#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingLink {
    pub events: Vec<LinkEvent>,
}

impl PapLink for RecordingLink {
    fn send_auth_request(&mut self, id: u8, _user: &[u8], _password: &[u8]) {
        self.events.push(LinkEvent::Request(id));
    }

    fn send_auth_response(&mut self, id: u8, accepted: bool) {
        self.events.push(LinkEvent::Response(id, accepted));
    }

    fn with_peer_success(&mut self) {
        self.events.push(LinkEvent::WithPeerSuccess);
    }

    fn with_peer_failure(&mut self) {
        self.events.push(LinkEvent::WithPeerFailure);
    }

    fn peer_success(&mut self) {
        self.events.push(LinkEvent::PeerSuccess);
    }

    fn peer_failure(&mut self) {
        self.events.push(LinkEvent::PeerFailure);
    }
}

#[derive(Default)]
#[allow(dead_code)]
/// Simulated stack recording every callback it receives.
pub struct RecordingStack {
    pub fired: Vec<(StackTimer, u8)>,
    pub cyclic: Vec<CyclicTimer>,
    pub slow_ticks: Vec<u32>,
    pub fast_ticks: Vec<u32>,
    pub conns: ConnectionList,
    pub pap: Option<Upap<u8>>,
    pub link: RecordingLink,
}

#[allow(dead_code)]
impl RecordingStack {
    pub fn with_pap(link_id: u8) -> Self {
        Self {
            pap: Some(Upap::new(link_id)),
            ..Self::default()
        }
    }

    pub fn cyclic_count(&self, timer: CyclicTimer) -> usize {
        self.cyclic.iter().filter(|t| **t == timer).count()
    }
}

impl TimerHooks<StackTimer, u8> for RecordingStack {
    type Tcp = ConnectionList;

    fn on_timeout(&mut self, timers: &mut dyn Scheduler<StackTimer, u8>, handler: StackTimer, arg: u8) {
        self.fired.push((handler, arg));
        let (Some(pap), StackTimer::Pap(timer)) = (self.pap.as_mut(), handler) else {
            return;
        };
        match timer {
            PapTimer::Retransmit => pap
                .on_retransmit_timeout(timers, &mut self.link)
                .expect("retransmission must be armed"),
            PapTimer::RequestTimeout => pap.on_request_timeout(&mut self.link),
        }
    }

    fn on_cyclic(&mut self, _timers: &mut dyn Scheduler<StackTimer, u8>, timer: CyclicTimer) {
        self.cyclic.push(timer);
    }

    fn tcp_connections(&self) -> &ConnectionList {
        &self.conns
    }

    fn tcp_slow_tick(&mut self, tcp_ticks: u32) {
        self.slow_ticks.push(tcp_ticks);
    }

    fn tcp_fast_tick(&mut self, tcp_ticks: u32) {
        self.fast_ticks.push(tcp_ticks);
        for conn in self.conns.active.iter_mut() {
            conn.ack_delay = false;
        }
    }
}
