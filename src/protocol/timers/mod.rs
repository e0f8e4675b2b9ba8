//! Timer engine: one owned object gathering the timeout list, the cyclic
//! registry and the adaptive TCP timers.
//!
//! `&mut Timers` stands for the core lock: every operation that touches
//! timer state takes it. The engine never blocks; the surrounding event loop
//! asks [`Timers::sleep_budget`] how long it may wait and calls
//! [`Timers::drain_due`] (or [`Timers::check_timeouts`]) once it wakes.
//!
//! Protocol handlers are identified by an embedder-chosen key `K` and receive
//! an argument `A`. Both are compared by value to cancel a pending timeout.
use crate::core::{remaining_ms, SleepBudget, MAX_TIMEOUT_MS};
use crate::error::TimerError;
use crate::infra::timeout_list::{Expired, TimeoutList};
use crate::protocol::cyclic::{
    CyclicRegistry, CyclicStatus, CyclicStep, CyclicTimer, CyclicTimerSpec, EnableOutcome,
    RearmPath,
};
use crate::protocol::tcp_timers::{TcpTimerConfig, TcpTimerController, TcpTimerKind, TimerAction};
use crate::protocol::traits::clock::Clock;
use crate::protocol::traits::scheduler::{Scheduler, TimerHooks};
use crate::protocol::traits::tcp_view::TcpConnections;

/// Node pool size used when the embedder does not pick one.
pub const DEFAULT_TIMEOUT_CAPACITY: usize = 32;

//==================================================================================Handler
/// What a pending timeout runs when it falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler<K> {
    /// Self-rescheduling registry entry.
    Cyclic(CyclicTimer),
    /// Coarse TCP housekeeping.
    TcpSlow,
    /// Fine TCP housekeeping.
    TcpFast,
    /// One-shot timeout armed by a protocol.
    User(K),
}

impl<K> Handler<K> {
    fn tcp(kind: TcpTimerKind) -> Self {
        match kind {
            TcpTimerKind::Slow => Handler::TcpSlow,
            TcpTimerKind::Fast => Handler::TcpFast,
        }
    }
}

//==================================================================================Engine
/// Timer engine over clock `C`, handler keys `K` and arguments `A`, with a
/// pool of `N` pending timeouts.
pub struct Timers<C: Clock, K, A, const N: usize = DEFAULT_TIMEOUT_CAPACITY> {
    clock: C,
    list: TimeoutList<Handler<K>, Option<A>, N>,
    cyclic: CyclicRegistry,
    tcp: TcpTimerController,
    /// Due time of the timeout being fired.
    current_due: u32,
    /// Sleep the event loop is currently honoring; zero when not waiting.
    honored_sleep: u32,
    wake_requested: bool,
    tcp_check_requested: bool,
}

impl<C: Clock, K: Copy + PartialEq, A: Copy + PartialEq, const N: usize> Timers<C, K, A, N> {
    /// Engine with the standard cyclic table and TCP defaults.
    pub fn new(clock: C) -> Self {
        Self::with_parts(clock, CyclicRegistry::standard(), TcpTimerConfig::DEFAULT)
    }

    /// Engine with a custom cyclic table and TCP tunables.
    pub fn with_config(
        clock: C,
        table: &'static [CyclicTimerSpec],
        tcp: TcpTimerConfig,
    ) -> Result<Self, TimerError> {
        Ok(Self::with_parts(clock, CyclicRegistry::new(table)?, tcp))
    }

    fn with_parts(clock: C, cyclic: CyclicRegistry, tcp: TcpTimerConfig) -> Self {
        Self {
            clock,
            list: TimeoutList::new(),
            cyclic,
            tcp: TcpTimerController::new(tcp),
            current_due: 0,
            honored_sleep: 0,
            wake_requested: false,
            tcp_check_requested: false,
        }
    }

    /// Arm every cyclic timer that starts out running.
    pub fn init(&mut self) -> Result<(), TimerError> {
        let now = self.clock.now_ms();
        for spec in self.cyclic.startup() {
            self.list.schedule_absolute_named(
                now.wrapping_add(spec.interval_ms),
                Handler::Cyclic(spec.timer),
                None,
                "cyclic",
            )?;
        }

        #[cfg(feature = "defmt")]
        defmt::info!("timers initialised, {} cyclic timers armed", self.list.len());

        Ok(())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> u32 {
        self.clock.now_ms()
    }

    //------------------------------------------------------------------One-shot timeouts
    /// Arm `handler(arg)` to run `delay_ms` from now.
    pub fn schedule_relative(&mut self, delay_ms: u32, handler: K, arg: A) -> Result<(), TimerError> {
        let due = self.relative_due(delay_ms)?;
        self.arm(due, Handler::User(handler), Some(arg), None)
    }

    /// Same as [`Self::schedule_relative`], with a label kept by the
    /// `diagnostics` feature.
    pub fn schedule_relative_named(
        &mut self,
        delay_ms: u32,
        handler: K,
        arg: A,
        label: &'static str,
    ) -> Result<(), TimerError> {
        let due = self.relative_due(delay_ms)?;
        self.arm(due, Handler::User(handler), Some(arg), Some(label))
    }

    /// Arm `handler(arg)` for the absolute tick `due`.
    pub fn schedule_absolute(&mut self, due: u32, handler: K, arg: A) -> Result<(), TimerError> {
        self.arm(due, Handler::User(handler), Some(arg), None)
    }

    /// Remove the first pending `handler(arg)`.
    ///
    /// Only the first match goes: a pair armed twice stays pending once.
    pub fn cancel(&mut self, handler: K, arg: A) -> bool {
        let removed = self.list.cancel(Handler::User(handler), Some(arg));

        #[cfg(feature = "defmt")]
        if !removed {
            defmt::trace!("cancel: no pending timeout matched");
        }

        removed
    }

    pub fn is_pending(&self, handler: K, arg: A) -> bool {
        self.list.contains(Handler::User(handler), Some(arg))
    }

    /// Number of pending timeouts, internal ones included.
    pub fn pending(&self) -> usize {
        self.list.len()
    }

    /// Pending timeouts head to tail.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Handler<K>, Option<A>)> + '_ {
        self.list.iter()
    }

    fn relative_due(&self, delay_ms: u32) -> Result<u32, TimerError> {
        if delay_ms > MAX_TIMEOUT_MS {
            #[cfg(feature = "defmt")]
            defmt::error!("timeout of {} ms exceeds the {} ms bound", delay_ms, MAX_TIMEOUT_MS);
            return Err(TimerError::TimeoutTooLong {
                requested: delay_ms,
                max: MAX_TIMEOUT_MS,
            });
        }
        Ok(self.clock.now_ms().wrapping_add(delay_ms))
    }

    fn arm(
        &mut self,
        due: u32,
        handler: Handler<K>,
        arg: Option<A>,
        label: Option<&'static str>,
    ) -> Result<(), TimerError> {
        let result = match label {
            Some(label) => self.list.schedule_absolute_named(due, handler, arg, label),
            None => self.list.schedule_absolute(due, handler, arg),
        };
        if let Err(err) = result {
            #[cfg(feature = "defmt")]
            defmt::error!("cannot arm timeout: {}", err);
            return Err(err);
        }

        // A sleeping event loop must recompute its budget.
        let delay = remaining_ms(due, self.clock.now_ms());
        if self.honored_sleep != 0 && delay < self.honored_sleep {
            self.wake_requested = true;
        }
        Ok(())
    }

    //------------------------------------------------------------------Event loop support
    /// How long the caller may block; recorded as the honored sleep.
    pub fn sleep_budget(&mut self) -> SleepBudget {
        let budget = self.list.sleep_budget(self.clock.now_ms());
        self.honored_sleep = budget.as_millis();
        budget
    }

    /// Shift all pending timeouts so the soonest falls due at `now`.
    pub fn rebase(&mut self, now: u32) {
        #[cfg(feature = "defmt")]
        defmt::warn!("rebasing {} pending timeouts onto {}", self.list.len(), now);
        self.list.rebase(now);
    }

    /// Due time of the timeout currently (or last) fired.
    pub fn current_due(&self) -> u32 {
        self.current_due
    }

    /// Consume a pending early-wake request.
    pub fn take_wake_request(&mut self) -> bool {
        core::mem::take(&mut self.wake_requested)
    }

    /// The event loop stopped waiting.
    pub fn end_wait(&mut self) {
        self.honored_sleep = 0;
    }

    //------------------------------------------------------------------Cyclic timers
    /// Enable or disable a registry entry.
    pub fn set_cyclic_timer_enabled(
        &mut self,
        timer: CyclicTimer,
        enabled: bool,
    ) -> Result<(), TimerError> {
        match self.cyclic.set_enabled(timer, enabled)? {
            EnableOutcome::Arm { interval_ms } => {
                let due = self.clock.now_ms().wrapping_add(interval_ms);
                let result = self.arm(due, Handler::Cyclic(timer), None, Some("cyclic"));
                if result.is_err() {
                    self.cyclic.revert_enable(timer);
                }
                result
            }
            EnableOutcome::Unchanged => Ok(()),
        }
    }

    pub fn cyclic_status(&self, timer: CyclicTimer) -> Option<CyclicStatus> {
        self.cyclic.status(timer)
    }

    //------------------------------------------------------------------TCP timers
    /// Re-evaluate both TCP timers against the current connection lists.
    pub fn tcp_timer_needed<T: TcpConnections>(&mut self, conns: &T) -> Result<(), TimerError> {
        self.tcp.compensate_ticks(self.clock.now_ms());
        let slow = self.tcp.plan(TcpTimerKind::Slow, conns);
        let slow_result = self.apply_tcp_action(TcpTimerKind::Slow, slow);
        let fast = self.tcp.plan(TcpTimerKind::Fast, conns);
        let fast_result = self.apply_tcp_action(TcpTimerKind::Fast, fast);
        slow_result.and(fast_result)
    }

    pub fn tcp_slow_pending(&self) -> bool {
        self.tcp.is_pending(TcpTimerKind::Slow)
    }

    pub fn tcp_fast_pending(&self) -> bool {
        self.tcp.is_pending(TcpTimerKind::Fast)
    }

    /// TCP tick counter as of the last evaluation.
    pub fn tcp_ticks(&self) -> u32 {
        self.tcp.tcp_ticks()
    }

    fn apply_tcp_action(&mut self, kind: TcpTimerKind, action: TimerAction) -> Result<(), TimerError> {
        let handler = Handler::tcp(kind);
        match action {
            TimerAction::Arm { delay_ms } => {
                self.list.cancel(handler, None);
                let due = self.clock.now_ms().wrapping_add(delay_ms);
                let result = self.arm(due, handler, None, Some("tcp"));
                if result.is_err() {
                    self.tcp.set_pending(kind, false);
                }
                result
            }
            TimerAction::Cancel => {
                self.list.cancel(handler, None);
                Ok(())
            }
            TimerAction::Keep => Ok(()),
        }
    }

    //------------------------------------------------------------------Dispatch
    /// Fire everything due as of the clock's current value.
    pub fn check_timeouts<H: TimerHooks<K, A>>(&mut self, hooks: &mut H) -> Result<usize, TimerError> {
        let now = self.clock.now_ms();
        self.drain_due(now, hooks)
    }

    /// Fire every timeout that was pending and due at `now`.
    ///
    /// Timeouts armed by the handlers wait for the next pass even when already
    /// due. A failure to re-arm an internal timer does not stop the pass; the
    /// first such error is returned once every due timeout has fired.
    pub fn drain_due<H: TimerHooks<K, A>>(
        &mut self,
        now: u32,
        hooks: &mut H,
    ) -> Result<usize, TimerError> {
        self.honored_sleep = 0;
        if !self.list.begin_drain() {
            #[cfg(feature = "defmt")]
            defmt::error!("drain_due called from inside a timeout handler");
            return Ok(0);
        }

        let mut fired = 0;
        let mut first_error = None;
        while let Some(expired) = self.list.pop_due(now) {
            self.current_due = expired.due;
            fired += 1;

            if let Err(err) = self.dispatch(expired, hooks) {
                first_error.get_or_insert(err);
            }
            if core::mem::take(&mut self.tcp_check_requested) {
                if let Err(err) = self.tcp_timer_needed(hooks.tcp_connections()) {
                    first_error.get_or_insert(err);
                }
            }
        }
        self.list.end_drain();

        match first_error {
            Some(err) => Err(err),
            None => Ok(fired),
        }
    }

    fn dispatch<H: TimerHooks<K, A>>(
        &mut self,
        expired: Expired<Handler<K>, Option<A>>,
        hooks: &mut H,
    ) -> Result<(), TimerError> {
        #[cfg(all(feature = "defmt", feature = "diagnostics"))]
        defmt::trace!("timeout due at {} fired ({})", expired.due, expired.label);
        #[cfg(all(feature = "defmt", not(feature = "diagnostics")))]
        defmt::trace!("timeout due at {} fired", expired.due);

        match expired.handler {
            Handler::User(handler) => {
                if let Some(arg) = expired.arg {
                    hooks.on_timeout(self, handler, arg);
                }
                Ok(())
            }
            Handler::Cyclic(timer) => self.fire_cyclic(timer, expired.due, hooks),
            Handler::TcpSlow => self.fire_tcp(TcpTimerKind::Slow, hooks),
            Handler::TcpFast => self.fire_tcp(TcpTimerKind::Fast, hooks),
        }
    }

    fn fire_cyclic<H: TimerHooks<K, A>>(
        &mut self,
        timer: CyclicTimer,
        last_due: u32,
        hooks: &mut H,
    ) -> Result<(), TimerError> {
        if self.cyclic.should_invoke(timer) {
            hooks.on_cyclic(self, timer);
        }

        match self.cyclic.after_fire(timer, last_due, self.clock.now_ms()) {
            CyclicStep::Rearm { due, path } => {
                if path == RearmPath::Overload {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("cyclic timer {} overloaded, cadence restarted", timer);
                }
                let result = self.arm(due, Handler::Cyclic(timer), None, Some("cyclic"));
                if result.is_err() {
                    // No instance left in the list: back to idle so an enable re-arms it.
                    #[cfg(feature = "defmt")]
                    defmt::error!("cyclic timer {} lost its re-arm", timer);
                    self.cyclic.revert_enable(timer);
                }
                result
            }
            CyclicStep::Retire => Ok(()),
        }
    }

    fn fire_tcp<H: TimerHooks<K, A>>(
        &mut self,
        kind: TcpTimerKind,
        hooks: &mut H,
    ) -> Result<(), TimerError> {
        let ticks = self.tcp.compensate_ticks(self.clock.now_ms());
        match kind {
            TcpTimerKind::Slow => hooks.tcp_slow_tick(ticks),
            TcpTimerKind::Fast => hooks.tcp_fast_tick(ticks),
        }
        let action = self.tcp.plan_after_fire(kind, hooks.tcp_connections());
        self.apply_tcp_action(kind, action)
    }
}

//==================================================================================Scheduler
impl<C: Clock, K: Copy + PartialEq, A: Copy + PartialEq, const N: usize> Scheduler<K, A>
    for Timers<C, K, A, N>
{
    fn now(&self) -> u32 {
        self.clock.now_ms()
    }

    fn schedule_relative(&mut self, delay_ms: u32, handler: K, arg: A) -> Result<(), TimerError> {
        Timers::schedule_relative(self, delay_ms, handler, arg)
    }

    fn schedule_absolute(&mut self, due: u32, handler: K, arg: A) -> Result<(), TimerError> {
        Timers::schedule_absolute(self, due, handler, arg)
    }

    fn cancel(&mut self, handler: K, arg: A) -> bool {
        Timers::cancel(self, handler, arg)
    }

    fn set_cyclic_timer_enabled(
        &mut self,
        timer: CyclicTimer,
        enabled: bool,
    ) -> Result<(), TimerError> {
        Timers::set_cyclic_timer_enabled(self, timer, enabled)
    }

    fn request_tcp_timer_check(&mut self) {
        self.tcp_check_requested = true;
    }
}
