//! Time-ordered list of pending one-shot timeouts.
//!
//! Nodes live in a fixed pool of `N` slots and are chained through slot
//! indices, head = soonest due. Arming a timeout never allocates: when every
//! slot is taken the insertion fails with [`TimerError::PoolExhausted`] and the
//! list is left exactly as it was.
//!
//! Equal due times keep FIFO order. Removal by identity only ever unlinks the
//! first matching node, so a caller that arms the same `(handler, arg)` pair
//! twice must cancel twice.
use crate::core::{is_before, remaining_ms, SleepBudget};
use crate::error::TimerError;

//==================================================================================Structs
/// A timeout that left the list because it fell due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired<H, A> {
    /// Absolute due time the node was armed for.
    pub due: u32,
    pub handler: H,
    pub arg: A,
    #[cfg(feature = "diagnostics")]
    pub label: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct TimeoutNode<H, A> {
    due: u32,
    handler: H,
    arg: A,
    next: Option<usize>,
    /// Armed while a drain pass was running; that pass must skip it.
    fresh: bool,
    #[cfg(feature = "diagnostics")]
    label: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
enum Slot<H, A> {
    Free { next_free: Option<usize> },
    Used(TimeoutNode<H, A>),
}

/// Pool-backed singly-linked timeout list.
#[derive(Debug)]
pub struct TimeoutList<H, A, const N: usize> {
    slots: [Slot<H, A>; N],
    head: Option<usize>,
    free: Option<usize>,
    len: usize,
    draining: bool,
}

//==================================================================================Slot handling
impl<H, A, const N: usize> TimeoutList<H, A, N> {
    /// Build an empty list with every slot on the free chain.
    pub fn new() -> Self {
        Self {
            slots: ::core::array::from_fn(|i| Slot::Free {
                next_free: if i + 1 < N { Some(i + 1) } else { None },
            }),
            head: None,
            free: if N > 0 { Some(0) } else { None },
            len: 0,
            draining: false,
        }
    }

    /// Total number of slots in the pool.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of pending timeouts.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Due time of the soonest pending timeout.
    pub fn head_due(&self) -> Option<u32> {
        self.head.and_then(|idx| self.node(idx)).map(|node| node.due)
    }

    /// Whether a drain pass is currently running.
    #[inline]
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Walk pending timeouts head to tail as `(due, handler, arg)`.
    pub fn iter(&self) -> Iter<'_, H, A, N> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn node(&self, idx: usize) -> Option<&TimeoutNode<H, A>> {
        match self.slots.get(idx) {
            Some(Slot::Used(node)) => Some(node),
            _ => None,
        }
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut TimeoutNode<H, A>> {
        match self.slots.get_mut(idx) {
            Some(Slot::Used(node)) => Some(node),
            _ => None,
        }
    }

    fn set_next(&mut self, idx: usize, next: Option<usize>) {
        if let Some(node) = self.node_mut(idx) {
            node.next = next;
        }
    }

    fn alloc(&mut self, node: TimeoutNode<H, A>) -> Result<usize, TimerError> {
        let exhausted = TimerError::PoolExhausted { capacity: N };
        let idx = self.free.ok_or(exhausted)?;
        let next_free = match self.slots[idx] {
            Slot::Free { next_free } => next_free,
            Slot::Used(_) => return Err(exhausted),
        };
        self.free = next_free;
        self.slots[idx] = Slot::Used(node);
        self.len += 1;
        Ok(idx)
    }

    /// Return a slot to the free chain. Must only be called once the node is unlinked.
    fn release(&mut self, idx: usize) -> Option<TimeoutNode<H, A>> {
        let slot = ::core::mem::replace(
            &mut self.slots[idx],
            Slot::Free {
                next_free: self.free,
            },
        );
        match slot {
            Slot::Used(node) => {
                self.free = Some(idx);
                self.len -= 1;
                Some(node)
            }
            free @ Slot::Free { .. } => {
                self.slots[idx] = free;
                None
            }
        }
    }

    fn unlink(
        &mut self,
        prev: Option<usize>,
        idx: usize,
        next: Option<usize>,
    ) -> Option<TimeoutNode<H, A>> {
        match prev {
            None => self.head = next,
            Some(prev) => self.set_next(prev, next),
        }
        self.release(idx)
    }
}

impl<H, A, const N: usize> Default for TimeoutList<H, A, N> {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================Operations
impl<H: Copy + PartialEq, A: Copy + PartialEq, const N: usize> TimeoutList<H, A, N> {
    /// Arm a timeout for the absolute tick `due`.
    pub fn schedule_absolute(&mut self, due: u32, handler: H, arg: A) -> Result<(), TimerError> {
        self.insert(due, handler, arg, None)
    }

    /// Same as [`Self::schedule_absolute`], attaching a label kept by the
    /// `diagnostics` feature.
    pub fn schedule_absolute_named(
        &mut self,
        due: u32,
        handler: H,
        arg: A,
        label: &'static str,
    ) -> Result<(), TimerError> {
        self.insert(due, handler, arg, Some(label))
    }

    fn insert(
        &mut self,
        due: u32,
        handler: H,
        arg: A,
        label: Option<&'static str>,
    ) -> Result<(), TimerError> {
        #[cfg(not(feature = "diagnostics"))]
        let _ = label;

        let idx = self.alloc(TimeoutNode {
            due,
            handler,
            arg,
            next: None,
            fresh: self.draining,
            #[cfg(feature = "diagnostics")]
            label,
        })?;

        // New node goes right before the first node due strictly later.
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let Some(existing) = self.node(current) else {
                break;
            };
            if is_before(due, existing.due) {
                break;
            }
            prev = Some(current);
            cursor = existing.next;
        }

        self.set_next(idx, cursor);
        match prev {
            None => self.head = Some(idx),
            Some(prev) => self.set_next(prev, Some(idx)),
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("timeout armed: due={} pending={}", due, self.len);

        Ok(())
    }

    /// Remove the first pending timeout matching `(handler, arg)`.
    ///
    /// Later duplicates are left in place. Returns `false` when nothing matched.
    pub fn cancel(&mut self, handler: H, arg: A) -> bool {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else {
                break;
            };
            let next = node.next;
            if node.handler == handler && node.arg == arg {
                self.unlink(prev, current, next);
                return true;
            }
            prev = Some(current);
            cursor = next;
        }
        false
    }

    /// Whether some pending timeout matches `(handler, arg)`.
    pub fn contains(&self, handler: H, arg: A) -> bool {
        self.iter().any(|(_, h, a)| h == handler && a == arg)
    }

    /// Detach the next timeout due at `now`, skipping nodes armed during the
    /// current drain pass.
    pub fn pop_due(&mut self, now: u32) -> Option<Expired<H, A>> {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let node = *self.node(current)?;
            if is_before(now, node.due) {
                return None;
            }
            if !node.fresh {
                self.unlink(prev, current, node.next);
                return Some(Expired {
                    due: node.due,
                    handler: node.handler,
                    arg: node.arg,
                    #[cfg(feature = "diagnostics")]
                    label: node.label,
                });
            }
            prev = Some(current);
            cursor = node.next;
        }
        None
    }

    /// Open a drain pass. Returns `false` if one is already running.
    pub fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    /// Close the drain pass: nodes armed during it become eligible again.
    pub fn end_drain(&mut self) {
        self.draining = false;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            cursor = match self.node_mut(current) {
                Some(node) => {
                    node.fresh = false;
                    node.next
                }
                None => None,
            };
        }
    }

    /// Fire every timeout that was pending and due at `now`.
    ///
    /// Each node is fully unlinked before `fire` sees it, so `fire` may arm or
    /// cancel timeouts on the list it receives. Timeouts armed from inside
    /// `fire` wait for the next pass even when already due. A nested call
    /// returns immediately.
    pub fn drain_due(&mut self, now: u32, mut fire: impl FnMut(&mut Self, Expired<H, A>)) -> usize {
        if !self.begin_drain() {
            #[cfg(feature = "defmt")]
            defmt::error!("drain_due called from inside a timeout handler");
            return 0;
        }

        let mut fired = 0;
        while let Some(expired) = self.pop_due(now) {
            fire(self, expired);
            fired += 1;
        }

        self.end_drain();
        fired
    }

    /// Shift every pending due time so the head falls due at `now`, keeping
    /// relative spacing. Nothing fires.
    pub fn rebase(&mut self, now: u32) {
        let Some(base) = self.head_due() else {
            return;
        };
        let mut cursor = self.head;
        while let Some(current) = cursor {
            cursor = match self.node_mut(current) {
                Some(node) => {
                    node.due = node.due.wrapping_sub(base).wrapping_add(now);
                    node.next
                }
                None => None,
            };
        }
    }

    /// Milliseconds until the head falls due, or [`SleepBudget::Infinite`].
    pub fn sleep_budget(&self, now: u32) -> SleepBudget {
        match self.head_due() {
            None => SleepBudget::Infinite,
            Some(due) => SleepBudget::Millis(remaining_ms(due, now)),
        }
    }
}

//==================================================================================Iterator
/// Borrowing iterator over pending timeouts, soonest first.
pub struct Iter<'a, H, A, const N: usize> {
    list: &'a TimeoutList<H, A, N>,
    cursor: Option<usize>,
}

impl<'a, H: Copy, A: Copy, const N: usize> Iterator for Iter<'a, H, A, N> {
    type Item = (u32, H, A);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        Some((node.due, node.handler, node.arg))
    }
}
