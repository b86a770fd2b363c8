//! Wake-up channels between tasks and the simulation.
//!
//! An [`Event`] holds a FIFO subscriber list of waiting tasks. Signaling
//! moves every *current* subscriber to the ready state with a payload; they
//! resume on their next scheduler turn. Canceling wakes every subscriber
//! with [`Wait::Canceled`] synchronously, before `cancel` returns, and
//! forbids further subscription until the event is re-initialized.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use smallvec::SmallVec;

use super::sched::{Sched, SchedInner};
use super::task::{TaskCtx, TaskId};

/// Outcome of waiting on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The event was signaled with this payload.
    Signaled(u32),
    /// The event was canceled while we were subscribed (or before we could
    /// subscribe).
    Canceled,
}

impl Wait {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Wait::Canceled)
    }

    pub fn value(&self) -> Option<u32> {
        match self {
            Wait::Signaled(v) => Some(*v),
            Wait::Canceled => None,
        }
    }
}

struct Subscriber {
    sub_id: u64,
    task: TaskId,
    sched: Weak<SchedInner>,
    outcome: Weak<Cell<Option<Wait>>>,
}

struct EventState {
    /// Bumped on cancel and reinit so stale subscription records can be told
    /// apart from live ones.
    epoch: u32,
    num_signaled: u32,
    canceled: bool,
    next_sub: u64,
    subscribers: SmallVec<[Subscriber; 4]>,
}

/// Cloneable handle to a single event. All clones share state.
#[derive(Clone)]
pub struct Event {
    state: Rc<RefCell<EventState>>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(EventState {
                epoch: 0,
                num_signaled: 0,
                canceled: false,
                next_sub: 0,
                subscribers: SmallVec::new(),
            })),
        }
    }

    /// Epoch id; changes whenever the event is canceled or re-initialized.
    pub fn epoch(&self) -> u32 {
        self.state.borrow().epoch
    }

    pub fn num_signaled(&self) -> u32 {
        self.state.borrow().num_signaled
    }

    pub fn is_canceled(&self) -> bool {
        self.state.borrow().canceled
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    /// Wake every current subscriber with `value`. Subscribers added while
    /// the wakeups are being delivered wait for the next signal. Woken tasks
    /// resume on their next scheduler turn, in subscription (FIFO) order.
    pub fn signal(&self, value: u32) {
        debug_assert!(!self.state.borrow().canceled, "signaling a canceled event");
        let subscribers = {
            let mut state = self.state.borrow_mut();
            state.num_signaled += 1;
            std::mem::take(&mut state.subscribers)
        };
        for sub in subscribers {
            if let Some(cell) = sub.outcome.upgrade() {
                cell.set(Some(Wait::Signaled(value)));
            }
            if let Some(sched) = sub.sched.upgrade() {
                sched.set_blocked(sub.task, false);
            }
        }
    }

    /// As [`signal`](Self::signal), but only the first call has any effect.
    pub fn signal_once(&self, value: u32) {
        if self.state.borrow().num_signaled == 0 {
            self.signal(value);
        }
    }

    /// Wake every subscriber with [`Wait::Canceled`], resuming each waiting
    /// task before this call returns, and refuse new subscriptions until
    /// [`reinit`](Self::reinit).
    pub fn cancel(&self) {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            if state.canceled {
                return;
            }
            state.canceled = true;
            state.epoch = state.epoch.wrapping_add(1);
            std::mem::take(&mut state.subscribers)
        };
        for sub in subscribers {
            if let Some(cell) = sub.outcome.upgrade() {
                cell.set(Some(Wait::Canceled));
            }
            if let Some(inner) = sub.sched.upgrade() {
                inner.set_blocked(sub.task, false);
                // synchronous wake: the waiter sees Canceled right now
                Sched::from_inner(inner).resume(sub.task);
            }
        }
    }

    /// Fresh epoch, no subscribers, subscribable again. Any lingering
    /// subscription records from before the reinit resolve as no-ops.
    pub fn reinit(&self) {
        let mut state = self.state.borrow_mut();
        state.epoch = state.epoch.wrapping_add(1);
        state.num_signaled = 0;
        state.canceled = false;
        state.subscribers.clear();
    }

    /// Subscribe the current task and suspend until the event is signaled or
    /// canceled. Waiting on an already-canceled event resolves to
    /// [`Wait::Canceled`] immediately.
    pub fn wait(&self, ctx: &TaskCtx) -> WaitEvent {
        WaitEvent {
            event: self.clone(),
            sched: Rc::downgrade(ctx.sched_inner()),
            task: ctx.id(),
            outcome: Rc::new(Cell::new(None)),
            sub_id: None,
        }
    }
}

/// Future returned by [`Event::wait`].
pub struct WaitEvent {
    event: Event,
    sched: Weak<SchedInner>,
    task: TaskId,
    outcome: Rc<Cell<Option<Wait>>>,
    sub_id: Option<u64>,
}

impl Future for WaitEvent {
    type Output = Wait;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Wait> {
        let this = self.get_mut();

        if let Some(result) = this.outcome.take() {
            this.sub_id = None;
            return Poll::Ready(result);
        }

        if this.sub_id.is_none() {
            let mut state = this.event.state.borrow_mut();
            if state.canceled {
                return Poll::Ready(Wait::Canceled);
            }
            let sub_id = state.next_sub;
            state.next_sub += 1;
            state.subscribers.push(Subscriber {
                sub_id,
                task: this.task,
                sched: this.sched.clone(),
                outcome: Rc::downgrade(&this.outcome),
            });
            drop(state);
            this.sub_id = Some(sub_id);
            if let Some(sched) = this.sched.upgrade() {
                sched.set_blocked(this.task, true);
            }
        }

        Poll::Pending
    }
}

impl Drop for WaitEvent {
    fn drop(&mut self) {
        // A wait abandoned before resolution (task canceled while suspended
        // here) must not leave a dangling subscription behind.
        if let Some(sub_id) = self.sub_id {
            if self.outcome.get().is_none() {
                let mut state = self.event.state.borrow_mut();
                state.subscribers.retain(|s| s.sub_id != sub_id);
            }
        }
    }
}
