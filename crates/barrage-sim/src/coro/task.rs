//! Per-task context and the frame-wait futures.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use barrage_core::Frame;

use crate::entity::EntityRef;

use super::event::{Event, WaitEvent};
use super::sched::{Sched, SchedInner, TaskHandle};

/// Monotonic task identity. Ids are never reused within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

/// Handle to the currently running task, passed into every task body.
///
/// All kernel operations a task body needs go through here: suspension
/// (`yield_frame`, `wait`, event waits), spawning, entity binding, and the
/// finalizer hook.
#[derive(Clone)]
pub struct TaskCtx {
    pub(crate) sched: Sched,
    pub(crate) id: TaskId,
}

impl TaskCtx {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn sched(&self) -> &Sched {
        &self.sched
    }

    pub(crate) fn sched_inner(&self) -> &Rc<SchedInner> {
        self.sched.inner_rc()
    }

    /// Suspend until the next scheduler pass.
    pub fn yield_frame(&self) -> WaitFrames {
        WaitFrames { left: 1 }
    }

    /// Suspend for `frames` scheduler passes. `wait(0)` is a no-op and
    /// `wait(1)` is equivalent to [`yield_frame`](Self::yield_frame).
    pub fn wait(&self, frames: Frame) -> WaitFrames {
        WaitFrames { left: frames.max(0) }
    }

    /// Subscribe to `event` and suspend until it is signaled or canceled.
    pub fn wait_event(&self, event: &Event) -> WaitEvent {
        event.wait(self)
    }

    /// Tie this task's lifetime to an entity: if the entity is gone at any
    /// later resumption point, the task is canceled before its body runs
    /// again.
    pub fn bind(&self, entity: EntityRef) {
        self.sched.bind(self.id, entity);
    }

    /// Install a cleanup closure that runs exactly once when this task dies,
    /// whether it returns normally or is canceled.
    pub fn set_finalizer(&self, f: impl FnOnce() + 'static) {
        self.sched.set_finalizer(self.id, Box::new(f));
    }

    /// Spawn a sibling task on the same scheduler. See [`Sched::invoke`].
    pub fn invoke<F, Fut>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.sched.invoke(f)
    }

    /// Spawn a task whose lifetime is bounded by this one: when this task
    /// finishes or is canceled, the subtask is canceled with it.
    pub fn invoke_subtask<F, Fut>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.sched.spawn(Some(self.id), f)
    }

    pub fn cancel(&self, task: TaskId) {
        self.sched.cancel(task);
    }
}

/// Future that suspends for a fixed number of scheduler passes.
pub struct WaitFrames {
    left: Frame,
}

impl Future for WaitFrames {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.left <= 0 {
            Poll::Ready(())
        } else {
            this.left -= 1;
            Poll::Pending
        }
    }
}
