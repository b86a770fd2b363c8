//! The frame-stepped task executor.
//!
//! One scheduler owns all tasks of a stage. `step()` runs once per
//! simulation frame: it snapshots the tasks that were alive at pass start
//! and resumes each runnable one exactly once, in creation order. Tasks
//! created during a pass run their body up to the first suspension
//! immediately, then join the following pass. Dead tasks are reaped at the
//! end of the pass.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use smallvec::SmallVec;

use crate::entity::{EntityRef, World};

use super::event::Event;
use super::task::{TaskCtx, TaskId};

type TaskFuture = Pin<Box<dyn Future<Output = ()> + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Suspended,
    Running,
    Dead,
}

struct TaskSlot {
    id: TaskId,
    status: TaskStatus,
    /// Taken out while the task is being polled.
    future: Option<TaskFuture>,
    /// Suspended on an event; skipped by the pass until woken.
    blocked: bool,
    subtasks: Vec<TaskId>,
    finished: Event,
    finalizer: Option<Box<dyn FnOnce()>>,
    /// Entities this task is bound to; if any is gone at a resumption
    /// point, the task is canceled instead of resumed.
    bound: SmallVec<[EntityRef; 2]>,
}

pub(crate) struct SchedInner {
    tasks: RefCell<BTreeMap<u64, Rc<RefCell<TaskSlot>>>>,
    next_id: Cell<u64>,
    active: Cell<Option<TaskId>>,
    world: Rc<RefCell<World>>,
}

impl SchedInner {
    fn slot(&self, id: TaskId) -> Option<Rc<RefCell<TaskSlot>>> {
        self.tasks.borrow().get(&id.0).cloned()
    }

    pub(crate) fn set_blocked(&self, id: TaskId, blocked: bool) {
        if let Some(slot) = self.slot(id) {
            let mut slot = slot.borrow_mut();
            if slot.status != TaskStatus::Dead {
                slot.blocked = blocked;
            }
        }
    }
}

/// Spawn result: the task's id plus its `finished` event, which fires when
/// the body returns or the task is canceled (observers cannot tell the two
/// apart through this event alone).
#[derive(Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub finished: Event,
}

/// Cloneable owner handle for a stage's task set.
#[derive(Clone)]
pub struct Sched {
    inner: Rc<SchedInner>,
}

impl Sched {
    /// The world reference is used to resolve entity bindings at resumption
    /// points.
    pub fn new(world: Rc<RefCell<World>>) -> Self {
        Self {
            inner: Rc::new(SchedInner {
                tasks: RefCell::new(BTreeMap::new()),
                next_id: Cell::new(0),
                active: Cell::new(None),
                world,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<SchedInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner_rc(&self) -> &Rc<SchedInner> {
        &self.inner
    }

    /// Id of the task currently being polled, if any.
    pub fn active(&self) -> Option<TaskId> {
        self.inner.active.get()
    }

    /// Number of live (not yet reaped) tasks.
    pub fn task_count(&self) -> usize {
        self.inner
            .tasks
            .borrow()
            .values()
            .filter(|slot| slot.borrow().status != TaskStatus::Dead)
            .count()
    }

    pub fn is_alive(&self, id: TaskId) -> bool {
        self.inner
            .slot(id)
            .map_or(false, |slot| slot.borrow().status != TaskStatus::Dead)
    }

    /// Create a task and run its body up to the first suspension. The task
    /// joins the scheduler's regular passes starting with the next `step`.
    ///
    /// The closure receives the new task's [`TaskCtx`] and returns its body;
    /// everything the body needs is moved into the future before `invoke`
    /// returns, so stack-allocated state at the call site is safe.
    pub fn invoke<F, Fut>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.spawn(None, f)
    }

    /// As [`invoke`](Self::invoke), but the body starts only after `delay`
    /// frames have passed.
    pub fn invoke_delayed<F, Fut>(&self, delay: i32, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.invoke(move |ctx| async move {
            ctx.wait(delay).await;
            f(ctx.clone()).await;
        })
    }

    /// As [`invoke`](Self::invoke), but the body starts when `event` is next
    /// signaled. If the event is canceled first, the task dies without its
    /// body ever running.
    pub fn invoke_when<F, Fut>(&self, event: &Event, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let event = event.clone();
        self.invoke(move |ctx| async move {
            if !event.wait(&ctx).await.is_canceled() {
                f(ctx.clone()).await;
            }
        })
    }

    pub(crate) fn spawn<F, Fut>(&self, parent: Option<TaskId>, f: F) -> TaskHandle
    where
        F: FnOnce(TaskCtx) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let id = TaskId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let finished = Event::new();
        let slot = TaskSlot {
            id,
            status: TaskStatus::Suspended,
            future: None,
            blocked: false,
            subtasks: Vec::new(),
            finished: finished.clone(),
            finalizer: None,
            bound: SmallVec::new(),
        };
        let slot = Rc::new(RefCell::new(slot));
        self.inner.tasks.borrow_mut().insert(id.0, slot.clone());

        // the slot exists before the body closure runs, so ctx operations
        // (bind, set_finalizer) are valid even while the future is built
        let ctx = TaskCtx { sched: self.clone(), id };
        let future: TaskFuture = Box::pin(f(ctx));
        slot.borrow_mut().future = Some(future);

        if let Some(parent) = parent {
            if let Some(pslot) = self.inner.slot(parent) {
                pslot.borrow_mut().subtasks.push(id);
            }
        }

        // prologue: run to the first suspension before returning to the caller
        self.resume(id);

        TaskHandle { id, finished }
    }

    /// Cancel a task: its `finished` event fires, its subtasks are canceled
    /// (newest first, depth-first), and its finalizer runs last. When this
    /// returns, the task is dead and its storage released.
    pub fn cancel(&self, id: TaskId) {
        self.kill(id);
    }

    /// Cancel every task. Used at stage teardown.
    pub fn cancel_all(&self) {
        let ids: Vec<u64> = self.inner.tasks.borrow().keys().rev().cloned().collect();
        for id in ids {
            self.kill(TaskId(id));
        }
        self.inner.tasks.borrow_mut().clear();
    }

    pub(crate) fn bind(&self, id: TaskId, entity: EntityRef) {
        if let Some(slot) = self.inner.slot(id) {
            slot.borrow_mut().bound.push(entity);
        }
    }

    pub(crate) fn set_finalizer(&self, id: TaskId, f: Box<dyn FnOnce()>) {
        if let Some(slot) = self.inner.slot(id) {
            let mut slot = slot.borrow_mut();
            debug_assert!(slot.finalizer.is_none(), "task finalizer set twice");
            slot.finalizer = Some(f);
        }
    }

    /// One scheduler pass. Resumes, in creation order, every task that was
    /// alive at pass start and is not suspended on an event, then reaps the
    /// dead. Returns the number of tasks resumed.
    pub fn step(&self) -> u32 {
        let snapshot: Vec<Rc<RefCell<TaskSlot>>> =
            self.inner.tasks.borrow().values().cloned().collect();

        let mut ran = 0;
        for slot in snapshot {
            let id = {
                let slot = slot.borrow();
                if slot.status == TaskStatus::Suspended && !slot.blocked {
                    Some(slot.id)
                } else {
                    None
                }
            };
            if let Some(id) = id {
                self.resume(id);
                ran += 1;
            }
        }

        self.inner
            .tasks
            .borrow_mut()
            .retain(|_, slot| slot.borrow().status != TaskStatus::Dead);

        ran
    }

    /// Poll a task once. No-op if the task is dead, blocked, or already
    /// running. If the task is bound to an entity that no longer exists, it
    /// is canceled instead of resumed.
    pub(crate) fn resume(&self, id: TaskId) {
        let slot = match self.inner.slot(id) {
            Some(slot) => slot,
            None => return,
        };

        let mut future = {
            let mut s = slot.borrow_mut();
            if s.status != TaskStatus::Suspended || s.blocked {
                return;
            }
            let gone = {
                let world = self.inner.world.borrow();
                s.bound.iter().any(|e| !world.contains(*e))
            };
            if gone {
                drop(s);
                self.kill(id);
                return;
            }
            s.status = TaskStatus::Running;
            match s.future.take() {
                Some(f) => f,
                None => {
                    s.status = TaskStatus::Suspended;
                    return;
                }
            }
        };

        let prev_active = self.inner.active.replace(Some(id));
        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        let poll = future.as_mut().poll(&mut cx);
        self.inner.active.set(prev_active);

        match poll {
            Poll::Ready(()) => {
                drop(future);
                // restore Suspended so kill() runs the death sequence even
                // though the body already returned on its own
                if let Some(slot) = self.inner.slot(id) {
                    let mut s = slot.borrow_mut();
                    if s.status == TaskStatus::Running {
                        s.status = TaskStatus::Suspended;
                    }
                }
                self.kill(id);
            }
            Poll::Pending => {
                let mut s = slot.borrow_mut();
                if s.status == TaskStatus::Dead {
                    // canceled from inside its own poll; the future dies here
                    drop(s);
                    drop(future);
                } else {
                    s.future = Some(future);
                    s.status = TaskStatus::Suspended;
                }
            }
        }
    }

    /// The death sequence. Runs exactly once per task:
    /// drop the body (which unsubscribes any pending event wait), signal
    /// `finished`, cancel subtasks newest-first, run the finalizer.
    fn kill(&self, id: TaskId) {
        let slot = match self.inner.slot(id) {
            Some(slot) => slot,
            None => return,
        };
        {
            let mut s = slot.borrow_mut();
            if s.status == TaskStatus::Dead {
                return;
            }
            s.status = TaskStatus::Dead;
        }

        let future = slot.borrow_mut().future.take();
        drop(future);

        let finished = slot.borrow().finished.clone();
        finished.signal(0);

        let subtasks = slot.borrow().subtasks.clone();
        for sub in subtasks.into_iter().rev() {
            self.kill(sub);
        }

        let finalizer = slot.borrow_mut().finalizer.take();
        if let Some(f) = finalizer {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemy::Enemy;
    use glam::Vec2;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_sched() -> Sched {
        Sched::new(Rc::new(RefCell::new(World::new())))
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_yield_resume_lifecycle() {
        let sched = test_sched();
        let trace = log();

        let t = trace.clone();
        let handle = sched.invoke(|ctx| async move {
            t.borrow_mut().push("a".into());
            ctx.yield_frame().await;
            t.borrow_mut().push("b".into());
            ctx.yield_frame().await;
            t.borrow_mut().push("c".into());
        });

        // prologue ran to the first yield at creation time
        assert_eq!(*trace.borrow(), vec!["a"]);
        assert!(sched.is_alive(handle.id));

        sched.step();
        assert_eq!(*trace.borrow(), vec!["a", "b"]);

        sched.step();
        assert_eq!(*trace.borrow(), vec!["a", "b", "c"]);
        assert!(!sched.is_alive(handle.id));
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_finished_event_fires_on_return() {
        let sched = test_sched();
        let trace = log();

        let handle = sched.invoke(|ctx| async move {
            ctx.yield_frame().await;
        });

        let t = trace.clone();
        let finished = handle.finished.clone();
        sched.invoke(move |ctx| async move {
            finished.wait(&ctx).await;
            t.borrow_mut().push("observed".into());
        });

        // the observer was created after the task, so it is woken within the
        // same pass the task dies in
        sched.step();
        assert_eq!(*trace.borrow(), vec!["observed"]);
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_wait_counts_frames() {
        let sched = test_sched();
        let done = Rc::new(Cell::new(false));

        let d = done.clone();
        sched.invoke(|ctx| async move {
            ctx.wait(3).await;
            d.set(true);
        });

        sched.step();
        sched.step();
        assert!(!done.get());
        sched.step();
        assert!(done.get());
    }

    #[test]
    fn test_wait_zero_is_noop() {
        let sched = test_sched();
        let done = Rc::new(Cell::new(false));
        let d = done.clone();
        sched.invoke(|ctx| async move {
            ctx.wait(0).await;
            d.set(true);
        });
        // completes within the prologue, no step needed
        assert!(done.get());
    }

    #[test]
    fn test_event_broadcast_fifo() {
        let sched = test_sched();
        let event = Event::new();
        let trace = log();

        for name in ["t1", "t2", "t3"] {
            let event = event.clone();
            let t = trace.clone();
            sched.invoke(move |ctx| async move {
                let result = event.wait(&ctx).await;
                t.borrow_mut().push(format!("{}={:?}", name, result.value()));
            });
        }

        let ev = event.clone();
        sched.invoke(move |_ctx| async move {
            ev.signal(42);
        });

        assert!(trace.borrow().is_empty());
        sched.step();
        assert_eq!(
            *trace.borrow(),
            vec!["t1=Some(42)", "t2=Some(42)", "t3=Some(42)"]
        );
    }

    #[test]
    fn test_signal_does_not_wake_new_subscribers() {
        let sched = test_sched();
        let event = Event::new();
        let woken = Rc::new(Cell::new(0));

        let ev = event.clone();
        let w = woken.clone();
        sched.invoke(move |ctx| async move {
            ev.wait(&ctx).await;
            w.set(w.get() + 1);
        });

        event.signal(1);
        sched.step();
        assert_eq!(woken.get(), 1);

        // subscribe after the signal: must wait for the next one
        let ev = event.clone();
        let w = woken.clone();
        sched.invoke(move |ctx| async move {
            ev.wait(&ctx).await;
            w.set(w.get() + 1);
        });
        sched.step();
        sched.step();
        assert_eq!(woken.get(), 1);
        event.signal(2);
        sched.step();
        assert_eq!(woken.get(), 2);
    }

    #[test]
    fn test_signal_once_only_first_counts() {
        let sched = test_sched();
        let event = Event::new();
        let value = Rc::new(Cell::new(0));

        let ev = event.clone();
        let v = value.clone();
        sched.invoke(move |ctx| async move {
            if let Some(x) = ev.wait(&ctx).await.value() {
                v.set(x);
            }
        });

        event.signal_once(7);
        event.signal_once(9);
        sched.step();
        assert_eq!(value.get(), 7);
        assert_eq!(event.num_signaled(), 1);
    }

    #[test]
    fn test_cancel_event_wakes_synchronously() {
        let sched = test_sched();
        let event = Event::new();
        let trace = log();

        let ev = event.clone();
        let t = trace.clone();
        let handle = sched.invoke(move |ctx| async move {
            if ev.wait(&ctx).await.is_canceled() {
                t.borrow_mut().push("canceled".into());
                return;
            }
            t.borrow_mut().push("signaled".into());
        });

        event.cancel();
        // no scheduler step: the waiter was resumed inside cancel()
        assert_eq!(*trace.borrow(), vec!["canceled"]);
        assert!(!sched.is_alive(handle.id));
    }

    #[test]
    fn test_wait_on_canceled_event_resolves_immediately() {
        let sched = test_sched();
        let event = Event::new();
        event.cancel();

        let got = Rc::new(Cell::new(false));
        let g = got.clone();
        let ev = event.clone();
        sched.invoke(move |ctx| async move {
            g.set(ev.wait(&ctx).await.is_canceled());
        });
        assert!(got.get());
    }

    #[test]
    fn test_reinit_clears_cancelation() {
        let event = Event::new();
        event.signal(1);
        event.cancel();
        let old_epoch = event.epoch();
        event.reinit();
        assert!(!event.is_canceled());
        assert_eq!(event.num_signaled(), 0);
        assert_ne!(event.epoch(), old_epoch);
    }

    #[test]
    fn test_cancellation_cascade_order() {
        let sched = test_sched();
        let trace = log();

        let t = trace.clone();
        let parent = sched.invoke(move |ctx| async move {
            let t2 = t.clone();
            ctx.set_finalizer(move || t2.borrow_mut().push("fin:P".into()));
            let tc = t.clone();
            ctx.invoke_subtask(move |ctx| async move {
                let t2 = tc.clone();
                ctx.set_finalizer(move || t2.borrow_mut().push("fin:C1".into()));
                let tcc = tc.clone();
                ctx.invoke_subtask(move |ctx| async move {
                    ctx.set_finalizer(move || tcc.borrow_mut().push("fin:C2".into()));
                    loop {
                        ctx.yield_frame().await;
                    }
                });
                loop {
                    ctx.yield_frame().await;
                }
            });
            loop {
                ctx.yield_frame().await;
            }
        });

        sched.step();
        assert_eq!(sched.task_count(), 3);

        sched.cancel(parent.id);
        // deepest subtask dies first, each finalizer exactly once
        assert_eq!(*trace.borrow(), vec!["fin:C2", "fin:C1", "fin:P"]);
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_subtasks_die_with_parent_return() {
        let sched = test_sched();
        let child_alive = Rc::new(Cell::new(true));

        let ca = child_alive.clone();
        sched.invoke(move |ctx| async move {
            ctx.invoke_subtask(move |ctx| async move {
                ctx.set_finalizer(move || ca.set(false));
                loop {
                    ctx.yield_frame().await;
                }
            });
            ctx.wait(2).await;
        });

        sched.step();
        assert!(child_alive.get());
        sched.step(); // parent returns; subtask canceled with it
        assert!(!child_alive.get());
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_insertion_order_within_pass() {
        let sched = test_sched();
        let trace = log();

        for name in ["a", "b", "c"] {
            let t = trace.clone();
            sched.invoke(move |ctx| async move {
                ctx.yield_frame().await;
                t.borrow_mut().push(name.to_string());
            });
        }

        sched.step();
        assert_eq!(*trace.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_task_created_mid_pass_defers_to_next_pass() {
        let sched = test_sched();
        let trace = log();

        let t = trace.clone();
        sched.invoke(move |ctx| async move {
            ctx.yield_frame().await;
            let t2 = t.clone();
            ctx.invoke(move |ctx| async move {
                t2.borrow_mut().push("child prologue".into());
                ctx.yield_frame().await;
                t2.borrow_mut().push("child body".into());
            });
            t.borrow_mut().push("parent after spawn".into());
        });

        sched.step();
        // the child's prologue ran inline, but its first resumption waits
        // for the next pass
        assert_eq!(
            *trace.borrow(),
            vec!["child prologue", "parent after spawn"]
        );
        sched.step();
        assert_eq!(
            *trace.borrow(),
            vec!["child prologue", "parent after spawn", "child body"]
        );
    }

    #[test]
    fn test_empty_step_is_idempotent() {
        let sched = test_sched();
        assert_eq!(sched.step(), 0);
        assert_eq!(sched.step(), 0);
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_invoke_captures_arguments_by_move() {
        let sched = test_sched();
        let result = Rc::new(Cell::new(0));

        {
            // stack-local argument struct, gone after this block
            let args = (21, 2);
            let r = result.clone();
            sched.invoke(move |ctx| async move {
                ctx.yield_frame().await;
                r.set(args.0 * args.1);
            });
        }

        sched.step();
        assert_eq!(result.get(), 42);
    }

    #[test]
    fn test_invoke_delayed() {
        let sched = test_sched();
        let done = Rc::new(Cell::new(false));
        let d = done.clone();
        sched.invoke_delayed(2, move |_ctx| async move {
            d.set(true);
        });
        sched.step();
        assert!(!done.get());
        sched.step();
        assert!(done.get());
    }

    #[test]
    fn test_invoke_when_signal_starts_body() {
        let sched = test_sched();
        let event = Event::new();
        let done = Rc::new(Cell::new(false));

        let d = done.clone();
        sched.invoke_when(&event, move |_ctx| async move {
            d.set(true);
        });

        sched.step();
        assert!(!done.get());
        event.signal(0);
        sched.step();
        assert!(done.get());
    }

    #[test]
    fn test_invoke_when_cancel_kills_task_before_body() {
        let sched = test_sched();
        let event = Event::new();
        let ran = Rc::new(Cell::new(false));

        let r = ran.clone();
        let handle = sched.invoke_when(&event, move |_ctx| async move {
            r.set(true);
        });

        event.cancel();
        assert!(!ran.get());
        assert!(!sched.is_alive(handle.id));
    }

    #[test]
    fn test_bound_task_canceled_when_entity_dies() {
        let world = Rc::new(RefCell::new(World::new()));
        let sched = Sched::new(world.clone());
        let entity = world.borrow_mut().spawn_enemy(Enemy::new(Vec2::ZERO, 10.0));

        let resumes = Rc::new(Cell::new(0));
        let finalized = Rc::new(Cell::new(false));

        let r = resumes.clone();
        let f = finalized.clone();
        let handle = sched.invoke(move |ctx| async move {
            ctx.bind(entity);
            ctx.set_finalizer(move || f.set(true));
            loop {
                ctx.yield_frame().await;
                r.set(r.get() + 1);
            }
        });

        sched.step();
        sched.step();
        assert_eq!(resumes.get(), 2);

        assert!(world.borrow_mut().despawn(entity));
        sched.step();
        // canceled at the resumption point; the body never saw the frame
        assert_eq!(resumes.get(), 2);
        assert!(finalized.get());
        assert!(!sched.is_alive(handle.id));
    }

    #[test]
    fn test_task_ids_monotonic() {
        let sched = test_sched();
        let a = sched.invoke(|_ctx| async {});
        let b = sched.invoke(|_ctx| async {});
        let c = sched.invoke(|_ctx| async {});
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn test_cancel_all_runs_finalizers() {
        let sched = test_sched();
        let count = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let c = count.clone();
            sched.invoke(move |ctx| async move {
                ctx.set_finalizer(move || c.set(c.get() + 1));
                loop {
                    ctx.yield_frame().await;
                }
            });
        }
        sched.cancel_all();
        assert_eq!(count.get(), 3);
        assert_eq!(sched.task_count(), 0);
    }
}
