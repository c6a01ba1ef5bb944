//! The task queue and the dispatcher.
//!
//! # Queue
//!
//! Each [`Loop`] owns a singly linked list of the [`Task`]s scheduled on it.
//! The links are stored in the tasks themselves, so scheduling never
//! allocates. The list is sorted by due time in chronological order (see
//! [`crate::time`]), and tasks with the same due time are kept in the order
//! they were scheduled:
//!
//! ```text
//!   Loop::head
//!       │
//!       v
//!  ┌─────────┐ next ┌─────────┐ next ┌─────────┐ next ┌─────────┐
//!  │ t4 @-10 ├─────>│ t1 @10  ├─────>│ t3 @20  ├─────>│ t2 @30  ├───> None
//!  └─────────┘      └─────────┘      └─────────┘      └─────────┘
//! ```
//!
//! A task is either **enqueued** (linked into its loop's list exactly once)
//! or **idle**:
//!
//! ```text
//!          schedule                  cancel, dispatch
//!   Idle ────────────> Enqueued ─────────────────────> Idle
//!                       │    ^
//!                       └────┘ schedule
//! ```
//!
//! # Locking
//!
//! Every access to the list or to a task's fields happens inside the
//! critical section of the loop's [`Port`]. [`Loop::step`] leaves the
//! critical section before calling the dispatched task's callback, so the
//! callback is free to schedule or cancel any task, including its own.
use core::{fmt, ptr};

use crate::{
    port::{CsCell, CsGuard, Port},
    time::{self, Ticks, MAX_DIFF},
};


/// The callback invoked when a [`Task`] is dispatched.
///
/// It receives the `now` value passed to [`Loop::step`] and the task itself.
/// Any context the callback needs is captured by the closure. The port decides
/// whether it must be `Sync` ([`Port::Callback`]).
pub type TaskFn<'a, P> = &'a <P as Port>::Callback<'a>;

/// Give a closure the exact signature expected by [`TaskFn`].
///
/// A closure whose parameter is annotated as `&Task<'_, P>` is generic over
/// two unrelated lifetimes and can't call [`Task::schedule`] on the task it
/// receives. Passing it through this function avoids that.
///
/// ```
/// use tickloop::{task_fn, Loop, SingleContext, Task};
///
/// let every_100 = task_fn::<SingleContext, _>(|now, task| {
///     task.reschedule(now + 100);
/// });
///
/// let lp = Loop::new(SingleContext::new());
/// let task = Task::new(&lp);
/// task.schedule(0, &every_100, 0);
/// lp.step(0);
/// assert_eq!(lp.next_due(), Some(100));
/// ```
#[inline]
pub fn task_fn<'a, P: 'a + Port, F>(f: F) -> F
where
    F: Fn(Ticks, &'a Task<'a, P>) + 'a,
{
    f
}

type Link<'a, P> = Option<&'a Task<'a, P>>;

// Loop
// ---------------------------------------------------------------------------

/// An event loop: an ordered queue of [`Task`]s and the [`Port`] guarding it.
///
/// `Loop` is driven from outside by calling [`step`](Self::step) repeatedly.
/// It doesn't own its tasks; they are borrowed for `'a` and must outlive it.
pub struct Loop<'a, P: Port> {
    /// The earliest task, or `None` if the queue is empty.
    head: CsCell<Link<'a, P>>,

    port: P,
}

impl<'a, P: Port> Loop<'a, P> {
    /// Construct an empty `Loop`.
    pub const fn new(port: P) -> Self {
        Self {
            head: CsCell::new(None),
            port,
        }
    }

    /// Get the port supplying this loop's critical section.
    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Dispatch the earliest task if it's due, and report when the loop
    /// should be stepped next.
    ///
    ///  - If the queue is empty, returns `now + MAX_DIFF`. This only means
    ///    there's nothing to do; the caller may step earlier.
    ///  - If the earliest task is due after `now`, returns its due time.
    ///    Nothing is dispatched.
    ///  - Otherwise (the task is on time or late), removes the task from the
    ///    queue, calls its callback with `now`, and returns `now`. More tasks
    ///    might be due, so the caller should step again immediately.
    ///
    /// At most one task is dispatched per call. To run every due task, call
    /// `step` until the returned value is after `now`.
    pub fn step(&self, now: Ticks) -> Ticks {
        let (task, callback) = {
            let cs = CsGuard::new(&self.port);

            let Some(task) = self.head.get(&cs) else {
                log::trace!("step({now}): no pending tasks");
                return now.wrapping_add(MAX_DIFF);
            };

            let when = task.when.get(&cs);
            if time::is_after(when, now) {
                return when;
            }

            self.head.set(&cs, task.next.replace(&cs, None));

            // Read the callback before leaving the critical section. Another
            // context may reschedule `task` as soon as we leave.
            let Some(callback) = task.callback.get(&cs) else {
                unreachable!("an enqueued task has no callback");
            };

            (task, callback)
        };

        log::trace!("step({now}): dispatching {task:p}");
        callback(now, task);

        now
    }

    /// Return `true` if no tasks are scheduled.
    pub fn is_empty(&self) -> bool {
        let cs = CsGuard::new(&self.port);
        self.head.get(&cs).is_none()
    }

    /// Get the due time of the earliest task.
    pub fn next_due(&self) -> Option<Ticks> {
        let cs = CsGuard::new(&self.port);
        self.head.get(&cs).map(|task| task.when.get(&cs))
    }

    /// Iterate over the scheduled tasks and their due times in dispatch
    /// order.
    ///
    /// The returned iterator stays inside the critical section until it's
    /// dropped. Don't call anything that operates on this loop or its tasks
    /// while holding it; depending on the port, that deadlocks.
    pub fn pending(&self) -> Pending<'_, 'a, P> {
        let cs = CsGuard::new(&self.port);
        let next = self.head.get(&cs);
        Pending { cs, next }
    }

    /// Get the cell linking to the task following `prev`, or to the first
    /// task if `prev` is `None`.
    #[inline]
    fn link_after<'s>(&'s self, prev: Option<&'s Task<'a, P>>) -> &'s CsCell<Link<'a, P>> {
        match prev {
            Some(task) => &task.next,
            None => &self.head,
        }
    }

    /// Remove `task` from the queue. Returns `false` if it wasn't there.
    fn unlink(&self, cs: &CsGuard<'_, P>, task: &Task<'a, P>) -> bool {
        let mut prev = None;
        let mut cur = self.head.get(cs);

        while let Some(t) = cur {
            let next = t.next.get(cs);
            if ptr::eq(t, task) {
                self.link_after(prev).set(cs, next);
                t.next.set(cs, None);
                return true;
            }
            prev = cur;
            cur = next;
        }

        false
    }

    /// Insert `task`, which must be unlinked, after every task that's due
    /// before or at the same time as it.
    fn insert(&self, cs: &CsGuard<'_, P>, task: &'a Task<'a, P>) {
        let when = task.when.get(cs);
        let mut prev = None;
        let mut cur = self.head.get(cs);

        while let Some(t) = cur {
            if time::is_before(when, t.when.get(cs)) {
                break;
            }
            prev = cur;
            cur = t.next.get(cs);
        }

        task.next.set(cs, cur);
        self.link_after(prev).set(cs, Some(task));
    }
}

impl<P: Port + fmt::Debug> fmt::Debug for Loop<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The queue is only readable inside the critical section, which
        // might be held by the caller
        f.debug_struct("Loop")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`Loop::pending`].
pub struct Pending<'l, 'a, P: Port> {
    cs: CsGuard<'l, P>,
    next: Link<'a, P>,
}

impl<'a, P: Port> Iterator for Pending<'_, 'a, P> {
    type Item = (&'a Task<'a, P>, Ticks);

    fn next(&mut self) -> Option<Self::Item> {
        let task = self.next?;
        self.next = task.next.get(&self.cs);
        Some((task, task.when.get(&self.cs)))
    }
}

impl<P: Port> fmt::Debug for Pending<'_, '_, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pending")
            .field("next", &self.next.map(|task| task as *const Task<'_, P>))
            .finish()
    }
}

// Task
// ---------------------------------------------------------------------------

/// A schedulable unit of deferred work, bound to one [`Loop`].
///
/// `Task` is allocated by the application, typically on the stack of the
/// thread running the loop or in a `static`. Its identity is its address.
///
/// # Examples
///
/// ```
/// use tickloop::{task_fn, Loop, SingleContext, Task};
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let count = AtomicU32::new(0);
/// let on_tick = task_fn::<SingleContext, _>(|now, task| {
///     count.fetch_add(1, Ordering::Relaxed);
///     task.reschedule(now + 10);
/// });
///
/// let lp = Loop::new(SingleContext::new());
/// let task = Task::new(&lp);
/// task.schedule(0, &on_tick, 0);
///
/// assert_eq!(lp.step(0), 0); // dispatched; the task is now due at 10
/// assert_eq!(lp.step(5), 10); // not due yet
/// assert_eq!(lp.step(12), 12); // dispatched late
/// assert_eq!(count.load(Ordering::Relaxed), 2);
/// assert_eq!(task.when(), 22);
/// ```
pub struct Task<'a, P: Port> {
    owner: &'a Loop<'a, P>,

    /// The next task in the owner's queue. Only meaningful while enqueued.
    next: CsCell<Link<'a, P>>,

    /// The due time.
    when: CsCell<Ticks>,

    /// `None` until the task is scheduled for the first time.
    callback: CsCell<Option<TaskFn<'a, P>>>,

    /// Opaque to the scheduler.
    flags: CsCell<u32>,
}

impl<'a, P: Port> Task<'a, P> {
    /// Construct an idle `Task` bound to `owner`.
    pub const fn new(owner: &'a Loop<'a, P>) -> Self {
        Self {
            owner,
            next: CsCell::new(None),
            when: CsCell::new(0),
            callback: CsCell::new(None),
            flags: CsCell::new(0),
        }
    }

    /// Get the loop this task is bound to.
    #[inline]
    pub fn owner(&self) -> &'a Loop<'a, P> {
        self.owner
    }

    /// Schedule the task to be dispatched at `when`, replacing its callback
    /// and flags.
    ///
    /// If the task is already enqueued, it's moved to the position matching
    /// `when`, after every task due at the same time. Returns `true` if the
    /// task was enqueued before this call.
    ///
    /// `when` must not be more than [`MAX_DIFF`] ticks ahead of the time the
    /// loop is being stepped with.
    pub fn schedule(&'a self, when: Ticks, callback: TaskFn<'a, P>, flags: u32) -> bool {
        let was_scheduled = {
            let cs = CsGuard::new(&self.owner.port);
            self.schedule_locked(&cs, when, callback, flags)
        };

        log::trace!("schedule({self:p}, when = {when}, flags = {flags:#x}) -> {was_scheduled}");
        self.owner.port.wake();

        was_scheduled
    }

    /// Schedule the task again at `when`, keeping the callback and flags
    /// given to the last call to [`schedule`](Self::schedule).
    ///
    /// Returns `true` if the task was enqueued before this call.
    ///
    /// # Panics
    ///
    /// Panics if the task has never been scheduled.
    pub fn reschedule(&'a self, when: Ticks) -> bool {
        let was_scheduled = {
            let cs = CsGuard::new(&self.owner.port);
            let Some(callback) = self.callback.get(&cs) else {
                panic!("the task has never been scheduled");
            };
            let flags = self.flags.get(&cs);
            self.schedule_locked(&cs, when, callback, flags)
        };

        log::trace!("reschedule({self:p}, when = {when}) -> {was_scheduled}");
        self.owner.port.wake();

        was_scheduled
    }

    /// Move the task to the position matching `when` and replace its
    /// callback and flags. Returns `true` if the task was enqueued.
    fn schedule_locked(
        &'a self,
        cs: &CsGuard<'_, P>,
        when: Ticks,
        callback: TaskFn<'a, P>,
        flags: u32,
    ) -> bool {
        let owner = self.owner;
        let was_scheduled = owner.unlink(cs, self);

        self.when.set(cs, when);
        self.callback.set(cs, Some(callback));
        self.flags.set(cs, flags);

        owner.insert(cs, self);
        was_scheduled
    }

    /// Remove the task from its loop's queue.
    ///
    /// Returns `true` if the task was enqueued. Once this returns, the task
    /// won't be dispatched until it's scheduled again. Canceling a task whose
    /// callback is already running has no effect and returns `false`.
    pub fn cancel(&self) -> bool {
        let found = {
            let cs = CsGuard::new(&self.owner.port);
            self.owner.unlink(&cs, self)
        };

        log::trace!("cancel({self:p}) -> {found}");
        found
    }

    /// Return `true` if the task is enqueued.
    pub fn is_scheduled(&self) -> bool {
        let cs = CsGuard::new(&self.owner.port);
        let mut cur = self.owner.head.get(&cs);
        while let Some(t) = cur {
            if ptr::eq(t, self) {
                return true;
            }
            cur = t.next.get(&cs);
        }
        false
    }

    /// Get the due time given to the last call to [`schedule`](Self::schedule).
    pub fn when(&self) -> Ticks {
        let cs = CsGuard::new(&self.owner.port);
        self.when.get(&cs)
    }

    /// Get the flags given to the last call to [`schedule`](Self::schedule).
    pub fn flags(&self) -> u32 {
        let cs = CsGuard::new(&self.owner.port);
        self.flags.get(&cs)
    }
}

impl<P: Port> fmt::Debug for Task<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Do not print the fields. They are only readable inside the critical
        // section, which might be held by the caller.
        f.debug_tuple("Task").field(&(self as *const Self)).finish()
    }
}
