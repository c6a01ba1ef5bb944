//! A cooperative timer-task scheduler for bare-metal event loops.
//!
//! An application allocates [`Task`]s, binds each of them to a [`Loop`], and
//! schedules them to be dispatched at specific points of time expressed in
//! wrapping 32-bit [`Ticks`]. The loop doesn't read any clock or sleep by
//! itself. The application's driver loop calls [`Loop::step`] with the current
//! time, which dispatches at most one due task and returns the time at which
//! it should be called next:
//!
//! ```
//! use tickloop::{task_fn, DefaultTickRate, Loop, SingleContext, Task, Ticks};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let greetings = AtomicU32::new(0);
//! let say_hello = task_fn::<SingleContext, _>(|now, task| {
//!     greetings.fetch_add(1, Ordering::Relaxed);
//!     task.reschedule(now + DefaultTickRate::secs_to_ticks(1));
//! });
//!
//! let lp = Loop::new(SingleContext::new());
//! let hello = Task::new(&lp);
//! hello.schedule(0, &say_hello, 0);
//!
//! // A simulated clock
//! let mut now: Ticks = 0;
//! while greetings.load(Ordering::Relaxed) < 3 {
//!     let next = lp.step(now);
//!     if tickloop::is_after(next, now) {
//!         now = next; // "sleep" until the next deadline
//!     }
//! }
//! assert_eq!(now, DefaultTickRate::secs_to_ticks(2));
//! ```
//!
//! # Ports
//!
//! Every loop is parameterized by a [`Port`], which supplies the critical
//! section protecting the loop's queue. Use [`SingleContext`] if the loop and
//! its tasks are never touched outside one thread, or
//! [`CriticalSectionPort`] (requires the `critical-section` feature) to share
//! them with interrupt handlers. `tickloop_port_std` provides a port for
//! hosted environments along with a clock and a driver loop.
//!
//! # Memory
//!
//! This crate never allocates. Tasks and loops are owned by the application
//! and can be placed in `static`s, as [`Loop::new`] and [`Task::new`] are
//! `const fn`. The queue borrows the tasks, so the borrow checker ensures that
//! a task outlives any loop it could be linked into.
#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod port;
pub mod sched;
pub mod time;

pub use port::{Port, SingleContext};
pub use sched::{task_fn, Loop, Pending, Task, TaskFn};
pub use time::{
    check_ticks_per_sec, diff, extend, is_after, is_before, BadTickRateError, DefaultTickRate,
    TickRate, Ticks, DEFAULT_TICKS_PER_SEC, MAX_DIFF, MAX_TICKS_PER_SEC, MIN_TICKS_PER_SEC,
};

#[cfg(any(feature = "critical-section", test))]
pub use port::CriticalSectionPort;
