//! Runs [`tickloop`] loops in a hosted environment.
//!
//! This crate provides the three pieces a bare-metal application would
//! implement by itself:
//!
//!  - [`StdPort`], a [`Port`] that can be shared between threads and wakes a
//!    sleeping driver whenever a task is scheduled.
//!  - [`Clock`], which reads [`Instant::now`] as [`Ticks`] and converts tick
//!    values back to [`Instant`]s.
//!  - [`Driver`], the loop that steps a [`Loop`] and sleeps until the returned
//!    deadline.
//!
//! ```no_run
//! use tickloop::{DefaultTickRate, Loop, Task, Ticks};
//! use tickloop_port_std::{Clock, Driver, StdPort};
//!
//! fn say_hello<'a>(now: Ticks, task: &'a Task<'a, StdPort>) {
//!     println!("Hello world, the time is {now} ticks");
//!     task.reschedule(now.wrapping_add(DefaultTickRate::secs_to_ticks(1)));
//! }
//!
//! let clock = Clock::new();
//! let lp = Loop::new(StdPort::new());
//! let hello = Task::new(&lp);
//! hello.schedule(clock.now(), &say_hello, 0);
//!
//! Driver::new(&lp, clock).run();
//! ```
//!
//! [`Port`]: tickloop::Port
//! [`Ticks`]: tickloop::Ticks
//! [`Loop`]: tickloop::Loop
#![deny(unsafe_op_in_unsafe_fn)]
use spin::Mutex as SpinMutex;
use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};
use tickloop::{Port, Task, Ticks};

mod clock;
mod driver;

pub use clock::Clock;
pub use driver::Driver;

/// Re-exported for convenience.
pub use tickloop;

/// A [`Port`] for loops shared between threads.
///
/// The critical section is a spinlock. It's only held for the short, bounded
/// regions in which `tickloop` manipulates the queue, so contention is brief.
///
/// `StdPort` also carries a wake signal. [`Task::schedule`] raises it through
/// [`Port::wake`], which interrupts a [`Driver`] waiting in
/// [`wait_until`](Self::wait_until).
///
/// [`Task::schedule`]: tickloop::Task::schedule
pub struct StdPort {
    cs: SpinMutex<()>,

    /// Set by `notify`, cleared by `wait_until`
    woken: Mutex<bool>,
    woken_cvar: Condvar,
}

impl StdPort {
    pub const fn new() -> Self {
        Self {
            cs: SpinMutex::new(()),
            woken: Mutex::new(false),
            woken_cvar: Condvar::new(),
        }
    }

    /// Raise the wake signal.
    ///
    /// If a thread is blocked in [`wait_until`](Self::wait_until), it returns
    /// `true` immediately. Otherwise, the next call to `wait_until` does.
    pub fn notify(&self) {
        *self.lock_woken() = true;
        self.woken_cvar.notify_all();
    }

    /// Block the current thread until `deadline` or until the wake signal is
    /// raised, whichever comes first.
    ///
    /// Returns `true` if the wait was cut short by the wake signal. The
    /// signal is cleared on return.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut woken = self.lock_woken();
        loop {
            if std::mem::take(&mut *woken) {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            woken = self
                .woken_cvar
                .wait_timeout(woken, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn lock_woken(&self) -> MutexGuard<'_, bool> {
        // The flag is a plain `bool`, so a panic while holding the lock can't
        // leave it inconsistent
        self.woken.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StdPort {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StdPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdPort")
            .field("woken", &*self.lock_woken())
            .finish_non_exhaustive()
    }
}

// Safety: `cs` is held from `enter_critical` until `exit_critical`, so at most
//         one thread is inside the critical section at a time. `StdPort` is
//         `Sync` and so is `Callback`.
unsafe impl Port for StdPort {
    type Callback<'a> = dyn Fn(Ticks, &'a Task<'a, Self>) + Sync + 'a;

    #[inline]
    fn enter_critical(&self) {
        // Leak the guard; `exit_critical` unlocks the mutex
        std::mem::forget(self.cs.lock());
    }

    #[inline]
    unsafe fn exit_critical(&self) {
        // Safety: The caller holds the lock acquired by `enter_critical`
        unsafe { self.cs.force_unlock() };
    }

    fn wake(&self) {
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn wait_until_deadline() {
        let port = StdPort::new();
        let start = Instant::now();
        assert!(!port.wait_until(start + Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));

        // Already passed
        assert!(!port.wait_until(start));
    }

    #[test]
    fn notify_before_wait() {
        let port = StdPort::new();
        port.notify();
        assert!(port.wait_until(Instant::now() + Duration::from_secs(60)));

        // The signal was consumed
        assert!(!port.wait_until(Instant::now()));
    }

    #[test]
    fn notify_from_another_thread() {
        let port = StdPort::new();
        let start = Instant::now();
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                port.notify();
            });
            assert!(port.wait_until(start + Duration::from_secs(60)));
        });
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn critical_section_excludes() {
        let port = StdPort::new();
        let counter = std::cell::UnsafeCell::new(0u32);

        struct Shared<'a>(&'a std::cell::UnsafeCell<u32>);
        // Safety: Only accessed inside the critical section
        unsafe impl Sync for Shared<'_> {}
        let shared = Shared(&counter);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let shared = &shared;
                    for _ in 0..1000 {
                        port.enter_critical();
                        // Safety: We are in the critical section
                        unsafe { *shared.0.get() += 1 };
                        // Safety: Entered above
                        unsafe { port.exit_critical() };
                    }
                });
            }
        });

        assert_eq!(counter.into_inner(), 4000);
    }
}
