//! The driver loop
use tickloop::Loop;

use crate::{Clock, StdPort};

/// Steps a [`Loop`] with the readings of a [`Clock`], blocking the current
/// thread while no task is due.
///
/// The sleep ends early when a task of the loop is scheduled from another
/// thread (or when [`StdPort::notify`] is called), so the new task is taken
/// into account right away.
#[derive(Debug)]
pub struct Driver<'a> {
    lp: &'a Loop<'a, StdPort>,
    clock: Clock,
}

impl<'a> Driver<'a> {
    pub fn new(lp: &'a Loop<'a, StdPort>, clock: Clock) -> Self {
        Self { lp, clock }
    }

    /// The clock the loop is stepped with. Use it to compute due times for
    /// tasks scheduled while the driver is running.
    #[inline]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The loop being driven.
    #[inline]
    pub fn event_loop(&self) -> &'a Loop<'a, StdPort> {
        self.lp
    }

    /// Step the loop once. If no task was due, sleep until the time returned
    /// by [`Loop::step`] or until woken up.
    ///
    /// Returns `true` if a task was dispatched.
    pub fn run_once(&self) -> bool {
        let now = self.clock.now();
        let next = self.lp.step(now);
        if next == now {
            return true;
        }

        let deadline = self.clock.instant_at(next);
        let woken = self.lp.port().wait_until(deadline);
        log::trace!("slept from {now} until {next}; woken early = {woken}");

        false
    }

    /// Run the loop until `done` returns `true`.
    ///
    /// `done` is only evaluated between steps. If another thread is
    /// responsible for the condition changing, it must call
    /// [`StdPort::notify`] afterwards, or the driver may keep sleeping until
    /// the next task is due.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        while !done() {
            self.run_once();
        }
    }

    /// Run the loop forever.
    pub fn run(&self) -> ! {
        loop {
            self.run_once();
        }
    }
}
