//! Platform bindings and the locking mechanism built on them
use core::{cell::UnsafeCell, fmt, marker::PhantomData};

use crate::{sched::Task, time::Ticks};

/// Supplies the critical section that guards a [`Loop`]'s queue and the
/// state of every [`Task`] bound to it.
///
/// [`Loop`]: crate::Loop
/// [`Task`]: crate::Task
///
/// The scheduler enters the critical section only for short, bounded regions
/// and never calls back into application code from inside one. In particular,
/// it never enters the critical section of the same port twice from one
/// context, so implementations don't have to support nesting.
///
/// # Safety
///
/// If `Self` is `Sync`:
///
///  - From the return of [`enter_critical`] until the matching call to
///    [`exit_critical`], no other context may return from `enter_critical` on
///    the same instance.
///  - [`Callback`] must be `Sync`. A task can be dispatched by a context other
///    than the one that scheduled it.
///
/// A `!Sync` implementation can't be shared between contexts, so its critical
/// section may do nothing at all, and its callbacks don't have to be `Sync`.
///
/// [`enter_critical`]: Self::enter_critical
/// [`exit_critical`]: Self::exit_critical
/// [`Callback`]: Self::Callback
pub unsafe trait Port: Sized {
    /// The callback type of the tasks bound to a loop using this port,
    /// usually `dyn Fn(Ticks, &'a Task<'a, Self>) + 'a`, plus `Sync` if the
    /// port is `Sync`.
    type Callback<'a>: ?Sized + Fn(Ticks, &'a Task<'a, Self>) + 'a
    where
        Self: 'a;

    /// Enter the critical section, waiting for other contexts to leave it
    /// if necessary.
    fn enter_critical(&self);

    /// Leave the critical section.
    ///
    /// # Safety
    ///
    /// The calling context must be inside the critical section entered by
    /// [`Self::enter_critical`].
    unsafe fn exit_critical(&self);

    /// Called by [`Task::schedule`] after it leaves the critical section.
    ///
    /// A port driving a sleeping event loop can use this to cut the sleep
    /// short. The default implementation does nothing.
    ///
    /// [`Task::schedule`]: crate::Task::schedule
    #[inline]
    fn wake(&self) {}
}

/// RAII guard for a critical section of `P`.
///
/// Possessing `&CsGuard` is what grants access to [`CsCell`]s.
pub(crate) struct CsGuard<'p, P: Port> {
    port: &'p P,
}

impl<'p, P: Port> CsGuard<'p, P> {
    #[inline]
    pub(crate) fn new(port: &'p P) -> Self {
        port.enter_critical();
        Self { port }
    }
}

impl<P: Port> Drop for CsGuard<'_, P> {
    #[inline]
    fn drop(&mut self) {
        // Safety: `self` was created by `CsGuard::new`, which entered the
        //         critical section, and this is the only place leaving it
        unsafe { self.port.exit_critical() };
    }
}

/// Cell type that can only be accessed inside a critical section.
///
/// The cell doesn't remember which port guards it. Every cell reachable from a
/// `Loop` must only ever be accessed with a guard of that `Loop`'s port.
pub(crate) struct CsCell<T>(UnsafeCell<T>);

// Safety: The contents are only reachable through methods taking `&CsGuard`,
//         and the critical section serializes those accesses
unsafe impl<T: Send> Sync for CsCell<T> {}

impl<T: Copy> CsCell<T> {
    #[inline]
    pub(crate) const fn new(x: T) -> Self {
        Self(UnsafeCell::new(x))
    }

    #[inline]
    pub(crate) fn get<P: Port>(&self, _cs: &CsGuard<'_, P>) -> T {
        // Safety: We are in the critical section, and no reference to the
        //         contents outlives this call
        unsafe { *self.0.get() }
    }

    #[inline]
    pub(crate) fn set<P: Port>(&self, _cs: &CsGuard<'_, P>, x: T) {
        // Safety: See `get`
        unsafe { *self.0.get() = x };
    }

    #[inline]
    pub(crate) fn replace<P: Port>(&self, _cs: &CsGuard<'_, P>, x: T) -> T {
        // Safety: See `get`
        unsafe { core::mem::replace(&mut *self.0.get(), x) }
    }
}

// Ports
// ---------------------------------------------------------------------------

/// A [`Port`] for loops that are only ever touched by a single thread and
/// never from an interrupt handler.
///
/// The critical section is a no-op. `SingleContext` is `!Sync`, so neither
/// the loop nor its tasks can be shared with another thread.
#[derive(Default)]
pub struct SingleContext {
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl SingleContext {
    pub const fn new() -> Self {
        Self {
            _not_sync: PhantomData,
        }
    }
}

impl fmt::Debug for SingleContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SingleContext")
    }
}

// Safety: `SingleContext` is `!Sync`
unsafe impl Port for SingleContext {
    type Callback<'a> = dyn Fn(Ticks, &'a Task<'a, Self>) + 'a;

    #[inline]
    fn enter_critical(&self) {}

    #[inline]
    unsafe fn exit_critical(&self) {}
}

/// A [`Port`] backed by the global critical section of the
/// [`critical-section`] crate, e.g., one that masks interrupts.
///
/// Loops using this port can be placed in `static`s and fed from interrupt
/// handlers.
///
/// [`critical-section`]: https://crates.io/crates/critical-section
#[cfg(any(feature = "critical-section", test))]
pub struct CriticalSectionPort {
    /// The state to restore on leaving. Only accessed inside the critical
    /// section.
    restore_state: UnsafeCell<critical_section::RestoreState>,
}

// Safety: `restore_state` is only accessed inside the critical section
#[cfg(any(feature = "critical-section", test))]
unsafe impl Sync for CriticalSectionPort {}

#[cfg(any(feature = "critical-section", test))]
impl CriticalSectionPort {
    pub const fn new() -> Self {
        Self {
            restore_state: UnsafeCell::new(critical_section::RestoreState::invalid()),
        }
    }
}

#[cfg(any(feature = "critical-section", test))]
impl Default for CriticalSectionPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(feature = "critical-section", test))]
impl fmt::Debug for CriticalSectionPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("CriticalSectionPort")
    }
}

// Safety: `critical_section::acquire` provides mutual exclusion between all
//         contexts of the program, and `Callback` is `Sync`
#[cfg(any(feature = "critical-section", test))]
unsafe impl Port for CriticalSectionPort {
    type Callback<'a> = dyn Fn(Ticks, &'a Task<'a, Self>) + Sync + 'a;

    #[inline]
    fn enter_critical(&self) {
        // Safety: Released by `exit_critical`. The scheduler never nests the
        //         critical section, so acquire/release calls are properly paired
        let restore_state = unsafe { critical_section::acquire() };

        // Safety: We are in the critical section now
        unsafe { *self.restore_state.get() = restore_state };
    }

    #[inline]
    unsafe fn exit_critical(&self) {
        // Safety: The caller is in the critical section
        let restore_state = unsafe { *self.restore_state.get() };

        // Safety: `restore_state` came from the matching `acquire`
        unsafe { critical_section::release(restore_state) };
    }
}
