//! Tick values and the arithmetic used to order them.
//!
//! # Ticks
//!
//! **A tick value** ([`Ticks`]) is a 32-bit counter that advances at a fixed
//! rate and silently wraps around on overflow. No tick value is absolute: the
//! chronological order of two values is determined by the signed distance
//! between them ([`diff`]), not by their numeric order.
//!
//! This line represents the value range of [`Ticks`]. Relative to any tick
//! value `a`, the other values are split into two halves:
//!
//! ```text
//!        a - MAX_DIFF - 1         a          a + MAX_DIFF
//! ═════════════╤══════════════════╤══════════════════╤════════════
//!              │░░░░░░ before ░░░░│▓▓▓▓▓ after ▓▓▓▓▓▓│
//! ```
//!
//! The order is only meaningful when the true distance between the compared
//! values never exceeds [`MAX_DIFF`]. It's the application's responsibility
//! not to schedule anything farther than that into the future.
//!
//! # Conversions
//!
//! [`TickRate`] converts between ticks and seconds, milliseconds, and
//! microseconds. The tick rate is a const generic parameter, so an invalid
//! rate is rejected when the program is built.
use core::fmt;

/// A wrapping tick count.
pub type Ticks = u32;

/// The largest positive distance between two tick values.
///
/// This is the scheduling horizon. [`Loop::step`] also uses it to produce the
/// "no task pending" deadline.
///
/// [`Loop::step`]: crate::Loop::step
pub const MAX_DIFF: Ticks = i32::MAX as Ticks;

/// Get the signed distance from `a` to `b`.
#[inline]
pub const fn diff(a: Ticks, b: Ticks) -> i32 {
    b.wrapping_sub(a) as i32
}

/// Return `true` if `a` is chronologically after `b`.
#[inline]
pub const fn is_after(a: Ticks, b: Ticks) -> bool {
    diff(a, b) < 0
}

/// Return `true` if `a` is chronologically before `b`.
#[inline]
pub const fn is_before(a: Ticks, b: Ticks) -> bool {
    diff(a, b) > 0
}

/// Compare two tick values chronologically.
#[inline]
pub fn cmp(a: Ticks, b: Ticks) -> core::cmp::Ordering {
    0.cmp(&diff(a, b))
}

/// Widen `ticks` to 64 bits, picking the value closest to `reference` whose
/// lower 32 bits equal `ticks`.
///
/// Saturates at zero if `ticks` lies before the start of the 64-bit count.
#[inline]
pub const fn extend(ticks: Ticks, reference: u64) -> u64 {
    reference.saturating_add_signed(diff(reference as Ticks, ticks) as i64)
}

// Tick rates
// ---------------------------------------------------------------------------

/// The lowest allowed tick rate. One tick is 100μs long.
pub const MIN_TICKS_PER_SEC: u32 = 10_000;

/// The highest allowed tick rate. One tick is 15.5μs long.
pub const MAX_TICKS_PER_SEC: u32 = 64_516;

/// The tick rate used when nothing else is configured.
pub const DEFAULT_TICKS_PER_SEC: u32 = 32_768;

/// [`TickRate`] with [`DEFAULT_TICKS_PER_SEC`].
pub type DefaultTickRate = TickRate<DEFAULT_TICKS_PER_SEC>;

/// The error type returned by [`check_ticks_per_sec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadTickRateError {
    ticks_per_sec: u32,
}

impl BadTickRateError {
    /// Get the rejected tick rate.
    #[inline]
    pub const fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }
}

impl fmt::Display for BadTickRateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "illegal tick rate {} (must be in range [{}:{}]; one tick must be 15.5us .. 100us long)",
            self.ticks_per_sec, MIN_TICKS_PER_SEC, MAX_TICKS_PER_SEC,
        )
    }
}

impl core::error::Error for BadTickRateError {}

/// Validate a tick rate chosen at initialization time.
pub const fn check_ticks_per_sec(ticks_per_sec: u32) -> Result<u32, BadTickRateError> {
    if ticks_per_sec < MIN_TICKS_PER_SEC || ticks_per_sec > MAX_TICKS_PER_SEC {
        Err(BadTickRateError { ticks_per_sec })
    } else {
        Ok(ticks_per_sec)
    }
}

/// Conversions between ticks and real time units at `RATE` ticks per second.
///
/// All conversions compute in 64 bits and truncate the result to 32 bits.
/// Referring to any of them with a `RATE` outside
/// `MIN_TICKS_PER_SEC..=MAX_TICKS_PER_SEC` fails constant evaluation:
///
/// ```compile_fail
/// const _: u32 = tickloop::TickRate::<1_000>::ms_to_ticks(1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickRate<const RATE: u32>;

impl<const RATE: u32> TickRate<RATE> {
    /// The tick rate. Evaluating this constant checks `RATE`.
    pub const TICKS_PER_SEC: u32 = if let Ok(x) = check_ticks_per_sec(RATE) {
        x
    } else {
        panic!("illegal tick rate; one tick must be 15.5us .. 100us long")
    };

    const TPS: u64 = Self::TICKS_PER_SEC as u64;

    /// Convert microseconds to ticks, rounding down.
    #[inline]
    pub const fn us_to_ticks(us: u32) -> Ticks {
        (us as u64 * Self::TPS / 1_000_000) as Ticks
    }

    /// Convert milliseconds to ticks, rounding down.
    #[inline]
    pub const fn ms_to_ticks(ms: u32) -> Ticks {
        (ms as u64 * Self::TPS / 1_000) as Ticks
    }

    /// Convert seconds to ticks.
    #[inline]
    pub const fn secs_to_ticks(secs: u32) -> Ticks {
        (secs as u64 * Self::TPS) as Ticks
    }

    /// Convert microseconds to ticks, rounding up.
    #[inline]
    pub const fn us_to_ticks_ceil(us: u32) -> Ticks {
        ((us as u64 * Self::TPS + 999_999) / 1_000_000) as Ticks
    }

    /// Convert milliseconds to ticks, rounding up.
    #[inline]
    pub const fn ms_to_ticks_ceil(ms: u32) -> Ticks {
        ((ms as u64 * Self::TPS + 999) / 1_000) as Ticks
    }

    /// Convert microseconds to ticks, rounding to the nearest tick.
    #[inline]
    pub const fn us_to_ticks_round(us: u32) -> Ticks {
        ((us as u64 * Self::TPS + 500_000) / 1_000_000) as Ticks
    }

    /// Convert milliseconds to ticks, rounding to the nearest tick.
    #[inline]
    pub const fn ms_to_ticks_round(ms: u32) -> Ticks {
        ((ms as u64 * Self::TPS + 500) / 1_000) as Ticks
    }

    /// Convert ticks to whole seconds, rounding down.
    #[inline]
    pub const fn ticks_to_secs(ticks: Ticks) -> u32 {
        (ticks as u64 / Self::TPS) as u32
    }

    /// Convert ticks to whole seconds, rounding up.
    #[inline]
    pub const fn ticks_to_secs_ceil(ticks: Ticks) -> u32 {
        ((ticks as u64 + (Self::TPS - 1)) / Self::TPS) as u32
    }

    /// Convert ticks to milliseconds, rounding down.
    #[inline]
    pub const fn ticks_to_ms(ticks: Ticks) -> u32 {
        (ticks as u64 * 1_000 / Self::TPS) as u32
    }

    /// Convert ticks to microseconds, rounding down.
    #[inline]
    pub const fn ticks_to_us(ticks: Ticks) -> u32 {
        (ticks as u64 * 1_000_000 / Self::TPS) as u32
    }
}
