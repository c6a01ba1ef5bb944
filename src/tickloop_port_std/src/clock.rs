//! Monotonic clock
use std::time::{Duration, Instant};
use tickloop::{check_ticks_per_sec, extend, BadTickRateError, Ticks, DEFAULT_TICKS_PER_SEC};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Measures the time elapsed since its creation in ticks.
///
/// Internally, the tick count is 64 bits wide and never wraps around. The
/// lower 32 bits of it form the [`Ticks`] values consumed by `tickloop`.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    /// The instant at which the 64-bit tick count equals `start`
    origin: Instant,
    start: u64,
    ticks_per_sec: u32,
}

impl Clock {
    /// Construct a `Clock` ticking at [`DEFAULT_TICKS_PER_SEC`], starting at
    /// zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            start: 0,
            ticks_per_sec: DEFAULT_TICKS_PER_SEC,
        }
    }

    /// Construct a `Clock` ticking at the specified rate, starting at zero.
    pub fn with_tick_rate(ticks_per_sec: u32) -> Result<Self, BadTickRateError> {
        Ok(Self {
            ticks_per_sec: check_ticks_per_sec(ticks_per_sec)?,
            ..Self::new()
        })
    }

    /// Offset the clock so that it reads `ticks` now.
    ///
    /// Useful for exercising the wraparound of [`Ticks`].
    pub fn starting_at(self, ticks: u64) -> Self {
        Self {
            origin: Instant::now(),
            start: ticks,
            ..self
        }
    }

    /// Get the tick rate.
    #[inline]
    pub fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }

    /// Get the current tick count.
    #[inline]
    pub fn now(&self) -> Ticks {
        self.now_wide() as Ticks
    }

    /// Get the current tick count, 64 bits wide.
    #[inline]
    pub fn now_wide(&self) -> u64 {
        self.ticks_at(Instant::now())
    }

    /// Get the 64-bit tick count at `instant`, rounding down.
    ///
    /// Instants preceding the creation of the clock map to its starting
    /// count.
    pub fn ticks_at(&self, instant: Instant) -> u64 {
        let elapsed = instant.saturating_duration_since(self.origin);
        let ticks = elapsed.as_nanos() * u128::from(self.ticks_per_sec) / NANOS_PER_SEC;
        self.start
            .saturating_add(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    /// Get the earliest instant at which the clock reads `ticks`.
    ///
    /// `ticks` is interpreted as the value closest to the current tick count
    /// ([`tickloop::extend`]), so it must be within [`tickloop::MAX_DIFF`]
    /// ticks of it. A past tick value is returned as a past instant.
    pub fn instant_at(&self, ticks: Ticks) -> Instant {
        let wide = extend(ticks, self.now_wide());
        let Some(elapsed) = wide.checked_sub(self.start) else {
            return self.origin;
        };

        // Round up so that `ticks_at` gives back `wide`
        let tps = u128::from(self.ticks_per_sec);
        let nanos = (u128::from(elapsed) * NANOS_PER_SEC).div_ceil(tps);
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        self.origin + Duration::from_nanos(nanos)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use tickloop::{DefaultTickRate, MAX_DIFF};

    #[test]
    fn bad_tick_rate() {
        let e = Clock::with_tick_rate(1_000).unwrap_err();
        assert_eq!(e.ticks_per_sec(), 1_000);
        assert!(Clock::with_tick_rate(64_517).is_err());
        assert_eq!(Clock::with_tick_rate(10_000).unwrap().ticks_per_sec(), 10_000);
    }

    #[test]
    fn advances() {
        let clock = Clock::new();
        let t0 = clock.now_wide();
        std::thread::sleep(Duration::from_millis(20));
        let t1 = clock.now_wide();
        assert!(t1 - t0 >= u64::from(DefaultTickRate::ms_to_ticks(20)));
    }

    #[test]
    fn ticks_at_origin() {
        let clock = Clock::new().starting_at(1234);
        assert_eq!(clock.ticks_at(clock.origin), 1234);
        assert_eq!(clock.ticks_at(clock.origin + Duration::from_secs(1)), 1234 + 32_768);
        assert_eq!(clock.instant_at(1234), clock.origin);
    }

    #[test]
    fn instant_at_wraparound() {
        let clock = Clock::new().starting_at(u64::from(u32::MAX) - 10);
        let instant = clock.instant_at(20);
        assert_eq!(clock.ticks_at(instant), u64::from(u32::MAX) + 21);
        assert!(instant > clock.origin);
    }

    #[test]
    fn instant_before_start() {
        let clock = Clock::new().starting_at(5);
        // Wraps to "before the start of the count"
        assert_eq!(clock.instant_at(0u32.wrapping_sub(100)), clock.origin);
    }

    #[quickcheck]
    fn instant_at_round_trip(delta: u32, tps: u16) -> bool {
        let tps = u32::from(tps).clamp(10_000, 64_516);
        let clock = Clock::with_tick_rate(tps).unwrap().starting_at(1 << 40);
        let ticks = (1u64 << 40).wrapping_add(u64::from(1 + delta % (MAX_DIFF - 1))) as Ticks;
        let instant = clock.instant_at(ticks);

        // The earliest instant, so a nanosecond earlier reads one tick less
        clock.ticks_at(instant) as Ticks == ticks
            && clock.ticks_at(instant - Duration::from_nanos(1)) as Ticks
                == ticks.wrapping_sub(1)
    }
}
