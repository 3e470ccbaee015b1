use core::sync::atomic::{AtomicU32, Ordering};

/// System tick counter
///
/// Incremented from the periodic tick interrupt, read from any context.
/// Wraps around after `u32::MAX` ticks (~49 days at 1 kHz), use
/// [`Clock::elapsed`] to compute time differences.
#[derive(Debug, Default)]
pub struct Clock {
    ticks: AtomicU32,
}

impl Clock {
    pub const fn new() -> Self {
        Self { ticks: AtomicU32::new(0) }
    }

    /// Advance the clock by one tick, returns the new time
    pub fn tick(&self) -> u32 {
        // Single writer, so load+store does not need read-modify-write atomics
        let now = self.ticks.load(Ordering::Relaxed).wrapping_add(1);
        self.ticks.store(now, Ordering::Relaxed);
        now
    }

    pub fn now(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks since `since`, correct across a single wrap-around
    pub fn elapsed(&self, since: u32) -> u32 {
        self.now().wrapping_sub(since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticking() {
        let clock = Clock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.now(), 2);
        assert_eq!(clock.elapsed(0), 2);
    }

    #[test]
    fn wrap_around() {
        let clock = Clock { ticks: AtomicU32::new(u32::MAX - 1) };
        let start = clock.now();
        clock.tick();
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.elapsed(start), 2);
        clock.tick();
        assert_eq!(clock.elapsed(start), 3);
    }
}
