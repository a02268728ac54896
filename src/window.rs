//! # Experiment Window
//!
//! A global start tick plus a fixed duration. Workload tasks check it once
//! per cycle and stop themselves once it has elapsed; nothing cancels them
//! from outside.

use crate::config::{ms_to_ticks, ticks_to_ms, Tick};

/// Immutable time window shared by every workload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentWindow {
    start: Tick,
    duration_ms: u32,
}

impl ExperimentWindow {
    /// Open a window of `duration_ms` starting at tick `start`.
    pub const fn new(start: Tick, duration_ms: u32) -> Self {
        Self { start, duration_ms }
    }

    #[inline]
    pub const fn start(&self) -> Tick {
        self.start
    }

    #[inline]
    pub const fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Milliseconds since the window opened. Ticks before the start count
    /// as zero.
    #[inline]
    pub fn elapsed_ms(&self, now: Tick) -> u64 {
        ticks_to_ms(now.saturating_sub(self.start))
    }

    /// Whether the window is over at tick `now`.
    #[inline]
    pub fn is_elapsed(&self, now: Tick) -> bool {
        now.saturating_sub(self.start) >= ms_to_ticks(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_boundaries() {
        let w = ExperimentWindow::new(100, 2000);
        assert!(!w.is_elapsed(100));
        assert!(!w.is_elapsed(2099));
        assert!(w.is_elapsed(2100));
        assert_eq!(w.elapsed_ms(2100), 2000);
    }

    #[test]
    fn test_ticks_before_start_are_not_elapsed() {
        let w = ExperimentWindow::new(500, 10);
        assert_eq!(w.elapsed_ms(0), 0);
        assert!(!w.is_elapsed(0));
    }
}
