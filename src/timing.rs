//! High-resolution sleeping for the driver control loop.
//!
//! `std::thread::sleep` is only accurate to the scheduler tick (often 1 ms,
//! up to ~15 ms on Windows). The driver ticks every few hundred microseconds,
//! so we let the OS sleep through the bulk of the interval and spin on the
//! monotonic clock for the remainder.

use std::time::{Duration, Instant};

/// Default window at the end of a sleep spent busy-waiting
pub const DEFAULT_SPIN_WINDOW: Duration = Duration::from_millis(1);

/// Sleeper with a configurable busy-wait tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreciseSleeper {
    spin_window: Duration,
}

impl Default for PreciseSleeper {
    fn default() -> Self {
        Self {
            spin_window: DEFAULT_SPIN_WINDOW,
        }
    }
}

impl PreciseSleeper {
    pub fn new(spin_window: Duration) -> Self {
        Self { spin_window }
    }

    pub fn spin_window(&self) -> Duration {
        self.spin_window
    }

    /// Block the calling thread for `duration`.
    pub fn sleep(&self, duration: Duration) {
        self.sleep_until(Instant::now() + duration);
    }

    /// Block the calling thread until `deadline`.
    pub fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline <= now {
            return;
        }

        let remaining = deadline - now;
        if remaining > self.spin_window {
            std::thread::sleep(remaining - self.spin_window);
        }

        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// Sleep for `duration` using the default spin window.
pub fn precise_sleep(duration: Duration) {
    PreciseSleeper::default().sleep(duration);
}

/// Convert a tick length in seconds to a `Duration`, treating non-finite or
/// negative values as zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
