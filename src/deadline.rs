//! Absolute wake-up times for the fixed-rate loop.
//!
//! The loop sleeps until an absolute point on the monotonic clock and then moves that point
//! forward by exactly one period, so that the time spent inside a cycle does not accumulate
//! as drift.

use std::time::Duration;

pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Absolute monotonic time, split like `timespec`. `nsec` is always within `[0, 1e9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    pub sec: i64,
    pub nsec: i64,
}

impl Deadline {
    /// Builds a deadline, carrying any nanosecond overflow (or underflow) into seconds.
    pub fn new(sec: i64, nsec: i64) -> Self {
        Deadline {
            sec: sec + nsec.div_euclid(NSEC_PER_SEC),
            nsec: nsec.rem_euclid(NSEC_PER_SEC),
        }
    }

    /// Current time of the monotonic clock.
    pub fn now() -> Self {
        monotonic_now()
    }

    /// Moves the deadline forward by `period`. Saturates at the largest representable time.
    pub fn advance(&mut self, period: Duration) {
        let secs = i64::try_from(period.as_secs()).unwrap_or(i64::MAX);
        let nsec = self.nsec + i64::from(period.subsec_nanos());
        *self = Deadline {
            sec: self.sec.saturating_add(secs).saturating_add(nsec / NSEC_PER_SEC),
            nsec: nsec % NSEC_PER_SEC,
        };
    }

    /// Nanoseconds from `other` to `self` (negative if `self` is earlier).
    pub fn diff_ns(&self, other: &Deadline) -> i64 {
        (self.sec - other.sec) * NSEC_PER_SEC + (self.nsec - other.nsec)
    }

    /// Blocks the calling thread until the deadline. Returns at once if it has passed.
    pub fn sleep_until(&self) {
        sleep_until_abs(self)
    }
}

#[cfg(target_os = "linux")]
fn monotonic_now() -> Deadline {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // CLOCK_MONOTONIC is always available on Linux.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    Deadline::new(ts.tv_sec as i64, ts.tv_nsec as i64)
}

#[cfg(target_os = "linux")]
fn sleep_until_abs(deadline: &Deadline) {
    let ts = libc::timespec {
        tv_sec: deadline.sec as libc::time_t,
        tv_nsec: deadline.nsec as _,
    };
    loop {
        let rc = unsafe {
            libc::clock_nanosleep(libc::CLOCK_MONOTONIC, libc::TIMER_ABSTIME, &ts, std::ptr::null_mut())
        };
        // Restart when interrupted by a signal, the deadline stays the same.
        if rc != libc::EINTR {
            break;
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn clock_origin() -> std::time::Instant {
    use std::sync::OnceLock;
    static ORIGIN: OnceLock<std::time::Instant> = OnceLock::new();
    *ORIGIN.get_or_init(std::time::Instant::now)
}

#[cfg(not(target_os = "linux"))]
fn monotonic_now() -> Deadline {
    let elapsed = clock_origin().elapsed();
    Deadline::new(elapsed.as_secs() as i64, elapsed.subsec_nanos() as i64)
}

#[cfg(not(target_os = "linux"))]
fn sleep_until_abs(deadline: &Deadline) {
    let remaining = deadline.diff_ns(&monotonic_now());
    if remaining > 0 {
        std::thread::sleep(Duration::from_nanos(remaining as u64));
    }
}
