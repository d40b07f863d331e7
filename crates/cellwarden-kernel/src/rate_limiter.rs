//! [`RateLimiter`] – sliding-window admission control for mutating actions.
//!
//! The window itself is the state: an ordered sequence of the timestamps of
//! previously admitted actions. On every check, timestamps older than one
//! hour are evicted from the front (the deque is time-ordered by
//! construction, so eviction is a prefix trim), and admission succeeds while
//! the remaining count is strictly below the hourly cap.
//!
//! `Wait` decisions and unrecognized decision text never reach this type –
//! only mutating actions consume budget.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use cellwarden_kernel::RateLimiter;
//!
//! let mut limiter = RateLimiter::new(2);
//! let now = Utc::now();
//!
//! assert!(limiter.admit(now));
//! limiter.record(now);
//! assert!(limiter.admit(now));
//! limiter.record(now);
//! assert!(!limiter.admit(now)); // cap reached
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Length of the admission window.
fn window() -> Duration {
    Duration::hours(1)
}

/// Sliding one-hour counter gating mutating actions.
///
/// The clock is always passed in, so tests can drive arbitrary timings.
pub struct RateLimiter {
    cap: u32,
    admitted: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `cap` actions per trailing hour.
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            admitted: VecDeque::new(),
        }
    }

    /// `true` when another action may run at `now`.
    ///
    /// Evicts expired timestamps as a side effect; does **not** consume
    /// budget – call [`record`][Self::record] once the action is actually
    /// dispatched.
    pub fn admit(&mut self, now: DateTime<Utc>) -> bool {
        self.evict(now);
        (self.admitted.len() as u32) < self.cap
    }

    /// Consume one unit of budget at `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.admitted.push_back(now);
    }

    /// Convenience for the control loop's pre-check: the budget is already
    /// spent and no action could be admitted this cycle.
    pub fn exhausted(&mut self, now: DateTime<Utc>) -> bool {
        !self.admit(now)
    }

    /// Number of admissions currently inside the window.
    pub fn in_window(&mut self, now: DateTime<Utc>) -> usize {
        self.evict(now);
        self.admitted.len()
    }

    /// The configured hourly cap.
    pub fn cap(&self) -> u32 {
        self.cap
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - window();
        while matches!(self.admitted.front(), Some(ts) if *ts < cutoff) {
            self.admitted.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn admits_until_cap() {
        let mut limiter = RateLimiter::new(3);
        let now = t0();
        for _ in 0..3 {
            assert!(limiter.admit(now));
            limiter.record(now);
        }
        assert!(!limiter.admit(now));
    }

    #[test]
    fn zero_cap_never_admits() {
        let mut limiter = RateLimiter::new(0);
        assert!(!limiter.admit(t0()));
        assert!(limiter.exhausted(t0()));
    }

    #[test]
    fn expired_timestamps_are_evicted_from_front() {
        let mut limiter = RateLimiter::new(2);
        let now = t0();
        limiter.record(now);
        limiter.record(now + Duration::minutes(30));
        // 61 minutes later the first entry has left the window.
        let later = now + Duration::minutes(61);
        assert!(limiter.admit(later));
        assert_eq!(limiter.in_window(later), 1);
    }

    #[test]
    fn entry_exactly_one_hour_old_still_counts() {
        // Eviction is strictly-older-than; the boundary entry remains.
        let mut limiter = RateLimiter::new(1);
        let now = t0();
        limiter.record(now);
        assert!(!limiter.admit(now + Duration::hours(1)));
        assert!(limiter.admit(now + Duration::hours(1) + Duration::seconds(1)));
    }

    #[test]
    fn no_trailing_window_ever_exceeds_cap() {
        // Drive an arbitrary-looking admission schedule through the limiter
        // and verify the invariant after every step: the count of recorded
        // timestamps inside any trailing one-hour window never exceeds cap.
        const CAP: u32 = 4;
        let mut limiter = RateLimiter::new(CAP);
        let mut recorded: Vec<DateTime<Utc>> = Vec::new();

        let offsets_min: &[i64] = &[0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 59, 60, 61, 89, 120, 121, 122, 123, 124, 180];
        for &m in offsets_min {
            let now = t0() + Duration::minutes(m);
            if limiter.admit(now) {
                limiter.record(now);
                recorded.push(now);
            }
            // Invariant check over every trailing window ending at a
            // recorded timestamp.
            for &end in &recorded {
                let in_window = recorded
                    .iter()
                    .filter(|ts| **ts > end - Duration::hours(1) && **ts <= end)
                    .count();
                assert!(
                    in_window as u32 <= CAP,
                    "window ending at {end} holds {in_window} > cap {CAP}"
                );
            }
        }
        assert!(!recorded.is_empty());
    }

    #[test]
    fn budget_recovers_as_window_slides() {
        let mut limiter = RateLimiter::new(2);
        let now = t0();
        limiter.record(now);
        limiter.record(now + Duration::minutes(10));
        assert!(!limiter.admit(now + Duration::minutes(20)));
        // First entry expires…
        assert!(limiter.admit(now + Duration::minutes(61)));
        limiter.record(now + Duration::minutes(61));
        // …but the second has not, so the cap holds again.
        assert!(!limiter.admit(now + Duration::minutes(65)));
    }
}
