//! Rest countdown between sets.
//!
//! The timer stores an absolute deadline rather than a counter, so late or
//! skipped ticks never slow the countdown down. Pausing converts the deadline
//! back into a frozen remainder.

use chrono::{DateTime, Duration, Utc};

/// Default near-expiry alert threshold, in seconds
pub const DEFAULT_ALERT_SECONDS: u32 = 3;

/// What a single tick observed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestTick {
    /// No countdown in progress (never started, finished, or paused)
    Idle,
    Counting { remaining: u32 },
    /// Near-expiry signal; emitted at most once per countdown
    Alert { remaining: u32 },
    /// The countdown reached zero; emitted exactly once per countdown
    Finished,
}

#[derive(Clone, Debug)]
pub struct RestTimer {
    deadline: Option<DateTime<Utc>>,
    remaining: u32,
    /// A countdown exists, running or paused, and has not finished
    armed: bool,
    alerted: bool,
    alert_seconds: u32,
}

impl Default for RestTimer {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_SECONDS)
    }
}

impl RestTimer {
    pub fn new(alert_seconds: u32) -> Self {
        Self {
            deadline: None,
            remaining: 0,
            armed: false,
            alerted: false,
            alert_seconds,
        }
    }

    /// Start a fresh countdown, replacing any in progress
    pub fn start(&mut self, seconds: u32, now: DateTime<Utc>) {
        self.deadline = Some(now + Duration::seconds(i64::from(seconds)));
        self.remaining = seconds;
        self.armed = true;
        self.alerted = false;
        tracing::debug!("Rest timer started for {}s", seconds);
    }

    /// Counting down right now
    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// A countdown exists but is suspended
    pub fn is_paused(&self) -> bool {
        self.armed && self.deadline.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.armed
    }

    /// Seconds left as of the last tick
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> RestTick {
        let Some(deadline) = self.deadline else {
            return RestTick::Idle;
        };

        self.remaining = seconds_until(deadline, now);

        if self.remaining == 0 {
            self.finish();
            return RestTick::Finished;
        }

        if !self.alerted && self.remaining <= self.alert_seconds {
            self.alerted = true;
            return RestTick::Alert {
                remaining: self.remaining,
            };
        }

        RestTick::Counting {
            remaining: self.remaining,
        }
    }

    /// Suspend the countdown, freezing the remaining seconds
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let Some(deadline) = self.deadline.take() {
            self.remaining = seconds_until(deadline, now);
            tracing::debug!("Rest timer paused with {}s left", self.remaining);
        }
    }

    /// Re-arm a paused countdown with its frozen remainder
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.is_paused() {
            self.deadline = Some(now + Duration::seconds(i64::from(self.remaining)));
            tracing::debug!("Rest timer resumed with {}s left", self.remaining);
        }
    }

    /// Add (or with a negative value, remove) time from a live countdown
    pub fn extend(&mut self, seconds: i64, now: DateTime<Utc>) {
        if !self.armed {
            return;
        }
        match self.deadline {
            Some(deadline) => {
                let extended = deadline + Duration::seconds(seconds);
                self.deadline = Some(extended.max(now));
                self.remaining = seconds_until(extended, now);
            }
            None => {
                let adjusted = i64::from(self.remaining) + seconds;
                self.remaining = u32::try_from(adjusted.max(0)).unwrap_or(u32::MAX);
            }
        }
    }

    /// End the countdown immediately
    ///
    /// Returns `true` if a countdown was actually cut short; the caller treats
    /// that as the countdown's one completion.
    pub fn skip(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.finish();
        true
    }

    /// Drop the countdown without signalling completion
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.remaining = 0;
        self.armed = false;
    }

    fn finish(&mut self) {
        self.deadline = None;
        self.remaining = 0;
        self.armed = false;
        tracing::debug!("Rest timer finished");
    }
}

/// Whole seconds from `now` until `deadline`, rounded up, never negative
fn seconds_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let millis = (deadline - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    let seconds = (millis + 999) / 1000;
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(seconds)
    }

    #[test]
    fn test_pause_freezes_countdown() {
        let mut timer = RestTimer::default();
        timer.start(30, t0());
        timer.pause(at(10));
        assert!(timer.is_paused());

        assert_eq!(timer.tick(at(70)), RestTick::Idle);
        timer.resume(at(70));
        assert_eq!(timer.tick(at(70)), RestTick::Counting { remaining: 20 });
    }

    #[test]
    fn test_remaining_rounds_up_partial_seconds() {
        let mut timer = RestTimer::default();
        timer.start(10, t0());
        let tick = timer.tick(t0() + Duration::milliseconds(9_100));
        assert_eq!(tick, RestTick::Alert { remaining: 1 });
    }

    #[test]
    fn test_finishes_exactly_once() {
        let mut timer = RestTimer::default();
        timer.start(5, t0());

        assert_eq!(timer.tick(at(60)), RestTick::Finished);
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());

        assert_eq!(timer.tick(at(61)), RestTick::Idle);
        assert_eq!(timer.tick(at(120)), RestTick::Idle);
    }

    #[test]
    fn test_alert_fires_once_near_expiry() {
        let mut timer = RestTimer::new(3);
        timer.start(10, t0());

        assert_eq!(timer.tick(at(6)), RestTick::Counting { remaining: 4 });
        assert_eq!(timer.tick(at(7)), RestTick::Alert { remaining: 3 });
        assert_eq!(timer.tick(at(8)), RestTick::Counting { remaining: 2 });
        assert_eq!(timer.tick(at(9)), RestTick::Counting { remaining: 1 });
        assert_eq!(timer.tick(at(10)), RestTick::Finished);
    }

    #[test]
    fn test_alert_survives_pause_inside_window() {
        let mut timer = RestTimer::new(3);
        timer.start(10, t0());
        assert_eq!(timer.tick(at(7)), RestTick::Alert { remaining: 3 });
        assert_eq!(timer.tick(at(8)), RestTick::Counting { remaining: 2 });

        timer.pause(at(8));
        timer.resume(at(50));
        assert_eq!(timer.tick(at(50)), RestTick::Counting { remaining: 2 });
        assert_eq!(timer.tick(at(51)), RestTick::Counting { remaining: 1 });
        assert_eq!(timer.tick(at(52)), RestTick::Finished);
    }

    #[test]
    fn test_alert_rearms_for_next_countdown() {
        let mut timer = RestTimer::new(3);
        timer.start(5, t0());
        assert_eq!(timer.tick(at(3)), RestTick::Alert { remaining: 2 });
        assert_eq!(timer.tick(at(5)), RestTick::Finished);

        timer.start(5, at(10));
        assert_eq!(timer.tick(at(13)), RestTick::Alert { remaining: 2 });
    }

    #[test]
    fn test_jump_past_deadline_skips_alert() {
        let mut timer = RestTimer::new(3);
        timer.start(30, t0());
        assert_eq!(timer.tick(at(45)), RestTick::Finished);
    }

    #[test]
    fn test_extend_and_shorten() {
        let mut timer = RestTimer::default();
        timer.start(30, t0());
        timer.extend(15, at(10));
        assert_eq!(timer.tick(at(10)), RestTick::Counting { remaining: 35 });

        timer.extend(-100, at(10));
        assert_eq!(timer.tick(at(10)), RestTick::Finished);
    }

    #[test]
    fn test_extend_while_paused_clamps_at_zero() {
        let mut timer = RestTimer::default();
        timer.start(30, t0());
        timer.pause(at(25));
        timer.extend(-60, at(25));
        assert_eq!(timer.remaining(), 0);

        timer.resume(at(30));
        assert_eq!(timer.tick(at(30)), RestTick::Finished);
    }

    #[test]
    fn test_skip_counts_as_completion() {
        let mut timer = RestTimer::default();
        assert!(!timer.skip());

        timer.start(60, t0());
        assert!(timer.skip());
        assert!(!timer.skip());
        assert_eq!(timer.tick(at(1)), RestTick::Idle);
    }

    #[test]
    fn test_cancel_does_not_finish() {
        let mut timer = RestTimer::default();
        timer.start(60, t0());
        timer.cancel();
        assert!(!timer.is_active());
        assert_eq!(timer.tick(at(120)), RestTick::Idle);
    }
}
