//! Session clock.
//!
//! Elapsed time is always recomputed from absolute timestamps, so a host that
//! delivers ticks late, merges them or skips them entirely still reads the
//! correct value on the next tick.

use chrono::{DateTime, Utc};

#[derive(Clone, Debug, Default)]
pub struct SessionClock {
    /// Seconds accumulated before the current running stretch
    base_seconds: i64,
    /// Start of the current running stretch; `None` while paused
    started_at: Option<DateTime<Utc>>,
    last_elapsed: i64,
}

impl SessionClock {
    /// A paused clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock already running from `now`
    pub fn started(now: DateTime<Utc>) -> Self {
        let mut clock = Self::new();
        clock.resume(now);
        clock
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_paused(&self) -> bool {
        !self.is_running()
    }

    /// Recompute elapsed whole seconds as of `now`
    ///
    /// The reported value never decreases, even if `now` goes backwards.
    pub fn tick(&mut self, now: DateTime<Utc>) -> i64 {
        if let Some(started_at) = self.started_at {
            let stretch = (now - started_at).num_seconds().max(0);
            self.last_elapsed = self.last_elapsed.max(self.base_seconds + stretch);
        }
        self.last_elapsed
    }

    /// The last computed value, without advancing
    pub fn elapsed(&self) -> i64 {
        self.last_elapsed
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.is_paused() {
            return;
        }
        self.base_seconds = self.tick(now);
        self.started_at = None;
        tracing::debug!("Session clock paused at {}s", self.base_seconds);
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.is_running() {
            return;
        }
        self.base_seconds = self.last_elapsed;
        self.started_at = Some(now);
        tracing::debug!("Session clock running from {}s", self.base_seconds);
    }

    /// Seed elapsed time from an externally stored duration
    ///
    /// Only moves the clock forward; a stale checkpoint smaller than the
    /// current reading is ignored. Running state is preserved.
    pub fn resync(&mut self, seconds: i64, now: DateTime<Utc>) {
        let current = self.tick(now);
        if seconds <= current {
            return;
        }
        self.base_seconds = seconds;
        self.last_elapsed = seconds;
        if self.started_at.is_some() {
            self.started_at = Some(now);
        }
        tracing::debug!("Session clock re-synced to {}s", seconds);
    }
}
