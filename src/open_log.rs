//! Open log and latching throttle.
//!
//! Ticks are milliseconds from a local monotonic counter that wraps at
//! `u32::MAX`. Ages are computed with wrapping subtraction so a window that
//! straddles the wrap still counts correctly.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DAY, DEFAULT_MAX_PER_DAY, DEFAULT_MAX_PER_HOUR, DEFAULT_MAX_PER_MINUTE, HOUR, MINUTE,
};

/// Throttle thresholds. Hitting a threshold is allowed, exceeding it latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            per_minute: DEFAULT_MAX_PER_MINUTE,
            per_hour: DEFAULT_MAX_PER_HOUR,
            per_day: DEFAULT_MAX_PER_DAY,
        }
    }
}

impl Limits {
    /// Ring capacity: one more than the largest threshold, so the widest
    /// window can observe the open that exceeds it
    pub fn log_size(&self) -> usize {
        self.per_minute.max(self.per_hour).max(self.per_day) as usize + 1
    }
}

/// Fixed-capacity ring of tick timestamps. Once full, each push overwrites
/// the oldest slot. A stored tick of zero marks a slot that was never written.
#[derive(Debug, Clone)]
pub struct TickRing {
    slots: Vec<u32>,
    next: usize,
}

impl TickRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity.max(1)],
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, tick: u32) {
        self.slots[self.next] = tick;
        self.next = (self.next + 1) % self.slots.len();
    }

    /// Entries no older than `window` ms as seen from `now`. Before `now`
    /// reaches `window` every written slot counts, which matches a window
    /// start saturated at zero.
    pub fn count_within(&self, now: u32, window: u32) -> u32 {
        self.slots
            .iter()
            .filter(|&&tick| tick != 0 && now.wrapping_sub(tick) <= window)
            .count() as u32
    }
}

/// Process-wide actuation history with a one-way lockout latch.
///
/// Only a restart (a fresh `OpenLog`) clears the latch.
#[derive(Debug)]
pub struct OpenLog {
    ring: TickRing,
    limits: Limits,
    total_opens: u64,
    latched: bool,
}

impl OpenLog {
    pub fn new(limits: Limits) -> Self {
        Self {
            ring: TickRing::new(limits.log_size()),
            limits,
            total_opens: 0,
            latched: false,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Record one actuation attempt. Call exactly once per attempt, before
    /// `check_and_latch`, including attempts that end up refused.
    pub fn record_open(&mut self, now: u32) {
        self.ring.push(now);
        self.total_opens += 1;
    }

    pub fn count_since(&self, now: u32, window: u32) -> u32 {
        self.ring.count_within(now, window)
    }

    pub fn count_last_minute(&self, now: u32) -> u32 {
        self.count_since(now, MINUTE)
    }

    pub fn count_last_hour(&self, now: u32) -> u32 {
        self.count_since(now, HOUR)
    }

    pub fn count_last_day(&self, now: u32) -> u32 {
        self.count_since(now, DAY)
    }

    /// Latch if any window holds more opens than its threshold. Once
    /// latched this returns true forever, whatever the window contents.
    pub fn check_and_latch(&mut self, now: u32) -> bool {
        if self.latched {
            return true;
        }

        let minute = self.count_last_minute(now);
        let hour = self.count_last_hour(now);
        let day = self.count_last_day(now);
        if minute > self.limits.per_minute
            || hour > self.limits.per_hour
            || day > self.limits.per_day
        {
            warn!(
                minute,
                hour,
                day,
                total = self.total_opens,
                "open rate exceeded, relay latched until restart"
            );
            self.latched = true;
        }
        self.latched
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// All-time attempt counter, unaffected by ring overwrite or the latch
    pub fn total_opens(&self) -> u64 {
        self.total_opens
    }
}

impl Default for OpenLog {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}
