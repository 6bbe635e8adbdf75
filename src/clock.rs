//! The relay's two time domains.
//!
//! Epoch seconds come from the externally synchronised wall clock and only
//! feed authentication. Ticks are local monotonic milliseconds that wrap at
//! `u32::MAX` and only feed the open log. The two are never mixed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub trait Clock: Send + Sync {
    fn epoch_seconds(&self) -> u64;
    fn ticks_millis(&self) -> u32;
}

/// Host clocks: system wall time (kept in sync by the OS) and elapsed time
/// since construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn epoch_seconds(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }

    fn ticks_millis(&self) -> u32 {
        // Truncation is the wrap
        self.started.elapsed().as_millis() as u32
    }
}

/// Hand-driven clock for tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    epoch: Arc<AtomicU64>,
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(epoch: u64, ticks: u32) -> Self {
        Self {
            epoch: Arc::new(AtomicU64::new(epoch)),
            ticks: Arc::new(AtomicU32::new(ticks)),
        }
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    pub fn set_ticks(&self, ticks: u32) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    /// Advance both domains by `millis`; ticks wrap
    pub fn advance(&self, millis: u32) {
        self.ticks.fetch_add(millis, Ordering::SeqCst);
        self.epoch.fetch_add(u64::from(millis / 1_000), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_seconds(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn ticks_millis(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }
}
