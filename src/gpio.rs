//! Output lines driving the door relays.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

use crate::command::DoorIndex;
use crate::constants::{DEFAULT_FRONT_LINE, DEFAULT_REAR_LINE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Fixed door to output line mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMap {
    pub front: u32,
    pub rear: u32,
}

impl Default for LineMap {
    fn default() -> Self {
        Self {
            front: DEFAULT_FRONT_LINE,
            rear: DEFAULT_REAR_LINE,
        }
    }
}

impl LineMap {
    pub fn line(&self, door: DoorIndex) -> u32 {
        match door {
            DoorIndex::Front => self.front,
            DoorIndex::Rear => self.rear,
        }
    }
}

/// Which `OutputLines` implementation the daemon drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// Log transitions only, for hosts without relay hardware
    #[default]
    Log,
    /// Linux sysfs GPIO interface
    Sysfs,
}

pub trait OutputLines: Send {
    fn set_level(&mut self, door: DoorIndex, level: Level) -> Result<()>;
}

/// Holds a door's line high for as long as it lives and drives it low on
/// drop, on every exit path.
pub struct Pulse<'a> {
    lines: &'a mut dyn OutputLines,
    door: DoorIndex,
}

impl<'a> Pulse<'a> {
    pub fn start(lines: &'a mut dyn OutputLines, door: DoorIndex) -> Result<Self> {
        // Constructing the guard first means a failed high write still
        // gets a low write on drop
        let mut pulse = Self { lines, door };
        pulse.lines.set_level(door, Level::High)?;
        Ok(pulse)
    }
}

impl Drop for Pulse<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lines.set_level(self.door, Level::Low) {
            error!(door = %self.door, "failed to release output line: {:#}", e);
        }
    }
}

/// Drive `door` high for `duration`, blocking the calling thread. The pulse
/// cannot be cancelled once started.
pub fn pulse(lines: &mut dyn OutputLines, door: DoorIndex, duration: Duration) -> Result<()> {
    let _held = Pulse::start(lines, door)?;
    std::thread::sleep(duration);
    Ok(())
}

/// Linux sysfs GPIO (`/sys/class/gpio/gpioN/value`)
#[derive(Debug)]
pub struct SysfsLines {
    root: PathBuf,
    map: LineMap,
}

impl SysfsLines {
    pub fn new(map: LineMap) -> Result<Self> {
        Self::with_root("/sys/class/gpio", map)
    }

    /// Export both lines under `root` and configure them as low outputs
    pub fn with_root(root: impl Into<PathBuf>, map: LineMap) -> Result<Self> {
        let lines = Self { root: root.into(), map };
        for door in [DoorIndex::Front, DoorIndex::Rear] {
            lines.export(lines.map.line(door))?;
        }
        Ok(lines)
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{}", line))
    }

    fn export(&self, line: u32) -> Result<()> {
        let dir = self.line_dir(line);
        if !dir.exists() {
            fs::write(self.root.join("export"), line.to_string())
                .with_context(|| format!("Failed to export GPIO {}", line))?;
        }
        // "low" sets the direction and the initial level in one write
        fs::write(dir.join("direction"), "low")
            .with_context(|| format!("Failed to configure GPIO {} as output", line))?;
        Ok(())
    }
}

impl OutputLines for SysfsLines {
    fn set_level(&mut self, door: DoorIndex, level: Level) -> Result<()> {
        let line = self.map.line(door);
        let value = match level {
            Level::High => "1",
            Level::Low => "0",
        };
        fs::write(self.line_dir(line).join("value"), value)
            .with_context(|| format!("Failed to write GPIO {}", line))
    }
}

/// Logs every transition instead of touching hardware
#[derive(Debug, Default)]
pub struct LoggedLines {
    map: LineMap,
}

impl LoggedLines {
    pub fn new(map: LineMap) -> Self {
        Self { map }
    }
}

impl OutputLines for LoggedLines {
    fn set_level(&mut self, door: DoorIndex, level: Level) -> Result<()> {
        info!(%door, line = self.map.line(door), ?level, "output line");
        Ok(())
    }
}

/// In-memory lines recording every transition. Clones share the record, so
/// a test can keep one handle after moving another into the relay.
#[derive(Debug, Clone, Default)]
pub struct MemoryLines {
    events: Arc<Mutex<Vec<(DoorIndex, Level)>>>,
}

impl MemoryLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(DoorIndex, Level)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Completed high-then-low pulses on `door`
    pub fn pulses(&self, door: DoorIndex) -> usize {
        let events: Vec<Level> = self
            .events()
            .into_iter()
            .filter(|(d, _)| *d == door)
            .map(|(_, level)| level)
            .collect();
        events
            .windows(2)
            .filter(|w| w[0] == Level::High && w[1] == Level::Low)
            .count()
    }
}

impl OutputLines for MemoryLines {
    fn set_level(&mut self, door: DoorIndex, level: Level) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("line record poisoned"))?
            .push((door, level));
        Ok(())
    }
}
