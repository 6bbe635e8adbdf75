use std::time::Duration;
use tracing::{error, info};

use crate::command::{Command, DoorIndex};
use crate::error::RelayError;
use crate::gpio::{self, OutputLines};
use crate::open_log::OpenLog;

/// What the transport should do after a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Send this byte and close
    Code(u8),
    /// Close without a response and enter the low-power halt
    Halt,
    /// Close without a response; the actuator could not be driven
    Hangup,
}

/// Maps authenticated commands to actions. Owns the single open log shared
/// by both doors.
pub struct Dispatcher {
    lines: Box<dyn OutputLines>,
    open_log: OpenLog,
    pulse: Duration,
}

impl Dispatcher {
    pub fn new(lines: Box<dyn OutputLines>, open_log: OpenLog, pulse: Duration) -> Self {
        Self {
            lines,
            open_log,
            pulse,
        }
    }

    pub fn open_log(&self) -> &OpenLog {
        &self.open_log
    }

    /// Execute a raw command byte at local tick `now`
    pub fn dispatch(&mut self, command_byte: u8, now: u32) -> Reply {
        let result = match Command::from_byte(command_byte) {
            Some(command) => self.execute(command, now),
            None => Err(RelayError::InvalidCommand(command_byte)),
        };
        match result {
            Ok(reply) => reply,
            Err(e) => {
                info!("request refused: {}", e);
                Reply::Code(e.code())
            }
        }
    }

    fn execute(&mut self, command: Command, now: u32) -> Result<Reply, RelayError> {
        match command {
            Command::Status => Ok(Reply::Code(command.as_byte())),
            Command::OpenFront => self.open_door(command, DoorIndex::Front, now),
            Command::OpenRear => self.open_door(command, DoorIndex::Rear, now),
            Command::Shutdown => Ok(Reply::Halt),
        }
    }

    /// Record the attempt, consult the throttle, then pulse. Recording and
    /// checking run under the same `&mut self`, so no other open can land
    /// between them.
    fn open_door(
        &mut self,
        command: Command,
        door: DoorIndex,
        now: u32,
    ) -> Result<Reply, RelayError> {
        self.open_log.record_open(now);
        if self.open_log.check_and_latch(now) {
            info!(%door, total = self.open_log.total_opens(), "open refused, throttle latched");
            return Err(RelayError::ThrottleRateExceeded);
        }

        if self.actuate(door) {
            Ok(Reply::Code(command.as_byte()))
        } else {
            Ok(Reply::Hangup)
        }
    }

    fn actuate(&mut self, door: DoorIndex) -> bool {
        info!(%door, "opening garage door");
        match gpio::pulse(self.lines.as_mut(), door, self.pulse) {
            Ok(()) => true,
            Err(e) => {
                error!(%door, "actuation failed: {:#}", e);
                false
            }
        }
    }
}
