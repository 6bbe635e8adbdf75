use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{Authenticator, Message};
use crate::clock::Clock;
use crate::constants::MSG_SIZE;
use crate::dispatch::{Dispatcher, Reply};
use crate::gpio::OutputLines;
use crate::open_log::{Limits, OpenLog};

/// One device: authenticator, dispatcher and the clocks they read.
///
/// `handle` takes `&mut self`, so whoever owns the relay decides how
/// requests are serialised.
pub struct Relay {
    authenticator: Authenticator,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl Relay {
    pub fn new(
        authenticator: Authenticator,
        lines: Box<dyn OutputLines>,
        clock: Arc<dyn Clock>,
        limits: Limits,
        pulse: Duration,
    ) -> Self {
        Self {
            authenticator,
            dispatcher: Dispatcher::new(lines, OpenLog::new(limits), pulse),
            clock,
        }
    }

    /// Authenticate and execute one raw request. Epoch time and ticks are
    /// sampled now, after the message has fully arrived.
    pub fn handle(&mut self, bytes: &[u8; MSG_SIZE]) -> Reply {
        let message = Message::from_bytes(bytes);
        let epoch = self.clock.epoch_seconds();
        match self.authenticator.authenticate(&message, epoch) {
            Ok(command) => self.dispatcher.dispatch(command, self.clock.ticks_millis()),
            Err(e) => {
                info!(epoch, "request refused: {}", e);
                Reply::Code(e.code())
            }
        }
    }

    pub fn open_log(&self) -> &OpenLog {
        self.dispatcher.open_log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::DoorIndex;
    use crate::constants::MINUTE;
    use crate::gpio::MemoryLines;

    fn relay(secret: &str, clock: &ManualClock, lines: &MemoryLines) -> Relay {
        Relay::new(
            Authenticator::new(secret.as_bytes()).unwrap(),
            Box::new(lines.clone()),
            Arc::new(clock.clone()),
            Limits::default(),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_valid_open_front() {
        let clock = ManualClock::new(1000, MINUTE);
        let lines = MemoryLines::new();
        let mut relay = relay("k", &clock, &lines);

        let msg = Authenticator::new(b"k").unwrap().sign(1000, 1);
        assert_eq!(relay.handle(&msg.to_bytes()), Reply::Code(1));
        assert_eq!(lines.pulses(DoorIndex::Front), 1);
    }

    #[test]
    fn test_bad_tag_never_reaches_dispatcher() {
        let clock = ManualClock::new(1000, MINUTE);
        let lines = MemoryLines::new();
        let mut relay = relay("k", &clock, &lines);

        let msg = Authenticator::new(b"k").unwrap().sign(1006, 1);
        assert_eq!(relay.handle(&msg.to_bytes()), Reply::Code(4));
        assert_eq!(relay.open_log().total_opens(), 0);
        assert!(lines.events().is_empty());
    }

    #[test]
    fn test_uses_clock_at_handle_time() {
        let clock = ManualClock::new(1000, MINUTE);
        let lines = MemoryLines::new();
        let mut relay = relay("k", &clock, &lines);
        let msg = Authenticator::new(b"k").unwrap().sign(2000, 0);

        assert_eq!(relay.handle(&msg.to_bytes()), Reply::Code(4));
        clock.set_epoch(2001);
        assert_eq!(relay.handle(&msg.to_bytes()), Reply::Code(0));
    }
}
