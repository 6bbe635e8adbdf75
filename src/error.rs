use thiserror::Error;

/// Per-request failures reported to the client as a single response byte.
///
/// None of these are fatal; the connection is answered and closed normally.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RelayError {
    /// No tag in the tolerance window matched
    #[error("invalid hash")]
    InvalidHash,

    /// Tag matched but the command byte is unknown
    #[error("invalid command: {0}")]
    InvalidCommand(u8),

    /// Open refused because the throttle is latched
    #[error("throttle rate exceeded")]
    ThrottleRateExceeded,
}

impl RelayError {
    /// Wire byte sent back to the client
    pub fn code(&self) -> u8 {
        match self {
            RelayError::InvalidHash => 4,
            RelayError::InvalidCommand(_) => 5,
            RelayError::ThrottleRateExceeded => 6,
        }
    }
}
