//! Garage relay constants

/// Length of an HMAC-SHA256 tag in bytes
pub const HASH_LENGTH: usize = 32;

/// Size of one request on the wire: tag followed by a command byte
pub const MSG_SIZE: usize = HASH_LENGTH + 1;

/// Tick units (milliseconds)
pub const SECOND: u32 = 1_000;
pub const MINUTE: u32 = SECOND * 60;
pub const HOUR: u32 = MINUTE * 60;
pub const DAY: u32 = HOUR * 24;

/// Accepted epoch offsets on either side of the device clock (seconds)
pub const TOLERANCE_SECONDS: i64 = 2;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 3893;

/// Default output lines for the two doors
pub const DEFAULT_FRONT_LINE: u32 = 14;
pub const DEFAULT_REAR_LINE: u32 = 5;

/// How long an output line is held high per actuation (ms)
pub const DEFAULT_PULSE_MS: u64 = 250;

/// How long a client gets to deliver its message (ms)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Default throttle thresholds; exceeding any of them latches the relay
pub const DEFAULT_MAX_PER_MINUTE: u32 = 6;
pub const DEFAULT_MAX_PER_HOUR: u32 = 12;
pub const DEFAULT_MAX_PER_DAY: u32 = 24;

/// Upper bound for any configured threshold; the open log allocates one slot per open
pub const MAX_OPENS_PER_WINDOW: u32 = 10_000;

/// Halt duration after a shutdown command (seconds, 21 years)
pub const HALT_SECONDS: u64 = 21 * 365 * 24 * 60 * 60;

/// Heartbeat period for status logging (ms)
pub const HEARTBEAT_MS: u64 = 1_000;

/// Config directory permissions (owner read/write/execute only)
pub const CONFIG_DIR_PERMISSIONS: u32 = 0o700;

/// Config file permissions (owner read/write only, it holds the secret)
pub const CONFIG_FILE_PERMISSIONS: u32 = 0o600;
