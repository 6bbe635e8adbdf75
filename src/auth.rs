//! Time-windowed message authentication.
//!
//! A request proves knowledge of the shared secret by carrying
//! `HMAC-SHA256(secret, decimal(epoch))` for an epoch close to the device's
//! own. There is no nonce, so a captured tag stays replayable for the width
//! of the tolerance window plus clock drift.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::constants::{HASH_LENGTH, MSG_SIZE, TOLERANCE_SECONDS};
use crate::error::RelayError;

type HmacSha256 = Hmac<Sha256>;

/// One request as it arrives on the wire: tag followed by a command byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    tag: [u8; HASH_LENGTH],
    command: u8,
}

impl Message {
    pub fn new(tag: [u8; HASH_LENGTH], command: u8) -> Self {
        Self { tag, command }
    }

    pub fn from_bytes(bytes: &[u8; MSG_SIZE]) -> Self {
        let mut tag = [0u8; HASH_LENGTH];
        tag.copy_from_slice(&bytes[..HASH_LENGTH]);
        Self {
            tag,
            command: bytes[HASH_LENGTH],
        }
    }

    pub fn to_bytes(&self) -> [u8; MSG_SIZE] {
        let mut bytes = [0u8; MSG_SIZE];
        bytes[..HASH_LENGTH].copy_from_slice(&self.tag);
        bytes[HASH_LENGTH] = self.command;
        bytes
    }

    pub fn tag(&self) -> &[u8; HASH_LENGTH] {
        &self.tag
    }

    pub fn command_byte(&self) -> u8 {
        self.command
    }
}

/// Verifies message tags against the shared secret.
///
/// The keyed MAC state is built once and cloned per candidate epoch.
#[derive(Clone)]
pub struct Authenticator {
    keyed: HmacSha256,
    tolerance: i64,
}

impl Authenticator {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            keyed: HmacSha256::new_from_slice(secret)?,
            tolerance: TOLERANCE_SECONDS,
        })
    }

    /// Accepted offsets are `-tolerance..=tolerance` seconds
    pub fn with_tolerance(mut self, tolerance: i64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    fn mac_for(&self, epoch: u64) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        // Decimal ASCII, the same text a client prints before keying the MAC
        mac.update(epoch.to_string().as_bytes());
        mac
    }

    /// Tag a client must send for `epoch`
    pub fn tag_for(&self, epoch: u64) -> [u8; HASH_LENGTH] {
        let bytes = self.mac_for(epoch).finalize().into_bytes();
        let mut tag = [0u8; HASH_LENGTH];
        tag.copy_from_slice(&bytes);
        tag
    }

    /// Build a complete request for `epoch`
    pub fn sign(&self, epoch: u64, command: u8) -> Message {
        Message::new(self.tag_for(epoch), command)
    }

    /// Check the tag against every epoch in the tolerance window around
    /// `epoch`, lowest offset first, and return the raw command byte on the
    /// first match. The command byte is not validated here.
    pub fn authenticate(&self, message: &Message, epoch: u64) -> Result<u8, RelayError> {
        for offset in -self.tolerance..=self.tolerance {
            let Some(candidate) = epoch.checked_add_signed(offset) else {
                continue;
            };
            // verify_slice compares all bytes in constant time
            if self.mac_for(candidate).verify_slice(message.tag()).is_ok() {
                debug!(offset, "tag matched");
                return Ok(message.command_byte());
            }
        }
        Err(RelayError::InvalidHash)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}
