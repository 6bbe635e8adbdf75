//! Client side of the wire protocol.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::auth::Authenticator;

/// Send one request tagged for `epoch` and wait for the response byte.
///
/// Returns `None` when the device closes the connection without answering,
/// which is what a shutdown command or a failed actuation looks like.
pub async fn send_command<A: ToSocketAddrs>(
    addr: A,
    authenticator: &Authenticator,
    epoch: u64,
    command: u8,
    timeout: Duration,
) -> Result<Option<u8>> {
    let mut stream = TcpStream::connect(addr)
        .await
        .context("Failed to connect to relay. Is the daemon running?")?;

    let message = authenticator.sign(epoch, command);
    stream
        .write_all(&message.to_bytes())
        .await
        .context("Failed to send message")?;
    stream.flush().await.context("Failed to flush message")?;

    let mut response = [0u8; 1];
    let n = tokio::time::timeout(timeout, stream.read(&mut response))
        .await
        .context("Timed out waiting for response")?
        .context("Failed to read response")?;
    Ok((n == 1).then_some(response[0]))
}

/// Human-readable meaning of a response byte
pub fn describe_response(code: u8) -> &'static str {
    match code {
        0 => "ok: status",
        1 => "ok: front door opened",
        2 => "ok: rear door opened",
        3 => "ok: shutdown",
        4 => "error: invalid hash",
        5 => "error: invalid command",
        6 => "error: throttle rate exceeded",
        _ => "error: unknown response",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_response() {
        assert_eq!(describe_response(1), "ok: front door opened");
        assert_eq!(describe_response(6), "error: throttle rate exceeded");
        assert_eq!(describe_response(200), "error: unknown response");
    }
}
