//! TCP transport: one request per connection, one connection at a time.

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_READ_TIMEOUT_MS, HALT_SECONDS, HEARTBEAT_MS, MSG_SIZE};
use crate::dispatch::Reply;
use crate::relay::Relay;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// How long a client has to deliver its message
    pub read_timeout: Duration,
    /// How long the device stays halted after a shutdown command
    pub halt: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            halt: Duration::from_secs(HALT_SECONDS),
        }
    }
}

/// Why `serve` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The shutdown future resolved
    Stopped,
    /// A shutdown command was executed and the halt period ran out
    Halted,
}

/// Accept and answer connections until `shutdown` resolves or a shutdown
/// command halts the device.
///
/// Each connection is read, authenticated, dispatched and answered before
/// the next one is accepted. The relay lives behind a mutex and runs on the
/// blocking pool, so an actuation pulse never stalls the runtime.
///
/// `shutdown` is also raced against the connection being served, so a
/// client that never finishes its message does not hold off termination.
/// A pulse already started on the blocking pool still runs to completion.
/// Heartbeats pause while a connection is in progress.
pub async fn serve<F>(
    listener: TcpListener,
    relay: Relay,
    options: ServerOptions,
    shutdown: F,
) -> Result<Exit>
where
    F: Future<Output = ()>,
{
    let relay = Arc::new(Mutex::new(relay));
    let mut heartbeat = tokio::time::interval(Duration::from_millis(HEARTBEAT_MS));
    let mut beats: u64 = 0;
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (mut stream, peer) = match accept_result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept error: {}", e);
                        continue;
                    }
                };
                let served = handle_conn(&mut stream, peer, &relay, options.read_timeout);
                let outcome = tokio::select! {
                    outcome = served => outcome,
                    _ = &mut shutdown => {
                        info!(%peer, "shutting down, dropping connection in progress");
                        return Ok(Exit::Stopped);
                    }
                };
                match outcome {
                    Ok(Reply::Halt) => {
                        // Stop listening before the client sees the connection close
                        drop(listener);
                        drop(stream);
                        info!(
                            halt_secs = options.halt.as_secs(),
                            "shutdown command received, halting"
                        );
                        return Ok(halt(options.halt, shutdown.as_mut()).await);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%peer, "Connection handler error: {:#}", e),
                }
            }
            _ = heartbeat.tick() => {
                beats += 1;
                status(&relay, beats);
            }
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(Exit::Stopped);
            }
        }
    }
}

async fn handle_conn(
    stream: &mut TcpStream,
    peer: SocketAddr,
    relay: &Arc<Mutex<Relay>>,
    read_timeout: Duration,
) -> Result<Reply> {
    debug!(%peer, "client connected");

    let mut buffer = [0u8; MSG_SIZE];
    tokio::time::timeout(read_timeout, stream.read_exact(&mut buffer))
        .await
        .context("Timed out waiting for message")?
        .context("Failed to read message")?;

    let relay = Arc::clone(relay);
    let reply = tokio::task::spawn_blocking(move || -> Result<Reply> {
        let mut relay = relay.lock().map_err(|_| anyhow!("Relay state poisoned"))?;
        Ok(relay.handle(&buffer))
    })
    .await
    .context("Relay task failed")??;

    match reply {
        Reply::Code(code) => {
            stream.write_all(&[code]).await.context("Failed to write response")?;
            stream.flush().await.context("Failed to flush response")?;
            info!(%peer, response = code, "client served");
        }
        Reply::Hangup => warn!(%peer, "closing without response"),
        Reply::Halt => {}
    }
    Ok(reply)
}

/// Stay unresponsive for `duration`; only a termination signal ends it early
async fn halt<F>(duration: Duration, shutdown: std::pin::Pin<&mut F>) -> Exit
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = sleep_long(duration) => Exit::Halted,
        _ = shutdown => Exit::Stopped,
    }
}

/// Sleep in day-sized steps so very long halts stay within timer range
async fn sleep_long(duration: Duration) {
    const STEP: Duration = Duration::from_secs(24 * 60 * 60);
    let mut remaining = duration;
    while !remaining.is_zero() {
        let step = remaining.min(STEP);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
}

fn status(relay: &Arc<Mutex<Relay>>, beats: u64) {
    // A request holds the lock only while it is being handled
    let Ok(relay) = relay.try_lock() else {
        return;
    };
    let log = relay.open_log();
    debug!(latched = log.is_latched(), total_opens = log.total_opens(), "status");
    if log.is_latched() && beats % 60 == 0 {
        warn!(total_opens = log.total_opens(), "throttle latched, restart required");
    }
}
