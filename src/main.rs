use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use garage_relay::{
    client,
    clock::{Clock, SystemClock},
    command::Command,
    config::Config,
    gpio::{GpioBackend, LoggedLines, OutputLines, SysfsLines},
    relay::Relay,
    server::{self, Exit, ServerOptions},
};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "garage-relay")]
#[command(about = "Network-triggered garage door relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .garage/config.toml with a new shared secret
    Init {
        /// Config root (default: .)
        #[arg(short, long, default_value = ".")]
        root: String,
    },
    /// Run the relay daemon
    Serve {
        /// Config root (default: .)
        #[arg(short, long, default_value = ".")]
        root: String,
    },
    /// Send a command to a running relay
    Send {
        /// Config root holding the shared secret (default: .)
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Relay host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
        /// Epoch seconds to tag the message with (default: now)
        #[arg(long)]
        epoch: Option<u64>,
        /// Seconds added to the tagging epoch, to simulate clock skew
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
        #[command(flatten)]
        request: Request,
    },
    /// Show the configuration (never the secret)
    Status {
        /// Config root (default: .)
        #[arg(short, long, default_value = ".")]
        root: String,
    },
}

/// Exactly one command per `send`
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Request {
    /// Query status
    #[arg(long)]
    status: bool,
    /// Open the front door
    #[arg(long)]
    front: bool,
    /// Open the rear door
    #[arg(long)]
    rear: bool,
    /// Halt the relay until it is power cycled
    #[arg(long)]
    shutdown: bool,
    /// Send an arbitrary command byte
    #[arg(long, value_name = "BYTE")]
    raw: Option<u8>,
}

impl Request {
    fn byte(&self) -> u8 {
        let command = if self.front {
            Command::OpenFront
        } else if self.rear {
            Command::OpenRear
        } else if self.shutdown {
            Command::Shutdown
        } else if let Some(raw) = self.raw {
            return raw;
        } else {
            Command::Status
        };
        command.as_byte()
    }
}

/// Epoch the client tags its message with
fn client_epoch(epoch: Option<u64>, offset: i64, now: u64) -> Result<u64> {
    let base = epoch.unwrap_or(now);
    base.checked_add_signed(offset)
        .with_context(|| format!("Epoch {} with offset {} is out of range", base, offset))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let handlers = (signal(SignalKind::terminate()), signal(SignalKind::interrupt()));
    let (mut sigterm, mut sigint) = match handlers {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            tracing::warn!("Failed to install signal handlers, relying on Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully..."),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { root } => {
            let root = Path::new(&root);
            if Config::path(root).exists() {
                anyhow::bail!(
                    "{} already exists. Remove it first to generate a new secret",
                    Config::path(root).display()
                );
            }
            let config = Config::init(root)?;
            println!("Relay initialized in {:?}", Config::dir(root));
            println!("Port: {}", config.port);
            println!("Share {} with your clients", Config::path(root).display());
        }
        Commands::Serve { root } => {
            init_tracing();
            let config = Config::load(Path::new(&root))?;

            let lines: Box<dyn OutputLines> = match config.gpio_backend {
                GpioBackend::Sysfs => Box::new(SysfsLines::new(config.lines())?),
                GpioBackend::Log => Box::new(LoggedLines::new(config.lines())),
            };
            let relay = Relay::new(
                config.authenticator()?,
                lines,
                Arc::new(SystemClock::new()),
                config.limits,
                config.pulse(),
            );

            let listener = TcpListener::bind(config.listen_address())
                .await
                .with_context(|| format!("Failed to bind {}", config.listen_address()))?;
            info!(
                address = %config.listen_address(),
                front_line = config.front_line,
                rear_line = config.rear_line,
                per_minute = config.limits.per_minute,
                per_hour = config.limits.per_hour,
                per_day = config.limits.per_day,
                "relay listening"
            );

            let options = ServerOptions {
                read_timeout: config.read_timeout(),
                ..ServerOptions::default()
            };
            match server::serve(listener, relay, options, shutdown_signal()).await? {
                Exit::Stopped => info!("Relay stopped cleanly."),
                Exit::Halted => info!("Halt period over, exiting."),
            }
        }
        Commands::Send {
            root,
            host,
            port,
            epoch,
            offset,
            request,
        } => {
            let config = Config::load(Path::new(&root))?;
            let command = request.byte();
            let epoch = client_epoch(epoch, offset, SystemClock::new().epoch_seconds())?;
            let port = port.unwrap_or(config.port);

            let response = client::send_command(
                (host.as_str(), port),
                &config.authenticator()?,
                epoch,
                command,
                config.read_timeout(),
            )
            .await?;

            match response {
                Some(code) => {
                    println!("Response: {} ({})", code, client::describe_response(code));
                    if code > 3 {
                        std::process::exit(1);
                    }
                }
                None => println!("Connection closed without a response"),
            }
        }
        Commands::Status { root } => {
            let root = Path::new(&root);
            if !Config::path(root).exists() {
                println!("No .garage in {:?}. Run: garage-relay init", root);
                return Ok(());
            }
            let config = Config::load(root)?;
            println!("Relay config in {:?}", Config::dir(root));
            println!("Listen: {}", config.listen_address());
            println!("GPIO backend: {:?}", config.gpio_backend);
            println!("Lines: front={} rear={}", config.front_line, config.rear_line);
            println!("Pulse: {} ms", config.pulse_ms);
            println!(
                "Limits: {}/minute, {}/hour, {}/day",
                config.limits.per_minute, config.limits.per_hour, config.limits.per_day
            );
        }
    }

    Ok(())
}
