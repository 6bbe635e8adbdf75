pub mod auth;
pub mod client;
pub mod clock;
pub mod command;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod gpio;
pub mod open_log;
pub mod relay;
pub mod server;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_config_init() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let config = config::Config::init(root)?;

        let garage_dir = root.join(".garage");
        assert!(garage_dir.exists());
        assert!(garage_dir.is_dir());

        let config_path = garage_dir.join("config.toml");
        assert!(config_path.is_file());

        let loaded = config::Config::load(root)?;
        assert_eq!(config.secret, loaded.secret);
        assert_eq!(config.port, loaded.port);
        assert_eq!(config.limits, loaded.limits);

        Ok(())
    }

    #[test]
    fn test_relay_from_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = config::Config::init(temp_dir.path())?;

        let clock = clock::ManualClock::new(1_700_000_000, constants::MINUTE);
        let lines = gpio::MemoryLines::new();
        let mut relay = relay::Relay::new(
            config.authenticator()?,
            Box::new(lines.clone()),
            Arc::new(clock),
            config.limits,
            std::time::Duration::ZERO,
        );

        let msg = config.authenticator()?.sign(1_700_000_001, 2);
        assert_eq!(relay.handle(&msg.to_bytes()), dispatch::Reply::Code(2));
        assert_eq!(lines.pulses(command::DoorIndex::Rear), 1);

        Ok(())
    }
}
