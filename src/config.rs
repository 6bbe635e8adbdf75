use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::constants::*;
use crate::gpio::{GpioBackend, LineMap};
use crate::open_log::Limits;

/// Device configuration, read once at startup from `.garage/config.toml`.
/// Unknown keys are rejected so a typo cannot silently fall back to a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub secret: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub gpio_backend: GpioBackend,
    #[serde(default = "default_front_line")]
    pub front_line: u32,
    #[serde(default = "default_rear_line")]
    pub rear_line: u32,
    #[serde(default)]
    pub limits: Limits,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_front_line() -> u32 {
    DEFAULT_FRONT_LINE
}

fn default_rear_line() -> u32 {
    DEFAULT_REAR_LINE
}

fn default_pulse_ms() -> u64 {
    DEFAULT_PULSE_MS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Config {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            bind_address: default_bind_address(),
            port: default_port(),
            pulse_ms: default_pulse_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            gpio_backend: GpioBackend::default(),
            front_line: default_front_line(),
            rear_line: default_rear_line(),
            limits: Limits::default(),
        }
    }

    pub fn dir(root: &Path) -> PathBuf {
        root.join(".garage")
    }

    pub fn path(root: &Path) -> PathBuf {
        Self::dir(root).join("config.toml")
    }

    /// Create `.garage/config.toml` with a fresh random secret
    pub fn init(root: &Path) -> Result<Self> {
        let dir = Self::dir(root);
        fs::create_dir_all(&dir).context("Failed to create .garage directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(CONFIG_DIR_PERMISSIONS))
            .context("Failed to set .garage permissions")?;

        let config = Config::new(Uuid::new_v4().simple().to_string());

        let config_path = Self::path(root);
        let toml_str = toml::to_string(&config).context("Failed to serialize config to TOML")?;
        let mut file = File::create(&config_path).context("Failed to create config.toml")?;
        fs::set_permissions(&config_path, fs::Permissions::from_mode(CONFIG_FILE_PERMISSIONS))
            .context("Failed to set config.toml permissions")?;
        file.write_all(toml_str.as_bytes()).context("Failed to write config.toml")?;

        Ok(config)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let config_path = Self::path(root);
        let config_str = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            anyhow::bail!("Shared secret must not be empty");
        }
        if self.front_line == self.rear_line {
            anyhow::bail!("Front and rear doors must use different output lines");
        }
        for (name, value) in [
            ("per_minute", self.limits.per_minute),
            ("per_hour", self.limits.per_hour),
            ("per_day", self.limits.per_day),
        ] {
            if value > MAX_OPENS_PER_WINDOW {
                anyhow::bail!(
                    "limits.{} = {} exceeds the maximum of {}",
                    name,
                    value,
                    MAX_OPENS_PER_WINDOW
                );
            }
        }
        Ok(())
    }

    pub fn lines(&self) -> LineMap {
        LineMap {
            front: self.front_line,
            rear: self.rear_line,
        }
    }

    pub fn authenticator(&self) -> Result<Authenticator> {
        Authenticator::new(self.secret.as_bytes()).context("Invalid shared secret")
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialize_deserialize() {
        let mut config = Config::new("wubbalubbadubdub");
        config.limits.per_minute = 3;
        config.gpio_backend = GpioBackend::Sysfs;

        let toml_str = toml::to_string(&config).unwrap();
        let loaded: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.secret, loaded.secret);
        assert_eq!(config.limits, loaded.limits);
        assert_eq!(config.lines(), loaded.lines());
        assert_eq!(loaded.gpio_backend, GpioBackend::Sysfs);
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let config: Config = toml::from_str("secret = \"k\"").unwrap();
        assert_eq!(config.port, 3893);
        assert_eq!(config.pulse_ms, 250);
        assert_eq!(config.lines(), LineMap { front: 14, rear: 5 });
        assert_eq!(
            config.limits,
            Limits {
                per_minute: 6,
                per_hour: 12,
                per_day: 24,
            }
        );
        assert_eq!(config.gpio_backend, GpioBackend::Log);
        assert_eq!(config.listen_address(), "0.0.0.0:3893");
    }

    #[test]
    fn test_init_load() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let config = Config::init(root).unwrap();
        assert!(root.join(".garage").is_dir());
        assert_eq!(config.secret.len(), 32);

        let mode = fs::metadata(Config::path(root)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, CONFIG_FILE_PERMISSIONS);

        let loaded = Config::load(root).unwrap();
        assert_eq!(config.secret, loaded.secret);
    }

    #[test]
    fn test_init_generates_distinct_secrets() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        assert_ne!(
            Config::init(a.path()).unwrap().secret,
            Config::init(b.path()).unwrap().secret
        );
    }

    #[test]
    fn test_load_rejects_empty_secret() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(Config::dir(temp.path())).unwrap();
        fs::write(Config::path(temp.path()), "secret = \"\"\n").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn test_line_keys_select_output_lines() {
        let config: Config =
            toml::from_str("secret = \"k\"\nfront_line = 3\nrear_line = 4\n").unwrap();
        assert_eq!(config.lines(), LineMap { front: 3, rear: 4 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("secret = \"k\"\nfront = 3\n").is_err());
        assert!(toml::from_str::<Config>("secret = \"k\"\n[lines]\nfront = 3\n").is_err());
        assert!(toml::from_str::<Config>("secret = \"k\"\n[limits]\nper_minit = 3\n").is_err());

        let temp = TempDir::new().unwrap();
        fs::create_dir_all(Config::dir(temp.path())).unwrap();
        fs::write(Config::path(temp.path()), "secret = \"k\"\nfrontline = 3\n").unwrap();
        let err = Config::load(temp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("frontline"));
    }

    #[test]
    fn test_same_line_for_both_doors_is_rejected() {
        let mut config = Config::new("k");
        config.rear_line = config.front_line;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_limits_are_rejected() {
        let mut config = Config::new("k");
        config.limits.per_day = MAX_OPENS_PER_WINDOW;
        assert!(config.validate().is_ok());

        config.limits.per_day = u32::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.per_day"));

        let mut config = Config::new("k");
        config.limits.per_minute = MAX_OPENS_PER_WINDOW + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(temp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
