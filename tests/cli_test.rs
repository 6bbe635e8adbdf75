use anyhow::Result;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn binary() -> &'static str {
    env!("CARGO_BIN_EXE_garage-relay")
}

#[test]
fn test_init_creates_config() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = Command::new(binary())
        .arg("init")
        .current_dir(temp_dir.path())
        .output()?;

    assert!(output.status.success(), "Init failed: stdout: {}, stderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Relay initialized"));

    let config_path = temp_dir.path().join(".garage").join("config.toml");
    let config = fs::read_to_string(config_path)?;
    assert!(config.contains("secret = "));
    Ok(())
}

#[test]
fn test_init_refuses_to_overwrite_secret() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let run_init = || Command::new(binary()).arg("init").current_dir(temp_dir.path()).output();

    assert!(run_init()?.status.success());
    let first = fs::read_to_string(temp_dir.path().join(".garage/config.toml"))?;

    let second = run_init()?;
    assert!(!second.status.success());
    assert_eq!(fs::read_to_string(temp_dir.path().join(".garage/config.toml"))?, first);
    Ok(())
}

#[test]
fn test_status_hides_secret() -> Result<()> {
    let temp_dir = TempDir::new()?;
    Command::new(binary()).arg("init").current_dir(temp_dir.path()).output()?;
    let config = fs::read_to_string(temp_dir.path().join(".garage/config.toml"))?;
    let secret = config
        .lines()
        .find_map(|l| l.strip_prefix("secret = "))
        .map(|s| s.trim_matches('"').to_string())
        .unwrap();

    let output = Command::new(binary())
        .arg("status")
        .current_dir(temp_dir.path())
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Listen: 0.0.0.0:3893"));
    assert!(!stdout.contains(&secret));
    Ok(())
}
