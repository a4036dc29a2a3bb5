// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use sensor_modbus_slave::config::Config;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[test]
fn test_config_type_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Valid YAML but wrong structure
    let invalid_yaml = r#"
modbus:
  port: "not-an-integer"  # Integer field with string value
  address: 12345          # String field with number value
mdns:
  enabled: "true"         # Boolean field with string value
network:
  ethernet:
    driver: "usb"         # Unknown driver
"#;
    fs::write(&config_path, invalid_yaml)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "Sample config file was not created"
    );

    // The sample file is valid and holds the defaults
    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.modbus.port, 502);

    Ok(())
}

#[test]
fn test_config_out_of_range_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let invalid_config = r#"
modbus:
  port: 99999  # Does not fit a TCP port
  address: "127.0.0.1"
"#;
    fs::write(&config_path, invalid_config)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "Sample config file was not created"
    );

    Ok(())
}

#[test]
fn test_config_rule_violation_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Passes the schema, fails the passphrase length rule
    let invalid_config = r#"
network:
  wifi:
    ssid: "sensors"
    password: "short"
"#;
    fs::write(&config_path, invalid_config)?;

    let result = Config::from_file(&config_path);
    let err = result.expect_err("Config loading should have failed");
    assert!(err.to_string().contains("password"));

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(Path::new(&sample_path).exists());

    Ok(())
}
