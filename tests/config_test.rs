// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use sensor_modbus_slave::config::{Config, LinkDriverType, ModbusConfig};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Create a custom config
    let mut config = Config {
        modbus: ModbusConfig {
            port: 1502,
            address: "192.168.1.1".to_string(),
            slave_address: 7,
            ..ModbusConfig::default()
        },
        ..Config::default()
    };
    config.network.wifi.ssid = "plant-floor".to_string();
    config.network.ethernet.driver = LinkDriverType::Simulated;

    config.save_to_file(&config_path)?;
    let loaded_config = Config::from_file(&config_path)?;

    assert_eq!(loaded_config.modbus.port, 1502);
    assert_eq!(loaded_config.modbus.address, "192.168.1.1");
    assert_eq!(loaded_config.modbus.slave_address, 7);
    assert_eq!(loaded_config.network.wifi.ssid, "plant-floor");
    assert_eq!(loaded_config.network.ethernet.driver, LinkDriverType::Simulated);

    // Test loading default config for non-existent file
    let non_existent_path = temp_dir.path().join("non_existent.yaml");
    let default_config = Config::from_file(&non_existent_path)?;

    assert!(non_existent_path.exists());
    assert_eq!(default_config.modbus.port, 502);
    assert_eq!(default_config.modbus.address, "0.0.0.0");
    assert_eq!(default_config.network.ethernet.connect_timeout_ms, 5000);
    assert_eq!(default_config.network.settle_delay_ms, 10000);

    Ok(())
}

#[test]
fn test_partial_file_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        r#"
modbus:
  port: 1502
network:
  wifi:
    ssid: "sensors"
    password: "correct horse"
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.modbus.port, 1502);
    assert_eq!(config.modbus.slave_address, 1);
    assert_eq!(config.network.wifi.ssid, "sensors");
    assert_eq!(config.network.wifi.interface, "wlan0");
    assert_eq!(config.network.ethernet.interface, "eth0");
    assert!(config.mdns.enabled);
    assert_eq!(config.mdns.instance_name, "esp32_mb_slave_tcp");

    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();

    config.apply_args(
        Some("127.0.0.1".to_string()),
        Some(1502),
        Some("enp3s0".to_string()),
        None,
        Some("plant-floor".to_string()),
        Some("secret-passphrase".to_string()),
        true,
    );

    assert_eq!(config.modbus.address, "127.0.0.1");
    assert_eq!(config.modbus.port, 1502);
    assert_eq!(config.network.ethernet.interface, "enp3s0");
    assert_eq!(config.network.wifi.interface, "wlan0");
    assert_eq!(config.network.wifi.ssid, "plant-floor");
    assert_eq!(config.network.wifi.password, "secret-passphrase");
    assert!(!config.mdns.enabled);

    // Nothing given, nothing changed
    let before = config.clone();
    config.apply_args(None, None, None, None, None, None, false);
    assert_eq!(config.modbus.port, before.modbus.port);
    assert!(!config.mdns.enabled);
}

#[test]
fn test_config_validation() {
    assert!(Config::default().validate().is_ok());

    let mut invalid_port_config = Config::default();
    invalid_port_config.modbus.port = 0;
    assert!(invalid_port_config.validate().is_err());

    let mut invalid_ssid_config = Config::default();
    invalid_ssid_config.network.wifi.ssid = "s".repeat(40);
    assert!(invalid_ssid_config.validate().is_err());

    let mut invalid_mac_config = Config::default();
    invalid_mac_config.network.ethernet.driver = LinkDriverType::Simulated;
    invalid_mac_config.network.ethernet.simulated.mac_address = "not-a-mac".to_string();
    assert!(invalid_mac_config.validate().is_err());
}
