// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, LinkDriverType};
use crate::network::MacAddress;

/// Longest SSID accepted by 802.11.
const MAX_SSID_LEN: usize = 32;

/// Build the JSON schema of [`Config`].
pub fn config_schema() -> Result<serde_json::Value> {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).context("Failed to convert JSON schema")
}

/// Output the JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// ### Example
///
/// ```bash
/// ./sensor_modbus_slave --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema = config_schema()?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validate a raw configuration document against the schema of [`Config`].
pub(crate) fn validate_against_schema(json_value: &serde_json::Value) -> Result<()> {
    let schema = config_schema()?;

    let validator = jsonschema::draft202012::options()
        .should_validate_formats(true)
        .build(&schema)?;

    if let Err(error) = validator.validate(json_value) {
        anyhow::bail!("Configuration validation failed: {}", error);
    }
    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
///
/// ### Arguments
///
/// * `addr` - The address string to validate
///
/// ### Returns
///
/// `true` if the address is valid, `false` otherwise
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// ### Validation Rules
///
/// - **Port Range**: Modbus and mDNS ports must be within 1-65534
/// - **IP Address Format**: the Modbus bind address should be an IP address or special value
/// - **Links**: at least one of Ethernet and Wi-Fi must be enabled
/// - **Wi-Fi Credentials**: SSID of at most 32 bytes, passphrase empty or 8 to 63 characters
/// - **Hardware Addresses**: MAC overrides and simulated MACs must parse
/// - **Timings**: bring-up timeout and poll interval must be positive
/// - **Polling Loop**: the increment must be positive and below the limit
/// - **Event Queue**: must hold at least one event
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.modbus.port < 1 || config.modbus.port > 65534 {
        anyhow::bail!("Invalid Modbus port number: {}", config.modbus.port);
    }
    if config.mdns.port < 1 || config.mdns.port > 65534 {
        anyhow::bail!("Invalid mDNS port number: {}", config.mdns.port);
    }

    if !is_valid_ip_address(&config.modbus.address) {
        // Host names are resolved at bind time
        warn!(
            "Potentially invalid address format: {}",
            config.modbus.address
        );
    }

    if config.modbus.event_queue_capacity == 0 {
        anyhow::bail!("Modbus event queue capacity must be at least 1");
    }

    let network = &config.network;
    if !network.ethernet.enabled && !network.wifi.enabled {
        anyhow::bail!("At least one of Ethernet and Wi-Fi must be enabled");
    }
    if network.ethernet.connect_timeout_ms == 0 {
        anyhow::bail!("Ethernet connect timeout must be greater than zero");
    }
    if network.poll_interval_ms == 0 {
        anyhow::bail!("Link poll interval must be greater than zero");
    }
    if network.monitor_interval_ms == 0 {
        anyhow::bail!("Link monitor interval must be greater than zero");
    }

    if let Some(mac) = &network.ethernet.mac_address {
        mac.parse::<MacAddress>()
            .with_context(|| format!("Invalid Ethernet MAC address override: {}", mac))?;
    }
    if network.ethernet.driver == LinkDriverType::Simulated {
        network
            .ethernet
            .simulated
            .mac_address
            .parse::<MacAddress>()
            .context("Invalid simulated Ethernet MAC address")?;
    }
    if network.wifi.driver == LinkDriverType::Simulated {
        network
            .wifi
            .simulated
            .mac_address
            .parse::<MacAddress>()
            .context("Invalid simulated Wi-Fi MAC address")?;
    }

    let wifi = &network.wifi;
    if wifi.ssid.len() > MAX_SSID_LEN {
        anyhow::bail!(
            "Wi-Fi SSID is {} bytes long, at most {} are allowed",
            wifi.ssid.len(),
            MAX_SSID_LEN
        );
    }
    let password_len = wifi.password.chars().count();
    if !wifi.password.is_empty() && !(8..=63).contains(&password_len) {
        anyhow::bail!("Wi-Fi password must be empty or between 8 and 63 characters");
    }
    if wifi.enabled && wifi.driver == LinkDriverType::Sysfs && wifi.ssid.is_empty() {
        debug!("No Wi-Fi SSID configured, relying on the system supplicant");
    }

    let controller = &config.controller;
    if controller.channel_data_offset.is_nan() || controller.channel_data_offset <= 0.0 {
        anyhow::bail!(
            "Controller increment must be positive, got {}",
            controller.channel_data_offset
        );
    }
    if controller.channel_data_offset >= controller.channel_data_max {
        anyhow::bail!(
            "Controller increment {} must be below the limit {}",
            controller.channel_data_offset,
            controller.channel_data_max
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_is_valid_ip_address() {
        assert!(is_valid_ip_address("0.0.0.0"));
        assert!(is_valid_ip_address("192.168.1.20"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("not an address"));
    }

    #[test]
    fn test_rejects_port_zero() {
        let mut config = Config::default();
        config.modbus.port = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_rejects_long_ssid() {
        let mut config = Config::default();
        config.network.wifi.ssid = "x".repeat(33);
        assert!(validate_specific_rules(&config).is_err());

        config.network.wifi.ssid = "x".repeat(32);
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_password_length() {
        let mut config = Config::default();
        config.network.wifi.password = "short".to_string();
        assert!(validate_specific_rules(&config).is_err());

        config.network.wifi.password = "long-enough".to_string();
        assert!(validate_specific_rules(&config).is_ok());

        config.network.wifi.password = "p".repeat(64);
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_mac_override() {
        let mut config = Config::default();
        config.network.ethernet.mac_address = Some("02:00:00:12:34".to_string());
        assert!(validate_specific_rules(&config).is_err());

        config.network.ethernet.mac_address = Some("02:00:00:12:34:56".to_string());
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_requires_one_link() {
        let mut config = Config::default();
        config.network.ethernet.enabled = false;
        config.network.wifi.enabled = false;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_controller_increment_bounds() {
        let mut config = Config::default();
        config.controller.channel_data_offset = 0.0;
        assert!(validate_specific_rules(&config).is_err());

        config.controller.channel_data_offset = 12.0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_schema_accepts_defaults() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(validate_against_schema(&json).is_ok());
    }

    #[test]
    fn test_schema_rejects_wrong_type() {
        let json = serde_json::json!({ "modbus": { "port": "not-a-port" } });
        assert!(validate_against_schema(&json).is_err());
    }
}
