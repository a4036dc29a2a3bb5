// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the Modbus slave
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema generated from the configuration types.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `network`: Ethernet and Wi-Fi links and the bring-up timings
//! - `modbus`: Modbus TCP listener, slave identity and register offsets
//! - `mdns`: Service advertisement record
//! - `controller`: Parameters of the register polling loop
//!
//! ## Usage
//!
//! ```no_run
//! use sensor_modbus_slave::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()),     // Modbus address
//!     Some(1502),                      // Modbus port
//!     Some("enp3s0".to_string()),      // Ethernet interface
//!     None,                            // Wi-Fi interface
//!     Some("plant-floor".to_string()), // Wi-Fi SSID
//!     None,                            // Wi-Fi password
//!     false,                           // Disable mDNS
//! );
//!
//! println!("Modbus port: {}", config.modbus.port);
//! ```

pub mod controller;
pub mod mdns;
pub mod modbus;
pub mod network;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use controller::ControllerConfig;
pub use mdns::MdnsConfig;
pub use modbus::ModbusConfig;
pub use network::{EthernetConfig, LinkDriverType, NetworkConfig, SimulatedLinkConfig, WifiConfig};
pub use utils::{config_schema, is_valid_ip_address, output_config_schema};

/// Root configuration structure for the Modbus slave.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, allowing for minimal configuration when custom settings
/// are not required.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Network links and bring-up timings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Modbus TCP slave settings.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// mDNS service advertisement.
    #[serde(default)]
    pub mdns: MdnsConfig,

    /// Register polling loop.
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file that fails
    /// validation leaves a `<name>.sample.yaml` with default values next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(err) = utils::validate_against_schema(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            return Err(err);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Validate an in-memory configuration against the schema and the
    /// additional rules
    pub fn validate(&self) -> Result<()> {
        let json_value =
            serde_json::to_value(self).context("Failed to convert configuration to JSON")?;
        utils::validate_against_schema(&json_value)?;
        utils::validate_specific_rules(self)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the existing
    /// configuration.
    ///
    /// # Parameters
    ///
    /// * `modbus_address` - Address the Modbus listener binds to
    /// * `modbus_port` - TCP port of the Modbus listener
    /// * `ethernet_interface` - Name of the wired interface
    /// * `wifi_interface` - Name of the wireless interface
    /// * `wifi_ssid` - Network joined in station mode
    /// * `wifi_password` - Passphrase of that network
    /// * `no_mdns` - If true, disables the mDNS advertisement
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
        ethernet_interface: Option<String>,
        wifi_interface: Option<String>,
        wifi_ssid: Option<String>,
        wifi_password: Option<String>,
        no_mdns: bool,
    ) {
        if let Some(address) = modbus_address {
            debug!("Overriding Modbus address from command line: {}", address);
            self.modbus.address = address;
        }
        if let Some(port) = modbus_port {
            debug!("Overriding Modbus port from command line: {}", port);
            self.modbus.port = port;
        }
        if let Some(interface) = ethernet_interface {
            debug!("Overriding Ethernet interface from command line: {}", interface);
            self.network.ethernet.interface = interface;
        }
        if let Some(interface) = wifi_interface {
            debug!("Overriding Wi-Fi interface from command line: {}", interface);
            self.network.wifi.interface = interface;
        }
        if let Some(ssid) = wifi_ssid {
            debug!("Overriding Wi-Fi SSID from command line: {}", ssid);
            self.network.wifi.ssid = ssid;
        }
        if let Some(password) = wifi_password {
            debug!("Overriding Wi-Fi password from command line");
            self.network.wifi.password = password;
        }
        if no_mdns {
            debug!("Disabling mDNS from command line");
            self.mdns.enabled = false;
        }
    }
}
