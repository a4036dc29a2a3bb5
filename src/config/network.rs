// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Network link configuration
//!
//! This module defines the structures for configuring the Ethernet and Wi-Fi
//! links and the timings of the bring-up sequence.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Driver used to observe a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkDriverType {
    /// Linux network interface read from sysfs
    Sysfs,
    /// Simulated link, for development and tests
    Simulated,
}

/// Behaviour of a simulated link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SimulatedLinkConfig {
    /// Milliseconds after start before the link reports connected.
    /// `null` simulates a link that never comes up.
    pub link_up_after_ms: Option<u64>,

    /// Hardware address reported by the link.
    pub mac_address: String,

    /// IPv4 address reported by the link.
    #[serde(default)]
    pub ipv4: Option<String>,
}

/// Configuration of the wired link.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EthernetConfig {
    /// Try Ethernet before Wi-Fi.
    pub enabled: bool,

    /// Driver observing the link.
    pub driver: LinkDriverType,

    /// Interface name, e.g. `eth0`.
    pub interface: String,

    /// Hardware address to report instead of the interface's own, for
    /// controllers without a factory address.
    pub mac_address: Option<String>,

    /// How long to wait for the link before falling back to Wi-Fi.
    pub connect_timeout_ms: u64,

    /// Settings used when `driver` is `simulated`.
    pub simulated: SimulatedLinkConfig,
}

impl Default for EthernetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: LinkDriverType::Sysfs,
            interface: "eth0".to_string(),
            mac_address: None,
            connect_timeout_ms: 5000,
            simulated: SimulatedLinkConfig {
                link_up_after_ms: Some(100),
                // Locally administered range, only for LANs under your control
                mac_address: "02:00:00:12:34:56".to_string(),
                ipv4: None,
            },
        }
    }
}

/// Configuration of the Wi-Fi station link.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WifiConfig {
    /// Fall back to Wi-Fi when Ethernet does not come up.
    pub enabled: bool,

    /// Driver observing the link.
    pub driver: LinkDriverType,

    /// Interface name, e.g. `wlan0`.
    pub interface: String,

    /// Network to join (at most 32 bytes).
    pub ssid: String,

    /// WPA passphrase, empty for an open network (8 to 63 characters otherwise).
    pub password: String,

    /// Settings used when `driver` is `simulated`.
    pub simulated: SimulatedLinkConfig,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: LinkDriverType::Sysfs,
            interface: "wlan0".to_string(),
            ssid: String::new(),
            password: String::new(),
            simulated: SimulatedLinkConfig {
                link_up_after_ms: Some(500),
                mac_address: "02:00:00:12:34:57".to_string(),
                ipv4: None,
            },
        }
    }
}

/// Configuration of the network bring-up.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NetworkConfig {
    /// Wired link, tried first.
    pub ethernet: EthernetConfig,

    /// Wireless fallback link.
    pub wifi: WifiConfig,

    /// Interval between link state polls during bring-up.
    pub poll_interval_ms: u64,

    /// Unconditional wait after a link has been chosen, before the Modbus
    /// slave starts.
    pub settle_delay_ms: u64,

    /// Interval between link checks once the slave is running.
    pub monitor_interval_ms: u64,

    /// Root of the sysfs network class directory.
    pub sysfs_root: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ethernet: EthernetConfig::default(),
            wifi: WifiConfig::default(),
            poll_interval_ms: 10,
            settle_delay_ms: 10000,
            monitor_interval_ms: 1000,
            sysfs_root: "/sys/class/net".to_string(),
        }
    }
}
