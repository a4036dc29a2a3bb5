// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sysfs link driver for Linux hosts
//!
//! The kernel exposes every network interface as a directory under
//! `/sys/class/net/<interface>`. This driver reads:
//! - `operstate`: the RFC 2863 operational state, `up` when usable
//! - `carrier`: `1` when the physical link is present
//! - `address`: the hardware address
//! - `wireless/`: present only for Wi-Fi interfaces
//!
//! Joining a Wi-Fi network is left to the host's supplicant; the driver checks
//! the station credentials, reports the network it joins and watches the
//! interface state.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use tokio::fs;

use crate::network::{LinkDriver, LinkInfo, LinkKind, MacAddress, NetworkError};

/// Network a Wi-Fi station joins
#[derive(Clone, PartialEq, Eq)]
pub struct StationCredentials {
    pub ssid: String,
    /// WPA2 passphrase, empty for an open network
    pub password: String,
}

impl StationCredentials {
    pub fn new(ssid: &str, password: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
        }
    }

    /// Authentication the station uses for this network
    pub fn auth_mode(&self) -> &'static str {
        if self.password.is_empty() {
            "open"
        } else {
            "WPA2-PSK"
        }
    }

    /// A WPA2 passphrase is 8 to 63 characters
    fn check(&self) -> bool {
        let len = self.password.chars().count();
        len == 0 || (8..=63).contains(&len)
    }
}

// Keeps the passphrase out of the logs
impl fmt::Debug for StationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationCredentials")
            .field("ssid", &self.ssid)
            .field("auth_mode", &self.auth_mode())
            .finish()
    }
}

/// Link driver backed by `/sys/class/net`
pub struct SysfsLinkDriver {
    kind: LinkKind,
    interface_dir: PathBuf,
    interface: String,
    mac_override: Option<MacAddress>,
    credentials: Option<StationCredentials>,
    started: bool,
}

impl SysfsLinkDriver {
    /// Driver for a wired interface
    ///
    /// `mac_override` replaces the address read from sysfs, for boards whose
    /// controller has no factory address.
    pub fn ethernet(root: impl AsRef<Path>, interface: &str, mac_override: Option<MacAddress>) -> Self {
        Self {
            kind: LinkKind::Ethernet,
            interface_dir: root.as_ref().join(interface),
            interface: interface.to_string(),
            mac_override,
            credentials: None,
            started: false,
        }
    }

    /// Driver for a wireless interface in station mode
    pub fn wifi_station(
        root: impl AsRef<Path>,
        interface: &str,
        credentials: StationCredentials,
    ) -> Self {
        Self {
            kind: LinkKind::Wifi,
            interface_dir: root.as_ref().join(interface),
            interface: interface.to_string(),
            mac_override: None,
            credentials: Some(credentials),
            started: false,
        }
    }

    fn io_error(&self, source: std::io::Error) -> NetworkError {
        NetworkError::Io {
            interface: self.interface.clone(),
            source,
        }
    }

    async fn read_attribute(&self, name: &str) -> Result<Option<String>, NetworkError> {
        match fs::read_to_string(self.interface_dir.join(name)).await {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // The kernel refuses to report a carrier on an interface that is down
            Err(e) if e.kind() == ErrorKind::InvalidInput => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn is_dir(path: PathBuf) -> bool {
        fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn check_interface(&self) -> Result<(), NetworkError> {
        if !Self::is_dir(self.interface_dir.clone()).await {
            return Err(NetworkError::InterfaceMissing {
                interface: self.interface.clone(),
            });
        }
        if self.kind == LinkKind::Wifi && !Self::is_dir(self.interface_dir.join("wireless")).await {
            return Err(NetworkError::NotWireless {
                interface: self.interface.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LinkDriver for SysfsLinkDriver {
    fn kind(&self) -> LinkKind {
        self.kind
    }

    async fn start(&mut self) -> Result<(), NetworkError> {
        self.check_interface().await?;
        match &self.credentials {
            Some(credentials) => {
                if !credentials.check() {
                    return Err(NetworkError::InvalidPassphrase {
                        interface: self.interface.clone(),
                    });
                }
                info!(
                    "Connecting to {} ({})...",
                    credentials.ssid,
                    credentials.auth_mode()
                );
            }
            None => info!("{} Started on '{}'", self.kind, self.interface),
        }
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), NetworkError> {
        if self.started {
            info!("{} Stopped on '{}'", self.kind, self.interface);
        }
        self.started = false;
        Ok(())
    }

    async fn is_connected(&mut self) -> Result<bool, NetworkError> {
        if !self.started {
            return Ok(false);
        }
        let operstate = self.read_attribute("operstate").await?;
        let carrier = self.read_attribute("carrier").await?;
        debug!(
            "'{}' operstate={:?} carrier={:?}",
            self.interface, operstate, carrier
        );
        Ok(operstate.as_deref() == Some("up") && carrier.as_deref() != Some("0"))
    }

    async fn reconnect(&mut self) -> Result<(), NetworkError> {
        if !self.started {
            return Err(NetworkError::NotStarted(self.kind));
        }
        if let Some(credentials) = &self.credentials {
            info!("Reconnecting to {}...", credentials.ssid);
        }
        // Association is owned by the host; make sure the interface still exists
        self.check_interface().await
    }

    async fn link_info(&mut self) -> Result<LinkInfo, NetworkError> {
        let mac = match self.mac_override {
            Some(mac) => mac,
            None => self
                .read_attribute("address")
                .await?
                .ok_or_else(|| NetworkError::InterfaceMissing {
                    interface: self.interface.clone(),
                })?
                .parse()?,
        };
        Ok(LinkInfo {
            kind: self.kind,
            interface: self.interface.clone(),
            mac,
            ipv4: None,
        })
    }
}
