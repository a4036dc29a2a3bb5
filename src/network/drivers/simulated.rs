// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated link driver
//!
//! A link that reports a connection a fixed time after it was started, or
//! never. Used to exercise the Ethernet to Wi-Fi fallback on machines without
//! the matching interfaces.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio::time::Instant;

use crate::config::network::SimulatedLinkConfig;
use crate::network::{LinkDriver, LinkInfo, LinkKind, MacAddress, NetworkError};

/// Link driver that simulates link establishment
pub struct SimulatedLinkDriver {
    kind: LinkKind,
    interface: String,
    mac: MacAddress,
    ipv4: Option<Ipv4Addr>,
    /// Delay before the link reports connected, `None` for a dead link
    link_up_after: Option<Duration>,
    started_at: Option<Instant>,
}

impl SimulatedLinkDriver {
    /// Create a simulated link
    pub fn new(
        kind: LinkKind,
        interface: &str,
        mac: MacAddress,
        ipv4: Option<Ipv4Addr>,
        link_up_after: Option<Duration>,
    ) -> Self {
        Self {
            kind,
            interface: interface.to_string(),
            mac,
            ipv4,
            link_up_after,
            started_at: None,
        }
    }

    /// Create a simulated link from its configuration section
    pub fn from_config(
        kind: LinkKind,
        interface: &str,
        config: &SimulatedLinkConfig,
    ) -> Result<Self, NetworkError> {
        let mac = config.mac_address.parse()?;
        let ipv4 = config
            .ipv4
            .as_deref()
            .map(|ip| {
                ip.parse::<Ipv4Addr>()
                    .map_err(|_| NetworkError::InvalidIpv4(ip.to_string()))
            })
            .transpose()?;
        Ok(Self::new(
            kind,
            interface,
            mac,
            ipv4,
            config.link_up_after_ms.map(Duration::from_millis),
        ))
    }
}

#[async_trait]
impl LinkDriver for SimulatedLinkDriver {
    fn kind(&self) -> LinkKind {
        self.kind
    }

    async fn start(&mut self) -> Result<(), NetworkError> {
        info!(
            "{} Started on simulated interface '{}'",
            self.kind, self.interface
        );
        self.started_at = Some(Instant::now());
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), NetworkError> {
        if self.started_at.take().is_some() {
            info!("{} Stopped on '{}'", self.kind, self.interface);
        }
        Ok(())
    }

    async fn is_connected(&mut self) -> Result<bool, NetworkError> {
        Ok(match (self.started_at, self.link_up_after) {
            (Some(started), Some(delay)) => started.elapsed() >= delay,
            _ => false,
        })
    }

    async fn reconnect(&mut self) -> Result<(), NetworkError> {
        if self.started_at.is_none() {
            return Err(NetworkError::NotStarted(self.kind));
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    async fn link_info(&mut self) -> Result<LinkInfo, NetworkError> {
        Ok(LinkInfo {
            kind: self.kind,
            interface: self.interface.clone(),
            mac: self.mac,
            ipv4: self.ipv4,
        })
    }
}
