// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! mDNS service advertisement
//!
//! Masters on the local network discover the slave through a `_modbus._tcp`
//! service record. This module builds that record from the configuration and
//! the link that actually came up, and hands it to an [`MdnsResponder`].
//! Answering multicast queries is left to the host's responder; the bundled
//! [`LogResponder`] only reports what would be announced.

use std::fmt;

use anyhow::Result;
use log::info;

use crate::config::{MdnsConfig, ModbusConfig};
use crate::network::MacAddress;

/// Service type advertised by the slave
pub const SERVICE_TYPE: &str = "_modbus";

/// Transport protocol of the advertised service
pub const SERVICE_PROTO: &str = "_tcp";

/// A `_modbus._tcp` service record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAdvertisement {
    pub hostname: String,
    pub instance_name: String,
    pub port: u16,
    /// TXT items in announcement order
    pub txt: Vec<(String, String)>,
}

impl ServiceAdvertisement {
    /// Build the record of a slave reachable through the link with `mac`.
    pub fn new(mdns: &MdnsConfig, modbus: &ModbusConfig, mac: MacAddress) -> Self {
        Self {
            hostname: format!("{}_{:02X}", mdns.hostname_prefix, modbus.slave_address),
            instance_name: mdns.instance_name.clone(),
            port: mdns.port,
            txt: vec![
                ("board".to_string(), mdns.board.clone()),
                ("mac".to_string(), mac.to_compact_hex()),
                ("mb_id".to_string(), device_id_hex(modbus.device_id)),
            ],
        }
    }

    /// Full service name, e.g. `mb_slave_tcp_01._modbus._tcp.local`
    pub fn service_name(&self) -> String {
        format!("{}.{}.{}.local", self.hostname, SERVICE_TYPE, SERVICE_PROTO)
    }

    /// Value of a TXT item
    pub fn txt_value(&self, key: &str) -> Option<&str> {
        self.txt
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ServiceAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) port {}",
            self.service_name(),
            self.instance_name,
            self.port
        )?;
        for (key, value) in &self.txt {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Device id as upper-case hex, least significant byte first
fn device_id_hex(device_id: u32) -> String {
    device_id
        .to_le_bytes()
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect()
}

/// Publishes a service record on the local network.
pub trait MdnsResponder: Send {
    /// Start answering for `advertisement`
    fn announce(&mut self, advertisement: &ServiceAdvertisement) -> Result<()>;

    /// Remove the record announced last, if any
    fn withdraw(&mut self) -> Result<()>;
}

/// Responder that only logs the record.
#[derive(Debug, Default)]
pub struct LogResponder {
    announced: Option<ServiceAdvertisement>,
}

impl LogResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record currently announced
    pub fn announced(&self) -> Option<&ServiceAdvertisement> {
        self.announced.as_ref()
    }
}

impl MdnsResponder for LogResponder {
    fn announce(&mut self, advertisement: &ServiceAdvertisement) -> Result<()> {
        info!("mdns hostname set to: [{}]", advertisement.hostname);
        info!("mdns service: {}", advertisement);
        self.announced = Some(advertisement.clone());
        Ok(())
    }

    fn withdraw(&mut self) -> Result<()> {
        if let Some(advertisement) = self.announced.take() {
            info!("mdns service withdrawn: {}", advertisement.service_name());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        MacAddress([0x02, 0x00, 0x00, 0x12, 0x34, 0x56])
    }

    #[test]
    fn test_default_record() {
        let ad = ServiceAdvertisement::new(&MdnsConfig::default(), &ModbusConfig::default(), mac());

        assert_eq!(ad.hostname, "mb_slave_tcp_01");
        assert_eq!(ad.instance_name, "esp32_mb_slave_tcp");
        assert_eq!(ad.port, 502);
        assert_eq!(ad.service_name(), "mb_slave_tcp_01._modbus._tcp.local");
        assert_eq!(ad.txt_value("board"), Some("esp32"));
        assert_eq!(ad.txt_value("mac"), Some("020000123456"));
        assert_eq!(ad.txt_value("mb_id"), Some("33221100"));
        assert_eq!(ad.txt_value("missing"), None);
    }

    #[test]
    fn test_hostname_uses_hex_slave_address() {
        let modbus = ModbusConfig {
            slave_address: 0x2A,
            ..ModbusConfig::default()
        };
        let ad = ServiceAdvertisement::new(&MdnsConfig::default(), &modbus, mac());
        assert_eq!(ad.hostname, "mb_slave_tcp_2A");
    }

    #[test]
    fn test_log_responder_tracks_record() {
        let ad = ServiceAdvertisement::new(&MdnsConfig::default(), &ModbusConfig::default(), mac());
        let mut responder = LogResponder::new();

        responder.announce(&ad).unwrap();
        assert_eq!(responder.announced(), Some(&ad));

        responder.withdraw().unwrap();
        assert!(responder.announced().is_none());
        // Withdrawing twice is harmless
        responder.withdraw().unwrap();
    }
}
