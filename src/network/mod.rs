// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Network transport selection
//!
//! This module brings up the link the Modbus slave is served on:
//! - Wired Ethernet is tried first and polled until it reports a connection
//!   or the connection timeout expires
//! - Wi-Fi station mode is started when Ethernet does not come up
//! - A fixed settle delay lets the chosen link finish address configuration
//!
//! Link state is read through the [`LinkDriver`] trait so the bring-up
//! sequence does not depend on how a platform exposes its interfaces.

pub mod drivers;

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::config::network::{LinkDriverType, NetworkConfig};

/// Kind of link the slave can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    Wifi,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Ethernet => f.write_str("Ethernet"),
            LinkKind::Wifi => f.write_str("Wi-Fi"),
        }
    }
}

/// Errors raised while bringing up or watching a link
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("network interface '{interface}' not found")]
    InterfaceMissing { interface: String },

    #[error("network interface '{interface}' is not a wireless interface")]
    NotWireless { interface: String },

    #[error("failed to read link state of '{interface}': {source}")]
    Io {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),

    #[error("invalid IPv4 address '{0}'")]
    InvalidIpv4(String),

    #[error("Wi-Fi passphrase for '{interface}' must be empty or 8 to 63 characters")]
    InvalidPassphrase { interface: String },

    #[error("{0} link is not started")]
    NotStarted(LinkKind),

    #[error("no network link available: Ethernet did not come up and Wi-Fi is disabled")]
    NoLink,
}

/// A 48-bit hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Upper-case hex digits without separators, e.g. `020000123456`
    pub fn to_compact_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetworkError::InvalidMac(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

/// Description of an active link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub kind: LinkKind,
    pub interface: String,
    pub mac: MacAddress,
    pub ipv4: Option<Ipv4Addr>,
}

impl fmt::Display for LinkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' HW {}", self.kind, self.interface, self.mac)?;
        if let Some(ip) = self.ipv4 {
            write!(f, " IP {}", ip)?;
        }
        Ok(())
    }
}

/// Link driver trait for hardware abstraction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkDriver: Send + Sync {
    /// Kind of link handled by the driver
    fn kind(&self) -> LinkKind;

    /// Start the link (power up, join the network)
    async fn start(&mut self) -> Result<(), NetworkError>;

    /// Stop the link
    async fn stop(&mut self) -> Result<(), NetworkError>;

    /// Whether the link is up and usable
    async fn is_connected(&mut self) -> Result<bool, NetworkError>;

    /// Ask the link to join the network again after a disconnect
    async fn reconnect(&mut self) -> Result<(), NetworkError>;

    /// Hardware and address information of the link
    async fn link_info(&mut self) -> Result<LinkInfo, NetworkError>;
}

/// Boxed driver as stored by the daemon
pub type BoxedLinkDriver = Box<dyn LinkDriver>;

/// Timing parameters of the bring-up sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpOptions {
    /// How long Ethernet may take to report a connection
    pub ethernet_timeout: Duration,
    /// Interval between link state polls
    pub poll_interval: Duration,
    /// Unconditional wait once a link has been chosen
    pub settle_delay: Duration,
}

impl Default for BringUpOptions {
    fn default() -> Self {
        Self {
            ethernet_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(10000),
        }
    }
}

impl From<&NetworkConfig> for BringUpOptions {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            ethernet_timeout: Duration::from_millis(config.ethernet.connect_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }
}

/// Outcome of a successful bring-up
pub struct BringUpReport {
    /// Driver of the link that is in use
    pub driver: BoxedLinkDriver,
    /// Information about that link
    pub link: LinkInfo,
    /// Time spent waiting for Ethernet
    pub ethernet_wait: Duration,
    /// Whether Wi-Fi was started because Ethernet did not come up
    pub fell_back_to_wifi: bool,
}

impl fmt::Debug for BringUpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BringUpReport")
            .field("link", &self.link)
            .field("ethernet_wait", &self.ethernet_wait)
            .field("fell_back_to_wifi", &self.fell_back_to_wifi)
            .finish()
    }
}

/// Create the drivers described by the network configuration
///
/// Disabled links yield `None`.
pub fn create_drivers(
    config: &NetworkConfig,
) -> Result<(Option<BoxedLinkDriver>, Option<BoxedLinkDriver>), NetworkError> {
    let ethernet: Option<BoxedLinkDriver> = if config.ethernet.enabled {
        Some(match config.ethernet.driver {
            LinkDriverType::Sysfs => Box::new(drivers::SysfsLinkDriver::ethernet(
                &config.sysfs_root,
                &config.ethernet.interface,
                config
                    .ethernet
                    .mac_address
                    .as_deref()
                    .map(str::parse)
                    .transpose()?,
            )),
            LinkDriverType::Simulated => Box::new(drivers::SimulatedLinkDriver::from_config(
                LinkKind::Ethernet,
                &config.ethernet.interface,
                &config.ethernet.simulated,
            )?),
        })
    } else {
        None
    };

    let wifi: Option<BoxedLinkDriver> = if config.wifi.enabled {
        Some(match config.wifi.driver {
            LinkDriverType::Sysfs => Box::new(drivers::SysfsLinkDriver::wifi_station(
                &config.sysfs_root,
                &config.wifi.interface,
                drivers::StationCredentials::new(&config.wifi.ssid, &config.wifi.password),
            )),
            LinkDriverType::Simulated => Box::new(drivers::SimulatedLinkDriver::from_config(
                LinkKind::Wifi,
                &config.wifi.interface,
                &config.wifi.simulated,
            )?),
        })
    } else {
        None
    };

    Ok((ethernet, wifi))
}

/// Link state of `driver`, a failed read counting as disconnected
async fn poll_connected(driver: &mut BoxedLinkDriver) -> bool {
    match driver.is_connected().await {
        Ok(connected) => connected,
        Err(e) => {
            warn!("Failed to read {} link state: {}", driver.kind(), e);
            false
        }
    }
}

/// Bring up the network: Ethernet first, Wi-Fi station mode as fallback
///
/// 1. Start Ethernet and poll it until connected or `ethernet_timeout` elapses
/// 2. If Ethernet is not connected, stop it and start Wi-Fi
/// 3. Wait `settle_delay` unconditionally
///
/// An Ethernet driver that fails to start or to report its state is treated
/// as a link that never came up.
///
/// # Errors
///
/// Returns [`NetworkError::NoLink`] when Ethernet did not come up and no
/// Wi-Fi driver is available, or the error of the Wi-Fi driver if it fails
/// to start.
pub async fn bring_up(
    ethernet: Option<BoxedLinkDriver>,
    wifi: Option<BoxedLinkDriver>,
    options: BringUpOptions,
) -> Result<BringUpReport, NetworkError> {
    let started_at = Instant::now();
    let mut connected_ethernet = None;

    if let Some(mut eth) = ethernet {
        match eth.start().await {
            Ok(()) => {
                let mut connected = poll_connected(&mut eth).await;
                while !connected {
                    time::sleep(options.poll_interval).await;
                    let elapsed = started_at.elapsed();
                    debug!("Waiting for Ethernet link: {} ms", elapsed.as_millis());
                    connected = poll_connected(&mut eth).await;
                    if elapsed > options.ethernet_timeout {
                        break;
                    }
                }
                if connected {
                    connected_ethernet = Some(eth);
                } else {
                    warn!(
                        "Ethernet link not up after {} ms, stopping Ethernet",
                        started_at.elapsed().as_millis()
                    );
                    if let Err(e) = eth.stop().await {
                        warn!("Failed to stop Ethernet: {}", e);
                    }
                }
            }
            Err(e) => warn!("Ethernet failed to start: {}", e),
        }
    } else {
        debug!("Ethernet disabled, skipping");
    }
    let ethernet_wait = started_at.elapsed();

    let (mut driver, fell_back_to_wifi) = match connected_ethernet {
        Some(eth) => (eth, false),
        None => {
            let mut wifi = wifi.ok_or(NetworkError::NoLink)?;
            info!("Starting Wi-Fi station mode");
            wifi.start().await?;
            (wifi, true)
        }
    };

    debug!(
        "Waiting {} ms for the network to settle",
        options.settle_delay.as_millis()
    );
    time::sleep(options.settle_delay).await;

    let link = driver.link_info().await?;
    if !driver.is_connected().await? {
        warn!("{} link selected but not connected yet", link.kind);
    }
    info!("Network ready on {}", link);

    Ok(BringUpReport {
        driver,
        link,
        ethernet_wait,
        fell_back_to_wifi,
    })
}

/// Watch the active link and ask it to reconnect when it drops
///
/// Runs until `running` is cleared. Returns the driver so the caller can stop
/// it on shutdown.
pub async fn monitor_link(
    mut driver: BoxedLinkDriver,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> BoxedLinkDriver {
    let kind = driver.kind();
    let mut was_connected = true;

    while running.load(Ordering::SeqCst) {
        time::sleep(interval).await;
        let connected = match driver.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Failed to read {} link state: {}", kind, e);
                continue;
            }
        };

        if was_connected && !connected {
            match kind {
                LinkKind::Ethernet => info!("Ethernet Link Down"),
                LinkKind::Wifi => info!("Wi-Fi disconnected, trying to reconnect..."),
            }
            if let Err(e) = driver.reconnect().await {
                warn!("{} reconnect failed: {}", kind, e);
            }
        } else if !was_connected && connected {
            info!("{} Link Up", kind);
        }
        was_connected = connected;
    }

    driver
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn link(kind: LinkKind) -> LinkInfo {
        LinkInfo {
            kind,
            interface: "test0".to_string(),
            mac: MacAddress([2, 0, 0, 0x12, 0x34, 0x56]),
            ipv4: None,
        }
    }

    fn options() -> BringUpOptions {
        BringUpOptions {
            ethernet_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_mac_parse_and_format() {
        let mac: MacAddress = "02:00:00:12:34:5a".parse().unwrap();
        assert_eq!(mac.0, [0x02, 0x00, 0x00, 0x12, 0x34, 0x5A]);
        assert_eq!(mac.to_string(), "02:00:00:12:34:5a");
        assert_eq!(mac.to_compact_hex(), "02000012345A");

        assert!("02:00:00:12:34".parse::<MacAddress>().is_err());
        assert!("02:00:00:12:34:zz".parse::<MacAddress>().is_err());
        assert!("002:00:00:12:34:56".parse::<MacAddress>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ethernet_connected_skips_wifi() {
        let mut eth = MockLinkDriver::new();
        eth.expect_start().times(1).returning(|| Ok(()));
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        eth.expect_is_connected()
            .returning(move || Ok(counter.fetch_add(1, Ordering::SeqCst) >= 3));
        eth.expect_stop().never();
        eth.expect_link_info()
            .returning(|| Ok(link(LinkKind::Ethernet)));

        let mut wifi = MockLinkDriver::new();
        wifi.expect_start().never();

        let report = bring_up(Some(Box::new(eth)), Some(Box::new(wifi)), options())
            .await
            .unwrap();

        assert_eq!(report.link.kind, LinkKind::Ethernet);
        assert!(!report.fell_back_to_wifi);
        assert!(report.ethernet_wait < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ethernet_timeout_falls_back_to_wifi() {
        let mut eth = MockLinkDriver::new();
        eth.expect_start().times(1).returning(|| Ok(()));
        eth.expect_is_connected().returning(|| Ok(false));
        eth.expect_stop().times(1).returning(|| Ok(()));

        let mut wifi = MockLinkDriver::new();
        wifi.expect_start().times(1).returning(|| Ok(()));
        wifi.expect_is_connected().returning(|| Ok(true));
        wifi.expect_link_info().returning(|| Ok(link(LinkKind::Wifi)));

        let started = Instant::now();
        let report = bring_up(Some(Box::new(eth)), Some(Box::new(wifi)), options())
            .await
            .unwrap();

        assert_eq!(report.link.kind, LinkKind::Wifi);
        assert!(report.fell_back_to_wifi);
        assert!(report.ethernet_wait >= Duration::from_millis(100));
        // Settle delay is always applied
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ethernet_start_failure_falls_back_to_wifi() {
        let mut eth = MockLinkDriver::new();
        eth.expect_start().times(1).returning(|| {
            Err(NetworkError::InterfaceMissing {
                interface: "eth0".to_string(),
            })
        });
        eth.expect_is_connected().never();

        let mut wifi = MockLinkDriver::new();
        wifi.expect_start().times(1).returning(|| Ok(()));
        wifi.expect_is_connected().returning(|| Ok(true));
        wifi.expect_link_info().returning(|| Ok(link(LinkKind::Wifi)));

        let report = bring_up(Some(Box::new(eth)), Some(Box::new(wifi)), options())
            .await
            .unwrap();
        assert!(report.fell_back_to_wifi);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ethernet_state_error_falls_back_to_wifi() {
        let mut eth = MockLinkDriver::new();
        eth.expect_kind().return_const(LinkKind::Ethernet);
        eth.expect_start().times(1).returning(|| Ok(()));
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        eth.expect_is_connected().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                Err(NetworkError::Io {
                    interface: "eth0".to_string(),
                    source: std::io::Error::from_raw_os_error(5),
                })
            } else {
                Ok(false)
            }
        });
        eth.expect_stop().times(1).returning(|| Ok(()));

        let mut wifi = MockLinkDriver::new();
        wifi.expect_start().times(1).returning(|| Ok(()));
        wifi.expect_is_connected().returning(|| Ok(true));
        wifi.expect_link_info().returning(|| Ok(link(LinkKind::Wifi)));

        let report = bring_up(Some(Box::new(eth)), Some(Box::new(wifi)), options())
            .await
            .unwrap();

        assert_eq!(report.link.kind, LinkKind::Wifi);
        assert!(report.fell_back_to_wifi);
        assert!(polls.load(Ordering::SeqCst) > 3);
    }

    #[tokio::test]
    async fn test_create_drivers_passes_wifi_passphrase() {
        let root = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("wlan0/wireless")).unwrap();

        let mut config = NetworkConfig::default();
        config.ethernet.enabled = false;
        config.sysfs_root = root.path().to_string_lossy().into_owned();
        config.wifi.ssid = "plant-floor".to_string();
        config.wifi.password = "short".to_string();

        let (ethernet, wifi) = create_drivers(&config).unwrap();
        assert!(ethernet.is_none());
        let mut wifi = wifi.unwrap();
        assert!(matches!(
            wifi.start().await,
            Err(NetworkError::InvalidPassphrase { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_link_without_wifi() {
        let mut eth = MockLinkDriver::new();
        eth.expect_start().returning(|| Ok(()));
        eth.expect_is_connected().returning(|| Ok(false));
        eth.expect_stop().returning(|| Ok(()));

        let result = bring_up(Some(Box::new(eth)), None, options()).await;
        assert!(matches!(result, Err(NetworkError::NoLink)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ethernet_disabled_starts_wifi_directly() {
        let mut wifi = MockLinkDriver::new();
        wifi.expect_start().times(1).returning(|| Ok(()));
        wifi.expect_is_connected().returning(|| Ok(true));
        wifi.expect_link_info().returning(|| Ok(link(LinkKind::Wifi)));

        let report = bring_up(None, Some(Box::new(wifi)), options()).await.unwrap();
        assert_eq!(report.link.kind, LinkKind::Wifi);
        assert_eq!(report.ethernet_wait, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reconnects_after_drop() {
        let running = Arc::new(AtomicBool::new(true));
        let polls = Arc::new(AtomicUsize::new(0));

        let mut wifi = MockLinkDriver::new();
        wifi.expect_kind().return_const(LinkKind::Wifi);
        let counter = polls.clone();
        let stop = running.clone();
        wifi.expect_is_connected().returning(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n >= 4 {
                stop.store(false, Ordering::SeqCst);
            }
            // Drops on the second poll, comes back on the third
            Ok(n != 1)
        });
        wifi.expect_reconnect().times(1).returning(|| Ok(()));

        monitor_link(Box::new(wifi), Duration::from_millis(10), running).await;
        assert!(polls.load(Ordering::SeqCst) >= 5);
    }
}
