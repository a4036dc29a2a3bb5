// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the Modbus slave and its background tasks:
//!
//! - Link monitoring, reconnecting the active link when it drops
//! - The Modbus TCP server
//! - The register polling loop
//! - System health monitoring (heartbeat)
//!
//! ## Usage
//!
//! ```no_run
//! use sensor_modbus_slave::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Wait until the polling loop ends
//!     daemon.wait_for_controller().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::controller::{create_register_map, LoopExit, RegisterAreas, SlaveController};
use crate::mdns::{LogResponder, MdnsResponder, ServiceAdvertisement};
use crate::modbus::{event_channel, serve, SlaveService};
use crate::network::{self, BringUpOptions, LinkInfo};
use crate::registers::SharedRegisters;

/// Interval at which the server task checks the running flag
const SERVER_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Responder shared between the daemon and the polling loop task
type SharedResponder = Arc<Mutex<Box<dyn MdnsResponder>>>;

/// Represents a daemon task manager that coordinates the slave's services
///
/// # Thread Safety
///
/// The `running` flag is wrapped in an `Arc` to allow safe sharing between
/// tasks. Each task checks this flag periodically to determine if it should
/// continue running or gracefully terminate.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    controller: Option<JoinHandle<Result<LoopExit>>>,
    responder: SharedResponder,
    registers: Option<(SharedRegisters, RegisterAreas)>,
    link: Option<LinkInfo>,
    local_addr: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance announcing through a [`LogResponder`]
    ///
    /// # Examples
    ///
    /// ```
    /// use sensor_modbus_slave::daemon::launch_daemon::Daemon;
    ///
    /// let daemon = Daemon::new();
    /// assert!(daemon.local_addr().is_none());
    /// ```
    pub fn new() -> Self {
        Self::with_responder(Box::new(LogResponder::new()))
    }

    /// Create a new daemon instance announcing through `responder`
    pub fn with_responder(responder: Box<dyn MdnsResponder>) -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            controller: None,
            responder: Arc::new(Mutex::new(responder)),
            registers: None,
            link: None,
            local_addr: None,
        }
    }

    /// Bring up the network and start the Modbus slave
    ///
    /// 1. Ethernet, falling back to Wi-Fi station mode, then the settle delay
    /// 2. Register map with the four area descriptors, inputs set to their
    ///    known state
    /// 3. Modbus listener bound on the configured address
    /// 4. mDNS announcement, when enabled
    /// 5. Link monitor, server, polling loop and heartbeat tasks
    ///
    /// # Errors
    ///
    /// This function can fail if:
    /// * No link could be brought up
    /// * The register areas cannot be registered
    /// * The listener fails to bind to the specified address/port
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let (ethernet, wifi) = network::create_drivers(&config.network)
            .context("Failed to create network drivers")?;
        let report = network::bring_up(ethernet, wifi, BringUpOptions::from(&config.network))
            .await
            .context("Network bring-up failed")?;
        if report.fell_back_to_wifi {
            info!(
                "Using Wi-Fi after waiting {} ms for Ethernet",
                report.ethernet_wait.as_millis()
            );
        }
        let link = report.link.clone();
        self.start_link_monitor(report.driver, config)?;

        let (registers, areas) =
            create_register_map(&config.modbus).context("Failed to register Modbus areas")?;
        let (events_tx, events_rx) = event_channel(config.modbus.event_queue_capacity);
        let controller = SlaveController::new(
            registers.clone(),
            areas,
            events_rx,
            config.controller.clone(),
            self.running.clone(),
        );
        controller
            .setup_reg_data()
            .context("Failed to set register data")?;

        let listener = TcpListener::bind((config.modbus.address.as_str(), config.modbus.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind Modbus listener on {}:{}",
                    config.modbus.address, config.modbus.port
                )
            })?;
        let local_addr = listener.local_addr()?;
        info!("Modbus slave stack initialized on {}", local_addr);

        if config.mdns.enabled {
            let advertisement = ServiceAdvertisement::new(&config.mdns, &config.modbus, link.mac);
            self.responder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .announce(&advertisement)?;
        }

        self.start_modbus_server(listener, SlaveService::new(registers.clone(), events_tx))?;
        self.start_controller(controller, config)?;
        self.start_heartbeat()?;

        self.registers = Some((registers, areas));
        self.link = Some(link);
        self.local_addr = Some(local_addr);
        Ok(())
    }

    /// Keep the active link up until shutdown, then stop it
    fn start_link_monitor(
        &mut self,
        driver: network::BoxedLinkDriver,
        config: &Config,
    ) -> Result<()> {
        let running = self.running.clone();
        let interval = Duration::from_millis(config.network.monitor_interval_ms);
        let task = tokio::spawn(async move {
            let mut driver = network::monitor_link(driver, interval, running).await;
            info!("Stopping {} link", driver.kind());
            driver.stop().await?;
            anyhow::Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Serve Modbus masters until the running flag is cleared
    fn start_modbus_server(&mut self, listener: TcpListener, service: SlaveService) -> Result<()> {
        let running = self.running.clone();

        let task = tokio::spawn(async move {
            let server_handle = tokio::spawn(async move {
                if let Err(e) = serve(listener, service).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) && !server_handle.is_finished() {
                time::sleep(SERVER_CHECK_INTERVAL).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();

            match time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => {
                    // If it times out, just log and continue - we don't want to block shutdown
                    warn!("Modbus server shutdown timed out, forcing termination");
                }
            }

            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server started");
        Ok(())
    }

    /// Run the polling loop; when it ends on its own, tear the slave down
    fn start_controller(&mut self, mut controller: SlaveController, config: &Config) -> Result<()> {
        let running = self.running.clone();
        let responder = self.responder.clone();
        let destroy_delay = Duration::from_millis(config.controller.destroy_delay_ms);

        let task = tokio::spawn(async move {
            let result = controller.run().await;
            match &result {
                Ok(exit) => info!("Polling loop finished: {}", exit),
                Err(e) => error!("Polling loop failed: {}", e),
            }

            if !matches!(result, Ok(LoopExit::Shutdown)) {
                info!("Modbus controller destroyed.");
                time::sleep(destroy_delay).await;
                running.store(false, Ordering::SeqCst);
            }

            if let Err(e) = responder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .withdraw()
            {
                warn!("Failed to withdraw mDNS service: {}", e);
            }
            anyhow::Ok(result?)
        });

        self.controller = Some(task);
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let started = chrono::Utc::now();
        let task = tokio::spawn(async move {
            let mut ticks: u64 = 0;
            while running.load(Ordering::SeqCst) {
                // Check the flag often, log once a minute
                if ticks % 600 == 0 {
                    debug!("Daemon heartbeat: running since {}", started.to_rfc3339());
                }
                ticks += 1;
                time::sleep(Duration::from_millis(100)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Address the Modbus listener is bound to, once launched
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Link chosen during bring-up, once launched
    pub fn link(&self) -> Option<&LinkInfo> {
        self.link.as_ref()
    }

    /// Registers served by the slave, once launched
    pub fn registers(&self) -> Option<&(SharedRegisters, RegisterAreas)> {
        self.registers.as_ref()
    }

    /// Whether the daemon's tasks are still meant to run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the polling loop to end
    ///
    /// Returns `None` if the loop was never started or was already awaited.
    /// Dropping the returned future keeps the loop attached to the daemon, so
    /// [`Daemon::join`] still waits for it.
    pub async fn wait_for_controller(&mut self) -> Result<Option<LoopExit>> {
        let Some(handle) = self.controller.as_mut() else {
            return Ok(None);
        };
        let result = handle.await;
        self.controller = None;
        let exit = result.context("Polling loop task panicked")??;
        Ok(Some(exit))
    }

    /// Signal all tasks to stop
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        // Tasks should check the running flag and terminate gracefully
    }

    /// Wait for all tasks to complete
    ///
    /// Consumes the daemon and waits up to 5 seconds for each spawned task.
    /// Task failures and panics are logged, not returned.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => {
                    // Task didn't complete within timeout
                    warn!("Task did not complete within timeout period, may be hung");
                }
            }
        }

        if let Some(controller) = self.controller {
            match time::timeout(Duration::from_secs(5), controller).await {
                Ok(Ok(Ok(exit))) => debug!("Polling loop ended: {}", exit),
                Ok(Ok(Err(e))) => error!("Polling loop failed: {:#}", e),
                Ok(Err(e)) => error!("Polling loop panicked: {}", e),
                Err(_) => warn!("Polling loop did not complete within timeout period"),
            }
        }
        Ok(())
    }
}
