// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the sensor node Modbus TCP slave
use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use tokio::signal;

use sensor_modbus_slave::config::{self, Config};
use sensor_modbus_slave::daemon::Daemon;

/// Modbus TCP slave for a networked sensor node
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Modbus slave bind address
    #[arg(long)]
    modbus_address: Option<String>,

    /// Modbus slave port
    #[arg(long)]
    modbus_port: Option<u16>,

    /// Wired network interface
    #[arg(long)]
    ethernet_interface: Option<String>,

    /// Wireless network interface
    #[arg(long)]
    wifi_interface: Option<String>,

    /// Wi-Fi network to join when Ethernet is down
    #[arg(long)]
    wifi_ssid: Option<String>,

    /// Wi-Fi passphrase
    #[arg(long)]
    wifi_password: Option<String>,

    /// Do not announce the slave over mDNS
    #[arg(long)]
    no_mdns: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.modbus_address.clone(),
        args.modbus_port,
        args.ethernet_interface.clone(),
        args.wifi_interface.clone(),
        args.wifi_ssid.clone(),
        args.wifi_password.clone(),
        args.no_mdns,
    );
    config.validate()?;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal, terminating daemon"),
            Err(err) => error!("Error waiting for shutdown signal: {}", err),
        },
        exit = daemon.wait_for_controller() => match exit {
            Ok(Some(exit)) => info!("Modbus slave stopped: {}", exit),
            Ok(None) => {}
            Err(err) => error!("Polling loop failed: {:#}", err),
        },
    }

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
