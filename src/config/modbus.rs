// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP slave configuration
//!
//! This module defines the structures for configuring the Modbus TCP listener,
//! the identity of the slave, and where each register area starts in the
//! Modbus address space.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP slave.
///
/// # Example
///
/// ```
/// use sensor_modbus_slave::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     port: 1502,
///     address: "127.0.0.1".to_string(),
///     ..ModbusConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ModbusConfig {
    /// The TCP port the slave listens on.
    ///
    /// Valid range is 1-65534. Default value is 502, the standard Modbus TCP port.
    pub port: u16,

    /// The network address the slave binds to.
    ///
    /// Use "0.0.0.0" to accept masters on every interface, "::" for IPv6.
    pub address: String,

    /// Modbus slave address, used in the advertised host name.
    pub slave_address: u8,

    /// 32-bit device identifier, advertised as the `mb_id` TXT item.
    pub device_id: u32,

    /// Number of access events buffered for the polling loop. Events are
    /// dropped while the queue is full.
    pub event_queue_capacity: usize,

    /// Modbus address of the first holding register.
    pub holding_start: u16,

    /// Modbus address of the first input register.
    pub input_start: u16,

    /// Modbus address of the first coil.
    pub coils_start: u16,

    /// Modbus address of the first discrete input.
    pub discrete_start: u16,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            port: 502,
            address: "0.0.0.0".to_string(),
            slave_address: 1,
            device_id: 0x0011_2233,
            event_queue_capacity: 20,
            holding_start: 0,
            input_start: 0,
            coils_start: 0,
            discrete_start: 0,
        }
    }
}
