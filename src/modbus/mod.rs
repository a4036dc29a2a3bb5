// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the Modbus TCP slave of the sensor node, allowing
//! masters to read the sensor readings and to write the holding registers and
//! coils.
//!
//! ## Key Components
//!
//! - `SlaveService`: The service answering Modbus requests from the shared
//!   register map.
//! - `AccessEvent`: Published for every access the service served, consumed by
//!   the polling loop.
//!
//! ## Register Map
//!
//! With the default configuration every area starts at Modbus address 0.
//!
//! ### Input Registers (Read-Only)
//!
//! - Registers 0-37: Sensor readings (floats take two registers, low word first)
//! - Registers 38-187: Data registers
//!
//! ### Holding Registers (Read/Write)
//!
//! - Registers 0-7: `holding_data0` to `holding_data3` (floats)
//! - Registers 8-157: Test registers
//!
//! ### Coils (Read/Write)
//!
//! - Coils 0-7: port 0
//! - Coils 8-15: port 1, all set when the polling loop raises its alarm
//!
//! ### Discrete Inputs (Read-Only)
//!
//! - Inputs 0-15: ports 0 and 1

pub mod modbus_server;
pub use modbus_server::{
    event_channel, serve, AccessEvent, AccessKind, EventMask, EventReceiver, EventSender,
    SlaveService,
};
