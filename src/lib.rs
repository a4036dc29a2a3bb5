// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor node Modbus TCP slave
//!
//! This library brings up a network link (wired Ethernet with a fallback to
//! Wi-Fi station mode), exposes a fixed set of sensor registers through a
//! Modbus TCP slave, and runs the polling loop reacting to master accesses.

pub mod config;
pub mod controller;
pub mod daemon;
pub mod mdns;
pub mod modbus;
pub mod network;
pub mod registers;
