// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Link drivers
//!
//! This module provides different link driver implementations:
//! - Sysfs: Link state of Linux network interfaces read from `/sys/class/net`
//! - Simulated: Links that come up after a fixed delay, for development and tests

pub mod simulated;
pub mod sysfs;

pub use simulated::SimulatedLinkDriver;
pub use sysfs::{StationCredentials, SysfsLinkDriver};
