// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling loop configuration

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters of the register polling loop.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ControllerConfig {
    /// The loop ends once `holding_data0` reaches this value.
    pub channel_data_max: f32,

    /// Amount added to `holding_data0` each time a master accesses it.
    pub channel_data_offset: f32,

    /// Delay between the end of the loop and the shutdown of the slave.
    pub destroy_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channel_data_max: 10.0,
            channel_data_offset: 1.1,
            destroy_delay_ms: 1000,
        }
    }
}
