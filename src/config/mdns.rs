// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! mDNS advertisement configuration

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration of the `_modbus._tcp` service record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MdnsConfig {
    /// Announce the slave once the network is up.
    pub enabled: bool,

    /// Host name prefix; the slave address is appended as `_XX`.
    pub hostname_prefix: String,

    /// Default instance name of the service.
    pub instance_name: String,

    /// Port advertised in the service record.
    pub port: u16,

    /// Value of the `board` TXT item.
    pub board: String,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hostname_prefix: "mb_slave_tcp".to_string(),
            instance_name: "esp32_mb_slave_tcp".to_string(),
            port: 502,
            board: "esp32".to_string(),
        }
    }
}
