// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Coil block

use super::{AreaType, PackedReader, PackedWriter, RegisterBlock};

/// Coils writable by the master, two 8-bit ports (16 coils).
///
/// `port1` doubles as the alarm port: the polling loop sets it to `0xFF` once
/// the channel value reaches its limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coils {
    /// Coils 0-7
    pub port0: u8,
    /// Coils 8-15
    pub port1: u8,
}

impl Coils {
    /// Value of `port1` signalling the alarm condition
    pub const ALARM: u8 = 0xFF;

    pub fn alarm_raised(&self) -> bool {
        self.port1 == Self::ALARM
    }
}

impl RegisterBlock for Coils {
    const AREA: AreaType = AreaType::Coil;
    const SIZE: usize = 2;

    fn encode(&self, out: &mut [u8]) {
        let mut w = PackedWriter::new(out);
        w.u8(self.port0);
        w.u8(self.port1);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut r = PackedReader::new(bytes);
        Self {
            port0: r.u8(),
            port1: r.u8(),
        }
    }
}
