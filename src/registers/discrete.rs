// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Discrete input block
//!
//! Discrete inputs 0-7 are individual flags packed into the first byte,
//! inputs 8-15 are the raw `port1` byte.

use super::{AreaType, PackedReader, PackedWriter, RegisterBlock};

/// Discrete inputs exposed to the master (read-only, 16 bits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscreteInputs {
    /// Inputs 0-7, one bit each
    pub port0: u8,
    /// Inputs 8-15
    pub port1: u8,
}

impl RegisterBlock for DiscreteInputs {
    const AREA: AreaType = AreaType::Discrete;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{RegisterArea, RegisterMap};

    #[test]
    fn test_single_inputs_map_to_low_bits() {
        let inputs = DiscreteInputs {
            port0: 0b1000_0001,
            port1: 0x5A,
        };
        assert_eq!(inputs.to_bytes(), vec![0x81, 0x5A]);

        // Input n is bit n of the area
        let mut map = RegisterMap::new();
        map.set_descriptor(RegisterArea::from_block(0, &inputs)).unwrap();
        let (bits, _) = map.read_bits(AreaType::Discrete, 0, 16).unwrap();
        assert!(bits[0] && bits[7]);
        assert!(!bits[3]);
        assert_eq!(&bits[8..12], &[false, true, false, true]);
    }
}
