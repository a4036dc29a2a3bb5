// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Holding register block
//!
//! ## Register Map
//!
//! | Register | Field | Type |
//! |----------|-------|------|
//! | 0-1 | Channel value 0 | f32 |
//! | 2-3 | Channel value 1 | f32 |
//! | 4-5 | Channel value 2 | f32 |
//! | 6-7 | Channel value 3 | f32 |
//! | 8-157 | Test registers | u16 × 150 |

use super::{AreaType, PackedReader, PackedWriter, RegisterBlock};

/// Number of free-form test registers after the channel values
pub const HOLDING_TEST_WORDS: usize = 150;

/// Holding registers, readable and writable by the master (158 words).
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingRegisters {
    pub holding_data0: f32,
    pub holding_data1: f32,
    pub holding_data2: f32,
    pub holding_data3: f32,
    pub test_regs: [u16; HOLDING_TEST_WORDS],
}

impl HoldingRegisters {
    /// Byte offset of `holding_data0` inside the block
    pub const HOLDING_DATA0_OFFSET: usize = 0;
}

impl Default for HoldingRegisters {
    fn default() -> Self {
        Self {
            holding_data0: 0.0,
            holding_data1: 0.0,
            holding_data2: 0.0,
            holding_data3: 0.0,
            test_regs: [0; HOLDING_TEST_WORDS],
        }
    }
}

impl RegisterBlock for HoldingRegisters {
    const AREA: AreaType = AreaType::Holding;
    const SIZE: usize = 4 * 4 + HOLDING_TEST_WORDS * 2;

    fn encode(&self, out: &mut [u8]) {
        let mut w = PackedWriter::new(out);
        w.f32(self.holding_data0);
        w.f32(self.holding_data1);
        w.f32(self.holding_data2);
        w.f32(self.holding_data3);
        for word in self.test_regs {
            w.u16(word);
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut r = PackedReader::new(bytes);
        let holding_data0 = r.f32();
        let holding_data1 = r.f32();
        let holding_data2 = r.f32();
        let holding_data3 = r.f32();
        let mut test_regs = [0; HOLDING_TEST_WORDS];
        for word in test_regs.iter_mut() {
            *word = r.u16();
        }
        Self {
            holding_data0,
            holding_data1,
            holding_data2,
            holding_data3,
            test_regs,
        }
    }
}
