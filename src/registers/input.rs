// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Input register block
//!
//! ## Register Map
//!
//! | Register | Field | Type |
//! |----------|-------|------|
//! | 0-1 | Temperature | f32 |
//! | 2-3 | Humidity | f32 |
//! | 4 | Pressure | i16 |
//! | 5 | Noise | i16 |
//! | 6-8 | Dust channels 0-2 | i16 |
//! | 9-10 | Light, light 2 | i16 |
//! | 11 | Blink | i16 |
//! | 12 | CO2 | i16 |
//! | 13-14 | VOC | f32 |
//! | 15 | VOC accuracy | i16 |
//! | 16-17 | EM noise | f32 |
//! | 18-19 | EM noise (previous) | f32 |
//! | 20-21 | Acceleration | f32 |
//! | 22-37 | CO, NO2, NH3, C2H5OH, H2, CH4, C3H8, C4H10 | f32 |
//! | 38-187 | Data | u16 × 150 |

use super::{AreaType, PackedReader, PackedWriter, RegisterBlock};

/// Number of raw data words at the end of the input block
pub const INPUT_DATA_WORDS: usize = 150;

/// Scalar sensor values published through the input registers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReadings {
    pub temp: f32,
    pub wet: f32,
    pub pressure: i16,
    pub noise: i16,
    pub dust0: i16,
    pub dust1: i16,
    pub dust2: i16,
    pub light: i16,
    pub light_2: i16,
    pub blink: i16,
    pub co2: i16,
    pub voc: f32,
    pub voc_accur: i16,
    pub em_noise: f32,
    pub em_noise_last: f32,
    pub acceleration: f32,
    /// Carbon monoxide
    pub co: f32,
    /// Nitrogen dioxide
    pub no2: f32,
    /// Ammonia
    pub nh3: f32,
    /// Ethanol
    pub c2h5oh: f32,
    pub h2: f32,
    pub ch4: f32,
    pub c3h8: f32,
    pub c4h10: f32,
}

impl SensorReadings {
    /// Packed size of the scalar readings in bytes
    pub const SIZE: usize = 76;

    /// Known state written before the slave starts serving requests
    pub fn baseline() -> Self {
        Self {
            temp: 23.4,
            wet: 3.3,
            pressure: 4,
            noise: 23,
            dust0: 2,
            dust1: 2,
            dust2: 8,
            light: 43,
            light_2: 252,
            blink: 1300,
            co2: 32,
            voc: 88.2,
            voc_accur: 1,
            em_noise: 2.0,
            em_noise_last: 2.0,
            acceleration: 1.4,
            co: 52.2,
            no2: 99.2,
            nh3: 32.2,
            c2h5oh: 42.3,
            h2: 32.1,
            ch4: 4.5,
            c3h8: 32.3,
            c4h10: 2.3,
        }
    }

    /// Values refreshed on every polling cycle; `dust1` carries the number of
    /// input reads seen so far.
    pub fn for_cycle(cycle: i16) -> Self {
        Self {
            dust0: 100,
            dust1: cycle,
            dust2: 100,
            ..Self::baseline()
        }
    }

    fn encode_into(&self, w: &mut PackedWriter<'_>) {
        w.f32(self.temp);
        w.f32(self.wet);
        for value in [
            self.pressure,
            self.noise,
            self.dust0,
            self.dust1,
            self.dust2,
            self.light,
            self.light_2,
            self.blink,
            self.co2,
        ] {
            w.i16(value);
        }
        w.f32(self.voc);
        w.i16(self.voc_accur);
        for value in [
            self.em_noise,
            self.em_noise_last,
            self.acceleration,
            self.co,
            self.no2,
            self.nh3,
            self.c2h5oh,
            self.h2,
            self.ch4,
            self.c3h8,
            self.c4h10,
        ] {
            w.f32(value);
        }
    }

    fn decode_from(r: &mut PackedReader<'_>) -> Self {
        Self {
            temp: r.f32(),
            wet: r.f32(),
            pressure: r.i16(),
            noise: r.i16(),
            dust0: r.i16(),
            dust1: r.i16(),
            dust2: r.i16(),
            light: r.i16(),
            light_2: r.i16(),
            blink: r.i16(),
            co2: r.i16(),
            voc: r.f32(),
            voc_accur: r.i16(),
            em_noise: r.f32(),
            em_noise_last: r.f32(),
            acceleration: r.f32(),
            co: r.f32(),
            no2: r.f32(),
            nh3: r.f32(),
            c2h5oh: r.f32(),
            h2: r.f32(),
            ch4: r.f32(),
            c3h8: r.f32(),
            c4h10: r.f32(),
        }
    }
}

/// Input registers exposed to the master (read-only, 188 words).
#[derive(Debug, Clone, PartialEq)]
pub struct InputRegisters {
    pub readings: SensorReadings,
    pub data: [u16; INPUT_DATA_WORDS],
}

impl Default for InputRegisters {
    fn default() -> Self {
        Self {
            readings: SensorReadings::default(),
            data: [0; INPUT_DATA_WORDS],
        }
    }
}

impl InputRegisters {
    /// Copy a set of sensor readings into the block, leaving `data` untouched
    pub fn apply_readings(&mut self, readings: &SensorReadings) {
        self.readings = *readings;
    }
}

impl RegisterBlock for InputRegisters {
    const AREA: AreaType = AreaType::Input;
    const SIZE: usize = SensorReadings::SIZE + INPUT_DATA_WORDS * 2;

    fn encode(&self, out: &mut [u8]) {
        let mut w = PackedWriter::new(out);
        self.readings.encode_into(&mut w);
        for word in self.data {
            w.u16(word);
        }
        debug_assert_eq!(w.position(), Self::SIZE);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut r = PackedReader::new(bytes);
        let readings = SensorReadings::decode_from(&mut r);
        let mut data = [0; INPUT_DATA_WORDS];
        for word in data.iter_mut() {
            *word = r.u16();
        }
        Self { readings, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_size() {
        assert_eq!(InputRegisters::SIZE, 376);
        assert_eq!(InputRegisters::default().to_bytes().len(), 376);
    }

    #[test]
    fn test_field_offsets() {
        let mut block = InputRegisters::default();
        block.apply_readings(&SensorReadings::baseline());
        block.data[0] = 0xBEEF;
        let bytes = block.to_bytes();

        // Temperature occupies registers 0-1, low word first
        assert_eq!(&bytes[0..4], &23.4f32.to_le_bytes());
        // Pressure is register 4
        assert_eq!(&bytes[8..10], &4i16.to_le_bytes());
        // Blink is register 11
        assert_eq!(&bytes[22..24], &1300i16.to_le_bytes());
        // VOC spans registers 13-14, its accuracy is register 15
        assert_eq!(&bytes[26..30], &88.2f32.to_le_bytes());
        assert_eq!(&bytes[30..32], &1i16.to_le_bytes());
        // Last gas reading ends right before the data words
        assert_eq!(&bytes[72..76], &2.3f32.to_le_bytes());
        assert_eq!(&bytes[76..78], &0xBEEFu16.to_le_bytes());
    }

    #[test]
    fn test_cycle_readings_only_change_dust() {
        let baseline = SensorReadings::baseline();
        let cycle = SensorReadings::for_cycle(7);

        assert_eq!(cycle.dust0, 100);
        assert_eq!(cycle.dust1, 7);
        assert_eq!(cycle.dust2, 100);
        assert_eq!(
            SensorReadings {
                dust0: baseline.dust0,
                dust1: baseline.dust1,
                dust2: baseline.dust2,
                ..cycle
            },
            baseline
        );
    }

    #[test]
    fn test_apply_readings_keeps_data() {
        let mut block = InputRegisters::default();
        block.data[149] = 42;
        block.apply_readings(&SensorReadings::for_cycle(3));

        let decoded = InputRegisters::decode(&block.to_bytes());
        assert_eq!(decoded.data[149], 42);
        assert_eq!(decoded.readings.dust1, 3);
    }
}
