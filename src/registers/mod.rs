// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register blocks exposed by the Modbus slave
//!
//! The slave exposes four register areas, one per Modbus object type. Each area
//! is backed by a tightly packed byte image of a fixed-layout record:
//!
//! | Area | Record | Size (bytes) | Items |
//! |------|--------|--------------|-------|
//! | Discrete inputs | [`DiscreteInputs`] | 2 | 16 bits |
//! | Coils | [`Coils`] | 2 | 16 bits |
//! | Input registers | [`InputRegisters`] | 376 | 188 words |
//! | Holding registers | [`HoldingRegisters`] | 316 | 158 words |
//!
//! ## Addressing
//!
//! Word `n` of a 16-bit area is bytes `2n` and `2n + 1` read little-endian, so a
//! 32-bit float spans two registers with its low word first. Bit `n` of a bit
//! area is bit `n % 8` of byte `n / 8`.
//!
//! Remote masters see the byte image through [`RegisterMap`]; the polling loop
//! works on typed records through [`RegisterMap::load`], [`RegisterMap::store`]
//! and [`RegisterMap::update`].

pub mod coils;
pub mod discrete;
pub mod holding;
pub mod input;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use thiserror::Error;

pub use coils::Coils;
pub use discrete::DiscreteInputs;
pub use holding::HoldingRegisters;
pub use input::{InputRegisters, SensorReadings};

/// Register map shared between the Modbus service and the polling loop.
pub type SharedRegisters = Arc<Mutex<RegisterMap>>;

/// Lock a shared register map, recovering the data if a holder panicked.
pub fn lock_registers(registers: &SharedRegisters) -> MutexGuard<'_, RegisterMap> {
    registers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Modbus object type of a register area.
///
/// The numeric codes are the ones reported in access logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaType {
    /// Read/write 16-bit registers
    Holding,
    /// Read-only 16-bit registers
    Input,
    /// Read/write single bits
    Coil,
    /// Read-only single bits
    Discrete,
}

impl AreaType {
    /// Numeric type code used in access logs
    pub fn code(self) -> u8 {
        match self {
            AreaType::Holding => 0,
            AreaType::Input => 1,
            AreaType::Coil => 2,
            AreaType::Discrete => 3,
        }
    }

    /// Whether items of this area are single bits
    pub fn is_bit_area(self) -> bool {
        matches!(self, AreaType::Coil | AreaType::Discrete)
    }

    /// Whether a remote master may write this area
    pub fn is_writable(self) -> bool {
        matches!(self, AreaType::Holding | AreaType::Coil)
    }
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AreaType::Holding => "HOLDING",
            AreaType::Input => "INPUT",
            AreaType::Coil => "COILS",
            AreaType::Discrete => "DISCRETE",
        };
        f.write_str(name)
    }
}

/// Errors raised by register area management and access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("{area} area registered at offset {start} is empty")]
    EmptyArea { area: AreaType, start: u16 },

    #[error("{area} area {start}..{end} overlaps an area registered at {other_start}..{other_end}")]
    Overlap {
        area: AreaType,
        start: u32,
        end: u32,
        other_start: u32,
        other_end: u32,
    },

    #[error("{area} area does not fit in the Modbus address space (start {start}, {items} items)")]
    OutOfAddressSpace {
        area: AreaType,
        start: u16,
        items: usize,
    },

    #[error("no {area} area covers {count} items starting at address {address}")]
    IllegalAddress {
        area: AreaType,
        address: u16,
        count: u16,
    },

    #[error("{area} area is read-only")]
    ReadOnly { area: AreaType },

    #[error("unknown register area id {0}")]
    UnknownArea(usize),

    #[error("area {id} is a {actual} area of {actual_size} bytes, expected {expected} of {expected_size} bytes")]
    BlockMismatch {
        id: usize,
        actual: AreaType,
        actual_size: usize,
        expected: AreaType,
        expected_size: usize,
    },
}

/// A fixed-layout record that maps onto one register area.
///
/// Implementors describe their packed little-endian layout; no padding is
/// inserted between fields.
pub trait RegisterBlock: Sized {
    /// Area type this record is exposed as
    const AREA: AreaType;
    /// Size of the packed record in bytes
    const SIZE: usize;

    /// Write the packed representation into `out` (exactly `SIZE` bytes)
    fn encode(&self, out: &mut [u8]);

    /// Read a record from its packed representation (exactly `SIZE` bytes)
    fn decode(bytes: &[u8]) -> Self;

    /// Packed representation as a new buffer
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; Self::SIZE];
        self.encode(&mut bytes);
        bytes
    }
}

/// Sequential little-endian writer over a packed record image.
pub(crate) struct PackedWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PackedWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub(crate) fn i16(&mut self, value: i16) {
        self.put(&value.to_le_bytes());
    }

    pub(crate) fn u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    pub(crate) fn f32(&mut self, value: f32) {
        self.put(&value.to_le_bytes());
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }
}

/// Sequential little-endian reader over a packed record image.
pub(crate) struct PackedReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PackedReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub(crate) fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub(crate) fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    pub(crate) fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    pub(crate) fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

/// Handle to an area registered in a [`RegisterMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaId(usize);

impl AreaId {
    /// Position of the area in registration order
    pub fn index(self) -> usize {
        self.0
    }
}

/// Descriptor of one register area: its type, where it starts in the Modbus
/// address space, and the storage behind it.
#[derive(Debug, Clone)]
pub struct RegisterArea {
    area_type: AreaType,
    start_offset: u16,
    bytes: Vec<u8>,
}

impl RegisterArea {
    /// Create an area over raw storage
    pub fn new(area_type: AreaType, start_offset: u16, bytes: Vec<u8>) -> Self {
        Self {
            area_type,
            start_offset,
            bytes,
        }
    }

    /// Create an area initialised from a typed record
    pub fn from_block<B: RegisterBlock>(start_offset: u16, block: &B) -> Self {
        Self::new(B::AREA, start_offset, block.to_bytes())
    }

    pub fn area_type(&self) -> AreaType {
        self.area_type
    }

    pub fn start_offset(&self) -> u16 {
        self.start_offset
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of addressable items (words or bits) in the area
    pub fn items(&self) -> usize {
        if self.area_type.is_bit_area() {
            self.bytes.len() * 8
        } else {
            self.bytes.len() / 2
        }
    }

    /// Size in bytes of one addressable item, or 0 for bit areas
    fn item_bytes(&self) -> usize {
        if self.area_type.is_bit_area() {
            0
        } else {
            2
        }
    }

    fn end_offset(&self) -> u32 {
        u32::from(self.start_offset) + self.items() as u32
    }

    fn covers(&self, address: u16, count: u16) -> bool {
        let start = u32::from(address);
        let end = start + u32::from(count);
        count > 0 && start >= u32::from(self.start_offset) && end <= self.end_offset()
    }

    /// Byte offset inside the area of the item at Modbus `address`
    fn byte_offset(&self, address: u16) -> usize {
        let index = usize::from(address - self.start_offset);
        if self.area_type.is_bit_area() {
            index / 8
        } else {
            index * self.item_bytes()
        }
    }
}

/// Location of a successful access, as reported to the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessLocation {
    /// Area that served the request
    pub area: AreaId,
    /// Byte offset of the first touched item inside the area record
    pub byte_offset: usize,
    /// Number of words or bits touched
    pub size: u16,
}

/// The set of register areas exposed by the slave.
///
/// Several areas of the same type may be registered as long as their address
/// ranges do not overlap. A request must fall entirely inside one area;
/// anything else is an illegal data address.
#[derive(Debug, Default, Clone)]
pub struct RegisterMap {
    areas: Vec<RegisterArea>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the map for sharing between the server and the polling loop
    pub fn into_shared(self) -> SharedRegisters {
        Arc::new(Mutex::new(self))
    }

    /// Register an area descriptor
    ///
    /// # Errors
    ///
    /// Fails if the area is empty, does not fit below address 65536, or
    /// overlaps an area of the same type.
    pub fn set_descriptor(&mut self, area: RegisterArea) -> Result<AreaId, RegisterError> {
        if area.items() == 0 {
            return Err(RegisterError::EmptyArea {
                area: area.area_type,
                start: area.start_offset,
            });
        }
        if area.end_offset() > u32::from(u16::MAX) + 1 {
            return Err(RegisterError::OutOfAddressSpace {
                area: area.area_type,
                start: area.start_offset,
                items: area.items(),
            });
        }

        let start = u32::from(area.start_offset);
        let end = area.end_offset();
        if let Some(other) = self.areas.iter().find(|other| {
            other.area_type == area.area_type
                && start < other.end_offset()
                && u32::from(other.start_offset) < end
        }) {
            return Err(RegisterError::Overlap {
                area: area.area_type,
                start,
                end,
                other_start: u32::from(other.start_offset),
                other_end: other.end_offset(),
            });
        }

        debug!(
            "Registered {} area at offset {} ({} bytes, {} items)",
            area.area_type,
            area.start_offset,
            area.bytes.len(),
            area.items()
        );
        self.areas.push(area);
        Ok(AreaId(self.areas.len() - 1))
    }

    /// Registered area by id
    pub fn area(&self, id: AreaId) -> Result<&RegisterArea, RegisterError> {
        self.areas
            .get(id.0)
            .ok_or(RegisterError::UnknownArea(id.0))
    }

    fn find(
        &self,
        area_type: AreaType,
        address: u16,
        count: u16,
    ) -> Result<(usize, &RegisterArea), RegisterError> {
        self.areas
            .iter()
            .enumerate()
            .find(|(_, area)| area.area_type == area_type && area.covers(address, count))
            .ok_or(RegisterError::IllegalAddress {
                area: area_type,
                address,
                count,
            })
    }

    fn location(&self, index: usize, address: u16, count: u16) -> AccessLocation {
        AccessLocation {
            area: AreaId(index),
            byte_offset: self.areas[index].byte_offset(address),
            size: count,
        }
    }

    /// Read `count` 16-bit registers of a word area
    pub fn read_words(
        &self,
        area_type: AreaType,
        address: u16,
        count: u16,
    ) -> Result<(Vec<u16>, AccessLocation), RegisterError> {
        let (index, area) = self.find_word_area(area_type, address, count)?;
        let first = area.byte_offset(address);
        let words = area.bytes[first..first + usize::from(count) * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok((words, self.location(index, address, count)))
    }

    /// Location `count` registers at `address` would touch, without accessing them
    pub fn locate_words(
        &self,
        area_type: AreaType,
        address: u16,
        count: u16,
    ) -> Result<AccessLocation, RegisterError> {
        let (index, _) = self.find_word_area(area_type, address, count)?;
        Ok(self.location(index, address, count))
    }

    /// Write consecutive 16-bit registers of a writable word area
    pub fn write_words(
        &mut self,
        area_type: AreaType,
        address: u16,
        values: &[u16],
    ) -> Result<AccessLocation, RegisterError> {
        if !area_type.is_writable() {
            return Err(RegisterError::ReadOnly { area: area_type });
        }
        let count = quantity(area_type, address, values.len())?;
        let (index, area) = self.find_word_area(area_type, address, count)?;
        let first = area.byte_offset(address);
        let area = &mut self.areas[index];
        for (chunk, value) in area.bytes[first..first + values.len() * 2]
            .chunks_exact_mut(2)
            .zip(values)
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(self.location(index, address, count))
    }

    /// Read `count` bits of a bit area
    pub fn read_bits(
        &self,
        area_type: AreaType,
        address: u16,
        count: u16,
    ) -> Result<(Vec<bool>, AccessLocation), RegisterError> {
        let (index, area) = self.find_bit_area(area_type, address, count)?;
        let first = usize::from(address - area.start_offset);
        let bits = (first..first + usize::from(count))
            .map(|bit| area.bytes[bit / 8] & (1 << (bit % 8)) != 0)
            .collect();
        Ok((bits, self.location(index, address, count)))
    }

    /// Write consecutive bits of a writable bit area
    pub fn write_bits(
        &mut self,
        area_type: AreaType,
        address: u16,
        values: &[bool],
    ) -> Result<AccessLocation, RegisterError> {
        if !area_type.is_writable() {
            return Err(RegisterError::ReadOnly { area: area_type });
        }
        let count = quantity(area_type, address, values.len())?;
        let (index, area) = self.find_bit_area(area_type, address, count)?;
        let first = usize::from(address - area.start_offset);
        let area = &mut self.areas[index];
        for (bit, value) in (first..).zip(values) {
            if *value {
                area.bytes[bit / 8] |= 1 << (bit % 8);
            } else {
                area.bytes[bit / 8] &= !(1 << (bit % 8));
            }
        }
        Ok(self.location(index, address, count))
    }

    fn find_word_area(
        &self,
        area_type: AreaType,
        address: u16,
        count: u16,
    ) -> Result<(usize, &RegisterArea), RegisterError> {
        if area_type.is_bit_area() {
            return Err(RegisterError::IllegalAddress {
                area: area_type,
                address,
                count,
            });
        }
        self.find(area_type, address, count)
    }

    fn find_bit_area(
        &self,
        area_type: AreaType,
        address: u16,
        count: u16,
    ) -> Result<(usize, &RegisterArea), RegisterError> {
        if !area_type.is_bit_area() {
            return Err(RegisterError::IllegalAddress {
                area: area_type,
                address,
                count,
            });
        }
        self.find(area_type, address, count)
    }

    fn checked_block<B: RegisterBlock>(&self, id: AreaId) -> Result<&RegisterArea, RegisterError> {
        let area = self.area(id)?;
        if area.area_type != B::AREA || area.bytes.len() != B::SIZE {
            return Err(RegisterError::BlockMismatch {
                id: id.0,
                actual: area.area_type,
                actual_size: area.bytes.len(),
                expected: B::AREA,
                expected_size: B::SIZE,
            });
        }
        Ok(area)
    }

    /// Decode the typed record stored in an area
    pub fn load<B: RegisterBlock>(&self, id: AreaId) -> Result<B, RegisterError> {
        let area = self.checked_block::<B>(id)?;
        Ok(B::decode(&area.bytes))
    }

    /// Replace the content of an area with a typed record
    pub fn store<B: RegisterBlock>(&mut self, id: AreaId, block: &B) -> Result<(), RegisterError> {
        self.checked_block::<B>(id)?;
        block.encode(&mut self.areas[id.0].bytes);
        Ok(())
    }

    /// Decode, modify and store back the typed record of an area
    pub fn update<B, R>(&mut self, id: AreaId, f: impl FnOnce(&mut B) -> R) -> Result<R, RegisterError>
    where
        B: RegisterBlock,
    {
        let mut block = self.load::<B>(id)?;
        let result = f(&mut block);
        self.store(id, &block)?;
        Ok(result)
    }
}

/// Convert a value count into a Modbus quantity
fn quantity(area_type: AreaType, address: u16, len: usize) -> Result<u16, RegisterError> {
    u16::try_from(len)
        .ok()
        .filter(|count| *count > 0)
        .ok_or(RegisterError::IllegalAddress {
            area: area_type,
            address,
            count: u16::try_from(len).unwrap_or(u16::MAX),
        })
}
