// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus slave service
//!
//! For avoiding confusion with the Modbus master/slave terminology: the slave
//! is the device that provides data, here the TCP server; the master is the
//! client that requests it.
//!
//! [`SlaveService`] answers requests from the shared [`RegisterMap`] and
//! publishes an [`AccessEvent`] for every access it served, so the polling
//! loop can react to what masters did.
//!
//! [`RegisterMap`]: crate::registers::RegisterMap

use std::{
    fmt, future,
    net::SocketAddr,
    ops::BitOr,
    time::Instant,
};

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use crate::registers::{lock_registers, AccessLocation, AreaType, RegisterError, SharedRegisters};

/// Largest number of bits a master may read in one request
const MAX_READ_BITS: u16 = 2000;
/// Largest number of bits a master may write in one request
const MAX_WRITE_BITS: u16 = 1968;
/// Largest number of registers a master may read in one request
const MAX_READ_WORDS: u16 = 125;
/// Largest number of registers a master may write in one request
const MAX_WRITE_WORDS: u16 = 123;
/// Largest number of registers written by a read/write multiple request
const MAX_READ_WRITE_WORDS: u16 = 121;

/// Direction of an access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => f.write_str("READ"),
            AccessKind::Write => f.write_str("WRITE"),
        }
    }
}

/// Set of access events the polling loop is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub const HOLDING_READ: EventMask = EventMask(1 << 0);
    pub const HOLDING_WRITE: EventMask = EventMask(1 << 1);
    pub const INPUT_READ: EventMask = EventMask(1 << 2);
    pub const COILS_READ: EventMask = EventMask(1 << 3);
    pub const COILS_WRITE: EventMask = EventMask(1 << 4);
    pub const DISCRETE_READ: EventMask = EventMask(1 << 5);

    /// Every read event
    pub const READ: EventMask = EventMask(
        Self::HOLDING_READ.0 | Self::INPUT_READ.0 | Self::COILS_READ.0 | Self::DISCRETE_READ.0,
    );
    /// Every write event
    pub const WRITE: EventMask = EventMask(Self::HOLDING_WRITE.0 | Self::COILS_WRITE.0);
    /// Every event
    pub const READ_WRITE: EventMask = EventMask(Self::READ.0 | Self::WRITE.0);

    /// Mask bit of an access
    pub fn of(area_type: AreaType, kind: AccessKind) -> EventMask {
        match (area_type, kind) {
            (AreaType::Holding, AccessKind::Read) => Self::HOLDING_READ,
            (AreaType::Holding, AccessKind::Write) => Self::HOLDING_WRITE,
            (AreaType::Input, _) => Self::INPUT_READ,
            (AreaType::Coil, AccessKind::Read) => Self::COILS_READ,
            (AreaType::Coil, AccessKind::Write) => Self::COILS_WRITE,
            (AreaType::Discrete, _) => Self::DISCRETE_READ,
        }
    }

    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// An access served by the slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEvent {
    pub area_type: AreaType,
    pub kind: AccessKind,
    /// Modbus address of the first item
    pub address: u16,
    /// Area, byte offset and item count of the access
    pub location: AccessLocation,
    /// Microseconds since the service was created
    pub time_us: u64,
}

impl AccessEvent {
    pub fn mask(&self) -> EventMask {
        EventMask::of(self.area_type, self.kind)
    }
}

/// Sending half of the access event queue
pub type EventSender = mpsc::Sender<AccessEvent>;
/// Receiving half of the access event queue
pub type EventReceiver = mpsc::Receiver<AccessEvent>;

/// Create the bounded queue carrying access events to the polling loop
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Modbus service backed by the shared register map.
///
/// One instance is cloned per master connection; all clones share the
/// registers, the event queue and the time origin.
#[derive(Clone)]
pub struct SlaveService {
    registers: SharedRegisters,
    events: EventSender,
    started: Instant,
}

impl tokio_modbus::server::Service for SlaveService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let res = match req {
            Request::ReadCoils(addr, cnt) => self
                .read_bits(AreaType::Coil, addr, cnt)
                .map(Response::ReadCoils),
            Request::ReadDiscreteInputs(addr, cnt) => self
                .read_bits(AreaType::Discrete, addr, cnt)
                .map(Response::ReadDiscreteInputs),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .read_words(AreaType::Holding, addr, cnt, MAX_READ_WORDS)
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self
                .read_words(AreaType::Input, addr, cnt, MAX_READ_WORDS)
                .map(Response::ReadInputRegisters),
            Request::WriteSingleCoil(addr, value) => self
                .write_bits(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleCoil(addr, value)),
            Request::WriteMultipleCoils(addr, values) => self
                .write_bits(addr, &values)
                .map(|cnt| Response::WriteMultipleCoils(addr, cnt)),
            Request::WriteSingleRegister(addr, value) => self
                .write_words(addr, std::slice::from_ref(&value), MAX_WRITE_WORDS)
                .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => self
                .write_words(addr, &values, MAX_WRITE_WORDS)
                .map(|cnt| Response::WriteMultipleRegisters(addr, cnt)),
            Request::ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, values) => self
                .read_write_words(read_addr, read_cnt, write_addr, &values)
                .map(Response::ReadWriteMultipleRegisters),
            _ => {
                error!("SLAVE: Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl SlaveService {
    pub fn new(registers: SharedRegisters, events: EventSender) -> Self {
        Self {
            registers,
            events,
            started: Instant::now(),
        }
    }

    fn read_bits(
        &self,
        area_type: AreaType,
        addr: u16,
        cnt: u16,
    ) -> Result<Vec<bool>, ExceptionCode> {
        check_quantity(cnt, MAX_READ_BITS)?;
        let (bits, location) = lock_registers(&self.registers)
            .read_bits(area_type, addr, cnt)
            .map_err(exception_for)?;
        self.publish(area_type, AccessKind::Read, addr, location);
        Ok(bits)
    }

    fn read_words(
        &self,
        area_type: AreaType,
        addr: u16,
        cnt: u16,
        max: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        check_quantity(cnt, max)?;
        let (words, location) = lock_registers(&self.registers)
            .read_words(area_type, addr, cnt)
            .map_err(exception_for)?;
        self.publish(area_type, AccessKind::Read, addr, location);
        Ok(words)
    }

    /// Write coils, returning the quantity written
    fn write_bits(&self, addr: u16, values: &[bool]) -> Result<u16, ExceptionCode> {
        let cnt = u16::try_from(values.len()).map_err(|_| ExceptionCode::IllegalDataValue)?;
        check_quantity(cnt, MAX_WRITE_BITS)?;
        let location = lock_registers(&self.registers)
            .write_bits(AreaType::Coil, addr, values)
            .map_err(exception_for)?;
        self.publish(AreaType::Coil, AccessKind::Write, addr, location);
        Ok(cnt)
    }

    /// Write holding registers, returning the quantity written
    fn write_words(&self, addr: u16, values: &[u16], max: u16) -> Result<u16, ExceptionCode> {
        let cnt = u16::try_from(values.len()).map_err(|_| ExceptionCode::IllegalDataValue)?;
        check_quantity(cnt, max)?;
        let location = lock_registers(&self.registers)
            .write_words(AreaType::Holding, addr, values)
            .map_err(exception_for)?;
        self.publish(AreaType::Holding, AccessKind::Write, addr, location);
        Ok(cnt)
    }

    /// Write then read holding registers in one step
    ///
    /// Both ranges are checked before anything is written, so a rejected
    /// request leaves the registers and the event queue untouched.
    fn read_write_words(
        &self,
        read_addr: u16,
        read_cnt: u16,
        write_addr: u16,
        values: &[u16],
    ) -> Result<Vec<u16>, ExceptionCode> {
        let write_cnt = u16::try_from(values.len()).map_err(|_| ExceptionCode::IllegalDataValue)?;
        check_quantity(read_cnt, MAX_READ_WORDS)?;
        check_quantity(write_cnt, MAX_READ_WRITE_WORDS)?;

        let (words, write_location, read_location) = {
            let mut registers = lock_registers(&self.registers);
            registers
                .locate_words(AreaType::Holding, write_addr, write_cnt)
                .map_err(exception_for)?;
            registers
                .locate_words(AreaType::Holding, read_addr, read_cnt)
                .map_err(exception_for)?;

            let write_location = registers
                .write_words(AreaType::Holding, write_addr, values)
                .map_err(exception_for)?;
            let (words, read_location) = registers
                .read_words(AreaType::Holding, read_addr, read_cnt)
                .map_err(exception_for)?;
            (words, write_location, read_location)
        };

        self.publish(AreaType::Holding, AccessKind::Write, write_addr, write_location);
        self.publish(AreaType::Holding, AccessKind::Read, read_addr, read_location);
        Ok(words)
    }

    fn publish(
        &self,
        area_type: AreaType,
        kind: AccessKind,
        address: u16,
        location: AccessLocation,
    ) {
        let event = AccessEvent {
            area_type,
            kind,
            address,
            location,
            time_us: u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX),
        };
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event queue full, dropping {} {} event at address {}",
                    event.area_type, event.kind, event.address
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event queue closed, {} {} event not delivered", area_type, kind);
            }
        }
    }
}

fn check_quantity(cnt: u16, max: u16) -> Result<(), ExceptionCode> {
    if cnt == 0 || cnt > max {
        error!("SLAVE: Exception::IllegalDataValue - quantity {cnt} outside 1..={max}");
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(())
}

fn exception_for(err: RegisterError) -> ExceptionCode {
    match err {
        RegisterError::IllegalAddress { .. } => {
            error!("SLAVE: Exception::IllegalDataAddress - {err}");
            ExceptionCode::IllegalDataAddress
        }
        RegisterError::ReadOnly { .. } => {
            error!("SLAVE: Exception::IllegalFunction - {err}");
            ExceptionCode::IllegalFunction
        }
        other => {
            error!("SLAVE: Exception::ServerDeviceFailure - {other}");
            ExceptionCode::ServerDeviceFailure
        }
    }
}

/// Serve Modbus TCP masters on `listener` until the task is aborted.
pub async fn serve(listener: TcpListener, service: SlaveService) -> Result<()> {
    let server = Server::new(listener);

    let on_connected = move |stream, socket_addr: SocketAddr| {
        info!("Modbus master connected from {}", socket_addr);
        let service = service.clone();
        async move {
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(service.clone()))
            })
        }
    };

    let on_process_error = |err| {
        error!("Modbus server error: {err}");
    };

    server.serve(&on_connected, on_process_error).await?;
    Ok(())
}
