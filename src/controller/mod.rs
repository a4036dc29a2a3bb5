// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register polling loop
//!
//! [`SlaveController`] keeps the input registers refreshed and reacts to the
//! accesses reported by the Modbus service:
//!
//! - every access to `holding_data0` adds a fixed increment to it, and once
//!   the value approaches its limit the alarm coils (`port1`) are all set;
//! - every input register read advances the cycle counter copied into `dust1`;
//! - a coil access while the alarm is raised ends the loop.
//!
//! The loop also ends once `holding_data0` reaches its limit, when the event
//! queue closes, or when the daemon asks it to stop.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use log::{debug, info};
use tokio::time;

use crate::config::{ControllerConfig, ModbusConfig};
use crate::modbus::{AccessEvent, EventMask, EventReceiver};
use crate::registers::{
    lock_registers, AreaId, AreaType, Coils, DiscreteInputs, HoldingRegisters, InputRegisters,
    RegisterArea, RegisterError, RegisterMap, SensorReadings, SharedRegisters,
};

/// Interval at which a waiting loop checks the shutdown flag
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Handles of the four register areas of the slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAreas {
    pub holding: AreaId,
    pub input: AreaId,
    pub coils: AreaId,
    pub discrete: AreaId,
}

/// Build the register map with one descriptor per area, at the start offsets
/// of `modbus`.
pub fn create_register_map(
    modbus: &ModbusConfig,
) -> Result<(SharedRegisters, RegisterAreas), RegisterError> {
    let mut map = RegisterMap::new();
    let areas = RegisterAreas {
        holding: map.set_descriptor(RegisterArea::from_block(
            modbus.holding_start,
            &HoldingRegisters::default(),
        ))?,
        input: map.set_descriptor(RegisterArea::from_block(
            modbus.input_start,
            &InputRegisters::default(),
        ))?,
        coils: map.set_descriptor(RegisterArea::from_block(
            modbus.coils_start,
            &Coils::default(),
        ))?,
        discrete: map.set_descriptor(RegisterArea::from_block(
            modbus.discrete_start,
            &DiscreteInputs::default(),
        ))?,
    };
    Ok((map.into_shared(), areas))
}

/// Why the polling loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// `holding_data0` reached its limit
    LimitReached,
    /// A coil was accessed while the alarm coils were set
    Alarm,
    /// The Modbus service is gone
    EventsClosed,
    /// The daemon requested a shutdown
    Shutdown,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::LimitReached => f.write_str("channel value reached its limit"),
            LoopExit::Alarm => f.write_str("alarm coils set"),
            LoopExit::EventsClosed => f.write_str("event queue closed"),
            LoopExit::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// The polling loop of the slave.
pub struct SlaveController {
    registers: SharedRegisters,
    areas: RegisterAreas,
    events: EventReceiver,
    config: ControllerConfig,
    running: Arc<AtomicBool>,
    cycle: i16,
}

impl SlaveController {
    pub fn new(
        registers: SharedRegisters,
        areas: RegisterAreas,
        events: EventReceiver,
        config: ControllerConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registers,
            areas,
            events,
            config,
            running,
            cycle: 0,
        }
    }

    /// Number of input register reads seen so far
    pub fn cycle(&self) -> i16 {
        self.cycle
    }

    /// Put the input registers into their known state
    pub fn setup_reg_data(&self) -> Result<(), RegisterError> {
        lock_registers(&self.registers).update::<InputRegisters, _>(self.areas.input, |input| {
            input.apply_readings(&SensorReadings::baseline())
        })
    }

    /// Run the loop until one of the [`LoopExit`] conditions occurs
    pub async fn run(&mut self) -> Result<LoopExit, RegisterError> {
        info!("Start modbus test...");
        loop {
            let holding_data0 = lock_registers(&self.registers)
                .load::<HoldingRegisters>(self.areas.holding)?
                .holding_data0;
            if holding_data0 >= self.config.channel_data_max {
                return Ok(LoopExit::LimitReached);
            }

            let readings = SensorReadings::for_cycle(self.cycle);
            lock_registers(&self.registers)
                .update::<InputRegisters, _>(self.areas.input, |input| {
                    input.apply_readings(&readings)
                })?;

            let event = match self.next_event(EventMask::READ_WRITE).await {
                Ok(event) => event,
                Err(exit) => return Ok(exit),
            };

            if let Some(exit) = self.handle_event(&event)? {
                return Ok(exit);
            }
        }
    }

    /// Wait for the next event in `mask`, skipping the others
    async fn next_event(&mut self, mask: EventMask) -> Result<AccessEvent, LoopExit> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Err(LoopExit::Shutdown);
            }
            match time::timeout(SHUTDOWN_CHECK_INTERVAL, self.events.recv()).await {
                Ok(Some(event)) if mask.contains(event.mask()) => return Ok(event),
                Ok(Some(event)) => debug!("Ignoring {} {} event", event.area_type, event.kind),
                // The server goes away on shutdown too
                Ok(None) if !self.running.load(Ordering::SeqCst) => {
                    return Err(LoopExit::Shutdown)
                }
                Ok(None) => return Err(LoopExit::EventsClosed),
                Err(_) => continue,
            }
        }
    }

    /// Process one access, returning the exit reason if the loop must stop
    pub fn handle_event(&mut self, event: &AccessEvent) -> Result<Option<LoopExit>, RegisterError> {
        match event.area_type {
            AreaType::Holding => {
                log_access(event);
                if event.location.area == self.areas.holding
                    && event.location.byte_offset == HoldingRegisters::HOLDING_DATA0_OFFSET
                {
                    self.increment_channel()?;
                }
            }
            AreaType::Input => {
                self.cycle = self.cycle.wrapping_add(1);
                log_access(event);
            }
            AreaType::Discrete => log_access(event),
            AreaType::Coil => {
                log_access(event);
                let coils = lock_registers(&self.registers).load::<Coils>(self.areas.coils)?;
                if coils.alarm_raised() {
                    return Ok(Some(LoopExit::Alarm));
                }
            }
        }
        Ok(None)
    }

    /// Add the increment to `holding_data0` and raise the alarm coils near the
    /// limit. Both updates happen under one lock of the register map.
    fn increment_channel(&self) -> Result<(), RegisterError> {
        let offset = self.config.channel_data_offset;
        let threshold = self.config.channel_data_max - offset;

        let mut map = lock_registers(&self.registers);
        let value = map.update::<HoldingRegisters, _>(self.areas.holding, |holding| {
            holding.holding_data0 += offset;
            holding.holding_data0
        })?;
        if value >= threshold {
            map.update::<Coils, _>(self.areas.coils, |coils| coils.port1 = Coils::ALARM)?;
        }
        Ok(())
    }
}

fn log_access(event: &AccessEvent) {
    info!(
        "{} {} ({} us), ADDR:{}, TYPE:{}, INST_ADDR:0x{:04x}, SIZE:{}",
        event.area_type,
        event.kind,
        event.time_us,
        event.address,
        event.area_type.code(),
        event.location.byte_offset,
        event.location.size
    );
}
