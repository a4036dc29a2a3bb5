// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the sensor-modbus-slave project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the SlaveService implementation
//!
//! These tests validate the Modbus slave by starting a server instance and
//! connecting to it via a Modbus client. Reads and writes of every register
//! area are tested, together with the access events published for the polling
//! loop and the exception replies.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::prelude::*;

use approx::assert_relative_eq;
use sensor_modbus_slave::config::ModbusConfig;
use sensor_modbus_slave::controller::{create_register_map, RegisterAreas};
use sensor_modbus_slave::modbus::{event_channel, serve, AccessKind, EventReceiver, SlaveService};
use sensor_modbus_slave::registers::{
    lock_registers, AreaType, HoldingRegisters, InputRegisters, SensorReadings, SharedRegisters,
};

struct TestServer {
    socket_addr: SocketAddr,
    registers: SharedRegisters,
    areas: RegisterAreas,
    events: EventReceiver,
    _handle: tokio::task::JoinHandle<()>,
}

/// Test utility function to start a Modbus slave in the background
async fn start_test_server() -> Result<TestServer, Box<dyn std::error::Error>> {
    // Use port 0 to let the OS assign an available port
    let socket_addr = SocketAddr::from_str("127.0.0.1:0")?;
    let listener = TcpListener::bind(socket_addr).await?;
    let socket_addr = listener.local_addr()?;

    let (registers, areas) = create_register_map(&ModbusConfig::default())?;
    lock_registers(&registers).update::<InputRegisters, _>(areas.input, |input| {
        input.apply_readings(&SensorReadings::baseline())
    })?;
    let (tx, events) = event_channel(64);
    let service = SlaveService::new(registers.clone(), tx);

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, service).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    time::sleep(Duration::from_millis(100)).await;

    Ok(TestServer {
        socket_addr,
        registers,
        areas,
        events,
        _handle: handle,
    })
}

fn float_from_words(low: u16, high: u16) -> f32 {
    f32::from_bits(u32::from(low) | (u32::from(high) << 16))
}

#[tokio::test]
async fn test_read_input_registers() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    let data = ctx.read_input_registers(0, 7).await??;

    assert_eq!(data.len(), 7);
    assert_relative_eq!(float_from_words(data[0], data[1]), 23.4);
    assert_relative_eq!(float_from_words(data[2], data[3]), 3.3);
    assert_eq!(data[4], 4); // pressure
    assert_eq!(data[5], 23); // noise
    assert_eq!(data[6], 2); // dust0

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_float_into_holding_registers() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    // 10.0 is 0x41200000, low word first
    ctx.write_multiple_registers(0, &[0x0000, 0x4120]).await??;

    let holding = lock_registers(&server.registers).load::<HoldingRegisters>(server.areas.holding)?;
    assert_eq!(holding.holding_data0, 10.0);

    let data = ctx.read_holding_registers(0, 2).await??;
    assert_eq!(data, vec![0x0000, 0x4120]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_write_single_register() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    ctx.write_single_register(10, 999).await??;
    let data = ctx.read_holding_registers(10, 1).await??;
    assert_eq!(data, vec![999]);

    let holding = lock_registers(&server.registers).load::<HoldingRegisters>(server.areas.holding)?;
    assert_eq!(holding.test_regs[2], 999);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_coils_and_discrete_inputs() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    ctx.write_single_coil(8, true).await??;
    ctx.write_multiple_coils(10, &[true, true]).await??;
    let coils = ctx.read_coils(8, 8).await??;
    assert_eq!(
        coils,
        vec![true, false, true, true, false, false, false, false]
    );

    let inputs = ctx.read_discrete_inputs(0, 16).await??;
    assert_eq!(inputs, vec![false; 16]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_read_write_multiple_registers() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    let data = ctx
        .read_write_multiple_registers(8, 3, 9, &[11, 12])
        .await??;
    assert_eq!(data, vec![0, 11, 12]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_register_address() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    // Input registers end at address 187
    let result = ctx.read_input_registers(187, 2).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    let result = ctx.read_coils(16, 1).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalDataAddress));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_function() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    let result = ctx.masked_write_register(0, 0xFFFF, 0x0000).await?;
    assert_eq!(result, Err(ExceptionCode::IllegalFunction));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_accesses_are_published() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = start_test_server().await?;
    let mut ctx = tcp::connect(server.socket_addr).await?;

    ctx.read_holding_registers(2, 2).await??;
    ctx.write_single_coil(1, true).await??;
    ctx.read_input_registers(0, 1).await??;

    let event = server.events.try_recv()?;
    assert_eq!(event.area_type, AreaType::Holding);
    assert_eq!(event.kind, AccessKind::Read);
    assert_eq!(event.address, 2);
    assert_eq!(event.location.area, server.areas.holding);
    assert_eq!(event.location.byte_offset, 4);
    assert_eq!(event.location.size, 2);

    let event = server.events.try_recv()?;
    assert_eq!(event.area_type, AreaType::Coil);
    assert_eq!(event.kind, AccessKind::Write);
    assert_eq!(event.location.byte_offset, 0);

    let event = server.events.try_recv()?;
    assert_eq!(event.area_type, AreaType::Input);
    assert!(server.events.try_recv().is_err());

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_multiple_clients() -> Result<(), Box<dyn std::error::Error>> {
    let test_register = 20;
    let test_value = 888;

    let server = start_test_server().await?;
    let mut client1 = tcp::connect(server.socket_addr).await?;
    let mut client2 = tcp::connect(server.socket_addr).await?;

    client1
        .write_single_register(test_register, test_value)
        .await??;

    // Client 2 sees the update from client 1
    let data = client2.read_holding_registers(test_register, 1).await??;
    assert_eq!(data, vec![test_value]);

    client1.disconnect().await?;
    client2.disconnect().await?;
    Ok(())
}
