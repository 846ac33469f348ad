// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! MCP23017 I²C I/O expander.
//!
//! Sixteen pins behind a two-wire bus, presented with the same pin
//! operations as on-chip GPIO: [`Mcp23017Pin`] implements
//! [`crate::hil::gpio::Pin`], so expander-backed and GPIO-backed pins are
//! interchangeable to device drivers.
//!
//! The driver keeps a shadow of each register it writes (direction,
//! pull-up, output latch per port) and pushes one 2-byte register write per
//! mutation, non-blocking: a mutator waits for any transfer already in
//! flight, then fires its own and returns without waiting for completion.
//! Reads are a 1-byte write plus a 1-byte read and do block.
//!
//! Pins 0..=7 map to port A; pins 32..=39 (bit 5 set, mirroring the
//! port/index packing of on-chip pins) map to port B.

use core::cell::Cell;

use crate::hil::gpio::{Direction, Level, PullMode};
use crate::hil::i2c::I2cMaster;
use crate::utilities::cells::TakeCell;

// Register addresses (IOCON.BANK = 0).
const IODIRA: u8 = 0x00;
const IODIRB: u8 = 0x01;
const GPPUA: u8 = 0x0c;
const GPPUB: u8 = 0x0d;
const GPIOA: u8 = 0x12;
const GPIOB: u8 = 0x13;

const PORT_A: usize = 0;
const PORT_B: usize = 1;

/// One MCP23017, addressed over a shared I²C master.
pub struct Mcp23017<'a> {
    i2c: &'a dyn I2cMaster<'a>,
    slave_address: u8,
    tx_buffer: TakeCell<'a, [u8]>,
    rx_buffer: TakeCell<'a, [u8]>,

    // Shadow registers, reset values per the datasheet.
    iodir: [Cell<u8>; 2],
    gppu: [Cell<u8>; 2],
    output: [Cell<u8>; 2],
}

impl<'a> Mcp23017<'a> {
    /// The I²C master must already be initialised; it can be shared with
    /// other devices. `tx_buffer` must hold at least 2 bytes and
    /// `rx_buffer` at least 1.
    pub fn new(
        i2c: &'a dyn I2cMaster<'a>,
        slave_address: u8,
        tx_buffer: &'a mut [u8],
        rx_buffer: &'a mut [u8],
    ) -> Mcp23017<'a> {
        Mcp23017 {
            i2c,
            slave_address,
            tx_buffer: TakeCell::new(tx_buffer),
            rx_buffer: TakeCell::new(rx_buffer),
            iodir: [Cell::new(0xff), Cell::new(0xff)],
            gppu: [Cell::new(0x00), Cell::new(0x00)],
            output: [Cell::new(0x00), Cell::new(0x00)],
        }
    }

    /// A handle to one expander pin.
    pub fn pin(&'a self, pin: u32) -> Mcp23017Pin<'a> {
        Mcp23017Pin { expander: self, pin }
    }

    fn port_of(pin: u32) -> usize {
        if pin >> 5 != 0 {
            PORT_B
        } else {
            PORT_A
        }
    }

    fn bit_of(pin: u32) -> u8 {
        1 << (pin & 0x7)
    }

    fn wait_idle(&self) {
        while self.i2c.is_busy() {}
    }

    /// Recover buffers parked in the bus driver by a previous transfer.
    fn reclaim_buffers(&self) {
        let (tx, rx) = self.i2c.take_buffers();
        if let Some(buffer) = tx {
            self.tx_buffer.put(Some(buffer));
        }
        if let Some(buffer) = rx {
            self.rx_buffer.put(Some(buffer));
        }
    }

    /// Push one register write. Waits for a previous transfer to finish,
    /// then returns as soon as the new one is accepted.
    fn write_register(&self, register: u8, value: u8) {
        self.wait_idle();
        self.reclaim_buffers();

        if let Some(buffer) = self.tx_buffer.take() {
            buffer[0] = register;
            buffer[1] = value;
            self.i2c
                .start_transfer(self.slave_address, Some(buffer), 2, None, 0);
        }
    }

    /// Fetch one register. Blocks for the round trip.
    fn read_register(&self, register: u8) -> u8 {
        self.wait_idle();
        self.reclaim_buffers();

        if let Some(buffer) = self.tx_buffer.take() {
            buffer[0] = register;
            let rx = self.rx_buffer.take();
            self.i2c
                .start_transfer(self.slave_address, Some(buffer), 1, rx, 1);
            self.wait_idle();
            self.reclaim_buffers();
        }
        self.rx_buffer.map_or(0, |buffer| buffer[0])
    }

    pub fn set_direction(&self, pin: u32, direction: Direction) {
        let port = Self::port_of(pin);
        let shadow = &self.iodir[port];
        match direction {
            Direction::Input => shadow.set(shadow.get() | Self::bit_of(pin)),
            Direction::Output => shadow.set(shadow.get() & !Self::bit_of(pin)),
        }
        let register = if port == PORT_B { IODIRB } else { IODIRA };
        self.write_register(register, shadow.get());
    }

    /// Only a pull-up is available; every other mode disables it.
    pub fn set_pull_mode(&self, pin: u32, mode: PullMode) {
        let port = Self::port_of(pin);
        let shadow = &self.gppu[port];
        if mode == PullMode::PullUp {
            shadow.set(shadow.get() | Self::bit_of(pin));
        } else {
            shadow.set(shadow.get() & !Self::bit_of(pin));
        }
        let register = if port == PORT_B { GPPUB } else { GPPUA };
        self.write_register(register, shadow.get());
    }

    /// The output driver is push-pull only.
    pub fn set_open_drain(&self, _pin: u32, _open_drain: bool) {}

    pub fn set(&self, pin: u32) {
        self.write(pin, Level::High);
    }

    pub fn clear(&self, pin: u32) {
        self.write(pin, Level::Low);
    }

    pub fn write(&self, pin: u32, level: Level) {
        let port = Self::port_of(pin);
        let shadow = &self.output[port];
        match level {
            Level::High => shadow.set(shadow.get() | Self::bit_of(pin)),
            Level::Low => shadow.set(shadow.get() & !Self::bit_of(pin)),
        }
        let register = if port == PORT_B { GPIOB } else { GPIOA };
        self.write_register(register, shadow.get());
    }

    pub fn read(&self, pin: u32) -> Level {
        let register = if Self::port_of(pin) == PORT_B {
            GPIOB
        } else {
            GPIOA
        };
        let value = self.read_register(register);
        Level::from(value & Self::bit_of(pin) != 0)
    }
}

/// One expander pin behind the shared [`Mcp23017`].
pub struct Mcp23017Pin<'a> {
    expander: &'a Mcp23017<'a>,
    pin: u32,
}

impl crate::hil::gpio::Pin for Mcp23017Pin<'_> {
    fn set_direction(&self, direction: Direction) {
        self.expander.set_direction(self.pin, direction);
    }

    fn set_pull_mode(&self, mode: PullMode) {
        self.expander.set_pull_mode(self.pin, mode);
    }

    fn set_open_drain(&self, open_drain: bool) {
        self.expander.set_open_drain(self.pin, open_drain);
    }

    fn set(&self) {
        self.expander.set(self.pin);
    }

    fn clear(&self) {
        self.expander.clear(self.pin);
    }

    fn write(&self, level: Level) {
        self.expander.write(self.pin, level);
    }

    fn read(&self) -> Level {
        self.expander.read(self.pin)
    }
}
