// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! SPI masters: the legacy SPI block (SPI0) and the two SSP controllers.
//!
//! Both blocks drive the same interrupt-per-frame transceive engine: every
//! completed frame is read (into the receive buffer, or discarded) and the
//! next frame written (from the transmit buffer, or a zero filler) until
//! the requested length is done. Full duplex comes for free; `transmit` and
//! `receive` are transceives with one side missing.
//!
//! Slave select is not handled here: device drivers own their SS line as a
//! GPIO pin and frame transactions themselves.

use core::cell::Cell;

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite};

use crate::cortexm3::nvic::Nvic;
use crate::gpio::{Function, Gpio, PinId};
use crate::hil;
use crate::hil::gpio::PullMode;
use crate::pm::{PclkDivisor, PeripheralClock, PeripheralPower, PowerManager};
use crate::utilities::cells::TakeCell;
use crate::utilities::StaticRef;

register_structs! {
    /// Legacy SPI registers (UM10360 chapter 17).
    pub SpiRegisters {
        /// Control
        (0x000 => pub spcr: ReadWrite<u32>),
        /// Status (read clears the flags)
        (0x004 => pub spsr: ReadOnly<u32>),
        /// Data
        (0x008 => pub spdr: ReadWrite<u32>),
        /// Clock counter
        (0x00c => pub spccr: ReadWrite<u32>),
        (0x010 => _reserved0),
        /// Interrupt flag
        (0x01c => pub spint: ReadWrite<u32>),
        (0x020 => @END),
    }
}

register_structs! {
    /// SSP controller registers (UM10360 chapter 18).
    pub SspRegisters {
        /// Control 0: frame format, clock polarity/phase, divider
        (0x000 => pub cr0: ReadWrite<u32>),
        /// Control 1: enable, master/slave
        (0x004 => pub cr1: ReadWrite<u32>),
        /// Data
        (0x008 => pub dr: ReadWrite<u32>),
        /// Status
        (0x00c => pub sr: ReadOnly<u32>),
        /// Clock prescaler
        (0x010 => pub cpsr: ReadWrite<u32>),
        /// Interrupt mask set/clear
        (0x014 => pub imsc: ReadWrite<u32>),
        /// Raw interrupt status
        (0x018 => pub ris: ReadOnly<u32>),
        /// Masked interrupt status
        (0x01c => pub mis: ReadOnly<u32>),
        /// Interrupt clear
        (0x020 => pub icr: ReadWrite<u32>),
        /// DMA control
        (0x024 => pub dmacr: ReadWrite<u32>),
        (0x028 => @END),
    }
}

/// The SPI and SSP register blocks in MMIO space.
pub const SPI0_BASE: StaticRef<SpiRegisters> =
    unsafe { StaticRef::new(0x4002_0000 as *const SpiRegisters) };
pub const SSP0_BASE: StaticRef<SspRegisters> =
    unsafe { StaticRef::new(0x4008_8000 as *const SspRegisters) };
pub const SSP1_BASE: StaticRef<SspRegisters> =
    unsafe { StaticRef::new(0x4003_0000 as *const SspRegisters) };

// Legacy SPI bits.
const SPCR_BIT_ENABLE: u32 = 1 << 2;
const SPCR_CPHA: u32 = 1 << 3;
const SPCR_CPOL: u32 = 1 << 4;
const SPCR_MASTER: u32 = 1 << 5;
const SPCR_LSBF: u32 = 1 << 6;
const SPCR_SPIE: u32 = 1 << 7;
const SPSR_SPIF: u32 = 1 << 7;
const SPINT_FLAG: u32 = 1 << 0;

// SSP bits.
const SSP_CR0_CPOL: u32 = 1 << 6;
const SSP_CR0_CPHA: u32 = 1 << 7;
const SSP_CR1_ENABLE: u32 = 1 << 1;
const SSP_SR_RNE: u32 = 1 << 2;
const SSP_INT_RX_TIMEOUT: u32 = 1 << 1;

/// The shared frame-at-a-time transceive engine.
struct Transfer<'a> {
    busy: Cell<bool>,
    tx_buffer: TakeCell<'a, [u8]>,
    rx_buffer: TakeCell<'a, [u8]>,
    write_position: Cell<usize>,
    read_position: Cell<usize>,
    length: Cell<usize>,
}

impl<'a> Transfer<'a> {
    const fn new() -> Transfer<'a> {
        Transfer {
            busy: Cell::new(false),
            tx_buffer: TakeCell::empty(),
            rx_buffer: TakeCell::empty(),
            write_position: Cell::new(0),
            read_position: Cell::new(0),
            length: Cell::new(0),
        }
    }

    /// Accept a transfer and write the first frame. Returns false while a
    /// previous transfer is in flight, true immediately for length zero.
    fn begin(
        &self,
        data_register: &ReadWrite<u32>,
        tx_buffer: Option<&'a mut [u8]>,
        rx_buffer: Option<&'a mut [u8]>,
        length: u16,
    ) -> bool {
        if self.busy.get() {
            return false;
        }
        let mut length = length as usize;
        if let Some(ref b) = tx_buffer {
            length = core::cmp::min(length, b.len());
        }
        if let Some(ref b) = rx_buffer {
            length = core::cmp::min(length, b.len());
        }
        if length == 0 {
            return true;
        }

        self.tx_buffer.put(tx_buffer);
        self.rx_buffer.put(rx_buffer);
        self.write_position.set(0);
        self.read_position.set(0);
        self.length.set(length);

        self.busy.set(true);
        self.write_next(data_register);
        true
    }

    fn write_next(&self, data_register: &ReadWrite<u32>) {
        let position = self.write_position.get();
        let data = self.tx_buffer.map_or(0, |buffer| buffer[position] as u32);
        data_register.set(data);
        self.write_position.set(position + 1);
    }

    fn read_next(&self, data_register: &ReadWrite<u32>) {
        let data = data_register.get();
        let position = self.read_position.get();
        self.rx_buffer.map(|buffer| buffer[position] = data as u8);
        self.read_position.set(position + 1);
    }

    /// One frame completed: collect it and push the next, or finish.
    fn advance(&self, data_register: &ReadWrite<u32>) {
        self.read_next(data_register);
        if self.read_position.get() == self.length.get() {
            self.busy.set(false);
            return;
        }
        self.write_next(data_register);
    }
}

fn route_pins(gpio: &Gpio, pins: &[PinId; 3], function: Function) {
    for &pin in pins {
        gpio.set_function(pin, function);
        gpio.set_pull_mode(pin, PullMode::PullNone);
        gpio.set_open_drain(pin, false);
    }
}

/// The legacy SPI block (SPI0).
pub struct LegacySpi<'a> {
    registers: StaticRef<SpiRegisters>,
    nvic: Nvic,
    /// SCK, MISO, MOSI.
    pins: [PinId; 3],
    pin_function: Function,
    transfer: Transfer<'a>,
}

impl<'a> LegacySpi<'a> {
    pub const fn new(
        registers: StaticRef<SpiRegisters>,
        nvic: Nvic,
        pins: [PinId; 3],
        pin_function: Function,
    ) -> LegacySpi<'a> {
        LegacySpi {
            registers,
            nvic,
            pins,
            pin_function,
            transfer: Transfer::new(),
        }
    }

    /// Power the block, route SCK/MISO/MOSI, program the clock divider
    /// (clamped to the legal 8..=255) and the frame format, and enable the
    /// interrupt line. Frame sizes of 8..=16 bits are accepted; only 8-bit
    /// buffers are moved by this driver.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        &self,
        pm: &PowerManager,
        gpio: &Gpio,
        clock: PclkDivisor,
        spi_clock_frequency: u32,
        bits: u32,
        clock_phase_2nd_edge: bool,
        clock_polarity_active_low: bool,
        lsb_first: bool,
    ) {
        pm.enable_peripheral(PeripheralPower::Spi);
        pm.set_peripheral_clock(PeripheralClock::Spi, clock);
        let peripheral_frequency = pm.peripheral_clock_frequency(PeripheralClock::Spi);

        route_pins(gpio, &self.pins, self.pin_function);

        let divider = (peripheral_frequency / spi_clock_frequency).clamp(8, 255);
        self.registers.spccr.set(divider);

        if !(8..=16).contains(&bits) {
            return;
        }
        let mut control = SPCR_MASTER | SPCR_SPIE;
        if clock_phase_2nd_edge {
            control |= SPCR_CPHA;
        }
        if clock_polarity_active_low {
            control |= SPCR_CPOL;
        }
        if lsb_first {
            control |= SPCR_LSBF;
        }
        if bits > 8 {
            control |= SPCR_BIT_ENABLE | ((bits & 0xf) << 8);
        }
        self.registers.spcr.set(control);

        self.nvic.enable();
    }

    /// The SPI interrupt entry point.
    pub fn handle_interrupt(&self) {
        if self.registers.spint.get() & SPINT_FLAG != 0 {
            // Reading the status register clears the transfer-complete flag.
            let status = self.registers.spsr.get();
            if status & SPSR_SPIF != 0 {
                self.transfer.advance(&self.registers.spdr);
            }
            self.registers.spint.set(SPINT_FLAG);
        }
    }
}

impl<'a> hil::spi::SpiMaster<'a> for LegacySpi<'a> {
    fn is_busy(&self) -> bool {
        self.transfer.busy.get()
    }

    fn transmit(&self, tx_buffer: &'a mut [u8], length: u16) -> bool {
        self.transfer
            .begin(&self.registers.spdr, Some(tx_buffer), None, length)
    }

    fn receive(&self, rx_buffer: &'a mut [u8], length: u16) -> bool {
        self.transfer
            .begin(&self.registers.spdr, None, Some(rx_buffer), length)
    }

    fn transceive(&self, tx_buffer: &'a mut [u8], rx_buffer: &'a mut [u8], length: u16) -> bool {
        self.transfer.begin(
            &self.registers.spdr,
            Some(tx_buffer),
            Some(rx_buffer),
            length,
        )
    }

    fn take_buffers(&self) -> (Option<&'a mut [u8]>, Option<&'a mut [u8]>) {
        (self.transfer.tx_buffer.take(), self.transfer.rx_buffer.take())
    }
}

/// One SSP controller.
pub struct Ssp<'a> {
    registers: StaticRef<SspRegisters>,
    nvic: Nvic,
    pclk: PeripheralClock,
    power: PeripheralPower,
    /// SCK, MISO, MOSI.
    pins: [PinId; 3],
    pin_function: Function,
    transfer: Transfer<'a>,
}

impl<'a> Ssp<'a> {
    pub const fn new(
        registers: StaticRef<SspRegisters>,
        nvic: Nvic,
        pclk: PeripheralClock,
        power: PeripheralPower,
        pins: [PinId; 3],
        pin_function: Function,
    ) -> Ssp<'a> {
        Ssp {
            registers,
            nvic,
            pclk,
            power,
            pins,
            pin_function,
            transfer: Transfer::new(),
        }
    }

    /// Power the controller, route SCK/MISO/MOSI, program prescaler and
    /// divider for `spi_clock_frequency`, select the frame format (4..=16
    /// bits; only 8-bit buffers are moved by this driver), and enable the
    /// controller with its receive-timeout interrupt.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        &self,
        pm: &PowerManager,
        gpio: &Gpio,
        clock: PclkDivisor,
        spi_clock_frequency: u32,
        bits: u32,
        clock_phase_2nd_edge: bool,
        clock_polarity_active_low: bool,
    ) {
        pm.enable_peripheral(self.power);
        pm.set_peripheral_clock(self.pclk, clock);
        let peripheral_frequency = pm.peripheral_clock_frequency(self.pclk);

        route_pins(gpio, &self.pins, self.pin_function);

        if !(4..=16).contains(&bits) {
            return;
        }
        let mut mode = (bits - 1) & 0xf;
        if clock_polarity_active_low {
            mode |= SSP_CR0_CPOL;
        }
        if clock_phase_2nd_edge {
            mode |= SSP_CR0_CPHA;
        }

        // Bit clock = peripheral clock / (CPSR * (divider + 1)) with a
        // fixed prescaler of two.
        let divider = (peripheral_frequency / spi_clock_frequency / 2).clamp(6, 65536) - 1;
        self.registers.cpsr.set(2);
        self.registers.imsc.set(SSP_INT_RX_TIMEOUT);
        self.registers.cr0.set(mode | (divider << 8));
        self.registers.cr1.set(SSP_CR1_ENABLE);

        self.nvic.enable();
    }

    /// The SSP interrupt entry point.
    pub fn handle_interrupt(&self) {
        if self.registers.mis.get() & SSP_INT_RX_TIMEOUT != 0 {
            let status = self.registers.sr.get();
            if status & SSP_SR_RNE != 0 {
                self.transfer.advance(&self.registers.dr);
            }
            self.registers.icr.set(SSP_INT_RX_TIMEOUT);
        }
    }
}

impl<'a> hil::spi::SpiMaster<'a> for Ssp<'a> {
    fn is_busy(&self) -> bool {
        self.transfer.busy.get()
    }

    fn transmit(&self, tx_buffer: &'a mut [u8], length: u16) -> bool {
        self.transfer
            .begin(&self.registers.dr, Some(tx_buffer), None, length)
    }

    fn receive(&self, rx_buffer: &'a mut [u8], length: u16) -> bool {
        self.transfer
            .begin(&self.registers.dr, None, Some(rx_buffer), length)
    }

    fn transceive(&self, tx_buffer: &'a mut [u8], rx_buffer: &'a mut [u8], length: u16) -> bool {
        self.transfer
            .begin(&self.registers.dr, Some(tx_buffer), Some(rx_buffer), length)
    }

    fn take_buffers(&self) -> (Option<&'a mut [u8]>, Option<&'a mut [u8]>) {
        (self.transfer.tx_buffer.take(), self.transfer.rx_buffer.take())
    }
}
