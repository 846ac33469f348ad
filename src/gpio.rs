// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Pin multiplexing, GPIO, and pin interrupts.
//!
//! Pins are named by the packed word `(port << 5) | index` (ports 0..=4,
//! indices 0..=31). Per-pin configuration lives in the pin-connect block
//! (2-bit function and pull fields, 1-bit open drain); direction and level
//! live in the per-port fast-I/O blocks. Any operation on a pin beyond
//! P4.31 is a silent no-op; the layer above is expected to validate.
//!
//! Two interrupt facilities are exposed: the four dedicated external
//! interrupt pins P2.10..P2.13 ([`Eint`], one NVIC line each) and the
//! port-0/port-2 change interrupts ([`PinInterrupt`]), which all share the
//! EINT3 vector.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite};

use crate::cortexm3::nvic::Nvic;
use crate::hil::gpio::{Direction, Level, PullMode};
use crate::pm::SysconRegisters;
use crate::utilities::StaticRef;

/// A packed pin identifier: `(port << 5) | index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PinId(pub u32);

impl PinId {
    pub const fn new(port: u32, index: u32) -> PinId {
        PinId((port << 5) + index)
    }

    pub const fn port(self) -> u32 {
        self.0 >> 5
    }

    pub const fn index(self) -> u32 {
        self.0 & 0x1f
    }

    /// The highest pin the package bonds out.
    pub const MAX: PinId = PinId::new(4, 31);

    const fn is_valid(self) -> bool {
        self.0 <= PinId::MAX.0
    }
}

/// Pin function selection: GPIO or one of three alternates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Primary = 0,
    Alternate1 = 1,
    Alternate2 = 2,
    Alternate3 = 3,
}

register_structs! {
    /// Pin connect block (UM10360 chapter 8).
    pub PinConnectRegisters {
        /// Function select, 2 bits per pin, 16 pins per register
        (0x000 => pub pinsel: [ReadWrite<u32>; 10]),
        (0x028 => _reserved0),
        /// Pull-up/pull-down select, 2 bits per pin
        (0x040 => pub pinmode: [ReadWrite<u32>; 10]),
        /// Open-drain select, 1 bit per pin, one register per port
        (0x068 => pub pinmode_od: [ReadWrite<u32>; 5]),
        /// I2C0 pad configuration
        (0x07c => pub i2cpadcfg: ReadWrite<u32>),
        (0x080 => @END),
    }
}

register_structs! {
    /// One fast-I/O port (UM10360 chapter 9).
    pub GpioPortRegisters {
        /// Direction, 1 = output
        (0x00 => pub fiodir: ReadWrite<u32>),
        (0x04 => _reserved0),
        /// Write mask: a 1 bit excludes the pin from FIOPIN/FIOSET/FIOCLR
        (0x10 => pub fiomask: ReadWrite<u32>),
        /// Pin value
        (0x14 => pub fiopin: ReadWrite<u32>),
        /// Output set
        (0x18 => pub fioset: ReadWrite<u32>),
        /// Output clear
        (0x1c => pub fioclr: ReadWrite<u32>),
        (0x20 => @END),
    }
}

register_structs! {
    /// The five fast-I/O ports, contiguous in the AHB address space.
    pub GpioRegisters {
        (0x000 => pub ports: [GpioPortRegisters; 5]),
        (0x0a0 => @END),
    }
}

register_structs! {
    /// GPIO interrupt block: rising/falling enables and flags for ports 0
    /// and 2 (UM10360 chapter 9.5).
    pub GpioIntRegisters {
        /// Overall status: bit 0 = port 0, bit 2 = port 2
        (0x00 => pub status: ReadOnly<u32>),
        (0x04 => pub io0_int_stat_r: ReadOnly<u32>),
        (0x08 => pub io0_int_stat_f: ReadOnly<u32>),
        (0x0c => pub io0_int_clr: ReadWrite<u32>),
        (0x10 => pub io0_int_en_r: ReadWrite<u32>),
        (0x14 => pub io0_int_en_f: ReadWrite<u32>),
        (0x18 => _reserved0),
        (0x24 => pub io2_int_stat_r: ReadOnly<u32>),
        (0x28 => pub io2_int_stat_f: ReadOnly<u32>),
        (0x2c => pub io2_int_clr: ReadWrite<u32>),
        (0x30 => pub io2_int_en_r: ReadWrite<u32>),
        (0x34 => pub io2_int_en_f: ReadWrite<u32>),
        (0x38 => @END),
    }
}

/// The pin connect block in MMIO space.
pub const PINCON_BASE: StaticRef<PinConnectRegisters> =
    unsafe { StaticRef::new(0x4002_c000 as *const PinConnectRegisters) };

/// The fast-I/O ports in MMIO space.
pub const GPIO_BASE: StaticRef<GpioRegisters> =
    unsafe { StaticRef::new(0x2009_c000 as *const GpioRegisters) };

/// The GPIO interrupt block in MMIO space.
pub const GPIOINT_BASE: StaticRef<GpioIntRegisters> =
    unsafe { StaticRef::new(0x4002_8080 as *const GpioIntRegisters) };

/// Pin multiplexing and GPIO access for all five ports.
pub struct Gpio {
    pincon: StaticRef<PinConnectRegisters>,
    ports: StaticRef<GpioRegisters>,
}

impl Gpio {
    pub const fn new(
        pincon: StaticRef<PinConnectRegisters>,
        ports: StaticRef<GpioRegisters>,
    ) -> Gpio {
        Gpio { pincon, ports }
    }

    /// Select the function of one pin. The function and pull registers pack
    /// 16 pins into each 32-bit slot.
    pub fn set_function(&self, pin: PinId, function: Function) {
        if !pin.is_valid() {
            return;
        }
        let slot = (pin.0 >> 4) as usize;
        let shift = (pin.0 & 0xf) << 1;
        let pinsel = &self.pincon.pinsel[slot];
        pinsel.set((pinsel.get() & !(0x3 << shift)) | ((function as u32) << shift));
    }

    pub fn set_pull_mode(&self, pin: PinId, mode: PullMode) {
        if !pin.is_valid() {
            return;
        }
        let slot = (pin.0 >> 4) as usize;
        let shift = (pin.0 & 0xf) << 1;
        let pinmode = &self.pincon.pinmode[slot];
        pinmode.set((pinmode.get() & !(0x3 << shift)) | ((mode as u32) << shift));
    }

    pub fn set_open_drain(&self, pin: PinId, open_drain: bool) {
        if !pin.is_valid() {
            return;
        }
        let od = &self.pincon.pinmode_od[pin.port() as usize];
        if open_drain {
            od.set(od.get() | (1 << pin.index()));
        } else {
            od.set(od.get() & !(1 << pin.index()));
        }
    }

    pub fn set_direction(&self, pin: PinId, direction: Direction) {
        if !pin.is_valid() {
            return;
        }
        let port = &self.ports.ports[pin.port() as usize];
        if direction == Direction::Input {
            port.fiodir.set(port.fiodir.get() & !(1 << pin.index()));
        } else {
            port.fiodir.set(port.fiodir.get() | (1 << pin.index()));
        }
    }

    pub fn set(&self, pin: PinId) {
        if !pin.is_valid() {
            return;
        }
        self.ports.ports[pin.port() as usize]
            .fioset
            .set(1 << pin.index());
    }

    pub fn clear(&self, pin: PinId) {
        if !pin.is_valid() {
            return;
        }
        self.ports.ports[pin.port() as usize]
            .fioclr
            .set(1 << pin.index());
    }

    pub fn write(&self, pin: PinId, level: Level) {
        match level {
            Level::Low => self.clear(pin),
            Level::High => self.set(pin),
        }
    }

    pub fn read(&self, pin: PinId) -> Level {
        if !pin.is_valid() {
            return Level::Low;
        }
        let port = &self.ports.ports[pin.port() as usize];
        Level::from(port.fiopin.get() & (1 << pin.index()) != 0)
    }

    /// Write a slice of the port containing `pin_lsb`: the write mask is
    /// programmed, the pin register written, and the mask restored to zero.
    ///
    /// Must not race a concurrent single-pin write to the same port; the
    /// mask register is port-global state.
    pub fn write_port(&self, pin_lsb: PinId, mask: u32, value: u32) {
        if !pin_lsb.is_valid() {
            return;
        }
        let port = &self.ports.ports[pin_lsb.port() as usize];
        port.fiomask.set(!mask);
        port.fiopin.set(value);
        port.fiomask.set(0);
    }

    /// Write one byte lane of the port containing `pin_lsb`, which must be
    /// byte aligned within the port.
    pub fn write_byte(&self, pin_lsb: PinId, value: u8) {
        let lane = pin_lsb.index();
        if lane % 8 != 0 {
            return;
        }
        self.write_port(
            PinId::new(pin_lsb.port(), 0),
            0xff << lane,
            (value as u32) << lane,
        );
    }

    /// Write one halfword lane of the port containing `pin_lsb`, which must
    /// be halfword aligned within the port.
    pub fn write_halfword(&self, pin_lsb: PinId, value: u16) {
        let lane = pin_lsb.index();
        if lane % 16 != 0 {
            return;
        }
        self.write_port(
            PinId::new(pin_lsb.port(), 0),
            0xffff << lane,
            (value as u32) << lane,
        );
    }

    /// A handle to one pin implementing [`crate::hil::gpio::Pin`].
    pub fn pin(&self, pin: PinId) -> GpioPin {
        GpioPin {
            pincon: self.pincon,
            ports: self.ports,
            pin,
        }
    }

    /// Program the I2C0 pad drive configuration (0x05 selects the
    /// Fast-mode-plus capable drive on P0.27/P0.28).
    pub(crate) fn set_i2c_pad_config(&self, fast_mode_plus: bool) {
        self.pincon
            .i2cpadcfg
            .set(if fast_mode_plus { 0x05 } else { 0x00 });
    }
}

/// One on-chip pin, usable wherever a [`crate::hil::gpio::Pin`] is expected.
pub struct GpioPin {
    pincon: StaticRef<PinConnectRegisters>,
    ports: StaticRef<GpioRegisters>,
    pin: PinId,
}

impl GpioPin {
    fn gpio(&self) -> Gpio {
        Gpio::new(self.pincon, self.ports)
    }

    pub fn set_function(&self, function: Function) {
        self.gpio().set_function(self.pin, function);
    }
}

impl crate::hil::gpio::Pin for GpioPin {
    fn set_direction(&self, direction: Direction) {
        self.gpio().set_direction(self.pin, direction);
    }

    fn set_pull_mode(&self, mode: PullMode) {
        self.gpio().set_pull_mode(self.pin, mode);
    }

    fn set_open_drain(&self, open_drain: bool) {
        self.gpio().set_open_drain(self.pin, open_drain);
    }

    fn set(&self) {
        self.gpio().set(self.pin);
    }

    fn clear(&self) {
        self.gpio().clear(self.pin);
    }

    fn write(&self, level: Level) {
        self.gpio().write(self.pin, level);
    }

    fn read(&self) -> Level {
        self.gpio().read(self.pin)
    }
}

/// Trigger mode of a dedicated external interrupt pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptMode {
    Level = 0,
    Edge = 1,
}

/// Polarity of a dedicated external interrupt: low level / falling edge, or
/// high level / rising edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptPolarity {
    Low = 0,
    High = 1,
}

const EINT_FIRST: PinId = PinId::new(2, 10);
const EINT_LAST: PinId = PinId::new(2, 13);

/// The dedicated external interrupt pins P2.10..P2.13 (EINT0..EINT3).
pub struct Eint {
    syscon: StaticRef<SysconRegisters>,
    lines: [Nvic; 4],
}

impl Eint {
    pub const fn new(syscon: StaticRef<SysconRegisters>, lines: [Nvic; 4]) -> Eint {
        Eint { syscon, lines }
    }

    fn line_of(pin: PinId) -> Option<usize> {
        if pin < EINT_FIRST || pin > EINT_LAST {
            None
        } else {
            Some((pin.index() - 10) as usize)
        }
    }

    /// Route `pin` to its EINT line: select the interrupt alternate, make
    /// the pin an input, program mode and polarity, and enable the NVIC
    /// line. Pins outside P2.10..P2.13 are ignored.
    pub fn configure(
        &self,
        gpio: &Gpio,
        pin: PinId,
        mode: InterruptMode,
        polarity: InterruptPolarity,
    ) {
        let Some(line) = Self::line_of(pin) else {
            return;
        };

        gpio.set_function(pin, Function::Alternate1);
        gpio.set_direction(pin, Direction::Input);

        let bit = 1 << line;
        match mode {
            InterruptMode::Level => self.syscon.extmode.set(self.syscon.extmode.get() & !bit),
            InterruptMode::Edge => self.syscon.extmode.set(self.syscon.extmode.get() | bit),
        }
        match polarity {
            InterruptPolarity::Low => self.syscon.extpolar.set(self.syscon.extpolar.get() & !bit),
            InterruptPolarity::High => self.syscon.extpolar.set(self.syscon.extpolar.get() | bit),
        }

        self.lines[line].enable();
    }

    /// Disable the EINT line of `pin` and return the pin to GPIO duty.
    pub fn disable(&self, gpio: &Gpio, pin: PinId) {
        let Some(line) = Self::line_of(pin) else {
            return;
        };
        self.lines[line].disable();
        gpio.set_function(pin, Function::Primary);
    }

    /// Whether the EINT flag of `pin` is raised.
    pub fn is_flagged(&self, pin: PinId) -> bool {
        match Self::line_of(pin) {
            Some(line) => self.syscon.extint.get() & (1 << line) != 0,
            None => false,
        }
    }

    /// Acknowledge the EINT flag of `pin` (write one to clear).
    pub fn clear_flag(&self, pin: PinId) {
        if let Some(line) = Self::line_of(pin) {
            self.syscon.extint.set(1 << line);
        }
    }
}

/// Polarity of a port-change interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinInterruptEdge {
    Rising = 0,
    Falling = 1,
}

/// Port-change interrupts for ports 0 and 2. Each (pin, edge) pair is
/// individually armable; every armed pin shares the single EINT3 vector,
/// enabled once via [`PinInterrupt::enable_all`].
pub struct PinInterrupt {
    registers: StaticRef<GpioIntRegisters>,
    nvic: Nvic,
}

impl PinInterrupt {
    pub const fn new(registers: StaticRef<GpioIntRegisters>, nvic: Nvic) -> PinInterrupt {
        PinInterrupt { registers, nvic }
    }

    /// Enable the shared EINT3 vector.
    pub fn enable_all(&self) {
        self.nvic.enable();
    }

    /// Disable the shared EINT3 vector.
    pub fn disable_all(&self) {
        self.nvic.disable();
    }

    fn enables_for(&self, pin: PinId, edge: PinInterruptEdge) -> Option<&ReadWrite<u32>> {
        match (pin.port(), edge) {
            _ if !pin.is_valid() => None,
            (0, PinInterruptEdge::Rising) => Some(&self.registers.io0_int_en_r),
            (0, PinInterruptEdge::Falling) => Some(&self.registers.io0_int_en_f),
            (2, PinInterruptEdge::Rising) => Some(&self.registers.io2_int_en_r),
            (2, PinInterruptEdge::Falling) => Some(&self.registers.io2_int_en_f),
            _ => None,
        }
    }

    /// Arm the change interrupt for one (pin, edge) pair. Only ports 0 and
    /// 2 can raise change interrupts; other pins are ignored.
    pub fn enable(&self, pin: PinId, edge: PinInterruptEdge) {
        if let Some(en) = self.enables_for(pin, edge) {
            en.set(en.get() | (1 << pin.index()));
        }
    }

    /// Disarm the change interrupt for one (pin, edge) pair.
    pub fn disable(&self, pin: PinId, edge: PinInterruptEdge) {
        if let Some(en) = self.enables_for(pin, edge) {
            en.set(en.get() & !(1 << pin.index()));
        }
    }

    /// Whether the change interrupt for (pin, edge) is flagged.
    pub fn is_flagged(&self, pin: PinId, edge: PinInterruptEdge) -> bool {
        let stat = match (pin.port(), edge) {
            _ if !pin.is_valid() => return false,
            (0, PinInterruptEdge::Rising) => &self.registers.io0_int_stat_r,
            (0, PinInterruptEdge::Falling) => &self.registers.io0_int_stat_f,
            (2, PinInterruptEdge::Rising) => &self.registers.io2_int_stat_r,
            (2, PinInterruptEdge::Falling) => &self.registers.io2_int_stat_f,
            _ => return false,
        };
        stat.get() & (1 << pin.index()) != 0
    }

    /// Acknowledge both edge flags of one pin.
    pub fn clear_flag(&self, pin: PinId) {
        if !pin.is_valid() {
            return;
        }
        match pin.port() {
            0 => self.registers.io0_int_clr.set(1 << pin.index()),
            2 => self.registers.io2_int_clr.set(1 << pin.index()),
            _ => {}
        }
    }
}
