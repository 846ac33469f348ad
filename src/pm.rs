// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Clock tree and power management.
//!
//! Owns the system-control block of the LPC176x: oscillator selection, the
//! main PLL, the CPU clock divider, per-peripheral clock dividers, and the
//! PCONP power gates. The manager publishes the derived CPU frequency and
//! notifies registered [`ClockClient`]s whenever it changes; the flash
//! accelerator's access time is reprogrammed before any client runs, because
//! a too-fast flash setting at the new frequency would stop the CPU fetching
//! correctly.
//!
//! Sequencing in this module is load bearing. The PLL0 control and
//! configuration registers only take effect after the 0xAA/0x55 feed
//! sequence, and the PLL must not be connected until it reports lock.

use core::cell::Cell;

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

use crate::errorcode::ErrorCode;
use crate::utilities::cells::OptionalCell;
use crate::utilities::StaticRef;

/// Frequency of the internal RC oscillator.
const IRC_FREQUENCY: u32 = 4_000_000;

/// Maximum number of registered clock-change clients.
const MAX_CLOCK_CLIENTS: usize = 4;

register_structs! {
    /// System control block (UM10360 chapter 3/4): clock source selection,
    /// PLL0, clock dividers, power control, and the external interrupt
    /// configuration shared with the pin driver.
    pub SysconRegisters {
        /// Flash accelerator configuration
        (0x000 => pub flashcfg: ReadWrite<u32, FlashConfig::Register>),
        (0x004 => _reserved0),

        /// PLL0 control
        (0x080 => pub pll0con: ReadWrite<u32, PllControl::Register>),
        /// PLL0 configuration
        (0x084 => pub pll0cfg: ReadWrite<u32, PllConfig::Register>),
        /// PLL0 status
        (0x088 => pub pll0stat: ReadOnly<u32, PllStatus::Register>),
        /// PLL0 feed
        (0x08c => pub pll0feed: ReadWrite<u32>),
        (0x090 => _reserved1),

        /// Power mode control
        (0x0c0 => pub pcon: ReadWrite<u32>),
        /// Power control for peripherals
        (0x0c4 => pub pconp: ReadWrite<u32>),
        (0x0c8 => _reserved2),

        /// CPU clock divider
        (0x104 => pub cclkcfg: ReadWrite<u32>),
        /// USB clock divider
        (0x108 => pub usbclkcfg: ReadWrite<u32>),
        /// Clock source select
        (0x10c => pub clksrcsel: ReadWrite<u32>),
        (0x110 => _reserved3),

        /// External interrupt flags
        (0x140 => pub extint: ReadWrite<u32>),
        (0x144 => _reserved4),
        /// External interrupt mode (level/edge)
        (0x148 => pub extmode: ReadWrite<u32>),
        /// External interrupt polarity
        (0x14c => pub extpolar: ReadWrite<u32>),
        (0x150 => _reserved5),

        /// Reset source identification
        (0x180 => pub rsid: ReadWrite<u32>),
        (0x184 => _reserved6),

        /// System control and status (main oscillator control)
        (0x1a0 => pub scs: ReadWrite<u32, SystemControlAndStatus::Register>),
        (0x1a4 => _reserved7),
        /// Peripheral clock selection 0
        (0x1a8 => pub pclksel0: ReadWrite<u32>),
        /// Peripheral clock selection 1
        (0x1ac => pub pclksel1: ReadWrite<u32>),
        (0x1b0 => _reserved8),

        /// DMA request select (primary or alternate request lines)
        (0x1c4 => pub dmareqsel: ReadWrite<u32>),
        /// CLKOUT configuration
        (0x1c8 => pub clkoutcfg: ReadWrite<u32>),

        (0x1cc => @END),
    }
}

register_bitfields![u32,
    pub FlashConfig [
        /// Flash access time in CPU cycles minus one
        FLASHTIM    OFFSET(12)  NUMBITS(4)
    ],

    pub PllControl [
        /// Connect PLL0 as the CPU clock source (after lock)
        PLLC        OFFSET(1)   NUMBITS(1),
        /// Enable PLL0
        PLLE        OFFSET(0)   NUMBITS(1)
    ],

    pub PllConfig [
        /// Pre-divider value minus one
        NSEL        OFFSET(16)  NUMBITS(8),
        /// Multiplier value minus one
        MSEL        OFFSET(0)   NUMBITS(15)
    ],

    pub PllStatus [
        /// PLL0 lock status
        PLOCK0      OFFSET(26)  NUMBITS(1),
        /// Read-back of the connect bit
        PLLC_STAT   OFFSET(25)  NUMBITS(1),
        /// Read-back of the enable bit
        PLLE_STAT   OFFSET(24)  NUMBITS(1)
    ],

    pub SystemControlAndStatus [
        /// Main oscillator ready flag
        OSCSTAT     OFFSET(6)   NUMBITS(1),
        /// Main oscillator enable
        OSCEN       OFFSET(5)   NUMBITS(1),
        /// Main oscillator range: 0 for 1-20 MHz, 1 for 15-25 MHz
        OSCRANGE    OFFSET(4)   NUMBITS(1)
    ]
];

/// The system control block in MMIO space.
pub const SYSCON_BASE: StaticRef<SysconRegisters> =
    unsafe { StaticRef::new(0x400f_c000 as *const SysconRegisters) };

/// Selectable system clock sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    InternalRc = 0,
    MainOscillator = 1,
}

/// Peripheral clock selector fields, numbered so that `id << 1` is the bit
/// offset into PCLKSEL0/PCLKSEL1 (UM10360 tables 40/41).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeripheralClock {
    Wdt = 0,
    Timer0 = 1,
    Timer1 = 2,
    Uart0 = 3,
    Uart1 = 4,
    Pwm1 = 6,
    I2c0 = 7,
    Spi = 8,
    Ssp1 = 10,
    Dac = 11,
    Adc = 12,
    Can1 = 13,
    Can2 = 14,
    CanFilter = 15,
    Qei = 16,
    GpioInterrupt = 17,
    PinConnect = 18,
    I2c1 = 19,
    Ssp0 = 21,
    Timer2 = 22,
    Timer3 = 23,
    Uart2 = 24,
    Uart3 = 25,
    I2c2 = 26,
    I2s = 27,
    Rit = 29,
    SystemControl = 30,
    Mcpwm = 31,
}

/// PCONP power-gate bit positions (UM10360 table 46).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeripheralPower {
    Timer0 = 1,
    Timer1 = 2,
    Uart0 = 3,
    Uart1 = 4,
    Pwm1 = 6,
    I2c0 = 7,
    Spi = 8,
    Rtc = 9,
    Ssp1 = 10,
    Adc = 12,
    Can1 = 13,
    Can2 = 14,
    Gpio = 15,
    Rit = 16,
    Mcpwm = 17,
    Qei = 18,
    I2c1 = 19,
    Ssp0 = 21,
    Timer2 = 22,
    Timer3 = 23,
    Uart2 = 24,
    Uart3 = 25,
    I2c2 = 26,
    I2s = 27,
    Dma = 29,
    Ethernet = 30,
    Usb = 31,
}

/// The two-bit per-peripheral clock divider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PclkDivisor {
    DivideBy4 = 0,
    DivideBy1 = 1,
    DivideBy2 = 2,
    /// Divide by 8, except for the CAN blocks where this selects divide by 6.
    DivideBy8 = 3,
}

/// Observer of CPU-frequency changes.
///
/// Clients are notified in registration order after every recomputation of
/// the CPU frequency, with the new frequency as argument. The flash access
/// time is reprogrammed before the first client runs.
pub trait ClockClient {
    fn clock_changed(&self, cpu_frequency: u32);
}

/// The clock and power manager. One per chip.
pub struct PowerManager<'a> {
    registers: StaticRef<SysconRegisters>,
    cpu_frequency: Cell<u32>,
    main_oscillator_frequency: Cell<u32>,
    clients: [OptionalCell<&'a dyn ClockClient>; MAX_CLOCK_CLIENTS],
    num_clients: Cell<usize>,
}

impl<'a> PowerManager<'a> {
    pub const fn new(registers: StaticRef<SysconRegisters>) -> PowerManager<'a> {
        PowerManager {
            registers,
            cpu_frequency: Cell::new(IRC_FREQUENCY),
            main_oscillator_frequency: Cell::new(0),
            clients: [
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
                OptionalCell::empty(),
            ],
            num_clients: Cell::new(0),
        }
    }

    /// The CPU frequency in Hz, as last derived from the clock settings.
    pub fn cpu_frequency(&self) -> u32 {
        self.cpu_frequency.get()
    }

    /// Register a clock-change observer. At most four observers are
    /// supported; further registrations are refused.
    pub fn attach_client(&self, client: &'a dyn ClockClient) -> Result<(), ErrorCode> {
        let n = self.num_clients.get();
        if n >= MAX_CLOCK_CLIENTS {
            return Err(ErrorCode::NOMEM);
        }
        self.clients[n].set(client);
        self.num_clients.set(n + 1);
        Ok(())
    }

    fn feed_system_pll(&self) {
        self.registers.pll0feed.set(0xAA);
        self.registers.pll0feed.set(0x55);
    }

    fn disconnect_pll(&self) {
        self.registers.pll0con.set(0);
        self.feed_system_pll();
    }

    fn source_frequency(&self) -> u32 {
        if self.registers.clksrcsel.get() == ClockSource::MainOscillator as u32 {
            self.main_oscillator_frequency.get()
        } else {
            IRC_FREQUENCY
        }
    }

    fn set_flash_access_time(&self, cpu_frequency: u32) {
        // 5 CPU cycles are sufficient under any conditions for the LPC1769.
        let setting = core::cmp::min((cpu_frequency - 1) / 20_000_000, 5);
        self.registers
            .flashcfg
            .write(FlashConfig::FLASHTIM.val(setting));
    }

    fn notify_clients(&self, cpu_frequency: u32) {
        // The flash access time must track the CPU clock before anything
        // else runs at the new frequency.
        self.set_flash_access_time(cpu_frequency);

        for client in self.clients.iter().take(self.num_clients.get()) {
            client.map(|c| c.clock_changed(cpu_frequency));
        }
    }

    /// Enable the main oscillator and wait for it to become ready.
    /// `frequency` is the crystal frequency in Hz and selects the oscillator
    /// range.
    pub fn enable_main_oscillator(&self, frequency: u32) {
        self.main_oscillator_frequency.set(frequency);

        if frequency < 15_000_000 {
            self.registers.scs.modify(
                SystemControlAndStatus::OSCRANGE::CLEAR + SystemControlAndStatus::OSCEN::SET,
            );
        } else {
            self.registers.scs.modify(
                SystemControlAndStatus::OSCRANGE::SET + SystemControlAndStatus::OSCEN::SET,
            );
        }

        while !self.registers.scs.is_set(SystemControlAndStatus::OSCSTAT) {}
    }

    /// Disable the main oscillator, transparently falling back to the
    /// internal RC oscillator if it is the current system clock source.
    pub fn disable_main_oscillator(&self) {
        self.main_oscillator_frequency.set(0);

        if self.registers.clksrcsel.get() == ClockSource::MainOscillator as u32 {
            self.use_system_clock(ClockSource::InternalRc, 1);
        }

        self.registers.scs.modify(
            SystemControlAndStatus::OSCEN::CLEAR + SystemControlAndStatus::OSCRANGE::CLEAR,
        );
    }

    /// Clock the CPU directly from `source` through `cpu_divider` (1..=256),
    /// disconnecting the PLL if it is connected. Selecting a disabled main
    /// oscillator or an out-of-range divider is a no-op.
    pub fn use_system_clock(&self, source: ClockSource, cpu_divider: u32) {
        if !(1..=256).contains(&cpu_divider) {
            return;
        }
        if source == ClockSource::MainOscillator && self.main_oscillator_frequency.get() == 0 {
            return;
        }

        if self.is_system_pll_connected() {
            self.disconnect_pll();
        }

        self.registers.clksrcsel.set(source as u32);
        self.registers.cclkcfg.set(cpu_divider - 1);

        self.cpu_frequency
            .set(self.source_frequency() / cpu_divider);
        self.notify_clients(self.cpu_frequency.get());
    }

    /// Whether PLL0 is connected as the CPU clock source.
    pub fn is_system_pll_connected(&self) -> bool {
        self.registers.pll0con.is_set(PllControl::PLLC)
    }

    /// Disconnect PLL0 and run from the raw source through `cpu_divider`.
    pub fn disconnect_system_pll(&self, cpu_divider: u32) {
        if !(1..=256).contains(&cpu_divider) {
            return;
        }

        self.disconnect_pll();
        self.registers.cclkcfg.set(cpu_divider - 1);

        self.cpu_frequency
            .set(self.source_frequency() / cpu_divider);
        self.notify_clients(self.cpu_frequency.get());
    }

    /// Run the CPU from PLL0: `cpu_hz = src · 2 · multiplier / (divider ·
    /// cpu_divider)`. The PLL is programmed and enabled, the new frequency
    /// published, and the PLL connected once it reports lock. Out-of-range
    /// parameters (multiplier 6..=512, divider 1..=32, cpu_divider 1..=256)
    /// are a no-op.
    pub fn connect_system_pll(&self, multiplier: u32, divider: u32, cpu_divider: u32) {
        if !(6..=512).contains(&multiplier) {
            return;
        }
        if !(1..=32).contains(&divider) {
            return;
        }
        if !(1..=256).contains(&cpu_divider) {
            return;
        }

        if self.is_system_pll_connected() {
            self.disconnect_pll();
        }

        self.registers.pll0cfg.write(
            PllConfig::MSEL.val(multiplier - 1) + PllConfig::NSEL.val(divider - 1),
        );
        self.feed_system_pll();

        self.registers.pll0con.write(PllControl::PLLE::SET);
        self.feed_system_pll();

        self.registers.cclkcfg.set(cpu_divider - 1);

        // Multiply last: 2 * src * mul can overflow 32 bits for legal
        // settings, 2 * src / (div * cpu_div) cannot.
        let pll_frequency = (2 * self.source_frequency()) / (divider * cpu_divider);
        self.cpu_frequency.set(pll_frequency * multiplier);
        self.notify_clients(self.cpu_frequency.get());

        while !self.registers.pll0stat.is_set(PllStatus::PLOCK0) {}

        self.registers
            .pll0con
            .write(PllControl::PLLE::SET + PllControl::PLLC::SET);
        self.feed_system_pll();
    }

    /// Program the two-bit clock divider for one peripheral.
    pub fn set_peripheral_clock(&self, peripheral: PeripheralClock, divisor: PclkDivisor) {
        let index = (peripheral as u32) << 1;
        if index >= 32 {
            let shift = index - 32;
            self.registers
                .pclksel1
                .set((self.registers.pclksel1.get() & !(0x3 << shift)) | ((divisor as u32) << shift));
        } else {
            self.registers
                .pclksel0
                .set((self.registers.pclksel0.get() & !(0x3 << index)) | ((divisor as u32) << index));
        }
    }

    /// The frequency currently delivered to one peripheral.
    pub fn peripheral_clock_frequency(&self, peripheral: PeripheralClock) -> u32 {
        let index = (peripheral as u32) << 1;
        let selector = if index >= 32 {
            (self.registers.pclksel1.get() >> (index - 32)) & 0x3
        } else {
            (self.registers.pclksel0.get() >> index) & 0x3
        };

        let cpu_frequency = self.cpu_frequency.get();
        match selector {
            s if s == PclkDivisor::DivideBy1 as u32 => cpu_frequency,
            s if s == PclkDivisor::DivideBy2 as u32 => cpu_frequency / 2,
            s if s == PclkDivisor::DivideBy4 as u32 => cpu_frequency / 4,
            _ => match peripheral {
                PeripheralClock::Can1 | PeripheralClock::Can2 | PeripheralClock::CanFilter => {
                    cpu_frequency / 6
                }
                _ => cpu_frequency / 8,
            },
        }
    }

    /// Power one peripheral on.
    pub fn enable_peripheral(&self, peripheral: PeripheralPower) {
        self.registers
            .pconp
            .set(self.registers.pconp.get() | (1 << (peripheral as u32)));
    }

    /// Power one peripheral off.
    pub fn disable_peripheral(&self, peripheral: PeripheralPower) {
        self.registers
            .pconp
            .set(self.registers.pconp.get() & !(1 << (peripheral as u32)));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utilities::testing::poke;
    use core::mem::MaybeUninit;
    use std::boxed::Box;
    use std::vec::Vec;

    pub(crate) fn fake_syscon() -> StaticRef<SysconRegisters> {
        let regs: &'static mut SysconRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        unsafe { StaticRef::new(regs as *const SysconRegisters) }
    }

    /// A PowerManager over a zeroed register image with the ready/lock
    /// status flags preset so the busy-waits fall through.
    pub(crate) fn fake_pm<'a>() -> (PowerManager<'a>, StaticRef<SysconRegisters>) {
        let regs = fake_syscon();
        poke(&regs.pll0stat, 1 << 26);
        regs.scs.set(1 << 6);
        (PowerManager::new(regs), regs)
    }

    struct CountingClient {
        id: u32,
        log: &'static std::cell::RefCell<Vec<(u32, u32)>>,
    }

    impl ClockClient for CountingClient {
        fn clock_changed(&self, cpu_frequency: u32) {
            self.log.borrow_mut().push((self.id, cpu_frequency));
        }
    }

    #[test]
    fn pll_up_to_120_mhz() {
        let (pm, regs) = fake_pm();

        pm.enable_main_oscillator(12_000_000);
        assert!(regs.scs.is_set(SystemControlAndStatus::OSCEN));
        assert!(!regs.scs.is_set(SystemControlAndStatus::OSCRANGE));

        pm.use_system_clock(ClockSource::MainOscillator, 1);
        assert_eq!(regs.clksrcsel.get(), 1);
        assert_eq!(pm.cpu_frequency(), 12_000_000);

        pm.connect_system_pll(20, 1, 4);
        assert_eq!(pm.cpu_frequency(), 120_000_000);
        assert_eq!(regs.cclkcfg.get(), 3);
        assert_eq!(
            regs.pll0cfg.read(PllConfig::MSEL),
            19,
        );
        assert_eq!(regs.pll0cfg.read(PllConfig::NSEL), 0);
        // Connected after lock.
        assert!(regs.pll0con.is_set(PllControl::PLLC));
        // 120 MHz needs the maximum flash access time.
        assert_eq!(regs.flashcfg.read(FlashConfig::FLASHTIM), 5);
    }

    #[test]
    fn high_speed_oscillator_selects_range_bit() {
        let (pm, regs) = fake_pm();
        pm.enable_main_oscillator(16_000_000);
        assert!(regs.scs.is_set(SystemControlAndStatus::OSCRANGE));
    }

    #[test]
    fn use_system_clock_rejects_bad_parameters() {
        let (pm, regs) = fake_pm();

        // Main oscillator disabled: selecting it must not touch hardware.
        pm.use_system_clock(ClockSource::MainOscillator, 1);
        assert_eq!(regs.clksrcsel.get(), 0);
        assert_eq!(pm.cpu_frequency(), 4_000_000);

        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 0);
        assert_eq!(regs.clksrcsel.get(), 0);
        pm.use_system_clock(ClockSource::MainOscillator, 257);
        assert_eq!(regs.clksrcsel.get(), 0);
    }

    #[test]
    fn use_system_clock_disconnects_pll_first(){
        let (pm, regs) = fake_pm();
        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 1);
        pm.connect_system_pll(20, 1, 4);
        assert!(pm.is_system_pll_connected());

        pm.use_system_clock(ClockSource::MainOscillator, 2);
        assert!(!pm.is_system_pll_connected());
        assert_eq!(regs.pll0con.get(), 0);
        assert_eq!(pm.cpu_frequency(), 6_000_000);
    }

    #[test]
    fn disable_main_oscillator_falls_back_to_irc() {
        let (pm, regs) = fake_pm();
        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 1);

        pm.disable_main_oscillator();
        assert_eq!(regs.clksrcsel.get(), 0);
        assert_eq!(pm.cpu_frequency(), 4_000_000);
        assert!(!regs.scs.is_set(SystemControlAndStatus::OSCEN));
    }

    #[test]
    fn clients_run_in_registration_order_after_flash_setup() {
        let (pm, regs) = fake_pm();
        let log = Box::leak(Box::new(std::cell::RefCell::new(Vec::new())));
        let a = Box::leak(Box::new(CountingClient { id: 0, log }));
        let b = Box::leak(Box::new(CountingClient { id: 1, log }));

        assert!(pm.attach_client(a).is_ok());
        assert!(pm.attach_client(b).is_ok());

        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 2);

        assert_eq!(log.borrow().as_slice(), &[(0, 6_000_000), (1, 6_000_000)]);
        // Flash config was reprogrammed for the new frequency: 6 MHz needs
        // zero extra wait states.
        assert_eq!(regs.flashcfg.read(FlashConfig::FLASHTIM), 0);
    }

    #[test]
    fn client_capacity_is_reported() {
        let (pm, _) = fake_pm();
        let log = Box::leak(Box::new(std::cell::RefCell::new(Vec::new())));
        for i in 0..4 {
            let c = Box::leak(Box::new(CountingClient { id: i, log }));
            assert!(pm.attach_client(c).is_ok());
        }
        let extra = Box::leak(Box::new(CountingClient { id: 9, log }));
        assert_eq!(pm.attach_client(extra), Err(ErrorCode::NOMEM));
    }

    #[test]
    fn peripheral_clock_selection_and_frequency() {
        let (pm, regs) = fake_pm();
        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 1);

        pm.set_peripheral_clock(PeripheralClock::Uart0, PclkDivisor::DivideBy1);
        assert_eq!((regs.pclksel0.get() >> 6) & 0x3, 1);
        assert_eq!(
            pm.peripheral_clock_frequency(PeripheralClock::Uart0),
            12_000_000
        );

        // Uart3 is selector 25, living in PCLKSEL1.
        pm.set_peripheral_clock(PeripheralClock::Uart3, PclkDivisor::DivideBy2);
        assert_eq!((regs.pclksel1.get() >> 18) & 0x3, 2);
        assert_eq!(
            pm.peripheral_clock_frequency(PeripheralClock::Uart3),
            6_000_000
        );

        // The power-on default selector is divide-by-4.
        assert_eq!(
            pm.peripheral_clock_frequency(PeripheralClock::I2c0),
            3_000_000
        );

        // CAN divide-by-8 encoding means divide-by-6.
        pm.set_peripheral_clock(PeripheralClock::Can1, PclkDivisor::DivideBy8);
        assert_eq!(
            pm.peripheral_clock_frequency(PeripheralClock::Can1),
            2_000_000
        );
    }

    #[test]
    fn power_gates() {
        let (pm, regs) = fake_pm();
        pm.enable_peripheral(PeripheralPower::Uart0);
        pm.enable_peripheral(PeripheralPower::Dma);
        assert_eq!(regs.pconp.get(), (1 << 3) | (1 << 29));
        pm.disable_peripheral(PeripheralPower::Uart0);
        assert_eq!(regs.pconp.get(), 1 << 29);
    }
}
