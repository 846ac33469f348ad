// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Chip-level wiring: every peripheral instance with its register base,
//! interrupt line, clock selector, power gate, and DMA request lines, plus
//! the interrupt-number dispatch the vector table forwards to.

use crate::cortexm3::interrupt::InterruptControl;
use crate::cortexm3::nvic::Nvic;
use crate::cortexm3::systick;
use crate::dma::{Dma, DmaPeripheral, DMA_BASE};
use crate::gpio::{Eint, Function, Gpio, PinId, PinInterrupt, GPIOINT_BASE, GPIO_BASE, PINCON_BASE};
use crate::i2c::{I2c, I2C0_BASE, I2C1_BASE, I2C2_BASE};
use crate::peripheral_interrupts as irq;
use crate::pm::{PeripheralClock, PeripheralPower, PowerManager, SYSCON_BASE};
use crate::spi::{LegacySpi, Ssp, SPI0_BASE, SSP0_BASE, SSP1_BASE};
use crate::time::Time;
use crate::uart::{Uart, UART0_BASE, UART1_BASE, UART2_BASE, UART3_BASE};

/// Every on-chip peripheral this crate drives, wired to its hardware
/// resources.
///
/// ```no_run
/// use lpc176x::chip::Lpc176xDefaultPeripherals;
/// use lpc176x::pm::{ClockSource, PclkDivisor};
/// use lpc176x::uart;
///
/// let peripherals = unsafe { Lpc176xDefaultPeripherals::new() };
/// peripherals.pm.enable_main_oscillator(12_000_000);
/// peripherals.pm.use_system_clock(ClockSource::MainOscillator, 1);
/// peripherals.pm.connect_system_pll(20, 1, 4);
/// peripherals.time.start(&peripherals.pm).unwrap();
///
/// peripherals.uart0.initialize(
///     &peripherals.pm,
///     &peripherals.gpio,
///     PclkDivisor::DivideBy4,
///     115_200,
///     uart::Parameters::EIGHT_N_ONE,
///     uart::PinSelection::P0_2AndP0_3,
/// );
/// ```
///
/// The interrupt vector table forwards NVIC interrupts to
/// [`Lpc176xDefaultPeripherals::handle_interrupt`] with the interrupt
/// number, and the SysTick exception to the [`Time`] driver:
///
/// ```no_run
/// # let peripherals = unsafe { lpc176x::chip::Lpc176xDefaultPeripherals::new() };
/// # let interrupt_number = 5;
/// peripherals.handle_interrupt(interrupt_number); // from the ISR
/// peripherals.time.handle_interrupt(); // from SysTick_Handler
/// ```
pub struct Lpc176xDefaultPeripherals<'a> {
    pub pm: PowerManager<'a>,
    pub interrupt_control: InterruptControl,
    pub gpio: Gpio,
    pub eint: Eint,
    pub pin_interrupt: PinInterrupt,
    pub time: Time,
    pub dma: Dma,
    pub uart0: Uart<'a>,
    pub uart1: Uart<'a>,
    pub uart2: Uart<'a>,
    pub uart3: Uart<'a>,
    pub i2c0: I2c<'a>,
    pub i2c1: I2c<'a>,
    pub i2c2: I2c<'a>,
    pub spi: LegacySpi<'a>,
    pub ssp0: Ssp<'a>,
    pub ssp1: Ssp<'a>,
}

impl<'a> Lpc176xDefaultPeripherals<'a> {
    /// Construct the full peripheral set over the real register map.
    ///
    /// Unsafe because the caller asserts this is done once, on the chip,
    /// before interrupts are enabled.
    pub const unsafe fn new() -> Lpc176xDefaultPeripherals<'a> {
        Lpc176xDefaultPeripherals {
            pm: PowerManager::new(SYSCON_BASE),
            interrupt_control: InterruptControl::new(),
            gpio: Gpio::new(PINCON_BASE, GPIO_BASE),
            eint: Eint::new(
                SYSCON_BASE,
                [
                    Nvic::new(irq::EINT0),
                    Nvic::new(irq::EINT1),
                    Nvic::new(irq::EINT2),
                    Nvic::new(irq::EINT3),
                ],
            ),
            pin_interrupt: PinInterrupt::new(GPIOINT_BASE, Nvic::new(irq::EINT3)),
            time: Time::new(systick::BASE),
            dma: Dma::new(DMA_BASE, SYSCON_BASE, Nvic::new(irq::GPDMA)),
            uart0: Uart::new(
                UART0_BASE,
                Nvic::new(irq::UART0),
                PeripheralClock::Uart0,
                PeripheralPower::Uart0,
                DmaPeripheral::Uart0Tx,
                DmaPeripheral::Uart0Rx,
            ),
            uart1: Uart::new(
                UART1_BASE,
                Nvic::new(irq::UART1),
                PeripheralClock::Uart1,
                PeripheralPower::Uart1,
                DmaPeripheral::Uart1Tx,
                DmaPeripheral::Uart1Rx,
            ),
            uart2: Uart::new(
                UART2_BASE,
                Nvic::new(irq::UART2),
                PeripheralClock::Uart2,
                PeripheralPower::Uart2,
                DmaPeripheral::Uart2Tx,
                DmaPeripheral::Uart2Rx,
            ),
            uart3: Uart::new(
                UART3_BASE,
                Nvic::new(irq::UART3),
                PeripheralClock::Uart3,
                PeripheralPower::Uart3,
                DmaPeripheral::Uart3Tx,
                DmaPeripheral::Uart3Rx,
            ),
            i2c0: I2c::new(
                I2C0_BASE,
                Nvic::new(irq::I2C0),
                PeripheralClock::I2c0,
                PeripheralPower::I2c0,
                true,
            ),
            i2c1: I2c::new(
                I2C1_BASE,
                Nvic::new(irq::I2C1),
                PeripheralClock::I2c1,
                PeripheralPower::I2c1,
                false,
            ),
            i2c2: I2c::new(
                I2C2_BASE,
                Nvic::new(irq::I2C2),
                PeripheralClock::I2c2,
                PeripheralPower::I2c2,
                false,
            ),
            spi: LegacySpi::new(
                SPI0_BASE,
                Nvic::new(irq::SPI),
                [PinId::new(0, 15), PinId::new(0, 17), PinId::new(0, 18)],
                Function::Alternate3,
            ),
            ssp0: Ssp::new(
                SSP0_BASE,
                Nvic::new(irq::SSP0),
                PeripheralClock::Ssp0,
                PeripheralPower::Ssp0,
                [PinId::new(0, 15), PinId::new(0, 17), PinId::new(0, 18)],
                Function::Alternate2,
            ),
            ssp1: Ssp::new(
                SSP1_BASE,
                Nvic::new(irq::SSP1),
                PeripheralClock::Ssp1,
                PeripheralPower::Ssp1,
                [PinId::new(0, 7), PinId::new(0, 8), PinId::new(0, 9)],
                Function::Alternate2,
            ),
        }
    }

    /// Dispatch one NVIC interrupt to its driver. EINT0..EINT3 have no
    /// in-crate consumer; the application observes and acknowledges those
    /// flags through [`Eint`] and [`PinInterrupt`].
    pub fn handle_interrupt(&self, interrupt: u32) {
        match interrupt {
            irq::UART0 => self.uart0.handle_interrupt(),
            irq::UART1 => self.uart1.handle_interrupt(),
            irq::UART2 => self.uart2.handle_interrupt(),
            irq::UART3 => self.uart3.handle_interrupt(),
            irq::I2C0 => self.i2c0.handle_interrupt(),
            irq::I2C1 => self.i2c1.handle_interrupt(),
            irq::I2C2 => self.i2c2.handle_interrupt(),
            irq::SPI => self.spi.handle_interrupt(),
            irq::SSP0 => self.ssp0.handle_interrupt(),
            irq::SSP1 => self.ssp1.handle_interrupt(),
            irq::GPDMA => self.dma.handle_interrupt(),
            _ => {}
        }
    }
}
