// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! UART driver with interrupt- or DMA-driven byte movement.
//!
//! Four identical instances. Reception always lands in a caller-supplied
//! ring of byte cells: either the receive interrupt pushes each byte and
//! advances the write index, or a DMA channel in circular (auto-re-enable)
//! mode fills the ring and the write index is derived from the channel's
//! transfers-left counter. The ring is single-producer/single-consumer: the
//! write index belongs to the interrupt handler (or the DMA counter), the
//! read index to [`Uart::get_char`], and `bytes_available` may read both
//! without synchronisation because aligned word accesses are atomic on this
//! core.
//!
//! Transmission writes the first byte inline and drains the rest from the
//! transmit-holding-register-empty interrupt, or hands the whole buffer to a
//! DMA channel in one shot. [`Uart::is_transmitting`] stays true until the
//! line status reports the holding register empty, so a caller that polls it
//! before reusing the buffer cannot clobber bytes still being shifted out.
//!
//! In DMA receive mode the armed transfer count always equals the ring
//! capacity; the write index `capacity - transfers_left` is exact for any
//! whole number of wraps.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

use crate::cortexm3::nvic::Nvic;
use crate::dma::{self, BurstSize, DmaChannel, DmaPeripheral, TransferType, TransferWidth};
use crate::gpio::{Function, Gpio, PinId};
use crate::hil::gpio::PullMode;
use crate::pm::{PclkDivisor, PeripheralClock, PeripheralPower, PowerManager};
use crate::utilities::cells::{OptionalCell, TakeCell};
use crate::utilities::StaticRef;

register_structs! {
    /// UART registers (UM10360 chapter 14). The first three words each fold
    /// several registers onto one address: receive/transmit data share
    /// offset 0 with the low divisor latch, the interrupt-enable register
    /// shares offset 4 with the high divisor latch, and the interrupt
    /// identification (read) shares offset 8 with the FIFO control (write).
    pub UartRegisters {
        /// RBR (read) / THR (write) / DLL (when LCR.DLAB is set)
        (0x000 => pub rbr_thr_dll: ReadWrite<u32>),
        /// IER / DLM (when LCR.DLAB is set)
        (0x004 => pub ier_dlm: ReadWrite<u32>),
        /// IIR (read) / FCR (write)
        (0x008 => pub iir_fcr: ReadWrite<u32>),
        /// Line control
        (0x00c => pub lcr: ReadWrite<u32, LineControl::Register>),
        /// Modem control (UART1 only)
        (0x010 => pub mcr: ReadWrite<u32>),
        /// Line status
        (0x014 => pub lsr: ReadOnly<u32, LineStatus::Register>),
        /// Modem status (UART1 only)
        (0x018 => pub msr: ReadOnly<u32>),
        /// Scratch pad
        (0x01c => pub scr: ReadWrite<u32>),
        /// Auto-baud control
        (0x020 => pub acr: ReadWrite<u32>),
        /// IrDA control (UART3 only)
        (0x024 => pub icr: ReadWrite<u32>),
        /// Fractional divider
        (0x028 => pub fdr: ReadWrite<u32, FractionalDivider::Register>),
        (0x02c => _reserved0),
        /// Transmit enable
        (0x030 => pub ter: ReadWrite<u32>),
        (0x034 => @END),
    }
}

register_bitfields![u32,
    pub LineControl [
        /// Divisor latch access bit
        DLAB            OFFSET(7)   NUMBITS(1),
        /// Break transmission enable
        BREAK           OFFSET(6)   NUMBITS(1),
        /// Parity enable and select
        PARITY          OFFSET(3)   NUMBITS(3),
        /// Stop bit select
        STOP            OFFSET(2)   NUMBITS(1),
        /// Word length select
        WORD_LENGTH     OFFSET(0)   NUMBITS(2)
    ],

    pub LineStatus [
        /// Error in the receive FIFO
        RXFE            OFFSET(7)   NUMBITS(1),
        /// Transmitter empty (THR and shift register)
        TEMT            OFFSET(6)   NUMBITS(1),
        /// Transmit holding register empty
        THRE            OFFSET(5)   NUMBITS(1),
        /// Break interrupt
        BI              OFFSET(4)   NUMBITS(1),
        /// Framing error
        FE              OFFSET(3)   NUMBITS(1),
        /// Parity error
        PE              OFFSET(2)   NUMBITS(1),
        /// Overrun error
        OE              OFFSET(1)   NUMBITS(1),
        /// Receiver data ready
        RDR             OFFSET(0)   NUMBITS(1)
    ],

    pub FractionalDivider [
        MULVAL          OFFSET(4)   NUMBITS(4),
        DIVADDVAL       OFFSET(0)   NUMBITS(4)
    ]
];

/// The four UART register blocks in MMIO space.
pub const UART0_BASE: StaticRef<UartRegisters> =
    unsafe { StaticRef::new(0x4000_c000 as *const UartRegisters) };
pub const UART1_BASE: StaticRef<UartRegisters> =
    unsafe { StaticRef::new(0x4001_0000 as *const UartRegisters) };
pub const UART2_BASE: StaticRef<UartRegisters> =
    unsafe { StaticRef::new(0x4009_8000 as *const UartRegisters) };
pub const UART3_BASE: StaticRef<UartRegisters> =
    unsafe { StaticRef::new(0x4009_c000 as *const UartRegisters) };

// IER bits.
const IER_RECEIVE_DATA: u32 = 1 << 0;
const IER_THRE: u32 = 1 << 1;

// IIR fields.
const IIR_NONE_PENDING: u32 = 1 << 0;
const IIR_ID_LINE_STATUS: u32 = 0b011;
const IIR_ID_RECEIVE_DATA: u32 = 0b010;
const IIR_ID_CHARACTER_TIMEOUT: u32 = 0b110;
const IIR_ID_THRE: u32 = 0b001;

// FCR value used at initialisation: FIFOs enabled and reset, DMA mode, 8
// character receive trigger.
const FCR_SETUP: u32 = (1 << 0) | (1 << 1) | (1 << 2) | (1 << 3) | (0x2 << 6);

/// Word length of one character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharacterLength {
    Five = 0,
    Six = 1,
    Seven = 2,
    Eight = 3,
}

/// Number of stop bits. One-and-a-half applies to 5-bit characters and
/// shares an encoding with two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBits {
    One,
    OneAndAHalf,
    Two,
}

impl StopBits {
    fn encoding(self) -> u32 {
        match self {
            StopBits::One => 0,
            StopBits::OneAndAHalf | StopBits::Two => 1,
        }
    }
}

/// Parity mode; the encoding is the LCR parity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 3,
    High = 5,
    Low = 7,
}

/// Frame format of one UART instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parameters {
    pub character_length: CharacterLength,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub break_control: bool,
}

impl Parameters {
    /// 8 data bits, no parity, 1 stop bit.
    pub const EIGHT_N_ONE: Parameters = Parameters {
        character_length: CharacterLength::Eight,
        stop_bits: StopBits::One,
        parity: Parity::None,
        break_control: false,
    };
}

/// TXD/RXD pin pairs the UARTs can be routed to. RXD is always the pin
/// after TXD. Each instance accepts only its published pairs: UART0 the
/// first, UART1 the next two, UART2 the following two, UART3 the last
/// three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinSelection {
    P0_2AndP0_3,
    P0_15AndP0_16,
    P2_0AndP2_1,
    P0_10AndP0_11,
    P2_8AndP2_9,
    P0_0AndP0_1,
    P0_25AndP0_26,
    P4_28AndP4_29,
}

impl PinSelection {
    fn txd(self) -> (PinId, Function) {
        match self {
            PinSelection::P0_2AndP0_3 => (PinId::new(0, 2), Function::Alternate1),
            PinSelection::P0_15AndP0_16 => (PinId::new(0, 15), Function::Alternate1),
            PinSelection::P2_0AndP2_1 => (PinId::new(2, 0), Function::Alternate2),
            PinSelection::P0_10AndP0_11 => (PinId::new(0, 10), Function::Alternate1),
            PinSelection::P2_8AndP2_9 => (PinId::new(2, 8), Function::Alternate2),
            PinSelection::P0_0AndP0_1 => (PinId::new(0, 0), Function::Alternate2),
            PinSelection::P0_25AndP0_26 => (PinId::new(0, 25), Function::Alternate3),
            PinSelection::P4_28AndP4_29 => (PinId::new(4, 28), Function::Alternate3),
        }
    }
}

/// Search the fractional baud divider space: for `target = 16 · baud`, pick
/// the MULVAL whose rounded integer quotient scales back closest to the
/// peripheral clock, then the DIVADDVAL whose divisor latch reproduces that
/// quotient best. Returns `(mulval, divaddval, divisor_latch)`; a zero
/// DIVADDVAL falls back to the plain integer divisor with MULVAL = 1.
fn fractional_divisors(peripheral_frequency: u32, baud_rate: u32) -> (u32, u32, u32) {
    let target = 16 * baud_rate;

    let mut min_error = u32::MAX;
    let mut best_multiplier = 1;
    for multiplier in 1..16 {
        let multiplied = peripheral_frequency * multiplier;
        let q = (multiplied + target / 2) / target;
        let error = (q * target).abs_diff(multiplied);
        if error < min_error {
            min_error = error;
            best_multiplier = multiplier;
            if error == 0 {
                break;
            }
        }
    }
    let multiplied = peripheral_frequency * best_multiplier;
    let q = (multiplied + target / 2) / target;

    let mut min_error = u32::MAX;
    let mut best_divider = 0;
    for divider in 0..best_multiplier {
        let sum = best_multiplier + divider;
        let dl = (q + sum / 2) / sum;
        let error = (sum * dl).abs_diff(q);
        if error < min_error {
            min_error = error;
            best_divider = divider;
            if error == 0 {
                break;
            }
        }
    }

    if best_divider == 0 {
        (1, 0, (peripheral_frequency + target / 2) / target)
    } else {
        let sum = best_multiplier + best_divider;
        (best_multiplier, best_divider, (q + sum / 2) / sum)
    }
}

/// One UART instance.
pub struct Uart<'a> {
    registers: StaticRef<UartRegisters>,
    nvic: Nvic,
    pclk: PeripheralClock,
    power: PeripheralPower,
    tx_request: DmaPeripheral,
    rx_request: DmaPeripheral,

    rx_buffer: Cell<Option<&'a [Cell<u8>]>>,
    rx_read_index: AtomicUsize,
    rx_write_index: AtomicUsize,
    rx_dma: OptionalCell<&'a DmaChannel>,

    tx_buffer: TakeCell<'a, [u8]>,
    tx_position: Cell<usize>,
    tx_length: Cell<usize>,
    tx_busy: Cell<bool>,
    tx_dma: OptionalCell<&'a DmaChannel>,
}

impl<'a> Uart<'a> {
    pub const fn new(
        registers: StaticRef<UartRegisters>,
        nvic: Nvic,
        pclk: PeripheralClock,
        power: PeripheralPower,
        tx_request: DmaPeripheral,
        rx_request: DmaPeripheral,
    ) -> Uart<'a> {
        Uart {
            registers,
            nvic,
            pclk,
            power,
            tx_request,
            rx_request,
            rx_buffer: Cell::new(None),
            rx_read_index: AtomicUsize::new(0),
            rx_write_index: AtomicUsize::new(0),
            rx_dma: OptionalCell::empty(),
            tx_buffer: TakeCell::empty(),
            tx_position: Cell::new(0),
            tx_length: Cell::new(0),
            tx_busy: Cell::new(false),
            tx_dma: OptionalCell::empty(),
        }
    }

    /// Power the instance, route its pins, program the frame format and
    /// baud divisors, and enable its interrupt line. Individual interrupt
    /// sources stay disabled until a receive or transmit is armed.
    pub fn initialize(
        &self,
        pm: &PowerManager,
        gpio: &Gpio,
        clock: PclkDivisor,
        baud_rate: u32,
        parameters: Parameters,
        pins: PinSelection,
    ) {
        pm.enable_peripheral(self.power);
        pm.set_peripheral_clock(self.pclk, clock);
        let peripheral_frequency = pm.peripheral_clock_frequency(self.pclk);

        let (txd, function) = pins.txd();
        let rxd = PinId(txd.0 + 1);
        for pin in [txd, rxd] {
            gpio.set_function(pin, function);
            gpio.set_pull_mode(pin, PullMode::PullNone);
            gpio.set_open_drain(pin, false);
        }

        self.set_baud_rate(peripheral_frequency, baud_rate);

        self.registers.lcr.write(
            LineControl::WORD_LENGTH.val(parameters.character_length as u32)
                + LineControl::STOP.val(parameters.stop_bits.encoding())
                + LineControl::PARITY.val(parameters.parity as u32)
                + LineControl::BREAK.val(parameters.break_control as u32),
        );
        self.registers.iir_fcr.set(FCR_SETUP);
        self.registers.ier_dlm.set(0);

        self.nvic.enable();
    }

    fn set_baud_rate(&self, peripheral_frequency: u32, baud_rate: u32) {
        let (mulval, divaddval, dl) = fractional_divisors(peripheral_frequency, baud_rate);

        self.registers.lcr.modify(LineControl::DLAB::SET);
        self.registers.fdr.write(
            FractionalDivider::MULVAL.val(mulval) + FractionalDivider::DIVADDVAL.val(divaddval),
        );
        self.registers.rbr_thr_dll.set(dl & 0xff);
        self.registers.ier_dlm.set((dl >> 8) & 0xff);
        self.registers.lcr.modify(LineControl::DLAB::CLEAR);
    }

    /// Arm interrupt-driven reception into `buffer`, which becomes the ring
    /// until re-armed. Resets both ring indices.
    pub fn receive(&self, buffer: &'a [Cell<u8>]) {
        self.rx_buffer.set(Some(buffer));
        self.rx_read_index.store(0, Ordering::Relaxed);
        self.rx_write_index.store(0, Ordering::Relaxed);

        self.rx_dma.clear();
        self.registers
            .ier_dlm
            .set(self.registers.ier_dlm.get() | IER_RECEIVE_DATA);
    }

    /// Arm DMA-driven reception: `channel` runs peripheral-to-memory with
    /// destination increment and auto-re-enable, circulating over `buffer`.
    /// The receive interrupt is disabled; the write index is derived from
    /// the channel.
    pub fn receive_dma(&self, channel: &'a DmaChannel, buffer: &'a [Cell<u8>]) {
        self.rx_buffer.set(Some(buffer));
        self.rx_read_index.store(0, Ordering::Relaxed);
        self.rx_write_index.store(0, Ordering::Relaxed);
        self.rx_dma.set(channel);

        self.registers
            .ier_dlm
            .set(self.registers.ier_dlm.get() & !IER_RECEIVE_DATA);

        channel.configure(
            TransferType::PeripheralToMemory,
            Some(self.rx_request),
            None,
            BurstSize::Transfer1,
            BurstSize::Transfer1,
            TransferWidth::Byte,
            TransferWidth::Byte,
            false,
            true,
        );
        channel.transfer(
            dma::dma_address(&self.registers.rbr_thr_dll),
            buffer.as_ptr() as usize as u32,
            buffer.len() as u32,
            true,
        );
    }

    /// Bytes waiting in the receive ring.
    pub fn bytes_available(&self) -> usize {
        let Some(buffer) = self.rx_buffer.get() else {
            return 0;
        };
        let size = buffer.len();
        if size == 0 {
            return 0;
        }

        let write = match self.rx_dma.get() {
            Some(dma) => size.saturating_sub(dma.transfers_left() as usize),
            None => self.rx_write_index.load(Ordering::Relaxed),
        };
        let read = self.rx_read_index.load(Ordering::Relaxed);
        (size + write - read) % size
    }

    /// Pop one byte from the receive ring, or 0 if it is empty.
    pub fn get_char(&self) -> u8 {
        if self.bytes_available() == 0 {
            return 0;
        }

        // bytes_available() returning nonzero implies the ring is armed.
        let buffer = match self.rx_buffer.get() {
            Some(buffer) => buffer,
            None => return 0,
        };
        let read = self.rx_read_index.load(Ordering::Relaxed);
        let data = buffer[read].get();
        self.rx_read_index
            .store((read + 1) % buffer.len(), Ordering::Relaxed);
        data
    }

    /// Start an interrupt-driven transmission of the first `length` bytes
    /// of `buffer`. The first byte goes straight into the holding register;
    /// the rest drain from the interrupt handler. Returns false while a
    /// previous transmission is still in flight, true immediately for a
    /// zero-length transfer.
    pub fn transmit(&self, buffer: &'a mut [u8], length: usize) -> bool {
        if self.is_transmitting() {
            return false;
        }
        let length = core::cmp::min(length, buffer.len());
        if length == 0 {
            return true;
        }

        self.tx_dma.clear();
        self.registers
            .ier_dlm
            .set(self.registers.ier_dlm.get() | IER_THRE);

        self.registers.rbr_thr_dll.set(buffer[0] as u32);
        self.tx_position.set(1);
        self.tx_length.set(length);
        self.tx_buffer.replace(buffer);

        self.tx_busy.set(true);
        true
    }

    /// Start a DMA-driven transmission: `channel` runs memory-to-peripheral
    /// with source increment, one shot. Busy state is derived from the
    /// channel's transfers-left counter.
    pub fn transmit_dma(&self, channel: &'a DmaChannel, buffer: &'a mut [u8], length: usize) -> bool {
        if self.is_transmitting() {
            return false;
        }
        let length = core::cmp::min(length, buffer.len());
        if length == 0 {
            return true;
        }

        self.registers
            .ier_dlm
            .set(self.registers.ier_dlm.get() & !IER_THRE);
        self.tx_dma.set(channel);

        channel.configure(
            TransferType::MemoryToPeripheral,
            None,
            Some(self.tx_request),
            BurstSize::Transfer1,
            BurstSize::Transfer1,
            TransferWidth::Byte,
            TransferWidth::Byte,
            true,
            false,
        );
        channel.transfer(
            buffer.as_ptr() as usize as u32,
            dma::dma_address(&self.registers.rbr_thr_dll),
            length as u32,
            false,
        );
        self.tx_buffer.replace(buffer);
        true
    }

    /// Whether a transmission is still in flight, including the last byte
    /// draining out of the shift register. A caller that waits for false
    /// may reuse the transmit buffer.
    pub fn is_transmitting(&self) -> bool {
        self.tx_dma.map(|dma| {
            self.tx_busy.set(dma.transfers_left() != 0);
        });
        self.tx_busy.get() || !self.registers.lsr.is_set(LineStatus::THRE)
    }

    /// Reclaim the buffer of the most recent transmission. Only meaningful
    /// once `is_transmitting()` reports false.
    pub fn take_transmit_buffer(&self) -> Option<&'a mut [u8]> {
        self.tx_buffer.take()
    }

    fn receive_available(&self) {
        let data = self.registers.rbr_thr_dll.get() as u8;
        if let Some(buffer) = self.rx_buffer.get() {
            if !buffer.is_empty() {
                let write = self.rx_write_index.load(Ordering::Relaxed);
                buffer[write].set(data);
                self.rx_write_index
                    .store((write + 1) % buffer.len(), Ordering::Relaxed);
            }
        }
    }

    fn transmit_continue(&self) {
        let position = self.tx_position.get();
        if position < self.tx_length.get() {
            self.tx_buffer.map(|buffer| {
                self.registers.rbr_thr_dll.set(buffer[position] as u32);
            });
            self.tx_position.set(position + 1);
        } else {
            self.tx_busy.set(false);
        }
    }

    /// The instance interrupt entry point. The identification register is
    /// re-read until it reports nothing pending; each iteration services
    /// one cause: line status (read LSR to clear, byte not queued), receive
    /// data or character timeout (push into the ring), or transmit holding
    /// register empty (drain the next byte or finish).
    pub fn handle_interrupt(&self) {
        loop {
            let status = self.registers.iir_fcr.get();
            if status & IIR_NONE_PENDING != 0 {
                break;
            }
            match (status >> 1) & 0x7 {
                IIR_ID_LINE_STATUS => {
                    let _ = self.registers.lsr.get();
                }
                IIR_ID_RECEIVE_DATA | IIR_ID_CHARACTER_TIMEOUT => self.receive_available(),
                IIR_ID_THRE => self.transmit_continue(),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cortexm3::nvic::NvicRegisters;
    use crate::dma::tests::fake_dma;
    use crate::gpio::tests::fake_gpio;
    use crate::peripheral_interrupts;
    use crate::pm::tests::fake_pm;
    use crate::pm::ClockSource;
    use crate::utilities::testing::poke;
    use core::mem::MaybeUninit;
    use std::boxed::Box;
    use std::vec::Vec;

    const LSR_THRE: u32 = 1 << 5;

    fn fake_uart<'a>() -> (Uart<'a>, StaticRef<UartRegisters>) {
        let regs: &'static mut UartRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let regs_ref = unsafe { StaticRef::new(regs as *const UartRegisters) };
        let nvic: &'static mut NvicRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let nvic_ref = unsafe { StaticRef::new(nvic as *const NvicRegisters) };
        (
            Uart::new(
                regs_ref,
                Nvic::with_base(nvic_ref, peripheral_interrupts::UART1),
                PeripheralClock::Uart1,
                PeripheralPower::Uart1,
                DmaPeripheral::Uart1Tx,
                DmaPeripheral::Uart1Rx,
            ),
            regs_ref,
        )
    }

    fn ring(size: usize) -> &'static [Cell<u8>] {
        Box::leak((0..size).map(|_| Cell::new(0u8)).collect::<Vec<_>>().into_boxed_slice())
    }

    #[test]
    fn divisor_search_prefers_exact_integer_divisors() {
        assert_eq!(fractional_divisors(12_000_000, 9600), (1, 0, 78));
        // 120 MHz / 115200 also lands on the plain divisor path.
        assert_eq!(fractional_divisors(120_000_000, 115_200), (1, 0, 65));
    }

    #[test]
    fn divisor_search_uses_the_fraction_when_it_wins() {
        // 30 MHz at 115200 baud: MULVAL 11, DIVADDVAL 1, DL 15 reproduce
        // the target quotient with error 1 part in 180.
        assert_eq!(fractional_divisors(30_000_000, 115_200), (11, 1, 15));
    }

    #[test]
    fn initialize_programs_pins_frame_and_divisors() {
        let (uart, regs) = fake_uart();
        let (pm, syscon) = fake_pm();
        let (gpio, pincon, _) = fake_gpio();

        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 1);
        pm.connect_system_pll(20, 1, 4);

        uart.initialize(
            &pm,
            &gpio,
            PclkDivisor::DivideBy1,
            115_200,
            Parameters::EIGHT_N_ONE,
            PinSelection::P0_15AndP0_16,
        );

        // Power and peripheral clock.
        assert_ne!(syscon.pconp.get() & (1 << 4), 0);
        assert_eq!((syscon.pclksel0.get() >> 8) & 0x3, 1);

        // TXD/RXD on P0.15/P0.16 alternate 1, no pull.
        assert_eq!((pincon.pinsel[0].get() >> 30) & 0x3, 1);
        assert_eq!(pincon.pinsel[1].get() & 0x3, 1);
        assert_eq!((pincon.pinmode[0].get() >> 30) & 0x3, 2);

        // 8N1, divisor latch closed, FIFO setup, interrupts quiesced.
        assert_eq!(regs.lcr.get(), 0x03);
        assert_eq!(regs.fdr.get(), 1 << 4);
        assert_eq!(regs.rbr_thr_dll.get(), 65);
        assert_eq!(regs.iir_fcr.get(), FCR_SETUP);
        assert_eq!(regs.ier_dlm.get(), 0);
    }

    #[test]
    fn interrupt_receive_fills_the_ring_in_order() {
        let (uart, regs) = fake_uart();
        let buffer = ring(8);
        uart.receive(buffer);
        assert_eq!(regs.ier_dlm.get() & IER_RECEIVE_DATA, IER_RECEIVE_DATA);

        for byte in [0x41, 0x42, 0x43] {
            regs.rbr_thr_dll.set(byte);
            uart.receive_available();
        }

        assert_eq!(uart.bytes_available(), 3);
        assert_eq!(uart.get_char(), 0x41);
        assert_eq!(uart.get_char(), 0x42);
        assert_eq!(uart.get_char(), 0x43);
        assert_eq!(uart.bytes_available(), 0);
        // Empty ring: get_char yields 0 and does not advance.
        assert_eq!(uart.get_char(), 0);
        assert_eq!(uart.bytes_available(), 0);
    }

    #[test]
    fn ring_wraps_and_never_exceeds_capacity() {
        let (uart, regs) = fake_uart();
        let buffer = ring(4);
        uart.receive(buffer);

        for byte in 0..6u32 {
            regs.rbr_thr_dll.set(b'a' as u32 + byte);
            uart.receive_available();
        }
        // Writer lapped the reader; the modular count stays in range.
        assert_eq!(uart.bytes_available(), 2);
    }

    #[test]
    fn transmit_writes_first_byte_then_drains_from_interrupts() {
        let (uart, regs) = fake_uart();
        poke(&regs.lsr, LSR_THRE);

        let buffer = Box::leak(Box::new([0x41u8, 0x42, 0x43]));
        assert!(uart.transmit(buffer, 3));
        assert_eq!(regs.rbr_thr_dll.get(), 0x41);
        assert_eq!(regs.ier_dlm.get() & IER_THRE, IER_THRE);
        assert!(uart.is_transmitting());

        // A second transmission is refused while the first is in flight.
        let other = Box::leak(Box::new([0u8; 1]));
        assert!(!uart.transmit(other, 1));

        uart.transmit_continue();
        assert_eq!(regs.rbr_thr_dll.get(), 0x42);
        uart.transmit_continue();
        assert_eq!(regs.rbr_thr_dll.get(), 0x43);
        assert!(uart.is_transmitting());

        // All bytes handed to the hardware: the next THRE clears busy, but
        // the line status keeps is_transmitting true until the shift
        // register drains.
        uart.transmit_continue();
        poke(&regs.lsr, 0);
        assert!(uart.is_transmitting());
        poke(&regs.lsr, LSR_THRE);
        assert!(!uart.is_transmitting());

        assert!(uart.take_transmit_buffer().is_some());
    }

    #[test]
    fn zero_length_transmit_succeeds_without_hardware() {
        let (uart, regs) = fake_uart();
        poke(&regs.lsr, LSR_THRE);
        let buffer = Box::leak(Box::new([0u8; 4]));
        assert!(uart.transmit(buffer, 0));
        assert_eq!(regs.rbr_thr_dll.get(), 0);
        assert!(!uart.is_transmitting());
    }

    #[test]
    fn dma_receive_derives_the_write_index_from_transfers_left() {
        let (uart, regs) = fake_uart();
        let (dma, dma_regs, _) = fake_dma();
        let buffer = ring(16);

        uart.receive_dma(&dma.channels[0], buffer);

        // Receive interrupt off; channel armed circularly over the ring.
        assert_eq!(regs.ier_dlm.get() & IER_RECEIVE_DATA, 0);
        let ch = &dma_regs.channel[0];
        assert_eq!(ch.src_addr.get(), dma::dma_address(&regs.rbr_thr_dll));
        assert_eq!(ch.dest_addr.get(), buffer.as_ptr() as usize as u32);
        assert_eq!(ch.control.get() & 0xfff, 16);
        assert_ne!(ch.control.get() & (1 << 31), 0);

        // Hardware delivered six bytes: transfers-left dropped to ten.
        for (i, byte) in [b'h', b'e', b'l', b'l', b'o', b'!'].iter().enumerate() {
            buffer[i].set(*byte);
        }
        ch.control.set((ch.control.get() & !0xfff) | 10);

        assert_eq!(uart.bytes_available(), 6);
        let collected: Vec<u8> = (0..6).map(|_| uart.get_char()).collect();
        assert_eq!(collected, b"hello!");
        assert_eq!(uart.bytes_available(), 0);
        assert_eq!(uart.get_char(), 0);
    }

    #[test]
    fn dma_transmit_derives_busy_from_the_channel() {
        let (uart, regs) = fake_uart();
        let (dma, dma_regs, _) = fake_dma();
        poke(&regs.lsr, LSR_THRE);

        let buffer = Box::leak(Box::new(*b"abc"));
        assert!(uart.transmit_dma(&dma.channels[1], buffer, 3));
        assert_eq!(regs.ier_dlm.get() & IER_THRE, 0);

        let ch = &dma_regs.channel[1];
        assert_eq!(ch.dest_addr.get(), dma::dma_address(&regs.rbr_thr_dll));
        assert_eq!(ch.control.get() & 0xfff, 3);
        // One shot: no auto-re-enable.
        assert_eq!(ch.control.get() & (1 << 31), 0);

        assert!(uart.is_transmitting());
        ch.control.set(ch.control.get() & !0xfff);
        assert!(!uart.is_transmitting());
    }

    #[test]
    fn handle_interrupt_returns_when_nothing_pends() {
        let (uart, regs) = fake_uart();
        regs.iir_fcr.set(IIR_NONE_PENDING);
        uart.handle_interrupt();
    }
}
