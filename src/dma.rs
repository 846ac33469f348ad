// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! General-purpose DMA controller.
//!
//! One controller, eight independent channels. A channel is configured once
//! with the shape of its transfers (direction, request lines, bursts,
//! widths, address increments) and then started per transfer with source,
//! destination, and count. The configured shape is cached in the channel as
//! the control/config word pair; a transfer armed with auto-re-enable keeps
//! the terminal-count interrupt unmasked and the handler rewinds any
//! auto-incremented address register and re-commits the cached words,
//! restarting the channel from its original pointers. That is what turns a
//! linear buffer into the circular receive window the UART driver uses.
//!
//! Error interrupts are masked in the channel configuration; the handler
//! clears a stray error flag and takes no other action.

use core::cell::Cell;

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite};

use crate::cortexm3::nvic::Nvic;
use crate::pm::{PeripheralPower, PowerManager, SysconRegisters};
use crate::utilities::StaticRef;

register_structs! {
    /// Per-channel register set, 0x20 apart from channel 0 at offset 0x100.
    pub DmaChannelRegisters {
        (0x00 => pub src_addr: ReadWrite<u32>),
        (0x04 => pub dest_addr: ReadWrite<u32>),
        (0x08 => pub lli: ReadWrite<u32>),
        (0x0c => pub control: ReadWrite<u32>),
        (0x10 => pub config: ReadWrite<u32>),
        (0x14 => _reserved0),
        (0x20 => @END),
    }
}

register_structs! {
    /// GPDMA controller registers (UM10360 chapter 31).
    pub DmaRegisters {
        /// Combined (terminal count or error) interrupt status per channel
        (0x000 => pub int_stat: ReadOnly<u32>),
        /// Terminal-count interrupt status
        (0x004 => pub int_tc_stat: ReadOnly<u32>),
        /// Terminal-count interrupt clear (write one to clear)
        (0x008 => pub int_tc_clear: ReadWrite<u32>),
        /// Error interrupt status
        (0x00c => pub int_err_stat: ReadOnly<u32>),
        /// Error interrupt clear (write one to clear)
        (0x010 => pub int_err_clr: ReadWrite<u32>),
        (0x014 => pub raw_int_tc_stat: ReadOnly<u32>),
        (0x018 => pub raw_int_err_stat: ReadOnly<u32>),
        /// Which channels are enabled
        (0x01c => pub enbld_chns: ReadOnly<u32>),
        (0x020 => pub soft_breq: ReadWrite<u32>),
        (0x024 => pub soft_sreq: ReadWrite<u32>),
        (0x028 => pub soft_lbreq: ReadWrite<u32>),
        (0x02c => pub soft_lsreq: ReadWrite<u32>),
        /// Controller enable and endianness
        (0x030 => pub config: ReadWrite<u32>),
        (0x034 => pub sync: ReadWrite<u32>),
        (0x038 => _reserved0),
        (0x100 => pub channel: [DmaChannelRegisters; 8]),
        (0x200 => @END),
    }
}

/// The GPDMA controller in MMIO space.
pub const DMA_BASE: StaticRef<DmaRegisters> =
    unsafe { StaticRef::new(0x5000_4000 as *const DmaRegisters) };

// DMACCControl bit assignments.
const CONTROL_COUNT_MASK: u32 = 0xfff;
const CONTROL_SBSIZE_SHIFT: u32 = 12;
const CONTROL_DBSIZE_SHIFT: u32 = 15;
const CONTROL_SWIDTH_SHIFT: u32 = 18;
const CONTROL_DWIDTH_SHIFT: u32 = 21;
const CONTROL_SRC_INCREMENT: u32 = 1 << 26;
const CONTROL_DEST_INCREMENT: u32 = 1 << 27;
const CONTROL_TC_INTERRUPT: u32 = 1 << 31;

// DMACCConfig bit assignments.
const CONFIG_ENABLE: u32 = 1 << 0;
const CONFIG_SRC_PERIPHERAL_SHIFT: u32 = 1;
const CONFIG_DEST_PERIPHERAL_SHIFT: u32 = 6;
const CONFIG_TRANSFER_TYPE_SHIFT: u32 = 11;
const CONFIG_ITC_UNMASK: u32 = 1 << 15;

/// Flow-control type of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferType {
    MemoryToMemory = 0,
    MemoryToPeripheral = 1,
    PeripheralToMemory = 2,
    PeripheralToPeripheral = 3,
}

/// Hardware request lines. Lines 8..15 are shared between the UARTs and the
/// timer-match outputs; the values with bit 4 set select the timer-match
/// alternate through DMAREQSEL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaPeripheral {
    Ssp0Tx = 0,
    Ssp0Rx = 1,
    Ssp1Tx = 2,
    Ssp1Rx = 3,
    Adc = 4,
    I2sChannel0 = 5,
    I2sChannel1 = 6,
    Dac = 7,
    Uart0Tx = 8,
    Uart0Rx = 9,
    Uart1Tx = 10,
    Uart1Rx = 11,
    Uart2Tx = 12,
    Uart2Rx = 13,
    Uart3Tx = 14,
    Uart3Rx = 15,
    Match0_0 = 24,
    Match0_1 = 25,
    Match1_0 = 26,
    Match1_1 = 27,
    Match2_0 = 28,
    Match2_1 = 29,
    Match3_0 = 30,
    Match3_1 = 31,
}

/// Number of transfers in one burst.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurstSize {
    Transfer1 = 0,
    Transfer4 = 1,
    Transfer8 = 2,
    Transfer16 = 3,
    Transfer32 = 4,
    Transfer64 = 5,
    Transfer128 = 6,
    Transfer256 = 7,
}

/// Width of a single transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferWidth {
    Byte = 0,
    Halfword = 1,
    Word = 2,
}

/// The MMIO address of a register, as the DMA engine sees it.
pub(crate) fn dma_address<T>(register: &T) -> u32 {
    register as *const T as usize as u32
}

/// One GPDMA channel, with its cached control/config template.
pub struct DmaChannel {
    registers: StaticRef<DmaRegisters>,
    syscon: StaticRef<SysconRegisters>,
    channel: usize,
    control: Cell<u32>,
    config: Cell<u32>,
}

impl DmaChannel {
    pub const fn new(
        registers: StaticRef<DmaRegisters>,
        syscon: StaticRef<SysconRegisters>,
        channel: usize,
    ) -> DmaChannel {
        DmaChannel {
            registers,
            syscon,
            channel,
            control: Cell::new(0),
            config: Cell::new(0),
        }
    }

    fn select_request_line(&self, peripheral: Option<DmaPeripheral>) -> u32 {
        match peripheral {
            None => 0,
            Some(p) => {
                let id = p as u32;
                let reqsel = &self.syscon.dmareqsel;
                if id & (1 << 4) != 0 {
                    reqsel.set(reqsel.get() | (1 << (id & 0x7)));
                } else {
                    reqsel.set(reqsel.get() & !(1 << (id & 0x7)));
                }
                id & 0xf
            }
        }
    }

    /// Precompute the control and config templates for this channel's
    /// transfers. `None` for a peripheral means that end is memory.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        &self,
        transfer_type: TransferType,
        source_peripheral: Option<DmaPeripheral>,
        destination_peripheral: Option<DmaPeripheral>,
        source_burst_size: BurstSize,
        destination_burst_size: BurstSize,
        source_transfer_width: TransferWidth,
        destination_transfer_width: TransferWidth,
        source_increment: bool,
        destination_increment: bool,
    ) {
        let mut control = ((source_burst_size as u32) << CONTROL_SBSIZE_SHIFT)
            | ((destination_burst_size as u32) << CONTROL_DBSIZE_SHIFT)
            | ((source_transfer_width as u32) << CONTROL_SWIDTH_SHIFT)
            | ((destination_transfer_width as u32) << CONTROL_DWIDTH_SHIFT);
        if source_increment {
            control |= CONTROL_SRC_INCREMENT;
        }
        if destination_increment {
            control |= CONTROL_DEST_INCREMENT;
        }
        self.control.set(control);

        let source_request = self.select_request_line(source_peripheral);
        let destination_request = self.select_request_line(destination_peripheral);
        self.config.set(
            (source_request << CONFIG_SRC_PERIPHERAL_SHIFT)
                | (destination_request << CONFIG_DEST_PERIPHERAL_SHIFT)
                | ((transfer_type as u32) << CONFIG_TRANSFER_TYPE_SHIFT)
                | CONFIG_ENABLE
                | CONFIG_ITC_UNMASK,
        );
    }

    /// Start a transfer of `number_of_transfers` units from `source` to
    /// `destination` using the configured template. With `auto_re_enable`
    /// the terminal-count interrupt is left unmasked and the channel re-arms
    /// itself from the original pointers on every completion.
    pub fn transfer(
        &self,
        source: u32,
        destination: u32,
        number_of_transfers: u32,
        auto_re_enable: bool,
    ) {
        let channel = &self.registers.channel[self.channel];

        // Stop the channel before updating it, and drop any stale status.
        channel.config.set(0);
        self.registers.int_tc_clear.set(1 << self.channel);
        self.registers.int_err_clr.set(1 << self.channel);

        channel.src_addr.set(source);
        channel.dest_addr.set(destination);
        channel.lli.set(0);

        let mut control =
            (self.control.get() & !CONTROL_COUNT_MASK) | (number_of_transfers & CONTROL_COUNT_MASK);
        if auto_re_enable {
            control |= CONTROL_TC_INTERRUPT;
        } else {
            control &= !CONTROL_TC_INTERRUPT;
        }
        self.control.set(control);

        channel.control.set(control);
        channel.config.set(self.config.get());
    }

    /// The transfer count the channel was armed with.
    pub fn total_transfers(&self) -> u32 {
        self.control.get() & CONTROL_COUNT_MASK
    }

    /// Transfers the hardware has not performed yet.
    pub fn transfers_left(&self) -> u32 {
        self.registers.channel[self.channel].control.get() & CONTROL_COUNT_MASK
    }

    /// Transfers performed so far in the current run.
    pub fn number_transferred(&self) -> u32 {
        self.total_transfers() - self.transfers_left()
    }

    fn handle_interrupt(&self) {
        let bit = 1 << self.channel;
        let channel = &self.registers.channel[self.channel];

        if self.registers.int_tc_stat.get() & bit != 0 {
            // The address registers advanced during the run; rewind any
            // auto-incremented side by (count - 1) transfers of its width,
            // then re-commit the cached template to restart the channel.
            let control = self.control.get();
            let transfers_to_reset = self.total_transfers() - 1;
            if control & CONTROL_SRC_INCREMENT != 0 {
                let shift = (control >> CONTROL_SWIDTH_SHIFT) & 0x3;
                channel
                    .src_addr
                    .set(channel.src_addr.get() - (transfers_to_reset << shift));
            }
            if control & CONTROL_DEST_INCREMENT != 0 {
                let shift = (control >> CONTROL_DWIDTH_SHIFT) & 0x3;
                channel
                    .dest_addr
                    .set(channel.dest_addr.get() - (transfers_to_reset << shift));
            }

            channel.control.set(control);
            channel.config.set(self.config.get());

            self.registers.int_tc_clear.set(bit);
        }

        if self.registers.int_err_stat.get() & bit != 0 {
            // Errors are masked in the channel configuration; a stray flag
            // is cleared without further action.
            self.registers.int_err_clr.set(bit);
        }
    }
}

/// The GPDMA controller and its eight channels.
pub struct Dma {
    registers: StaticRef<DmaRegisters>,
    nvic: Nvic,
    pub channels: [DmaChannel; 8],
}

impl Dma {
    pub const fn new(
        registers: StaticRef<DmaRegisters>,
        syscon: StaticRef<SysconRegisters>,
        nvic: Nvic,
    ) -> Dma {
        Dma {
            registers,
            nvic,
            channels: [
                DmaChannel::new(registers, syscon, 0),
                DmaChannel::new(registers, syscon, 1),
                DmaChannel::new(registers, syscon, 2),
                DmaChannel::new(registers, syscon, 3),
                DmaChannel::new(registers, syscon, 4),
                DmaChannel::new(registers, syscon, 5),
                DmaChannel::new(registers, syscon, 6),
                DmaChannel::new(registers, syscon, 7),
            ],
        }
    }

    /// Power and enable the controller and its NVIC line, dropping any stale
    /// interrupt status first.
    pub fn enable(&self, pm: &PowerManager) {
        pm.enable_peripheral(PeripheralPower::Dma);

        self.registers.config.set(1);

        self.registers.int_tc_clear.set(0xff);
        self.registers.int_err_clr.set(0xff);
        self.nvic.enable();
    }

    /// Disable the controller and power it down.
    pub fn disable(&self, pm: &PowerManager) {
        self.nvic.disable();
        self.registers.config.set(0);
        pm.disable_peripheral(PeripheralPower::Dma);
    }

    /// The controller interrupt entry point: dispatch each flagged channel.
    pub fn handle_interrupt(&self) {
        let status = self.registers.int_stat.get();
        for channel in self.channels.iter() {
            if status & (1 << channel.channel) != 0 {
                channel.handle_interrupt();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::peripheral_interrupts;
    use crate::pm::tests::fake_syscon;
    use crate::utilities::testing::poke;
    use core::mem::MaybeUninit;
    use std::boxed::Box;

    pub(crate) fn fake_dma() -> (Dma, StaticRef<DmaRegisters>, StaticRef<SysconRegisters>) {
        let regs: &'static mut DmaRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let regs_ref = unsafe { StaticRef::new(regs as *const DmaRegisters) };
        let nvic: &'static mut crate::cortexm3::nvic::NvicRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let nvic_ref = unsafe { StaticRef::new(nvic as *const _) };
        let syscon = fake_syscon();
        (
            Dma::new(
                regs_ref,
                syscon,
                Nvic::with_base(nvic_ref, peripheral_interrupts::GPDMA),
            ),
            regs_ref,
            syscon,
        )
    }

    fn configure_rx_channel(dma: &Dma) {
        dma.channels[0].configure(
            TransferType::PeripheralToMemory,
            Some(DmaPeripheral::Uart0Rx),
            None,
            BurstSize::Transfer1,
            BurstSize::Transfer1,
            TransferWidth::Byte,
            TransferWidth::Byte,
            false,
            true,
        );
    }

    #[test]
    fn configure_builds_control_and_config_templates() {
        let (dma, _, syscon) = fake_dma();
        configure_rx_channel(&dma);

        let ch = &dma.channels[0];
        assert_eq!(ch.control.get(), CONTROL_DEST_INCREMENT);
        assert_eq!(
            ch.config.get(),
            (9 << CONFIG_SRC_PERIPHERAL_SHIFT)
                | (2 << CONFIG_TRANSFER_TYPE_SHIFT)
                | CONFIG_ENABLE
                | CONFIG_ITC_UNMASK
        );
        // UART request lines clear their DMAREQSEL bit.
        assert_eq!(syscon.dmareqsel.get(), 0);

        // Timer-match alternates set theirs and share the low request ids.
        dma.channels[1].configure(
            TransferType::MemoryToPeripheral,
            None,
            Some(DmaPeripheral::Match0_1),
            BurstSize::Transfer1,
            BurstSize::Transfer1,
            TransferWidth::Byte,
            TransferWidth::Byte,
            true,
            false,
        );
        assert_eq!(syscon.dmareqsel.get(), 1 << 1);
        assert_eq!(
            dma.channels[1].config.get(),
            (9 << CONFIG_DEST_PERIPHERAL_SHIFT)
                | (1 << CONFIG_TRANSFER_TYPE_SHIFT)
                | CONFIG_ENABLE
                | CONFIG_ITC_UNMASK
        );
    }

    #[test]
    fn transfer_programs_the_channel() {
        let (dma, regs, _) = fake_dma();
        configure_rx_channel(&dma);

        dma.channels[0].transfer(0x4000_c000, 0x1000_0000, 16, true);

        let ch = &regs.channel[0];
        assert_eq!(ch.src_addr.get(), 0x4000_c000);
        assert_eq!(ch.dest_addr.get(), 0x1000_0000);
        assert_eq!(ch.lli.get(), 0);
        assert_eq!(ch.control.get(), CONTROL_DEST_INCREMENT | CONTROL_TC_INTERRUPT | 16);
        assert_eq!(regs.int_tc_clear.get(), 1 << 0);
        assert_eq!(dma.channels[0].total_transfers(), 16);

        // A later one-shot transfer clears the auto-reload bit again.
        dma.channels[0].transfer(0x4000_c000, 0x1000_0000, 8, false);
        assert_eq!(ch.control.get(), CONTROL_DEST_INCREMENT | 8);
    }

    #[test]
    fn derived_counters_follow_the_hardware_count_field() {
        let (dma, regs, _) = fake_dma();
        configure_rx_channel(&dma);
        dma.channels[0].transfer(0, 0x2000_0000, 16, true);

        // Hardware counts down as it moves bytes.
        let ch = &regs.channel[0];
        ch.control.set((ch.control.get() & !CONTROL_COUNT_MASK) | 10);
        assert_eq!(dma.channels[0].transfers_left(), 10);
        assert_eq!(dma.channels[0].number_transferred(), 6);
    }

    #[test]
    fn terminal_count_rewinds_and_rearms_auto_channels() {
        let (dma, regs, _) = fake_dma();
        configure_rx_channel(&dma);
        dma.channels[0].transfer(0x4000_c000, 0x1000_0000, 16, true);

        // Simulate a completed run: addresses advanced, count exhausted.
        let ch = &regs.channel[0];
        ch.dest_addr.set(0x1000_0000 + 15);
        ch.control.set(ch.control.get() & !CONTROL_COUNT_MASK);
        poke(&regs.int_stat, 1 << 0);
        poke(&regs.int_tc_stat, 1 << 0);
        regs.int_tc_clear.set(0);

        dma.handle_interrupt();

        // Source is a peripheral register and stays put; destination rewound
        // to the start of the buffer, template re-committed.
        assert_eq!(ch.src_addr.get(), 0x4000_c000);
        assert_eq!(ch.dest_addr.get(), 0x1000_0000);
        assert_eq!(ch.control.get(), CONTROL_DEST_INCREMENT | CONTROL_TC_INTERRUPT | 16);
        assert_eq!(ch.config.get(), dma.channels[0].config.get());
        assert_eq!(regs.int_tc_clear.get(), 1 << 0);
    }

    #[test]
    fn word_wide_rewind_scales_by_width() {
        let (dma, regs, _) = fake_dma();
        dma.channels[2].configure(
            TransferType::MemoryToPeripheral,
            None,
            Some(DmaPeripheral::Dac),
            BurstSize::Transfer1,
            BurstSize::Transfer1,
            TransferWidth::Word,
            TransferWidth::Word,
            true,
            false,
        );
        dma.channels[2].transfer(0x1000_0000, 0x4008_c000, 8, true);

        let ch = &regs.channel[2];
        ch.src_addr.set(0x1000_0000 + 7 * 4);
        ch.control.set(ch.control.get() & !CONTROL_COUNT_MASK);
        poke(&regs.int_stat, 1 << 2);
        poke(&regs.int_tc_stat, 1 << 2);

        dma.handle_interrupt();
        assert_eq!(ch.src_addr.get(), 0x1000_0000);
    }

    #[test]
    fn error_flags_are_cleared_without_action() {
        let (dma, regs, _) = fake_dma();
        configure_rx_channel(&dma);
        dma.channels[0].transfer(0x4000_c000, 0x1000_0000, 16, false);
        let armed_control = regs.channel[0].control.get();

        poke(&regs.int_stat, 1 << 0);
        poke(&regs.int_err_stat, 1 << 0);
        dma.handle_interrupt();

        assert_eq!(regs.int_err_clr.get(), 1 << 0);
        assert_eq!(regs.channel[0].control.get(), armed_control);
    }

    #[test]
    fn enable_powers_and_clears(){
        let (dma, regs, _) = fake_dma();
        let (pm, syscon) = crate::pm::tests::fake_pm();
        dma.enable(&pm);
        assert_eq!(regs.config.get(), 1);
        assert_eq!(regs.int_tc_clear.get(), 0xff);
        assert_eq!(regs.int_err_clr.get(), 0xff);
        assert_eq!(syscon.pconp.get() & (1 << 29), 1 << 29);
    }
}
