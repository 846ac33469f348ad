// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Cortex-M3 Nested Vectored Interrupt Controller.
//!
//! Most NVIC configuration is in the NVIC registers:
//! <https://developer.arm.com/docs/100165/0201/nested-vectored-interrupt-controller/nvic-programmers-model/table-of-nvic-registers>
//!
//! The ICTR and the Software Trigger Interrupt Register are conceptually part
//! of the NVIC as well but live outside its register banks in older ARM ARM
//! editions; they are kept in this block for lack of a better home.

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

use crate::utilities::StaticRef;

register_structs! {
    /// NVIC Registers.
    ///
    /// This generic layout exposes all possible NVIC banks; the LPC176x
    /// implements 35 interrupt lines, so only the first two banks of each
    /// register do anything.
    pub NvicRegisters {
        (0x000 => _reserved0),

        /// Interrupt Controller Type Register
        (0x004 => pub ictr: ReadOnly<u32, InterruptControllerType::Register>),

        (0x008 => _reserved1),

        /// Interrupt Set-Enable Registers
        (0x100 => pub iser: [ReadWrite<u32, NvicSetClear::Register>; 32]),

        /// Interrupt Clear-Enable Registers
        (0x180 => pub icer: [ReadWrite<u32, NvicSetClear::Register>; 32]),

        /// Interrupt Set-Pending Registers
        (0x200 => pub ispr: [ReadWrite<u32, NvicSetClear::Register>; 32]),

        /// Interrupt Clear-Pending Registers
        (0x280 => pub icpr: [ReadWrite<u32, NvicSetClear::Register>; 32]),

        /// Interrupt Active Bit Registers
        (0x300 => pub iabr: [ReadOnly<u32, NvicSetClear::Register>; 32]),

        (0x380 => _reserved2),

        /// Interrupt Priority Registers
        (0x400 => pub ipr: [ReadWrite<u32, NvicInterruptPriority::Register>; 252]),

        (0x7f0 => _reserved3),

        /// Software Trigger Interrupt Register
        (0xf00 => pub stir: ReadWrite<u32>),

        (0xf04 => @END),
    }
}

register_bitfields![u32,
    InterruptControllerType [
        /// Total number of interrupt lines in groups of 32
        INTLINESNUM     OFFSET(0)   NUMBITS(4)
    ],

    NvicSetClear [
        /// For register NVIC_XXXXn, access interrupt (m+(32*n)).
        BITS            OFFSET(0)   NUMBITS(32)
    ],

    NvicInterruptPriority [
        /// For register NVIC_IPRn, priority of interrupt number 4n+3.
        PRI_N3          OFFSET(24)  NUMBITS(8),

        /// For register NVIC_IPRn, priority of interrupt number 4n+2.
        PRI_N2          OFFSET(16)  NUMBITS(8),

        /// For register NVIC_IPRn, priority of interrupt number 4n+1.
        PRI_N1          OFFSET(8)   NUMBITS(8),

        /// For register NVIC_IPRn, priority of interrupt number 4n.
        PRI_N0          OFFSET(0)   NUMBITS(8)
    ]
];

/// The NVIC peripheral in MMIO space.
pub const BASE: StaticRef<NvicRegisters> =
    unsafe { StaticRef::new(0xe000e000 as *const NvicRegisters) };

/// Number of implemented NVIC_XXXX register banks (a ceiling on the number of
/// interrupt lines divided by 32).
fn number_of_nvic_registers(registers: StaticRef<NvicRegisters>) -> usize {
    (registers.ictr.read(InterruptControllerType::INTLINESNUM) + 1) as usize
}

/// Clear all pending interrupts
pub unsafe fn clear_all_pending() {
    let registers = BASE;
    for icpr in registers.icpr.iter().take(number_of_nvic_registers(BASE)) {
        icpr.set(!0)
    }
}

/// Enable all interrupts in the NVIC
pub unsafe fn enable_all() {
    let registers = BASE;
    for iser in registers.iser.iter().take(number_of_nvic_registers(BASE)) {
        iser.set(!0)
    }
}

/// Disable all interrupts in the NVIC
pub unsafe fn disable_all() {
    let registers = BASE;
    for icer in registers.icer.iter().take(number_of_nvic_registers(BASE)) {
        icer.set(!0)
    }
}

/// An opaque wrapper for a single NVIC interrupt line.
///
/// Hand these out to low-level drivers to let them control their own
/// interrupt but not others.
pub struct Nvic {
    registers: StaticRef<NvicRegisters>,
    index: u32,
}

impl Nvic {
    /// Creates a new `Nvic` addressing the real NVIC.
    ///
    /// Marked unsafe because only chip/platform configuration code should be
    /// able to create these.
    pub const unsafe fn new(index: u32) -> Nvic {
        Nvic {
            registers: BASE,
            index,
        }
    }

    /// Creates a `Nvic` over an explicit register block. Used by tests to
    /// point a driver at an in-memory NVIC image.
    pub const fn with_base(registers: StaticRef<NvicRegisters>, index: u32) -> Nvic {
        Nvic { registers, index }
    }

    /// Enable the interrupt
    pub fn enable(&self) {
        let idx = self.index as usize;
        self.registers.iser[idx / 32].set(1 << (self.index & 31));
    }

    /// Disable the interrupt
    pub fn disable(&self) {
        let idx = self.index as usize;
        self.registers.icer[idx / 32].set(1 << (self.index & 31));
    }

    /// Whether the interrupt is pending
    pub fn is_pending(&self) -> bool {
        let idx = self.index as usize;
        self.registers.ispr[idx / 32].get() & (1 << (self.index & 31)) != 0
    }

    /// Mark the interrupt pending in software
    pub fn set_pending(&self) {
        let idx = self.index as usize;
        self.registers.ispr[idx / 32].set(1 << (self.index & 31));
    }

    /// Clear pending state
    pub fn clear_pending(&self) {
        let idx = self.index as usize;
        self.registers.icpr[idx / 32].set(1 << (self.index & 31));
    }

    /// Whether the interrupt's handler is currently executing (or preempted)
    pub fn is_active(&self) -> bool {
        let idx = self.index as usize;
        self.registers.iabr[idx / 32].get() & (1 << (self.index & 31)) != 0
    }

    /// Program the already-encoded 8-bit priority for this interrupt.
    pub fn set_priority(&self, priority: u8) {
        let idx = self.index as usize;
        let ipr = &self.registers.ipr[idx / 4];
        match idx % 4 {
            0 => ipr.modify(NvicInterruptPriority::PRI_N0.val(priority as u32)),
            1 => ipr.modify(NvicInterruptPriority::PRI_N1.val(priority as u32)),
            2 => ipr.modify(NvicInterruptPriority::PRI_N2.val(priority as u32)),
            _ => ipr.modify(NvicInterruptPriority::PRI_N3.val(priority as u32)),
        }
    }

    /// Raise the interrupt from software through the STIR. Only the first
    /// 112 lines are addressable this way.
    pub fn trigger(&self) {
        if self.index < 112 {
            self.registers.stir.set(self.index);
        }
    }
}
