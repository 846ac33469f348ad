// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Unified interrupt control over the NVIC and the system exceptions.
//!
//! Interrupts are addressed by their signed vector-table index: non-negative
//! values are NVIC lines, negative values are the architectural system
//! exceptions. Enable, pending, active, and priority operations route to the
//! NVIC banks or to the matching SCB (or SysTick) bits accordingly.

use core::cell::Cell;

use tock_registers::interfaces::{ReadWriteable, Readable};

use crate::cortexm3::nvic::{self, Nvic, NvicRegisters};
use crate::cortexm3::scb::{
    self, ApplicationInterruptAndReset, InterruptControlAndState, ScbRegisters,
    SystemHandlerControlAndState, SystemHandlerPriority,
};
use crate::cortexm3::support;
use crate::cortexm3::systick::{self, ControlAndStatus, SystickRegisters};
use crate::utilities::StaticRef;

/// Number of priority bits the LPC176x implements.
pub const NVIC_PRIO_BITS: u32 = 5;

/// Signed vector-table indices of the system exceptions.
pub const NMI: i32 = -14;
pub const MEM_MANAGE: i32 = -12;
pub const BUS_FAULT: i32 = -11;
pub const USAGE_FAULT: i32 = -10;
pub const SV_CALL: i32 = -5;
pub const DEBUG_MONITOR: i32 = -4;
pub const PEND_SV: i32 = -2;
pub const SYS_TICK: i32 = -1;

/// Priority grouping: how the 8-bit priority field splits into preempt
/// levels and sub-levels. Values are the AIRCR.PRIGROUP encodings for a
/// 5-bit priority implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityGrouping {
    Priorities32Group1Sub = 2,
    Priorities16Group2Sub = 3,
    Priorities8Group4Sub = 4,
    Priorities4Group8Sub = 5,
    Priorities2Group16Sub = 6,
    Priorities1Group32Sub = 7,
}

/// Encode a (preempt, sub) priority pair under an AIRCR.PRIGROUP value,
/// positioned in the implemented high-order priority bits.
fn encode_priority(grouping: u32, preempt: u32, sub: u32) -> u8 {
    let grouping = grouping & 0x7;
    let preempt_bits = core::cmp::min(7 - grouping, NVIC_PRIO_BITS);
    let sub_bits = (grouping + NVIC_PRIO_BITS).saturating_sub(7);

    let encoded = ((preempt & ((1 << preempt_bits) - 1)) << sub_bits)
        | (sub & ((1 << sub_bits) - 1));
    (encoded << (8 - NVIC_PRIO_BITS)) as u8
}

/// Typed facade over the NVIC, the SCB exception bits, and the SysTick
/// interrupt enable.
pub struct InterruptControl {
    nvic: StaticRef<NvicRegisters>,
    scb: StaticRef<ScbRegisters>,
    systick: StaticRef<SystickRegisters>,
    grouping: Cell<u32>,
}

impl InterruptControl {
    pub const unsafe fn new() -> InterruptControl {
        InterruptControl {
            nvic: nvic::BASE,
            scb: scb::BASE,
            systick: systick::BASE,
            grouping: Cell::new(PriorityGrouping::Priorities32Group1Sub as u32),
        }
    }

    /// Construct over explicit register blocks; used by host tests.
    pub const fn with_bases(
        nvic: StaticRef<NvicRegisters>,
        scb: StaticRef<ScbRegisters>,
        systick: StaticRef<SystickRegisters>,
    ) -> InterruptControl {
        InterruptControl {
            nvic,
            scb,
            systick,
            grouping: Cell::new(PriorityGrouping::Priorities32Group1Sub as u32),
        }
    }

    fn nvic_line(&self, index: i32) -> Nvic {
        Nvic::with_base(self.nvic, index as u32)
    }

    /// Unmask interrupts globally.
    pub unsafe fn enable_interrupts(&self) {
        support::enable_interrupts();
    }

    /// Mask interrupts globally.
    pub unsafe fn disable_interrupts(&self) {
        support::disable_interrupts();
    }

    /// Enable one interrupt line or the fault-enable bit of one system
    /// exception. Exceptions without an enable bit are no-ops.
    pub fn enable(&self, index: i32) {
        if index >= 0 {
            self.nvic_line(index).enable();
        } else {
            match index {
                USAGE_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::USGFAULTENA::SET),
                BUS_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::BUSFAULTENA::SET),
                MEM_MANAGE => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::MEMFAULTENA::SET),
                SYS_TICK => self.systick.syst_csr.modify(ControlAndStatus::TICKINT::SET),
                _ => {}
            }
        }
    }

    /// Disable one interrupt line or one system exception.
    pub fn disable(&self, index: i32) {
        if index >= 0 {
            self.nvic_line(index).disable();
        } else {
            match index {
                USAGE_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::USGFAULTENA::CLEAR),
                BUS_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::BUSFAULTENA::CLEAR),
                MEM_MANAGE => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::MEMFAULTENA::CLEAR),
                SYS_TICK => self
                    .systick
                    .syst_csr
                    .modify(ControlAndStatus::TICKINT::CLEAR),
                _ => {}
            }
        }
    }

    /// Whether any external (NVIC) interrupt is pending.
    pub fn any_pending(&self) -> bool {
        self.scb.icsr.is_set(InterruptControlAndState::ISRPENDING)
    }

    /// Whether a specific interrupt or exception is pending.
    pub fn is_pending(&self, index: i32) -> bool {
        if index >= 0 {
            self.nvic_line(index).is_pending()
        } else {
            match index {
                NMI => self.scb.icsr.is_set(InterruptControlAndState::NMIPENDSET),
                PEND_SV => self.scb.icsr.is_set(InterruptControlAndState::PENDSVSET),
                SYS_TICK => self.scb.icsr.is_set(InterruptControlAndState::PENDSTSET),
                SV_CALL => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::SVCALLPENDED),
                BUS_FAULT => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::BUSFAULTPENDED),
                MEM_MANAGE => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::MEMFAULTPENDED),
                USAGE_FAULT => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::USGFAULTPENDED),
                _ => false,
            }
        }
    }

    /// Signed index of the highest-priority pending vector.
    pub fn pending(&self) -> i32 {
        let exception = self.scb.icsr.read(InterruptControlAndState::VECTPENDING) as i32;
        exception - 16
    }

    /// Pend an interrupt or exception from software.
    pub fn set_pending(&self, index: i32) {
        if index >= 0 {
            self.nvic_line(index).set_pending();
        } else {
            match index {
                NMI => self
                    .scb
                    .icsr
                    .modify(InterruptControlAndState::NMIPENDSET::SET),
                PEND_SV => self
                    .scb
                    .icsr
                    .modify(InterruptControlAndState::PENDSVSET::SET),
                SYS_TICK => self
                    .scb
                    .icsr
                    .modify(InterruptControlAndState::PENDSTSET::SET),
                SV_CALL => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::SVCALLPENDED::SET),
                BUS_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::BUSFAULTPENDED::SET),
                MEM_MANAGE => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::MEMFAULTPENDED::SET),
                USAGE_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::USGFAULTPENDED::SET),
                _ => {}
            }
        }
    }

    /// Clear pending state of an interrupt or exception.
    pub fn clear_pending(&self, index: i32) {
        if index >= 0 {
            self.nvic_line(index).clear_pending();
        } else {
            match index {
                PEND_SV => self
                    .scb
                    .icsr
                    .modify(InterruptControlAndState::PENDSVCLR::SET),
                SYS_TICK => self
                    .scb
                    .icsr
                    .modify(InterruptControlAndState::PENDSTCLR::SET),
                SV_CALL => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::SVCALLPENDED::CLEAR),
                BUS_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::BUSFAULTPENDED::CLEAR),
                MEM_MANAGE => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::MEMFAULTPENDED::CLEAR),
                USAGE_FAULT => self
                    .scb
                    .shcsr
                    .modify(SystemHandlerControlAndState::USGFAULTPENDED::CLEAR),
                _ => {}
            }
        }
    }

    /// Whether the handler for an interrupt or exception is active.
    pub fn is_active(&self, index: i32) -> bool {
        if index >= 0 {
            self.nvic_line(index).is_active()
        } else {
            match index {
                SYS_TICK => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::SYSTICKACT),
                PEND_SV => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::PENDSVACT),
                DEBUG_MONITOR => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::MONITORACT),
                SV_CALL => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::SVCALLACT),
                USAGE_FAULT => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::USGFAULTACT),
                BUS_FAULT => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::BUSFAULTACT),
                MEM_MANAGE => self
                    .scb
                    .shcsr
                    .is_set(SystemHandlerControlAndState::MEMFAULTACT),
                _ => false,
            }
        }
    }

    /// Signed index of the currently executing vector, or -16 in thread mode.
    pub fn active(&self) -> i32 {
        let exception = self.scb.icsr.read(InterruptControlAndState::VECTACTIVE) as i32;
        exception - 16
    }

    /// Program the priority of an interrupt or exception, encoded under the
    /// current priority grouping.
    pub fn set_priority(&self, index: i32, preempt_priority: u32, sub_priority: u32) {
        let priority = encode_priority(self.grouping.get(), preempt_priority, sub_priority);
        if index >= 0 {
            self.nvic_line(index).set_priority(priority);
        } else {
            // System handler priority registers cover exceptions 4..=15.
            let handler = (16 + index) as usize;
            if handler < 4 {
                // NMI and HardFault priorities are fixed.
                return;
            }
            let idx = handler - 4;
            let shpr = &self.scb.shpr[idx / 4];
            match idx % 4 {
                0 => shpr.modify(SystemHandlerPriority::PRI_N0.val(priority as u32)),
                1 => shpr.modify(SystemHandlerPriority::PRI_N1.val(priority as u32)),
                2 => shpr.modify(SystemHandlerPriority::PRI_N2.val(priority as u32)),
                _ => shpr.modify(SystemHandlerPriority::PRI_N3.val(priority as u32)),
            }
        }
    }

    /// Select the preempt/sub split used by later `set_priority` calls.
    pub fn set_priority_grouping(&self, grouping: PriorityGrouping) {
        self.grouping.set(grouping as u32);
        self.scb.aircr.modify(
            ApplicationInterruptAndReset::VECTKEY.val(0x05FA)
                + ApplicationInterruptAndReset::PRIGROUP.val(grouping as u32),
        );
    }

    /// Raise an NVIC interrupt from software.
    pub fn trigger(&self, index: i32) {
        if index >= 0 {
            self.nvic_line(index).trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::MaybeUninit;
    use std::boxed::Box;

    fn fake_control() -> (
        InterruptControl,
        StaticRef<NvicRegisters>,
        StaticRef<ScbRegisters>,
        StaticRef<SystickRegisters>,
    ) {
        let nvic: &'static mut NvicRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let scb: &'static mut ScbRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let systick: &'static mut SystickRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let nvic_ref = unsafe { StaticRef::new(nvic as *const NvicRegisters) };
        let scb_ref = unsafe { StaticRef::new(scb as *const ScbRegisters) };
        let systick_ref = unsafe { StaticRef::new(systick as *const SystickRegisters) };
        (
            InterruptControl::with_bases(nvic_ref, scb_ref, systick_ref),
            nvic_ref,
            scb_ref,
            systick_ref,
        )
    }

    #[test]
    fn nvic_lines_route_to_banked_registers() {
        let (control, nvic, _, _) = fake_control();

        control.enable(5);
        control.enable(34);
        assert_eq!(nvic.iser[0].get(), 1 << 5);
        assert_eq!(nvic.iser[1].get(), 1 << 2);

        control.set_pending(5);
        assert!(control.is_pending(5));
        assert!(!control.is_pending(6));

        control.disable(34);
        assert_eq!(nvic.icer[1].get(), 1 << 2);
    }

    #[test]
    fn exceptions_route_to_scb_and_systick() {
        let (control, _, scb, systick) = fake_control();

        control.enable(USAGE_FAULT);
        control.enable(BUS_FAULT);
        control.enable(MEM_MANAGE);
        assert!(scb.shcsr.is_set(SystemHandlerControlAndState::USGFAULTENA));
        assert!(scb.shcsr.is_set(SystemHandlerControlAndState::BUSFAULTENA));
        assert!(scb.shcsr.is_set(SystemHandlerControlAndState::MEMFAULTENA));

        control.enable(SYS_TICK);
        assert!(systick.syst_csr.is_set(ControlAndStatus::TICKINT));
        control.disable(SYS_TICK);
        assert!(!systick.syst_csr.is_set(ControlAndStatus::TICKINT));

        control.set_pending(SYS_TICK);
        assert!(control.is_pending(SYS_TICK));
        control.set_pending(SV_CALL);
        assert!(control.is_pending(SV_CALL));
    }

    #[test]
    fn priority_encoding_follows_grouping() {
        // Default grouping: 32 preempt levels, no sub-priority, placed in
        // the top 5 bits of the 8-bit field.
        assert_eq!(encode_priority(2, 3, 0), 3 << 3);
        // 8 preempt levels x 4 sub-levels.
        assert_eq!(encode_priority(4, 0b101, 0b10), (0b101_10 << 3) as u8);
        // All sub-priority.
        assert_eq!(encode_priority(7, 0b11111, 0b10101), 0b10101 << 3);
    }

    #[test]
    fn priorities_land_in_ipr_and_shpr() {
        let (control, nvic, scb, _) = fake_control();

        control.set_priority(6, 1, 0);
        // IRQ 6 lives in IPR1 byte 2.
        assert_eq!(nvic.ipr[1].get(), (1 << 3) << 16);

        control.set_priority(SYS_TICK, 2, 0);
        // SysTick is exception 15: SHPR3 byte 3.
        assert_eq!(scb.shpr[2].get(), ((2 << 3) as u32) << 24);
    }

    #[test]
    fn stir_triggers_low_lines_only() {
        let (control, nvic, _, _) = fake_control();
        control.trigger(26);
        assert_eq!(nvic.stir.get(), 26);
    }
}
