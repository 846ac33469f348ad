// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! ARM Cortex-M3 SysTick peripheral.
//!
//! Documented in the Cortex-M3 Devices Generic User Guide, Chapter 4.4

use tock_registers::{register_bitfields, register_structs};
use tock_registers::registers::{ReadOnly, ReadWrite};

use crate::utilities::StaticRef;

register_structs! {
    pub SystickRegisters {
        /// SysTick Control and Status Register
        (0x00 => pub syst_csr: ReadWrite<u32, ControlAndStatus::Register>),

        /// SysTick Reload Value Register
        (0x04 => pub syst_rvr: ReadWrite<u32, ReloadValue::Register>),

        /// SysTick Current Value Register
        (0x08 => pub syst_cvr: ReadWrite<u32, CurrentValue::Register>),

        /// SysTick Calibration Value Register
        (0x0c => pub syst_calib: ReadOnly<u32, CalibrationValue::Register>),

        (0x10 => @END),
    }
}

register_bitfields![u32,
    pub ControlAndStatus [
        /// Returns 1 if timer counted to 0 since last time this was read.
        COUNTFLAG 16,

        /// Clock source is (0) External Clock or (1) Processor Clock.
        CLKSOURCE 2,

        /// Set to 1 to enable SysTick exception request.
        TICKINT 1,

        /// Enable the counter (1 == Enabled).
        ENABLE 0
    ],

    pub ReloadValue [
        /// Value loaded to `syst_cvr` when counter is enabled and reaches 0.
        RELOAD          OFFSET(0)  NUMBITS(24)
    ],

    pub CurrentValue [
        /// Reads current value. Write of any value sets to 0.
        CURRENT         OFFSET(0)  NUMBITS(24)
    ],

    pub CalibrationValue [
        /// 0 if device provides reference clock to processor.
        NOREF           OFFSET(31) NUMBITS(1),

        /// 0 if TENMS value is exact, 1 if inexact or not given.
        SKEW            OFFSET(30) NUMBITS(1),

        /// Reload value for 10ms ticks, or 0 if no calibration.
        TENMS           OFFSET(0)  NUMBITS(24)
    ]
];

/// The SysTick peripheral in MMIO space.
pub const BASE: StaticRef<SystickRegisters> =
    unsafe { StaticRef::new(0xe000e010 as *const SystickRegisters) };
