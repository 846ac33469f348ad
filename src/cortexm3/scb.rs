// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! ARM Cortex-M3 System Control Block.
//!
//! <https://developer.arm.com/docs/100165/0201/system-control/system-control-register-descriptions>

use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

use crate::utilities::StaticRef;

register_structs! {
    pub ScbRegisters {
        /// CPUID Base Register
        (0x00 => pub cpuid: ReadOnly<u32>),

        /// Interrupt Control and State Register
        (0x04 => pub icsr: ReadWrite<u32, InterruptControlAndState::Register>),

        /// Vector Table Offset Register
        (0x08 => pub vtor: ReadWrite<u32>),

        /// Application Interrupt and Reset Control Register
        (0x0c => pub aircr: ReadWrite<u32, ApplicationInterruptAndReset::Register>),

        /// System Control Register
        (0x10 => pub scr: ReadWrite<u32, SystemControl::Register>),

        /// Configuration and Control Register
        (0x14 => pub ccr: ReadWrite<u32>),

        /// System Handler Priority Registers
        (0x18 => pub shpr: [ReadWrite<u32, SystemHandlerPriority::Register>; 3]),

        /// System Handler Control and State Register
        (0x24 => pub shcsr: ReadWrite<u32, SystemHandlerControlAndState::Register>),

        /// Configurable Fault Status Register
        (0x28 => pub cfsr: ReadWrite<u32>),

        /// HardFault Status Register
        (0x2c => pub hfsr: ReadWrite<u32>),

        /// Debug Fault Status Register
        (0x30 => pub dfsr: ReadWrite<u32>),

        /// MemManage Fault Address Register
        (0x34 => pub mmfar: ReadWrite<u32>),

        /// BusFault Address Register
        (0x38 => pub bfar: ReadWrite<u32>),

        /// Auxiliary Fault Status Register
        (0x3c => pub afsr: ReadWrite<u32>),

        (0x40 => @END),
    }
}

register_bitfields![u32,
    pub InterruptControlAndState [
        /// Change NMI exception to pending. RW.
        NMIPENDSET      OFFSET(31)  NUMBITS(1),

        /// Change PendSV exception to pending. RW.
        PENDSVSET       OFFSET(28)  NUMBITS(1),

        /// Remove PendSV pending status. WO.
        PENDSVCLR       OFFSET(27)  NUMBITS(1),

        /// Change SysTick exception to pending. RW.
        PENDSTSET       OFFSET(26)  NUMBITS(1),

        /// Remove SysTick pending status. WO.
        PENDSTCLR       OFFSET(25)  NUMBITS(1),

        /// Whether an external interrupt (not exception) is pending. RO.
        ISRPENDING      OFFSET(22)  NUMBITS(1),

        /// Exception number of the highest priority pending exception. RO.
        VECTPENDING     OFFSET(12)  NUMBITS(9),

        /// Whether there is more than one active exception. RO.
        RETTOBASE       OFFSET(11)  NUMBITS(1),

        /// Exception number of the currently executing exception. RO.
        VECTACTIVE      OFFSET(0)   NUMBITS(9)
    ],

    pub ApplicationInterruptAndReset [
        /// Key. Must be 0x05FA on every write, reads as 0xFA05.
        VECTKEY         OFFSET(16)  NUMBITS(16),

        /// Data endianness
        ENDIANNESS      OFFSET(15)  NUMBITS(1),

        /// Interrupt priority grouping field
        PRIGROUP        OFFSET(8)   NUMBITS(3),

        /// System reset request
        SYSRESETREQ     OFFSET(2)   NUMBITS(1)
    ],

    pub SystemControl [
        /// Send Event on Pending bit
        SEVONPEND       OFFSET(4)   NUMBITS(1),

        /// Whether deep sleep is used as the low power mode
        SLEEPDEEP       OFFSET(2)   NUMBITS(1),

        /// Whether to sleep when returning to thread mode
        SLEEPONEXIT     OFFSET(1)   NUMBITS(1)
    ],

    pub SystemHandlerPriority [
        PRI_N3          OFFSET(24)  NUMBITS(8),
        PRI_N2          OFFSET(16)  NUMBITS(8),
        PRI_N1          OFFSET(8)   NUMBITS(8),
        PRI_N0          OFFSET(0)   NUMBITS(8)
    ],

    pub SystemHandlerControlAndState [
        USGFAULTENA     OFFSET(18)  NUMBITS(1),
        BUSFAULTENA     OFFSET(17)  NUMBITS(1),
        MEMFAULTENA     OFFSET(16)  NUMBITS(1),
        SVCALLPENDED    OFFSET(15)  NUMBITS(1),
        BUSFAULTPENDED  OFFSET(14)  NUMBITS(1),
        MEMFAULTPENDED  OFFSET(13)  NUMBITS(1),
        USGFAULTPENDED  OFFSET(12)  NUMBITS(1),
        SYSTICKACT      OFFSET(11)  NUMBITS(1),
        PENDSVACT       OFFSET(10)  NUMBITS(1),
        MONITORACT      OFFSET(8)   NUMBITS(1),
        SVCALLACT       OFFSET(7)   NUMBITS(1),
        USGFAULTACT     OFFSET(3)   NUMBITS(1),
        BUSFAULTACT     OFFSET(1)   NUMBITS(1),
        MEMFAULTACT     OFFSET(0)   NUMBITS(1)
    ]
];

/// The SCB in MMIO space.
pub const BASE: StaticRef<ScbRegisters> =
    unsafe { StaticRef::new(0xe000ed00 as *const ScbRegisters) };
