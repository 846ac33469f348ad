// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Bare-metal peripheral drivers for the NXP LPC176x (Cortex-M3) family.
//!
//! The crate gives firmware a uniform, non-blocking interface to the on-chip
//! clock tree, GPIO, external interrupts, SysTick time base, GPDMA, UARTs,
//! SPI/SSP, and I²C masters, plus drivers for two common off-chip
//! collaborators (the MCP23017 I/O expander and the SST25LF020 serial
//! flash). All byte movement happens from interrupt handlers or the DMA
//! engine; application code submits buffers and polls.
//!
//! Every peripheral takes its memory-mapped register block as a
//! [`utilities::StaticRef`] constructor argument, so drivers can be exercised
//! against plain in-memory register images in host-side tests.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod cortexm3;
pub mod hil;
pub mod utilities;

pub mod chip;
pub mod dma;
pub mod errorcode;
pub mod gpio;
pub mod i2c;
pub mod mcp23017;
pub mod peripheral_interrupts;
pub mod pm;
pub mod spi;
pub mod sst25lf020;
pub mod time;
pub mod uart;

pub use crate::errorcode::ErrorCode;
