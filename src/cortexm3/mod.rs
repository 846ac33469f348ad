// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Cortex-M3 architectural peripherals: NVIC, SCB, SysTick, and the small
//! amount of inline assembly the drivers need.

pub mod interrupt;
pub mod nvic;
pub mod scb;
pub mod support;
pub mod systick;
