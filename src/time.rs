// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! SysTick-driven millisecond time base.
//!
//! A 32-bit tick counter advanced at [`TICK_RATE_HZ`] by the SysTick
//! exception. The timer registers itself as a clock observer so the SysTick
//! reload value tracks CPU-frequency changes; `tic`/`toc` bracket
//! measurements and [`Time::delay_ms`] busy-waits, quantised to the tick
//! period (10 ms at the default rate).

use core::sync::atomic::{AtomicU32, Ordering};

use tock_registers::interfaces::Writeable;

use crate::cortexm3::systick::{ControlAndStatus, ReloadValue, SystickRegisters};
use crate::errorcode::ErrorCode;
use crate::pm::{ClockClient, PowerManager};
use crate::utilities::StaticRef;

/// Tick interrupts per second.
pub const TICK_RATE_HZ: u32 = 100;

/// The system time base. One per chip.
pub struct Time {
    systick: StaticRef<SystickRegisters>,
    tick: AtomicU32,
}

impl Time {
    pub const fn new(systick: StaticRef<SystickRegisters>) -> Time {
        Time {
            systick,
            tick: AtomicU32::new(0),
        }
    }

    fn set_reload(&self, cpu_frequency: u32) {
        self.systick
            .syst_rvr
            .write(ReloadValue::RELOAD.val(cpu_frequency / TICK_RATE_HZ - 1));
    }

    /// Start the tick. Programs the reload for the current CPU frequency,
    /// registers the timer as a clock observer so the reload follows later
    /// frequency changes, and enables SysTick with its interrupt, counting
    /// the processor clock.
    pub fn start<'a>(&'a self, pm: &PowerManager<'a>) -> Result<(), ErrorCode> {
        self.set_reload(pm.cpu_frequency());
        pm.attach_client(self)?;

        self.systick.syst_cvr.set(0);
        self.systick.syst_csr.write(
            ControlAndStatus::CLKSOURCE::SET
                + ControlAndStatus::TICKINT::SET
                + ControlAndStatus::ENABLE::SET,
        );
        Ok(())
    }

    /// The current tick count.
    pub fn tic(&self) -> u32 {
        self.tick.load(Ordering::Relaxed)
    }

    /// Milliseconds elapsed since `tic` was sampled.
    pub fn toc(&self, tic: u32) -> u32 {
        self.tick.load(Ordering::Relaxed).wrapping_sub(tic) * 1000 / TICK_RATE_HZ
    }

    const fn ticks_for_ms(ms: u32) -> u32 {
        ms * TICK_RATE_HZ / 1000
    }

    /// Busy-wait for at least `ms` milliseconds, rounded down to whole
    /// ticks.
    pub fn delay_ms(&self, ms: u32) {
        let start = self.tick.load(Ordering::Relaxed);
        let difference = Self::ticks_for_ms(ms);
        while self.tick.load(Ordering::Relaxed).wrapping_sub(start) < difference {}
    }

    /// SysTick exception entry point.
    pub fn handle_interrupt(&self) {
        self.tick.fetch_add(1, Ordering::Relaxed);
    }
}

impl ClockClient for Time {
    fn clock_changed(&self, cpu_frequency: u32) {
        self.set_reload(cpu_frequency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pm::tests::fake_pm;
    use crate::pm::ClockSource;
    use core::mem::MaybeUninit;
    use std::boxed::Box;
    use tock_registers::interfaces::Readable;

    fn fake_time() -> (&'static Time, StaticRef<SystickRegisters>) {
        let regs: &'static mut SystickRegisters =
            Box::leak(Box::new(unsafe { MaybeUninit::zeroed().assume_init() }));
        let regs_ref = unsafe { StaticRef::new(regs as *const SystickRegisters) };
        (Box::leak(Box::new(Time::new(regs_ref))), regs_ref)
    }

    #[test]
    fn start_programs_reload_and_control() {
        let (time, regs) = fake_time();
        let (pm, _) = fake_pm();

        assert!(time.start(&pm).is_ok());
        // Internal RC at 4 MHz, 100 Hz tick.
        assert_eq!(regs.syst_rvr.read(ReloadValue::RELOAD), 39_999);
        assert!(regs.syst_csr.is_set(ControlAndStatus::ENABLE));
        assert!(regs.syst_csr.is_set(ControlAndStatus::TICKINT));
        assert!(regs.syst_csr.is_set(ControlAndStatus::CLKSOURCE));
    }

    #[test]
    fn reload_follows_clock_changes() {
        let (time, regs) = fake_time();
        let (pm, _) = fake_pm();
        time.start(&pm).unwrap();

        pm.enable_main_oscillator(12_000_000);
        pm.use_system_clock(ClockSource::MainOscillator, 1);
        pm.connect_system_pll(20, 1, 4);
        assert_eq!(regs.syst_rvr.read(ReloadValue::RELOAD), 1_199_999);
    }

    #[test]
    fn tic_toc_and_quantisation() {
        let (time, _) = fake_time();

        let t0 = time.tic();
        for _ in 0..3 {
            time.handle_interrupt();
        }
        assert_eq!(time.toc(t0), 30);

        // A 25 ms delay rounds down to two whole ticks.
        assert_eq!(Time::ticks_for_ms(25), 2);
        assert_eq!(Time::ticks_for_ms(30), 3);
    }
}
