// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! SST25LF020 serial flash.
//!
//! A thin driver over a shared SPI master and a dedicated slave-select
//! pin. The SPI must already be initialised (it may serve other chips on
//! the same bus, so this driver never reprograms it); the constants below
//! describe the configuration the chip needs. Slave select is any
//! [`crate::hil::gpio::Pin`], on-chip or expander-backed.

use crate::hil::gpio::{Direction, Pin};
use crate::hil::spi::SpiMaster;
use crate::utilities::cells::TakeCell;

/// Highest SPI clock the chip supports.
pub const MAX_CLOCK_FREQUENCY: u32 = 33_000_000;
/// Clock idles low.
pub const CLOCK_POLARITY_ACTIVE_LOW: bool = false;
/// Data is captured on the first edge.
pub const CLOCK_PHASE_2ND_EDGE: bool = false;
/// Most significant bit first.
pub const LSB_FIRST: bool = false;

const COMMAND_READ_ID: u8 = 0x90;

/// One SST25LF020 behind its slave-select pin.
pub struct Sst25lf020<'a> {
    spi: &'a dyn SpiMaster<'a>,
    slave_select: &'a dyn Pin,
    tx_buffer: TakeCell<'a, [u8]>,
    rx_buffer: TakeCell<'a, [u8]>,
}

impl<'a> Sst25lf020<'a> {
    /// `tx_buffer` must hold at least 4 bytes and `rx_buffer` at least 2.
    /// The slave-select pin is made an output and deasserted.
    pub fn new(
        spi: &'a dyn SpiMaster<'a>,
        slave_select: &'a dyn Pin,
        tx_buffer: &'a mut [u8],
        rx_buffer: &'a mut [u8],
    ) -> Sst25lf020<'a> {
        slave_select.set_direction(Direction::Output);
        let flash = Sst25lf020 {
            spi,
            slave_select,
            tx_buffer: TakeCell::new(tx_buffer),
            rx_buffer: TakeCell::new(rx_buffer),
        };
        flash.deselect();
        flash
    }

    /// Assert slave select (active low).
    pub fn select(&self) {
        self.slave_select.clear();
    }

    /// Deassert slave select.
    pub fn deselect(&self) {
        self.slave_select.set();
    }

    fn wait_idle(&self) {
        while self.spi.is_busy() {}
    }

    fn reclaim_buffers(&self) {
        let (tx, rx) = self.spi.take_buffers();
        if let Some(buffer) = tx {
            self.tx_buffer.put(Some(buffer));
        }
        if let Some(buffer) = rx {
            self.rx_buffer.put(Some(buffer));
        }
    }

    /// Read the two-byte device identification: the read-ID command plus a
    /// zero address, then two clocked-in bytes, returned big-endian.
    pub fn read_id(&self) -> u16 {
        self.wait_idle();
        self.reclaim_buffers();

        if let Some(buffer) = self.tx_buffer.take() {
            buffer[..4].copy_from_slice(&[COMMAND_READ_ID, 0x00, 0x00, 0x00]);

            self.select();
            self.spi.transmit(buffer, 4);
            self.wait_idle();
            self.reclaim_buffers();

            if let Some(rx) = self.rx_buffer.take() {
                self.spi.receive(rx, 2);
                self.wait_idle();
                self.reclaim_buffers();
            }
            self.deselect();
        }

        self.rx_buffer
            .map_or(0, |buffer| ((buffer[0] as u16) << 8) | buffer[1] as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hil::gpio::{Level, PullMode};
    use core::cell::Cell;
    use std::boxed::Box;
    use std::cell::RefCell;
    use std::vec::Vec;

    struct FakeSpi<'a> {
        log: RefCell<Vec<Vec<u8>>>,
        rx_fill: [u8; 2],
        tx_store: TakeCell<'a, [u8]>,
        rx_store: TakeCell<'a, [u8]>,
    }

    impl<'a> FakeSpi<'a> {
        fn new(rx_fill: [u8; 2]) -> FakeSpi<'a> {
            FakeSpi {
                log: RefCell::new(Vec::new()),
                rx_fill,
                tx_store: TakeCell::empty(),
                rx_store: TakeCell::empty(),
            }
        }
    }

    impl<'a> SpiMaster<'a> for FakeSpi<'a> {
        fn is_busy(&self) -> bool {
            false
        }

        fn transmit(&self, tx_buffer: &'a mut [u8], length: u16) -> bool {
            self.log
                .borrow_mut()
                .push(tx_buffer[..length as usize].to_vec());
            self.tx_store.put(Some(tx_buffer));
            true
        }

        fn receive(&self, rx_buffer: &'a mut [u8], length: u16) -> bool {
            for (slot, value) in rx_buffer[..length as usize].iter_mut().zip(self.rx_fill) {
                *slot = value;
            }
            self.rx_store.put(Some(rx_buffer));
            true
        }

        fn transceive(
            &self,
            tx_buffer: &'a mut [u8],
            _rx_buffer: &'a mut [u8],
            length: u16,
        ) -> bool {
            self.transmit(tx_buffer, length)
        }

        fn take_buffers(&self) -> (Option<&'a mut [u8]>, Option<&'a mut [u8]>) {
            (self.tx_store.take(), self.rx_store.take())
        }
    }

    struct FakePin {
        level: Cell<Level>,
        output: Cell<bool>,
    }

    impl FakePin {
        fn new() -> FakePin {
            FakePin {
                level: Cell::new(Level::Low),
                output: Cell::new(false),
            }
        }
    }

    impl Pin for FakePin {
        fn set_direction(&self, direction: Direction) {
            self.output.set(direction == Direction::Output);
        }
        fn set_pull_mode(&self, _mode: PullMode) {}
        fn set_open_drain(&self, _open_drain: bool) {}
        fn set(&self) {
            self.level.set(Level::High);
        }
        fn clear(&self) {
            self.level.set(Level::Low);
        }
        fn write(&self, level: Level) {
            self.level.set(level);
        }
        fn read(&self) -> Level {
            self.level.get()
        }
    }

    #[test]
    fn read_id_frames_the_command_with_slave_select() {
        let spi = Box::leak(Box::new(FakeSpi::new([0xbf, 0x43])));
        let ss = Box::leak(Box::new(FakePin::new()));
        let tx = Box::leak(Box::new([0u8; 4]));
        let rx = Box::leak(Box::new([0u8; 2]));

        let flash = Sst25lf020::new(spi, ss, tx, rx);
        // Construction parks the select line high as an output.
        assert!(ss.output.get());
        assert_eq!(ss.level.get(), Level::High);

        assert_eq!(flash.read_id(), 0xbf43);
        assert_eq!(ss.level.get(), Level::High);
        assert_eq!(
            spi.log.borrow().as_slice(),
            &[std::vec![0x90, 0x00, 0x00, 0x00]]
        );
    }

    #[test]
    fn repeated_reads_reuse_the_buffers() {
        let spi = Box::leak(Box::new(FakeSpi::new([0x12, 0x34])));
        let ss = Box::leak(Box::new(FakePin::new()));
        let tx = Box::leak(Box::new([0u8; 4]));
        let rx = Box::leak(Box::new([0u8; 2]));

        let flash = Sst25lf020::new(spi, ss, tx, rx);
        assert_eq!(flash.read_id(), 0x1234);
        assert_eq!(flash.read_id(), 0x1234);
        assert_eq!(spi.log.borrow().len(), 2);
    }
}
