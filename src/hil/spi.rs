// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Interface for a SPI master.

/// A non-blocking SPI controller, one 8-bit frame per interrupt.
///
/// Chip select is not part of this interface: device drivers own their slave
/// select line as a [`crate::hil::gpio::Pin`] and frame transfers themselves.
/// Completion is observed by polling [`SpiMaster::is_busy`]; buffers are
/// reclaimed with [`SpiMaster::take_buffers`].
pub trait SpiMaster<'a> {
    fn is_busy(&self) -> bool;

    /// Shift out `length` bytes, discarding whatever is shifted in.
    /// Returns false if busy; a zero-length transfer succeeds immediately.
    fn transmit(&self, tx_buffer: &'a mut [u8], length: u16) -> bool;

    /// Shift in `length` bytes while shifting out zeroes.
    fn receive(&self, rx_buffer: &'a mut [u8], length: u16) -> bool;

    /// Full-duplex transfer of `length` bytes.
    fn transceive(&self, tx_buffer: &'a mut [u8], rx_buffer: &'a mut [u8], length: u16) -> bool;

    /// Reclaim the buffers from the most recent transfer. Only meaningful
    /// once `is_busy()` reports false.
    #[allow(clippy::type_complexity)]
    fn take_buffers(&self) -> (Option<&'a mut [u8]>, Option<&'a mut [u8]>);
}
