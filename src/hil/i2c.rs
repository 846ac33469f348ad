// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Interface for an I²C master.

/// A non-blocking single-master I²C controller.
///
/// A transfer is a combined write-then-read transaction: the tx phase (if
/// any) fully precedes the rx phase, with a repeated START between them.
/// Completion is observed by polling [`I2cMaster::is_busy`]; the buffers
/// handed to [`I2cMaster::start_transfer`] stay parked in the driver until
/// reclaimed with [`I2cMaster::take_buffers`].
pub trait I2cMaster<'a> {
    /// True while a transfer is in flight or the bus is not idle.
    fn is_busy(&self) -> bool;

    /// Start a combined write/read transfer to the 7-bit address
    /// `slave_address` (already shifted to wire format; the R/W bit is
    /// ignored). Returns false if the controller is busy, true otherwise. A
    /// transfer with both lengths zero succeeds without touching the bus.
    fn start_transfer(
        &self,
        slave_address: u8,
        tx_buffer: Option<&'a mut [u8]>,
        tx_length: u8,
        rx_buffer: Option<&'a mut [u8]>,
        rx_length: u8,
    ) -> bool;

    /// Reclaim the buffers from the most recent transfer. Only meaningful
    /// once `is_busy()` reports false.
    #[allow(clippy::type_complexity)]
    fn take_buffers(&self) -> (Option<&'a mut [u8]>, Option<&'a mut [u8]>);
}
