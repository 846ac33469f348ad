// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright LPC176x Driver Contributors 2024.

//! Standard errors.

/// Standard errors returned by operations that report failure.
///
/// Most driver entry points follow the hardware-facing convention of this
/// crate instead: out-of-range parameters are silent no-ops and busy
/// rejection is a `false` return. `ErrorCode` is reserved for the few
/// operations where the caller can meaningfully react, such as observer
/// registration running out of slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    /// Generic failure condition
    FAIL,
    /// Underlying system is busy; retry
    BUSY,
    /// An invalid parameter was passed
    INVAL,
    /// No memory (or table slot) available
    NOMEM,
}
