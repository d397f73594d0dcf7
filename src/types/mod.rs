// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for LetPot device control.
//!
//! Values that cross the wire as raw bytes get validating wrappers here,
//! so malformed values are rejected at construction rather than encoded
//! into a frame the device silently misinterprets.

mod schedule;

pub use schedule::ScheduleTime;
