// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `LetPot` library.
//!
//! Failures fall into two groups: those surfaced to callers (unsupported
//! device types, rejected update calls, transport errors on direct calls)
//! and those recovered internally (malformed broker traffic, connection
//! loss while subscribed). Only the first group appears here; the second
//! is handled by the decode sentinel and the reconnect state machine.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during broker communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No codec matches the device's serial number prefix.
    #[error("unsupported device type: {0}")]
    UnsupportedDeviceType(String),

    /// An update was requested before any status was decoded for the device.
    #[error("no status received yet for device {0}")]
    NoStatus(String),

    /// The operation requires a live broker session.
    #[error("not connected to the broker")]
    NotConnected,
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// An hour value is outside the valid range (0-23).
    #[error("hour value {0} is out of range [0, 23]")]
    InvalidHour(u8),

    /// A minute value is outside the valid range (0-59).
    #[error("minute value {0} is out of range [0, 59]")]
    InvalidMinute(u8),

    /// A brightness value is not one of the levels the device supports.
    #[error("brightness level {0} is not supported by this device")]
    UnsupportedBrightness(u16),
}

/// Errors related to broker communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT connection or communication failed.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
