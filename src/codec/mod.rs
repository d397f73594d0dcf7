// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-family status frame codecs.
//!
//! LetPot ships four hardware lines with incompatible binary status
//! layouts. Each family is one variant of [`DeviceCodec`]; the variant is
//! selected once per device from the serial number prefix and never
//! re-dispatched per message.
//!
//! All frames travel as ASCII-hex over MQTT (two hex characters per
//! byte). A status response carries its opcode and subtype at byte
//! indices 4 and 5; anything else on the topic is third-party or
//! malformed traffic and decodes to `None` rather than an error.
//!
//! 16-bit fields (brightness, plant days, temperature, water level) are
//! two bytes, most significant first.

mod igs;
mod lph_6x;
mod lph_63;
mod lph_x1;

use crate::error::Error;
use crate::status::DeviceStatus;

/// The number of serial characters that select the device family.
pub const TYPE_PREFIX_LEN: usize = 5;

/// Codec for one device family.
///
/// Selected via [`DeviceCodec::for_serial`] and bound to the device for
/// the lifetime of its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodec {
    /// LPH11 (Mini), LPH21 (Air), LPH31 (SE).
    LphX1,
    /// IGS01 (Pro), LPH27, LPH37 (SE), LPH39 (Mini).
    IgsAlt,
    /// LPH60, LPH61, LPH62 (Max).
    Lph6x,
    /// LPH63 (Max).
    Lph63,
}

/// Ordered predicate list; the first matching codec wins.
const CODECS: [DeviceCodec; 4] = [
    DeviceCodec::LphX1,
    DeviceCodec::IgsAlt,
    DeviceCodec::Lph6x,
    DeviceCodec::Lph63,
];

impl DeviceCodec {
    /// Resolves the codec for a device serial number.
    ///
    /// The first five characters of the serial select the family.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDeviceType` if no family matches.
    pub fn for_serial(serial: &str) -> Result<Self, Error> {
        serial
            .get(..TYPE_PREFIX_LEN)
            .and_then(|prefix| CODECS.into_iter().find(|codec| codec.supports(prefix)))
            .ok_or_else(|| Error::UnsupportedDeviceType(serial.to_string()))
    }

    /// Returns whether this codec handles the given device type prefix.
    #[must_use]
    pub fn supports(&self, device_type: &str) -> bool {
        self.device_types().contains(&device_type)
    }

    /// Returns the device type prefixes this codec handles.
    #[must_use]
    pub fn device_types(&self) -> &'static [&'static str] {
        match self {
            Self::LphX1 => lph_x1::DEVICE_TYPES,
            Self::IgsAlt => igs::DEVICE_TYPES,
            Self::Lph6x => lph_6x::DEVICE_TYPES,
            Self::Lph63 => lph_63::DEVICE_TYPES,
        }
    }

    /// Returns the marketing model name for a device type prefix, if known.
    #[must_use]
    pub fn model_name(&self, device_type: &str) -> Option<&'static str> {
        match self {
            Self::LphX1 => lph_x1::model_name(device_type),
            Self::IgsAlt => igs::model_name(device_type),
            Self::Lph6x => lph_6x::model_name(device_type),
            Self::Lph63 => lph_63::model_name(device_type),
        }
    }

    /// Returns the command bytes that request the current device status.
    #[must_use]
    pub fn status_request(&self) -> Vec<u8> {
        match self {
            Self::LphX1 => lph_x1::STATUS_REQUEST.to_vec(),
            Self::IgsAlt => igs::STATUS_REQUEST.to_vec(),
            Self::Lph6x => lph_6x::STATUS_REQUEST.to_vec(),
            Self::Lph63 => lph_63::STATUS_REQUEST.to_vec(),
        }
    }

    /// Decodes an ASCII-hex status frame into a [`DeviceStatus`].
    ///
    /// Returns `None` for anything that is not a status response of this
    /// family: malformed hex, truncated frames, or an opcode/subtype
    /// mismatch at indices 4 and 5. This is a sentinel, not an error;
    /// the dispatch pipeline drops such frames silently.
    #[must_use]
    pub fn decode(&self, hex_frame: &[u8]) -> Option<DeviceStatus> {
        let data = decode_hex(hex_frame)?;
        match self {
            Self::LphX1 => lph_x1::decode(&data),
            Self::IgsAlt => igs::decode(&data),
            Self::Lph6x => lph_6x::decode(&data),
            Self::Lph63 => lph_63::decode(&data),
        }
    }

    /// Encodes a "set status" command carrying every field this family
    /// supports, in the same fixed order decode reads them.
    #[must_use]
    pub fn encode_update(&self, status: &DeviceStatus) -> Vec<u8> {
        match self {
            Self::LphX1 => lph_x1::encode_update(status),
            Self::IgsAlt => igs::encode_update(status),
            Self::Lph6x => lph_6x::encode_update(status),
            Self::Lph63 => lph_63::encode_update(status),
        }
    }

    /// Returns the ordered light brightness levels the device accepts,
    /// empty if the device type has no adjustable brightness.
    #[must_use]
    pub fn brightness_levels(&self, device_type: &str) -> &'static [u16] {
        match self {
            Self::LphX1 => lph_x1::brightness_levels(device_type),
            Self::IgsAlt => igs::brightness_levels(device_type),
            Self::Lph6x => lph_6x::brightness_levels(device_type),
            Self::Lph63 => lph_63::brightness_levels(device_type),
        }
    }
}

/// Converts an ASCII-hex payload to raw bytes, `None` if malformed.
fn decode_hex(payload: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(payload).ok()?;
    hex::decode(text).ok()
}

/// Reads a big-endian 16-bit field at `index`.
fn read_u16(data: &[u8], index: usize) -> u16 {
    256 * u16::from(data[index]) + u16::from(data[index + 1])
}

/// Appends a 16-bit field, most significant byte first.
#[allow(clippy::cast_possible_truncation)]
fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.push((value / 256) as u8);
    out.push((value % 256) as u8);
}
