// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Codec for the LPH11 (Mini), LPH21 (Air) and LPH31 (SE) family.
//!
//! This layout carries brightness, pump status and alarm sound, but no
//! water level or temperature fields.

use crate::status::DeviceStatus;
use crate::types::ScheduleTime;

use super::{push_u16, read_u16};

pub(super) const DEVICE_TYPES: &[&str] = &["LPH11", "LPH21", "LPH31"];

pub(super) const STATUS_REQUEST: [u8; 2] = [97, 1];

/// Opcode and subtype of a "set status" command.
const UPDATE_OPCODE: [u8; 2] = [97, 2];

/// Opcode and subtype of a status response, at frame indices 4 and 5.
const RESPONSE_OPCODE: [u8; 2] = [98, 1];

/// Highest byte index read during decode, plus one.
const MIN_FRAME_LEN: usize = 21;

pub(super) fn model_name(device_type: &str) -> Option<&'static str> {
    match device_type {
        "LPH11" => Some("LetPot Mini"),
        "LPH21" => Some("LetPot Air"),
        "LPH31" => Some("LetPot SE"),
        _ => None,
    }
}

pub(super) fn brightness_levels(device_type: &str) -> &'static [u16] {
    if matches!(device_type, "LPH21" | "LPH31") {
        &[500, 1000]
    } else {
        &[]
    }
}

pub(super) fn decode(data: &[u8]) -> Option<DeviceStatus> {
    if data.len() < MIN_FRAME_LEN || data[4..6] != RESPONSE_OPCODE {
        return None;
    }

    Some(DeviceStatus {
        raw: data.to_vec(),
        light_brightness: Some(read_u16(data, 17)),
        light_mode: data[10],
        light_schedule_end: ScheduleTime::from_raw(data[15], data[16]),
        light_schedule_start: ScheduleTime::from_raw(data[13], data[14]),
        online: data[6] == 0,
        plant_days: read_u16(data, 11),
        pump_mode: data[9],
        pump_nutrient: None,
        pump_status: Some(data[19]),
        system_on: data[8] == 1,
        system_sound: Some(data[20] == 1),
        system_state: data[7],
        temperature_unit: None,
        temperature_value: None,
        water_level: None,
        water_mode: None,
    })
}

pub(super) fn encode_update(status: &DeviceStatus) -> Vec<u8> {
    let mut message = vec![
        UPDATE_OPCODE[0],
        UPDATE_OPCODE[1],
        u8::from(status.system_on),
        status.pump_mode,
        status.light_mode,
    ];
    push_u16(&mut message, status.plant_days);
    message.extend_from_slice(&[
        status.light_schedule_start.hour(),
        status.light_schedule_start.minute(),
        status.light_schedule_end.hour(),
        status.light_schedule_end.minute(),
    ]);
    push_u16(&mut message, status.light_brightness.unwrap_or_default());
    message.push(u8::from(status.system_sound == Some(true)));
    message
}
