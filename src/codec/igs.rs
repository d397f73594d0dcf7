// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Codec for the IGS01 (Pro), LPH27, LPH37 (SE) and LPH39 (Mini) family.
//!
//! The smallest layout: no brightness, water, temperature or pump status
//! fields; the alarm sound flag directly follows the light schedule.

use crate::status::DeviceStatus;
use crate::types::ScheduleTime;

use super::read_u16;

pub(super) const DEVICE_TYPES: &[&str] = &["IGS01", "LPH27", "LPH37", "LPH39"];

pub(super) const STATUS_REQUEST: [u8; 2] = [11, 1];

const UPDATE_OPCODE: [u8; 2] = [11, 2];

const RESPONSE_OPCODE: [u8; 2] = [12, 1];

const MIN_FRAME_LEN: usize = 18;

pub(super) fn model_name(device_type: &str) -> Option<&'static str> {
    match device_type {
        "IGS01" => Some("LetPot Pro"),
        "LPH27" | "LPH37" => Some("LetPot SE"),
        "LPH39" => Some("LetPot Mini"),
        _ => None,
    }
}

pub(super) fn brightness_levels(_device_type: &str) -> &'static [u16] {
    &[]
}

pub(super) fn decode(data: &[u8]) -> Option<DeviceStatus> {
    if data.len() < MIN_FRAME_LEN || data[4..6] != RESPONSE_OPCODE {
        return None;
    }

    Some(DeviceStatus {
        raw: data.to_vec(),
        light_brightness: None,
        light_mode: data[10],
        light_schedule_end: ScheduleTime::from_raw(data[15], data[16]),
        light_schedule_start: ScheduleTime::from_raw(data[13], data[14]),
        online: data[6] == 0,
        plant_days: read_u16(data, 11),
        pump_mode: data[9],
        pump_nutrient: None,
        pump_status: None,
        system_on: data[8] == 1,
        system_sound: Some(data[17] == 1),
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
    super::push_u16(&mut message, status.plant_days);
    message.extend_from_slice(&[
        status.light_schedule_start.hour(),
        status.light_schedule_start.minute(),
        status.light_schedule_end.hour(),
        status.light_schedule_end.minute(),
        u8::from(status.system_sound == Some(true)),
    ]);
    message
}
