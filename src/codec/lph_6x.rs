// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Codec for the LPH60, LPH61 and LPH62 (Max) family.
//!
//! The widest layout: water mode and level, temperature with unit,
//! alarm sound and the nutrient pump flag.

use crate::status::DeviceStatus;
use crate::types::ScheduleTime;

use super::{push_u16, read_u16};

pub(super) const DEVICE_TYPES: &[&str] = &["LPH60", "LPH61", "LPH62"];

pub(super) const STATUS_REQUEST: [u8; 2] = [13, 1];

const UPDATE_OPCODE: [u8; 2] = [13, 2];

const RESPONSE_OPCODE: [u8; 2] = [14, 1];

const MIN_FRAME_LEN: usize = 27;

const BRIGHTNESS_LEVELS: [u16; 9] = [0, 125, 250, 375, 500, 625, 750, 875, 1000];

pub(super) fn model_name(device_type: &str) -> Option<&'static str> {
    match device_type {
        "LPH60" | "LPH61" | "LPH62" => Some("LetPot Max"),
        _ => None,
    }
}

pub(super) fn brightness_levels(_device_type: &str) -> &'static [u16] {
    &BRIGHTNESS_LEVELS
}

pub(super) fn decode(data: &[u8]) -> Option<DeviceStatus> {
    if data.len() < MIN_FRAME_LEN || data[4..6] != RESPONSE_OPCODE {
        return None;
    }

    Some(DeviceStatus {
        raw: data.to_vec(),
        light_brightness: Some(read_u16(data, 18)),
        light_mode: data[10],
        light_schedule_end: ScheduleTime::from_raw(data[15], data[16]),
        light_schedule_start: ScheduleTime::from_raw(data[13], data[14]),
        online: data[6] == 0,
        plant_days: read_u16(data, 11),
        pump_mode: data[9],
        pump_nutrient: Some(data[26] == 1),
        pump_status: None,
        system_on: data[8] == 1,
        system_sound: Some(data[25] == 1),
        system_state: data[7],
        temperature_unit: Some(data[24]),
        temperature_value: Some(read_u16(data, 22)),
        water_level: Some(read_u16(data, 20)),
        water_mode: Some(data[17]),
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
        status.water_mode.unwrap_or_default(),
    ]);
    push_u16(&mut message, status.light_brightness.unwrap_or_default());
    message.extend_from_slice(&[
        status.temperature_unit.unwrap_or_default(),
        u8::from(status.system_sound == Some(true)),
        u8::from(status.pump_nutrient == Some(true)),
    ]);
    message
}
