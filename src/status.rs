// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded device status snapshots.

use crate::types::ScheduleTime;

/// A decoded snapshot of a device's state.
///
/// Each successfully decoded status frame replaces the previous snapshot
/// wholesale; there is no per-field merging. Fields that a device family
/// does not report are `None`.
///
/// The `raw` field keeps the decoded byte sequence of the frame the
/// snapshot came from, which is useful when diagnosing traffic from
/// firmware revisions with undocumented fields.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceStatus {
    /// The decoded bytes of the status frame.
    pub raw: Vec<u8>,
    /// Light brightness (family-dependent; `None` if unsupported).
    pub light_brightness: Option<u16>,
    /// Light mode code.
    pub light_mode: u8,
    /// Start of the daily light schedule.
    pub light_schedule_start: ScheduleTime,
    /// End of the daily light schedule.
    pub light_schedule_end: ScheduleTime,
    /// Whether the device reports itself online.
    pub online: bool,
    /// Days since the plant counter was last reset.
    pub plant_days: u16,
    /// Pump mode code.
    pub pump_mode: u8,
    /// Whether the nutrient pump is active (`None` if unsupported).
    pub pump_nutrient: Option<bool>,
    /// Pump status code (`None` if unsupported).
    pub pump_status: Option<u8>,
    /// Whether the system is powered on.
    pub system_on: bool,
    /// Whether alarm sounds are enabled (`None` if unsupported).
    pub system_sound: Option<bool>,
    /// System state code.
    pub system_state: u8,
    /// Temperature unit code (`None` if unsupported).
    pub temperature_unit: Option<u8>,
    /// Temperature reading (`None` if unsupported).
    pub temperature_value: Option<u16>,
    /// Water level reading (`None` if unsupported).
    pub water_level: Option<u16>,
    /// Water mode code (`None` if unsupported).
    pub water_mode: Option<u8>,
}
