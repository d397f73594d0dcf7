// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall-clock time used in light schedules.

use std::fmt;

use crate::error::ValueError;

/// A time of day (hour and minute) in a device's light schedule.
///
/// Devices store schedule boundaries as two raw bytes, one for the hour
/// and one for the minute. This type validates both at construction so
/// encoded frames always carry values the device accepts.
///
/// # Examples
///
/// ```
/// use letpot_lib::types::ScheduleTime;
///
/// let start = ScheduleTime::new(7, 30).unwrap();
/// assert_eq!(start.hour(), 7);
/// assert_eq!(start.minute(), 30);
/// assert_eq!(start.to_string(), "07:30");
///
/// assert!(ScheduleTime::new(24, 0).is_err());
/// assert!(ScheduleTime::new(0, 60).is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ScheduleTime {
    hour: u8,
    minute: u8,
}

impl ScheduleTime {
    /// Creates a new schedule time.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidHour` if `hour > 23`, or
    /// `ValueError::InvalidMinute` if `minute > 59`.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValueError> {
        if hour > 23 {
            return Err(ValueError::InvalidHour(hour));
        }
        if minute > 59 {
            return Err(ValueError::InvalidMinute(minute));
        }
        Ok(Self { hour, minute })
    }

    /// Creates a schedule time from raw frame bytes, without validation.
    ///
    /// Decoded frames carry whatever the device sent; out-of-range bytes
    /// are preserved as-is so `raw` round-trips exactly.
    pub(crate) const fn from_raw(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// Returns the hour (0-23).
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Returns the minute (0-59).
    #[must_use]
    pub const fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}
