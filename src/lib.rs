// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `LetPot` Lib - A Rust library to control LetPot hydroponic gardens.
//!
//! This library speaks the device protocol of LetPot hydroponic gardens
//! through the vendor's MQTT broker: it decodes the binary status frames
//! devices publish and encodes the update frames that change settings.
//!
//! # Supported Features
//!
//! - **Status subscriptions**: Decoded device status via callbacks, with
//!   one shared broker session multiplexing any number of devices
//! - **Power and pump control**: System on/off, pump and light modes
//! - **Light control**: Daily schedule, discrete brightness levels
//! - **Settings**: Plant day counter, alarm sounds
//!
//! # Supported Devices
//!
//! Serials are matched on their 5-character type prefix:
//!
//! - LPH11 / LPH21 / LPH31 (Mini, Air, SE)
//! - IGS01, LPH27 / LPH37 / LPH39
//! - LPH60 / LPH61 / LPH62 (Senior)
//! - LPH63 (Max)
//!
//! # Quick Start
//!
//! ```no_run
//! use letpot_lib::{AuthInfo, DeviceClient};
//!
//! #[tokio::main]
//! async fn main() -> letpot_lib::Result<()> {
//!     // Credentials come from the LetPot cloud account.
//!     let auth = AuthInfo {
//!         user_id: "5f2...".to_string(),
//!         email: "garden@example.com".to_string(),
//!     };
//!     let client = DeviceClient::new(&auth);
//!
//!     // The first subscriber connects the shared broker session.
//!     let subscription = client
//!         .subscribe("LPH21ABCDEF", |status| {
//!             println!("on: {}, plant day {}", status.system_on, status.plant_days);
//!         })
//!         .await?;
//!
//!     // Updates re-publish the last decoded status with one field
//!     // changed, so they require a status to have arrived first.
//!     client.set_power("LPH21ABCDEF", true).await?;
//!     client.set_light_brightness("LPH21ABCDEF", 500).await?;
//!
//!     // The last unsubscribe closes the broker session.
//!     client.unsubscribe("LPH21ABCDEF", subscription).await;
//!     Ok(())
//! }
//! ```
//!
//! # Testing Against a Local Broker
//!
//! The broker endpoint is configurable, so tests can point the client at
//! a plain-TCP mock broker:
//!
//! ```no_run
//! use letpot_lib::protocol::{BrokerConfig, BrokerTransport};
//! use letpot_lib::{AuthInfo, DeviceClient};
//!
//! # let auth = AuthInfo { user_id: String::new(), email: String::new() };
//! let config = BrokerConfig::default()
//!     .host("127.0.0.1")
//!     .port(1883)
//!     .transport(BrokerTransport::Tcp);
//! let client = DeviceClient::with_config(&auth, config);
//! ```

mod client;
pub mod codec;
pub mod error;
pub mod protocol;
mod status;
pub mod subscription;
pub mod types;

pub use client::DeviceClient;
pub use codec::DeviceCodec;
pub use error::{Error, ProtocolError, Result, ValueError};
pub use protocol::{AuthInfo, BrokerConfig, BrokerTransport, ConnectionState};
pub use status::DeviceStatus;
pub use subscription::{StatusCallback, SubscriptionId};
pub use types::ScheduleTime;
