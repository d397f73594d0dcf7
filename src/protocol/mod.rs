// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker protocol plumbing: configuration, credentials, framing and the
//! connection state machine.

mod auth;
pub(crate) mod framer;

use std::time::Duration;

pub use auth::AuthInfo;
pub(crate) use auth::{broker_credentials, generate_client_id};

/// Default broker host.
const DEFAULT_HOST: &str = "broker.letpot.net";

/// Default broker port (MQTT over TLS websockets).
const DEFAULT_PORT: u16 = 443;

/// Default websocket path on the broker.
const DEFAULT_WEBSOCKET_PATH: &str = "/mqttwss";

/// Default delay before a reconnect attempt after session loss.
const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// How the TCP connection to the broker is wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerTransport {
    /// Plain TCP. Used for tests against a local broker.
    Tcp,
    /// MQTT over TLS websockets at the given path (production broker).
    TlsWebsocket {
        /// The websocket endpoint path, e.g. `/mqttwss`.
        path: String,
    },
}

/// Configuration for the broker connection.
///
/// The default targets the production LetPot broker; tests override the
/// endpoint to point at a local mock broker.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use letpot_lib::protocol::BrokerConfig;
///
/// let config = BrokerConfig::default().reconnect_backoff(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) transport: BrokerTransport,
    pub(crate) keep_alive: Duration,
    pub(crate) reconnect_backoff: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            transport: BrokerTransport::TlsWebsocket {
                path: DEFAULT_WEBSOCKET_PATH.to_string(),
            },
            keep_alive: Duration::from_secs(30),
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

impl BrokerConfig {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the transport wrapping.
    #[must_use]
    pub fn transport(mut self, transport: BrokerTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets the delay before reconnecting after session loss
    /// (default: 10 seconds).
    #[must_use]
    pub fn reconnect_backoff(mut self, duration: Duration) -> Self {
        self.reconnect_backoff = duration;
        self
    }
}

/// Lifecycle state of the shared broker session.
///
/// The session moves through these states as subscribers come and go:
/// `Idle` → `Connecting` → `Connected`, `Reconnecting` on unexpected
/// session loss, `Closing` → `Idle` when the last subscriber leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no subscribers.
    Idle,
    /// Session establishment in progress.
    Connecting,
    /// Session live; subscribed devices receive statuses.
    Connected,
    /// Session lost unexpectedly; waiting out the backoff before
    /// reconnecting with the full subscription set preserved.
    Reconnecting,
    /// Last subscriber removed; session teardown in progress.
    Closing,
}
