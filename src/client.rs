// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device client: one shared broker session multiplexing any number
//! of subscribed devices.
//!
//! A single MQTT session carries the status and command topics of every
//! subscribed device. A background task owns message reception; it is
//! the sole writer of last-known statuses and the sole invoker of
//! callbacks. Direct calls (`subscribe`, `unsubscribe`, updates)
//! serialize on one lock that guards the session handle and the
//! reference-count table as a unit.
//!
//! Session loss while devices are subscribed is recovered internally:
//! the client waits out a fixed backoff, reconnects, and re-establishes
//! the full subscription set. Callers only see transport errors from
//! their own direct calls.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::codec::{DeviceCodec, TYPE_PREFIX_LEN};
use crate::error::{Error, ProtocolError, Result, ValueError};
use crate::protocol::framer::{self, COMMAND_MAINTYPE, COMMAND_SUBTYPE};
use crate::protocol::{
    AuthInfo, BrokerConfig, BrokerTransport, ConnectionState, broker_credentials,
    generate_client_id,
};
use crate::status::DeviceStatus;
use crate::subscription::{DeviceSubscription, SubscriptionId};
use crate::types::ScheduleTime;

/// Capacity of the MQTT request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Returns the topic a device publishes status frames on.
fn status_topic(serial: &str) -> String {
    format!("{serial}/data")
}

/// Returns the topic a device receives command packets on.
fn command_topic(serial: &str) -> String {
    format!("{serial}/cmd")
}

/// Client for LetPot devices connected through the vendor's broker.
///
/// The client is cheaply cloneable (via `Arc`); clones share the broker
/// session, subscriptions and statuses.
///
/// # Examples
///
/// ```no_run
/// use letpot_lib::{AuthInfo, DeviceClient};
///
/// # async fn example() -> letpot_lib::Result<()> {
/// let auth = AuthInfo {
///     user_id: "5f2...".to_string(),
///     email: "garden@example.com".to_string(),
/// };
/// let client = DeviceClient::new(&auth);
///
/// // Statuses arrive on the callback as the device reports them.
/// let subscription = client
///     .subscribe("LPH21ABCDEF", |status| {
///         println!("pump mode: {}", status.pump_mode);
///     })
///     .await?;
///
/// // Updates re-publish the last decoded status with one field changed.
/// client.set_power("LPH21ABCDEF", true).await?;
///
/// client.unsubscribe("LPH21ABCDEF", subscription).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeviceClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: BrokerConfig,
    /// Broker username derived from the account email.
    username: String,
    /// Broker password derived from the user id and hashed username.
    password: String,
    /// Session handle and reference-count table, guarded as one unit.
    connection: Mutex<Connection>,
    /// Last decoded status per serial. Written only by the receive loop.
    statuses: parking_lot::RwLock<HashMap<String, DeviceStatus>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

#[derive(Default)]
struct Connection {
    session: Option<Session>,
    subscriptions: HashMap<String, DeviceSubscription>,
}

/// One live broker session.
struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
    /// Message id counter, scoped to this session instance.
    message_id: u8,
}

impl Session {
    fn next_message_id(&mut self) -> u8 {
        let id = self.message_id;
        self.message_id = self.message_id.wrapping_add(1);
        id
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(session) = self.connection.get_mut().session.take() {
            session.task.abort();
        }
    }
}

impl DeviceClient {
    /// Creates a client for the production LetPot broker.
    #[must_use]
    pub fn new(auth: &AuthInfo) -> Self {
        Self::with_config(auth, BrokerConfig::default())
    }

    /// Creates a client with a custom broker configuration.
    #[must_use]
    pub fn with_config(auth: &AuthInfo, config: BrokerConfig) -> Self {
        let (username, password) = broker_credentials(auth);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(ClientInner {
                config,
                username,
                password,
                connection: Mutex::new(Connection::default()),
                statuses: parking_lot::RwLock::new(HashMap::new()),
                state_tx,
                state_rx,
            }),
        }
    }

    /// Returns the current state of the shared broker session.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Returns a watcher over session state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Subscribes to decoded status updates for a device.
    ///
    /// The first subscriber overall establishes the broker session; a
    /// serial's first subscriber creates the transport subscription and
    /// requests an initial status. Later subscribers for the same serial
    /// share both and receive the same decoded statuses.
    ///
    /// Returns an id identifying this callback for [`unsubscribe`].
    ///
    /// [`unsubscribe`]: DeviceClient::unsubscribe
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDeviceType` if no codec matches the
    /// serial's 5-character type prefix.
    pub async fn subscribe<F>(&self, serial: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(DeviceStatus) + Send + Sync + 'static,
    {
        let codec = DeviceCodec::for_serial(serial)?;

        let mut conn = self.inner.connection.lock().await;
        if conn.session.is_none() {
            self.start_session(&mut conn);
        }

        let entry = conn
            .subscriptions
            .entry(serial.to_string())
            .or_insert_with(|| DeviceSubscription::new(codec));
        let (id, first) = entry.add(callback);
        tracing::debug!(serial, %id, first, "Registered status callback");

        // A serial's first subscriber attaches the device now if the
        // session is already live; otherwise the receive loop attaches
        // every pending device when the broker acknowledges the
        // connection.
        if first && self.connection_state() == ConnectionState::Connected {
            let Connection {
                session,
                subscriptions,
            } = &mut *conn;
            if let (Some(session), Some(subscription)) = (session, subscriptions.get_mut(serial)) {
                let message_id = session.next_message_id();
                match attach_device(&session.client, serial, codec, message_id).await {
                    Ok(()) => subscription.set_attached(true),
                    Err(e) => {
                        // The session is on its way down; the reconnect
                        // pass re-attaches this device.
                        tracing::warn!(serial, error = %e, "Failed to attach device to live session");
                    }
                }
            }
        }

        Ok(id)
    }

    /// Removes one callback registration for a device.
    ///
    /// The transport subscription is torn down when the serial's last
    /// reference is removed; the broker session itself is closed when no
    /// subscribed serial remains, and no callback fires after that
    /// teardown returns.
    ///
    /// Returns `true` if the id was registered for this serial.
    pub async fn unsubscribe(&self, serial: &str, id: SubscriptionId) -> bool {
        let mut conn = self.inner.connection.lock().await;
        let Some(subscription) = conn.subscriptions.get_mut(serial) else {
            return false;
        };
        let removed = subscription.remove(id);
        if !removed {
            return false;
        }
        tracing::debug!(serial, %id, "Removed status callback");

        if subscription.reference_count() == 0 {
            conn.subscriptions.remove(serial);
            self.inner.statuses.write().remove(serial);
            if let Some(session) = conn.session.as_ref() {
                if let Err(e) = session.client.unsubscribe(status_topic(serial)).await {
                    tracing::warn!(serial, error = %e, "Failed to unsubscribe from status topic");
                }
            }
            tracing::debug!(serial, "Released transport subscription");

            if conn.subscriptions.is_empty() {
                self.close_session(&mut conn).await;
            }
        }

        true
    }

    /// Publishes a fresh status request for a device.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDeviceType` for unknown serials and
    /// `Error::NotConnected` without a live session.
    pub async fn request_status_update(&self, serial: &str) -> Result<()> {
        let codec = DeviceCodec::for_serial(serial)?;
        self.publish_command(serial, &codec.status_request()).await
    }

    /// Returns the last decoded status for a device, if any arrived.
    #[must_use]
    pub fn last_status(&self, serial: &str) -> Option<DeviceStatus> {
        self.inner.statuses.read().get(serial).cloned()
    }

    /// Returns the light brightness levels a device accepts, empty if
    /// its family has no adjustable brightness.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDeviceType` for unknown serials.
    pub fn light_brightness_levels(&self, serial: &str) -> Result<&'static [u16]> {
        let codec = DeviceCodec::for_serial(serial)?;
        Ok(codec.brightness_levels(&serial[..TYPE_PREFIX_LEN]))
    }

    /// Returns the marketing model name for a device, if known.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDeviceType` for unknown serials.
    pub fn device_model(&self, serial: &str) -> Result<Option<&'static str>> {
        let codec = DeviceCodec::for_serial(serial)?;
        Ok(codec.model_name(&serial[..TYPE_PREFIX_LEN]))
    }

    /// Number of serials with at least one subscriber.
    pub async fn subscription_count(&self) -> usize {
        self.inner.connection.lock().await.subscriptions.len()
    }

    /// Current reference count for one serial.
    pub async fn reference_count(&self, serial: &str) -> usize {
        self.inner
            .connection
            .lock()
            .await
            .subscriptions
            .get(serial)
            .map_or(0, DeviceSubscription::reference_count)
    }

    // =========================================================================
    // Update operations
    // =========================================================================
    //
    // Each update re-encodes the device's last decoded status with one
    // field changed and publishes the full frame. They are rejected
    // without a prior decoded status or a live session, and are never
    // queued or retried.

    /// Turns the device on or off.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoStatus` before the first decoded status and
    /// `Error::NotConnected` without a live session.
    pub async fn set_power(&self, serial: &str, on: bool) -> Result<()> {
        self.send_update(serial, |status| status.system_on = on)
            .await
    }

    /// Sets the pump mode code.
    ///
    /// # Errors
    ///
    /// See [`set_power`](DeviceClient::set_power).
    pub async fn set_pump_mode(&self, serial: &str, mode: u8) -> Result<()> {
        self.send_update(serial, |status| status.pump_mode = mode)
            .await
    }

    /// Sets the light mode code.
    ///
    /// # Errors
    ///
    /// See [`set_power`](DeviceClient::set_power).
    pub async fn set_light_mode(&self, serial: &str, mode: u8) -> Result<()> {
        self.send_update(serial, |status| status.light_mode = mode)
            .await
    }

    /// Sets the daily light schedule.
    ///
    /// # Errors
    ///
    /// See [`set_power`](DeviceClient::set_power).
    pub async fn set_light_schedule(
        &self,
        serial: &str,
        start: ScheduleTime,
        end: ScheduleTime,
    ) -> Result<()> {
        self.send_update(serial, |status| {
            status.light_schedule_start = start;
            status.light_schedule_end = end;
        })
        .await
    }

    /// Sets the light brightness to one of the device's levels.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::UnsupportedBrightness` if the level is not
    /// in the family's level set; otherwise see
    /// [`set_power`](DeviceClient::set_power).
    pub async fn set_light_brightness(&self, serial: &str, level: u16) -> Result<()> {
        if !self.light_brightness_levels(serial)?.contains(&level) {
            return Err(ValueError::UnsupportedBrightness(level).into());
        }
        self.send_update(serial, |status| status.light_brightness = Some(level))
            .await
    }

    /// Sets the plant day counter.
    ///
    /// # Errors
    ///
    /// See [`set_power`](DeviceClient::set_power).
    pub async fn set_plant_days(&self, serial: &str, days: u16) -> Result<()> {
        self.send_update(serial, |status| status.plant_days = days)
            .await
    }

    /// Enables or disables alarm sounds.
    ///
    /// # Errors
    ///
    /// See [`set_power`](DeviceClient::set_power).
    pub async fn set_sound(&self, serial: &str, enabled: bool) -> Result<()> {
        self.send_update(serial, |status| status.system_sound = Some(enabled))
            .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Spawns a broker session and its receive loop.
    fn start_session(&self, conn: &mut Connection) {
        let config = &self.inner.config;
        let client_id = generate_client_id();

        let mut options = match &config.transport {
            BrokerTransport::Tcp => {
                MqttOptions::new(&client_id, config.host.clone(), config.port)
            }
            BrokerTransport::TlsWebsocket { path } => {
                let url = format!("wss://{}:{}{path}", config.host, config.port);
                let mut options = MqttOptions::new(&client_id, url, config.port);
                options.set_transport(Transport::wss_with_default_config());
                options
            }
        };
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(self.inner.username.clone(), self.inner.password.clone());

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        self.inner.state_tx.send_replace(ConnectionState::Connecting);
        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %client_id,
            "Connecting to LetPot broker"
        );

        let handle = Arc::downgrade(&self.inner);
        let backoff = config.reconnect_backoff;
        let task = tokio::spawn(async move {
            run_receive_loop(event_loop, handle, backoff).await;
        });

        conn.session = Some(Session {
            client,
            task,
            message_id: 0,
        });
    }

    /// Tears down the session after the last subscriber is gone.
    ///
    /// The receive task is cancelled and awaited before the session is
    /// dropped, so no callback fires once this returns.
    async fn close_session(&self, conn: &mut Connection) {
        let Some(session) = conn.session.take() else {
            return;
        };
        self.inner.state_tx.send_replace(ConnectionState::Closing);
        tracing::info!("Last subscriber removed, closing broker session");

        session.task.abort();
        let _ = session.task.await;
        let _ = session.client.disconnect().await;

        self.inner.state_tx.send_replace(ConnectionState::Idle);
    }

    /// Frames a command and publishes its packets in order.
    ///
    /// Fails immediately without a live session; commands are never
    /// queued.
    async fn publish_command(&self, serial: &str, message: &[u8]) -> Result<()> {
        let mut conn = self.inner.connection.lock().await;
        if self.connection_state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let session = conn.session.as_mut().ok_or(Error::NotConnected)?;
        let message_id = session.next_message_id();
        publish_packets(&session.client, serial, message_id, message)
            .await
            .map_err(Error::Protocol)
    }

    /// Applies one field change to the last decoded status and
    /// republishes the full frame.
    async fn send_update(
        &self,
        serial: &str,
        mutate: impl FnOnce(&mut DeviceStatus),
    ) -> Result<()> {
        let mut status = self
            .last_status(serial)
            .ok_or_else(|| Error::NoStatus(serial.to_string()))?;
        mutate(&mut status);

        let mut conn = self.inner.connection.lock().await;
        if self.connection_state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let Connection {
            session,
            subscriptions,
        } = &mut *conn;
        let subscription = subscriptions
            .get(serial)
            .ok_or_else(|| Error::NoStatus(serial.to_string()))?;
        let session = session.as_mut().ok_or(Error::NotConnected)?;

        let message = subscription.codec.encode_update(&status);
        let message_id = session.next_message_id();
        publish_packets(&session.client, serial, message_id, &message)
            .await
            .map_err(Error::Protocol)
    }
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("host", &self.inner.config.host)
            .field("state", &self.connection_state())
            .finish()
    }
}

/// Subscribes a device's status topic and requests its current status.
async fn attach_device(
    client: &AsyncClient,
    serial: &str,
    codec: DeviceCodec,
    message_id: u8,
) -> std::result::Result<(), ProtocolError> {
    client
        .subscribe(status_topic(serial), QoS::AtLeastOnce)
        .await
        .map_err(ProtocolError::Mqtt)?;
    tracing::debug!(serial, "Subscribed to status topic");
    publish_packets(client, serial, message_id, &codec.status_request()).await
}

/// Publishes the framed packets of one command in order.
async fn publish_packets(
    client: &AsyncClient,
    serial: &str,
    message_id: u8,
    message: &[u8],
) -> std::result::Result<(), ProtocolError> {
    let topic = command_topic(serial);
    for packet in framer::build_packets(COMMAND_MAINTYPE, COMMAND_SUBTYPE, message_id, message) {
        tracing::debug!(serial, message_id, payload = %packet, "Publishing command packet");
        client
            .publish(topic.clone(), QoS::AtLeastOnce, false, packet)
            .await
            .map_err(ProtocolError::Mqtt)?;
    }
    Ok(())
}

/// The background receive loop.
///
/// Owns the MQTT event loop for one session. On connection it attaches
/// every desired device; on transport errors it waits out the backoff
/// and lets the next poll reconnect, keeping the subscription set. The
/// loop exits when the client is dropped or the task is cancelled at
/// teardown.
async fn run_receive_loop(
    mut event_loop: EventLoop,
    handle: Weak<ClientInner>,
    backoff: Duration,
) {
    loop {
        let event = event_loop.poll().await;
        let Some(inner) = handle.upgrade() else {
            return;
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::debug!(?ack, "Broker session established");
                inner.state_tx.send_replace(ConnectionState::Connected);
                attach_all(&inner).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&inner, &publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backoff_secs = backoff.as_secs_f64(),
                    "Broker session lost, reconnecting after backoff"
                );
                inner.state_tx.send_replace(ConnectionState::Reconnecting);
                // The next session starts with no transport
                // subscriptions; every serial must re-attach.
                {
                    let mut conn = inner.connection.lock().await;
                    for subscription in conn.subscriptions.values_mut() {
                        subscription.set_attached(false);
                    }
                }
                drop(inner);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Attaches every device not yet attached on the current session.
///
/// A serial whose first subscriber arrived after the connection came up
/// was already attached inline by `subscribe` and is skipped here.
async fn attach_all(inner: &Arc<ClientInner>) {
    let mut conn = inner.connection.lock().await;
    let Connection {
        session,
        subscriptions,
    } = &mut *conn;
    let Some(session) = session else {
        return;
    };
    for (serial, subscription) in subscriptions.iter_mut() {
        if subscription.is_attached() {
            continue;
        }
        let message_id = session.next_message_id();
        match attach_device(&session.client, serial, subscription.codec, message_id).await {
            Ok(()) => subscription.set_attached(true),
            Err(e) => {
                tracing::warn!(serial = %serial, error = %e, "Failed to attach device after connect");
            }
        }
    }
}

/// Routes one inbound message: match the serial from the status topic,
/// decode with its bound codec, replace the stored status and fan out
/// to callbacks. Undecodable frames are dropped silently.
async fn dispatch(inner: &Arc<ClientInner>, topic: &str, payload: &[u8]) {
    let Some(serial) = topic.strip_suffix("/data") else {
        tracing::trace!(topic, "Ignoring message on foreign topic");
        return;
    };

    let (status, callbacks) = {
        let conn = inner.connection.lock().await;
        let Some(subscription) = conn.subscriptions.get(serial) else {
            tracing::trace!(serial, "No subscription for status topic");
            return;
        };
        let Some(status) = subscription.codec.decode(payload) else {
            tracing::debug!(serial, "Ignoring frame that is not a status response");
            return;
        };
        (status, subscription.callbacks())
    };

    tracing::debug!(serial, online = status.online, "Decoded device status");
    inner
        .statuses
        .write()
        .insert(serial.to_string(), status.clone());
    // Callbacks run outside the connection lock so they may call back
    // into the client.
    for callback in callbacks {
        callback(status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> DeviceClient {
        let auth = AuthInfo {
            user_id: "user".to_string(),
            email: "test@example.com".to_string(),
        };
        DeviceClient::new(&auth)
    }

    #[test]
    fn topics_follow_wire_contract() {
        assert_eq!(status_topic("LPH21ABCD"), "LPH21ABCD/data");
        assert_eq!(command_topic("LPH21ABCD"), "LPH21ABCD/cmd");
    }

    #[test]
    fn new_client_is_idle() {
        let client = test_client();
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn subscribe_rejects_unknown_device_type() {
        let client = test_client();
        let result = client.subscribe("TEST1ABCD", |_| {}).await;
        assert!(matches!(result, Err(Error::UnsupportedDeviceType(_))));
        // A rejected subscribe must not have started a session.
        assert_eq!(client.connection_state(), ConnectionState::Idle);
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn update_before_any_decode_is_rejected() {
        let client = test_client();
        let result = client.set_power("LPH21ABCD", true).await;
        assert!(matches!(result, Err(Error::NoStatus(_))));
    }

    #[tokio::test]
    async fn request_status_without_session_is_rejected() {
        let client = test_client();
        let result = client.request_status_update("LPH21ABCD").await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn brightness_level_validation_precedes_state_checks() {
        let client = test_client();
        // LPH21 supports only 500 and 1000.
        let result = client.set_light_brightness("LPH21ABCD", 300).await;
        assert!(matches!(
            result,
            Err(Error::Value(ValueError::UnsupportedBrightness(300)))
        ));
    }

    #[test]
    fn brightness_levels_by_serial() {
        let client = test_client();
        assert_eq!(
            client.light_brightness_levels("LPH21ABCD").unwrap(),
            &[500, 1000]
        );
        assert!(client
            .light_brightness_levels("IGS01ABCD")
            .unwrap()
            .is_empty());
        assert!(client.light_brightness_levels("TEST1ABCD").is_err());
    }

    #[test]
    fn device_model_by_serial() {
        let client = test_client();
        assert_eq!(
            client.device_model("LPH21ABCD").unwrap(),
            Some("LetPot Air")
        );
        assert_eq!(
            client.device_model("LPH63ABCD").unwrap(),
            Some("LetPot Max")
        );
    }

    #[tokio::test]
    async fn unsubscribe_unknown_serial_is_a_noop() {
        let client = test_client();
        let removed = client
            .unsubscribe("LPH21ABCD", SubscriptionId::next())
            .await;
        assert!(!removed);
    }

    #[tokio::test]
    async fn session_message_id_wraps() {
        let (client, _event_loop) =
            AsyncClient::new(MqttOptions::new("test", "127.0.0.1", 1883), 1);
        let mut session = Session {
            client,
            task: tokio::spawn(async {}),
            message_id: 254,
        };
        assert_eq!(session.next_message_id(), 254);
        assert_eq!(session.next_message_id(), 255);
        assert_eq!(session.next_message_id(), 0);
        assert_eq!(session.next_message_id(), 1);
    }
}
