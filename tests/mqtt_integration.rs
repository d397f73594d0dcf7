// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the broker session using mockforge-mqtt.

use std::time::Duration;

use letpot_lib::protocol::{BrokerConfig, BrokerTransport};
use letpot_lib::{AuthInfo, ConnectionState, DeviceClient, DeviceStatus, Error};
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::server::start_mqtt_server_with_session_manager;
use mockforge_mqtt::{MqttMetrics, SessionManager};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// An LPH21 (Air family) status response: online, on, pump and light
/// mode 1, schedule 07:30-17:00, brightness 500, sound off.
const LPH21_STATUS_FRAME: &str = "4d000112620100010101010000071e110001f4000000";

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(19850);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
///
/// Returns the broker task so tests can abort it to simulate an outage.
async fn start_mock_broker(port: u16) -> tokio::task::JoinHandle<()> {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    // The broker serves each connection from a detached task, so
    // aborting the accept loop alone would leave live sessions running
    // and connected clients would never notice the "outage". A drop
    // guard inside the broker task force-disconnects every client when
    // the task is aborted, closing their sockets like a real outage.
    let metrics = std::sync::Arc::new(MqttMetrics::new());
    let session_manager = std::sync::Arc::new(SessionManager::new(
        config.max_connections,
        Some(metrics.clone()),
    ));

    struct DisconnectOnAbort(std::sync::Arc<SessionManager>);
    impl Drop for DisconnectOnAbort {
        fn drop(&mut self) {
            let manager = self.0.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    for client in manager.get_connected_clients().await {
                        manager.disconnect(&client, false).await;
                    }
                });
            }
        }
    }

    let broker = tokio::spawn(async move {
        let _guard = DisconnectOnAbort(session_manager.clone());
        let _ = start_mqtt_server_with_session_manager(session_manager, metrics, config).await;
    });

    // Give the broker time to start, bind to port, and be ready to accept connections
    sleep(Duration::from_millis(500)).await;

    broker
}

/// Creates a client pointed at the local mock broker.
fn test_client(port: u16) -> DeviceClient {
    let auth = AuthInfo {
        user_id: "test-user-id".to_string(),
        email: "integration@example.com".to_string(),
    };
    let config = BrokerConfig::default()
        .host("127.0.0.1")
        .port(port)
        .transport(BrokerTransport::Tcp)
        .keep_alive(Duration::from_secs(5))
        .reconnect_backoff(Duration::from_millis(200));
    DeviceClient::with_config(&auth, config)
}

/// Connects a plain MQTT client standing in for the device side.
///
/// Returns its handle plus a channel of every message it receives on
/// topics it subscribes to.
async fn start_device_sim(port: u16) -> (AsyncClient, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
    let mut options = MqttOptions::new(format!("letpot-sim-{port}"), "127.0.0.1", port);
    options.set_keep_alive(Duration::from_secs(5));
    let (client, mut event_loop) = AsyncClient::new(options, 10);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let _ = tx.send((publish.topic.clone(), publish.payload.to_vec()));
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    sleep(Duration::from_millis(500)).await;

    (client, rx)
}

/// Waits until the client reports the given connection state.
async fn wait_for_state(client: &DeviceClient, state: ConnectionState) {
    let mut watcher = client.state_changes();
    timeout(Duration::from_secs(5), async {
        while *watcher.borrow_and_update() != state {
            watcher
                .changed()
                .await
                .expect("state channel closed while waiting");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {state:?}"));
}

async fn recv_status(rx: &mut mpsc::UnboundedReceiver<DeviceStatus>) -> DeviceStatus {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
}

// ============================================================================
// Session Lifecycle Tests
// ============================================================================

mod session_lifecycle {
    use super::*;

    #[tokio::test]
    async fn first_subscribe_connects() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        assert_eq!(client.connection_state(), ConnectionState::Idle);

        let subscription = client.subscribe("LPH21TEST001", |_| {}).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        assert_eq!(client.subscription_count().await, 1);

        client.unsubscribe("LPH21TEST001", subscription).await;
    }

    #[tokio::test]
    async fn last_unsubscribe_closes_the_session() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let subscription = client.subscribe("LPH21TEST002", |_| {}).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        assert!(client.unsubscribe("LPH21TEST002", subscription).await);
        assert_eq!(client.connection_state(), ConnectionState::Idle);
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn session_is_shared_across_serials() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let first = client.subscribe("LPH21TEST003", |_| {}).await.unwrap();
        let second = client.subscribe("IGS01TEST003", |_| {}).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        assert_eq!(client.subscription_count().await, 2);

        // Removing one serial keeps the session for the other.
        assert!(client.unsubscribe("LPH21TEST003", first).await);
        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert_eq!(client.subscription_count().await, 1);

        assert!(client.unsubscribe("IGS01TEST003", second).await);
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn shared_serial_keeps_subscription_until_last_reference() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let first = client.subscribe("LPH21TEST004", |_| {}).await.unwrap();
        let second = client.subscribe("LPH21TEST004", |_| {}).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        assert_eq!(client.subscription_count().await, 1);
        assert_eq!(client.reference_count("LPH21TEST004").await, 2);

        assert!(client.unsubscribe("LPH21TEST004", first).await);
        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert_eq!(client.reference_count("LPH21TEST004").await, 1);

        // The same id cannot be removed twice.
        assert!(!client.unsubscribe("LPH21TEST004", first).await);

        assert!(client.unsubscribe("LPH21TEST004", second).await);
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn shared_serial_requests_status_once() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let (device, mut inbound) = start_device_sim(port).await;
        device
            .subscribe("LPH21TEST005/cmd", QoS::AtLeastOnce)
            .await
            .unwrap();
        sleep(Duration::from_millis(500)).await;

        let client = test_client(port);
        let first = client.subscribe("LPH21TEST005", |_| {}).await.unwrap();
        let second = client.subscribe("LPH21TEST005", |_| {}).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // One transport subscription means exactly one status request.
        let (topic, payload) = timeout(Duration::from_secs(5), inbound.recv())
            .await
            .expect("timed out waiting for status request")
            .unwrap();
        assert_eq!(topic, "LPH21TEST005/cmd");
        assert_eq!(hex::decode(payload).unwrap(), vec![35, 0, 0, 2, 97, 1]);

        // The second subscriber shares the attachment; nothing else
        // reaches the command topic.
        assert!(
            timeout(Duration::from_millis(800), inbound.recv())
                .await
                .is_err(),
            "unexpected extra packet on the command topic"
        );

        client.unsubscribe("LPH21TEST005", first).await;
        client.unsubscribe("LPH21TEST005", second).await;
    }
}

// ============================================================================
// Reconnection Tests
// ============================================================================

mod reconnection {
    use super::*;

    #[tokio::test]
    async fn session_loss_reconnects_with_subscriptions() {
        let port = get_test_port();
        let broker = start_mock_broker(port).await;

        let client = test_client(port);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = client
            .subscribe("LPH21TEST030", move |status| {
                let _ = tx.send(status);
            })
            .await
            .unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // Kill the broker out from under the session.
        broker.abort();
        let _ = broker.await;
        wait_for_state(&client, ConnectionState::Reconnecting).await;

        // The desired subscription set survives the outage.
        assert_eq!(client.subscription_count().await, 1);

        // Bring the broker back on the same port; the client recovers
        // on its own after the backoff.
        let _broker = start_mock_broker(port).await;
        wait_for_state(&client, ConnectionState::Connected).await;

        // Statuses flow again through the re-attached subscription.
        let (device, _inbound) = start_device_sim(port).await;
        device
            .publish(
                "LPH21TEST030/data",
                QoS::AtLeastOnce,
                false,
                LPH21_STATUS_FRAME,
            )
            .await
            .unwrap();
        let status = recv_status(&mut rx).await;
        assert!(status.online);
        assert_eq!(status.light_brightness, Some(500));

        client.unsubscribe("LPH21TEST030", subscription).await;
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }
}

// ============================================================================
// Status Dispatch Tests
// ============================================================================

mod status_dispatch {
    use super::*;

    #[tokio::test]
    async fn decoded_status_reaches_every_subscriber() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let (device, _inbound) = start_device_sim(port).await;

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let first = client
            .subscribe("LPH21TEST010", move |status| {
                let _ = tx_a.send(status);
            })
            .await
            .unwrap();
        let second = client
            .subscribe("LPH21TEST010", move |status| {
                let _ = tx_b.send(status);
            })
            .await
            .unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        sleep(Duration::from_millis(500)).await;

        device
            .publish(
                "LPH21TEST010/data",
                QoS::AtLeastOnce,
                false,
                LPH21_STATUS_FRAME,
            )
            .await
            .unwrap();

        let status_a = recv_status(&mut rx_a).await;
        let status_b = recv_status(&mut rx_b).await;
        assert_eq!(status_a, status_b);
        assert!(status_a.online);
        assert!(status_a.system_on);
        assert_eq!(status_a.pump_mode, 1);
        assert_eq!(status_a.light_brightness, Some(500));
        assert_eq!(status_a.light_schedule_start.to_string(), "07:30");
        assert_eq!(status_a.light_schedule_end.to_string(), "17:00");

        // The decoded status is also kept as last-known.
        assert_eq!(client.last_status("LPH21TEST010"), Some(status_a));

        client.unsubscribe("LPH21TEST010", first).await;
        client.unsubscribe("LPH21TEST010", second).await;
    }

    #[tokio::test]
    async fn undecodable_frames_are_dropped() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let (device, _inbound) = start_device_sim(port).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = client
            .subscribe("LPH21TEST011", move |status| {
                let _ = tx.send(status);
            })
            .await
            .unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        sleep(Duration::from_millis(500)).await;

        // Not hex, then a valid hex frame with a foreign opcode.
        for garbage in ["not a hex frame", "4d0001090203142f2901007d03"] {
            device
                .publish("LPH21TEST011/data", QoS::AtLeastOnce, false, garbage)
                .await
                .unwrap();
        }
        sleep(Duration::from_millis(500)).await;
        assert!(client.last_status("LPH21TEST011").is_none());

        // A real status frame still gets through afterwards.
        device
            .publish(
                "LPH21TEST011/data",
                QoS::AtLeastOnce,
                false,
                LPH21_STATUS_FRAME,
            )
            .await
            .unwrap();
        let status = recv_status(&mut rx).await;
        assert_eq!(status.plant_days, 0);

        client.unsubscribe("LPH21TEST011", subscription).await;
    }

    #[tokio::test]
    async fn last_status_is_cleared_on_release() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let (device, _inbound) = start_device_sim(port).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = client
            .subscribe("LPH21TEST012", move |status| {
                let _ = tx.send(status);
            })
            .await
            .unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        sleep(Duration::from_millis(500)).await;

        device
            .publish(
                "LPH21TEST012/data",
                QoS::AtLeastOnce,
                false,
                LPH21_STATUS_FRAME,
            )
            .await
            .unwrap();
        recv_status(&mut rx).await;
        assert!(client.last_status("LPH21TEST012").is_some());

        client.unsubscribe("LPH21TEST012", subscription).await;
        assert!(client.last_status("LPH21TEST012").is_none());
    }
}

// ============================================================================
// Update Tests
// ============================================================================

mod updates {
    use super::*;

    #[tokio::test]
    async fn update_requires_a_decoded_status() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let subscription = client.subscribe("LPH21TEST020", |_| {}).await.unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        let result = client.set_power("LPH21TEST020", true).await;
        assert!(matches!(result, Err(Error::NoStatus(_))));

        client.unsubscribe("LPH21TEST020", subscription).await;
    }

    #[tokio::test]
    async fn update_republishes_the_full_frame() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let (device, mut inbound) = start_device_sim(port).await;
        device
            .subscribe("LPH21TEST021/cmd", QoS::AtLeastOnce)
            .await
            .unwrap();
        sleep(Duration::from_millis(500)).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = client
            .subscribe("LPH21TEST021", move |status| {
                let _ = tx.send(status);
            })
            .await
            .unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // Attaching the device requests its status first.
        let (topic, payload) = timeout(Duration::from_secs(5), inbound.recv())
            .await
            .expect("timed out waiting for status request")
            .unwrap();
        assert_eq!(topic, "LPH21TEST021/cmd");
        let request = hex::decode(payload).unwrap();
        assert_eq!(request, vec![35, 0, 0, 2, 97, 1]);

        device
            .publish(
                "LPH21TEST021/data",
                QoS::AtLeastOnce,
                false,
                LPH21_STATUS_FRAME,
            )
            .await
            .unwrap();
        recv_status(&mut rx).await;

        client.set_power("LPH21TEST021", false).await.unwrap();

        let (topic, payload) = timeout(Duration::from_secs(5), inbound.recv())
            .await
            .expect("timed out waiting for update packet")
            .unwrap();
        assert_eq!(topic, "LPH21TEST021/cmd");
        let packet = hex::decode(payload).unwrap();
        // Single final packet with the session's second message id.
        assert_eq!(&packet[..4], &[35, 0, 1, 14]);
        // Full frame: power off, every other field carried over.
        assert_eq!(
            &packet[4..],
            &[97, 2, 0, 1, 1, 0, 0, 7, 30, 17, 0, 1, 244, 0]
        );

        client.unsubscribe("LPH21TEST021", subscription).await;
    }

    #[tokio::test]
    async fn brightness_outside_the_level_set_is_rejected() {
        let port = get_test_port();
        let _broker = start_mock_broker(port).await;

        let client = test_client(port);
        let (device, _inbound) = start_device_sim(port).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = client
            .subscribe("LPH21TEST022", move |status| {
                let _ = tx.send(status);
            })
            .await
            .unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        sleep(Duration::from_millis(500)).await;

        device
            .publish(
                "LPH21TEST022/data",
                QoS::AtLeastOnce,
                false,
                LPH21_STATUS_FRAME,
            )
            .await
            .unwrap();
        recv_status(&mut rx).await;

        // Even with a decoded status and a live session, off-level
        // values never reach the wire.
        let result = client.set_light_brightness("LPH21TEST022", 750).await;
        assert!(matches!(result, Err(Error::Value(_))));

        client.set_light_brightness("LPH21TEST022", 1000).await.unwrap();

        client.unsubscribe("LPH21TEST022", subscription).await;
    }
}
