// Relay Transport Tests
// REST session control, push-channel telemetry and bounded reconnection

use crate::support::{wait_until, LogCapture, Recorder};
use firebot_link::command::Command;
use firebot_link::telemetry::SensorPayload;
use firebot_link::transport::{
    ConnectTarget, DeviceTransport, MockDeviceApi, MockPushConnector, PushEvent,
    RelayTransport, RelayTransportConfig, StatusResponse, TransportError, TransportKind,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn fast_config() -> RelayTransportConfig {
    RelayTransportConfig::new()
        .with_reconnect_attempts(3)
        .with_reconnect_delay_ms(10)
}

fn relay(
    config: RelayTransportConfig,
    api: Arc<MockDeviceApi>,
    push: Arc<MockPushConnector>,
) -> RelayTransport {
    RelayTransport::with_parts(config, api, push)
}

fn fire() -> PushEvent {
    PushEvent::SensorData(SensorPayload {
        fire_detected: true,
        pump_status: false,
    })
}

// ============================================================================
// RELAY TRANSPORT CONFIG
// ============================================================================

#[test]
fn test_relay_config_default() {
    let config = RelayTransportConfig::default();

    assert_eq!(config.base_url, "http://localhost:5000");
    assert_eq!(config.reconnect_attempts, 5);
    assert_eq!(config.reconnect_delay_ms, 1_000);
    assert!(!config.mirror_commands);
    assert!(config.validate().is_ok());
}

#[test]
fn test_relay_config_push_url() {
    let config = RelayTransportConfig::default();

    assert_eq!(
        config.push_url("http://localhost:5000"),
        "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        config.push_url("https://relay.local/"),
        "wss://relay.local/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        config.with_push_path("/rt/socket.io/").push_url("http://10.0.0.2:5000"),
        "ws://10.0.0.2:5000/rt/socket.io/?EIO=4&transport=websocket"
    );
}

#[test]
fn test_relay_config_validation() {
    assert!(RelayTransportConfig::new().with_base_url("").validate().is_err());
    assert!(RelayTransportConfig::new().with_push_path("ws").validate().is_err());
}

#[test]
fn test_relay_new_rejects_invalid_config() {
    let result = RelayTransport::new(RelayTransportConfig::new().with_base_url(""));

    assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
}

// ============================================================================
// SESSION
// ============================================================================

#[tokio::test]
async fn test_relay_connect_opens_push_then_session() {
    let api = Arc::new(MockDeviceApi::new());
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config(), api.clone(), push.clone());

    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    assert_eq!(transport.kind(), TransportKind::Relay);
    assert_eq!(push.open_calls(), 1);
    assert_eq!(api.connect_calls(), 1);
    assert!(transport.has_session());
}

#[tokio::test]
async fn test_relay_unreachable() {
    let api = Arc::new(MockDeviceApi::new());
    let push = Arc::new(MockPushConnector::with_open_budget(0));
    let transport = relay(fast_config(), api.clone(), push);

    let result = transport.connect(ConnectTarget::Default, Recorder::new().sink()).await;

    assert!(matches!(result, Err(TransportError::Unreachable(_))));
    assert_eq!(api.connect_calls(), 0);
    assert!(!transport.has_session());
}

#[tokio::test]
async fn test_relay_refuses_device_session() {
    let api = Arc::new(
        MockDeviceApi::new().with_connect_error(TransportError::Refused(
            "Serial port not available".to_string(),
        )),
    );
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config(), api, push.clone());

    let result = transport.connect(ConnectTarget::Default, Recorder::new().sink()).await;

    assert!(matches!(result, Err(TransportError::Refused(_))));
    assert!(!transport.has_session());
    // The supervisor was stopped with the failed attempt
    push.drop_channel();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(push.open_calls(), 1);
}

#[tokio::test]
async fn test_relay_second_connect_rejected() {
    let transport = relay(
        fast_config(),
        Arc::new(MockDeviceApi::new()),
        Arc::new(MockPushConnector::new()),
    );
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    let result = transport.connect(ConnectTarget::Default, Recorder::new().sink()).await;

    assert_eq!(result, Err(TransportError::AlreadyConnected));
}

#[tokio::test]
async fn test_relay_disconnect_closes_session() {
    let api = Arc::new(MockDeviceApi::new());
    let transport = relay(fast_config(), api.clone(), Arc::new(MockPushConnector::new()));
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    transport.disconnect().await.unwrap();

    assert_eq!(api.disconnect_calls(), 1);
    assert!(!transport.has_session());
    assert_eq!(transport.send(Command::Forward).await, Err(TransportError::NotConnected));
}

#[tokio::test]
async fn test_relay_disconnect_during_connect_cancels() {
    let api = Arc::new(MockDeviceApi::new().with_connect_delay_ms(100));
    let push = Arc::new(MockPushConnector::new());
    let transport = Arc::new(relay(fast_config(), api.clone(), push));

    let pending = {
        let transport = transport.clone();
        tokio::spawn(async move {
            transport
                .connect(ConnectTarget::Default, Recorder::new().sink())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.disconnect().await.unwrap();

    assert_eq!(pending.await.unwrap(), Err(TransportError::Cancelled));
    assert!(!transport.has_session());
    // Teardown of the half-open relay session
    assert_eq!(api.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_relay_abandoned_teardown_failure_is_logged() {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let api = Arc::new(
        MockDeviceApi::new()
            .with_connect_delay_ms(100)
            .with_disconnect_error(TransportError::Timeout),
    );
    let transport = Arc::new(relay(fast_config(), api.clone(), Arc::new(MockPushConnector::new())));

    let pending = {
        let transport = transport.clone();
        tokio::spawn(async move {
            transport
                .connect(ConnectTarget::Default, Recorder::new().sink())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.disconnect().await.unwrap();

    assert_eq!(pending.await.unwrap(), Err(TransportError::Cancelled));
    assert_eq!(api.disconnect_calls(), 1);
    assert!(logs.contents().contains("teardown of abandoned relay session failed"));
}

// ============================================================================
// COMMANDS
// ============================================================================

#[tokio::test]
async fn test_relay_sends_wire_tokens() {
    let api = Arc::new(MockDeviceApi::new());
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config(), api.clone(), push.clone());
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    transport.send(Command::Forward).await.unwrap();
    transport.send(Command::AutonomousExtinguish).await.unwrap();

    assert_eq!(api.commands(), vec!["F".to_string(), "EXTINGUISH".to_string()]);
    assert!(push.mirrored().is_empty());
}

#[tokio::test]
async fn test_relay_mirrors_commands_when_enabled() {
    let api = Arc::new(MockDeviceApi::new());
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config().with_mirror_commands(true), api.clone(), push.clone());
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    transport.send(Command::PumpOn).await.unwrap();

    assert_eq!(api.commands(), vec!["P1".to_string()]);
    assert_eq!(
        push.mirrored(),
        vec![PushEvent::SendCommand {
            command: "P1".to_string()
        }]
    );
}

#[tokio::test]
async fn test_relay_send_failure_is_write_failure() {
    let api = Arc::new(MockDeviceApi::new().with_send_error(TransportError::Http {
        status: 500,
        message: "serial write failed".to_string(),
    }));
    let transport = relay(fast_config(), api, Arc::new(MockPushConnector::new()));
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    let result = transport.send(Command::Left).await;

    assert!(matches!(result, Err(TransportError::WriteFailed(_))));
}

// ============================================================================
// PUSH CHANNEL
// ============================================================================

#[tokio::test]
async fn test_relay_sensor_events_become_telemetry() {
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config(), Arc::new(MockDeviceApi::new()), push.clone());
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    assert!(push.push(fire()).await);

    assert!(wait_until(500, || recorder.telemetry().len() == 1).await);
    let state = recorder.telemetry()[0];
    assert!(state.fire_detected);
    assert!(!state.pump_active);
}

#[tokio::test]
async fn test_relay_device_link_down_ends_session() {
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config(), Arc::new(MockDeviceApi::new()), push.clone());
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    push.push(PushEvent::ConnectionStatus { connected: false }).await;

    assert!(wait_until(500, || recorder.session_lost().len() == 1).await);
    assert!(!transport.has_session());
}

#[tokio::test]
async fn test_relay_reopens_dropped_push_channel() {
    let push = Arc::new(MockPushConnector::new());
    let transport = relay(fast_config(), Arc::new(MockDeviceApi::new()), push.clone());
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    push.drop_channel();
    assert!(wait_until(500, || push.open_calls() == 2).await);
    assert!(push.push(fire()).await);

    assert!(wait_until(500, || recorder.telemetry().len() == 1).await);
    assert!(recorder.session_lost().is_empty());
    assert!(transport.has_session());
}

#[tokio::test]
async fn test_relay_reconnect_attempts_are_bounded() {
    // First open succeeds, every reopen fails
    let push = Arc::new(MockPushConnector::with_open_budget(1));
    let transport = relay(fast_config(), Arc::new(MockDeviceApi::new()), push.clone());
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    push.drop_channel();

    assert!(wait_until(1_000, || !recorder.session_lost().is_empty()).await);
    assert_eq!(push.open_calls(), 1 + 3);
    assert_eq!(recorder.session_lost().len(), 1);
    assert!(!transport.has_session());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(push.open_calls(), 4);
}

#[tokio::test]
async fn test_relay_disconnect_stops_reconnecting() {
    let push = Arc::new(MockPushConnector::with_open_budget(1));
    let transport = relay(
        fast_config().with_reconnect_delay_ms(50),
        Arc::new(MockDeviceApi::new()),
        push.clone(),
    );
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    push.drop_channel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(push.open_calls(), 1);
    assert!(recorder.session_lost().is_empty());
}

// ============================================================================
// PROBES
// ============================================================================

#[tokio::test]
async fn test_relay_health_and_status() {
    let api = Arc::new(MockDeviceApi::new().with_status(StatusResponse {
        connected: true,
        sensor_data: None,
    }));
    let transport = relay(fast_config(), api, Arc::new(MockPushConnector::new()));

    assert!(transport.health().await);
    assert!(transport.status().await.unwrap().connected);
}
