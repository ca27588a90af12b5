// Direct Transport Tests
// Request/response session control and status polling against the rover's access point

use crate::support::{wait_until, LogCapture, Recorder};
use firebot_link::command::Command;
use firebot_link::telemetry::SensorPayload;
use firebot_link::transport::{
    ConnectTarget, DeviceTransport, DirectTransport, DirectTransportConfig, MockDeviceApi,
    StatusResponse, TransportError, TransportKind,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn status(fire: bool, pump: bool) -> StatusResponse {
    StatusResponse {
        connected: true,
        sensor_data: Some(SensorPayload {
            fire_detected: fire,
            pump_status: pump,
        }),
    }
}

fn direct(api: Arc<MockDeviceApi>, poll_interval_ms: u64) -> DirectTransport {
    DirectTransport::with_api(
        DirectTransportConfig::new().with_poll_interval_ms(poll_interval_ms),
        api,
    )
}

// ============================================================================
// DIRECT TRANSPORT CONFIG
// ============================================================================

#[test]
fn test_direct_config_default() {
    let config = DirectTransportConfig::default();

    assert_eq!(config.base_url, "http://192.168.4.1");
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.base.connect_timeout_ms, 3_000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_direct_config_rejects_zero_interval() {
    let config = DirectTransportConfig::new().with_poll_interval_ms(0);

    assert!(matches!(config.validate(), Err(TransportError::InvalidConfig(_))));
}

// ============================================================================
// SESSION
// ============================================================================

#[tokio::test]
async fn test_direct_connect_starts_polling() {
    let api = Arc::new(MockDeviceApi::new());
    let transport = direct(api.clone(), 20);

    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    assert_eq!(transport.kind(), TransportKind::Direct);
    assert_eq!(api.connect_calls(), 1);
    assert!(transport.is_polling());
}

#[tokio::test]
async fn test_direct_connect_timeout() {
    let api = Arc::new(MockDeviceApi::new().with_connect_error(TransportError::Timeout));
    let transport = direct(api.clone(), 20);

    let result = transport.connect(ConnectTarget::Default, Recorder::new().sink()).await;

    assert_eq!(result, Err(TransportError::Timeout));
    assert!(!transport.is_polling());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(api.status_calls(), 0);
}

#[tokio::test]
async fn test_direct_connect_non_success_status() {
    let api = Arc::new(MockDeviceApi::new().with_connect_error(TransportError::Http {
        status: 503,
        message: "busy".to_string(),
    }));
    let transport = direct(api, 20);

    let result = transport.connect(ConnectTarget::Default, Recorder::new().sink()).await;

    assert!(matches!(result, Err(TransportError::Http { status: 503, .. })));
}

#[tokio::test]
async fn test_direct_second_connect_rejected() {
    let api = Arc::new(MockDeviceApi::new());
    let transport = direct(api.clone(), 20);
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    let result = transport
        .connect(ConnectTarget::address("http://10.0.0.9"), Recorder::new().sink())
        .await;

    assert_eq!(result, Err(TransportError::AlreadyConnected));
    assert_eq!(api.connect_calls(), 1);
}

#[tokio::test]
async fn test_direct_disconnect_during_connect_cancels() {
    let api = Arc::new(MockDeviceApi::new().with_connect_delay_ms(100));
    let transport = Arc::new(direct(api.clone(), 20));

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
    assert!(!transport.is_polling());
    assert_eq!(api.disconnect_calls(), 1);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(api.status_calls(), 0);
}

#[tokio::test]
async fn test_direct_abandoned_teardown_failure_is_logged() {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let api = Arc::new(
        MockDeviceApi::new()
            .with_connect_delay_ms(100)
            .with_disconnect_error(TransportError::Timeout),
    );
    let transport = Arc::new(direct(api.clone(), 20));

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
    assert!(logs.contents().contains("teardown of abandoned rover session failed"));
}

#[tokio::test]
async fn test_direct_disconnect_reports_teardown_error() {
    let api = Arc::new(MockDeviceApi::new().with_disconnect_error(TransportError::Timeout));
    let transport = direct(api, 20);
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    let result = transport.disconnect().await;

    assert_eq!(result, Err(TransportError::Timeout));
    // Local session released regardless
    assert!(!transport.is_polling());
    assert_eq!(transport.send(Command::Stop).await, Err(TransportError::NotConnected));
}

// ============================================================================
// POLLING
// ============================================================================

#[tokio::test]
async fn test_direct_first_poll_is_immediate() {
    let api = Arc::new(MockDeviceApi::new().with_status(status(true, false)));
    // Long interval: only the first tick can land inside the wait
    let transport = direct(api, 1_000);
    let recorder = Recorder::new();

    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    assert!(wait_until(200, || recorder.telemetry().len() == 1).await);
    let state = recorder.telemetry()[0];
    assert!(state.fire_detected);
    assert!(!state.pump_active);
    assert!(state.last_updated.is_some());
}

#[tokio::test]
async fn test_direct_poll_replaces_state_each_interval() {
    let api = Arc::new(MockDeviceApi::new().with_status(status(false, false)));
    let transport = direct(api.clone(), 20);
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    assert!(wait_until(200, || !recorder.telemetry().is_empty()).await);
    api.set_status(Ok(status(true, true)));

    assert!(
        wait_until(200, || recorder
            .telemetry()
            .last()
            .is_some_and(|s| s.fire_detected && s.pump_active))
        .await
    );
}

#[tokio::test]
async fn test_direct_poll_failure_keeps_session() {
    let api = Arc::new(MockDeviceApi::new().with_status_error(TransportError::Timeout));
    let transport = direct(api.clone(), 20);
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    assert!(wait_until(300, || api.status_calls() >= 3).await);

    assert!(transport.is_polling());
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_direct_status_without_sensor_data_is_skipped() {
    let api = Arc::new(MockDeviceApi::new());
    let transport = direct(api.clone(), 20);
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();

    assert!(wait_until(300, || api.status_calls() >= 2).await);

    assert!(recorder.telemetry().is_empty());
}

#[tokio::test]
async fn test_direct_disconnect_halts_polling() {
    let api = Arc::new(MockDeviceApi::new().with_status(status(true, false)));
    let transport = direct(api.clone(), 20);
    let recorder = Recorder::new();
    transport
        .connect(ConnectTarget::Default, recorder.sink())
        .await
        .unwrap();
    assert!(wait_until(200, || api.status_calls() >= 2).await);

    transport.disconnect().await.unwrap();
    let polls = api.status_calls();
    let delivered = recorder.telemetry().len();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(api.status_calls(), polls);
    assert_eq!(recorder.telemetry().len(), delivered);
    assert_eq!(api.disconnect_calls(), 1);
    assert!(!transport.is_polling());
}

// ============================================================================
// COMMANDS
// ============================================================================

#[tokio::test]
async fn test_direct_sends_every_token() {
    let api = Arc::new(MockDeviceApi::new());
    let transport = direct(api.clone(), 1_000);
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    for command in Command::ALL {
        transport.send(command).await.unwrap();
    }

    let expected: Vec<String> = Command::ALL.iter().map(|c| c.wire_token().to_string()).collect();
    assert_eq!(api.commands(), expected);
}

#[tokio::test]
async fn test_direct_send_when_not_connected() {
    let api = Arc::new(MockDeviceApi::new());
    let transport = direct(api.clone(), 20);

    assert_eq!(transport.send(Command::Forward).await, Err(TransportError::NotConnected));
    assert!(api.commands().is_empty());
}

#[tokio::test]
async fn test_direct_send_refused() {
    let api = Arc::new(
        MockDeviceApi::new().with_send_error(TransportError::Refused("Invalid command".to_string())),
    );
    let transport = direct(api, 1_000);
    transport
        .connect(ConnectTarget::Default, Recorder::new().sink())
        .await
        .unwrap();

    let result = transport.send(Command::Right).await;

    assert_eq!(result, Err(TransportError::WriteFailed("Invalid command".to_string())));
}

#[tokio::test]
async fn test_direct_health_probe() {
    let healthy = direct(Arc::new(MockDeviceApi::new()), 20);
    let unhealthy = direct(Arc::new(MockDeviceApi::new().with_unhealthy()), 20);

    assert!(healthy.health().await);
    assert!(!unhealthy.health().await);
}
