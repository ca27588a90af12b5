// Device API Tests
// REST bodies, the reqwest client against a loopback server, and relay push events

use crate::support::HttpStub;
use firebot_link::telemetry::SensorPayload;
use firebot_link::transport::{
    ApiResponse, ApiTimeouts, DeviceApi, HttpDeviceApi, PushEvent, StatusResponse, TransportError,
};
use serde_json::json;
use std::time::Duration;

// ============================================================================
// REST BODIES
// ============================================================================

#[test]
fn test_api_response_success() {
    let response: ApiResponse =
        serde_json::from_value(json!({"success": true, "message": "Connected"})).unwrap();

    assert!(response.into_result().is_ok());
}

#[test]
fn test_api_response_failure_is_refused() {
    let response: ApiResponse = serde_json::from_value(json!({
        "success": false,
        "message": "Serial port not available"
    }))
    .unwrap();
    let result = response.into_result();

    assert_eq!(
        result,
        Err(TransportError::Refused("Serial port not available".to_string()))
    );
}

#[test]
fn test_api_response_missing_fields() {
    let response: ApiResponse = serde_json::from_value(json!({})).unwrap();

    assert!(matches!(response.into_result(), Err(TransportError::Refused(_))));
}

#[test]
fn test_status_response_parses_sensor_data() {
    let status: StatusResponse = serde_json::from_value(json!({
        "connected": true,
        "sensorData": {"fireDetected": true, "pumpStatus": false, "connected": true}
    }))
    .unwrap();

    assert!(status.connected);
    assert_eq!(
        status.sensor_data,
        Some(SensorPayload {
            fire_detected: true,
            pump_status: false
        })
    );
}

#[test]
fn test_status_response_without_sensor_data() {
    let status: StatusResponse = serde_json::from_value(json!({"connected": false})).unwrap();

    assert!(!status.connected);
    assert!(status.sensor_data.is_none());
}

#[test]
fn test_api_timeouts_default() {
    let timeouts = ApiTimeouts::default();

    assert_eq!(timeouts.connect, Duration::from_secs(3));
    assert_eq!(timeouts.request, Duration::from_secs(2));
    assert_eq!(timeouts.poll, Duration::from_secs(1));
}

#[test]
fn test_http_device_api_keeps_timeouts() {
    let api = HttpDeviceApi::new(ApiTimeouts::default()).unwrap();

    assert_eq!(*api.timeouts(), ApiTimeouts::default());
}

#[tokio::test]
async fn test_http_device_api_unreachable() {
    let timeouts = ApiTimeouts {
        connect: Duration::from_millis(300),
        request: Duration::from_millis(300),
        poll: Duration::from_millis(300),
    };
    let api = HttpDeviceApi::new(timeouts).unwrap();

    // Port 9 on loopback is closed on test hosts
    let result = api.connect("http://127.0.0.1:9").await;

    assert!(matches!(
        result,
        Err(TransportError::Unreachable(_)) | Err(TransportError::Timeout)
    ));
    assert!(!api.health("http://127.0.0.1:9").await);
}

// ============================================================================
// HTTP DEVICE API
// ============================================================================

fn fast_timeouts() -> ApiTimeouts {
    ApiTimeouts {
        connect: Duration::from_millis(500),
        request: Duration::from_millis(500),
        poll: Duration::from_millis(100),
    }
}

fn http_api() -> HttpDeviceApi {
    HttpDeviceApi::new(fast_timeouts()).unwrap()
}

#[tokio::test]
async fn test_http_connect_posts_to_connect_endpoint() {
    let stub = HttpStub::start(200, r#"{"success":true,"message":"Connected to FireBot"}"#).await;

    http_api().connect(&stub.base_url).await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /api/connect HTTP/1.1"));
}

#[tokio::test]
async fn test_http_disconnect_posts_to_disconnect_endpoint() {
    let stub = HttpStub::start(200, r#"{"success":true}"#).await;

    http_api().disconnect(&format!("{}/", stub.base_url)).await.unwrap();

    assert!(stub.requests()[0].starts_with("POST /api/disconnect HTTP/1.1"));
}

#[tokio::test]
async fn test_http_send_command_body() {
    let stub = HttpStub::start(200, r#"{"success":true,"message":"Command sent: F"}"#).await;

    http_api().send_command(&stub.base_url, "F").await.unwrap();

    let request = stub.requests().remove(0);
    assert!(request.starts_with("POST /api/send-command HTTP/1.1"));
    assert!(request.to_lowercase().contains("content-type: application/json"));
    assert!(request.ends_with(r#"{"command":"F"}"#));
}

#[tokio::test]
async fn test_http_non_success_status_carries_message() {
    let stub = HttpStub::start(
        503,
        r#"{"success":false,"message":"Serial port not available"}"#,
    )
    .await;

    let result = http_api().connect(&stub.base_url).await;

    assert_eq!(
        result,
        Err(TransportError::Http {
            status: 503,
            message: "Serial port not available".to_string()
        })
    );
}

#[tokio::test]
async fn test_http_non_success_status_without_body() {
    let stub = HttpStub::start(500, "").await;

    let result = http_api().send_command(&stub.base_url, "S").await;

    assert_eq!(
        result,
        Err(TransportError::Http {
            status: 500,
            message: "Internal Server Error".to_string()
        })
    );
}

#[tokio::test]
async fn test_http_declined_body_is_refused() {
    let stub = HttpStub::start(200, r#"{"success":false,"message":"Invalid command"}"#).await;

    let result = http_api().send_command(&stub.base_url, "Q").await;

    assert_eq!(result, Err(TransportError::Refused("Invalid command".to_string())));
}

#[tokio::test]
async fn test_http_success_without_json_is_protocol_error() {
    let stub = HttpStub::start(200, "OK").await;

    let result = http_api().connect(&stub.base_url).await;

    assert!(matches!(result, Err(TransportError::Protocol(ref m)) if m.contains("/api/connect")));
}

#[tokio::test]
async fn test_http_status_decodes_sensor_data() {
    let stub = HttpStub::start(
        200,
        r#"{"connected":true,"sensorData":{"fireDetected":true,"pumpStatus":true,"connected":true}}"#,
    )
    .await;

    let status = http_api().status(&stub.base_url).await.unwrap();

    assert!(status.connected);
    assert_eq!(
        status.sensor_data,
        Some(SensorPayload {
            fire_detected: true,
            pump_status: true
        })
    );
    assert!(stub.requests()[0].starts_with("GET /api/status HTTP/1.1"));
}

#[tokio::test]
async fn test_http_status_error_code() {
    let stub = HttpStub::start(404, "").await;

    let result = http_api().status(&stub.base_url).await;

    assert!(matches!(result, Err(TransportError::Http { status: 404, .. })));
}

#[tokio::test]
async fn test_http_status_timeout() {
    // Answers well after the 100 ms poll bound
    let stub = HttpStub::start_with_delay(200, r#"{"connected":true}"#, 1_000).await;

    let result = http_api().status(&stub.base_url).await;

    assert_eq!(result, Err(TransportError::Timeout));
}

#[tokio::test]
async fn test_http_health_follows_status_code() {
    let healthy = HttpStub::start(200, r#"{"status":"ok"}"#).await;
    let failing = HttpStub::start(500, "").await;
    let api = http_api();

    assert!(api.health(&healthy.base_url).await);
    assert!(!api.health(&failing.base_url).await);
    assert!(healthy.requests()[0].starts_with("GET /api/health HTTP/1.1"));
}

// ============================================================================
// PUSH FRAMES
// ============================================================================

#[test]
fn test_push_event_sensor_data_frame() {
    let event: PushEvent = serde_json::from_value(json!({
        "event": "sensor_data",
        "data": {"fireDetected": false, "pumpStatus": true, "connected": true}
    }))
    .unwrap();

    assert_eq!(
        event,
        PushEvent::SensorData(SensorPayload {
            fire_detected: false,
            pump_status: true
        })
    );
}

#[test]
fn test_push_event_connection_status_frame() {
    let event: PushEvent =
        serde_json::from_value(json!({"event": "connection_status", "data": {"connected": false}}))
            .unwrap();

    assert_eq!(event, PushEvent::ConnectionStatus { connected: false });
}

#[test]
fn test_push_event_command_response_without_error() {
    let event: PushEvent = serde_json::from_value(json!({
        "event": "command_response",
        "data": {"success": true, "command": "F"}
    }))
    .unwrap();

    assert_eq!(
        event,
        PushEvent::CommandResponse {
            success: true,
            command: "F".to_string(),
            error: None
        }
    );
}

#[test]
fn test_push_event_send_command_encoding() {
    let value = serde_json::to_value(PushEvent::SendCommand {
        command: "P1".to_string(),
    })
    .unwrap();

    assert_eq!(value, json!({"event": "send_command", "data": {"command": "P1"}}));
}

#[test]
fn test_push_event_unknown_event_rejected() {
    let result = serde_json::from_value::<PushEvent>(json!({"event": "reboot", "data": {}}));

    assert!(result.is_err());
}
