use serde_json::json;
use simtemp::*;
use std::sync::Arc;

fn handler_with_devices(count: usize) -> ProtocolHandler {
    let registry = Arc::new(DeviceRegistry::new());
    for _ in 0..count {
        registry
            .attach_with(&InitialConfig::default(), Trigger::Manual)
            .unwrap();
    }
    ProtocolHandler::new(registry)
}

fn error_kind(response: &Response) -> Option<&str> {
    match response {
        Response::Error { kind, .. } => Some(kind),
        _ => None,
    }
}

#[test]
fn test_response_json_shape() {
    assert_eq!(serde_json::to_value(&Response::Ok).unwrap(), json!({"status": "ok"}));

    let handler = handler_with_devices(1);
    let response = handler.handle_line(r#"{"device": 3, "command": {"type": "stats"}}"#);
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"status": "error", "kind": "not_found", "message": "device 3 not found"})
    );
}

#[test]
fn test_stats_report() {
    let handler = handler_with_devices(1);
    let device = handler.registry().get(0).unwrap();
    device.set_threshold_mc(i32::MIN);
    device.trigger().unwrap();
    device.trigger().unwrap();

    let response = handler.handle_line(r#"{"command": {"type": "stats"}}"#);
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["status"], "stats");
    assert_eq!(value["report"]["stats"], json!({"updates": 2, "alerts": 2, "errors": 0}));
    assert_eq!(value["report"]["config"]["mode"], "normal");
    assert_eq!(value["report"]["buffer"]["buffered"], 2);
    assert_eq!(value["report"]["buffer"]["capacity"], 64);
}

#[test]
fn test_poll_reports_alert_readiness() {
    let handler = handler_with_devices(1);
    let device = handler.registry().get(0).unwrap();

    let response = handler.handle_line(r#"{"command": {"type": "poll"}}"#);
    assert!(matches!(response, Response::Readiness { mask: 0, .. }));

    device.set_threshold_mc(i32::MIN);
    device.trigger().unwrap();
    let response = handler.handle_line(r#"{"command": {"type": "poll"}}"#);
    assert!(matches!(
        response,
        Response::Readiness { mask, .. } if mask == Readiness::READABLE | Readiness::ALERT_PENDING
    ));
}

#[test]
fn test_set_clamps_and_rejects() {
    let handler = handler_with_devices(1);

    let response = handler.handle_line(
        r#"{"command": {"type": "set", "attr": "sampling_ms", "value": "60000"}}"#,
    );
    assert_eq!(response, Response::Ok);
    let response = handler.handle_line(r#"{"command": {"type": "get", "attr": "sampling_ms"}}"#);
    assert_eq!(
        response,
        Response::Value {
            attr: "sampling_ms".into(),
            value: "5000".into()
        }
    );

    let response =
        handler.handle_line(r#"{"command": {"type": "set", "attr": "mode", "value": "warp"}}"#);
    assert_eq!(error_kind(&response), Some("validation"));

    let response =
        handler.handle_line(r#"{"command": {"type": "set", "attr": "stats", "value": "0"}}"#);
    assert_eq!(error_kind(&response), Some("permission_denied"));

    let response = handler.handle_line(r#"{"command": {"type": "get", "attr": "humidity"}}"#);
    assert_eq!(error_kind(&response), Some("unknown_attribute"));

    let device = handler.registry().get(0).unwrap();
    assert_eq!(device.stats().errors, 1);
}

#[test]
fn test_read_with_timeout() {
    let handler = handler_with_devices(1);
    let response = handler.handle_line(
        r#"{"command": {"type": "read", "blocking": true, "timeout_ms": 20}}"#,
    );
    assert_eq!(error_kind(&response), Some("timed_out"));

    let produced = handler.registry().get(0).unwrap().trigger().unwrap();
    let response = handler.handle_line(
        r#"{"command": {"type": "read", "blocking": true, "timeout_ms": 20}}"#,
    );
    match response {
        Response::Sample { sample, record } => {
            assert_eq!(sample, produced);
            assert_eq!(record, produced.to_bytes());
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn test_read_after_detach() {
    let handler = handler_with_devices(2);
    handler.registry().detach(1).unwrap();

    let response = handler.handle_line(r#"{"device": 1, "command": {"type": "read"}}"#);
    assert_eq!(error_kind(&response), Some("not_found"));

    let response = handler.handle_line(r#"{"command": {"type": "list"}}"#);
    assert_eq!(response, Response::Devices { ids: vec![0] });
}

#[test]
fn test_oversized_request_rejected() {
    let handler = handler_with_devices(1);
    let line = format!(
        r#"{{"command": {{"type": "get", "attr": "{}"}}}}"#,
        "x".repeat(simtemp::protocol::MAX_REQUEST_SIZE)
    );
    assert_eq!(error_kind(&handler.handle_line(&line)), Some("parse"));
}
