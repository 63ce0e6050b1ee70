//! Unit tests for the JSON-RPC message model.

use mcp_streamable_http::models::message::{METHOD_INITIALIZE, METHOD_INITIALIZED};
use mcp_streamable_http::{AppError, ErrorObject, ProtocolMessage, RequestId};
use serde_json::{json, Value};

fn parse(value: Value) -> mcp_streamable_http::Result<ProtocolMessage> {
    match value {
        Value::Object(object) => ProtocolMessage::from_object(object),
        other => panic!("test payload must be an object: {other}"),
    }
}

fn violation(value: Value) -> String {
    match parse(value) {
        Err(AppError::Decode(msg)) => msg,
        other => panic!("expected a schema violation, got {other:?}"),
    }
}

// ── Shapes ───────────────────────────────────────────────────

#[test]
fn request_with_params_is_parsed() {
    let msg = parse(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/list",
        "params": {"cursor": "x"}
    }))
    .expect("request");

    assert_eq!(
        msg,
        ProtocolMessage::request(3, "tools/list", Some(json!({"cursor": "x"})))
    );
    assert!(msg.is_request());
}

#[test]
fn notification_has_no_id() {
    let msg = parse(json!({"jsonrpc": "2.0", "method": METHOD_INITIALIZED})).expect("notification");
    assert!(msg.id().is_none());
    assert!(msg.is_initialized_notification());
    assert!(!msg.is_request());
}

#[test]
fn null_params_are_treated_as_absent() {
    let msg = parse(json!({"jsonrpc": "2.0", "method": "ping", "id": "p", "params": null}))
        .expect("request");
    assert_eq!(msg, ProtocolMessage::request("p", "ping", None));
}

#[test]
fn error_response_keeps_data() {
    let msg = parse(json!({
        "jsonrpc": "2.0",
        "id": "r-1",
        "error": {"code": -32601, "message": "Method not found", "data": {"method": "x"}}
    }))
    .expect("error response");

    assert_eq!(
        msg,
        ProtocolMessage::ErrorResponse {
            id: RequestId::from("r-1"),
            error: ErrorObject {
                code: -32601,
                message: "Method not found".into(),
                data: Some(json!({"method": "x"})),
            },
        }
    );
}

#[test]
fn unknown_members_are_ignored() {
    let msg = parse(json!({"jsonrpc": "2.0", "id": 1, "result": {}, "_meta": {"trace": 1}}))
        .expect("response");
    assert_eq!(msg, ProtocolMessage::response(1, json!({})));
}

#[test]
fn initialize_request_is_recognised() {
    let msg = ProtocolMessage::request(1, METHOD_INITIALIZE, None);
    assert!(msg.is_initialize_request());
    assert!(!ProtocolMessage::notification(METHOD_INITIALIZE, None).is_initialize_request());
}

// ── Schema violations ────────────────────────────────────────

#[test]
fn wrong_version_is_rejected() {
    assert_eq!(
        violation(json!({"jsonrpc": "1.0", "id": 1, "result": {}})),
        "schema violation: jsonrpc must be \"2.0\""
    );
    assert!(violation(json!({"id": 1, "result": {}})).contains("jsonrpc"));
}

#[test]
fn non_scalar_id_is_rejected() {
    assert!(violation(json!({"jsonrpc": "2.0", "id": true, "result": {}})).contains("id must be"));
    assert!(violation(json!({"jsonrpc": "2.0", "id": 1.5, "method": "x"})).contains("id must be"));
}

#[test]
fn non_string_method_is_rejected() {
    assert!(violation(json!({"jsonrpc": "2.0", "id": 1, "method": 7})).contains("method must be a string"));
}

#[test]
fn request_carrying_result_is_rejected() {
    assert!(
        violation(json!({"jsonrpc": "2.0", "id": 1, "method": "x", "result": {}}))
            .contains("must not carry result or error")
    );
}

#[test]
fn scalar_params_are_rejected() {
    assert!(
        violation(json!({"jsonrpc": "2.0", "method": "x", "params": "str"}))
            .contains("params must be an object or an array")
    );
}

#[test]
fn response_without_id_is_rejected() {
    assert!(violation(json!({"jsonrpc": "2.0", "result": {}})).contains("missing id"));
}

#[test]
fn response_with_both_result_and_error_is_rejected() {
    assert!(violation(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {},
        "error": {"code": 1, "message": "x"}
    }))
    .contains("both result and error"));
}

#[test]
fn object_with_no_payload_is_rejected() {
    assert!(violation(json!({"jsonrpc": "2.0", "id": 1})).contains("neither method, result nor error"));
}

#[test]
fn malformed_error_object_is_rejected() {
    assert!(
        violation(json!({"jsonrpc": "2.0", "id": 1, "error": {"message": "no code"}}))
            .contains("invalid error object")
    );
}

// ── Serde integration ────────────────────────────────────────

#[test]
fn serialized_request_matches_wire_form() {
    let msg = ProtocolMessage::request("abc", "tools/call", Some(json!({"name": "echo"})));
    assert_eq!(
        serde_json::to_value(&msg).expect("serialize"),
        json!({"jsonrpc": "2.0", "id": "abc", "method": "tools/call", "params": {"name": "echo"}})
    );
}

#[test]
fn serialized_error_response_omits_absent_data() {
    let msg = ProtocolMessage::error_response(9, 32600, "Session terminated");
    assert_eq!(
        serde_json::to_value(&msg).expect("serialize"),
        json!({"jsonrpc": "2.0", "id": 9, "error": {"code": 32600, "message": "Session terminated"}})
    );
}

#[test]
fn deserialize_validates_through_the_same_rules() {
    let ok: ProtocolMessage =
        serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).expect("valid");
    assert_eq!(ok.method(), Some("ping"));

    assert!(serde_json::from_str::<ProtocolMessage>(r#"{"jsonrpc":"2.0"}"#).is_err());
    assert!(serde_json::from_str::<ProtocolMessage>("[1]").is_err());
}
