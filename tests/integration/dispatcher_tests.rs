//! Integration tests for POST dispatch and response handling.

use axum::http::Method;
use serde_json::json;

use mcp_streamable_http::{AppError, ProtocolMessage, RequestId};

use super::test_helpers::{next_inbound, next_message, result_for, MockServer, Reply};

// ── JSON responses ───────────────────────────────────────────

#[tokio::test]
async fn json_response_is_delivered() {
    let server = MockServer::start().await;
    server.on_post(Reply::json(&result_for(1, &json!({"tools": []}))));
    let mut transport = server.connect();

    let request = ProtocolMessage::request(1, "tools/list", None);
    transport.send(request.clone()).await.expect("send");

    let reply = next_message(&mut transport).await;
    assert_eq!(reply, ProtocolMessage::response(1, json!({"tools": []})));

    let posts = server.requests_with(&Method::POST);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].body, Some(serde_json::to_value(&request).expect("value")));
    assert_eq!(
        posts[0].headers.get("accept").expect("accept"),
        "application/json, text/event-stream"
    );
    assert_eq!(
        posts[0].headers.get("content-type").expect("content-type"),
        "application/json"
    );
    assert!(posts[0].session_id().is_none());
}

#[tokio::test]
async fn configured_headers_are_sent() {
    let server = MockServer::start().await;
    server.on_post(Reply::json(&result_for(1, &json!({}))));
    let mut transport =
        server.connect_with(server.config().with_header("x-tenant-id", "acme"));

    transport
        .send(ProtocolMessage::request(1, "ping", None))
        .await
        .expect("send");
    next_message(&mut transport).await;

    let posts = server.requests_with(&Method::POST);
    assert_eq!(posts[0].headers.get("x-tenant-id").expect("tenant"), "acme");
}

#[tokio::test]
async fn accepted_produces_no_inbound_item() {
    let server = MockServer::start().await;
    server
        .on_post(Reply::status(202))
        .on_post(Reply::json(&result_for(2, &json!({}))));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::notification("notifications/cancelled", Some(json!({"requestId": 1}))))
        .await
        .expect("send notification");
    transport
        .send(ProtocolMessage::request(2, "ping", None))
        .await
        .expect("send request");

    let first = next_message(&mut transport).await;
    assert_eq!(first.id(), Some(&RequestId::Number(2)));
    assert_eq!(server.requests_with(&Method::POST).len(), 2);
}

#[tokio::test]
async fn array_wrapped_response_uses_first_element() {
    let server = MockServer::start().await;
    server.on_post(Reply::raw(
        200,
        "application/json",
        format!(
            "[{},{}]",
            result_for(4, &json!({"first": true})),
            result_for(5, &json!({"first": false}))
        ),
    ));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(4, "ping", None))
        .await
        .expect("send");

    assert_eq!(
        next_message(&mut transport).await,
        ProtocolMessage::response(4, json!({"first": true}))
    );
}

#[tokio::test]
async fn content_type_parameters_are_accepted() {
    let server = MockServer::start().await;
    server.on_post(Reply::raw(
        200,
        "Application/JSON; charset=utf-8",
        result_for(1, &json!({})).to_string(),
    ));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(1, "ping", None))
        .await
        .expect("send");
    assert!(next_message(&mut transport).await.id().is_some());
}

// ── SSE responses ────────────────────────────────────────────

#[tokio::test]
async fn sse_response_delivers_each_message_event_in_order() {
    let server = MockServer::start().await;
    let progress = json!({
        "jsonrpc": "2.0",
        "method": "notifications/progress",
        "params": {"progressToken": "t", "progress": 50}
    });
    let body = format!(
        "event: message\ndata: {progress}\n\nevent: ping\ndata: keepalive\n\ndata: {}\n\n",
        result_for(9, &json!({"content": []}))
    );
    server.on_post(Reply::raw(200, "text/event-stream", body));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(9, "tools/call", Some(json!({"name": "slow"}))))
        .await
        .expect("send");

    let first = next_message(&mut transport).await;
    assert_eq!(first.method(), Some("notifications/progress"));

    let second = next_message(&mut transport).await;
    assert_eq!(second, ProtocolMessage::response(9, json!({"content": []})));

    // The unknown `ping` event produced nothing; the next item belongs to the next exchange.
    server.on_post(Reply::json(&result_for(10, &json!({}))));
    transport
        .send(ProtocolMessage::request(10, "ping", None))
        .await
        .expect("send");
    assert_eq!(
        next_message(&mut transport).await.id(),
        Some(&RequestId::Number(10))
    );
}

#[tokio::test]
async fn malformed_sse_message_is_reported_and_stream_continues() {
    let server = MockServer::start().await;
    let body = format!(
        "event: message\ndata: {{oops\n\nevent: message\ndata: {}\n\n",
        result_for(3, &json!({}))
    );
    server.on_post(Reply::raw(200, "text/event-stream", body));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(3, "ping", None))
        .await
        .expect("send");

    assert!(matches!(
        next_inbound(&mut transport).await,
        Err(AppError::Decode(_))
    ));
    assert_eq!(
        next_message(&mut transport).await,
        ProtocolMessage::response(3, json!({}))
    );
}

// ── Failures ─────────────────────────────────────────────────

#[tokio::test]
async fn unexpected_content_type_is_transport_error() {
    let server = MockServer::start().await;
    server.on_post(Reply::raw(200, "text/plain", "hello"));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(1, "ping", None))
        .await
        .expect("send");

    match next_inbound(&mut transport).await {
        Err(AppError::Transport(msg)) => assert!(msg.contains("unexpected content type"), "{msg}"),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_reported_and_dispatch_continues() {
    let server = MockServer::start().await;
    server
        .on_post(Reply::status(500))
        .on_post(Reply::json(&result_for(2, &json!({}))));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(1, "ping", None))
        .await
        .expect("send");
    match next_inbound(&mut transport).await {
        Err(AppError::Transport(msg)) => assert!(msg.contains("500"), "{msg}"),
        other => panic!("expected transport error, got {other:?}"),
    }

    transport
        .send(ProtocolMessage::request(2, "ping", None))
        .await
        .expect("send after failure");
    assert_eq!(
        next_message(&mut transport).await,
        ProtocolMessage::response(2, json!({}))
    );
}

#[tokio::test]
async fn invalid_json_body_is_decode_error() {
    let server = MockServer::start().await;
    server.on_post(Reply::raw(200, "application/json", "{not json"));
    let mut transport = server.connect();

    transport
        .send(ProtocolMessage::request(1, "ping", None))
        .await
        .expect("send");

    match next_inbound(&mut transport).await {
        Err(AppError::Decode(msg)) => assert!(msg.starts_with("malformed json"), "{msg}"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let server = MockServer::start().await;
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let port = closed.local_addr().expect("local addr").port();
    drop(closed);

    let mut config = server.config();
    config.endpoint = url::Url::parse(&format!("http://127.0.0.1:{port}/mcp")).expect("url");
    let mut transport = server.connect_with(config);

    transport
        .send(ProtocolMessage::request(1, "ping", None))
        .await
        .expect("send");

    assert!(matches!(
        next_inbound(&mut transport).await,
        Err(AppError::Transport(_))
    ));
}
