// Integration tests for `WebSocketSession` against a loopback server.
#![allow(clippy::unwrap_used)]

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use scenesync_api::protocol::auth_response;
use scenesync_api::{
    BatchRequest, ConnectTarget, Connector, Error, EventSubscription, Session, TransportEvent,
    WebSocketConnector,
};

type ServerWs = WebSocketStream<TcpStream>;

// ── Helpers ─────────────────────────────────────────────────────────

/// Accept one connection, answer the upgrade with the expected
/// subprotocol, then hand the socket to `script`.
async fn serve<F, Fut>(script: F) -> ConnectTarget
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |_req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                resp.headers_mut().insert(
                    "sec-websocket-protocol",
                    HeaderValue::from_static("obswebsocket.json"),
                );
                Ok(resp)
            },
        )
        .await
        .unwrap();
        script(ws).await;
    });
    ConnectTarget::new("127.0.0.1", port).unwrap()
}

async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Plain Hello (no auth) → Identify → Identified. Returns the identify body.
async fn identify(ws: &mut ServerWs) -> Value {
    send_json(ws, json!({ "op": 0, "d": { "obsWebSocketVersion": "5.4.2", "rpcVersion": 1 } })).await;
    let frame = recv_json(ws).await;
    send_json(ws, json!({ "op": 2, "d": { "negotiatedRpcVersion": 1 } })).await;
    frame["d"].clone()
}

fn success(request: &Value, data: Value) -> Value {
    json!({
        "requestType": request["requestType"],
        "requestId": request["requestId"],
        "requestStatus": { "result": true, "code": 100 },
        "responseData": data,
    })
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_and_unary_call() {
    let target = serve(|mut ws| async move {
        let identify = identify(&mut ws).await;
        assert_eq!(identify["rpcVersion"], 1);
        assert_eq!(
            identify["eventSubscriptions"],
            EventSubscription::default().bits()
        );
        assert!(identify.get("authentication").is_none());

        let request = recv_json(&mut ws).await;
        assert_eq!(request["op"], 6);
        assert_eq!(request["d"]["requestType"], "GetVersion");
        let reply = success(&request["d"], json!({ "obsVersion": "30.1.0" }));
        send_json(&mut ws, json!({ "op": 7, "d": reply })).await;
        let _ = ws.next().await;
    })
    .await;

    let (session, _events) = WebSocketConnector::default().connect(&target).await.unwrap();
    assert_eq!(session.rpc_version(), 1);

    let version = session.call("GetVersion", None).await.unwrap();
    assert_eq!(version["obsVersion"], "30.1.0");
    session.close().await;
}

#[tokio::test]
async fn test_authenticated_handshake() {
    let target = serve(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "op": 0, "d": {
                "rpcVersion": 1,
                "authentication": { "challenge": "chal", "salt": "salt" }
            }}),
        )
        .await;
        let frame = recv_json(&mut ws).await;
        assert_eq!(
            frame["d"]["authentication"],
            auth_response("hunter2", "salt", "chal")
        );
        send_json(&mut ws, json!({ "op": 2, "d": { "negotiatedRpcVersion": 1 } })).await;
        let _ = ws.next().await;
    })
    .await
    .with_password(Some("hunter2".to_owned().into()));

    let (session, _events) = WebSocketConnector::default().connect(&target).await.unwrap();
    session.close().await;
}

#[tokio::test]
async fn test_missing_password_is_reported() {
    let target = serve(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "op": 0, "d": {
                "rpcVersion": 1,
                "authentication": { "challenge": "chal", "salt": "salt" }
            }}),
        )
        .await;
        let _ = ws.next().await;
    })
    .await;

    let err = WebSocketConnector::default()
        .connect(&target)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::AuthenticationRequired), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_rejected_password_closes_with_4009() {
    let target = serve(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "op": 0, "d": {
                "rpcVersion": 1,
                "authentication": { "challenge": "chal", "salt": "salt" }
            }}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4009),
            reason: "Authentication failed.".into(),
        }))
        .await
        .unwrap();
        let _ = ws.next().await;
    })
    .await
    .with_password(Some("wrong".to_owned().into()));

    let err = WebSocketConnector::default()
        .connect(&target)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Authentication { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_server_without_subprotocol_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = tokio_tungstenite::accept_async(stream).await;
    });

    let target = ConnectTarget::new("127.0.0.1", port).unwrap();
    let err = WebSocketConnector::default()
        .connect(&target)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::UnsupportedProtocol(_)), "got {err:?}");
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let target = ConnectTarget::new("127.0.0.1", port).unwrap();
    let err = WebSocketConnector::default()
        .connect(&target)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::ConnectionRefused { .. }), "got {err:?}");
    assert!(err.is_transient());
}

// ── Requests ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_request_carries_status_code() {
    let target = serve(|mut ws| async move {
        identify(&mut ws).await;
        let request = recv_json(&mut ws).await;
        send_json(
            &mut ws,
            json!({ "op": 7, "d": {
                "requestType": request["d"]["requestType"],
                "requestId": request["d"]["requestId"],
                "requestStatus": { "result": false, "code": 604, "comment": "no audio" }
            }}),
        )
        .await;
        let _ = ws.next().await;
    })
    .await;

    let (session, _events) = WebSocketConnector::default().connect(&target).await.unwrap();
    let err = session
        .call("GetInputAudioTracks", Some(json!({ "inputName": "Camera" })))
        .await
        .unwrap_err();
    assert_eq!(err.request_code(), Some(604));
    assert!(err.is_capability_absent());
    session.close().await;
}

#[tokio::test]
async fn test_batch_reports_per_item_status() {
    let target = serve(|mut ws| async move {
        identify(&mut ws).await;
        let batch = recv_json(&mut ws).await;
        assert_eq!(batch["op"], 8);
        assert_eq!(batch["d"]["haltOnFailure"], false);

        let results: Vec<Value> = batch["d"]["requests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| {
                if r["requestId"] == "B" {
                    json!({
                        "requestType": r["requestType"],
                        "requestId": "B",
                        "requestStatus": { "result": false, "code": 600, "comment": "gone" }
                    })
                } else {
                    success(r, json!({ "videoActive": true }))
                }
            })
            .collect();
        send_json(
            &mut ws,
            json!({ "op": 9, "d": { "requestId": batch["d"]["requestId"], "results": results } }),
        )
        .await;
        let _ = ws.next().await;
    })
    .await;

    let (session, _events) = WebSocketConnector::default().connect(&target).await.unwrap();
    let requests = ["A", "B", "C"]
        .into_iter()
        .map(|name| {
            BatchRequest::new(name, "GetSourceActive").with_data(json!({ "sourceName": name }))
        })
        .collect();
    let results = session.call_batch(requests).await.unwrap();

    let status: Vec<(&str, bool)> = results
        .iter()
        .map(|r| (r.request_id.as_str(), r.is_ok()))
        .collect();
    assert_eq!(status, [("A", true), ("B", false), ("C", true)]);
    session.close().await;
}

// ── Event stream ────────────────────────────────────────────────────

#[tokio::test]
async fn test_events_arrive_in_order_then_close() {
    let target = serve(|mut ws| async move {
        identify(&mut ws).await;
        for name in ["Intro", "Main", "Outro"] {
            send_json(
                &mut ws,
                json!({ "op": 5, "d": {
                    "eventType": "SceneCreated",
                    "eventIntent": 4,
                    "eventData": { "sceneName": name, "isGroup": false }
                }}),
            )
            .await;
        }
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
        let _ = ws.next().await;
    })
    .await;

    let (session, mut events) = WebSocketConnector::default().connect(&target).await.unwrap();

    let mut scenes = Vec::new();
    let closed = loop {
        match events.recv().await.unwrap() {
            TransportEvent::Event(event) => {
                scenes.push(event.event_data.unwrap()["sceneName"].as_str().unwrap().to_owned());
            }
            closed @ TransportEvent::Closed { .. } => break closed,
        }
    };

    assert_eq!(scenes, ["Intro", "Main", "Outro"]);
    assert_eq!(
        closed,
        TransportEvent::Closed {
            code: Some(1000),
            reason: "bye".into()
        }
    );

    let err = session.call("GetStats", None).await.unwrap_err();
    assert!(err.is_not_connected(), "got {err:?}");
}
