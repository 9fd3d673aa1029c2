//! Integration tests against an in-process WebSocket server.
//!
//! The server speaks just enough of the protocol: it records every request
//! and answers `get_snapshot` with a fixed snapshot.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::mpsc, time::timeout};

use yoyaku_client::{
    client::ConnectionManager,
    config::ClientConfig,
    domain::{CustomerKey, Notification},
    infrastructure::{dto::websocket::OutboundMessage, transport::WebSocketConnector},
};
use yoyaku_shared::time::SystemClock;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ServerState {
    requests: mpsc::UnboundedSender<Value>,
    connections: Arc<AtomicUsize>,
    /// Close the first connection with an application code after the snapshot
    drop_first_connection: bool,
}

/// Start a server on an ephemeral port and return its URL
async fn start_server(
    drop_first_connection: bool,
) -> (String, mpsc::UnboundedReceiver<Value>, Arc<AtomicUsize>) {
    let (requests, requests_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));
    let state = ServerState {
        requests,
        connections: connections.clone(),
        drop_first_connection,
    };
    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}/ws", addr), requests_rx, connections)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    let connection = state.connections.fetch_add(1, Ordering::SeqCst);

    // keep reading after a close so the close handshake completes
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: Value = serde_json::from_str(text.as_str()).unwrap_or_default();
        if request["type"] == "ping" {
            continue;
        }
        let _ = state.requests.send(request.clone());

        if request["type"] == "get_snapshot" {
            let reply = Message::Text(snapshot_frame().to_string().into());
            if socket.send(reply).await.is_err() {
                break;
            }
            if state.drop_first_connection && connection == 0 {
                let close = Message::Close(Some(CloseFrame {
                    code: 4000,
                    reason: "restarting".to_string().into(),
                }));
                if socket.send(close).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn snapshot_frame() -> Value {
    json!({
        "type": "snapshot",
        "timestamp": "2024-05-01T08:59:00Z",
        "data": {
            "reservations": {
                "alice": [
                    {"id": 1, "customer_key": "alice", "date": "2024-05-01", "time_slot": "09:00", "type": 0},
                    {"id": 2, "customer_key": "alice", "date": "2024-05-08", "time_slot": "10:30", "type": 1}
                ]
            },
            "conversations": {
                "alice": [{"role": "user", "message": "Can I come earlier?"}]
            },
            "vacation_periods": [{"start": "2024-08-10", "end": "2024-08-12"}]
        }
    })
}

fn manager_for(url: &str, config: ClientConfig) -> ConnectionManager {
    ConnectionManager::new(
        ClientConfig {
            url: url.to_string(),
            ..config
        },
        Arc::new(WebSocketConnector),
        Arc::new(SystemClock),
    )
}

#[tokio::test]
async fn test_client_receives_snapshot_over_websocket() {
    // テスト項目: 実際の WebSocket 経由で set_filter → get_snapshot が送られ、スナップショットを受け取る
    // given (前提条件):
    let (url, mut requests, _connections) = start_server(false).await;
    let filter = json!({"customer_key": "alice"});
    let manager = manager_for(&url, ClientConfig::default().with_filter(filter.clone()));

    // when (操作):
    let mut subscription = manager.attach();
    let snapshot = timeout(WAIT, subscription.snapshot_changed())
        .await
        .expect("snapshot did not arrive in time")
        .expect("manager dropped");

    // then (期待する結果):
    assert!(subscription.status());
    assert_eq!(snapshot.reservation_count(), 2);
    assert_eq!(snapshot.conversation_for(&CustomerKey::new("alice")).len(), 1);
    assert_eq!(snapshot.vacation_periods.len(), 1);
    assert_eq!(
        requests.recv().await,
        Some(json!({"type": "set_filter", "filters": filter}))
    );
    assert_eq!(requests.recv().await, Some(json!({"type": "get_snapshot"})));
    assert_eq!(
        subscription.next_notification().await,
        Some(Notification::SnapshotReplaced)
    );

    manager.shutdown();
    timeout(WAIT, subscription.wait_for_status(false))
        .await
        .expect("connection did not close in time");
    assert!(!manager.is_connected());
    assert_eq!(manager.active_handle(), None);
}

#[tokio::test]
async fn test_client_reconnects_after_abnormal_close() {
    // テスト項目: サーバーが 1000 以外のコードで切断すると、再接続してスナップショットを取り直す
    // given (前提条件):
    let (url, mut requests, connections) = start_server(true).await;
    let manager = manager_for(&url, ClientConfig::default());

    // when (操作):
    let _subscription = manager.attach();
    let first = timeout(WAIT, requests.recv()).await.expect("first request");
    let second = timeout(WAIT, requests.recv()).await.expect("second request");

    // then (期待する結果):
    assert_eq!(first, Some(json!({"type": "get_snapshot"})));
    assert_eq!(second, Some(json!({"type": "get_snapshot"})));
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    manager.shutdown();
}

#[tokio::test]
async fn test_mutation_is_delivered_once_connected() {
    // テスト項目: 接続前に送ったミューテーションは接続後にサーバーへ届く
    // given (前提条件):
    let (url, mut requests, _connections) = start_server(false).await;
    let manager = manager_for(&url, ClientConfig::default());
    let mutation = OutboundMessage::mutation(
        "modify_reservation",
        json!({"id": 1, "date": "2024-05-01", "time_slot": "13:10"}),
    );

    // when (操作):
    manager.send(mutation);
    let _subscription = manager.attach();
    let first = timeout(WAIT, requests.recv()).await.expect("first request");
    let second = timeout(WAIT, requests.recv()).await.expect("second request");

    // then (期待する結果):
    assert_eq!(first, Some(json!({"type": "get_snapshot"})));
    assert_eq!(
        second,
        Some(json!({
            "type": "modify_reservation",
            "data": {"id": 1, "date": "2024-05-01", "time_slot": "13:10"}
        }))
    );

    manager.shutdown();
}
