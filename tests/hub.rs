//! End-to-end tests against a running hub bound to loopback.

#![allow(clippy::panic, clippy::indexing_slicing, missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use devhub::app_state::AppState;
use devhub::config::HubConfig;
use devhub::domain::{Clock, ManualClock};
use devhub::error::HubError;
use devhub::server;
use devhub::service::LoggingTransport;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

struct Running {
    state: AppState,
    clock: Arc<ManualClock>,
    http: SocketAddr,
    tcp: SocketAddr,
    task: JoinHandle<Result<(), HubError>>,
}

async fn start() -> Running {
    let Some(t0) = DateTime::from_timestamp(1_700_000_000, 0) else {
        panic!("valid timestamp");
    };
    let clock = Arc::new(ManualClock::new(t0));
    let config = HubConfig::default();
    let state = AppState::new(
        &config,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(LoggingTransport),
    );

    let Ok(http_listener) = server::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await else {
        panic!("http bind failed");
    };
    let Ok(tcp_listener) = server::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await else {
        panic!("tcp bind failed");
    };
    let (Ok(http), Ok(tcp)) = (http_listener.local_addr(), tcp_listener.local_addr()) else {
        panic!("listeners should have local addresses");
    };

    let task = tokio::spawn(server::serve(http_listener, Some(tcp_listener), state.clone()));
    Running {
        state,
        clock,
        http,
        tcp,
        task,
    }
}

async fn connect_observer(http: SocketAddr) -> WsStream {
    let Ok((ws, _)) = tokio_tungstenite::connect_async(format!("ws://{http}/ws")).await else {
        panic!("websocket connect failed");
    };
    ws
}

async fn send_ws(ws: &mut WsStream, msg: Value) {
    if ws.send(Message::text(msg.to_string())).await.is_err() {
        panic!("websocket send failed");
    }
}

async fn next_ws_json(ws: &mut WsStream) -> Value {
    loop {
        let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(5), ws.next()).await
        else {
            panic!("expected a websocket message");
        };
        if let Message::Text(text) = msg {
            let Ok(value) = serde_json::from_str(text.as_str()) else {
                panic!("message should be json");
            };
            return value;
        }
    }
}

async fn send_line(stream: &mut TcpStream, msg: Value) {
    let line = format!("{msg}\n");
    if stream.write_all(line.as_bytes()).await.is_err() {
        panic!("tcp write failed");
    }
}

async fn stop(running: Running) {
    running.state.shutdown.cancel();
    let joined = tokio::time::timeout(Duration::from_secs(5), running.task).await;
    assert!(matches!(joined, Ok(Ok(Ok(())))));
    assert!(running.state.connections.is_empty().await);
}

#[tokio::test]
async fn observer_follows_device_lifecycle() {
    let running = start().await;
    let mut observer = connect_observer(running.http).await;

    // Round-trip once so the observer is in the live set.
    send_ws(&mut observer, json!({"message_type": "get_devices"})).await;
    assert_eq!(
        next_ws_json(&mut observer).await,
        json!({"message_type": "device_list", "devices": []})
    );

    let Ok(mut device) = TcpStream::connect(running.tcp).await else {
        panic!("tcp connect failed");
    };
    send_line(
        &mut device,
        json!({
            "message_type": "register_device",
            "device_id": "lamp-1",
            "name": "Hall Lamp",
            "ip_address": "192.168.0.40",
            "port": 8000,
            "controls": [{"id": "power", "value": false, "type": "toggle"}]
        }),
    )
    .await;

    let list = next_ws_json(&mut observer).await;
    assert_eq!(list["message_type"], "device_list");
    assert_eq!(list["devices"][0]["device_id"], "lamp-1");
    assert_eq!(list["devices"][0]["controls"][0]["type"], "toggle");

    send_line(
        &mut device,
        json!({"message_type": "control_update", "device_id": "lamp-1", "control_id": "power", "value": true}),
    )
    .await;
    assert_eq!(
        next_ws_json(&mut observer).await,
        json!({"message_type": "control_update", "device_id": "lamp-1", "control_id": "power", "value": true})
    );

    running.clock.advance(Duration::from_secs(31));
    running.state.presence.tick().await;
    assert_eq!(
        next_ws_json(&mut observer).await,
        json!({"message_type": "device_status", "device_id": "lamp-1", "online": false})
    );

    send_line(
        &mut device,
        json!({"message_type": "heartbeat", "device_id": "lamp-1"}),
    )
    .await;
    assert_eq!(
        next_ws_json(&mut observer).await,
        json!({"message_type": "device_status", "device_id": "lamp-1", "online": true})
    );

    stop(running).await;
}

#[tokio::test]
async fn tcp_observer_gets_line_framed_replies() {
    let running = start().await;
    let Ok(stream) = TcpStream::connect(running.tcp).await else {
        panic!("tcp connect failed");
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Garbage does not close the connection.
    if write_half.write_all(b"{{{ not json\n").await.is_err() {
        panic!("tcp write failed");
    }
    if write_half
        .write_all(b"{\"message_type\":\"get_devices\"}\n")
        .await
        .is_err()
    {
        panic!("tcp write failed");
    }

    let Ok(Ok(Some(line))) = tokio::time::timeout(Duration::from_secs(5), lines.next_line()).await
    else {
        panic!("expected a reply line");
    };
    let Ok(reply) = serde_json::from_str::<Value>(&line) else {
        panic!("reply should be json");
    };
    assert_eq!(reply, json!({"message_type": "device_list", "devices": []}));

    stop(running).await;
}

#[tokio::test]
async fn rest_snapshot_matches_registry() {
    let running = start().await;
    let mut observer = connect_observer(running.http).await;
    send_ws(
        &mut observer,
        json!({"message_type": "register_device", "device_id": "fan", "ip_address": "10.0.0.3"}),
    )
    .await;
    let list = next_ws_json(&mut observer).await;
    assert_eq!(list["devices"][0]["name"], "Device-fan");

    let url = format!("http://{}/api/v1/devices", running.http);
    let Ok(response) = reqwest::get(&url).await else {
        panic!("rest request failed");
    };
    let Ok(body) = response.json::<Value>().await else {
        panic!("rest body should be json");
    };
    assert_eq!(body["count"], 1);
    assert_eq!(body["devices"][0]["port"], 80);

    let health = format!("http://{}/health", running.http);
    let Ok(response) = reqwest::get(&health).await else {
        panic!("health request failed");
    };
    let Ok(body) = response.json::<Value>().await else {
        panic!("health body should be json");
    };
    assert_eq!(body["devices"], 1);
    assert_eq!(body["connections"], 1);

    drop(observer);
    stop(running).await;
}
