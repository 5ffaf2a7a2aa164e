//! End-to-end tests: a WebSocket client subscribes to a resource, a change
//! is injected over HTTP, and the event arrives on the socket. Closing the
//! socket must release the upstream watch.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use changefeed_hub::api;
use changefeed_hub::app_state::AppState;
use changefeed_hub::coordinator::CoordinatorRegistry;
use changefeed_hub::domain::{NotificationBus, ResourceKey};
use changefeed_hub::upstream::{ChangeFeed, InMemoryChangeFeed};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_hub() -> (SocketAddr, Arc<InMemoryChangeFeed>) {
    let local = Arc::new(InMemoryChangeFeed::new());
    let feed: Arc<dyn ChangeFeed> = Arc::clone(&local) as Arc<dyn ChangeFeed>;
    let bus = NotificationBus::new(64);
    let Ok(tasks) = ResourceKey::new("tasks") else {
        panic!("valid key");
    };
    let registry = Arc::new(CoordinatorRegistry::new(
        &feed,
        &bus,
        &[tasks],
        Duration::from_millis(50),
    ));
    let app = api::build_app(AppState {
        registry,
        bus,
        local_feed: Some(Arc::clone(&local)),
    });

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, local)
}

async fn connect(addr: SocketAddr) -> Socket {
    let Ok((socket, _)) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await else {
        panic!("ws connect failed");
    };
    socket
}

async fn send_command(socket: &mut Socket, id: &str, payload: serde_json::Value) {
    let msg = serde_json::json!({
        "id": id,
        "type": "command",
        "timestamp": "2026-01-01T00:00:00Z",
        "payload": payload,
    });
    let Ok(()) = socket.send(Message::text(msg.to_string())).await else {
        panic!("ws send failed");
    };
}

async fn next_json(socket: &mut Socket) -> serde_json::Value {
    loop {
        let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(2), socket.next()).await
        else {
            panic!("no ws message within timeout");
        };
        if let Message::Text(text) = msg {
            let Ok(value) = serde_json::from_str(text.as_str()) else {
                panic!("ws message is not JSON");
            };
            return value;
        }
    }
}

async fn feed_status(client: &reqwest::Client, addr: SocketAddr) -> serde_json::Value {
    let Ok(resp) = client
        .get(format!("http://{addr}/api/v1/feeds/tasks"))
        .send()
        .await
    else {
        panic!("status request failed");
    };
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("status body is not JSON");
    };
    body
}

async fn wait_for_phase(
    client: &reqwest::Client,
    addr: SocketAddr,
    phase: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let status = feed_status(client, addr).await;
        if status["phase"] == phase {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("feed never reached phase {phase}");
}

#[tokio::test]
async fn change_reaches_subscribed_socket_and_close_releases_watch() {
    let (addr, feed) = spawn_hub().await;
    let client = reqwest::Client::new();
    let mut socket = connect(addr).await;

    send_command(
        &mut socket,
        "1",
        serde_json::json!({"command": "subscribe", "identity": "user-1", "resources": ["tasks"]}),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["id"], "1");
    assert_eq!(reply["payload"]["count"], 1);

    let status = wait_for_phase(&client, addr, "active").await;
    assert_eq!(status["subscribers"], 1);
    assert_eq!(status["identity_bound"], true);
    assert!(status.get("identity").is_none());

    let Ok(resp) = client
        .post(format!("http://{addr}/api/v1/feeds/tasks/changes"))
        .json(&serde_json::json!({"payload": {"op": "INSERT", "id": 7}}))
        .send()
        .await
    else {
        panic!("emit request failed");
    };
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("emit body is not JSON");
    };
    assert_eq!(body["delivered"], 1);

    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["payload"]["resource"], "tasks");
    assert_eq!(event["payload"]["payload"]["op"], "INSERT");

    let Ok(()) = socket.close(None).await else {
        panic!("ws close failed");
    };
    let status = wait_for_phase(&client, addr, "idle").await;
    assert_eq!(status["subscribers"], 0);
    assert_eq!(feed.active_watches(), 0);
    assert_eq!(feed.opens(), 1);
}

#[tokio::test]
async fn unknown_resource_is_reported_on_the_socket() {
    let (addr, feed) = spawn_hub().await;
    let mut socket = connect(addr).await;

    send_command(
        &mut socket,
        "9",
        serde_json::json!({"command": "subscribe", "identity": "user-1", "resources": ["invoices"]}),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["id"], "9");
    assert_eq!(reply["payload"]["code"], 2001);
    assert_eq!(feed.opens(), 0);
}

#[tokio::test]
async fn rest_surface_reports_feeds() {
    let (addr, _feed) = spawn_hub().await;
    let client = reqwest::Client::new();

    let Ok(health) = client.get(format!("http://{addr}/health")).send().await else {
        panic!("health request failed");
    };
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let Ok(list) = client.get(format!("http://{addr}/api/v1/feeds")).send().await else {
        panic!("list request failed");
    };
    let Ok(body) = list.json::<serde_json::Value>().await else {
        panic!("list body is not JSON");
    };
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["data"][0]["resource"], "tasks");
    assert_eq!(body["data"][0]["phase"], "idle");

    let Ok(missing) = client
        .get(format!("http://{addr}/api/v1/feeds/invoices"))
        .send()
        .await
    else {
        panic!("status request failed");
    };
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}
