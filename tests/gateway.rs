//! End-to-end tests: a real server on an ephemeral port, driven through
//! WebSocket and REST clients.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_gateway::app_state::AppState;
use relay_gateway::config::GatewayConfig;
use relay_gateway::domain::Raw;
use relay_gateway::mediator::{
    ClientError, ConnectContext, ConnectHandler, ConnectReply, Disconnect, DisconnectContext,
    DisconnectHandler, DisconnectReply, HookRegistry, MessageContext, MessageHandler,
    MessageReply, PresenceContext, PresenceHandler, PresenceReply, PublishContext,
    PublishHandler, PublishReply, RefreshContext, RefreshHandler, RefreshReply, RpcContext,
    RpcHandler, RpcReply, Scope, SubscribeContext, SubscribeHandler, SubscribeReply,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Payload whose key order and big integer do not survive a round trip
/// through `serde_json::Value`.
const EXACT: &str = r#"{"z":1,"a":12345678901234567890123}"#;

/// Rejects `mallory`, allows `public:` channels only, forbids publishing
/// into `public:readonly`, and reports every disconnect.
#[derive(Debug)]
struct Policy {
    disconnects: mpsc::UnboundedSender<(String, u16)>,
}

#[async_trait]
impl ConnectHandler for Policy {
    async fn on_connect(&self, _scope: Scope, ctx: ConnectContext<'_>) -> ConnectReply {
        if ctx.client.user() == "mallory" {
            ConnectReply::disconnect(Disconnect::invalid_token())
        } else {
            ConnectReply::accept()
        }
    }
}

#[async_trait]
impl SubscribeHandler for Policy {
    async fn on_subscribe(&self, _scope: Scope, ctx: SubscribeContext<'_>) -> SubscribeReply {
        if ctx.channel.starts_with("public:") {
            SubscribeReply::accept()
        } else {
            SubscribeReply::reject(ClientError::permission_denied())
        }
    }
}

#[async_trait]
impl PublishHandler for Policy {
    async fn on_publish(&self, _scope: Scope, ctx: PublishContext<'_>) -> PublishReply {
        if ctx.channel == "public:readonly" {
            PublishReply::reject(ClientError::permission_denied())
        } else {
            PublishReply::accept()
        }
    }
}

#[async_trait]
impl DisconnectHandler for Policy {
    async fn on_disconnect(&self, _scope: Scope, ctx: DisconnectContext<'_>) -> DisconnectReply {
        let _ = self
            .disconnects
            .send((ctx.client.user().to_string(), ctx.disconnect.code));
        DisconnectReply
    }
}

/// Hooks exercising the session's timers and failure paths.
///
/// Connect requires info. Refresh extends `extend` and lets everyone else
/// lapse. Presence evicts `evict`. Messages from `boom` panic. RPC always
/// answers [`EXACT`].
#[derive(Debug)]
struct Lifecycle {
    presences: mpsc::UnboundedSender<(String, Vec<String>)>,
    messages: mpsc::UnboundedSender<Raw>,
}

#[async_trait]
impl ConnectHandler for Lifecycle {
    async fn on_connect(&self, _scope: Scope, ctx: ConnectContext<'_>) -> ConnectReply {
        if ctx.client.info().is_some() {
            ConnectReply::accept()
        } else {
            ConnectReply::reject(ClientError::unauthorized())
        }
    }
}

#[async_trait]
impl RefreshHandler for Lifecycle {
    async fn on_refresh(&self, _scope: Scope, ctx: RefreshContext<'_>) -> RefreshReply {
        if ctx.client.user() == "extend" {
            RefreshReply::extend(
                chrono::Utc::now() + chrono::TimeDelta::minutes(1),
                Some(Raw::from(r#"{"level":2}"#)),
            )
        } else {
            RefreshReply::default()
        }
    }
}

#[async_trait]
impl PresenceHandler for Lifecycle {
    async fn on_presence(&self, _scope: Scope, ctx: PresenceContext<'_>) -> PresenceReply {
        let user = ctx.client.user().to_string();
        let _ = self.presences.send((user.clone(), ctx.channels.to_vec()));
        PresenceReply {
            disconnect: (user == "evict").then(Disconnect::force),
        }
    }
}

#[async_trait]
impl MessageHandler for Lifecycle {
    async fn on_message(&self, _scope: Scope, ctx: MessageContext<'_>) -> MessageReply {
        if ctx.client.user() == "boom" {
            panic!("message handler exploded");
        }
        let _ = self.messages.send(ctx.data.clone());
        MessageReply::default()
    }
}

#[async_trait]
impl RpcHandler for Lifecycle {
    async fn on_rpc(&self, _scope: Scope, _ctx: RpcContext<'_>) -> RpcReply {
        RpcReply::data(Raw::from(EXACT))
    }
}

struct LifecycleServer {
    addr: SocketAddr,
    presences: mpsc::UnboundedReceiver<(String, Vec<String>)>,
    messages: mpsc::UnboundedReceiver<Raw>,
}

async fn start_lifecycle() -> LifecycleServer {
    let (presence_tx, presences) = mpsc::unbounded_channel();
    let (message_tx, messages) = mpsc::unbounded_channel();
    let hooks = Arc::new(Lifecycle {
        presences: presence_tx,
        messages: message_tx,
    });
    let registry = HookRegistry::new()
        .on_connect(Arc::clone(&hooks) as Arc<dyn ConnectHandler>)
        .on_refresh(Arc::clone(&hooks) as Arc<dyn RefreshHandler>)
        .on_presence(Arc::clone(&hooks) as Arc<dyn PresenceHandler>)
        .on_message(Arc::clone(&hooks) as Arc<dyn MessageHandler>)
        .on_rpc(hooks);
    let config = GatewayConfig {
        presence_interval_secs: 1,
        ..GatewayConfig::default()
    };
    LifecycleServer {
        addr: spawn(config, registry).await,
        presences,
        messages,
    }
}

async fn start() -> (SocketAddr, mpsc::UnboundedReceiver<(String, u16)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let policy = Arc::new(Policy { disconnects: tx });
    let hooks = HookRegistry::new()
        .on_connect(Arc::clone(&policy) as Arc<dyn ConnectHandler>)
        .on_subscribe(Arc::clone(&policy) as Arc<dyn SubscribeHandler>)
        .on_publish(Arc::clone(&policy) as Arc<dyn PublishHandler>)
        .on_disconnect(policy);
    (spawn(GatewayConfig::default(), hooks).await, rx)
}

async fn spawn(config: GatewayConfig, hooks: HookRegistry) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind must succeed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener must have an address");
    };
    let app = relay_gateway::router(AppState::new(config, hooks));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn open(addr: SocketAddr) -> Ws {
    let Ok((ws, _)) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await else {
        panic!("websocket handshake must succeed");
    };
    ws
}

async fn send_text(ws: &mut Ws, text: String) {
    let Ok(()) = ws.send(Message::text(text)).await else {
        panic!("send must succeed");
    };
}

async fn command(ws: &mut Ws, id: &str, payload: Value) {
    let frame = json!({ "id": id, "type": "command", "payload": payload });
    send_text(ws, frame.to_string()).await;
}

/// Sends a command whose payload is written out literally.
async fn raw_command(ws: &mut Ws, id: &str, payload: &str) {
    send_text(
        ws,
        format!(r#"{{"id":"{id}","type":"command","payload":{payload}}}"#),
    )
    .await;
}

/// Next text frame as sent by the server, or `None` once the socket closed.
async fn text_frame(ws: &mut Ws) -> Option<String> {
    loop {
        let Ok(next) = tokio::time::timeout(Duration::from_secs(5), ws.next()).await else {
            panic!("timed out waiting for a frame");
        };
        match next {
            Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => {}
        }
    }
}

/// Next JSON frame, or `None` once the server closed the socket.
async fn frame(ws: &mut Ws) -> Option<Value> {
    let text = text_frame(ws).await?;
    let Ok(value) = serde_json::from_str(&text) else {
        panic!("server frames are JSON: {text}");
    };
    Some(value)
}

async fn expect(ws: &mut Ws) -> Value {
    let Some(value) = frame(ws).await else {
        panic!("socket closed unexpectedly");
    };
    value
}

async fn connect(ws: &mut Ws, user: &str) -> Value {
    command(ws, "c", json!({ "command": "connect", "user": user })).await;
    expect(ws).await
}

#[tokio::test]
async fn commands_before_connect_are_unauthorized() {
    let (addr, _disconnects) = start().await;
    let mut ws = open(addr).await;

    command(&mut ws, "1", json!({ "command": "subscribe", "channel": "public:a" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["id"], "1");
    assert_eq!(reply["payload"]["code"], 101);

    command(&mut ws, "2", json!({ "command": "teleport" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["payload"]["code"], 104);
}

#[tokio::test]
async fn connect_hook_can_refuse_the_connection() {
    let (addr, mut disconnects) = start().await;
    let mut ws = open(addr).await;

    let reply = connect(&mut ws, "mallory").await;
    assert_eq!(reply["type"], "disconnect");
    assert_eq!(reply["payload"]["code"], 3002);
    assert!(frame(&mut ws).await.is_none());

    // A refused connect never becomes a session, so no disconnect hook.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(disconnects.try_recv().is_err());
}

#[tokio::test]
async fn subscribe_publish_and_rpc_follow_hook_verdicts() {
    let (addr, _disconnects) = start().await;
    let mut ws = open(addr).await;

    let reply = connect(&mut ws, "alice").await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["payload"]["user"], "alice");

    command(&mut ws, "s1", json!({ "command": "subscribe", "channel": "secret" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], 103);

    command(&mut ws, "s2", json!({ "command": "subscribe", "channel": "public:news" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["id"], "s2");

    command(&mut ws, "s3", json!({ "command": "subscribe", "channel": "public:news" })).await;
    assert_eq!(expect(&mut ws).await["payload"]["code"], 105);

    command(
        &mut ws,
        "p1",
        json!({ "command": "publish", "channel": "public:readonly", "data": 1 }),
    )
    .await;
    assert_eq!(expect(&mut ws).await["payload"]["code"], 103);

    command(
        &mut ws,
        "p2",
        json!({ "command": "publish", "channel": "public:news", "data": { "text": "hello" } }),
    )
    .await;
    // The publication comes back as an event and the command is answered;
    // their relative order depends on the broker.
    let mut saw_event = false;
    let mut saw_response = false;
    for _ in 0..2 {
        let msg = expect(&mut ws).await;
        match msg["type"].as_str() {
            Some("event") => {
                assert_eq!(msg["payload"]["channel"], "public:news");
                assert_eq!(msg["payload"]["publication"]["data"]["text"], "hello");
                assert_eq!(msg["payload"]["publication"]["info"]["user"], "alice");
                saw_event = true;
            }
            Some("response") => {
                assert_eq!(msg["id"], "p2");
                saw_response = true;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert!(saw_event && saw_response);

    command(&mut ws, "r1", json!({ "command": "rpc", "data": { "method": "x" } })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], 108);
}

#[tokio::test]
async fn rest_publish_push_and_forced_disconnect_reach_the_session() {
    let (addr, mut disconnects) = start().await;
    let http = reqwest::Client::new();
    let mut ws = open(addr).await;

    let reply = connect(&mut ws, "bob").await;
    let Some(client) = reply["payload"]["client"].as_str().map(str::to_string) else {
        panic!("connect response carries the client id");
    };
    command(&mut ws, "s", json!({ "command": "subscribe", "channel": "public:feed" })).await;
    assert_eq!(expect(&mut ws).await["type"], "response");

    let Ok(presence) = http
        .get(format!("http://{addr}/api/v1/channels/public:feed/presence"))
        .send()
        .await
    else {
        panic!("presence request must succeed");
    };
    let Ok(presence) = presence.json::<Value>().await else {
        panic!("presence response is JSON");
    };
    assert_eq!(presence["members"][0]["user"], "bob");

    let Ok(_) = http
        .post(format!("http://{addr}/api/v1/publish"))
        .json(&json!({ "channel": "public:feed", "data": [1, 2, 3] }))
        .send()
        .await
    else {
        panic!("publish request must succeed");
    };
    let event = expect(&mut ws).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["payload"]["publication"]["data"], json!([1, 2, 3]));
    assert!(event["payload"]["publication"].get("info").is_none());

    let Ok(_) = http
        .post(format!("http://{addr}/api/v1/clients/{client}/push"))
        .json(&json!({ "data": { "notice": "hi" } }))
        .send()
        .await
    else {
        panic!("push request must succeed");
    };
    let push = expect(&mut ws).await;
    assert_eq!(push["type"], "message");
    assert_eq!(push["payload"]["notice"], "hi");

    let Ok(_) = http
        .post(format!("http://{addr}/api/v1/clients/{client}/disconnect"))
        .json(&json!({ "code": 4001, "reason": "maintenance" }))
        .send()
        .await
    else {
        panic!("disconnect request must succeed");
    };
    let notice = expect(&mut ws).await;
    assert_eq!(notice["type"], "disconnect");
    assert_eq!(notice["payload"]["code"], 4001);
    assert_eq!(notice["payload"]["reason"], "maintenance");
    assert!(frame(&mut ws).await.is_none());

    let Ok(Some((user, code))) =
        tokio::time::timeout(Duration::from_secs(5), disconnects.recv()).await
    else {
        panic!("disconnect hook must fire");
    };
    assert_eq!(user, "bob");
    assert_eq!(code, 4001);

    let Ok(clients) = http.get(format!("http://{addr}/api/v1/clients")).send().await else {
        panic!("list request must succeed");
    };
    let Ok(clients) = clients.json::<Value>().await else {
        panic!("client list is JSON");
    };
    assert_eq!(clients["total"], 0);
}

// Session timers, failure paths and payload fidelity.

fn unix_in(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

/// Connects `user` with info, optionally with a credential deadline.
async fn connect_with_info(ws: &mut Ws, user: &str, expire_at: Option<i64>) -> Value {
    let mut payload = json!({ "command": "connect", "user": user, "info": { "t": 1 } });
    if let Some(at) = expire_at {
        payload["expire_at"] = json!(at);
    }
    command(ws, "c", payload).await;
    let reply = expect(ws).await;
    assert_eq!(reply["type"], "response", "connect of {user} refused: {reply}");
    reply
}

#[tokio::test]
async fn connect_business_error_allows_retry() {
    let server = start_lifecycle().await;
    let mut ws = open(server.addr).await;

    command(&mut ws, "c1", json!({ "command": "connect", "user": "carol" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["id"], "c1");
    assert_eq!(reply["payload"]["code"], 101);

    let reply = connect_with_info(&mut ws, "carol", None).await;
    assert_eq!(reply["payload"]["user"], "carol");
}

#[tokio::test]
async fn rpc_reply_and_publications_keep_their_bytes() {
    let server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "dave", None).await;

    command(&mut ws, "r", json!({ "command": "rpc", "data": null })).await;
    let Some(reply) = text_frame(&mut ws).await else {
        panic!("rpc must be answered");
    };
    assert!(
        reply.contains(&format!(r#""payload":{{"data":{EXACT}}}"#)),
        "rpc reply altered: {reply}"
    );

    command(&mut ws, "s", json!({ "command": "subscribe", "channel": "raw" })).await;
    assert_eq!(expect(&mut ws).await["type"], "response");
    raw_command(
        &mut ws,
        "p",
        &format!(r#"{{"command":"publish","channel":"raw","data":{EXACT}}}"#),
    )
    .await;
    let mut event = None;
    for _ in 0..2 {
        let Some(text) = text_frame(&mut ws).await else {
            panic!("socket closed unexpectedly");
        };
        if text.contains(r#""type":"event""#) {
            event = Some(text);
        }
    }
    let Some(event) = event else {
        panic!("publication must be forwarded");
    };
    assert!(
        event.contains(&format!(r#""data":{EXACT}"#)),
        "publication altered: {event}"
    );
}

#[tokio::test]
async fn messages_reach_the_hook_and_are_never_answered() {
    let mut server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "erin", None).await;

    raw_command(
        &mut ws,
        "m",
        &format!(r#"{{"command":"message","data":{EXACT}}}"#),
    )
    .await;
    command(&mut ws, "q", json!({ "command": "presence", "channel": "none" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["id"], "q");
    assert_eq!(reply["type"], "response");

    let Ok(Some(data)) = tokio::time::timeout(Duration::from_secs(5), server.messages.recv()).await
    else {
        panic!("message hook must fire");
    };
    assert_eq!(data.as_bytes(), EXACT.as_bytes());
}

#[tokio::test]
async fn panicking_hook_closes_with_server_error() {
    let server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "boom", None).await;

    command(&mut ws, "m", json!({ "command": "message", "data": 1 })).await;
    let notice = expect(&mut ws).await;
    assert_eq!(notice["type"], "disconnect");
    assert_eq!(notice["payload"]["code"], Disconnect::server_error().code);
    assert!(frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn periodic_presence_reports_sorted_channels() {
    let mut server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "frank", None).await;
    for channel in ["b", "a"] {
        command(&mut ws, channel, json!({ "command": "subscribe", "channel": channel })).await;
        assert_eq!(expect(&mut ws).await["type"], "response");
    }

    let Ok(Some((user, channels))) =
        tokio::time::timeout(Duration::from_secs(5), server.presences.recv()).await
    else {
        panic!("presence hook must fire");
    };
    assert_eq!(user, "frank");
    assert_eq!(channels, vec!["a".to_string(), "b".to_string()]);

    command(&mut ws, "q", json!({ "command": "presence", "channel": "a" })).await;
    assert_eq!(expect(&mut ws).await["type"], "response");
}

#[tokio::test]
async fn presence_hook_can_evict() {
    let server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "evict", None).await;
    command(&mut ws, "s", json!({ "command": "subscribe", "channel": "room" })).await;
    assert_eq!(expect(&mut ws).await["type"], "response");

    let notice = expect(&mut ws).await;
    assert_eq!(notice["type"], "disconnect");
    assert_eq!(notice["payload"]["code"], Disconnect::force().code);
    assert!(frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn lapsed_credentials_close_with_expired() {
    let server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "lapse", Some(unix_in(2))).await;

    let notice = expect(&mut ws).await;
    assert_eq!(notice["type"], "disconnect");
    assert_eq!(notice["payload"]["code"], Disconnect::expired().code);
    assert!(frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn extended_credentials_send_refresh_and_replace_info() {
    let server = start_lifecycle().await;
    let mut ws = open(server.addr).await;
    connect_with_info(&mut ws, "extend", Some(unix_in(2))).await;

    let notice = expect(&mut ws).await;
    assert_eq!(notice["type"], "refresh");
    let Some(expire_at) = notice["payload"]["expire_at"].as_i64() else {
        panic!("refresh carries the new deadline");
    };
    assert!(expire_at > unix_in(30));

    let Ok(clients) = reqwest::get(format!("http://{}/api/v1/clients?user=extend", server.addr))
        .await
    else {
        panic!("list request must succeed");
    };
    let Ok(clients) = clients.json::<Value>().await else {
        panic!("client list is JSON");
    };
    assert_eq!(clients["data"][0]["info"], json!({ "level": 2 }));

    command(&mut ws, "q", json!({ "command": "presence", "channel": "x" })).await;
    assert_eq!(expect(&mut ws).await["type"], "response");
}

#[tokio::test]
async fn deadline_without_refresh_hook_is_cleared() {
    let (addr, _disconnects) = start().await;
    let mut ws = open(addr).await;
    command(
        &mut ws,
        "c",
        json!({ "command": "connect", "user": "gina", "expire_at": unix_in(1) }),
    )
    .await;
    assert_eq!(expect(&mut ws).await["type"], "response");

    tokio::time::sleep(Duration::from_millis(2500)).await;
    command(&mut ws, "q", json!({ "command": "presence", "channel": "x" })).await;
    let reply = expect(&mut ws).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["id"], "q");
}
