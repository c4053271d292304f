//! WebSocket session state machine.
//!
//! Runs the read/write loop for a single WebSocket connection. The session
//! is Connecting until a `connect` command is accepted by the mediator,
//! then Active until it is torn down. Every lifecycle event goes through
//! the mediator and its verdict decides what the session does next.
//! Commands are processed one at a time, so events of one connection reach
//! hooks in the order the session observed them.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

use super::messages::{
    ConnectResult, PresenceResult, PublishResult, RpcResult, SubscribeResult, UnsubscribeResult,
    WsCommand, WsMessage,
};
use super::subscription::SubscriptionSet;
use crate::app_state::AppState;
use crate::domain::{ChannelPublication, ClientId, Publication, Raw};
use crate::mediator::{Client, ClientError, CredentialUpdate, Disconnect, Termination, Verdict};

/// What the read/write loop does after handling one input.
#[derive(Debug)]
enum Flow {
    Continue,
    Close(Disconnect),
}

/// Per-connection session state.
struct Session {
    state: AppState,
    id: ClientId,
    client: Option<Arc<Client>>,
    pushes: Option<mpsc::UnboundedReceiver<Raw>>,
    subs: SubscriptionSet,
    deadline: Option<DateTime<Utc>>,
    /// Serialized frames waiting to be written.
    outbox: Vec<String>,
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and reports them to the mediator.
/// - Forwards publications of subscribed channels from the broker.
/// - Delivers push messages queued through [`Client::send`].
/// - Runs periodic presence updates and credential refreshes.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut publications = state.broker.subscribe();
    let period = state.config.presence_interval();
    let mut presence_tick = tokio::time::interval_at(Instant::now() + period, period);
    presence_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut session = Session::new(state);
    tracing::debug!(client = %session.id, "ws connection opened");

    let disconnect = loop {
        let flow = tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => Flow::Close(Disconnect::normal()),
                Some(Err(err)) => {
                    tracing::debug!(client = %session.id, error = %err, "ws read failed");
                    Flow::Close(Disconnect::normal())
                }
                Some(Ok(_)) => Flow::Continue,
            },
            Some(data) = next_push(&mut session.pushes) => {
                session.push(&data);
                Flow::Continue
            }
            publication = publications.recv() => match publication {
                Ok(publication) => {
                    session.forward(&publication);
                    Flow::Continue
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(client = %session.id, lagged = n, "ws client lagged behind broker");
                    Flow::Continue
                }
                Err(broadcast::error::RecvError::Closed) => Flow::Close(Disconnect::shutdown()),
            },
            _ = presence_tick.tick() => session.presence_update().await,
            () = until(session.deadline) => session.refresh().await,
            () = closed(session.client.as_deref()) => Flow::Close(Disconnect::normal()),
        };

        let mut write_failed = false;
        for frame in session.outbox.drain(..) {
            if ws_tx.send(Message::text(frame)).await.is_err() {
                write_failed = true;
                break;
            }
        }

        match flow {
            Flow::Close(disconnect) => break disconnect,
            Flow::Continue if write_failed => break Disconnect::normal(),
            Flow::Continue => {}
        }
    };

    session.teardown(disconnect, &mut ws_tx).await;
}

impl Session {
    fn new(state: AppState) -> Self {
        Self {
            state,
            id: ClientId::new(),
            client: None,
            pushes: None,
            subs: SubscriptionSet::new(),
            deadline: None,
            outbox: Vec::new(),
        }
    }

    /// Queues a frame. A frame whose payload is not valid JSON is dropped;
    /// if it answered a command, the command gets an internal error instead.
    fn emit<P: Serialize>(&mut self, frame: WsMessage<P>) {
        match frame.to_json() {
            Ok(text) => self.outbox.push(text),
            Err(err) => {
                tracing::warn!(
                    client = %self.id,
                    kind = ?frame.msg_type,
                    error = %err,
                    "frame payload is not valid JSON, dropped"
                );
                if !frame.id.is_empty() {
                    let error = ClientError::internal();
                    if let Ok(text) = WsMessage::error(frame.id.as_str(), &error).to_json() {
                        self.outbox.push(text);
                    }
                }
            }
        }
    }

    fn respond<P: Serialize>(&mut self, id: &str, payload: P) {
        self.emit(WsMessage::response(id, payload));
    }

    fn fail(&mut self, id: &str, error: &ClientError) {
        self.emit(WsMessage::error(id, error));
    }

    /// Queues the error of a terminating reply and closes the session.
    fn terminate(&mut self, id: &str, termination: Termination) -> Flow {
        if let Some(error) = &termination.error {
            self.fail(id, error);
        }
        Flow::Close(termination.disconnect)
    }

    async fn handle_text(&mut self, text: &str) -> Flow {
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            self.fail("", &ClientError::new(107, "malformed JSON"));
            return Flow::Continue;
        };

        let command = match WsCommand::parse(&msg.payload) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(client = %self.id, error = %err, "command refused");
                self.fail(&msg.id, &err.to_client_error());
                return Flow::Continue;
            }
        };

        let id = msg.id;
        let Some(client) = self.client.clone() else {
            return match command {
                WsCommand::Connect {
                    user,
                    info,
                    expire_at,
                } => self.connect(&id, user, info, expire_at).await,
                _ => {
                    self.fail(&id, &ClientError::unauthorized());
                    Flow::Continue
                }
            };
        };

        match command {
            WsCommand::Connect { .. } => {
                self.fail(&id, &ClientError::new(107, "already connected"));
                Flow::Continue
            }
            WsCommand::Subscribe { channel } => self.subscribe(&client, &id, &channel).await,
            WsCommand::Unsubscribe { channel } => self.unsubscribe(&client, &id, &channel).await,
            WsCommand::Publish { channel, data } => {
                self.publish(&client, &id, &channel, data).await
            }
            WsCommand::Presence { channel } => {
                let presence = self.state.presence.members(&channel).await;
                self.respond(
                    &id,
                    PresenceResult {
                        channel: &channel,
                        presence,
                    },
                );
                Flow::Continue
            }
            WsCommand::Rpc { data } => self.rpc(&client, &id, &data).await,
            WsCommand::Message { data } => self.message(&client, &id, &data).await,
        }
    }

    async fn connect(
        &mut self,
        id: &str,
        user: String,
        info: Option<Raw>,
        expire_at: Option<i64>,
    ) -> Flow {
        if user.is_empty() {
            self.fail(id, &ClientError::new(107, "user is required"));
            return Flow::Continue;
        }
        let deadline = match expire_at.map(|secs| DateTime::<Utc>::from_timestamp(secs, 0)) {
            None => None,
            Some(Some(at)) if at > Utc::now() => Some(at),
            Some(_) => {
                self.fail(id, &ClientError::token_expired());
                return Flow::Continue;
            }
        };
        let (client, pushes) = Client::new(self.id, user, info);
        let client = Arc::new(client);
        match self.state.mediator.connect(&client).await {
            Verdict::Proceed(()) => {}
            Verdict::Reject(error) => {
                self.fail(id, &error);
                return Flow::Continue;
            }
            Verdict::Terminate(termination) => return self.terminate(id, termination),
        }

        if let Err(err) = self.state.hub.insert(Arc::clone(&client)).await {
            tracing::error!(client = %self.id, error = %err, "client registration failed");
            self.fail(id, &ClientError::internal());
            return Flow::Close(Disconnect::server_error());
        }

        tracing::info!(client = %self.id, user = client.user(), "client connected");
        self.respond(
            id,
            ConnectResult {
                client: self.id,
                user: client.user(),
                expire_at: deadline.map(|at| at.timestamp()),
            },
        );
        self.client = Some(client);
        self.pushes = Some(pushes);
        self.deadline = deadline;
        Flow::Continue
    }

    async fn subscribe(&mut self, client: &Client, id: &str, channel: &str) -> Flow {
        if channel.is_empty() {
            self.fail(id, &ClientError::new(107, "channel is required"));
            return Flow::Continue;
        }
        if self.subs.contains(channel) {
            self.fail(id, &ClientError::already_subscribed());
            return Flow::Continue;
        }

        match self.state.mediator.subscribe(client, channel).await {
            Verdict::Proceed(()) => {
                self.subs.subscribe(channel);
                self.state
                    .presence
                    .upsert(channel, client.client_info())
                    .await;
                tracing::debug!(client = %self.id, channel, "subscribed");
                self.respond(id, SubscribeResult { channel });
                Flow::Continue
            }
            Verdict::Reject(error) => {
                self.fail(id, &error);
                Flow::Continue
            }
            Verdict::Terminate(termination) => self.terminate(id, termination),
        }
    }

    async fn unsubscribe(&mut self, client: &Client, id: &str, channel: &str) -> Flow {
        if channel.is_empty() {
            self.fail(id, &ClientError::new(107, "channel is required"));
            return Flow::Continue;
        }
        let removed = self.subs.unsubscribe(channel);
        if removed {
            self.state.presence.remove(channel, self.id).await;
            tracing::debug!(client = %self.id, channel, "unsubscribed");
            if let Verdict::Terminate(termination) =
                self.state.mediator.unsubscribe(client, channel).await
            {
                return self.terminate(id, termination);
            }
        }
        self.respond(id, UnsubscribeResult { channel, removed });
        Flow::Continue
    }

    async fn publish(
        &mut self,
        client: &Client,
        id: &str,
        channel: &str,
        data: Raw,
    ) -> Flow {
        if channel.is_empty() {
            self.fail(id, &ClientError::new(107, "channel is required"));
            return Flow::Continue;
        }
        let publication = Publication::new(data, Some(client.client_info()));

        match self.state.mediator.publish(client, channel, &publication).await {
            Verdict::Proceed(()) => {
                let uid = publication.uid;
                let delivered = self.state.broker.publish(channel, publication);
                tracing::debug!(client = %self.id, channel, delivered, "publication accepted");
                self.respond(id, PublishResult { channel, uid });
                Flow::Continue
            }
            Verdict::Reject(error) => {
                self.fail(id, &error);
                Flow::Continue
            }
            Verdict::Terminate(termination) => self.terminate(id, termination),
        }
    }

    async fn rpc(&mut self, client: &Client, id: &str, data: &Raw) -> Flow {
        match self.state.mediator.rpc(client, data).await {
            Verdict::Proceed(reply) => self.respond(id, RpcResult { data: &reply }),
            Verdict::Reject(error) => self.fail(id, &error),
            Verdict::Terminate(termination) => return self.terminate(id, termination),
        }
        Flow::Continue
    }

    async fn message(&mut self, client: &Client, id: &str, data: &Raw) -> Flow {
        match self.state.mediator.message(client, data).await {
            Verdict::Terminate(termination) => self.terminate(id, termination),
            Verdict::Proceed(()) | Verdict::Reject(_) => Flow::Continue,
        }
    }

    async fn presence_update(&mut self) -> Flow {
        let Some(client) = self.client.clone() else {
            return Flow::Continue;
        };
        if self.subs.is_empty() {
            return Flow::Continue;
        }
        let channels = self.subs.channels();
        match self.state.mediator.presence(&client, &channels).await {
            Verdict::Terminate(termination) => self.terminate("", termination),
            Verdict::Proceed(()) | Verdict::Reject(_) => {
                let info = client.client_info();
                for channel in &channels {
                    self.state.presence.upsert(channel, info.clone()).await;
                }
                Flow::Continue
            }
        }
    }

    async fn refresh(&mut self) -> Flow {
        let Some(client) = self.client.clone() else {
            self.deadline = None;
            return Flow::Continue;
        };
        match self.state.mediator.refresh(&client).await {
            Verdict::Proceed(CredentialUpdate::Extend { expire_at, .. }) => {
                tracing::debug!(client = %self.id, %expire_at, "credentials extended");
                self.deadline = Some(expire_at);
                self.emit(WsMessage::refresh(expire_at));
                Flow::Continue
            }
            Verdict::Proceed(CredentialUpdate::NoExpiry) => {
                self.deadline = None;
                Flow::Continue
            }
            Verdict::Proceed(CredentialUpdate::Unchanged) | Verdict::Reject(_) => {
                tracing::info!(client = %self.id, "credentials not extended, closing");
                Flow::Close(Disconnect::expired())
            }
            Verdict::Terminate(termination) => self.terminate("", termination),
        }
    }

    fn forward(&mut self, publication: &ChannelPublication) {
        if !self.subs.contains(&publication.channel) {
            return;
        }
        self.emit(WsMessage::event(publication));
    }

    fn push(&mut self, data: &Raw) {
        self.emit(WsMessage::push(data));
    }

    /// Sends the disconnect notice, closes the socket, releases shared
    /// state and fires the disconnect hook.
    async fn teardown(mut self, disconnect: Disconnect, ws_tx: &mut SplitSink<WebSocket, Message>) {
        let disconnect = match &self.client {
            Some(client) => client.close_with(disconnect),
            None => disconnect,
        };

        match WsMessage::disconnect(&disconnect).to_json() {
            Ok(notice) => {
                if let Err(err) = ws_tx.send(Message::text(notice)).await {
                    tracing::debug!(client = %self.id, error = %err, "disconnect notice not sent");
                }
            }
            Err(err) => {
                tracing::warn!(client = %self.id, error = %err, "disconnect notice not encodable");
            }
        }
        let close = Message::Close(Some(CloseFrame {
            code: disconnect.code,
            reason: disconnect.reason.clone().into(),
        }));
        if let Err(err) = ws_tx.send(close).await {
            tracing::debug!(client = %self.id, error = %err, "close frame not sent");
        }

        if let Some(client) = self.client.take() {
            self.state.hub.remove(client.id()).await;
            self.state
                .presence
                .remove_client(client.id(), self.subs.iter())
                .await;
            self.state.mediator.disconnect(&client, &disconnect).await;
        }

        tracing::debug!(
            client = %self.id,
            code = disconnect.code,
            reason = %disconnect.reason,
            "ws connection closed"
        );
    }
}

async fn next_push(pushes: &mut Option<mpsc::UnboundedReceiver<Raw>>) -> Option<Raw> {
    match pushes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(at) => {
            let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending().await,
    }
}

async fn closed(client: Option<&Client>) {
    match client {
        Some(client) => client.cancelled().await,
        None => std::future::pending().await,
    }
}
