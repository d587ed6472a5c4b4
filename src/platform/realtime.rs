//! Realtime change feed
//!
//! One WebSocket per backend, speaking the Phoenix channel protocol. Each
//! `subscribe` joins a channel configured for `postgres_changes` on one
//! table and hands back a `Subscription`; dropping the subscription leaves
//! the channel.
//!
//! There is no reconnect: when the socket closes, every open subscription
//! sees the end of its stream.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;

use super::client::ProjectClient;
use crate::config::RealtimeConfig;
use crate::error::AppError;

// =============================================================================
// Filters and events
// =============================================================================

/// Row-level change kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Which change kinds a subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Only(ChangeKind),
    All,
}

impl EventFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Only(kind) => kind.as_str(),
            Self::All => "*",
        }
    }

    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            Self::Only(only) => *only == kind,
            Self::All => true,
        }
    }
}

/// What to listen to: `{event, schema, table, filter?}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Channel name, used as the topic prefix
    pub channel: String,
    pub event: EventFilter,
    pub schema: String,
    pub table: String,
    /// Row predicate such as `postId=eq.42`
    pub filter: Option<String>,
}

impl ChangeFilter {
    /// Every change on `public.{table}`
    pub fn table(channel: &str, table: &str) -> Self {
        Self {
            channel: channel.to_string(),
            event: EventFilter::All,
            schema: "public".to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn only(mut self, kind: ChangeKind) -> Self {
        self.event = EventFilter::Only(kind);
        self
    }

    pub fn filter_eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filter = Some(format!("{column}=eq.{value}"));
        self
    }

    fn to_config(&self) -> Value {
        let mut config = json!({
            "event": self.event.as_str(),
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            config["filter"] = Value::String(filter.clone());
        }
        config
    }
}

/// One committed row change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    /// New row (inserts and updates)
    #[serde(default)]
    pub record: Value,
    /// Previous row; for deletes, at least the primary key
    #[serde(default)]
    pub old_record: Value,
}

impl ChangeEvent {
    pub fn insert(table: &str, record: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            schema: "public".to_string(),
            table: table.to_string(),
            commit_timestamp: None,
            record,
            old_record: Value::Null,
        }
    }

    pub fn delete(table: &str, old_record: Value) -> Self {
        Self {
            kind: ChangeKind::Delete,
            schema: "public".to_string(),
            table: table.to_string(),
            commit_timestamp: None,
            record: Value::Null,
            old_record,
        }
    }

    pub fn new_row<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(T::deserialize(&self.record)?)
    }

    pub fn old_row<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(T::deserialize(&self.old_record)?)
    }
}

// =============================================================================
// Subscription handle
// =============================================================================

/// Runs a release action exactly once, on drop
struct ReleaseGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// A live subscription to one channel
///
/// Events arrive in commit order and are buffered until read, so a slow
/// reader never loses changes. Dropping the handle leaves the channel, on
/// every exit path.
pub struct Subscription {
    topic: String,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    _release: ReleaseGuard,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        on_release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            events,
            _release: ReleaseGuard(Some(Box::new(on_release))),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event; None once the channel or socket has closed
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Phoenix frames
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeEvent,
}

pub(crate) fn join_message(
    topic: &str,
    filter: &ChangeFilter,
    access_token: &str,
    reference: &str,
) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [filter.to_config()],
            },
            "access_token": access_token,
        }),
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

pub(crate) fn leave_message(topic: &str, reference: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

pub(crate) fn heartbeat_message(reference: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// Extract the change carried by a `postgres_changes` frame
pub(crate) fn decode_change(message: &PhoenixMessage) -> Option<ChangeEvent> {
    if message.event != "postgres_changes" {
        return None;
    }
    match ChangePayload::deserialize(&message.payload) {
        Ok(payload) => Some(payload.data),
        Err(error) => {
            tracing::warn!(topic = %message.topic, %error, "Malformed change payload");
            None
        }
    }
}

/// `https://host` → `wss://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn socket_url(base_url: &str, anon_key: &str) -> Result<String, AppError> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| AppError::Config(format!("invalid backend url: {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(AppError::Config(format!(
                "unsupported backend url scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config("cannot derive websocket url".to_string()))?;
    url.set_path("/realtime/v1/websocket");
    url.set_query(Some(&format!(
        "apikey={}&vsn=1.0.0",
        urlencoding::encode(anon_key)
    )));
    Ok(url.to_string())
}

// =============================================================================
// Connection
// =============================================================================

enum Command {
    Join {
        topic: String,
        filter: ChangeFilter,
        events: mpsc::UnboundedSender<ChangeEvent>,
    },
    Leave {
        topic: String,
    },
}

/// Realtime client, connected lazily on first subscribe
pub struct RealtimeClient {
    client: ProjectClient,
    socket_url: String,
    heartbeat: Duration,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl RealtimeClient {
    pub fn new(client: ProjectClient, config: &RealtimeConfig) -> Result<Self, AppError> {
        let socket_url = socket_url(client.base_url(), client.anon_key())?;
        Ok(Self {
            client,
            socket_url,
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            commands: Mutex::new(None),
        })
    }

    /// Join a channel for `filter`
    ///
    /// # Errors
    /// Returns error if the socket cannot be opened
    pub async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, AppError> {
        let commands = self.connection().await?;

        let topic = format!(
            "realtime:{}-{}",
            filter.channel,
            ulid::Ulid::new().to_string().to_ascii_lowercase()
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let table = filter.table.clone();

        commands
            .send(Command::Join {
                topic: topic.clone(),
                filter,
                events: events_tx,
            })
            .map_err(|_| AppError::Realtime("connection closed".to_string()))?;

        use crate::metrics::REALTIME_SUBSCRIPTIONS;
        REALTIME_SUBSCRIPTIONS.with_label_values(&[&table]).inc();
        tracing::info!(%topic, %table, "Subscribed to changes");

        let leave_topic = topic.clone();
        Ok(Subscription::new(topic, events_rx, move || {
            REALTIME_SUBSCRIPTIONS.with_label_values(&[&table]).dec();
            let _ = commands.send(Command::Leave { topic: leave_topic });
        }))
    }

    async fn connection(&self) -> Result<mpsc::UnboundedSender<Command>, AppError> {
        let mut guard = self.commands.lock().await;
        if let Some(commands) = guard.as_ref() {
            if !commands.is_closed() {
                return Ok(commands.clone());
            }
        }

        tracing::info!("Connecting realtime socket");
        let (ws, _) = tokio_tungstenite::connect_async(self.socket_url.as_str()).await?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(
            ws,
            commands_rx,
            self.heartbeat,
            self.client.clone(),
        ));

        *guard = Some(commands_tx.clone());
        Ok(commands_tx)
    }
}

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_connection(
    ws: Socket,
    mut commands: mpsc::UnboundedReceiver<Command>,
    heartbeat: Duration,
    client: ProjectClient,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut channels: HashMap<String, mpsc::UnboundedSender<ChangeEvent>> = HashMap::new();
    let mut next_ref: u64 = 0;

    let mut ping = tokio::time::interval(heartbeat);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = ws_tx.send(tungstenite::Message::Close(None)).await;
                    break;
                };
                next_ref += 1;
                let reference = next_ref.to_string();
                let frame = match command {
                    Command::Join { topic, filter, events } => {
                        let frame = join_message(&topic, &filter, &client.bearer(), &reference);
                        channels.insert(topic, events);
                        frame
                    }
                    Command::Leave { topic } => {
                        channels.remove(&topic);
                        tracing::debug!(%topic, "Leaving channel");
                        leave_message(&topic, &reference)
                    }
                };
                if let Err(error) = send_frame(&mut ws_tx, &frame).await {
                    tracing::warn!(%error, "Realtime send failed");
                    break;
                }
            }
            _ = ping.tick() => {
                next_ref += 1;
                if let Err(error) = send_frame(&mut ws_tx, &heartbeat_message(&next_ref.to_string())).await {
                    tracing::warn!(%error, "Realtime heartbeat failed");
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(msg) = msg else { break; };
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(error) => {
                        tracing::warn!(%error, "Realtime socket error");
                        break;
                    }
                };
                let text = match msg {
                    tungstenite::Message::Text(text) => text,
                    tungstenite::Message::Ping(payload) => {
                        let _ = ws_tx.send(tungstenite::Message::Pong(payload)).await;
                        continue;
                    }
                    tungstenite::Message::Close(_) => break,
                    _ => continue,
                };
                let message: PhoenixMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(error) => {
                        tracing::warn!(%error, "Unparseable realtime frame");
                        continue;
                    }
                };
                dispatch(message, &mut channels);
            }
        }
    }

    tracing::info!(open_channels = channels.len(), "Realtime socket closed");
}

async fn send_frame<S>(ws_tx: &mut S, frame: &PhoenixMessage) -> Result<(), AppError>
where
    S: futures::Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame)?;
    ws_tx.send(tungstenite::Message::Text(text)).await?;
    Ok(())
}

/// Route one inbound frame to its channel
pub(crate) fn dispatch(
    message: PhoenixMessage,
    channels: &mut HashMap<String, mpsc::UnboundedSender<ChangeEvent>>,
) {
    match message.event.as_str() {
        "postgres_changes" => {
            let Some(event) = decode_change(&message) else {
                return;
            };
            use crate::metrics::REALTIME_EVENTS_TOTAL;
            REALTIME_EVENTS_TOTAL
                .with_label_values(&[&event.table, event.kind.as_str()])
                .inc();

            let Some(sender) = channels.get(&message.topic) else {
                tracing::debug!(topic = %message.topic, "Change for a channel already left");
                return;
            };
            if sender.send(event).is_err() {
                channels.remove(&message.topic);
            }
        }
        "phx_reply" => {
            let status = message
                .payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if status != "ok" {
                tracing::warn!(topic = %message.topic, status, payload = %message.payload, "Channel request rejected");
            }
        }
        "phx_error" | "phx_close" => {
            tracing::warn!(topic = %message.topic, event = %message.event, "Channel closed by server");
            channels.remove(&message.topic);
        }
        other => {
            tracing::trace!(topic = %message.topic, event = other, "Ignoring realtime frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_switches_scheme() {
        assert_eq!(
            socket_url("https://p.example.com", "anon key").unwrap(),
            "wss://p.example.com/realtime/v1/websocket?apikey=anon%20key&vsn=1.0.0"
        );
        assert_eq!(
            socket_url("http://127.0.0.1:54321", "k").unwrap(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn join_frame_carries_filter() {
        let filter = ChangeFilter::table("comments", "comments")
            .only(ChangeKind::Insert)
            .filter_eq("postId", 42);
        let frame = join_message("realtime:comments-1", &filter, "jwt", "3");
        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "3");
        assert_eq!(value["payload"]["access_token"], "jwt");
        assert_eq!(
            value["payload"]["config"]["postgres_changes"][0],
            json!({"event": "INSERT", "schema": "public", "table": "comments", "filter": "postId=eq.42"})
        );
    }

    #[test]
    fn unfiltered_table_has_no_filter_key() {
        let filter = ChangeFilter::table("posts", "posts");
        let config = filter.to_config();
        assert_eq!(config["event"], "*");
        assert!(config.get("filter").is_none());
    }

    fn change_frame(topic: &str) -> PhoenixMessage {
        serde_json::from_value(json!({
            "topic": topic,
            "event": "postgres_changes",
            "payload": {
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "posts",
                    "commit_timestamp": "2024-05-01T12:00:00Z",
                    "type": "DELETE",
                    "columns": [],
                    "record": {},
                    "old_record": {"id": 5},
                    "errors": null
                }
            },
            "ref": null
        }))
        .unwrap()
    }

    #[test]
    fn decode_change_reads_delete() {
        let event = decode_change(&change_frame("realtime:posts-1")).unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.table, "posts");

        #[derive(Deserialize)]
        struct Key {
            id: i64,
        }
        assert_eq!(event.old_row::<Key>().unwrap().id, 5);
    }

    #[test]
    fn dispatch_routes_by_topic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channels = HashMap::new();
        channels.insert("realtime:posts-1".to_string(), tx);

        dispatch(change_frame("realtime:posts-1"), &mut channels);
        dispatch(change_frame("realtime:other"), &mut channels);

        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Delete);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn burst_reaches_unread_subscriber() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channels = HashMap::new();
        channels.insert("realtime:posts-1".to_string(), tx);

        for _ in 0..200 {
            dispatch(change_frame("realtime:posts-1"), &mut channels);
        }

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 200);
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn dispatch_forgets_closed_subscribers() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut channels = HashMap::new();
        channels.insert("realtime:posts-1".to_string(), tx);

        dispatch(change_frame("realtime:posts-1"), &mut channels);
        assert!(channels.is_empty());
    }

    #[test]
    fn server_close_drops_channel() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut channels = HashMap::new();
        channels.insert("realtime:posts-1".to_string(), tx);

        let frame: PhoenixMessage = serde_json::from_value(json!({
            "topic": "realtime:posts-1",
            "event": "phx_close",
            "payload": {},
            "ref": "1"
        }))
        .unwrap();
        dispatch(frame, &mut channels);
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn dropping_subscription_runs_release_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("realtime:t", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(ChangeEvent::insert("posts", json!({"id": 1})))
            .unwrap();
        assert_eq!(subscription.recv().await.unwrap().kind, ChangeKind::Insert);
        assert_eq!(subscription.topic(), "realtime:t");

        drop(subscription);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
