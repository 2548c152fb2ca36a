//! Push-topic pool over the backend's PubSub websocket.
//!
//! Topics are packed onto a bounded number of connections. Each connection
//! runs its own reconnecting read loop: it re-sends `LISTEN` for every topic
//! it owns after (re)connecting, pings on a fixed interval and honours the
//! server's `RECONNECT` request. Decoded `MESSAGE` frames are fanned out
//! through a [`tokio::sync::broadcast`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use dropminer_api::pubsub::{PubSubPool, PoolConfig, Topic};
//!
//! let pool = PubSubPool::new(endpoints.pubsub.clone(), PoolConfig::default());
//! pool.set_auth_token(Some(token)).await;
//! pool.add_topics(vec![Topic::drops(user_id)]).await?;
//! pool.start().await;
//!
//! let mut rx = pool.subscribe();
//! while let Ok(msg) = rx.recv().await {
//!     println!("{}: {}", msg.topic, msg.payload["type"]);
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── Topic ────────────────────────────────────────────────────────────

/// What a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKind {
    /// Per-channel live/offline and viewer-count updates.
    StreamState,
    /// Per-user drop progress and claim events.
    Drops,
    /// Per-user channel points events.
    CommunityPoints,
}

impl TopicKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::StreamState => "video-playback-by-id",
            Self::Drops => "user-drop-events",
            Self::CommunityPoints => "community-points-user-v1",
        }
    }
}

/// A named push subscription: a kind bound to a channel or user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    pub kind: TopicKind,
    pub target_id: u64,
}

impl Topic {
    pub fn stream_state(channel_id: u64) -> Self {
        Self {
            kind: TopicKind::StreamState,
            target_id: channel_id,
        }
    }

    pub fn drops(user_id: u64) -> Self {
        Self {
            kind: TopicKind::Drops,
            target_id: user_id,
        }
    }

    pub fn community_points(user_id: u64) -> Self {
        Self {
            kind: TopicKind::CommunityPoints,
            target_id: user_id,
        }
    }

    /// Parse a wire topic name such as `user-drop-events.1234`.
    pub fn parse(name: &str) -> Option<Self> {
        let (prefix, id) = name.rsplit_once('.')?;
        let target_id = id.parse().ok()?;
        let kind = [
            TopicKind::StreamState,
            TopicKind::Drops,
            TopicKind::CommunityPoints,
        ]
        .into_iter()
        .find(|k| k.prefix() == prefix)?;
        Some(Self { kind, target_id })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.prefix(), self.target_id)
    }
}

/// A decoded push message.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub topic: Topic,
    /// The inner message body, already parsed from its JSON string form.
    pub payload: Value,
}

// ── Configuration ────────────────────────────────────────────────────

/// Exponential backoff configuration for websocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub topics_per_connection: usize,
    pub ping_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            topics_per_connection: 50,
            ping_interval: Duration::from_secs(4 * 60),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Total topic budget across all connections.
    pub fn max_topics(&self) -> usize {
        self.max_connections * self.topics_per_connection
    }
}

// ── PubSubPool ───────────────────────────────────────────────────────

enum ShardCommand {
    Listen(Vec<Topic>),
    Unlisten(Vec<Topic>),
}

struct Shard {
    topics: BTreeSet<Topic>,
    cmd_tx: Option<mpsc::UnboundedSender<ShardCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl Shard {
    fn empty() -> Self {
        Self {
            topics: BTreeSet::new(),
            cmd_tx: None,
            handle: None,
        }
    }

    fn send(&self, cmd: ShardCommand) {
        if let Some(tx) = &self.cmd_tx {
            // A closed channel means the connection task already exited.
            let _ = tx.send(cmd);
        }
    }
}

struct PoolState {
    shards: Vec<Shard>,
    running: bool,
}

/// Pool of websocket connections sharing one topic budget.
pub struct PubSubPool {
    url: Url,
    config: PoolConfig,
    auth_token: Arc<RwLock<Option<SecretString>>>,
    event_tx: broadcast::Sender<Arc<TopicMessage>>,
    cancel: CancellationToken,
    state: Mutex<PoolState>,
}

impl PubSubPool {
    pub fn new(url: Url, config: PoolConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            url,
            config,
            auth_token: Arc::new(RwLock::new(None)),
            event_tx,
            cancel: CancellationToken::new(),
            state: Mutex::new(PoolState {
                shards: Vec::new(),
                running: false,
            }),
        }
    }

    pub fn max_topics(&self) -> usize {
        self.config.max_topics()
    }

    /// Token sent with every `LISTEN` frame.
    pub async fn set_auth_token(&self, token: Option<SecretString>) {
        *self.auth_token.write().await = token;
    }

    /// Get a new receiver for decoded messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TopicMessage>> {
        self.event_tx.subscribe()
    }

    /// Number of topics currently subscribed across all connections.
    pub async fn topic_count(&self) -> usize {
        self.state.lock().await.shards.iter().map(|s| s.topics.len()).sum()
    }

    pub async fn contains(&self, topic: Topic) -> bool {
        self.state
            .lock()
            .await
            .shards
            .iter()
            .any(|s| s.topics.contains(&topic))
    }

    /// Subscribe to topics, packing them onto existing connections first.
    ///
    /// Already-subscribed topics are skipped. Fails without subscribing
    /// anything if the budget cannot hold all new topics.
    pub async fn add_topics(&self, topics: Vec<Topic>) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let mut new: Vec<Topic> = topics
            .into_iter()
            .filter(|t| !state.shards.iter().any(|s| s.topics.contains(t)))
            .collect();
        new.sort_unstable();
        new.dedup();
        if new.is_empty() {
            return Ok(());
        }

        let used: usize = state.shards.iter().map(|s| s.topics.len()).sum();
        if used + new.len() > self.max_topics() {
            return Err(Error::TopicLimit {
                limit: self.max_topics(),
            });
        }

        let per_conn = self.config.topics_per_connection;
        let mut pending = new.into_iter().peekable();
        let mut index = 0;
        while pending.peek().is_some() {
            if index == state.shards.len() {
                state.shards.push(Shard::empty());
            }
            let running = state.running;
            let shard = &mut state.shards[index];
            let free = per_conn.saturating_sub(shard.topics.len());
            let batch: Vec<Topic> = pending.by_ref().take(free).collect();
            if !batch.is_empty() {
                shard.topics.extend(batch.iter().copied());
                if running && shard.cmd_tx.is_none() {
                    self.spawn_shard(index, shard);
                } else {
                    shard.send(ShardCommand::Listen(batch));
                }
            }
            index += 1;
        }
        tracing::debug!(
            topics = state.shards.iter().map(|s| s.topics.len()).sum::<usize>(),
            connections = state.shards.len(),
            "topics added"
        );
        Ok(())
    }

    /// Unsubscribe from topics. Unknown topics are ignored.
    pub async fn remove_topics(&self, topics: &[Topic]) {
        let mut state = self.state.lock().await;
        for shard in &mut state.shards {
            let removed: Vec<Topic> = topics
                .iter()
                .copied()
                .filter(|t| shard.topics.remove(t))
                .collect();
            if !removed.is_empty() {
                shard.send(ShardCommand::Unlisten(removed));
            }
        }
    }

    /// Open connections for every shard that owns topics.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.running {
            return;
        }
        state.running = true;
        for (index, shard) in state.shards.iter_mut().enumerate() {
            if !shard.topics.is_empty() {
                self.spawn_shard(index, shard);
            }
        }
    }

    /// Close every connection and wait for the tasks to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock().await;
            state.running = false;
            state
                .shards
                .iter_mut()
                .filter_map(|s| {
                    s.cmd_tx = None;
                    s.handle.take()
                })
                .collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        tracing::debug!("topic pool stopped");
    }

    fn spawn_shard(&self, index: usize, shard: &mut Shard) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let conn = Connection {
            index,
            url: self.url.clone(),
            topics: shard.topics.clone(),
            auth_token: Arc::clone(&self.auth_token),
            event_tx: self.event_tx.clone(),
            ping_interval: self.config.ping_interval,
        };
        let reconnect = self.config.reconnect.clone();
        let cancel = self.cancel.child_token();
        shard.cmd_tx = Some(cmd_tx);
        shard.handle = Some(tokio::spawn(ws_loop(conn, cmd_rx, reconnect, cancel)));
    }
}

// ── Background reconnection loop ─────────────────────────────────────

struct Connection {
    index: usize,
    url: Url,
    topics: BTreeSet<Topic>,
    auth_token: Arc<RwLock<Option<SecretString>>>,
    event_tx: broadcast::Sender<Arc<TopicMessage>>,
    ping_interval: Duration,
}

/// Main loop: connect → listen → read → on error, backoff → reconnect.
async fn ws_loop(
    mut conn: Connection,
    mut cmd_rx: mpsc::UnboundedReceiver<ShardCommand>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&mut conn, &mut cmd_rx, &cancel) => result,
        };

        match result {
            Ok(()) => {
                tracing::info!(connection = conn.index, "websocket reconnecting");
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(connection = conn.index, error = %e, attempt, "websocket error");
                let delay = calculate_backoff(attempt, &reconnect);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
    tracing::debug!(connection = conn.index, "websocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and serve it until it drops or the server asks
/// for a reconnect.
async fn connect_and_read(
    conn: &mut Connection,
    cmd_rx: &mut mpsc::UnboundedReceiver<ShardCommand>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(connection = conn.index, url = %conn.url, "connecting websocket");
    let (mut ws, _response) = tokio_tungstenite::connect_async(conn.url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    if !conn.topics.is_empty() {
        let all: Vec<Topic> = conn.topics.iter().copied().collect();
        let frame = topics_frame("LISTEN", &all, conn.auth_token.read().await.as_ref());
        ws.send(tungstenite::Message::text(frame.to_string()))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
    }

    let mut ping = tokio::time::interval(conn.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return Ok(());
            }
            Some(cmd) = cmd_rx.recv() => {
                let (kind, topics) = match cmd {
                    ShardCommand::Listen(t) => {
                        conn.topics.extend(t.iter().copied());
                        ("LISTEN", t)
                    }
                    ShardCommand::Unlisten(t) => {
                        for topic in &t {
                            conn.topics.remove(topic);
                        }
                        ("UNLISTEN", t)
                    }
                };
                let frame = topics_frame(kind, &topics, conn.auth_token.read().await.as_ref());
                ws.send(tungstenite::Message::text(frame.to_string()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            _ = ping.tick() => {
                tracing::trace!(connection = conn.index, "websocket ping");
                ws.send(tungstenite::Message::text(json!({ "type": "PING" }).to_string()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = ws.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    if handle_frame(&text, &conn.event_tx) == Control::Reconnect {
                        tracing::info!(connection = conn.index, "server requested reconnect");
                        return Ok(());
                    }
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return Err(Error::WebSocketClosed {
                        code: frame.as_ref().map_or(1005, |f| u16::from(f.code)),
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    });
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    return Err(Error::WebSocketClosed {
                        code: 1006,
                        reason: "stream ended".into(),
                    });
                }
                // Binary, Ping, Pong, Frame: tungstenite answers pings itself
                Some(Ok(_)) => {}
            },
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────

fn topics_frame(kind: &str, topics: &[Topic], token: Option<&SecretString>) -> Value {
    let names: Vec<String> = topics.iter().map(ToString::to_string).collect();
    let mut data = json!({ "topics": names });
    if let Some(token) = token {
        data["auth_token"] = Value::String(token.expose_secret().to_owned());
    }
    json!({
        "type": kind,
        "nonce": uuid::Uuid::new_v4().simple().to_string(),
        "data": data,
    })
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    data: Option<FrameData>,
}

#[derive(Debug, Deserialize)]
struct FrameData {
    topic: String,
    message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Control {
    Continue,
    Reconnect,
}

/// Parse one text frame, broadcasting any message it carries.
fn handle_frame(text: &str, event_tx: &broadcast::Sender<Arc<TopicMessage>>) -> Control {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable websocket frame");
            return Control::Continue;
        }
    };

    match frame.kind.as_str() {
        "MESSAGE" => {
            let Some(data) = frame.data else {
                tracing::debug!("MESSAGE frame without data");
                return Control::Continue;
            };
            let Some(topic) = Topic::parse(&data.topic) else {
                tracing::warn!(topic = %data.topic, "message for an unknown topic");
                return Control::Continue;
            };
            match serde_json::from_str::<Value>(&data.message) {
                Ok(payload) => {
                    // No subscribers is fine.
                    let _ = event_tx.send(Arc::new(TopicMessage { topic, payload }));
                }
                Err(e) => tracing::debug!(%topic, error = %e, "undecodable message body"),
            }
            Control::Continue
        }
        "RESPONSE" => {
            match frame.error.as_deref() {
                None | Some("") => tracing::trace!(nonce = ?frame.nonce, "topic request ok"),
                Some(err) => tracing::error!(nonce = ?frame.nonce, error = err, "topic request failed"),
            }
            Control::Continue
        }
        "PONG" => Control::Continue,
        "RECONNECT" => Control::Reconnect,
        other => {
            tracing::warn!(kind = other, "unknown websocket frame");
            Control::Continue
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms across connections.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::as_conversions)]
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.min(16) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
