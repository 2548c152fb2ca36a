use thiserror::Error;

/// Top-level error type for the `dropminer-api` crate.
///
/// Covers every failure mode across the API surfaces this crate talks to:
/// passport login, token validation, GQL, the watch beacon and the push
/// topic websockets. `dropminer-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The retry budget ran out while the connection kept failing.
    #[error("Ran out of attempts ({attempts}) while handling {method} {url}")]
    RequestExhausted {
        method: String,
        url: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Non-success HTTP status that the caller did not expect.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    // ── GQL ─────────────────────────────────────────────────────────
    /// The GQL endpoint answered with an `errors` array.
    #[error("GQL error in {operation}: {message}")]
    Gql { operation: String, message: String },

    /// A GQL response was missing a field the operation relies on.
    #[error("GQL response for {operation} is missing `{field}`")]
    MissingField {
        operation: String,
        field: &'static str,
    },

    // ── Watch beacon ────────────────────────────────────────────────
    /// The channel page did not expose a beacon URL.
    #[error("No watch beacon URL found for channel {channel}")]
    BeaconNotFound { channel: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The topic budget of the pool is exhausted.
    #[error("Topic budget exhausted ({limit} topics)")]
    TopicLimit { limit: usize },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Persistence ─────────────────────────────────────────────────
    /// Reading or writing the cookie store failed.
    #[error("Cookie store I/O error: {0}")]
    CookieStore(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for connection-level failures.
    ///
    /// These are the only errors the retrying request wrapper repeats.
    /// Decode errors and HTTP error statuses propagate immediately.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the backend rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 401,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying at a
    /// higher level (websocket reconnects, watch heartbeats).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestExhausted { .. } | Self::WebSocketConnect(_) => true,
            other => other.is_connection_failure(),
        }
    }
}
