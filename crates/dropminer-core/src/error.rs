// ── Core error types ──
//
// Errors surfaced by the miner. Transport details are folded into a few
// domain variants by the `From<dropminer_api::Error>` impl; anything the
// miner can recover from locally never reaches this type.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("CAPTCHA required; log in through a browser once and retry")]
    CaptchaRequired,

    #[error("Login failed: {message}")]
    Login { message: String },

    #[error("Login verification failed: {message}")]
    LoginVerification { message: String },

    /// The user or the process asked to exit while the miner was busy.
    #[error("Exit requested")]
    ExitRequested,

    // ── Request errors ───────────────────────────────────────────────
    /// Connection kept failing until the retry budget ran out.
    #[error("Request failed after {attempts} attempts: {message}")]
    RequestFailed { attempts: u32, message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Fatal errors end the run; everything else is logged by the loop
    /// that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CaptchaRequired
                | Self::Login { .. }
                | Self::LoginVerification { .. }
                | Self::RequestFailed { .. }
                | Self::ExitRequested
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<dropminer_api::Error> for CoreError {
    fn from(err: dropminer_api::Error) -> Self {
        use dropminer_api::Error as ApiError;

        match err {
            ApiError::RequestExhausted {
                method,
                url,
                attempts,
                source,
            } => CoreError::RequestFailed {
                attempts,
                message: format!("{method} {url}: {source}"),
            },
            ApiError::Status { status, url } => CoreError::Api {
                message: format!("HTTP {status} from {url}"),
                status: Some(status),
            },
            ApiError::Transport(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::CookieStore(e) => CoreError::Internal(format!("Cookie store: {e}")),
            other @ (ApiError::Timeout { .. }
            | ApiError::Gql { .. }
            | ApiError::MissingField { .. }
            | ApiError::BeaconNotFound { .. }
            | ApiError::WebSocketConnect(_)
            | ApiError::WebSocketClosed { .. }
            | ApiError::TopicLimit { .. }) => CoreError::Api {
                message: other.to_string(),
                status: None,
            },
        }
    }
}
