// dropminer-api: Async Rust client for the streaming platform's drops, channel and push-topic APIs

pub mod client;
pub mod cookies;
pub mod error;
pub mod gql;
pub mod models;
pub mod pubsub;
pub mod retry;
pub mod transport;

pub use client::{CLIENT_ID, COOKIE_DOMAIN, Endpoints, RequestBody, TwitchClient, WatchBeat};
pub use cookies::{AUTH_TOKEN_COOKIE, CookieFile, CookieStore, PERSISTENT_COOKIE};
pub use error::Error;
pub use pubsub::{PoolConfig, PubSubPool, Topic, TopicKind, TopicMessage};
pub use retry::RetryPolicy;
pub use transport::TransportConfig;
