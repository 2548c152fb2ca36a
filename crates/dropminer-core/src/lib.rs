//! Orchestration engine between `dropminer-api` and the console front end.
//!
//! - **[`Miner`]**: the orchestrator aggregate. [`run()`](Miner::run) logs
//!   in, spawns the watch loop, the maintenance loop and push-event
//!   dispatch, then drives the state machine until `EXIT`.
//!   [`shutdown()`](Miner::shutdown) stops everything and saves the session.
//!
//! - **State machine** ([`State`]): `IDLE → INVENTORY_FETCH → GAMES_UPDATE →
//!   CHANNELS_CLEANUP → CHANNELS_FETCH → CHANNEL_SWITCH`, with coalescing
//!   change requests and a sticky `EXIT`.
//!
//! - **Ranking** ([`ranking`]): pure channel ordering, topic-budget
//!   truncation and the "can watch" predicate.
//!
//! - **Seams** ([`Backend`], [`TopicPool`], [`Presenter`], [`LoginPrompt`]):
//!   everything the miner needs from the outside world. `TwitchClient` and
//!   `PubSubPool` implement the first two.
//!
//! - **Domain model** ([`model`]): games, channels, campaigns, drops and the
//!   inventory, converted from wire shapes in [`convert`].

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod login;
pub mod miner;
pub mod model;
pub mod presenter;
pub mod ranking;
pub mod state;
pub mod sync;

#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{Backend, TopicPool};
pub use config::MinerConfig;
pub use error::CoreError;
pub use miner::{Miner, MinerDeps};
pub use model::{Campaign, Channel, Drop, DropProgress, Game, Inventory};
pub use presenter::{LoginField, LoginInput, LoginPrompt, Presenter};
pub use state::State;
