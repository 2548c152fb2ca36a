// ── Domain model ──
//
// Games, channels, campaigns and drops as the miner reasons about them.
// Raw backend shapes are converted into these in `convert`.

pub mod campaign;
pub mod channel;
pub mod game;

pub use campaign::{AllowedChannel, Campaign, Drop, DropProgress, Inventory};
pub use channel::Channel;
pub use game::Game;
