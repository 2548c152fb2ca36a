// ── Channel ──

use super::game::Game;

/// A streaming channel the miner tracks.
///
/// Equality is by id; two snapshots of the same channel compare equal even
/// if their live data differs.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: u64,
    /// Login name, used for channel pages and per-channel queries.
    pub login: String,
    pub display_name: String,
    pub online: bool,
    /// Id of the current broadcast; required for heartbeats.
    pub broadcast_id: Option<String>,
    pub viewers: Option<u32>,
    pub game: Option<Game>,
    pub drops_enabled: bool,
    /// Allow-listed by a campaign.
    pub priority: bool,
    pub points: Option<u64>,
}

impl Channel {
    /// An offline channel with nothing known beyond its identity.
    pub fn new(id: u64, login: impl Into<String>) -> Self {
        let login = login.into();
        Self {
            id,
            display_name: login.clone(),
            login,
            online: false,
            broadcast_id: None,
            viewers: None,
            game: None,
            drops_enabled: false,
            priority: false,
            points: None,
        }
    }

    /// Mark offline, dropping the live-only fields.
    pub fn go_offline(&mut self) {
        self.online = false;
        self.broadcast_id = None;
        self.viewers = None;
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Channel {}
