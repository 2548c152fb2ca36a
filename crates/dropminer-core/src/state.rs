// ── Orchestration states ──

use strum::{Display, IntoStaticStr};

/// States of the orchestration machine. `Exit` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Idle,
    InventoryFetch,
    GamesUpdate,
    ChannelsCleanup,
    ChannelsFetch,
    ChannelSwitch,
    Exit,
}

impl State {
    /// Short human-readable description for status lines.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::InventoryFetch => "Fetching inventory...",
            Self::GamesUpdate => "Updating games...",
            Self::ChannelsCleanup => "Cleaning up channels...",
            Self::ChannelsFetch => "Gathering channels...",
            Self::ChannelSwitch => "Switching channels...",
            Self::Exit => "Exiting...",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_screaming_case() {
        assert_eq!(State::InventoryFetch.to_string(), "INVENTORY_FETCH");
        let name: &'static str = State::ChannelSwitch.into();
        assert_eq!(name, "CHANNEL_SWITCH");
    }
}
