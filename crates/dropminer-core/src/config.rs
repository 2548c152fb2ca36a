// ── Runtime miner configuration ──
//
// What to mine and how hard to try. The binary builds a `MinerConfig`
// from its settings file and hands it in; core never touches disk for
// configuration.

use std::collections::{HashMap, HashSet};

/// Game selection rules and retry tuning.
#[derive(Debug, Clone, Default)]
pub struct MinerConfig {
    /// Game name → priority rank. Every configured rank is negative and a
    /// lower rank wins; unconfigured games rank 0.
    pub priorities: HashMap<String, i32>,
    /// Game names that are never mined.
    pub exclude: HashSet<String>,
    /// Only mine games that have a configured priority.
    pub priority_only: bool,
}

impl MinerConfig {
    /// Build the rank map from an ordered list of game names, best first.
    ///
    /// The first entry gets `-len`, the last `-1`. Duplicate names keep
    /// their first (best) rank.
    pub fn with_priority_list<I, S>(mut self, games: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let games: Vec<String> = games.into_iter().map(Into::into).collect();
        let len = i32::try_from(games.len()).unwrap_or(i32::MAX);
        self.priorities.clear();
        for (index, name) in (0_i32..).zip(games) {
            self.priorities.entry(name).or_insert(index - len);
        }
        self
    }

    /// Whether campaigns for this game may be mined at all.
    pub fn allows_game(&self, name: &str) -> bool {
        !self.exclude.contains(name) && (!self.priority_only || self.priorities.contains_key(name))
    }

    /// Configured rank of a game, 0 if unranked.
    pub fn rank_of(&self, name: &str) -> i32 {
        self.priorities.get(name).copied().unwrap_or(0)
    }
}
