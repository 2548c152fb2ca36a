// ── Channel ranking and selection ──
//
// Pure functions over channel snapshots. The state machine owns the data;
// everything here is deterministic given its inputs.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{Channel, Game, Inventory};

/// Eligible games mapped to their rank. Lower ranks win.
pub type GameRanks = HashMap<Game, i32>;

/// Topic slots kept back for the account-level drop and points topics.
pub const RESERVED_TOPICS: usize = 2;

/// Viewer count sort key; an unknown count sorts below zero viewers.
pub fn viewers_key(channel: &Channel) -> i64 {
    channel.viewers.map_or(-1, i64::from)
}

/// Game sort key: the configured rank, `0` for a game outside the eligible
/// set and `1` when the channel reports no game.
pub fn game_key(channel: &Channel, games: &GameRanks) -> i32 {
    match &channel.game {
        None => 1,
        Some(game) => games.get(game).copied().unwrap_or(0),
    }
}

/// Order channels best first: game rank ascending, then priority channels,
/// then viewers descending.
pub fn rank_channels(channels: &mut [Channel], games: &GameRanks) {
    channels.sort_by_key(|c| Reverse(viewers_key(c)));
    channels.sort_by_key(|c| Reverse(c.priority));
    channels.sort_by_key(|c| game_key(c, games));
}

/// Topic capacity left for per-channel stream-state topics.
pub fn channel_capacity(max_topics: usize) -> usize {
    max_topics.saturating_sub(RESERVED_TOPICS)
}

/// Split a ranked list into the retained prefix and the overflow.
pub fn split_capacity(mut ranked: Vec<Channel>, capacity: usize) -> (Vec<Channel>, Vec<Channel>) {
    let overflow = ranked.split_off(capacity.min(ranked.len()));
    (ranked, overflow)
}

/// Whether watching this channel would progress any drop right now.
pub fn can_watch(channel: &Channel, games: &GameRanks, inventory: &Inventory, now: DateTime<Utc>) -> bool {
    !games.is_empty()
        && channel.online
        && channel.drops_enabled
        && channel.game.as_ref().is_some_and(|g| games.contains_key(g))
        && inventory
            .campaigns()
            .iter()
            .any(|c| c.can_earn_at(Some(channel), now))
}

/// Pick the next channel to watch.
///
/// Candidates are tried in order: the user's selection, the currently
/// watched channel, then every tracked channel ordered by game rank with
/// ties keeping their existing order. The first one accepted by
/// `watchable` wins.
pub fn pick_channel<'a, F>(
    selected: Option<&'a Channel>,
    watched: Option<&'a Channel>,
    channels: impl IntoIterator<Item = &'a Channel>,
    games: &GameRanks,
    watchable: F,
) -> Option<&'a Channel>
where
    F: Fn(&Channel) -> bool,
{
    let mut by_rank: Vec<&Channel> = channels.into_iter().collect();
    by_rank.sort_by_key(|c| game_key(c, games));

    selected
        .into_iter()
        .chain(watched)
        .chain(by_rank)
        .find(|c| watchable(c))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::model::{Campaign, Drop};

    fn game(id: &str) -> Game {
        Game::new(id, format!("Game {id}"))
    }

    fn channel(id: u64, viewers: Option<u32>, priority: bool, game_id: Option<&str>) -> Channel {
        let mut ch = Channel::new(id, format!("ch{id}"));
        ch.online = true;
        ch.drops_enabled = true;
        ch.viewers = viewers;
        ch.priority = priority;
        ch.game = game_id.map(game);
        ch
    }

    fn ids(channels: &[Channel]) -> Vec<u64> {
        channels.iter().map(|c| c.id).collect()
    }

    fn ranks() -> GameRanks {
        GameRanks::from([(game("a"), -2), (game("b"), -1), (game("c"), 0)])
    }

    #[test]
    fn game_key_literal_rule() {
        let games = ranks();
        assert_eq!(game_key(&channel(1, None, false, Some("a")), &games), -2);
        assert_eq!(game_key(&channel(1, None, false, Some("c")), &games), 0);
        assert_eq!(game_key(&channel(1, None, false, Some("zzz")), &games), 0);
        assert_eq!(game_key(&channel(1, None, false, None), &games), 1);
    }

    #[test]
    fn lower_game_rank_wins_over_everything_else() {
        let mut channels = vec![
            channel(1, Some(90_000), true, Some("b")),
            channel(2, Some(5), false, Some("a")),
            channel(3, Some(10), false, None),
        ];
        rank_channels(&mut channels, &ranks());
        assert_eq!(ids(&channels), [2, 1, 3]);
    }

    #[test]
    fn priority_beats_viewers_within_same_game_rank() {
        let mut channels = vec![
            channel(1, Some(1_000), false, Some("a")),
            channel(2, Some(3), true, Some("a")),
            channel(3, Some(50), false, Some("a")),
        ];
        rank_channels(&mut channels, &ranks());
        assert_eq!(ids(&channels), [2, 1, 3]);
    }

    #[test]
    fn unknown_viewers_never_outrank_zero() {
        let mut channels = vec![
            channel(1, None, false, Some("a")),
            channel(2, Some(0), false, Some("a")),
        ];
        rank_channels(&mut channels, &ranks());
        assert_eq!(ids(&channels), [2, 1]);
    }

    #[test]
    fn capacity_keeps_a_prefix_of_the_ranking() {
        let mut channels: Vec<Channel> = (1..=6)
            .map(|i| channel(i, Some(u32::try_from(i).unwrap() * 10), false, Some("a")))
            .collect();
        rank_channels(&mut channels, &ranks());
        let full = ids(&channels);

        let (kept, overflow) = split_capacity(channels.clone(), channel_capacity(6));
        assert_eq!(kept.len(), 4);
        assert_eq!(ids(&kept), full[..4]);
        assert_eq!(ids(&overflow), full[4..]);

        let (kept, overflow) = split_capacity(channels, 100);
        assert_eq!(kept.len(), 6);
        assert!(overflow.is_empty());
    }

    #[test]
    fn capacity_never_underflows() {
        assert_eq!(channel_capacity(1), 0);
        assert_eq!(channel_capacity(400), 398);
    }

    #[test]
    fn pick_prefers_selection_then_watched_then_rank() {
        let games = ranks();
        let selected = channel(1, None, false, Some("b"));
        let watched = channel(2, None, false, Some("b"));
        let pool = [channel(3, None, false, Some("b")), channel(4, None, false, Some("a"))];

        let all = |_: &Channel| true;
        let pick = pick_channel(Some(&selected), Some(&watched), &pool, &games, all);
        assert_eq!(pick.map(|c| c.id), Some(1));

        let pick = pick_channel(None, Some(&watched), &pool, &games, all);
        assert_eq!(pick.map(|c| c.id), Some(2));

        let pick = pick_channel(None, None, &pool, &games, all);
        assert_eq!(pick.map(|c| c.id), Some(4), "ranked by game, not insertion");

        let none = |_: &Channel| false;
        assert!(pick_channel(Some(&selected), None, &pool, &games, none).is_none());
    }

    #[test]
    fn pick_skips_unwatchable_selection() {
        let games = ranks();
        let selected = channel(1, None, false, Some("b"));
        let pool = [channel(3, None, false, Some("b"))];
        let pick = pick_channel(Some(&selected), None, &pool, &games, |c| c.id != 1);
        assert_eq!(pick.map(|c| c.id), Some(3));
    }

    #[test]
    fn can_watch_requires_an_earnable_campaign() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let drop = Drop {
            id: "d1".into(),
            name: "d1".into(),
            campaign_id: "c1".into(),
            rewards: Vec::new(),
            starts_at: now - TimeDelta::days(1),
            ends_at: now + TimeDelta::days(1),
            required_minutes: 60,
            current_minutes: 0,
            claim_id: None,
            claimed: false,
            campaign_ends_at: now + TimeDelta::days(1),
        };
        let campaign = Campaign {
            id: "c1".into(),
            name: "c1".into(),
            game: game("a"),
            starts_at: now - TimeDelta::days(1),
            ends_at: now + TimeDelta::days(1),
            linked: true,
            allowed_channels: Vec::new(),
            drops: vec![drop],
        };
        let games = ranks();
        let inventory = Inventory::new(vec![campaign]);

        let live = channel(1, Some(10), false, Some("a"));
        assert!(can_watch(&live, &games, &inventory, now));

        let mut offline = live.clone();
        offline.go_offline();
        assert!(!can_watch(&offline, &games, &inventory, now));

        let mut no_drops = live.clone();
        no_drops.drops_enabled = false;
        assert!(!can_watch(&no_drops, &games, &inventory, now));

        let other_game = channel(2, Some(10), false, Some("zzz"));
        assert!(!can_watch(&other_game, &games, &inventory, now));

        assert!(!can_watch(&live, &GameRanks::new(), &inventory, now));
        assert!(!can_watch(&live, &games, &Inventory::default(), now));
    }
}
