// ── Orchestration state machine ──
//
// One handler per state. Each handler either requests its successor or,
// for IDLE and a successful CHANNEL_SWITCH, settles the signal so the
// loop suspends until something else asks for a transition.

use std::collections::HashSet;

use chrono::Utc;
use futures_util::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use dropminer_api::Topic;

use super::{LIVE_STREAMS_LIMIT, Miner, MinerState};
use crate::convert;
use crate::error::CoreError;
use crate::model::{AllowedChannel, Channel, Game};
use crate::ranking::{
    GameRanks, can_watch, channel_capacity, pick_channel, rank_channels, split_capacity,
};
use crate::state::State;

impl Miner {
    pub(crate) async fn run_machine(&self) -> Result<(), CoreError> {
        loop {
            let state = self.inner.signal.current();
            debug!(%state, "state machine step");
            self.inner.presenter.status(state);

            let result = match state {
                State::Idle => {
                    self.stop_watching();
                    self.inner.signal.settle(State::Idle);
                    Ok(())
                }
                State::InventoryFetch => self.on_inventory_fetch().await,
                State::GamesUpdate => self.on_games_update().await,
                State::ChannelsCleanup => self.on_channels_cleanup().await,
                State::ChannelsFetch => self.on_channels_fetch().await,
                State::ChannelSwitch => self.on_channel_switch().await,
                State::Exit => break,
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    return Err(e);
                }
                error!(error = %e, %state, "state handler failed");
                self.inner.presenter.print(&format!("Error: {e}"));
                self.change_state(State::Idle);
            }

            self.inner.signal.wait().await;
        }
        info!("state machine stopped");
        Ok(())
    }

    async fn on_inventory_fetch(&self) -> Result<(), CoreError> {
        self.fetch_inventory().await?;
        self.change_state(State::GamesUpdate);
        Ok(())
    }

    async fn on_games_update(&self) -> Result<(), CoreError> {
        let now = Utc::now();
        let claimable: Vec<String> = {
            let st = self.inner.state.lock().await;
            st.inventory
                .campaigns()
                .iter()
                .filter(|c| !c.upcoming_at(now))
                .flat_map(|c| c.drops.iter())
                .filter(|d| d.can_claim_at(now))
                .map(|d| d.id.clone())
                .collect()
        };
        for drop_id in claimable {
            if let Err(e) = self.claim_drop(&drop_id).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, drop_id, "claiming a finished drop failed");
            }
        }

        let config = &self.inner.config;
        let mut st = self.inner.state.lock().await;
        let games: GameRanks = st
            .inventory
            .campaigns()
            .iter()
            .filter(|c| config.allows_game(&c.game.name) && c.can_earn_at(None, now))
            .map(|c| (c.game.clone(), config.rank_of(&c.game.name)))
            .collect();

        let mut ordered: Vec<Game> = games.keys().cloned().collect();
        ordered.sort_by_key(|g| (config.rank_of(&g.name), g.name.clone()));
        self.inner.presenter.set_games(&ordered);
        info!(games = games.len(), "eligible games updated");

        st.games = games;
        st.full_cleanup = true;
        self.change_state(State::ChannelsCleanup);
        Ok(())
    }

    async fn on_channels_cleanup(&self) -> Result<(), CoreError> {
        let (topics, no_games) = {
            let mut st = self.inner.state.lock().await;
            let MinerState {
                games,
                channels,
                full_cleanup,
                ..
            } = &mut *st;
            let full = std::mem::take(full_cleanup) || games.is_empty();

            let doomed: Vec<u64> = channels
                .values()
                .filter(|ch| {
                    let stale = !ch.online
                        || ch.game.as_ref().is_none_or(|g| !games.contains_key(g));
                    full || (!ch.priority && stale)
                })
                .map(|ch| ch.id)
                .collect();
            for id in &doomed {
                if let Some(channel) = channels.shift_remove(id) {
                    self.inner.presenter.channel_removed(&channel);
                }
            }
            debug!(removed = doomed.len(), full, "channels cleaned up");

            let topics: Vec<Topic> = doomed.into_iter().map(Topic::stream_state).collect();
            (topics, games.is_empty())
        };

        if !topics.is_empty() {
            self.inner.pool.remove_topics(&topics).await;
        }

        if no_games {
            self.inner
                .presenter
                .print("No active campaigns to mine drops for. Waiting for an active campaign...");
            self.change_state(State::Idle);
        } else {
            self.change_state(State::ChannelsFetch);
        }
        Ok(())
    }

    async fn on_channels_fetch(&self) -> Result<(), CoreError> {
        let now = Utc::now();
        let (allowed, open_games) = {
            let st = self.inner.state.lock().await;
            let mut allowed: Vec<AllowedChannel> = Vec::new();
            let mut seen = HashSet::new();
            let mut open_games: Vec<Game> = Vec::new();
            for campaign in st
                .inventory
                .campaigns()
                .iter()
                .filter(|c| st.games.contains_key(&c.game) && c.can_earn_at(None, now))
            {
                if campaign.allowed_channels.is_empty() {
                    if !open_games.contains(&campaign.game) {
                        open_games.push(campaign.game.clone());
                    }
                    continue;
                }
                for acl in &campaign.allowed_channels {
                    if !st.channels.contains_key(&acl.id) && seen.insert(acl.id) {
                        allowed.push(acl.clone());
                    }
                }
            }
            (allowed, open_games)
        };

        let mut found = self.fetch_allowed(allowed).await?;
        for game in &open_games {
            match self.inner.backend.live_streams(game, LIVE_STREAMS_LIMIT).await {
                Ok(streams) => {
                    found.extend(streams.into_iter().filter_map(convert::channel_from_stream));
                }
                Err(e) => {
                    let e = CoreError::from(e);
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(error = %e, game = %game, "live stream query failed");
                }
            }
        }

        let capacity = channel_capacity(self.inner.pool.max_topics());
        let (kept, overflow) = {
            let mut st = self.inner.state.lock().await;
            let mut merged: IndexMap<u64, Channel> = std::mem::take(&mut st.channels);
            for channel in found {
                merged.entry(channel.id).or_insert(channel);
            }
            let mut ranked: Vec<Channel> = merged.into_values().collect();
            rank_channels(&mut ranked, &st.games);
            let (kept, overflow) = split_capacity(ranked, capacity);

            st.channels = kept.into_iter().map(|c| (c.id, c)).collect();
            self.inner.presenter.channels_cleared();
            for channel in st.channels.values() {
                self.inner.presenter.channel_added(channel);
            }
            let kept: Vec<Topic> = st.channels.keys().copied().map(Topic::stream_state).collect();
            let overflow: Vec<Topic> = overflow.iter().map(|c| Topic::stream_state(c.id)).collect();
            (kept, overflow)
        };
        info!(channels = kept.len(), dropped = overflow.len(), "channels gathered");

        if !overflow.is_empty() {
            self.inner.pool.remove_topics(&overflow).await;
        }
        if let Err(e) = self.inner.pool.add_topics(kept).await {
            warn!(error = %e, "subscribing channel topics failed");
        }

        let watched = self.inner.watching.get();
        let (relinked, preview) = {
            let st = self.inner.state.lock().await;
            let watchable = |c: &&Channel| can_watch(c, &st.games, &st.inventory, now);
            let relinked = watched
                .as_ref()
                .and_then(|w| st.channels.get(&w.id))
                .filter(watchable)
                .cloned();
            let preview = relinked
                .as_ref()
                .or_else(|| st.channels.values().find(watchable))
                .and_then(|ch| st.active_drop(Some(ch), now))
                .and_then(|d| st.inventory.progress(&d.id));
            (relinked, preview)
        };
        match relinked {
            Some(channel) => self.watch(channel),
            None => self.stop_watching(),
        }
        if let Some(progress) = preview {
            self.inner.presenter.drop_progress(&progress.minus_one(), false);
        }

        self.change_state(State::ChannelSwitch);
        Ok(())
    }

    /// Look up allow-listed channels, keeping an offline placeholder for
    /// any the backend could not describe.
    async fn fetch_allowed(
        &self,
        allowed: Vec<AllowedChannel>,
    ) -> Result<Vec<Channel>, CoreError> {
        let infos = join_all(
            allowed
                .iter()
                .map(|acl| self.inner.backend.stream_info(&acl.login)),
        )
        .await;

        let mut channels = Vec::with_capacity(allowed.len());
        for (acl, info) in allowed.into_iter().zip(infos) {
            let channel = match info {
                Ok(Some(info)) => convert::channel_from_info(info, true),
                Ok(None) => None,
                Err(e) => {
                    let e = CoreError::from(e);
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(error = %e, channel = %acl.login, "stream info lookup failed");
                    None
                }
            };
            channels.push(channel.unwrap_or_else(|| {
                let mut channel = Channel::new(acl.id, acl.login);
                channel.display_name = acl.display_name;
                channel.priority = true;
                channel
            }));
        }
        Ok(channels)
    }

    async fn on_channel_switch(&self) -> Result<(), CoreError> {
        let now = Utc::now();
        let selection = self.inner.presenter.take_selection();
        let watched = self.inner.watching.get();

        let st = self.inner.state.lock().await;
        let selected = selection.as_deref().and_then(|login| {
            st.channels
                .values()
                .find(|c| c.login.eq_ignore_ascii_case(login))
        });
        if selection.is_some() && selected.is_none() {
            warn!(selection = ?selection, "selected channel is not tracked");
        }
        let watched = watched
            .as_ref()
            .map(|w| st.channels.get(&w.id).unwrap_or(w));
        let picked = pick_channel(selected, watched, st.channels.values(), &st.games, |c| {
            can_watch(c, &st.games, &st.inventory, now)
        })
        .cloned();

        // Committed under the lock, so a stream-down for the pick cannot
        // land before it counts as watched.
        if let Some(channel) = picked {
            self.watch(channel);
            self.inner.signal.settle(State::ChannelSwitch);
        } else {
            drop(st);
            self.inner
                .presenter
                .print("No available channels to watch. Waiting for an ONLINE channel...");
            self.change_state(State::Idle);
        }
        Ok(())
    }
}
