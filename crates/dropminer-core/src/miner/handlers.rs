// ── Push-event handlers ──
//
// Each message from the topic pool is decoded into its closed event type
// and handled on its own task. Messages that fail to decode, carry an
// unknown type or reference something untracked are logged and dropped.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dropminer_api::{Topic, TopicKind, TopicMessage};

use super::{CLAIM_POLL_ATTEMPTS, CLAIM_POLL_INTERVAL, CLAIM_SETTLE, Miner};
use crate::convert;
use crate::error::CoreError;
use crate::events::{
    ClaimAvailableData, DropClaimData, DropEvent, DropProgressData, PointsEarnedData,
    PointsEvent, StreamStateEvent, decode,
};
use crate::model::Channel;
use crate::ranking::{can_watch, game_key};
use crate::state::State;

fn message_type(payload: &Value) -> &str {
    payload.get("type").and_then(Value::as_str).unwrap_or("<none>")
}

fn unknown(topic: Topic, payload: &Value) {
    warn!(%topic, kind = message_type(payload), "unknown push message type");
}

fn undecodable(topic: Topic, payload: &Value, err: &serde_json::Error) {
    warn!(%topic, kind = message_type(payload), error = %err, "undecodable push message");
}

impl Miner {
    /// Fan push messages out to per-message handler tasks until cancelled.
    pub(crate) async fn dispatch_events(
        &self,
        mut events: broadcast::Receiver<Arc<TopicMessage>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = events.recv() => match result {
                    Ok(message) => {
                        let miner = self.clone();
                        tokio::spawn(async move { miner.handle_message(&message).await });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "push event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("push event dispatch stopped");
    }

    pub(crate) async fn handle_message(&self, message: &TopicMessage) {
        let topic = message.topic;
        let payload = &message.payload;
        match topic.kind {
            TopicKind::StreamState => match decode::<StreamStateEvent>(payload) {
                Ok(StreamStateEvent::Other) => unknown(topic, payload),
                Ok(event) => self.on_stream_state(topic.target_id, event).await,
                Err(e) => undecodable(topic, payload, &e),
            },
            TopicKind::Drops => match decode::<DropEvent>(payload) {
                Ok(DropEvent::DropProgress { data }) => self.on_drop_progress(data).await,
                Ok(DropEvent::DropClaim { data }) => self.on_drop_claim(data).await,
                Ok(DropEvent::Other) => unknown(topic, payload),
                Err(e) => undecodable(topic, payload, &e),
            },
            TopicKind::CommunityPoints => match decode::<PointsEvent>(payload) {
                Ok(PointsEvent::PointsEarned { data }) => self.on_points_earned(data).await,
                Ok(PointsEvent::ClaimAvailable { data }) => self.on_claim_available(data).await,
                Ok(PointsEvent::Other) => unknown(topic, payload),
                Err(e) => undecodable(topic, payload, &e),
            },
        }
    }

    // ── Stream state ─────────────────────────────────────────────────

    async fn on_stream_state(&self, channel_id: u64, event: StreamStateEvent) {
        let (online, updated) = {
            let mut st = self.inner.state.lock().await;
            let Some(channel) = st.channels.get_mut(&channel_id) else {
                error!(channel_id, "Stream state change for a non-existing channel");
                return;
            };
            match &event {
                StreamStateEvent::Viewcount { viewers } if channel.online => {
                    channel.viewers = *viewers;
                    (true, Some(channel.clone()))
                }
                _ => (channel.online, None),
            }
        };
        if let Some(snapshot) = updated {
            self.channel_changed(&snapshot);
            return;
        }

        match event {
            StreamStateEvent::Viewcount { .. } | StreamStateEvent::StreamUp => {
                self.set_online(channel_id).await;
            }
            StreamStateEvent::StreamDown => {
                if online {
                    self.set_offline(channel_id).await;
                }
            }
            StreamStateEvent::Commercial => {}
            StreamStateEvent::Other => warn!(channel_id, "unhandled stream state"),
        }
    }

    /// Refresh a channel's stream info and react if it just came online.
    async fn set_online(&self, channel_id: u64) {
        let Some(login) = self.channel_login(channel_id).await else {
            return;
        };
        let info = match self.inner.backend.stream_info(&login).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                warn!(channel = %login, "no stream info for channel");
                return;
            }
            Err(e) => {
                warn!(error = %e, channel = %login, "stream info lookup failed");
                return;
            }
        };

        let (snapshot, was_online) = {
            let mut st = self.inner.state.lock().await;
            let Some(channel) = st.channels.get_mut(&channel_id) else {
                return;
            };
            let was_online = channel.online;
            convert::apply_stream_info(channel, info);
            (channel.clone(), was_online)
        };
        self.channel_changed(&snapshot);
        if !was_online && snapshot.online {
            self.on_online(&snapshot).await;
        }
    }

    async fn set_offline(&self, channel_id: u64) {
        let snapshot = {
            let mut st = self.inner.state.lock().await;
            let Some(channel) = st.channels.get_mut(&channel_id) else {
                return;
            };
            channel.go_offline();
            channel.clone()
        };
        self.channel_changed(&snapshot);
        self.on_offline(&snapshot);
    }

    async fn channel_login(&self, channel_id: u64) -> Option<String> {
        let st = self.inner.state.lock().await;
        st.channels.get(&channel_id).map(|c| c.login.clone())
    }

    /// Switch to a channel that just came online when nothing better is
    /// being watched.
    async fn on_online(&self, channel: &Channel) {
        let now = Utc::now();
        let idle = self.inner.signal.current() == State::Idle;
        let watched = self.inner.watching.get();

        let switch = {
            let st = self.inner.state.lock().await;
            can_watch(channel, &st.games, &st.inventory, now)
                && match &watched {
                    None => true,
                    Some(_) if idle => true,
                    Some(watched) => {
                        let order = game_key(channel, &st.games);
                        let watched_order = game_key(watched, &st.games);
                        order < watched_order
                            || (order == watched_order && channel.priority && !watched.priority)
                    }
                }
        };
        if switch {
            self.inner
                .presenter
                .print(&format!("{} goes ONLINE, switching...", channel.display_name));
            self.watch(channel.clone());
        } else {
            debug!(channel = %channel.login, "channel online");
        }
    }

    fn on_offline(&self, channel: &Channel) {
        let watched = self.inner.watching.get();
        if watched.is_some_and(|w| w.id == channel.id) {
            self.inner
                .presenter
                .print(&format!("{} goes OFFLINE, switching...", channel.display_name));
            self.change_state(State::ChannelSwitch);
        } else {
            debug!(channel = %channel.login, "channel offline");
        }
    }

    // ── Drops ────────────────────────────────────────────────────────

    /// Resolve the watch loop's rendezvous. Progress is applied only when
    /// it belongs to a drop the watched channel can progress.
    pub(crate) async fn on_drop_progress(&self, data: DropProgressData) {
        let Some(pending) = self.inner.drop_update.take() else {
            debug!(drop_id = %data.drop_id, "drop progress outside a heartbeat window");
            return;
        };
        let now = Utc::now();
        let watched = self.inner.watching.get();

        let matched = {
            let mut st = self.inner.state.lock().await;
            if st.inventory.drop(&data.drop_id).is_none() {
                error!(drop_id = %data.drop_id, "Drop progress for a non-existing drop");
                false
            } else if st
                .inventory
                .drop_can_earn_at(&data.drop_id, watched.as_ref(), now)
            {
                if let Some(drop) = st.inventory.drop_mut(&data.drop_id) {
                    drop.update_minutes(data.current_progress_min);
                }
                if let Some(progress) = st.inventory.progress(&data.drop_id) {
                    self.inner.presenter.drop_progress(&progress, true);
                }
                true
            } else {
                debug!(drop_id = %data.drop_id, "drop progress for another channel");
                false
            }
        };
        let _ = pending.send(matched);
    }

    async fn on_drop_claim(&self, data: DropClaimData) {
        {
            let mut st = self.inner.state.lock().await;
            let Some(drop) = st.inventory.drop_mut(&data.drop_id) else {
                error!(drop_id = %data.drop_id, "Drop claim for a non-existing drop");
                return;
            };
            drop.claim_id = Some(data.drop_instance_id);
        }

        if let Err(e) = self.claim_drop(&data.drop_id).await {
            warn!(error = %e, drop_id = %data.drop_id, "drop claim request failed");
        }

        // Give the backend time to move on to the next drop.
        tokio::time::sleep(CLAIM_SETTLE).await;
        for _ in 0..CLAIM_POLL_ATTEMPTS {
            match self.inner.backend.current_drop(None).await {
                Ok(Some(current)) if current.drop_id == data.drop_id => {
                    tokio::time::sleep(CLAIM_POLL_INTERVAL).await;
                }
                _ => break,
            }
        }

        let now = Utc::now();
        let remaining = {
            let st = self.inner.state.lock().await;
            st.inventory
                .locate(&data.drop_id)
                .map_or(0, |(campaign, _)| campaign.remaining_drops_at(now))
        };
        if remaining > 0 {
            self.restart_watching();
        } else {
            self.change_state(State::InventoryFetch);
        }
    }

    /// Claim a drop that has a claim id and is still inside its claim
    /// window. Returns whether the backend accepted the claim.
    pub(crate) async fn claim_drop(&self, drop_id: &str) -> Result<bool, CoreError> {
        let now = Utc::now();
        let claim_id = {
            let st = self.inner.state.lock().await;
            st.inventory
                .drop(drop_id)
                .filter(|d| d.can_claim_at(now))
                .and_then(|d| d.claim_id.clone())
        };
        let Some(claim_id) = claim_id else {
            return Ok(false);
        };

        if !self.inner.backend.claim_drop(&claim_id).await? {
            error!(drop_id, "Drop claim failed");
            return Ok(false);
        }

        let text = {
            let mut st = self.inner.state.lock().await;
            if let Some(drop) = st.inventory.drop_mut(drop_id) {
                drop.claimed = true;
            }
            st.inventory.locate(drop_id).map(|(campaign, drop)| {
                format!(
                    "Claimed drop: {} ({}/{})",
                    drop.rewards_text(),
                    campaign.claimed_drops(),
                    campaign.total_drops()
                )
            })
        };
        info!(drop_id, "drop claimed");
        if let Some(text) = text {
            self.inner.presenter.print(&text);
            self.inner.presenter.notify_claim(&text);
        }
        Ok(true)
    }

    // ── Channel points ───────────────────────────────────────────────

    async fn on_points_earned(&self, data: PointsEarnedData) {
        let balance = data.balance.balance;
        if let Ok(channel_id) = data.channel_id.parse::<u64>() {
            self.set_points(channel_id, balance).await;
        } else {
            warn!(channel_id = %data.channel_id, "points event for an unparseable channel");
        }
        self.inner.presenter.print(&format!(
            "Earned points for watching: {:3}, total: {balance}",
            data.point_gain.total_points
        ));
    }

    async fn on_claim_available(&self, data: ClaimAvailableData) {
        let claim = data.claim;
        let Ok(channel_id) = claim.channel_id.parse::<u64>() else {
            warn!(channel_id = %claim.channel_id, "bonus claim for an unparseable channel");
            return;
        };
        match self.inner.backend.claim_points(channel_id, &claim.id).await {
            Ok(()) => self.inner.presenter.print(&format!(
                "Claimed bonus points: {}",
                claim.point_gain.total_points
            )),
            Err(e) => warn!(error = %e, channel_id, "bonus claim failed"),
        }
    }

    pub(crate) async fn set_points(&self, channel_id: u64, balance: u64) {
        let snapshot = {
            let mut st = self.inner.state.lock().await;
            st.channels.get_mut(&channel_id).map(|channel| {
                channel.points = Some(balance);
                channel.clone()
            })
        };
        if let Some(channel) = snapshot {
            self.channel_changed(&channel);
        }
    }
}
