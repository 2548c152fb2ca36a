// ── Watch loop ──
//
// Heartbeat the watched channel once a minute and work out how far the
// active drop moved: a pushed update if one arrives within the
// rendezvous window, else the backend's current-drop query, else a local
// one-minute estimate.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::{DROP_UPDATE_TIMEOUT, HEARTBEAT_RETRY, Miner, WATCH_INTERVAL};
use crate::error::CoreError;
use crate::model::Channel;

/// Where a heartbeat's progress came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressSource {
    Push,
    Poll,
    Estimate,
    /// Heartbeat went through but no drop could be credited.
    Nothing,
    HeartbeatFailed,
}

impl Miner {
    pub(crate) async fn watch_loop(&self) {
        loop {
            let channel = self.inner.watching.wait().await;
            let epoch = self.restart_epoch();
            let started = Instant::now();

            let delay = match self.watch_once(&channel).await {
                ProgressSource::HeartbeatFailed => {
                    self.inner
                        .presenter
                        .print("Connection problems, retrying in 60 seconds...");
                    HEARTBEAT_RETRY
                }
                source => {
                    debug!(?source, channel = %channel.login, "heartbeat handled");
                    WATCH_INTERVAL.saturating_sub(started.elapsed())
                }
            };

            let restart = self.inner.restart.notified();
            tokio::pin!(restart);
            restart.as_mut().enable();
            if self.restart_epoch() != epoch {
                debug!("watch loop restarted during a heartbeat");
                continue;
            }
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = restart => debug!("watch loop restarted"),
            }
        }
    }

    /// One heartbeat plus progress reconciliation.
    pub(crate) async fn watch_once(&self, channel: &Channel) -> ProgressSource {
        let Ok(user_id) = self.user_id().await else {
            return ProgressSource::HeartbeatFailed;
        };
        match self.inner.backend.send_watch(channel, user_id).await {
            Ok(true) => debug!(channel = %channel.login, "heartbeat sent"),
            Ok(false) => {
                warn!(channel = %channel.login, "heartbeat was not accepted");
                return ProgressSource::HeartbeatFailed;
            }
            Err(e) => {
                warn!(error = %e, channel = %channel.login, "heartbeat failed");
                return ProgressSource::HeartbeatFailed;
            }
        }

        let mut pending = self.inner.drop_update.arm();
        let pushed = match tokio::time::timeout(DROP_UPDATE_TIMEOUT, &mut pending).await {
            Ok(resolved) => resolved,
            Err(_) if self.inner.drop_update.disarm() => Ok(false),
            // A handler took the sender before the window closed.
            Err(_) => pending.await,
        };
        if matches!(pushed, Ok(true)) {
            return ProgressSource::Push;
        }

        match self.poll_progress(channel).await {
            Ok(true) => return ProgressSource::Poll,
            Ok(false) => {}
            Err(e) => warn!(error = %e, "current drop query failed"),
        }
        if self.estimate_progress(channel).await {
            ProgressSource::Estimate
        } else {
            error!(channel = %channel.login, "Active drop search failed");
            ProgressSource::Nothing
        }
    }

    /// Apply the backend's view of the current drop, if it is one watching
    /// `channel` can progress.
    async fn poll_progress(&self, channel: &Channel) -> Result<bool, CoreError> {
        let Some(current) = self.inner.backend.current_drop(Some(channel.id)).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        let mut st = self.inner.state.lock().await;
        if st.inventory.drop(&current.drop_id).is_none() {
            error!(drop_id = %current.drop_id, "current drop is missing from the inventory");
            return Ok(false);
        }
        if !st
            .inventory
            .drop_can_earn_at(&current.drop_id, Some(channel), now)
        {
            debug!(drop_id = %current.drop_id, "current drop is not earnable here");
            return Ok(false);
        }
        if let Some(drop) = st.inventory.drop_mut(&current.drop_id) {
            drop.update_minutes(current.current_minutes_watched);
        }
        if let Some(progress) = st.inventory.progress(&current.drop_id) {
            self.inner.presenter.drop_progress(&progress, true);
        }
        Ok(true)
    }

    /// Credit one minute to the drop watching `channel` most likely moves.
    async fn estimate_progress(&self, channel: &Channel) -> bool {
        let now = Utc::now();
        let mut st = self.inner.state.lock().await;
        let Some(drop_id) = st.active_drop(Some(channel), now).map(|d| d.id.clone()) else {
            return false;
        };
        if let Some(drop) = st.inventory.drop_mut(&drop_id) {
            drop.bump_minutes();
        }
        if let Some(progress) = st.inventory.progress(&drop_id) {
            self.inner.presenter.drop_progress(&progress, true);
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use dropminer_api::models::CurrentDrop;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::MinerConfig;
    use crate::events::DropProgressData;
    use crate::model::Inventory;
    use crate::test_support::{
        Harness, campaign, campaign_data, drop_data, game_data, live_channel, ranks,
    };

    async fn harness() -> (Harness, Channel) {
        let h = Harness::new(MinerConfig::default());
        let game = game_data("g1", "Game One");
        let inventory = Inventory::new(vec![campaign(campaign_data(
            "c1",
            game.clone(),
            5,
            vec![drop_data("d1", 60, 10)],
        ))]);
        let channel = live_channel(1, 100, &game);
        h.miner
            .seed(ranks(&[(&game, 0)]), vec![channel.clone()], inventory)
            .await;
        h.miner.seed_session(42).await;
        (h, channel)
    }

    fn current(drop_id: &str, minutes: u32) -> CurrentDrop {
        CurrentDrop {
            drop_id: drop_id.into(),
            current_minutes_watched: minutes,
            required_minutes_watched: Some(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_progress_wins_and_skips_the_poll() {
        let (h, channel) = harness().await;
        h.miner.watch(channel.clone());

        let miner = h.miner.clone();
        let beat = tokio::spawn(async move { miner.watch_once(&channel).await });
        while !h.miner.inner.drop_update.is_armed() {
            tokio::task::yield_now().await;
        }
        h.miner
            .on_drop_progress(DropProgressData {
                drop_id: "d1".into(),
                current_progress_min: 33,
                required_progress_min: Some(60),
            })
            .await;

        assert_eq!(beat.await.unwrap(), ProgressSource::Push);
        assert_eq!(h.miner.drop_minutes("d1").await, Some(33));
        assert_eq!(h.backend.call_count("current_drop"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_push_falls_back_to_the_poll() {
        let (h, channel) = harness().await;
        h.backend.push_current_drop(Some(current("d1", 21)));

        let started = Instant::now();
        assert_eq!(h.miner.watch_once(&channel).await, ProgressSource::Poll);

        assert!(started.elapsed() >= DROP_UPDATE_TIMEOUT);
        assert_eq!(h.miner.drop_minutes("d1").await, Some(21));
        assert!(!h.miner.inner.drop_update.is_armed());
        let (progress, countdown) = h.presenter.progress().pop().unwrap();
        assert_eq!(progress.current_minutes, 21);
        assert!(countdown);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_push_goes_to_the_poll_without_waiting() {
        let (h, channel) = harness().await;
        h.miner.watch(channel.clone());
        h.backend.push_current_drop(Some(current("d1", 21)));

        let started = Instant::now();
        let miner = h.miner.clone();
        let beat = tokio::spawn(async move { miner.watch_once(&channel).await });
        while !h.miner.inner.drop_update.is_armed() {
            tokio::task::yield_now().await;
        }
        h.miner
            .on_drop_progress(DropProgressData {
                drop_id: "elsewhere".into(),
                current_progress_min: 40,
                required_progress_min: Some(60),
            })
            .await;

        assert_eq!(beat.await.unwrap(), ProgressSource::Poll);
        assert!(started.elapsed() < DROP_UPDATE_TIMEOUT);
        assert_eq!(h.backend.call_count("current_drop"), 1);
        assert_eq!(h.miner.drop_minutes("d1").await, Some(21));
    }

    #[tokio::test(start_paused = true)]
    async fn late_push_resolution_is_awaited_instead_of_polling() {
        let (h, channel) = harness().await;
        h.miner.watch(channel.clone());
        h.backend.push_current_drop(Some(current("d1", 21)));

        let miner = h.miner.clone();
        let beat = tokio::spawn(async move { miner.watch_once(&channel).await });
        while !h.miner.inner.drop_update.is_armed() {
            tokio::task::yield_now().await;
        }

        // The handler takes the sender, then stalls on the state lock past
        // the end of the window.
        let guard = h.miner.inner.state.lock().await;
        let miner = h.miner.clone();
        let handler = tokio::spawn(async move {
            miner
                .on_drop_progress(DropProgressData {
                    drop_id: "d1".into(),
                    current_progress_min: 33,
                    required_progress_min: Some(60),
                })
                .await;
        });
        while h.miner.inner.drop_update.is_armed() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(DROP_UPDATE_TIMEOUT + Duration::from_secs(1)).await;
        assert!(!beat.is_finished());
        drop(guard);

        handler.await.unwrap();
        assert_eq!(beat.await.unwrap(), ProgressSource::Push);
        assert_eq!(h.backend.call_count("current_drop"), 0);
        assert_eq!(h.miner.drop_minutes("d1").await, Some(33));
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_poll_result_falls_back_to_an_estimate() {
        let (h, channel) = harness().await;
        h.backend.push_current_drop(Some(current("unknown", 50)));

        assert_eq!(h.miner.watch_once(&channel).await, ProgressSource::Estimate);
        assert_eq!(h.miner.drop_minutes("d1").await, Some(11));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_poll_falls_back_to_an_estimate() {
        let (h, channel) = harness().await;

        assert_eq!(h.miner.watch_once(&channel).await, ProgressSource::Estimate);
        assert_eq!(h.miner.drop_minutes("d1").await, Some(11));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_heartbeat_reports_failure() {
        let (h, channel) = harness().await;
        h.backend.push_watch_result(false);

        assert_eq!(
            h.miner.watch_once(&channel).await,
            ProgressSource::HeartbeatFailed
        );
        assert_eq!(h.miner.drop_minutes("d1").await, Some(10));
        assert_eq!(h.backend.call_count("current_drop"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_waits_for_a_channel_and_backs_off_on_failure() {
        let (h, channel) = harness().await;
        h.backend.push_watch_result(false);

        let miner = h.miner.clone();
        let task = tokio::spawn(async move { miner.watch_loop().await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.backend.call_count("send_watch"), 0);

        h.miner.watch(channel);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.backend.call_count("send_watch"), 1);
        assert!(h.presenter.has_line("Connection problems, retrying in 60 seconds..."));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.backend.call_count("send_watch"), 2);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn switching_channels_cuts_the_sleep_short() {
        let (h, channel) = harness().await;
        let game = game_data("g1", "Game One");

        let miner = h.miner.clone();
        let task = tokio::spawn(async move { miner.watch_loop().await });
        h.miner.watch(channel);
        // First beat waits out the 10 s rendezvous, then sleeps.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.backend.call_count("send_watch:1"), 1);

        h.miner.watch(live_channel(2, 5, &game));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.backend.call_count("send_watch:2"), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn switching_during_the_rendezvous_heartbeats_the_new_channel() {
        let (h, channel) = harness().await;
        let game = game_data("g1", "Game One");

        let miner = h.miner.clone();
        let task = tokio::spawn(async move { miner.watch_loop().await });
        h.miner.watch(channel);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.backend.call_count("send_watch:1"), 1);

        h.miner.watch(live_channel(2, 5, &game));
        // Channel 1's window closes at 10 s; channel 2 follows right away.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.backend.call_count("send_watch:2"), 1);
        assert_eq!(h.backend.call_count("send_watch:1"), 1);
        task.abort();
    }
}
