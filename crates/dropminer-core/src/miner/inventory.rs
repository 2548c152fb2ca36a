// ── Inventory refresh and active-drop estimation ──

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::{Miner, MinerState};
use crate::convert;
use crate::error::CoreError;
use crate::model::{Campaign, Channel, Drop, Inventory};

impl Miner {
    /// Rebuild the inventory from the in-progress list plus every linked,
    /// applicable catalog campaign not already in it.
    pub(crate) async fn fetch_inventory(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let user_id = self.user_id().await?;

        let data = inner.backend.inventory().await?;
        let claimed = convert::claimed_benefits(&data.game_event_drops);
        let mut campaigns: Vec<Campaign> = data
            .drop_campaigns_in_progress
            .unwrap_or_default()
            .into_iter()
            .map(|c| convert::campaign_from(c, &claimed))
            .collect();
        let mut known: HashSet<String> = campaigns.iter().map(|c| c.id.clone()).collect();

        let wanted: Vec<String> = inner
            .backend
            .campaigns()
            .await?
            .into_iter()
            .filter(|c| c.is_applicable() && c.viewer.is_account_connected)
            .filter(|c| known.insert(c.id.clone()))
            .map(|c| c.id)
            .collect();
        debug!(
            in_progress = campaigns.len(),
            extra = wanted.len(),
            "fetching campaign details"
        );

        let details = join_all(
            wanted
                .iter()
                .map(|id| inner.backend.campaign_details(user_id, id)),
        )
        .await;
        let now = Utc::now();
        for (id, detail) in wanted.iter().zip(details) {
            let Some(data) = detail? else {
                warn!(campaign = %id, "campaign details missing");
                continue;
            };
            let campaign = convert::campaign_from(data, &claimed);
            if campaign.can_earn_at(None, now) {
                campaigns.push(campaign);
            } else {
                debug!(campaign = %campaign.name, "campaign cannot be progressed, skipped");
            }
        }

        let inventory = Inventory::new(campaigns);
        let mut st = inner.state.lock().await;
        st.inventory = inventory;
        inner.presenter.inventory_replaced(&st.inventory);
        info!(campaigns = st.inventory.campaigns().len(), "inventory refreshed");
        Ok(())
    }
}

impl MinerState {
    /// The drop watching `channel` most likely progresses: among earnable
    /// campaigns of eligible games, prefer those for the channel's game,
    /// then take the drop closest to completion.
    pub(crate) fn active_drop(
        &self,
        channel: Option<&Channel>,
        now: DateTime<Utc>,
    ) -> Option<&Drop> {
        if self.games.is_empty() {
            return None;
        }
        let earnable: Vec<&Campaign> = self
            .inventory
            .campaigns()
            .iter()
            .filter(|c| self.games.contains_key(&c.game) && c.can_earn_at(channel, now))
            .collect();
        let game = channel.and_then(|c| c.game.as_ref());
        let same_game: Vec<&Campaign> = earnable
            .iter()
            .copied()
            .filter(|c| game == Some(&c.game))
            .collect();
        let candidates = if same_game.is_empty() { earnable } else { same_game };

        candidates
            .into_iter()
            .flat_map(|c| c.drops.iter())
            .filter(|d| d.can_earn_at(now))
            .min_by_key(|d| d.remaining_minutes())
    }
}
