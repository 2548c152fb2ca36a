// ── Maintenance loop ──

use tracing::{debug, info, warn};

use super::{MAINTENANCE_TICK, Miner};
use crate::state::State;

/// Minutes between channel-points bonus checks on the watched channel.
const BONUS_PERIOD: u64 = 30;
/// Minutes between forced inventory refreshes.
const REFRESH_PERIOD: u64 = 60;

impl Miner {
    pub(crate) async fn maintenance_loop(&self) {
        let mut minutes: u64 = 0;
        loop {
            if minutes % BONUS_PERIOD == 0 {
                self.claim_bonus().await;
            }
            if minutes > 0 && minutes % REFRESH_PERIOD == 0 {
                info!("scheduled inventory refresh");
                self.change_state(State::InventoryFetch);
            }
            tokio::time::sleep(MAINTENANCE_TICK).await;
            minutes += 1;
        }
    }

    /// Update the watched channel's balance and claim a waiting bonus.
    async fn claim_bonus(&self) {
        let Some(channel) = self.inner.watching.get() else {
            return;
        };
        let context = match self.inner.backend.points_context(&channel.login).await {
            Ok(Some(context)) => context,
            Ok(None) => {
                debug!(channel = %channel.login, "no points context");
                return;
            }
            Err(e) => {
                warn!(error = %e, channel = %channel.login, "points context lookup failed");
                return;
            }
        };

        self.set_points(channel.id, context.balance).await;
        let Some(claim_id) = context.available_claim else {
            return;
        };
        match self.inner.backend.claim_points(channel.id, &claim_id).await {
            Ok(()) => info!(channel = %channel.login, "claimed channel points bonus"),
            Err(e) => warn!(error = %e, channel = %channel.login, "bonus claim failed"),
        }
    }
}
