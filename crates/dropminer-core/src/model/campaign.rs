// ── Campaigns, drops and the inventory ──

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use super::channel::Channel;
use super::game::Game;

/// How long after its campaign ends a drop can still be claimed.
const CLAIM_GRACE: TimeDelta = TimeDelta::hours(24);

// ── Drop ─────────────────────────────────────────────────────────────

/// A time-gated reward earned by watch minutes.
#[derive(Debug, Clone)]
pub struct Drop {
    pub id: String,
    pub name: String,
    /// Back-reference to the owning campaign.
    pub campaign_id: String,
    pub rewards: Vec<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub required_minutes: u32,
    pub current_minutes: u32,
    /// Set once a claim event assigns an instance id.
    pub claim_id: Option<String>,
    pub claimed: bool,
    pub(crate) campaign_ends_at: DateTime<Utc>,
}

impl Drop {
    pub fn can_earn_at(&self, now: DateTime<Utc>) -> bool {
        !self.claimed
            && self.current_minutes < self.required_minutes
            && self.starts_at <= now
            && now < self.ends_at
    }

    pub fn can_claim_at(&self, now: DateTime<Utc>) -> bool {
        self.claim_id.is_some() && !self.claimed && now < self.campaign_ends_at + CLAIM_GRACE
    }

    pub fn remaining_minutes(&self) -> u32 {
        self.required_minutes.saturating_sub(self.current_minutes)
    }

    /// Locally estimate one more minute of progress.
    pub fn bump_minutes(&mut self) {
        if self.current_minutes < self.required_minutes {
            self.current_minutes += 1;
        }
    }

    /// Apply progress reported by the backend.
    pub fn update_minutes(&mut self, minutes: u32) {
        self.current_minutes = minutes;
    }

    pub fn rewards_text(&self) -> String {
        if self.rewards.is_empty() {
            self.name.clone()
        } else {
            self.rewards.join(", ")
        }
    }
}

// ── Campaign ─────────────────────────────────────────────────────────

/// A channel a campaign is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedChannel {
    pub id: u64,
    pub login: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub game: Game,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Whether the account is linked to the game publisher.
    pub linked: bool,
    /// Empty means any channel streaming the game counts.
    pub allowed_channels: Vec<AllowedChannel>,
    pub drops: Vec<Drop>,
}

impl Campaign {
    pub fn active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    pub fn upcoming_at(&self, now: DateTime<Utc>) -> bool {
        now < self.starts_at
    }

    pub fn allows(&self, channel: &Channel) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.iter().any(|c| c.id == channel.id)
    }

    /// Whether watching `channel` (or any channel, if `None`) progresses
    /// this campaign.
    pub fn can_earn_at(&self, channel: Option<&Channel>, now: DateTime<Utc>) -> bool {
        self.linked
            && self.active_at(now)
            && channel.is_none_or(|c| self.allows(c))
            && self.drops.iter().any(|d| d.can_earn_at(now))
    }

    pub fn total_drops(&self) -> usize {
        self.drops.len()
    }

    pub fn claimed_drops(&self) -> usize {
        self.drops.iter().filter(|d| d.claimed).count()
    }

    /// Drops that can still be progressed.
    pub fn remaining_drops_at(&self, now: DateTime<Utc>) -> usize {
        self.drops.iter().filter(|d| d.can_earn_at(now)).count()
    }
}

// ── DropProgress ─────────────────────────────────────────────────────

/// A display snapshot of one drop's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropProgress {
    pub drop_id: String,
    pub drop_name: String,
    pub rewards: String,
    pub campaign_name: String,
    pub game_name: String,
    pub current_minutes: u32,
    pub required_minutes: u32,
}

impl DropProgress {
    pub fn remaining_minutes(&self) -> u32 {
        self.required_minutes.saturating_sub(self.current_minutes)
    }

    /// The same snapshot one minute earlier, used when progress is shown
    /// ahead of the first heartbeat.
    pub fn minus_one(mut self) -> Self {
        self.current_minutes = self.current_minutes.saturating_sub(1);
        self
    }
}

// ── Inventory ────────────────────────────────────────────────────────

/// All campaigns the account can work on, sorted by end time, plus a
/// drop-id index into them.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    campaigns: Vec<Campaign>,
    index: HashMap<String, (usize, usize)>,
}

impl Inventory {
    pub fn new(mut campaigns: Vec<Campaign>) -> Self {
        campaigns.sort_by_key(|c| c.ends_at);
        let index = campaigns
            .iter()
            .enumerate()
            .flat_map(|(ci, c)| {
                c.drops
                    .iter()
                    .enumerate()
                    .map(move |(di, d)| (d.id.clone(), (ci, di)))
            })
            .collect();
        Self { campaigns, index }
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn drop(&self, drop_id: &str) -> Option<&Drop> {
        self.locate(drop_id).map(|(_, d)| d)
    }

    pub fn drop_mut(&mut self, drop_id: &str) -> Option<&mut Drop> {
        let &(ci, di) = self.index.get(drop_id)?;
        self.campaigns.get_mut(ci)?.drops.get_mut(di)
    }

    pub fn locate(&self, drop_id: &str) -> Option<(&Campaign, &Drop)> {
        let &(ci, di) = self.index.get(drop_id)?;
        let campaign = self.campaigns.get(ci)?;
        Some((campaign, campaign.drops.get(di)?))
    }

    pub fn campaign(&self, campaign_id: &str) -> Option<&Campaign> {
        self.campaigns.iter().find(|c| c.id == campaign_id)
    }

    /// Whether this drop is progressed by watching `channel`.
    pub fn drop_can_earn_at(
        &self,
        drop_id: &str,
        channel: Option<&Channel>,
        now: DateTime<Utc>,
    ) -> bool {
        self.locate(drop_id)
            .is_some_and(|(c, d)| c.can_earn_at(channel, now) && d.can_earn_at(now))
    }

    pub fn progress(&self, drop_id: &str) -> Option<DropProgress> {
        let (campaign, drop) = self.locate(drop_id)?;
        Some(DropProgress {
            drop_id: drop.id.clone(),
            drop_name: drop.name.clone(),
            rewards: drop.rewards_text(),
            campaign_name: campaign.name.clone(),
            game_name: campaign.game.name.clone(),
            current_minutes: drop.current_minutes,
            required_minutes: drop.required_minutes,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    fn drop(id: &str, required: u32, current: u32) -> Drop {
        Drop {
            id: id.into(),
            name: format!("drop {id}"),
            campaign_id: "c".into(),
            rewards: vec![format!("reward {id}")],
            starts_at: at(1),
            ends_at: at(20),
            required_minutes: required,
            current_minutes: current,
            claim_id: None,
            claimed: false,
            campaign_ends_at: at(20),
        }
    }

    fn campaign(id: &str, ends: u32, drops: Vec<Drop>) -> Campaign {
        Campaign {
            id: id.into(),
            name: format!("campaign {id}"),
            game: Game::new("g1", "Game One"),
            starts_at: at(1),
            ends_at: at(ends),
            linked: true,
            allowed_channels: Vec::new(),
            drops,
        }
    }

    #[test]
    fn drop_earnable_only_inside_window_and_unfinished() {
        let d = drop("d1", 60, 10);
        assert!(d.can_earn_at(at(5)));
        assert!(!d.can_earn_at(at(21)));
        assert!(!drop("d2", 60, 60).can_earn_at(at(5)));
    }

    #[test]
    fn claim_window_extends_a_day_past_campaign_end() {
        let mut d = drop("d1", 60, 60);
        assert!(!d.can_claim_at(at(5)), "no claim id yet");

        d.claim_id = Some("inst".into());
        assert!(d.can_claim_at(at(20)));
        assert!(d.can_claim_at(at(20) + TimeDelta::hours(23)));
        assert!(!d.can_claim_at(at(21) + TimeDelta::hours(1)));

        d.claimed = true;
        assert!(!d.can_claim_at(at(5)));
    }

    #[test]
    fn bump_never_exceeds_required() {
        let mut d = drop("d1", 2, 1);
        d.bump_minutes();
        d.bump_minutes();
        assert_eq!(d.current_minutes, 2);
        assert_eq!(d.remaining_minutes(), 0);
    }

    #[test]
    fn acl_restricts_channels() {
        let mut c = campaign("c1", 20, vec![drop("d1", 60, 0)]);
        c.allowed_channels.push(AllowedChannel {
            id: 7,
            login: "seven".into(),
            display_name: "Seven".into(),
        });

        assert!(c.can_earn_at(Some(&Channel::new(7, "seven")), at(5)));
        assert!(!c.can_earn_at(Some(&Channel::new(8, "eight")), at(5)));
        assert!(c.can_earn_at(None, at(5)));
    }

    #[test]
    fn unlinked_campaigns_cannot_be_earned() {
        let mut c = campaign("c1", 20, vec![drop("d1", 60, 0)]);
        c.linked = false;
        assert!(!c.can_earn_at(None, at(5)));
    }

    #[test]
    fn inventory_sorts_by_end_and_indexes_drops() {
        let inventory = Inventory::new(vec![
            campaign("late", 20, vec![drop("d-late", 60, 0)]),
            campaign("early", 10, vec![drop("d-early", 30, 5)]),
        ]);

        let ids: Vec<&str> = inventory.campaigns().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);

        let (c, d) = inventory.locate("d-late").unwrap();
        assert_eq!(c.id, "late");
        assert_eq!(d.required_minutes, 60);
        assert!(inventory.drop("missing").is_none());

        let progress = inventory.progress("d-early").unwrap();
        assert_eq!(progress.remaining_minutes(), 25);
        assert_eq!(progress.minus_one().current_minutes, 4);
    }

    #[test]
    fn drop_mut_updates_in_place() {
        let mut inventory = Inventory::new(vec![campaign("c1", 20, vec![drop("d1", 60, 0)])]);
        inventory.drop_mut("d1").unwrap().update_minutes(42);
        assert_eq!(inventory.drop("d1").unwrap().current_minutes, 42);
    }

    #[test]
    fn remaining_drops_excludes_claimed() {
        let mut claimed = drop("d2", 60, 60);
        claimed.claimed = true;
        let c = campaign("c1", 20, vec![drop("d1", 60, 0), claimed]);
        assert_eq!(c.remaining_drops_at(at(5)), 1);
        assert_eq!(c.claimed_drops(), 1);
        assert_eq!(c.total_drops(), 2);
    }
}
