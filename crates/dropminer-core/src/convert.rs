// ── API-to-domain type conversions ──
//
// Bridges raw `dropminer_api` response types into the `model` domain types.
// Numeric ids arrive as strings and are parsed here; records whose ids do
// not parse are dropped with a warning.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use dropminer_api::models::{
    CampaignData, ChannelInfo, ChannelRef, ClaimedBenefit, DirectoryStream, DropData, GameData,
};

use crate::model::{AllowedChannel, Campaign, Channel, Drop, Game};

/// Benefit id → when it was last awarded.
pub type ClaimedBenefits = HashMap<String, DateTime<Utc>>;

// ── Helpers ────────────────────────────────────────────────────────

fn parse_id(raw: &str, what: &str) -> Option<u64> {
    match raw.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(id = raw, kind = what, "skipping record with non-numeric id");
            None
        }
    }
}

pub fn claimed_benefits(edges: &[ClaimedBenefit]) -> ClaimedBenefits {
    edges
        .iter()
        .map(|b| (b.id.clone(), b.last_awarded_at))
        .collect()
}

impl From<GameData> for Game {
    fn from(g: GameData) -> Self {
        Game::new(g.id, g.display_name)
    }
}

fn allowed_channel(r: ChannelRef) -> Option<AllowedChannel> {
    let id = parse_id(&r.id, "channel")?;
    Some(AllowedChannel {
        id,
        display_name: r.display_name.unwrap_or_else(|| r.name.clone()),
        login: r.name,
    })
}

// ── Campaigns ──────────────────────────────────────────────────────

/// Without per-drop progress, a drop counts as claimed when every one of
/// its benefits was awarded since the campaign started.
fn awarded_during(
    drop: &DropData,
    campaign_start: DateTime<Utc>,
    claimed: &ClaimedBenefits,
) -> bool {
    !drop.benefit_edges.is_empty()
        && drop.benefit_edges.iter().all(|edge| {
            claimed
                .get(&edge.benefit.id)
                .is_some_and(|at| *at >= campaign_start)
        })
}

fn drop_from(
    data: DropData,
    campaign_id: &str,
    campaign_start: DateTime<Utc>,
    campaign_end: DateTime<Utc>,
    claimed: &ClaimedBenefits,
) -> Drop {
    let awarded = data.progress.is_none() && awarded_during(&data, campaign_start, claimed);
    let progress = data.progress.unwrap_or_default();
    let is_claimed = progress.is_claimed || awarded;
    let current_minutes = if is_claimed {
        data.required_minutes_watched
    } else {
        progress.current_minutes_watched
    };

    Drop {
        id: data.id,
        name: data.name,
        campaign_id: campaign_id.to_owned(),
        rewards: data
            .benefit_edges
            .into_iter()
            .map(|e| e.benefit.name)
            .collect(),
        starts_at: data.start_at,
        ends_at: data.end_at,
        required_minutes: data.required_minutes_watched,
        current_minutes,
        claim_id: progress.drop_instance_id,
        claimed: is_claimed,
        campaign_ends_at: campaign_end,
    }
}

pub fn campaign_from(data: CampaignData, claimed: &ClaimedBenefits) -> Campaign {
    let allowed_channels = data
        .allow
        .filter(|a| a.is_enabled)
        .and_then(|a| a.channels)
        .unwrap_or_default()
        .into_iter()
        .filter_map(allowed_channel)
        .collect();

    let drops = data
        .time_based_drops
        .into_iter()
        .map(|d| drop_from(d, &data.id, data.start_at, data.end_at, claimed))
        .collect();

    Campaign {
        id: data.id,
        name: data.name,
        game: data.game.into(),
        starts_at: data.start_at,
        ends_at: data.end_at,
        linked: data.viewer.is_account_connected,
        allowed_channels,
        drops,
    }
}

// ── Channels ───────────────────────────────────────────────────────

/// A live channel from the game directory. Directory results are only
/// listed when drops are enabled for the stream.
pub fn channel_from_stream(stream: DirectoryStream) -> Option<Channel> {
    let id = parse_id(&stream.broadcaster.id, "channel")?;
    let mut channel = Channel::new(id, stream.broadcaster.name);
    if let Some(display_name) = stream.broadcaster.display_name {
        channel.display_name = display_name;
    }
    channel.online = true;
    channel.broadcast_id = Some(stream.id);
    channel.viewers = stream.viewers_count;
    channel.game = stream.game.map(Game::from);
    channel.drops_enabled = true;
    Some(channel)
}

/// Overwrite the live fields of `channel` from a stream-info lookup.
pub fn apply_stream_info(channel: &mut Channel, info: ChannelInfo) {
    if let Some(display_name) = info.display_name {
        channel.display_name = display_name;
    }
    channel.drops_enabled = info.drops_enabled;
    match info.stream {
        Some(stream) => {
            channel.online = true;
            channel.broadcast_id = Some(stream.id);
            channel.viewers = stream.viewers_count;
            channel.game = stream.game.map(Game::from);
        }
        None => channel.go_offline(),
    }
}

pub fn channel_from_info(info: ChannelInfo, priority: bool) -> Option<Channel> {
    let id = parse_id(&info.id, "channel")?;
    let mut channel = Channel::new(id, info.login.clone());
    channel.priority = priority;
    apply_stream_info(&mut channel, info);
    Some(channel)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use dropminer_api::models::{
        AllowData, Benefit, BenefitEdge, CampaignSelf, DropSelf, StreamData,
    };

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap()
    }

    fn drop_data(id: &str, benefit: &str, progress: Option<DropSelf>) -> DropData {
        DropData {
            id: id.into(),
            name: format!("drop {id}"),
            start_at: at(1),
            end_at: at(20),
            required_minutes_watched: 120,
            benefit_edges: vec![BenefitEdge {
                benefit: Benefit {
                    id: benefit.into(),
                    name: format!("{benefit} reward"),
                },
            }],
            progress,
        }
    }

    fn campaign_data(drops: Vec<DropData>) -> CampaignData {
        CampaignData {
            id: "c1".into(),
            name: "Spring".into(),
            status: "ACTIVE".into(),
            start_at: at(1),
            end_at: at(20),
            game: GameData {
                id: "g1".into(),
                display_name: "Game One".into(),
            },
            viewer: CampaignSelf {
                is_account_connected: true,
            },
            allow: Some(AllowData {
                is_enabled: true,
                channels: Some(vec![
                    ChannelRef {
                        id: "11".into(),
                        name: "eleven".into(),
                        display_name: Some("Eleven".into()),
                    },
                    ChannelRef {
                        id: "bogus".into(),
                        name: "bogus".into(),
                        display_name: None,
                    },
                ]),
            }),
            time_based_drops: drops,
        }
    }

    #[test]
    fn progress_and_claim_id_carry_over() {
        let progress = DropSelf {
            current_minutes_watched: 30,
            drop_instance_id: Some("inst-1".into()),
            is_claimed: false,
        };
        let campaign = campaign_from(
            campaign_data(vec![drop_data("d1", "b1", Some(progress))]),
            &ClaimedBenefits::new(),
        );

        let drop = &campaign.drops[0];
        assert_eq!(drop.current_minutes, 30);
        assert_eq!(drop.claim_id.as_deref(), Some("inst-1"));
        assert_eq!(drop.campaign_id, "c1");
        assert_eq!(drop.rewards, ["b1 reward"]);
        assert!(campaign.linked);
    }

    #[test]
    fn benefits_awarded_in_window_mark_drop_claimed() {
        let claimed = claimed_benefits(&[
            ClaimedBenefit {
                id: "fresh".into(),
                last_awarded_at: at(3),
            },
            ClaimedBenefit {
                id: "stale".into(),
                last_awarded_at: at(1) - chrono::TimeDelta::days(30),
            },
        ]);
        let campaign = campaign_from(
            campaign_data(vec![
                drop_data("d1", "fresh", None),
                drop_data("d2", "stale", None),
            ]),
            &claimed,
        );

        assert!(campaign.drops[0].claimed);
        assert_eq!(campaign.drops[0].current_minutes, 120);
        assert!(!campaign.drops[1].claimed, "award predates the campaign");
    }

    #[test]
    fn acl_skips_unparseable_ids() {
        let campaign = campaign_from(campaign_data(Vec::new()), &ClaimedBenefits::new());
        assert_eq!(campaign.allowed_channels.len(), 1);
        assert_eq!(campaign.allowed_channels[0].id, 11);
        assert_eq!(campaign.allowed_channels[0].display_name, "Eleven");
    }

    #[test]
    fn disabled_acl_is_unrestricted() {
        let mut data = campaign_data(Vec::new());
        if let Some(allow) = data.allow.as_mut() {
            allow.is_enabled = false;
        }
        let campaign = campaign_from(data, &ClaimedBenefits::new());
        assert!(campaign.allowed_channels.is_empty());
    }

    #[test]
    fn stream_info_sets_live_fields() {
        let info = ChannelInfo {
            id: "42".into(),
            login: "streamer".into(),
            display_name: Some("Streamer".into()),
            stream: Some(StreamData {
                id: "b-9".into(),
                viewers_count: Some(1500),
                game: Some(GameData {
                    id: "g1".into(),
                    display_name: "Game One".into(),
                }),
            }),
            drops_enabled: true,
        };

        let mut channel = channel_from_info(info.clone(), true).unwrap();
        assert!(channel.online && channel.priority && channel.drops_enabled);
        assert_eq!(channel.broadcast_id.as_deref(), Some("b-9"));
        assert_eq!(channel.viewers, Some(1500));
        assert_eq!(channel.display_name, "Streamer");

        apply_stream_info(
            &mut channel,
            ChannelInfo {
                stream: None,
                ..info
            },
        );
        assert!(!channel.online);
        assert!(channel.broadcast_id.is_none());
    }
}
