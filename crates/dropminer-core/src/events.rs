// ── Push event payloads ──
//
// Closed decodes of the `type`-tagged messages the topic pool delivers.
// Anything not modelled lands in an `Other` variant for the handler to log.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode a topic payload into one of the event enums below.
pub fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(payload)
}

// ── Stream state (per channel) ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamStateEvent {
    Viewcount {
        #[serde(default)]
        viewers: Option<u32>,
    },
    StreamUp,
    StreamDown,
    Commercial,
    #[serde(other)]
    Other,
}

// ── Drops (per user) ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DropEvent {
    DropProgress { data: DropProgressData },
    DropClaim { data: DropClaimData },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DropProgressData {
    pub drop_id: String,
    pub current_progress_min: u32,
    #[serde(default)]
    pub required_progress_min: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DropClaimData {
    pub drop_id: String,
    pub drop_instance_id: String,
}

// ── Community points (per user) ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PointsEvent {
    PointsEarned { data: PointsEarnedData },
    ClaimAvailable { data: ClaimAvailableData },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PointGain {
    pub total_points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Balance {
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PointsEarnedData {
    pub channel_id: String,
    pub point_gain: PointGain,
    pub balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClaimAvailableData {
    pub claim: PointsClaim,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PointsClaim {
    pub id: String,
    pub channel_id: String,
    pub point_gain: PointGain,
}
