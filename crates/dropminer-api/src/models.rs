// Response shapes for the GQL, passport and validate endpoints.
//
// Field names follow the wire format (camelCase); only the fields the
// miner reads are modelled. Identifiers stay strings here; `dropminer-core`
// parses them into its own id types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── GQL envelope ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct GqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GqlErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GqlErrorMessage {
    pub message: String,
}

// ── Shared fragments ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    pub id: String,
    #[serde(alias = "name")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub id: String,
    #[serde(alias = "login")]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ── Campaigns ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSelf {
    #[serde(default)]
    pub is_account_connected: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowData {
    #[serde(default = "enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub channels: Option<Vec<ChannelRef>>,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenefitEdge {
    pub benefit: Benefit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Benefit {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropSelf {
    #[serde(default)]
    pub current_minutes_watched: u32,
    #[serde(default, rename = "dropInstanceID")]
    pub drop_instance_id: Option<String>,
    #[serde(default)]
    pub is_claimed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropData {
    pub id: String,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub required_minutes_watched: u32,
    #[serde(default)]
    pub benefit_edges: Vec<BenefitEdge>,
    /// Present only for in-progress campaigns.
    #[serde(default, rename = "self")]
    pub progress: Option<DropSelf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignData {
    pub id: String,
    pub name: String,
    pub status: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub game: GameData,
    #[serde(default, rename = "self")]
    pub viewer: CampaignSelf,
    #[serde(default)]
    pub allow: Option<AllowData>,
    #[serde(default)]
    pub time_based_drops: Vec<DropData>,
}

/// An already-awarded reward edge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedBenefit {
    pub id: String,
    pub last_awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryData {
    #[serde(default)]
    pub drop_campaigns_in_progress: Option<Vec<CampaignData>>,
    #[serde(default)]
    pub game_event_drops: Vec<ClaimedBenefit>,
}

/// A catalog entry from the campaigns dashboard.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableCampaign {
    pub id: String,
    pub name: String,
    pub status: String,
    pub game: GameData,
    #[serde(default, rename = "self")]
    pub viewer: CampaignSelf,
}

impl AvailableCampaign {
    /// Active or upcoming campaigns are worth a details fetch.
    pub fn is_applicable(&self) -> bool {
        matches!(self.status.as_str(), "ACTIVE" | "UPCOMING")
    }
}

// ── Channels and streams ─────────────────────────────────────────────

/// A live stream from the game directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStream {
    /// Broadcast (stream) id.
    pub id: String,
    #[serde(default)]
    pub viewers_count: Option<u32>,
    #[serde(default)]
    pub game: Option<GameData>,
    pub broadcaster: ChannelRef,
}

/// Stream information for a single channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub login: String,
    pub display_name: Option<String>,
    /// `None` when the channel is offline.
    pub stream: Option<StreamData>,
    pub drops_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    pub id: String,
    #[serde(default)]
    pub viewers_count: Option<u32>,
    #[serde(default)]
    pub game: Option<GameData>,
}

/// The backend's view of the drop currently being progressed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentDrop {
    #[serde(rename = "dropID")]
    pub drop_id: String,
    pub current_minutes_watched: u32,
    #[serde(default)]
    pub required_minutes_watched: Option<u32>,
}

/// Channel points balance plus any claimable bonus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsContext {
    pub channel_id: String,
    pub balance: u64,
    pub available_claim: Option<String>,
}

// ── Login ────────────────────────────────────────────────────────────

/// Passport login request body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub undelete_user: bool,
    pub remember_me: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authy_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitchguard_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha: Option<CaptchaProof>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptchaProof {
    pub proof: String,
}

/// Passport login response; success and failure share one shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error_code: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub captcha_proof: Option<String>,
}

/// Result of validating an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub status: u16,
    pub user_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateBody {
    pub user_id: String,
}
