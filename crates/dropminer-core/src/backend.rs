// ── Collaborator seams ──
//
// The miner talks to the backend and to the push-topic pool only through
// these traits. `TwitchClient` and `PubSubPool` are the production
// implementations; tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;

use dropminer_api::models::{
    AvailableCampaign, CampaignData, ChannelInfo, CurrentDrop, DirectoryStream, InventoryData,
    LoginRequest, LoginResponse, PointsContext, Validation,
};
use dropminer_api::{Error as ApiError, PubSubPool, Topic, TopicMessage, TwitchClient, WatchBeat};

use crate::model::{Channel, Game};

pub type ApiResult<T> = Result<T, ApiError>;

/// Typed backend operations the miner consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn set_access_token(&self, token: Option<SecretString>);

    async fn login(&self, request: &LoginRequest) -> ApiResult<LoginResponse>;
    async fn validate(&self, token: &SecretString) -> ApiResult<Validation>;

    async fn inventory(&self) -> ApiResult<InventoryData>;
    async fn campaigns(&self) -> ApiResult<Vec<AvailableCampaign>>;
    async fn campaign_details(
        &self,
        user_id: u64,
        campaign_id: &str,
    ) -> ApiResult<Option<CampaignData>>;

    async fn live_streams(&self, game: &Game, limit: u32) -> ApiResult<Vec<DirectoryStream>>;
    async fn stream_info(&self, login: &str) -> ApiResult<Option<ChannelInfo>>;

    async fn current_drop(&self, channel_id: Option<u64>) -> ApiResult<Option<CurrentDrop>>;
    async fn claim_drop(&self, drop_instance_id: &str) -> ApiResult<bool>;

    async fn points_context(&self, login: &str) -> ApiResult<Option<PointsContext>>;
    async fn claim_points(&self, channel_id: u64, claim_id: &str) -> ApiResult<()>;

    /// Send one watch heartbeat. `Ok(false)` means the backend did not
    /// accept it, including when the channel has no live broadcast.
    async fn send_watch(&self, channel: &Channel, user_id: u64) -> ApiResult<bool>;
}

/// Subscription budget and fan-out of decoded push messages.
#[async_trait]
pub trait TopicPool: Send + Sync {
    fn max_topics(&self) -> usize;
    fn subscribe(&self) -> broadcast::Receiver<Arc<TopicMessage>>;

    async fn set_auth_token(&self, token: Option<SecretString>);
    async fn add_topics(&self, topics: Vec<Topic>) -> ApiResult<()>;
    async fn remove_topics(&self, topics: &[Topic]);
    async fn start(&self);
    async fn stop(&self);
}

// ── Production implementations ───────────────────────────────────────

#[async_trait]
impl Backend for TwitchClient {
    async fn set_access_token(&self, token: Option<SecretString>) {
        TwitchClient::set_access_token(self, token).await;
    }

    async fn login(&self, request: &LoginRequest) -> ApiResult<LoginResponse> {
        TwitchClient::login(self, request).await
    }

    async fn validate(&self, token: &SecretString) -> ApiResult<Validation> {
        TwitchClient::validate(self, token).await
    }

    async fn inventory(&self) -> ApiResult<InventoryData> {
        TwitchClient::inventory(self).await
    }

    async fn campaigns(&self) -> ApiResult<Vec<AvailableCampaign>> {
        TwitchClient::campaigns(self).await
    }

    async fn campaign_details(
        &self,
        user_id: u64,
        campaign_id: &str,
    ) -> ApiResult<Option<CampaignData>> {
        TwitchClient::campaign_details(self, user_id, campaign_id).await
    }

    async fn live_streams(&self, game: &Game, limit: u32) -> ApiResult<Vec<DirectoryStream>> {
        self.game_directory(&game.name, limit).await
    }

    async fn stream_info(&self, login: &str) -> ApiResult<Option<ChannelInfo>> {
        TwitchClient::stream_info(self, login).await
    }

    async fn current_drop(&self, channel_id: Option<u64>) -> ApiResult<Option<CurrentDrop>> {
        TwitchClient::current_drop(self, channel_id).await
    }

    async fn claim_drop(&self, drop_instance_id: &str) -> ApiResult<bool> {
        TwitchClient::claim_drop(self, drop_instance_id).await
    }

    async fn points_context(&self, login: &str) -> ApiResult<Option<PointsContext>> {
        self.channel_points_context(login).await
    }

    async fn claim_points(&self, channel_id: u64, claim_id: &str) -> ApiResult<()> {
        self.claim_community_points(channel_id, claim_id).await
    }

    async fn send_watch(&self, channel: &Channel, user_id: u64) -> ApiResult<bool> {
        let Some(broadcast_id) = channel.broadcast_id.as_deref() else {
            return Ok(false);
        };
        let beat = WatchBeat {
            channel_login: &channel.login,
            channel_id: channel.id,
            broadcast_id,
            user_id,
        };
        TwitchClient::send_watch(self, &beat).await
    }
}

#[async_trait]
impl TopicPool for PubSubPool {
    fn max_topics(&self) -> usize {
        PubSubPool::max_topics(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<TopicMessage>> {
        PubSubPool::subscribe(self)
    }

    async fn set_auth_token(&self, token: Option<SecretString>) {
        PubSubPool::set_auth_token(self, token).await;
    }

    async fn add_topics(&self, topics: Vec<Topic>) -> ApiResult<()> {
        PubSubPool::add_topics(self, topics).await
    }

    async fn remove_topics(&self, topics: &[Topic]) {
        PubSubPool::remove_topics(self, topics).await;
    }

    async fn start(&self) {
        PubSubPool::start(self).await;
    }

    async fn stop(&self) {
        PubSubPool::stop(self).await;
    }
}
