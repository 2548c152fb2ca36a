// GQL operation documents.
//
// Each operation is a raw GraphQL document plus its variables. The
// documents only select the fields the miner actually reads; the
// response shapes live in `models`.

use serde::Serialize;
use serde_json::{Value, json};

/// A single GQL request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GqlOperation {
    pub operation_name: &'static str,
    pub query: &'static str,
    pub variables: Value,
}

impl GqlOperation {
    const fn new(operation_name: &'static str, query: &'static str) -> Self {
        Self {
            operation_name,
            query,
            variables: Value::Null,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }
}

const INVENTORY: &str = r"
query Inventory {
  currentUser {
    id
    inventory {
      dropCampaignsInProgress {
        id name status startAt endAt
        game { id displayName }
        self { isAccountConnected }
        allow { isEnabled channels { id name displayName } }
        timeBasedDrops {
          id name startAt endAt requiredMinutesWatched
          benefitEdges { benefit { id name } }
          self { currentMinutesWatched dropInstanceID isClaimed }
        }
      }
      gameEventDrops { id lastAwardedAt }
    }
  }
}";

const CAMPAIGNS: &str = r"
query ViewerDropsDashboard {
  currentUser {
    id
    dropCampaigns {
      id name status startAt endAt
      game { id displayName }
      self { isAccountConnected }
    }
  }
}";

const CAMPAIGN_DETAILS: &str = r"
query DropCampaignDetails($channelLogin: ID!, $dropID: ID!) {
  user(id: $channelLogin) {
    dropCampaign(id: $dropID) {
      id name status startAt endAt
      game { id displayName }
      self { isAccountConnected }
      allow { isEnabled channels { id name displayName } }
      timeBasedDrops {
        id name startAt endAt requiredMinutesWatched
        benefitEdges { benefit { id name } }
      }
    }
  }
}";

const GAME_DIRECTORY: &str = r"
query DirectoryPage_Game($name: String!, $limit: Int!) {
  game(name: $name) {
    streams(first: $limit, options: {systemFilters: [DROPS_ENABLED], includeRestricted: [SUB_ONLY_LIVE]}) {
      edges {
        node {
          id viewersCount
          game { id displayName }
          broadcaster { id login displayName }
        }
      }
    }
  }
}";

const STREAM_INFO: &str = r"
query StreamInfo($login: String!) {
  user(login: $login) {
    id login displayName
    stream { id viewersCount game { id displayName } }
    channel { viewerDropCampaigns { id } }
  }
}";

const CURRENT_DROP: &str = r"
query DropCurrentSessionContext($channelID: ID) {
  currentUser {
    dropCurrentSession(channelID: $channelID) {
      dropID currentMinutesWatched requiredMinutesWatched
    }
  }
}";

const CLAIM_DROP: &str = r"
mutation DropsPage_ClaimDropRewards($input: ClaimDropRewardsInput!) {
  claimDropRewards(input: $input) { status }
}";

const CLAIM_COMMUNITY_POINTS: &str = r"
mutation ClaimCommunityPoints($input: ClaimCommunityPointsInput!) {
  claimCommunityPoints(input: $input) { currentPoints }
}";

const CHANNEL_POINTS_CONTEXT: &str = r"
query ChannelPointsContext($channelLogin: String!) {
  community: user(login: $channelLogin) {
    id
    channel { self { communityPoints { balance availableClaim { id } } } }
  }
}";

pub fn inventory() -> GqlOperation {
    GqlOperation::new("Inventory", INVENTORY)
}

pub fn campaigns() -> GqlOperation {
    GqlOperation::new("ViewerDropsDashboard", CAMPAIGNS)
}

pub fn campaign_details(user_id: u64, campaign_id: &str) -> GqlOperation {
    GqlOperation::new("DropCampaignDetails", CAMPAIGN_DETAILS).with_variables(json!({
        "channelLogin": user_id.to_string(),
        "dropID": campaign_id,
    }))
}

pub fn game_directory(game_name: &str, limit: u32) -> GqlOperation {
    GqlOperation::new("DirectoryPage_Game", GAME_DIRECTORY).with_variables(json!({
        "name": game_name,
        "limit": limit,
    }))
}

pub fn stream_info(login: &str) -> GqlOperation {
    GqlOperation::new("StreamInfo", STREAM_INFO).with_variables(json!({ "login": login }))
}

pub fn current_drop(channel_id: Option<u64>) -> GqlOperation {
    GqlOperation::new("DropCurrentSessionContext", CURRENT_DROP).with_variables(json!({
        "channelID": channel_id.map(|id| id.to_string()),
    }))
}

pub fn claim_drop(drop_instance_id: &str) -> GqlOperation {
    GqlOperation::new("DropsPage_ClaimDropRewards", CLAIM_DROP).with_variables(json!({
        "input": { "dropInstanceID": drop_instance_id },
    }))
}

pub fn claim_community_points(channel_id: u64, claim_id: &str) -> GqlOperation {
    GqlOperation::new("ClaimCommunityPoints", CLAIM_COMMUNITY_POINTS).with_variables(json!({
        "input": { "channelID": channel_id.to_string(), "claimID": claim_id },
    }))
}

pub fn channel_points_context(login: &str) -> GqlOperation {
    GqlOperation::new("ChannelPointsContext", CHANNEL_POINTS_CONTEXT)
        .with_variables(json!({ "channelLogin": login }))
}
