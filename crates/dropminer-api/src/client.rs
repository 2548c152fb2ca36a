// Backend HTTP client
//
// Wraps `reqwest::Client` with endpoint resolution, the retrying request
// wrapper, GQL envelope unwrapping and the handful of non-GQL calls the
// miner needs (passport login, token validation, watch beacon).

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::gql::{self, GqlOperation};
use crate::models::{
    AvailableCampaign, CampaignData, ChannelInfo, CurrentDrop, DirectoryStream, GqlResponse,
    InventoryData, LoginRequest, LoginResponse, PointsContext, StreamData, ValidateBody,
    Validation,
};
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

/// Client id sent with every backend request.
pub const CLIENT_ID: &str = "kd1unb4b3q4t58fwlpcbzcbnm76a8fp";
/// Cookie domain holding the session cookies.
pub const COOKIE_DOMAIN: &str = "twitch.tv";

const CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("client-id");

/// Claim statuses that mean the reward is ours.
const CLAIM_OK_STATUSES: [&str; 2] = ["ELIGIBLE_FOR_ALL", "DROP_INSTANCE_ALREADY_CLAIMED"];

static BEACON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""spade_?url":\s*"(https?://[^"]+)""#).expect("valid beacon pattern")
});

static SETTINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"src="(https?://[^"]+/config/settings\.[0-9a-f]{32}\.js)""#)
        .expect("valid settings pattern")
});

// ── Endpoints ────────────────────────────────────────────────────────

/// Base URLs for every backend surface.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub gql: Url,
    pub login: Url,
    pub validate: Url,
    /// Channel pages; `{web}{login}` is the channel page.
    pub web: Url,
    pub pubsub: Url,
}

impl Endpoints {
    /// The production endpoints.
    pub fn twitch() -> Result<Self, Error> {
        Ok(Self {
            gql: Url::parse("https://gql.twitch.tv/gql")?,
            login: Url::parse("https://passport.twitch.tv/login")?,
            validate: Url::parse("https://id.twitch.tv/oauth2/validate")?,
            web: Url::parse("https://www.twitch.tv/")?,
            pubsub: Url::parse("wss://pubsub-edge.twitch.tv/v1")?,
        })
    }

    /// Every endpoint under one base URL. Used against mock servers.
    pub fn under(base: &Url) -> Result<Self, Error> {
        let ws_base = match base.scheme() {
            "https" => base.as_str().replacen("https", "wss", 1),
            _ => base.as_str().replacen("http", "ws", 1),
        };
        Ok(Self {
            gql: base.join("gql")?,
            login: base.join("login")?,
            validate: base.join("oauth2/validate")?,
            web: base.join("web/")?,
            pubsub: Url::parse(&ws_base)?.join("pubsub")?,
        })
    }
}

// ── Request body ─────────────────────────────────────────────────────

/// Payload of an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

// ── TwitchClient ─────────────────────────────────────────────────────

/// Async client for the backend's GQL, passport, validation and beacon
/// endpoints.
///
/// The access token is set after login and attached to every GQL request.
/// Beacon URLs are discovered from channel pages once and cached per
/// channel login.
pub struct TwitchClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    retry: RetryPolicy,
    access_token: RwLock<Option<SecretString>>,
    beacons: Mutex<HashMap<String, Url>>,
}

impl TwitchClient {
    pub fn new(
        endpoints: Endpoints,
        transport: &TransportConfig,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoints,
            retry,
            access_token: RwLock::new(None),
            beacons: Mutex::new(HashMap::new()),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub async fn set_access_token(&self, token: Option<SecretString>) {
        *self.access_token.write().await = token;
    }

    pub async fn has_access_token(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Issue a request through the retry wrapper.
    ///
    /// `attempts` overrides the configured attempt budget for this call.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        body: RequestBody,
        headers: HeaderMap,
        attempts: Option<u32>,
    ) -> Result<reqwest::Response, Error> {
        let policy = attempts.map_or(self.retry, |n| self.retry.with_attempts(n));
        let label = method.as_str().to_owned();

        policy
            .run(&label, url.as_str(), |attempt| {
                debug!(%method, %url, attempt, "request");
                let mut builder = self
                    .http
                    .request(method.clone(), url.clone())
                    .headers(headers.clone());
                builder = match &body {
                    RequestBody::Empty => builder,
                    RequestBody::Json(value) => builder.json(value),
                    RequestBody::Form(fields) => builder.form(fields),
                };
                async move { builder.send().await.map_err(Error::Transport) }
            })
            .await
    }

    async fn auth_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static(CLIENT_ID));
        if let Some(token) = self.access_token.read().await.as_ref() {
            let value = HeaderValue::from_str(&format!("OAuth {}", token.expose_secret()))
                .map_err(|e| Error::Deserialization {
                    message: format!("access token is not a valid header value: {e}"),
                    body: String::new(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Post a GQL operation and unwrap its `data` member.
    pub async fn gql<T: DeserializeOwned>(&self, op: GqlOperation) -> Result<T, Error> {
        let operation = op.operation_name;
        debug!(target: "dropminer_api::gql", operation, variables = %op.variables, "GQL request");

        let body = serde_json::to_value(&op).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        let headers = self.auth_headers().await?;
        let url = self.endpoints.gql.clone();
        let resp = self
            .request(Method::POST, url.clone(), RequestBody::Json(body), headers, None)
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = resp.text().await.map_err(Error::Transport)?;
        debug!(target: "dropminer_api::gql", operation, bytes = text.len(), "GQL response");

        let envelope: GqlResponse<T> =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: format!("{operation}: {e}"),
                body: text.clone(),
            })?;

        if let Some(first) = envelope.errors.first() {
            return Err(Error::Gql {
                operation: operation.to_owned(),
                message: first.message.clone(),
            });
        }
        envelope.data.ok_or_else(|| Error::MissingField {
            operation: operation.to_owned(),
            field: "data",
        })
    }

    // ── Inventory & campaigns ────────────────────────────────────────

    /// In-progress campaigns plus the claimed-benefit log.
    pub async fn inventory(&self) -> Result<InventoryData, Error> {
        #[derive(Deserialize)]
        struct User {
            inventory: InventoryData,
        }
        let data: CurrentUserData<User> = self.gql(gql::inventory()).await?;
        Ok(data.require("Inventory")?.inventory)
    }

    /// The campaign catalog.
    pub async fn campaigns(&self) -> Result<Vec<AvailableCampaign>, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct User {
            #[serde(default)]
            drop_campaigns: Option<Vec<AvailableCampaign>>,
        }
        let data: CurrentUserData<User> = self.gql(gql::campaigns()).await?;
        Ok(data
            .require("ViewerDropsDashboard")?
            .drop_campaigns
            .unwrap_or_default())
    }

    /// Full details of one campaign, as seen by `user_id`.
    pub async fn campaign_details(
        &self,
        user_id: u64,
        campaign_id: &str,
    ) -> Result<Option<CampaignData>, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct User {
            drop_campaign: Option<CampaignData>,
        }
        #[derive(Deserialize)]
        struct Data {
            user: Option<User>,
        }
        let data: Data = self.gql(gql::campaign_details(user_id, campaign_id)).await?;
        Ok(data.user.and_then(|u| u.drop_campaign))
    }

    // ── Channels ─────────────────────────────────────────────────────

    /// Live, drops-enabled streams for a game.
    pub async fn game_directory(
        &self,
        game_name: &str,
        limit: u32,
    ) -> Result<Vec<DirectoryStream>, Error> {
        #[derive(Deserialize)]
        struct Edge {
            node: DirectoryStream,
        }
        #[derive(Deserialize)]
        struct Streams {
            #[serde(default)]
            edges: Vec<Edge>,
        }
        #[derive(Deserialize)]
        struct Game {
            streams: Option<Streams>,
        }
        #[derive(Deserialize)]
        struct Data {
            game: Option<Game>,
        }
        let data: Data = self.gql(gql::game_directory(game_name, limit)).await?;
        Ok(data
            .game
            .and_then(|g| g.streams)
            .map(|s| s.edges.into_iter().map(|e| e.node).collect())
            .unwrap_or_default())
    }

    /// Stream information for one channel, `None` if the channel is unknown.
    pub async fn stream_info(&self, login: &str) -> Result<Option<ChannelInfo>, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ChannelData {
            #[serde(default)]
            viewer_drop_campaigns: Option<Vec<IgnoredAny>>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct User {
            id: String,
            login: String,
            display_name: Option<String>,
            stream: Option<StreamData>,
            channel: Option<ChannelData>,
        }
        #[derive(Deserialize)]
        struct Data {
            user: Option<User>,
        }

        let data: Data = self.gql(gql::stream_info(login)).await?;
        Ok(data.user.map(|user| ChannelInfo {
            drops_enabled: user
                .channel
                .and_then(|c| c.viewer_drop_campaigns)
                .is_some_and(|c| !c.is_empty()),
            id: user.id,
            login: user.login,
            display_name: user.display_name,
            stream: user.stream,
        }))
    }

    // ── Drops ────────────────────────────────────────────────────────

    /// The drop the backend is currently progressing, if any.
    pub async fn current_drop(&self, channel_id: Option<u64>) -> Result<Option<CurrentDrop>, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct User {
            drop_current_session: Option<CurrentDrop>,
        }
        let data: CurrentUserData<User> = self.gql(gql::current_drop(channel_id)).await?;
        Ok(data.require("DropCurrentSessionContext")?.drop_current_session)
    }

    /// Claim a drop instance. Returns `true` if the reward is now ours.
    pub async fn claim_drop(&self, drop_instance_id: &str) -> Result<bool, Error> {
        #[derive(Deserialize)]
        struct Claim {
            status: Option<String>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            claim_drop_rewards: Option<Claim>,
        }
        let data: Data = self.gql(gql::claim_drop(drop_instance_id)).await?;
        let status = data.claim_drop_rewards.and_then(|c| c.status);
        debug!(drop_instance_id, status = ?status, "claim result");
        Ok(status.is_some_and(|s| CLAIM_OK_STATUSES.contains(&s.as_str())))
    }

    // ── Channel points ───────────────────────────────────────────────

    pub async fn claim_community_points(&self, channel_id: u64, claim_id: &str) -> Result<(), Error> {
        let _: Value = self
            .gql(gql::claim_community_points(channel_id, claim_id))
            .await?;
        Ok(())
    }

    /// Points balance and claimable bonus for a channel.
    pub async fn channel_points_context(&self, login: &str) -> Result<Option<PointsContext>, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Claim {
            id: String,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Points {
            balance: u64,
            available_claim: Option<Claim>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SelfEdge {
            community_points: Option<Points>,
        }
        #[derive(Deserialize)]
        struct ChannelData {
            #[serde(rename = "self")]
            viewer: Option<SelfEdge>,
        }
        #[derive(Deserialize)]
        struct Community {
            id: String,
            channel: Option<ChannelData>,
        }
        #[derive(Deserialize)]
        struct Data {
            community: Option<Community>,
        }

        let data: Data = self.gql(gql::channel_points_context(login)).await?;
        Ok(data.community.and_then(|community| {
            let points = community.channel?.viewer?.community_points?;
            Some(PointsContext {
                channel_id: community.id,
                balance: points.balance,
                available_claim: points.available_claim.map(|c| c.id),
            })
        }))
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Submit a passport login. Error codes come back in the body, not as
    /// an `Err`.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, Error> {
        let body = serde_json::to_value(request).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        let resp = self
            .request(
                Method::POST,
                self.endpoints.login.clone(),
                RequestBody::Json(body),
                HeaderMap::new(),
                None,
            )
            .await?;
        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;
        debug!(status = status.as_u16(), "login response");
        serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: format!("login response: {e}"),
            body: text,
        })
    }

    /// Validate an access token, returning the HTTP status and the user id
    /// the token belongs to.
    pub async fn validate(&self, token: &SecretString) -> Result<Validation, Error> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("OAuth {}", token.expose_secret())).map_err(
            |e| Error::Deserialization {
                message: format!("access token is not a valid header value: {e}"),
                body: String::new(),
            },
        )?;
        headers.insert(AUTHORIZATION, value);

        let resp = self
            .request(
                Method::GET,
                self.endpoints.validate.clone(),
                RequestBody::Empty,
                headers,
                None,
            )
            .await?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Ok(Validation {
                status,
                user_id: None,
            });
        }

        let text = resp.text().await.map_err(Error::Transport)?;
        let body: ValidateBody = serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: format!("validate response: {e}"),
            body: text.clone(),
        })?;
        let user_id = body.user_id.parse().map_err(|_| Error::Deserialization {
            message: format!("user id is not numeric: {}", body.user_id),
            body: text,
        })?;
        Ok(Validation {
            status,
            user_id: Some(user_id),
        })
    }

    // ── Watch heartbeat ──────────────────────────────────────────────

    /// Send one minute-watched heartbeat for a live broadcast.
    ///
    /// Returns `Ok(false)` if the beacon rejected the payload; the cached
    /// beacon URL is dropped so the next call rediscovers it.
    pub async fn send_watch(&self, beat: &WatchBeat<'_>) -> Result<bool, Error> {
        let beacon = self.beacon_url(beat.channel_login).await?;

        let payload = json!([{
            "event": "minute-watched",
            "properties": {
                "broadcast_id": beat.broadcast_id,
                "channel_id": beat.channel_id.to_string(),
                "channel": beat.channel_login,
                "hidden": false,
                "live": true,
                "location": "channel",
                "logged_in": true,
                "muted": false,
                "player": "site",
                "user_id": beat.user_id,
            }
        }]);
        let encoded = STANDARD.encode(payload.to_string());

        let resp = self
            .request(
                Method::POST,
                beacon,
                RequestBody::Form(vec![("data".to_owned(), encoded)]),
                HeaderMap::new(),
                None,
            )
            .await?;

        if resp.status().as_u16() == 204 {
            debug!(channel = beat.channel_login, "watch heartbeat accepted");
            Ok(true)
        } else {
            warn!(
                channel = beat.channel_login,
                status = resp.status().as_u16(),
                "watch heartbeat rejected"
            );
            self.beacons.lock().await.remove(beat.channel_login);
            Ok(false)
        }
    }

    async fn beacon_url(&self, channel_login: &str) -> Result<Url, Error> {
        if let Some(url) = self.beacons.lock().await.get(channel_login) {
            return Ok(url.clone());
        }

        let page_url = self.endpoints.web.join(channel_login)?;
        let page = self.fetch_text(page_url).await?;

        let found = match capture(&BEACON_RE, &page) {
            Some(url) => Some(url),
            None => match capture(&SETTINGS_RE, &page) {
                Some(settings) => {
                    let script = self.fetch_text(Url::parse(&settings)?).await?;
                    capture(&BEACON_RE, &script)
                }
                None => None,
            },
        };

        let url = Url::parse(&found.ok_or_else(|| Error::BeaconNotFound {
            channel: channel_login.to_owned(),
        })?)?;
        debug!(channel = channel_login, beacon = %url, "beacon discovered");
        self.beacons
            .lock()
            .await
            .insert(channel_login.to_owned(), url.clone());
        Ok(url)
    }

    async fn fetch_text(&self, url: Url) -> Result<String, Error> {
        let resp = self
            .request(Method::GET, url.clone(), RequestBody::Empty, HeaderMap::new(), None)
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        resp.text().await.map_err(Error::Transport)
    }
}

/// Identifies one heartbeat.
#[derive(Debug, Clone, Copy)]
pub struct WatchBeat<'a> {
    pub channel_login: &'a str,
    pub channel_id: u64,
    pub broadcast_id: &'a str,
    pub user_id: u64,
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUserData<T> {
    current_user: Option<T>,
}

impl<T> CurrentUserData<T> {
    fn require(self, operation: &str) -> Result<T, Error> {
        self.current_user.ok_or_else(|| Error::MissingField {
            operation: operation.to_owned(),
            field: "currentUser",
        })
    }
}
