// ── In-memory collaborators for unit tests ──

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;

use dropminer_api::models::{
    AvailableCampaign, Benefit, BenefitEdge, CampaignData, CampaignSelf, ChannelInfo, ChannelRef,
    CurrentDrop, DirectoryStream, DropData, DropSelf, GameData, InventoryData, LoginRequest,
    LoginResponse, PointsContext, StreamData, Validation,
};
use dropminer_api::{
    AUTH_TOKEN_COOKIE, COOKIE_DOMAIN, CookieFile, Error as ApiError, Topic, TopicMessage,
};

use crate::backend::{ApiResult, Backend, TopicPool};
use crate::config::MinerConfig;
use crate::convert::{self, ClaimedBenefits};
use crate::error::CoreError;
use crate::miner::{Miner, MinerDeps};
use crate::model::{Campaign, Channel, DropProgress, Game, Inventory};
use crate::ranking::GameRanks;
use crate::presenter::{LoginField, LoginInput, LoginPrompt, Presenter};
use crate::state::State;

// ── Backend ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<String>>,
    login_responses: Mutex<VecDeque<LoginResponse>>,
    login_requests: Mutex<Vec<LoginRequest>>,
    validations: Mutex<VecDeque<Validation>>,
    inventory: Mutex<Option<InventoryData>>,
    catalog: Mutex<Vec<AvailableCampaign>>,
    details: Mutex<HashMap<String, CampaignData>>,
    streams: Mutex<HashMap<String, Vec<DirectoryStream>>>,
    infos: Mutex<HashMap<String, ChannelInfo>>,
    current_drops: Mutex<VecDeque<Option<CurrentDrop>>>,
    watch_results: Mutex<VecDeque<bool>>,
    claim_fails: AtomicBool,
    points: Mutex<HashMap<String, PointsContext>>,
    token: Mutex<Option<String>>,
}

impl MockBackend {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose name starts with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn push_login(&self, response: LoginResponse) {
        self.login_responses.lock().unwrap().push_back(response);
    }

    pub fn login_requests(&self) -> Vec<LoginRequest> {
        self.login_requests.lock().unwrap().clone()
    }

    pub fn push_validation(&self, status: u16, user_id: Option<u64>) {
        self.validations
            .lock()
            .unwrap()
            .push_back(Validation { status, user_id });
    }

    pub fn set_inventory(&self, in_progress: Vec<CampaignData>) {
        *self.inventory.lock().unwrap() = Some(InventoryData {
            drop_campaigns_in_progress: Some(in_progress),
            game_event_drops: Vec::new(),
        });
    }

    /// List a campaign in the catalog and serve its details.
    pub fn add_available(&self, campaign: CampaignData, status: &str, linked: bool) {
        self.catalog.lock().unwrap().push(AvailableCampaign {
            id: campaign.id.clone(),
            name: campaign.name.clone(),
            status: status.into(),
            game: campaign.game.clone(),
            viewer: CampaignSelf {
                is_account_connected: linked,
            },
        });
        self.details
            .lock()
            .unwrap()
            .insert(campaign.id.clone(), campaign);
    }

    pub fn set_streams(&self, game_name: &str, streams: Vec<DirectoryStream>) {
        self.streams
            .lock()
            .unwrap()
            .insert(game_name.into(), streams);
    }

    pub fn set_stream_info(&self, info: ChannelInfo) {
        self.infos.lock().unwrap().insert(info.login.clone(), info);
    }

    pub fn push_current_drop(&self, drop: Option<CurrentDrop>) {
        self.current_drops.lock().unwrap().push_back(drop);
    }

    pub fn push_watch_result(&self, ok: bool) {
        self.watch_results.lock().unwrap().push_back(ok);
    }

    pub fn fail_claims(&self) {
        self.claim_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_points(&self, login: &str, context: PointsContext) {
        self.points.lock().unwrap().insert(login.into(), context);
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn set_access_token(&self, token: Option<SecretString>) {
        *self.token.lock().unwrap() = token.map(|t| t.expose_secret().to_owned());
    }

    async fn login(&self, request: &LoginRequest) -> ApiResult<LoginResponse> {
        self.record("login");
        self.login_requests.lock().unwrap().push(request.clone());
        Ok(self
            .login_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn validate(&self, token: &SecretString) -> ApiResult<Validation> {
        self.record(format!("validate:{}", token.expose_secret()));
        Ok(self
            .validations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Validation {
                status: 200,
                user_id: Some(42),
            }))
    }

    async fn inventory(&self) -> ApiResult<InventoryData> {
        self.record("inventory");
        Ok(self
            .inventory
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(InventoryData {
                drop_campaigns_in_progress: None,
                game_event_drops: Vec::new(),
            }))
    }

    async fn campaigns(&self) -> ApiResult<Vec<AvailableCampaign>> {
        self.record("campaigns");
        Ok(self.catalog.lock().unwrap().clone())
    }

    async fn campaign_details(
        &self,
        _user_id: u64,
        campaign_id: &str,
    ) -> ApiResult<Option<CampaignData>> {
        self.record(format!("campaign_details:{campaign_id}"));
        Ok(self.details.lock().unwrap().get(campaign_id).cloned())
    }

    async fn live_streams(&self, game: &Game, _limit: u32) -> ApiResult<Vec<DirectoryStream>> {
        self.record(format!("live_streams:{}", game.name));
        Ok(self
            .streams
            .lock()
            .unwrap()
            .get(&game.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn stream_info(&self, login: &str) -> ApiResult<Option<ChannelInfo>> {
        self.record(format!("stream_info:{login}"));
        Ok(self.infos.lock().unwrap().get(login).cloned())
    }

    async fn current_drop(&self, channel_id: Option<u64>) -> ApiResult<Option<CurrentDrop>> {
        self.record(format!("current_drop:{channel_id:?}"));
        Ok(self.current_drops.lock().unwrap().pop_front().flatten())
    }

    async fn claim_drop(&self, drop_instance_id: &str) -> ApiResult<bool> {
        self.record(format!("claim_drop:{drop_instance_id}"));
        Ok(!self.claim_fails.load(Ordering::SeqCst))
    }

    async fn points_context(&self, login: &str) -> ApiResult<Option<PointsContext>> {
        self.record(format!("points_context:{login}"));
        Ok(self.points.lock().unwrap().get(login).cloned())
    }

    async fn claim_points(&self, channel_id: u64, claim_id: &str) -> ApiResult<()> {
        self.record(format!("claim_points:{channel_id}:{claim_id}"));
        Ok(())
    }

    async fn send_watch(&self, channel: &Channel, _user_id: u64) -> ApiResult<bool> {
        self.record(format!("send_watch:{}", channel.id));
        if channel.broadcast_id.is_none() {
            return Ok(false);
        }
        Ok(self
            .watch_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(true))
    }
}

// ── Topic pool ───────────────────────────────────────────────────────

pub struct MockPool {
    max_topics: usize,
    topics: Mutex<BTreeSet<Topic>>,
    removed: Mutex<Vec<Topic>>,
    started: AtomicBool,
    tx: broadcast::Sender<Arc<TopicMessage>>,
}

impl MockPool {
    pub fn new(max_topics: usize) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            max_topics,
            topics: Mutex::new(BTreeSet::new()),
            removed: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            tx,
        }
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.topics.lock().unwrap().iter().copied().collect()
    }

    pub fn removed(&self) -> Vec<Topic> {
        self.removed.lock().unwrap().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn publish(&self, topic: Topic, payload: Value) {
        let _ = self.tx.send(Arc::new(TopicMessage { topic, payload }));
    }
}

impl Default for MockPool {
    fn default() -> Self {
        Self::new(400)
    }
}

#[async_trait]
impl TopicPool for MockPool {
    fn max_topics(&self) -> usize {
        self.max_topics
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<TopicMessage>> {
        self.tx.subscribe()
    }

    async fn set_auth_token(&self, _token: Option<SecretString>) {}

    async fn add_topics(&self, topics: Vec<Topic>) -> ApiResult<()> {
        let mut current = self.topics.lock().unwrap();
        let new: BTreeSet<Topic> = topics
            .into_iter()
            .filter(|t| !current.contains(t))
            .collect();
        if current.len() + new.len() > self.max_topics {
            return Err(ApiError::TopicLimit {
                limit: self.max_topics,
            });
        }
        current.extend(new);
        Ok(())
    }

    async fn remove_topics(&self, topics: &[Topic]) {
        let mut current = self.topics.lock().unwrap();
        for topic in topics {
            current.remove(topic);
        }
        self.removed.lock().unwrap().extend_from_slice(topics);
    }

    async fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    async fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
}

// ── Presenter ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPresenter {
    lines: Mutex<Vec<String>>,
    events: Mutex<Vec<String>>,
    progress: Mutex<Vec<(DropProgress, bool)>>,
    selection: Mutex<Option<String>>,
    claims: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    fn event(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn has_line(&self, line: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l == line)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(DropProgress, bool)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn claims(&self) -> Vec<String> {
        self.claims.lock().unwrap().clone()
    }

    pub fn select(&self, login: &str) {
        *self.selection.lock().unwrap() = Some(login.into());
    }
}

impl Presenter for RecordingPresenter {
    fn print(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_owned());
    }

    fn status(&self, state: State) {
        self.event(format!("status:{state}"));
    }

    fn set_games(&self, games: &[Game]) {
        let names: Vec<&str> = games.iter().map(|g| g.name.as_str()).collect();
        self.event(format!("games:{}", names.join(",")));
    }

    fn channel_added(&self, channel: &Channel) {
        self.event(format!("added:{}", channel.id));
    }

    fn channel_updated(&self, channel: &Channel) {
        self.event(format!("updated:{}", channel.id));
    }

    fn channel_removed(&self, channel: &Channel) {
        self.event(format!("removed:{}", channel.id));
    }

    fn channels_cleared(&self) {
        self.event("cleared");
    }

    fn set_watching(&self, channel: &Channel) {
        self.event(format!("watching:{}", channel.id));
    }

    fn clear_watching(&self) {
        self.event("clear_watching");
    }

    fn inventory_replaced(&self, inventory: &Inventory) {
        self.event(format!("inventory:{}", inventory.campaigns().len()));
    }

    fn drop_progress(&self, progress: &DropProgress, countdown: bool) {
        self.progress
            .lock()
            .unwrap()
            .push((progress.clone(), countdown));
    }

    fn stop_timer(&self) {
        self.event("stop_timer");
    }

    fn take_selection(&self) -> Option<String> {
        self.selection.lock().unwrap().take()
    }

    fn notify_claim(&self, text: &str) {
        self.claims.lock().unwrap().push(text.to_owned());
    }
}

// ── Login prompt ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockPrompt {
    inputs: Mutex<VecDeque<LoginInput>>,
    cleared: Mutex<Vec<LoginField>>,
    updates: Mutex<Vec<(String, Option<u64>)>>,
}

impl MockPrompt {
    pub fn with_inputs<'a>(
        inputs: impl IntoIterator<Item = (&'a str, &'a str, Option<&'a str>)>,
    ) -> Self {
        let inputs = inputs
            .into_iter()
            .map(|(username, password, token)| LoginInput {
                username: username.into(),
                password: SecretString::from(password.to_owned()),
                token: token.map(str::to_owned),
            })
            .collect();
        Self {
            inputs: Mutex::new(inputs),
            ..Self::default()
        }
    }

    pub fn push_input(&self, username: &str, password: &str, token: Option<&str>) {
        self.inputs.lock().unwrap().push_back(LoginInput {
            username: username.into(),
            password: SecretString::from(password.to_owned()),
            token: token.map(str::to_owned),
        });
    }

    pub fn cleared(&self) -> Vec<LoginField> {
        self.cleared.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, Option<u64>)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginPrompt for MockPrompt {
    async fn ask_login(&self) -> Result<LoginInput, CoreError> {
        self.inputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(CoreError::ExitRequested)
    }

    fn clear(&self, field: LoginField) {
        self.cleared.lock().unwrap().push(field);
    }

    fn update(&self, status: &str, user_id: Option<u64>) {
        self.updates
            .lock()
            .unwrap()
            .push((status.to_owned(), user_id));
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────

pub fn game_data(id: &str, name: &str) -> GameData {
    GameData {
        id: id.into(),
        display_name: name.into(),
    }
}

/// An in-progress drop worth `required` minutes, `current` of them done.
pub fn drop_data(id: &str, required: u32, current: u32) -> DropData {
    let now = Utc::now();
    DropData {
        id: id.into(),
        name: format!("drop {id}"),
        start_at: now - TimeDelta::days(1),
        end_at: now + TimeDelta::days(7),
        required_minutes_watched: required,
        benefit_edges: vec![BenefitEdge {
            benefit: Benefit {
                id: format!("benefit-{id}"),
                name: format!("reward {id}"),
            },
        }],
        progress: Some(DropSelf {
            current_minutes_watched: current,
            drop_instance_id: None,
            is_claimed: false,
        }),
    }
}

/// A linked, active campaign ending `ends_in_days` from now.
pub fn campaign_data(
    id: &str,
    game: GameData,
    ends_in_days: i64,
    drops: Vec<DropData>,
) -> CampaignData {
    let now = Utc::now();
    CampaignData {
        id: id.into(),
        name: format!("campaign {id}"),
        status: "ACTIVE".into(),
        start_at: now - TimeDelta::days(1),
        end_at: now + TimeDelta::days(ends_in_days),
        game,
        viewer: CampaignSelf {
            is_account_connected: true,
        },
        allow: None,
        time_based_drops: drops,
    }
}

pub fn directory_stream(channel_id: u64, viewers: u32, game: &GameData) -> DirectoryStream {
    DirectoryStream {
        id: format!("broadcast-{channel_id}"),
        viewers_count: Some(viewers),
        game: Some(game.clone()),
        broadcaster: ChannelRef {
            id: channel_id.to_string(),
            name: format!("ch{channel_id}"),
            display_name: None,
        },
    }
}

pub fn live_info(channel_id: u64, viewers: u32, game: &GameData) -> ChannelInfo {
    ChannelInfo {
        id: channel_id.to_string(),
        login: format!("ch{channel_id}"),
        display_name: None,
        stream: Some(StreamData {
            id: format!("broadcast-{channel_id}"),
            viewers_count: Some(viewers),
            game: Some(game.clone()),
        }),
        drops_enabled: true,
    }
}

pub fn campaign(data: CampaignData) -> Campaign {
    convert::campaign_from(data, &ClaimedBenefits::new())
}

/// An online, drops-enabled channel streaming `game`.
pub fn live_channel(channel_id: u64, viewers: u32, game: &GameData) -> Channel {
    convert::channel_from_stream(directory_stream(channel_id, viewers, game)).unwrap()
}

pub fn ranks(games: &[(&GameData, i32)]) -> GameRanks {
    games
        .iter()
        .map(|(game, rank)| (Game::from((*game).clone()), *rank))
        .collect()
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub miner: Miner,
    pub backend: Arc<MockBackend>,
    pub pool: Arc<MockPool>,
    pub presenter: Arc<RecordingPresenter>,
    pub prompt: Arc<MockPrompt>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(config: MinerConfig) -> Self {
        Self::build(config, MockPool::default(), None)
    }

    pub fn with_pool(config: MinerConfig, pool: MockPool) -> Self {
        Self::build(config, pool, None)
    }

    /// A harness whose cookie file already holds a session token.
    pub fn with_cookie(config: MinerConfig, token: &str) -> Self {
        Self::build(config, MockPool::default(), Some(token))
    }

    fn build(config: MinerConfig, pool: MockPool, token: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut cookies = CookieFile::open(dir.path().join("cookies.json")).unwrap();
        if let Some(token) = token {
            cookies.store.set(COOKIE_DOMAIN, AUTH_TOKEN_COOKIE, token);
        }
        let backend = Arc::new(MockBackend::default());
        let pool = Arc::new(pool);
        let presenter = Arc::new(RecordingPresenter::default());
        let prompt = Arc::new(MockPrompt::default());
        let miner = Miner::new(
            config,
            MinerDeps {
                backend: Arc::clone(&backend) as Arc<dyn Backend>,
                pool: Arc::clone(&pool) as Arc<dyn TopicPool>,
                presenter: Arc::clone(&presenter) as Arc<dyn Presenter>,
                prompt: Arc::clone(&prompt) as Arc<dyn LoginPrompt>,
                cookies,
            },
        );
        Self {
            miner,
            backend,
            pool,
            presenter,
            prompt,
            dir,
        }
    }

    /// Read the cookie file back from disk.
    pub fn saved_cookies(&self) -> CookieFile {
        CookieFile::open(self.dir.path().join("cookies.json")).unwrap()
    }
}
