// ── Miner ──
//
// The orchestrator aggregate. Owns games, channels, inventory and the
// session, runs the state machine on the caller's task and spawns the
// watch loop, the maintenance loop and push-event dispatch beside it.

mod handlers;
mod inventory;
mod machine;
mod maintenance;
mod session;
mod watch;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dropminer_api::{CookieFile, Topic};

use crate::backend::{Backend, TopicPool};
use crate::config::MinerConfig;
use crate::error::CoreError;
use crate::model::{Channel, Inventory};
use crate::presenter::{LoginPrompt, Presenter};
use crate::ranking::GameRanks;
use crate::state::State;
use crate::sync::{AwaitableValue, PendingSlot, StateSignal};

/// Nominal heartbeat period; one heartbeat is worth one minute of progress.
const WATCH_INTERVAL: Duration = Duration::from_secs(60);
/// How long a heartbeat waits for a pushed progress update.
const DROP_UPDATE_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_RETRY: Duration = Duration::from_secs(60);
const CLAIM_SETTLE: Duration = Duration::from_secs(4);
const CLAIM_POLL_ATTEMPTS: usize = 8;
const CLAIM_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAINTENANCE_TICK: Duration = Duration::from_secs(60);
const LIVE_STREAMS_LIMIT: u32 = 30;
/// Minimum wall time `shutdown` takes, so socket teardown can finish.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Collaborators the miner is built from.
pub struct MinerDeps {
    pub backend: Arc<dyn Backend>,
    pub pool: Arc<dyn TopicPool>,
    pub presenter: Arc<dyn Presenter>,
    pub prompt: Arc<dyn LoginPrompt>,
    pub cookies: CookieFile,
}

/// Working set mutated by the state machine and the event handlers.
#[derive(Debug, Default)]
pub(crate) struct MinerState {
    pub games: GameRanks,
    /// Tracked channels in display order.
    pub channels: IndexMap<u64, Channel>,
    pub inventory: Inventory,
    /// Set by a games update; the next cleanup drops every channel.
    pub full_cleanup: bool,
}

#[derive(Default)]
struct Session {
    access_token: Option<SecretString>,
    user_id: Option<u64>,
}

// ── Miner ────────────────────────────────────────────────────────────

/// Cheaply cloneable handle to the orchestrator.
///
/// [`run`](Self::run) logs in, starts the background loops and drives the
/// state machine until `EXIT`. [`shutdown`](Self::shutdown) stops
/// everything and persists the session.
#[derive(Clone)]
pub struct Miner {
    inner: Arc<MinerInner>,
}

struct MinerInner {
    config: MinerConfig,
    backend: Arc<dyn Backend>,
    pool: Arc<dyn TopicPool>,
    presenter: Arc<dyn Presenter>,
    prompt: Arc<dyn LoginPrompt>,
    cookies: Mutex<CookieFile>,
    state: Mutex<MinerState>,
    session: Mutex<Session>,
    signal: StateSignal,
    watching: AwaitableValue<Channel>,
    /// Cuts the watch loop's inter-heartbeat sleep short.
    restart: Notify,
    /// Bumped on every restart, so one requested mid-heartbeat is not lost.
    restart_epoch: AtomicU64,
    drop_update: PendingSlot<bool>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Miner {
    pub fn new(config: MinerConfig, deps: MinerDeps) -> Self {
        Self {
            inner: Arc::new(MinerInner {
                config,
                backend: deps.backend,
                pool: deps.pool,
                presenter: deps.presenter,
                prompt: deps.prompt,
                cookies: Mutex::new(deps.cookies),
                state: Mutex::new(MinerState::default()),
                session: Mutex::new(Session::default()),
                signal: StateSignal::new(State::Idle),
                watching: AwaitableValue::new(),
                restart: Notify::new(),
                restart_epoch: AtomicU64::new(0),
                drop_update: PendingSlot::new(),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.inner.config
    }

    /// The state the machine will act on next.
    pub fn state(&self) -> State {
        self.inner.signal.current()
    }

    /// Request a transition. Ignored once `EXIT` has been requested.
    pub fn change_state(&self, state: State) {
        self.inner.signal.change(state);
    }

    pub fn request_exit(&self) {
        self.change_state(State::Exit);
    }

    /// The channel currently being watched.
    pub fn watching(&self) -> Option<Channel> {
        self.inner.watching.get()
    }

    /// Log in, start the background loops and run the state machine until
    /// `EXIT`. Returns the fatal error that ended the run, if any.
    pub async fn run(&self) -> Result<(), CoreError> {
        let user_id = match self.check_login().await {
            Err(CoreError::ExitRequested) => return Ok(()),
            other => other?,
        };

        let inner = &self.inner;
        inner.pool.start().await;
        let events = inner.pool.subscribe();
        {
            let mut handles = inner.task_handles.lock().await;

            let miner = self.clone();
            let cancel = inner.cancel.clone();
            handles.push(tokio::spawn(async move {
                miner.dispatch_events(events, cancel).await;
            }));

            let miner = self.clone();
            let cancel = inner.cancel.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = miner.watch_loop() => {}
                }
            }));

            let miner = self.clone();
            let cancel = inner.cancel.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = miner.maintenance_loop() => {}
                }
            }));
        }

        inner
            .pool
            .add_topics(vec![Topic::drops(user_id), Topic::community_points(user_id)])
            .await?;

        self.change_state(State::InventoryFetch);
        match self.run_machine().await {
            Err(CoreError::ExitRequested) => Ok(()),
            other => other,
        }
    }

    /// Stop every loop, close the topic pool and save the session.
    ///
    /// Takes at least half a second in total.
    pub async fn shutdown(&self) {
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let inner = &self.inner;
        inner.presenter.print("Exiting...");
        self.change_state(State::Exit);
        self.stop_watching();
        inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "miner task ended abnormally");
            }
        }

        if let Err(e) = inner.cookies.lock().await.save() {
            warn!(error = %e, "failed to save cookies");
        }
        inner.pool.stop().await;
        tokio::time::sleep_until(deadline).await;
        info!("miner stopped");
    }

    // ── Watching ─────────────────────────────────────────────────────

    /// Start watching `channel`. A different channel than before restarts
    /// the watch loop so it is heartbeated immediately.
    pub(crate) fn watch(&self, channel: Channel) {
        let switched = self
            .inner
            .watching
            .get()
            .is_none_or(|current| current.id != channel.id);
        self.inner.presenter.set_watching(&channel);
        if switched {
            info!(channel = %channel.login, "watching channel");
            self.bump_restart_epoch();
        }
        self.inner.watching.set(channel);
        if switched {
            self.inner.restart.notify_waiters();
        }
    }

    pub(crate) fn stop_watching(&self) {
        if !self.inner.watching.is_set() {
            return;
        }
        debug!("watching stopped");
        self.inner.presenter.stop_timer();
        self.inner.presenter.clear_watching();
        self.inner.watching.clear();
    }

    /// Heartbeat the watched channel now instead of at the next boundary.
    pub(crate) fn restart_watching(&self) {
        self.inner.presenter.stop_timer();
        self.bump_restart_epoch();
        self.inner.restart.notify_waiters();
    }

    fn bump_restart_epoch(&self) {
        self.inner.restart_epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn restart_epoch(&self) -> u64 {
        self.inner.restart_epoch.load(Ordering::Acquire)
    }

    /// Publish a changed channel snapshot, refreshing the watched copy.
    pub(crate) fn channel_changed(&self, channel: &Channel) {
        self.inner.presenter.channel_updated(channel);
        self.inner.watching.update(|watched| {
            if watched.id == channel.id {
                *watched = channel.clone();
            }
        });
    }

    pub(crate) async fn user_id(&self) -> Result<u64, CoreError> {
        self.inner
            .session
            .lock()
            .await
            .user_id
            .ok_or_else(|| CoreError::Internal("not logged in".into()))
    }
}

#[cfg(test)]
impl Miner {
    pub(crate) async fn seed_session(&self, user_id: u64) {
        let mut session = self.inner.session.lock().await;
        session.access_token = Some(SecretString::from("seeded-token"));
        session.user_id = Some(user_id);
    }

    pub(crate) async fn seed(&self, games: GameRanks, channels: Vec<Channel>, inventory: Inventory) {
        let mut st = self.inner.state.lock().await;
        st.games = games;
        st.channels = channels.into_iter().map(|c| (c.id, c)).collect();
        st.inventory = inventory;
    }

    pub(crate) async fn channel(&self, id: u64) -> Option<Channel> {
        self.inner.state.lock().await.channels.get(&id).cloned()
    }

    pub(crate) async fn channel_ids(&self) -> Vec<u64> {
        self.inner.state.lock().await.channels.keys().copied().collect()
    }

    pub(crate) async fn drop_minutes(&self, drop_id: &str) -> Option<u32> {
        self.inner
            .state
            .lock()
            .await
            .inventory
            .drop(drop_id)
            .map(|d| d.current_minutes)
    }
}
