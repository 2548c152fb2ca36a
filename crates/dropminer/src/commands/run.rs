//! The mining run: wire the backend, topic pool and console into a
//! `Miner` and drive it until it exits.

use std::sync::Arc;

use tracing::{debug, info};

use dropminer_api::{CookieFile, Endpoints, PubSubPool, TwitchClient};
use dropminer_config::Config;
use dropminer_core::{Miner, MinerDeps};

use crate::cli::RunArgs;
use crate::console::{ConsolePresenter, ConsolePrompt};
use crate::error::CliError;

pub async fn handle(args: RunArgs, cfg: &Config) -> Result<(), CliError> {
    let endpoints = Endpoints::twitch()?;
    let pool = Arc::new(PubSubPool::new(endpoints.pubsub.clone(), cfg.pool_config()));
    let backend = Arc::new(TwitchClient::new(
        endpoints,
        &cfg.transport_config(),
        cfg.retry_policy(),
    )?);
    let cookies = CookieFile::open(cfg.cookies_path())?;
    debug!(path = %cookies.path().display(), "cookie file opened");

    let miner = Miner::new(
        cfg.miner_config(),
        MinerDeps {
            backend,
            pool,
            presenter: Arc::new(ConsolePresenter::new(args.watch)),
            prompt: Arc::new(ConsolePrompt::new(
                cfg.username.clone(),
                cfg.resolve_password(),
            )),
            cookies,
        },
    );

    let signal_miner = miner.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal_miner.request_exit();
        }
    });

    let result = miner.run().await;
    signal.abort();
    miner.shutdown().await;
    result.map_err(CliError::from)
}
