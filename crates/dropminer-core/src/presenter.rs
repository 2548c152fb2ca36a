// ── Presentation seams ──
//
// The miner reports what it is doing through `Presenter` and asks for
// credentials through `LoginPrompt`. Neither is allowed to block the
// caller for long: presenters are called while miner state is locked.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::CoreError;
use crate::model::{Channel, DropProgress, Game, Inventory};
use crate::state::State;

/// Receives display updates from the miner.
pub trait Presenter: Send + Sync {
    /// A user-facing log line.
    fn print(&self, message: &str);
    fn status(&self, state: State);

    fn set_games(&self, games: &[Game]);

    fn channel_added(&self, channel: &Channel);
    fn channel_updated(&self, channel: &Channel);
    fn channel_removed(&self, channel: &Channel);
    fn channels_cleared(&self);

    fn set_watching(&self, channel: &Channel);
    fn clear_watching(&self);

    fn inventory_replaced(&self, inventory: &Inventory);
    /// Show progress of the drop being mined. `countdown` starts the
    /// per-minute timer.
    fn drop_progress(&self, progress: &DropProgress, countdown: bool);
    fn stop_timer(&self);

    /// Login of the channel the user picked, if any. Consumed on read.
    fn take_selection(&self) -> Option<String>;

    fn notify_claim(&self, text: &str);
}

/// Credentials entered by the user.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: SecretString,
    /// Second-factor code, if the user supplied one.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Password,
    Token,
    All,
}

/// Interactive credential form.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Ask for credentials. Returns `CoreError::ExitRequested` if the user
    /// abandons the form.
    async fn ask_login(&self) -> Result<LoginInput, CoreError>;
    fn clear(&self, field: LoginField);
    fn update(&self, status: &str, user_id: Option<u64>);
}
