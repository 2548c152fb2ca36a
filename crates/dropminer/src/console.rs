//! Terminal front end: status lines on stdout and an interactive login form.

use std::io::IsTerminal;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dialoguer::Input;
use owo_colors::OwoColorize;
use secrecy::SecretString;
use tracing::debug;

use dropminer_core::{
    Channel, CoreError, DropProgress, Game, Inventory, LoginField, LoginInput, LoginPrompt,
    Presenter, State,
};

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn line(message: &str) {
    if std::io::stdout().is_terminal() {
        println!("{} {message}", timestamp().dimmed());
    } else {
        println!("{} {message}", timestamp());
    }
}

/// Human-readable remaining time, e.g. `1h 5m`.
pub fn format_remaining(minutes: u32) -> String {
    humantime::format_duration(Duration::from_secs(u64::from(minutes) * 60)).to_string()
}

pub fn format_progress(progress: &DropProgress) -> String {
    format!(
        "{}: {} ({}) {}/{} min, {} left",
        progress.game_name,
        progress.drop_name,
        progress.rewards,
        progress.current_minutes,
        progress.required_minutes,
        format_remaining(progress.remaining_minutes()),
    )
}

// ── ConsolePresenter ────────────────────────────────────────────────

/// Prints miner activity as timestamped lines.
pub struct ConsolePresenter {
    selection: Mutex<Option<String>>,
}

impl ConsolePresenter {
    /// `selection` is handed to the miner at its first channel switch.
    pub fn new(selection: Option<String>) -> Self {
        Self {
            selection: Mutex::new(selection),
        }
    }
}

impl Presenter for ConsolePresenter {
    fn print(&self, message: &str) {
        line(message);
    }

    fn status(&self, state: State) {
        debug!(%state, "status");
        if matches!(state, State::Idle | State::Exit) {
            return;
        }
        line(state.describe());
    }

    fn set_games(&self, games: &[Game]) {
        if games.is_empty() {
            line("No games to mine.");
            return;
        }
        let names: Vec<&str> = games.iter().map(|g| g.name.as_str()).collect();
        line(&format!("Games: {}", names.join(", ")));
    }

    fn channel_added(&self, channel: &Channel) {
        debug!(channel = %channel.login, online = channel.online, "channel added");
    }

    fn channel_updated(&self, channel: &Channel) {
        debug!(
            channel = %channel.login,
            online = channel.online,
            viewers = ?channel.viewers,
            "channel updated"
        );
    }

    fn channel_removed(&self, channel: &Channel) {
        debug!(channel = %channel.login, "channel removed");
    }

    fn channels_cleared(&self) {
        debug!("channels cleared");
    }

    fn set_watching(&self, channel: &Channel) {
        let game = channel.game.as_ref().map_or("no game", |g| g.name.as_str());
        line(&format!("Watching: {} ({game})", channel.display_name));
    }

    fn clear_watching(&self) {
        debug!("watching cleared");
    }

    fn inventory_replaced(&self, inventory: &Inventory) {
        line(&format!(
            "Inventory: {} active campaigns",
            inventory.campaigns().len()
        ));
    }

    fn drop_progress(&self, progress: &DropProgress, countdown: bool) {
        debug!(drop_id = %progress.drop_id, countdown, "drop progress");
        line(&format_progress(progress));
    }

    fn stop_timer(&self) {
        debug!("progress timer stopped");
    }

    fn take_selection(&self) -> Option<String> {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn notify_claim(&self, text: &str) {
        if std::io::stdout().is_terminal() {
            line(&text.green().to_string());
        } else {
            line(text);
        }
    }
}

// ── ConsolePrompt ───────────────────────────────────────────────────

#[derive(Default)]
struct LoginForm {
    username: Option<String>,
    password: Option<SecretString>,
    /// A previous submission of this form did not end in a token.
    submitted: bool,
}

/// Asks for credentials on the terminal, starting from the configured ones.
pub struct ConsolePrompt {
    form: Mutex<LoginForm>,
}

impl ConsolePrompt {
    pub fn new(username: Option<String>, password: Option<SecretString>) -> Self {
        Self {
            form: Mutex::new(LoginForm {
                username,
                password,
                submitted: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoginForm> {
        self.form.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prompt_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::Login {
        message: format!("login prompt failed: {e}"),
    }
}

fn io_prompt_error(e: &std::io::Error) -> CoreError {
    if e.kind() == std::io::ErrorKind::Interrupted {
        CoreError::ExitRequested
    } else {
        prompt_error(e)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn dialoguer_error(e: dialoguer::Error) -> CoreError {
    match e {
        dialoguer::Error::IO(ref io) => io_prompt_error(io),
    }
}

/// Blocking part of the form: fill in whatever is missing.
fn fill_form(
    username: Option<String>,
    password: Option<SecretString>,
    ask_token: bool,
) -> Result<LoginInput, CoreError> {
    let needs_input = username.is_none() || password.is_none() || ask_token;
    if needs_input && !std::io::stdin().is_terminal() {
        return Err(prompt_error("stdin is not a terminal"));
    }

    let username = match username {
        Some(username) => username,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .map_err(dialoguer_error)?,
    };
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")
            .map(SecretString::from)
            .map_err(|e| io_prompt_error(&e))?,
    };
    let token = if ask_token {
        let code: String = Input::new()
            .with_prompt("2FA or email code (blank for none)")
            .allow_empty(true)
            .interact_text()
            .map_err(dialoguer_error)?;
        Some(code.trim().to_owned()).filter(|c| !c.is_empty())
    } else {
        None
    };

    Ok(LoginInput {
        username,
        password,
        token,
    })
}

#[async_trait]
impl LoginPrompt for ConsolePrompt {
    async fn ask_login(&self) -> Result<LoginInput, CoreError> {
        let (username, password, ask_token) = {
            let mut form = self.lock();
            let ask_token = form.submitted;
            form.submitted = true;
            (form.username.clone(), form.password.clone(), ask_token)
        };

        let input = tokio::task::spawn_blocking(move || fill_form(username, password, ask_token))
            .await
            .map_err(|e| CoreError::Internal(format!("login prompt task failed: {e}")))??;

        let mut form = self.lock();
        form.username = Some(input.username.clone());
        form.password = Some(input.password.clone());
        Ok(input)
    }

    fn clear(&self, field: LoginField) {
        let mut form = self.lock();
        match field {
            LoginField::Password => form.password = None,
            // The code is asked for on every resubmission.
            LoginField::Token => {}
            LoginField::All => *form = LoginForm::default(),
        }
    }

    fn update(&self, status: &str, user_id: Option<u64>) {
        match user_id {
            Some(id) => line(&format!("Login: {status} (user {id})")),
            None => line(&format!("Login: {status}")),
        }
    }
}
