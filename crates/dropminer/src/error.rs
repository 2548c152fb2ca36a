//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use dropminer_config::ConfigError;
use dropminer_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONFIG: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Login requires solving a CAPTCHA")]
    #[diagnostic(
        code(dropminer::captcha),
        help("Log in once through a browser from this machine, then run dropminer again.")
    )]
    Captcha,

    #[error("Login failed: {message}")]
    #[diagnostic(
        code(dropminer::auth_failed),
        help(
            "Check your username and password.\n\
             Store the password with: dropminer config set-password"
        )
    )]
    AuthFailed { message: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Request failed after {attempts} attempts")]
    #[diagnostic(
        code(dropminer::connection_failed),
        help("Check your network connection.\nLast error: {message}")
    )]
    ConnectionFailed { attempts: u32, message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(dropminer::api_error))]
    Api { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid settings in {path}")]
    #[diagnostic(
        code(dropminer::config),
        help("Fix the file or remove it to start from defaults.\nSee: dropminer config show")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("No username configured")]
    #[diagnostic(
        code(dropminer::no_username),
        help("Add `username = \"...\"` to {path}")
    )]
    NoUsername { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(dropminer::validation))]
    Validation { field: String, reason: String },

    // ── Internal / IO ────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(dropminer::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Captcha | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Config { .. } | Self::NoUsername { .. } => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Api { .. } | Self::Internal(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CaptchaRequired => CliError::Captcha,
            CoreError::Login { message } | CoreError::LoginVerification { message } => {
                CliError::AuthFailed { message }
            }
            CoreError::RequestFailed { attempts, message } => {
                CliError::ConnectionFailed { attempts, message }
            }
            CoreError::Api { message, status } => CliError::Api {
                message: match status {
                    Some(status) => format!("{message} (HTTP {status})"),
                    None => message,
                },
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::ExitRequested => CliError::Internal("exit requested".into()),
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<dropminer_api::Error> for CliError {
    fn from(err: dropminer_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
