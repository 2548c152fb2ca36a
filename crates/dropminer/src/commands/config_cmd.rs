//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::{load_settings, settings_path};
use crate::error::CliError;

const REDACTED: &str = "********";

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", settings_path(global).display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = load_settings(global)?;
            if cfg.password.is_some() {
                cfg.password = Some(REDACTED.into());
            }
            let toml_str = toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize config: {e}"),
            })?;
            print!("{toml_str}");
            println!("# cookies file: {}", cfg.cookies_path().display());
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = load_settings(global)?;
            let username = cfg.username.ok_or_else(|| CliError::NoUsername {
                path: settings_path(global).display().to_string(),
            })?;

            let secret = rpassword::prompt_password(format!("Password for {username}: "))?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            let entry = keyring::Entry::new(
                dropminer_config::KEYRING_SERVICE,
                &dropminer_config::keyring_key(&username),
            )
            .map_err(|e| CliError::Validation {
                field: "keyring".into(),
                reason: format!("failed to access keyring: {e}"),
            })?;
            entry.set_password(&secret).map_err(|e| CliError::Validation {
                field: "keyring".into(),
                reason: format!("failed to store password in keyring: {e}"),
            })?;
            eprintln!("Password for {username} stored in the system keyring");
            Ok(())
        }
    }
}
