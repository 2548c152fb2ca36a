//! Clap derive structures for the `dropminer` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// dropminer -- mine timed streaming drops campaigns unattended
#[derive(Debug, Parser)]
#[command(
    name = "dropminer",
    version,
    about = "Mine timed streaming drops campaigns unattended",
    long_about = "Watches the best live channel for every game with an active drops\n\
        campaign, claims drops as they complete and switches channels as\n\
        streams go up and down. Runs the miner when no subcommand is given.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, short = 'c', env = "DROPMINER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and mine until interrupted (default)
    Run(RunArgs),

    /// Inspect and manage the settings file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Prefer this channel (login name) at the first channel switch
    #[arg(long, value_name = "CHANNEL")]
    pub watch: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the settings file location
    Path,

    /// Display the resolved settings
    Show,

    /// Store the account password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
