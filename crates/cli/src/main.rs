//! archrepo - keeps an Arch Linux binary repository in sync with its directory

use std::path::PathBuf;

use anyhow::{Context, Result};
use archrepo::config::Config;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{
  QueryArgs, cmd_adopt, cmd_config_init, cmd_config_show, cmd_date_sync, cmd_flag, cmd_query, cmd_serve, cmd_sync,
  cmd_user_add, cmd_user_alias, cmd_user_show, cmd_watch,
};
use logging::{init_cli_logging, init_daemon_logging};

#[derive(Parser)]
#[command(name = "archrepo")]
#[command(about = "Keep an Arch Linux binary package repository in sync with its directory")]
#[command(after_help = "\
QUICK START:
  archrepo config init            # Write a default config
  archrepo serve                  # Start the processor (watches the repository)
  archrepo sync                   # Reconcile catalog and disk

COMMON WORKFLOWS:
  archrepo query --search gcc     # Browse the catalog
  archrepo flag foo x86_64        # Mark a package out of date")]
struct Cli {
  /// Config file (default: $ARCHREPO_CONFIG, then the user config)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Verbosity: 0 = errors only, 1 = info, 2 = debug
  #[arg(short, long, global = true, value_parser = clap::value_parser!(u8).range(0..=2))]
  verbose: Option<u8>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `archrepo user`
#[derive(Subcommand)]
pub enum UserCommand {
  /// Create or update a maintainer identity
  Add {
    /// User id
    id: i64,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    realname: Option<String>,
  },
  /// Add an alternate name packager strings may use
  Alias {
    /// User id
    id: i64,
    alias: String,
  },
  /// Show an identity and its aliases
  Show {
    /// User id
    id: i64,
  },
}

/// Subcommands for `archrepo config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show current effective configuration
  Show,
  /// Write a default config file
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Run the repository processor
  Serve {
    /// Run in foreground, logging to the console
    #[arg(long)]
    foreground: bool,
    /// Internal: run detached, logging to a file
    #[arg(long, hide = true)]
    background: bool,
    /// Do not watch the repository; events come from `archrepo watch`
    #[arg(long)]
    no_watch: bool,
  },
  /// Relay filesystem events to a running processor
  Watch,
  /// Reconcile the catalog with the files on disk
  Sync,
  /// Set last-update times from file modification times
  DateSync,
  /// Give every ownerless package matching a user to that user
  Adopt {
    /// User id
    user_id: i64,
  },
  /// Manage maintainer identities
  User {
    #[command(subcommand)]
    command: UserCommand,
  },
  /// Flag the latest version of a package out of date
  Flag {
    name: String,
    arch: String,
    /// Clear the flag instead
    #[arg(long)]
    clear: bool,
  },
  /// Browse the catalog
  #[command(after_help = "\
EXAMPLES:
  archrepo query --search \"text editor\"
  archrepo query --arch x86_64 --arch any --sort name,asc
  archrepo query --flagged --since 2024-01-01 --limit 50 --page 2")]
  Query(QueryArgs),
  /// Manage configuration
  #[command(after_help = "\
CONFIG LOCATIONS:
  Explicit: --config <file> or $ARCHREPO_CONFIG
  User:     ~/.config/archrepo/config.toml")]
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

  // Use file logging for a detached processor, console-only for everything else
  let _guard = match &cli.command {
    Commands::Serve { background: true, .. } => init_daemon_logging(&config, cli.verbose, false),
    Commands::Serve { .. } => init_daemon_logging(&config, cli.verbose, true),
    _ => {
      init_cli_logging(&config, cli.verbose);
      None
    }
  };

  match cli.command {
    Commands::Serve {
      foreground,
      background,
      no_watch,
    } => cmd_serve(config, cli.config.as_deref(), foreground || background, !no_watch).await,
    Commands::Watch => cmd_watch(&config).await,
    Commands::Sync => cmd_sync(&config).await,
    Commands::DateSync => cmd_date_sync(&config).await,
    Commands::Adopt { user_id } => cmd_adopt(&config, user_id).await,

    Commands::User { command } => match command {
      UserCommand::Add {
        id,
        username,
        email,
        title,
        realname,
      } => cmd_user_add(&config, id, username, email, title, realname).await,
      UserCommand::Alias { id, alias } => cmd_user_alias(&config, id, &alias).await,
      UserCommand::Show { id } => cmd_user_show(&config, id).await,
    },

    Commands::Flag { name, arch, clear } => cmd_flag(&config, &name, &arch, clear).await,
    Commands::Query(args) => cmd_query(&config, args).await,

    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()),
      ConfigCommand::Init { force } => cmd_config_init(cli.config.as_deref(), force),
    },
  }
}
