//! reindex - administration for the search indexing queue

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::{
  Context, SessionAction, cmd_config_init, cmd_config_show, cmd_queue_empty, cmd_queue_enqueue, cmd_queue_status,
  cmd_session, cmd_session_list, load_config,
};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "reindex")]
#[command(about = "Inspect and administer the search indexing queue")]
#[command(after_help = "\
QUICK START:
  reindex config init             # Write .reindex/config.toml
  reindex session init Product    # Start a resumable bulk reindex
  reindex queue status            # Pending items and sessions

COMMON WORKFLOWS:
  reindex queue enqueue --entity Product --id 42
  reindex queue empty --entity Product
  reindex session suspend Product")]
struct Cli {
  /// Config file (default: .reindex/config.toml, then user config)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Write logs to a rolling file instead of stderr
  #[arg(long, global = true, value_name = "FILE")]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Queue items
  Queue {
    #[command(subcommand)]
    command: QueueCommand,
  },
  /// Enqueueing sessions
  Session {
    #[command(subcommand)]
    command: SessionCommand,
  },
  /// Configuration management
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

/// Subcommands for `reindex queue`
#[derive(Subcommand)]
enum QueueCommand {
  /// Show pending item counts per entity type
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Enqueue a single index or delete request
  Enqueue {
    /// Entity type
    #[arg(short, long)]
    entity: String,
    /// Primary key (composite keys as field=value,field=value)
    #[arg(short, long)]
    id: String,
    /// Enqueue a DELETE instead of an INDEX
    #[arg(long)]
    delete: bool,
  },
  /// Delete pending items
  Empty {
    /// Only this entity type
    #[arg(short, long)]
    entity: Option<String>,
  },
}

/// Subcommands for `reindex session`
#[derive(Subcommand)]
enum SessionCommand {
  /// Create (or restart) the session for an entity type
  Init { entity: String },
  /// Pause an active session
  Suspend { entity: String },
  /// Continue a suspended session
  Resume { entity: String },
  /// Delete the session for an entity type
  Remove { entity: String },
  /// Show one session
  Show {
    entity: String,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// List all sessions, oldest first
  List {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

/// Subcommands for `reindex config`
#[derive(Subcommand)]
enum ConfigCommand {
  /// Show effective configuration
  Show,
  /// Create project config file
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let config = load_config(cli.config.as_deref())?;
  let _guard = init_logging(&config.log, cli.log_file.as_deref());

  match cli.command {
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(cli.config.as_deref()).await,
      ConfigCommand::Init { force } => cmd_config_init(force).await,
    },
    Commands::Queue { command } => {
      let ctx = Context::open(config).await?;
      match command {
        QueueCommand::Status { json } => cmd_queue_status(&ctx, json).await,
        QueueCommand::Enqueue { entity, id, delete } => cmd_queue_enqueue(&ctx, &entity, &id, delete).await,
        QueueCommand::Empty { entity } => cmd_queue_empty(&ctx, entity.as_deref()).await,
      }
    }
    Commands::Session { command } => {
      let ctx = Context::open(config).await?;
      match command {
        SessionCommand::Init { entity } => cmd_session(&ctx, SessionAction::Init, &entity, false).await,
        SessionCommand::Suspend { entity } => cmd_session(&ctx, SessionAction::Suspend, &entity, false).await,
        SessionCommand::Resume { entity } => cmd_session(&ctx, SessionAction::Resume, &entity, false).await,
        SessionCommand::Remove { entity } => cmd_session(&ctx, SessionAction::Remove, &entity, false).await,
        SessionCommand::Show { entity, json } => cmd_session(&ctx, SessionAction::Show, &entity, json).await,
        SessionCommand::List { json } => cmd_session_list(&ctx, json).await,
      }
    }
  }
}
