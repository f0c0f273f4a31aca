//! # Todo Harness CLI (`td`)
//!
//! ## Usage
//!
//! ```bash
//! td --config ./config/td.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `td init` | Create the todo database and run schema migrations |
//! | `td sources` | List adapters and their connection status |
//! | `td auth <adapter>` | Connect an adapter |
//! | `td logout <adapter>` | Disconnect an adapter and forget its credential |
//! | `td sync [adapter]` | Fetch and classify, print the review list |
//! | `td import <id>… \| --all` | Turn reviewed candidates into todos |
//! | `td list` | List todos |
//! | `td add "<title>"` | Add a manual todo |
//! | `td edit <id>` | Change a todo's title, priority, due date, or notes |
//! | `td toggle <id>` | Flip completion |
//! | `td rm <id>` | Delete a todo |
//! | `td clear-completed` | Delete all completed todos |
//! | `td complete-all` | Mark every todo completed |
//! | `td calendar-export` | Add open todos with a due date to the calendar |
//! | `td profile show\|set` | Inspect or edit the mention profile |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use todo_harness::{config, ingest, migrate, sources, todo_cmd};

/// Todo Harness CLI: actionable items from Quip, Slack, Chorus, Mail, and
/// the calendar, reviewed and kept as todos.
#[derive(Parser)]
#[command(
    name = "td",
    about = "Todo Harness: turn actionable work from your services into todos",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/td.toml`. When the file does not exist, built-in
    /// defaults are used.
    #[arg(long, global = true, default_value = "./config/td.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the todo database.
    ///
    /// Idempotent, so running it multiple times is safe.
    Init,

    /// List adapters and their status.
    ///
    /// Stored credentials are re-validated first.
    Sources,

    /// Connect an adapter.
    ///
    /// Token adapters (quip, slack, chorus) validate the credential against
    /// the live service and store it. Mail and calendar probe the local
    /// application instead.
    Auth {
        /// Adapter name: quip, slack, chorus, mail, or calendar.
        adapter: String,

        /// Credential. Read from stdin when omitted (except for mail and calendar).
        #[arg(long)]
        token: Option<String>,
    },

    /// Disconnect an adapter and forget its credential.
    Logout {
        adapter: String,
    },

    /// Fetch from connected adapters and print actionable candidates.
    Sync {
        /// `all` or a single adapter name.
        #[arg(default_value = "all")]
        adapter: String,

        /// Print candidates as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sync, then turn the chosen candidates into todos.
    ///
    /// Importing a candidate that was imported before updates the existing
    /// todo instead of creating a second one.
    Import {
        /// Candidate ids as printed by `td sync`.
        ids: Vec<String>,

        /// Import every candidate.
        #[arg(long)]
        all: bool,

        /// Restrict the sync to one adapter.
        #[arg(long, default_value = "all")]
        adapter: String,
    },

    /// List todos, newest first.
    List {
        /// `all`, `active`, or `completed`.
        #[arg(long, default_value = "all")]
        filter: String,

        #[arg(long)]
        json: bool,
    },

    /// Add a manual todo.
    Add {
        title: String,

        /// `low`, `medium`, or `high`.
        #[arg(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD).
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Edit a todo in place.
    Edit {
        /// Todo id or a unique prefix of it.
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// `low`, `medium`, or `high`.
        #[arg(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD), or `none` to clear it.
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Flip a todo between active and completed.
    Toggle {
        /// Todo id or a unique prefix of it.
        id: String,
    },

    /// Delete a todo.
    Rm {
        /// Todo id or a unique prefix of it.
        id: String,
    },

    /// Delete all completed todos.
    ClearCompleted,

    /// Mark every todo completed.
    CompleteAll,

    /// Add an event for every open todo with a due date.
    ///
    /// Todos whose title already has an event on the due day are skipped.
    CalendarExport,

    /// Inspect or edit the profile used for mention detection.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    Show,
    /// Update profile fields and save the config file.
    Set {
        #[arg(long)]
        user_name: Option<String>,

        #[arg(long)]
        display_name: Option<String>,

        /// Email address; repeat for several. Replaces the current list.
        #[arg(long = "email")]
        emails: Vec<String>,

        /// Chat platform user id (e.g. Slack `U…`).
        #[arg(long)]
        platform_user_id: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
        config::Config::minimal()
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Auth { adapter, token } => {
            sources::run_auth(&cfg, &adapter, token).await?;
        }
        Commands::Logout { adapter } => {
            sources::run_logout(&cfg, &adapter).await?;
        }
        Commands::Sync { adapter, json } => {
            ingest::run_sync(&cfg, &adapter, json).await?;
        }
        Commands::Import { ids, all, adapter } => {
            ingest::run_import(&cfg, &adapter, &ids, all).await?;
        }
        Commands::List { filter, json } => {
            todo_cmd::run_list(&cfg, &filter, json).await?;
        }
        Commands::Add {
            title,
            priority,
            due,
            notes,
        } => {
            todo_cmd::run_add(&cfg, &title, priority, due, notes).await?;
        }
        Commands::Edit {
            id,
            title,
            priority,
            due,
            notes,
        } => {
            let edit = todo_cmd::TodoEdit {
                title,
                priority,
                due,
                notes,
            };
            todo_cmd::run_edit(&cfg, &id, edit).await?;
        }
        Commands::Toggle { id } => {
            todo_cmd::run_toggle(&cfg, &id).await?;
        }
        Commands::Rm { id } => {
            todo_cmd::run_remove(&cfg, &id).await?;
        }
        Commands::ClearCompleted => {
            todo_cmd::run_clear_completed(&cfg).await?;
        }
        Commands::CompleteAll => {
            todo_cmd::run_complete_all(&cfg).await?;
        }
        Commands::CalendarExport => {
            todo_cmd::run_calendar_export(&cfg).await?;
        }
        Commands::Profile { action } => match action {
            ProfileAction::Show => {
                sources::show_profile(&cfg.profile);
            }
            ProfileAction::Set {
                user_name,
                display_name,
                emails,
                platform_user_id,
            } => {
                let emails = if emails.is_empty() { None } else { Some(emails) };
                sources::set_profile(
                    &cli.config,
                    cfg,
                    user_name,
                    display_name,
                    emails,
                    platform_user_id,
                )?;
            }
        },
    }

    Ok(())
}
