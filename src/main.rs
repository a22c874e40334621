//! # IntelliSphere CLI (`isx`)
//!
//! Builds per-domain document indexes and answers questions over them,
//! either one at a time from the terminal or through the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! isx --config ./config/isx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `isx init` | Create the SQLite database and run schema migrations |
//! | `isx domains` | List configured domains and index status |
//! | `isx index <domain\|all>` | Rebuild domain indexes from their source directories |
//! | `isx search <domain> "<query>"` | Show the chunks a query retrieves |
//! | `isx ask --user <email> --domain <d> "<query>"` | Answer one question in a session |
//! | `isx session new\|list\|history\|delete` | Manage conversation sessions |
//! | `isx user add` | Register a user |
//! | `isx serve` | Start the HTTP server |
//!
//! Logging is controlled with `RUST_LOG` (default `intellisphere=info`) and
//! written to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use intellisphere::{commands, config, migrate, server};

/// IntelliSphere: domain-scoped retrieval-augmented conversations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/isx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "isx",
    about = "IntelliSphere: domain-scoped retrieval-augmented conversation engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/isx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List configured domains, their index locations and whether each index is built.
    Domains,

    /// Rebuild the index of one domain, or of every domain with `all`.
    ///
    /// Scans the domain's `sources` directories, loads PDF/CSV/text files,
    /// chunks and embeds them, and atomically replaces the domain index.
    Index {
        /// Domain name or `all`.
        domain: String,
    },

    /// Show the chunks a query retrieves from a domain index.
    Search {
        domain: String,
        query: String,
        /// Number of chunks (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question and record the exchange in a session.
    Ask {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "home")]
        domain: String,
        /// Existing session id. A new session is started when omitted.
        #[arg(long)]
        session: Option<String>,
        query: String,
    },

    /// Manage conversation sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Start an empty session and print its id.
    New {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "home")]
        domain: String,
    },
    /// List sessions, oldest first.
    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "home")]
        domain: String,
    },
    /// Print every exchange of a session.
    History {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "home")]
        domain: String,
        #[arg(long)]
        session: String,
    },
    /// Delete one session, or every session in the domain when `--session` is omitted.
    Delete {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "home")]
        domain: String,
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a user. The password must already be hashed.
    Add {
        #[arg(long)]
        firstname: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password_hash: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("intellisphere=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Domains => {
            commands::run_domains(&cfg)?;
        }
        Commands::Index { domain } => {
            commands::run_index(&cfg, &domain).await?;
        }
        Commands::Search {
            domain,
            query,
            limit,
        } => {
            commands::run_search(&cfg, &domain, &query, limit).await?;
        }
        Commands::Ask {
            user,
            domain,
            session,
            query,
        } => {
            commands::run_ask(&cfg, &user, &domain, session, &query).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::New { user, domain } => {
                commands::run_session_new(&cfg, &user, &domain).await?;
            }
            SessionAction::List { user, domain } => {
                commands::run_session_list(&cfg, &user, &domain).await?;
            }
            SessionAction::History {
                user,
                domain,
                session,
            } => {
                commands::run_session_history(&cfg, &user, &domain, &session).await?;
            }
            SessionAction::Delete {
                user,
                domain,
                session,
            } => {
                commands::run_session_delete(&cfg, &user, &domain, session.as_deref()).await?;
            }
        },
        Commands::User { action } => match action {
            UserAction::Add {
                firstname,
                email,
                password_hash,
            } => {
                commands::run_user_add(&cfg, &firstname, &email, &password_hash).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
