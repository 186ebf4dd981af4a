//! `chronicle` command-line entry point.

mod config;

use anyhow::Context;
use chronicle_autosave::{AutoSaveScheduler, EditorContext, FsEditorContext, WatchPatterns};
use chronicle_core::Metadata;
use chronicle_session::{NewMessage, NewSession, SearchQuery, Session, SessionStore};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chronicle", about = "Chronicle: a persistent log of work sessions")]
struct Cli {
    /// Path to config file (defaults to ./chronicle.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new session holding a single message
    ///
    /// The session and its message are two writes. If the second fails, the
    /// command exits with an error and the empty session stays in the store.
    Capture {
        /// Session title
        #[arg(long)]
        title: String,
        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Message text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read the message text from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Find sessions, most recently updated first
    Search {
        /// Case-insensitive substring of a title or message
        #[arg(long)]
        keyword: Option<String>,
        /// Match sessions carrying any of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print one session
    Show {
        /// Session id
        id: Uuid,
    },
    /// Print collection statistics
    Stats,
    /// Run the autosave loop until interrupted
    Watch {
        /// Capture this file instead of the newest file in the watch directories
        #[arg(long)]
        file: Option<PathBuf>,
        /// Tick period in seconds (overrides auto_save.interval)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    let store = Arc::new(SessionStore::json_file(&config.storage_path));
    store.initialize().await.with_context(|| {
        format!(
            "Failed to open session store '{}'",
            config.storage_path.display()
        )
    })?;

    match cli.command {
        Commands::Capture {
            title,
            tags,
            content,
            file,
        } => {
            let mut message_metadata = Metadata::new();
            message_metadata.insert("source".into(), "manual".into());
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => {
                    let content = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read '{}'", path.display()))?;
                    message_metadata
                        .insert("filePath".into(), path.display().to_string().into());
                    content
                }
                (None, None) => anyhow::bail!("Either --content or --file is required"),
            };

            let saved = capture(&store, title, tags, content, message_metadata).await?;
            print_json(&saved)?;
        }
        Commands::Search {
            keyword,
            tags,
            limit,
        } => {
            let results = store
                .search_sessions(SearchQuery {
                    keyword,
                    tags: (!tags.is_empty()).then_some(tags),
                    limit,
                })
                .await?;
            print_json(&results)?;
        }
        Commands::Show { id } => match store.get_session(id).await? {
            Some(session) => print_json(&session)?,
            None => anyhow::bail!("Session not found: {id}"),
        },
        Commands::Stats => {
            print_json(&store.get_stats().await?)?;
        }
        Commands::Watch {
            file,
            interval_secs,
        } => {
            let editor: Arc<dyn EditorContext> = match file {
                Some(path) => Arc::new(FsEditorContext::pinned(path)),
                None if config.auto_save.watch_directories.is_empty() => anyhow::bail!(
                    "Nothing to watch: pass --file or set auto_save.watch_directories"
                ),
                None => Arc::new(FsEditorContext::most_recent_in(
                    config.auto_save.watch_directories.clone(),
                    WatchPatterns::new(config.auto_save.file_patterns.as_slice())?,
                )),
            };

            let mut scheduler = AutoSaveScheduler::new(config.auto_save, store.clone(), editor)?;
            if let Some(secs) = interval_secs.filter(|s| *s > 0) {
                scheduler = scheduler.with_interval(Duration::from_secs(secs));
            }

            scheduler.start().await;
            if !scheduler.status().await.running {
                anyhow::bail!("Autosave is disabled in the configuration");
            }
            info!(
                storage = %config.storage_path.display(),
                interval_secs = scheduler.interval().as_secs(),
                "Watching; press Ctrl-C to stop"
            );

            tokio::signal::ctrl_c().await?;
            scheduler.stop().await;
            print_json(&scheduler.status().await)?;
        }
    }

    Ok(())
}

/// Create a session and append `content` as its first user message.
async fn capture(
    store: &SessionStore,
    title: String,
    tags: Vec<String>,
    content: String,
    message_metadata: Metadata,
) -> anyhow::Result<Session> {
    let session = store
        .create_session(NewSession {
            title,
            tags,
            metadata: Metadata::new(),
        })
        .await?;
    store
        .add_message(
            session.id,
            NewMessage {
                metadata: message_metadata,
                ..NewMessage::user(content)
            },
        )
        .await
        .with_context(|| {
            format!(
                "Session {} was created but its message could not be saved",
                session.id
            )
        })?;

    store
        .get_session(session.id)
        .await?
        .with_context(|| format!("Session {} vanished after capture", session.id))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
