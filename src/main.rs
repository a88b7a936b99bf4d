//! # mnemo CLI
//!
//! ## Usage
//!
//! ```bash
//! mnemo --config ./config/mnemo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mnemo init` | Create the database, run migrations, seed default types |
//! | `mnemo new "<title>"` | Create a document |
//! | `mnemo edit <id>` | Change a document |
//! | `mnemo get <id>` | Show a document with its links and backlinks |
//! | `mnemo list` | List recent documents |
//! | `mnemo delete <id>` | Delete a document (and its remote copy) |
//! | `mnemo search "<query>"` | Hybrid keyword + semantic search |
//! | `mnemo backlinks <id>` | Show every mention of a document |
//! | `mnemo sync pull` | Pull remote changes |
//! | `mnemo embed pending` | Backfill missing or stale embeddings |
//! | `mnemo embed rebuild` | Delete and regenerate all embeddings |
//! | `mnemo types list\|set` | Manage type schemas |
//! | `mnemo tags list\|set` | Manage tag colors |
//! | `mnemo mirror import\|clear` | Manage the mirrored message cache |
//! | `mnemo stats` | Store overview |

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use mnemo::config;
use mnemo::edit::{self, DocumentEdits};
use mnemo::workspace::Workspace;
use mnemo::{
    embed_cmd, get, logging, migrate, mirror, schema_cmd, search, stats, sync_cmd,
};

/// mnemo: a local-first knowledge store with hybrid search, backlinks,
/// and remote sync.
#[derive(Parser)]
#[command(name = "mnemo", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mnemo.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: an existing database only gains missing tables.
    Init,

    /// Create a document.
    New {
        title: String,

        /// Document type (a type schema name).
        #[arg(long = "type", default_value = "note")]
        doc_type: String,

        #[command(flatten)]
        edits: EditArgs,
    },

    /// Change an existing document.
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        edits: EditArgs,
    },

    /// Show a document with its forward links and backlinks.
    Get {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// List documents, most recently modified first.
    List {
        #[arg(long = "type")]
        doc_type: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// Delete a document.
    Delete { id: String },

    /// Search documents by keyword and meaning.
    Search {
        query: String,
        /// Show the score breakdown per result.
        #[arg(long)]
        explain: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show every document mentioning the given one.
    Backlinks {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Remote synchronization.
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Manage embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Manage type schemas.
    Types {
        #[command(subcommand)]
        action: TypesAction,
    },

    /// Manage tag colors.
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },

    /// Manage the mirrored message cache.
    Mirror {
        #[command(subcommand)]
        action: MirrorAction,
    },

    /// Show store statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct EditArgs {
    /// Body in markup: paragraphs, `@[[id|label]]` mentions, `#tags`.
    #[arg(long)]
    body: Option<String>,

    /// Read the body markup from a file.
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Add a tag (repeatable).
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Remove a tag (repeatable).
    #[arg(long = "untag")]
    untags: Vec<String>,

    /// Metadata property as KEY=VALUE (repeatable).
    #[arg(long = "prop")]
    props: Vec<String>,

    #[arg(long, conflicts_with = "unpin")]
    pin: bool,

    #[arg(long)]
    unpin: bool,
}

impl EditArgs {
    fn into_edits(self, title: Option<String>) -> DocumentEdits {
        DocumentEdits {
            title,
            body: self.body,
            body_file: self.body_file,
            add_tags: self.tags,
            remove_tags: self.untags,
            props: self.props,
            pinned: match (self.pin, self.unpin) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
        }
    }
}

#[derive(Subcommand)]
enum SyncAction {
    /// Apply remote changes since the last pull.
    Pull {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed documents with missing or stale vectors.
    Pending,
    /// Delete all embeddings and regenerate them.
    Rebuild,
}

#[derive(Subcommand)]
enum TypesAction {
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create or replace a type schema.
    Set {
        name: String,
        #[arg(long, default_value = "#64748b")]
        color: String,
        /// Property definition KEY:KIND[:required] (repeatable).
        #[arg(long = "prop")]
        props: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    List {
        #[arg(long)]
        json: bool,
    },
    Set {
        name: String,
        color: String,
    },
}

#[derive(Subcommand)]
enum MirrorAction {
    /// Replace the cache with messages from a JSON file.
    Import { path: PathBuf },
    /// Empty the cache.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    // Init must fail loudly instead of degrading to demo mode.
    let applied = match cli.command {
        Commands::Init => Some(migrate::run_migrations(&cfg).await?),
        _ => None,
    };

    let ws = Workspace::open(&cfg).await?;
    let result = match applied {
        Some(applied) => {
            println!(
                "Database initialized successfully ({} migration{} applied).",
                applied,
                if applied == 1 { "" } else { "s" }
            );
            Ok(())
        }
        None => run(&ws, &cfg, cli.command).await,
    };
    ws.close().await;
    result
}

async fn run(ws: &Workspace, cfg: &config::Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::New {
            title,
            doc_type,
            edits,
        } => edit::run_new(ws, &title, &doc_type, &edits.into_edits(None)).await,
        Commands::Edit { id, title, edits } => {
            edit::run_edit(ws, &id, &edits.into_edits(title)).await
        }
        Commands::Get { id, json } => get::run_get(ws, &id, json).await,
        Commands::List {
            doc_type,
            limit,
            json,
        } => get::run_list(ws, doc_type.as_deref(), limit, json).await,
        Commands::Delete { id } => edit::run_delete(ws, &id).await,
        Commands::Search {
            query,
            explain,
            json,
        } => search::run_search(ws, &query, explain, json).await,
        Commands::Backlinks { id, json } => get::run_backlinks(ws, &id, json).await,
        Commands::Sync { action } => match action {
            SyncAction::Pull { json } => sync_cmd::run_sync_pull(ws, json).await,
        },
        Commands::Embed { action } => match action {
            EmbedAction::Pending => embed_cmd::run_embed_pending(ws).await,
            EmbedAction::Rebuild => embed_cmd::run_embed_rebuild(ws).await,
        },
        Commands::Types { action } => match action {
            TypesAction::List { json } => schema_cmd::run_types_list(ws, json).await,
            TypesAction::Set { name, color, props } => {
                schema_cmd::run_types_set(ws, &name, &color, &props).await
            }
        },
        Commands::Tags { action } => match action {
            TagsAction::List { json } => schema_cmd::run_tags_list(ws, json).await,
            TagsAction::Set { name, color } => schema_cmd::run_tags_set(ws, &name, &color).await,
        },
        Commands::Mirror { action } => match action {
            MirrorAction::Import { path } => mirror::run_mirror_import(ws, &path).await,
            MirrorAction::Clear => mirror::run_mirror_clear(ws).await,
        },
        Commands::Stats { json } => stats::run_stats(ws, cfg, json).await,
    }
}
