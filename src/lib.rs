//! # mnemo
//!
//! A local-first knowledge store. Every document lives in a local SQLite
//! store first; a remote provider mirrors it, an embedding provider indexes
//! it for semantic retrieval, and mentions between documents are mined into
//! backlinks on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   CLI    │──▶│  Workspace   │──▶│ SqliteStore  │
//! │ (mnemo)  │   │ save/search  │   │ (or memory)  │
//! └──────────┘   └──────┬───────┘   └──────────────┘
//!                       │
//!          ┌────────────┼─────────────┐
//!          ▼            ▼             ▼
//!    ┌──────────┐ ┌───────────┐ ┌────────────┐
//!    │Embedding │ │SyncEngine │ │ Backlinks  │
//!    │ provider │ │ + remote  │ │ + search   │
//!    └──────────┘ └───────────┘ └────────────┘
//! ```
//!
//! The algorithms live in [`mnemo_core`]; this crate supplies the concrete
//! store, providers, configuration, and commands.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Versioned, additive schema migrations |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`embedding`] | Hash, OpenAI, and Ollama embedding providers |
//! | [`remote_fs`] | Directory-backed remote provider |
//! | [`workspace`] | Application facade |
//! | [`search`], [`get`], [`edit`], … | CLI commands |

pub mod config;
pub mod db;
pub mod edit;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod logging;
pub mod migrate;
pub mod mirror;
pub mod remote_fs;
pub mod schema_cmd;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod sync_cmd;
pub mod workspace;
