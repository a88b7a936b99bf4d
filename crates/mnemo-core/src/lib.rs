//! # mnemo core
//!
//! Storage-agnostic logic for mnemo, a local-first knowledge store: data
//! models, the rich-text body format, the store abstraction, embeddings,
//! hybrid search, backlink extraction, and the sync engine.
//!
//! This crate contains no sqlx, filesystem I/O, or HTTP clients. Concrete
//! stores, embedding providers, and remote providers live in the `mnemo`
//! application crate and plug in through the [`store::Store`],
//! [`embedding::EmbeddingProvider`], and [`sync::RemoteProvider`] traits.

pub mod backlinks;
pub mod content;
pub mod embedding;
pub mod models;
pub mod search;
pub mod store;
pub mod sync;
