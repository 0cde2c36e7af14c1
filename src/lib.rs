//! Organization cache and background semantic-sync core for a note-taking app.
//!
//! Pages (files and folders in a user's note tree) live in a relational store.
//! This crate keeps an optimistic in-memory view of them, tells interested
//! consumers about structural changes, pushes page text into a hosted semantic
//! index in rate-limited batches, and keeps derived summaries current from the
//! text prepended to a note.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema and migrations
//! - [`page`]: Page records, the document tree, and the [`page::store::PageStore`] contract
//! - [`events`]: Synchronous publish/subscribe with handle-based unsubscription
//! - [`cache`]: The [`cache::OrganizationCache`]: optimistic writes and reconciliation
//! - [`sync`]: Sync status tracking and the batched [`sync::SemanticSync`] engine
//! - [`summary`]: Prefix diffing and incremental summary regeneration
//! - [`error`]: [`error::CoreError`] and the crate `Result` alias

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod page;
pub mod summary;
pub mod sync;
