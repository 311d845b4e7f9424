//! # QuillPilot Core Library
//!
//! Document model and storage for the QuillPilot writing assistant.
//!
//! A [`Document`] is a markdown body plus a small metadata record. Documents
//! are kept in two places at once:
//!
//! - **Durable**: one human-readable file per document in a directory the
//!   user owns ([`store::FsStore`], format in [`codec`]).
//! - **Ephemeral**: a JSON mirror of the whole collection in a key-value
//!   store ([`store::MemoryKv`]), used when the directory is unavailable.
//!
//! [`PersistenceEngine`] owns the lifecycle across both: load with fallback
//! and reconciliation, save that succeeds if either store accepts, delete.
//!
//! ## Guarantees
//!
//! - A saved document can be decoded back field for field.
//! - Saving the same document twice leaves one record per store.
//! - `updatedAt` never moves backwards.
//! - One corrupt record never prevents the others from loading.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod config;
pub mod derive;
pub mod error;
pub mod persistence;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::QuillConfig;
pub use error::{QuillError, StoreKind};
pub use persistence::{DeleteOutcome, LoadReport, PersistenceEngine, SaveOutcome, StoreStatus};
pub use types::*;
