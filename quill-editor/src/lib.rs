//! # quill-editor — Editor integration for QuillPilot
//!
//! The editor talks to one object, [`Workspace`], which wires the
//! editor-agnostic crates together:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                 Editor                   │
//! │  ┌────────────────────────────────────┐  │
//! │  │   quill-editor                     │  │
//! │  │  ┌───────────┐   ┌──────────────┐  │  │
//! │  │  │ Workspace │   │  AutoSaver   │  │  │
//! │  │  └─────┬─────┘   └──────┬───────┘  │  │
//! │  │        │   bridge       │          │  │
//! │  │        ▼                ▼          │  │
//! │  │  ┌──────────┐     ┌───────────┐    │  │
//! │  │  │quill-llm │     │quill-core │    │  │
//! │  │  └──────────┘     └───────────┘    │  │
//! │  └────────────────────────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `workspace`: documents, provider status and generation as async calls
//! - `autosave`: debounced saves while the writer types
//! - `bridge`: config and type mapping between `quill-core` and `quill-llm`
//! - `error`: [`EditorError`] with writer-facing messages

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod autosave;
pub mod bridge;
pub mod error;
pub mod workspace;

pub use autosave::{AutoSaveStats, AutoSaver};
pub use error::{EditorError, Result};
pub use workspace::{DocumentCallbacks, Workspace};
