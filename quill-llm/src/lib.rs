//! # quill-llm — Generation layer for QuillPilot
//!
//! Talks to the QuillPilot backend, which fronts two providers:
//!   - **Ollama** (local, preferred when available)
//!   - **OpenAI** (cloud)
//!
//! The crate covers:
//!   - provider/model selection from a live snapshot and remembered choices
//!     ([`selector`])
//!   - incremental decoding of the `data:` stream protocol ([`stream`])
//!   - blocking and streaming generation with cancellation ([`client`])
//!   - the blog-post template and its tolerant output parser ([`prompt`])
//!
//! # Flow
//!
//! ```text
//! snapshot() ──► ProviderSelector::resolve ──► GenerationRequest::resolved
//!                                                   │
//!                 generate()  ◄─────────────────────┤
//!                 generate_streaming(callbacks) ◄───┘──► StreamHandle
//! ```

pub mod client;
pub mod error;
pub mod prompt;
pub mod selector;
pub mod stream;
pub mod types;

pub use client::{GenerationClient, StreamCallbacks, StreamHandle, StreamOutcome};
pub use error::LlmError;
pub use selector::{FilePreferences, MemoryPreferences, ModelRanking, PreferenceStore, ProviderSelector};
pub use stream::{FrameParser, StreamEvent};
pub use types::{
    BlogDraft, GenerationMode, GenerationRequest, ProviderDescriptor, ProviderKind, ProviderSnapshot, Selection,
    TargetLength, TemplatedOutput,
};
