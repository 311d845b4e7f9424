//! The editor's single entry point.
//!
//! [`Workspace`] wires the persistence engine, the generation client and the
//! provider selector together and exposes them as async operations. Storage
//! calls are blocking file I/O and run on tokio's blocking pool.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use quill_core::config::{EditorConfig, QuillConfig};
use quill_core::derive::{KeywordHeuristic, MetadataDeriver};
use quill_core::persistence::{DeleteOutcome, PersistenceEngine, SaveOutcome};
use quill_core::store::{DurableStore, EphemeralStore, FsStore, MemoryKv};
use quill_core::types::{Document, DocumentId};
use quill_llm::types::{GenerationMode, HealthResponse, ModelsResponse};
use quill_llm::{
    FilePreferences, GenerationClient, GenerationRequest, LlmError, MemoryPreferences, PreferenceStore,
    ProviderSelector, StreamCallbacks, StreamHandle,
};

use crate::bridge;
use crate::error::Result;

/// Callbacks for a streamed blog post.
///
/// `on_fragment` sees the raw text as it arrives. When the stream completes,
/// the accumulated text is interpreted and `on_done` receives the resulting
/// (unsaved) document.
pub struct DocumentCallbacks {
    /// Raw text fragment.
    pub on_fragment: Box<dyn FnMut(&str) + Send>,
    /// Finished document.
    pub on_done: Box<dyn FnOnce(Document) + Send>,
    /// Failure.
    pub on_error: Box<dyn FnOnce(LlmError) + Send>,
}

impl DocumentCallbacks {
    /// Bundle the three callbacks.
    pub fn new(
        on_fragment: impl FnMut(&str) + Send + 'static,
        on_done: impl FnOnce(Document) + Send + 'static,
        on_error: impl FnOnce(LlmError) + Send + 'static,
    ) -> Self {
        Self {
            on_fragment: Box::new(on_fragment),
            on_done: Box::new(on_done),
            on_error: Box::new(on_error),
        }
    }
}

/// Documents plus generation, as the editor sees them.
pub struct Workspace<D, E> {
    engine: Arc<PersistenceEngine<D, E>>,
    client: GenerationClient,
    selector: ProviderSelector,
    deriver: Arc<dyn MetadataDeriver>,
    editor: EditorConfig,
}

impl<D, E> std::fmt::Debug for Workspace<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("client", &self.client)
            .field("selector", &self.selector)
            .field("editor", &self.editor)
            .finish_non_exhaustive()
    }
}

impl Workspace<FsStore, Arc<MemoryKv>> {
    /// Build a workspace from configuration: a directory store, an in-process
    /// mirror, and a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn from_config(config: &QuillConfig) -> Result<Self> {
        let persistence = &config.persistence;
        let engine = PersistenceEngine::new(
            FsStore::new(&persistence.documents_dir, &persistence.file_extension),
            Arc::new(MemoryKv::new()),
            persistence,
        )
        .with_slow_threshold(config.telemetry.log_slow_operations_ms);

        let client = GenerationClient::new(
            config.backend.base_url.clone(),
            config.backend.request_timeout_ms,
            config.backend.connect_timeout_ms,
        )?;

        let preferences: Arc<dyn PreferenceStore> = match &config.providers.preferences_file {
            Some(path) => Arc::new(FilePreferences::open(path)),
            None => Arc::new(MemoryPreferences::default()),
        };
        let selector = ProviderSelector::new(preferences)
            .with_ranking(bridge::model_ranking(&config.providers))
            .with_priority(bridge::provider_priority(&config.providers));

        info!(
            documents_dir = %persistence.documents_dir.display(),
            backend = %client.base_url(),
            "Workspace ready"
        );
        Ok(Self::new(engine, client, selector, config.editor.clone()))
    }
}

impl<D, E> Workspace<D, E>
where
    D: DurableStore + 'static,
    E: EphemeralStore + 'static,
{
    /// Assemble a workspace from its parts.
    pub fn new(
        engine: PersistenceEngine<D, E>,
        client: GenerationClient,
        selector: ProviderSelector,
        editor: EditorConfig,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            client,
            selector,
            deriver: Arc::new(KeywordHeuristic::default()),
            editor,
        }
    }

    /// Shared handle to the persistence engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<PersistenceEngine<D, E>> {
        &self.engine
    }

    /// Editor policies in effect.
    #[must_use]
    pub fn editor_config(&self) -> &EditorConfig {
        &self.editor
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// All documents, most recently updated first.
    ///
    /// # Errors
    ///
    /// Fails only if neither store can be read.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let engine = Arc::clone(&self.engine);
        Ok(tokio::task::spawn_blocking(move || engine.load_all()).await??)
    }

    /// Save (upsert) a document.
    ///
    /// # Errors
    ///
    /// Fails only if neither store accepted the write.
    pub async fn save_document(&self, doc: Document) -> Result<SaveOutcome> {
        let engine = Arc::clone(&self.engine);
        Ok(tokio::task::spawn_blocking(move || engine.save(&doc)).await??)
    }

    /// Delete a document from both stores.
    ///
    /// # Errors
    ///
    /// Fails only if neither store could be updated.
    pub async fn delete_document(&self, id: DocumentId) -> Result<DeleteOutcome> {
        let engine = Arc::clone(&self.engine);
        Ok(tokio::task::spawn_blocking(move || engine.delete(&id)).await??)
    }

    // ------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------

    /// Which providers the backend reports as usable.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the backend does not answer.
    pub async fn check_provider_health(&self) -> Result<HealthResponse> {
        Ok(self.client.check_health().await?)
    }

    /// Models offered by each provider.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the backend does not answer.
    pub async fn list_models(&self) -> Result<ModelsResponse> {
        Ok(self.client.list_models().await?)
    }

    /// Fill in editor defaults and resolve provider and model against a
    /// fresh snapshot.
    async fn prepare(&self, request: GenerationRequest) -> std::result::Result<GenerationRequest, LlmError> {
        let request = bridge::with_editor_defaults(request, &self.editor);
        let snapshot = self.client.snapshot().await?;
        let selection = self
            .selector
            .resolve(request.provider, request.model.as_deref(), &snapshot)?;
        debug!(provider = %selection.provider, model = ?selection.model, "Generation target selected");
        Ok(request.resolved(selection))
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Generate text in one round trip.
    ///
    /// # Errors
    ///
    /// Selection and transport errors; see [`LlmError`].
    pub async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let request = self.prepare(request).await?;
        Ok(self.client.generate(&request).await?)
    }

    /// Generate a blog post for `topic` and turn it into an unsaved document.
    ///
    /// An unparsable response still yields a document (raw text as body).
    ///
    /// # Errors
    ///
    /// Selection and transport errors; see [`LlmError`].
    pub async fn generate_document(&self, request: GenerationRequest) -> Result<Document> {
        let request = self.prepare(templated(request)).await?;
        let output = self.client.generate_templated(&request).await?;
        Ok(bridge::draft_to_document(output, &request.input, self.deriver.as_ref()))
    }

    /// Start streaming generation.
    ///
    /// # Errors
    ///
    /// Selection errors are returned here; failures after the stream has
    /// started go to `callbacks.on_error`.
    pub async fn generate_streaming(&self, request: GenerationRequest, callbacks: StreamCallbacks) -> Result<StreamHandle> {
        let request = self.prepare(request).await?;
        Ok(self.client.generate_streaming(&request, callbacks))
    }

    /// Stream a blog post, then hand the finished document to `on_done`.
    ///
    /// # Errors
    ///
    /// Selection errors are returned here; failures after the stream has
    /// started go to `callbacks.on_error`.
    pub async fn generate_document_streaming(
        &self,
        request: GenerationRequest,
        callbacks: DocumentCallbacks,
    ) -> Result<StreamHandle> {
        let request = self.prepare(templated(request)).await?;

        let DocumentCallbacks {
            mut on_fragment,
            on_done,
            on_error,
        } = callbacks;
        let text = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&text);
        let topic = request.input.clone();
        let deriver = Arc::clone(&self.deriver);

        let callbacks = StreamCallbacks::new(
            move |fragment: String| {
                on_fragment(&fragment);
                sink.lock().push_str(&fragment);
            },
            move || {
                let raw = std::mem::take(&mut *text.lock());
                let output = quill_llm::prompt::parse_templated(&raw);
                on_done(bridge::draft_to_document(output, &topic, deriver.as_ref()));
            },
            on_error,
        );
        Ok(self.client.generate_streaming(&request, callbacks))
    }
}

fn templated(mut request: GenerationRequest) -> GenerationRequest {
    request.mode = GenerationMode::Templated;
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::config::PersistenceConfig;

    fn offline_workspace(dir: &std::path::Path) -> Workspace<FsStore, Arc<MemoryKv>> {
        let mut config = QuillConfig::default();
        config.persistence = PersistenceConfig {
            documents_dir: dir.join("docs"),
            derive_missing_metadata: false,
            ..PersistenceConfig::default()
        };
        // Port 9 (discard) is never served in test environments.
        config.backend.base_url = "http://127.0.0.1:9".into();
        config.backend.connect_timeout_ms = 500;
        Workspace::from_config(&config).expect("workspace")
    }

    #[tokio::test]
    async fn document_lifecycle_through_the_workspace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = offline_workspace(dir.path());

        let saved = ws
            .save_document(Document::new("Draft", "text"))
            .await
            .expect("save")
            .document;
        let listed = ws.list_documents().await.expect("list");
        assert_eq!(listed, vec![saved.clone()]);

        let outcome = ws.delete_document(saved.id.clone()).await.expect("delete");
        assert!(outcome.existed);
        assert!(ws.list_documents().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn generation_without_backend_is_a_typed_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = offline_workspace(dir.path());

        let err = ws
            .generate(GenerationRequest::freeform("hello"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, crate::EditorError::Generation(LlmError::ProviderUnreachable(_))));
        assert!(!err.user_message().is_empty());
    }

    #[test]
    fn templated_switches_mode_and_budget() {
        let req = templated(GenerationRequest::freeform("Bread"));
        assert_eq!(req.mode, GenerationMode::Templated);
        assert_eq!(req.max_tokens(), 1200);
    }
}
