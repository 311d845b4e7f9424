//! Generation client for the QuillPilot backend.
//!
//! One HTTP backend fronts every provider; the request names the provider
//! and model. Blocking generation returns the whole text, streaming delivers
//! fragments through callbacks as they arrive.

use std::cell::Cell;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use parking_lot::ReentrantMutex;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::prompt;
use crate::stream::{FrameParser, StreamEvent};
use crate::types::{
    ContentRequest, ContentResponse, GenerationRequest, HealthResponse, ModelsResponse, ProviderSnapshot,
    TemplatedOutput,
};

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";

const HEALTH_PATH: &str = "/api/health";
const MODELS_PATH: &str = "/api/models";
const GENERATE_PATH: &str = "/api/generate-content";
const STREAM_PATH: &str = "/api/generate-content/stream";

/// Status queries (health, models) should answer fast even when generation is slow.
const STATUS_TIMEOUT_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// Streaming callbacks and handle
// ---------------------------------------------------------------------------

/// Receivers for one streaming generation.
///
/// `on_fragment` runs once per fragment, in arrival order. Exactly one of
/// `on_done` / `on_error` runs afterwards, unless the stream is cancelled
/// first, in which case neither does.
pub struct StreamCallbacks {
    on_fragment: Box<dyn FnMut(String) + Send>,
    on_done: Box<dyn FnOnce() + Send>,
    on_error: Box<dyn FnOnce(LlmError) + Send>,
}

impl StreamCallbacks {
    /// Bundle the three callbacks.
    pub fn new(
        on_fragment: impl FnMut(String) + Send + 'static,
        on_done: impl FnOnce() + Send + 'static,
        on_error: impl FnOnce(LlmError) + Send + 'static,
    ) -> Self {
        Self {
            on_fragment: Box::new(on_fragment),
            on_done: Box::new(on_done),
            on_error: Box::new(on_error),
        }
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks").finish_non_exhaustive()
    }
}

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `on_done` ran.
    Completed,
    /// `on_error` ran.
    Failed,
    /// Cancelled before a terminal callback.
    Cancelled,
}

/// Cancellation flag shared by a stream task and its handle.
///
/// Every callback runs while the gate is held, and cancelling takes the same
/// lock, so once [`cancel`](Self::cancel) returns no callback is running and
/// none will start. The lock is reentrant: a callback may cancel its own
/// stream.
#[derive(Debug, Default)]
pub(crate) struct CancelGate {
    cancelled: ReentrantMutex<Cell<bool>>,
}

impl CancelGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Gate that starts out cancelled.
    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        let gate = Self::new();
        gate.cancel();
        gate
    }

    /// Set the flag. Returns `false` if it was already set.
    pub(crate) fn cancel(&self) -> bool {
        let guard = self.cancelled.lock();
        !guard.replace(true)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.lock().get()
    }

    /// Run `f` unless cancelled, holding the gate for its duration.
    pub(crate) fn deliver<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let guard = self.cancelled.lock();
        if guard.get() {
            return None;
        }
        Some(f())
    }
}

/// Control over a running stream.
///
/// Dropping the handle detaches the stream; it keeps running to completion.
#[derive(Debug)]
pub struct StreamHandle {
    gate: Arc<CancelGate>,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Stop delivering callbacks and release the connection.
    ///
    /// Waits for a callback already in progress; none runs after this
    /// returns. Idempotent; a no-op once the stream has ended.
    pub fn cancel(&self) {
        if self.gate.cancel() {
            self.task.abort();
            debug!("Generation stream cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Whether the stream task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream to end.
    pub async fn join(self) -> StreamOutcome {
        self.task.await.unwrap_or(StreamOutcome::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// GenerationClient
// ---------------------------------------------------------------------------

/// HTTP client for the generation backend.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: Client,
    base_url: String,
    request_timeout_ms: u64,
}

impl GenerationClient {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, request_timeout_ms: u64, connect_timeout_ms: u64) -> Result<Self, LlmError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(connect_timeout_ms))
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout_ms,
        })
    }

    /// Backend address, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Wire body for `request`. The provider must already be resolved.
    fn body(request: &GenerationRequest) -> Result<serde_json::Value, LlmError> {
        let provider = request.provider.ok_or(LlmError::NoProviderAvailable)?;
        let prompt = prompt::prompt_for(request);
        let body = ContentRequest {
            prompt: &prompt,
            style: request.style(),
            length: request.length(),
            ai_provider: provider,
            model: request.model.as_deref(),
            max_tokens: request.max_tokens(),
        };
        serde_json::to_value(&body).map_err(|e| LlmError::Config(e.to_string()))
    }

    /// Generate the full text for `request` in one round trip.
    ///
    /// # Errors
    ///
    /// - [`LlmError::NoProviderAvailable`] if the request has no provider.
    /// - [`LlmError::ProviderUnreachable`] / [`LlmError::ProviderTimeout`] on
    ///   transport failure.
    /// - [`LlmError::ProviderRejected`] on a non-2xx status, `success: false`,
    ///   or an unreadable body.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let body = Self::body(request)?;
        let start = Instant::now();

        let resp = self
            .http
            .post(self.url(GENERATE_PATH))
            .json(&body)
            .timeout(Duration::from_millis(self.request_timeout_ms))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, self.request_timeout_ms))?;

        if !resp.status().is_success() {
            let err = rejection(resp).await;
            warn!(error = %err, "Generation request rejected");
            return Err(err);
        }

        let parsed: ContentResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ProviderRejected(format!("unreadable response: {e}")))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        match parsed {
            ContentResponse {
                success: true,
                content: Some(text),
                ..
            } => {
                info!(
                    provider = ?request.provider,
                    model = request.model.as_deref().unwrap_or("default"),
                    chars = text.len(),
                    latency_ms,
                    "Generated content"
                );
                Ok(text)
            }
            ContentResponse { error, .. } => Err(LlmError::ProviderRejected(
                error.unwrap_or_else(|| "backend reported failure without detail".into()),
            )),
        }
    }

    /// Generate and interpret a templated request.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate). An unparsable response is not an
    /// error; it comes back as [`TemplatedOutput::RawFallback`].
    pub async fn generate_templated(&self, request: &GenerationRequest) -> Result<TemplatedOutput, LlmError> {
        let text = self.generate(request).await?;
        Ok(prompt::parse_templated(&text))
    }

    /// Start a streaming generation on the current tokio runtime.
    ///
    /// Failures, including a missing provider, are reported through
    /// `on_error` rather than returned.
    #[must_use = "dropping the handle detaches the stream; keep it to cancel"]
    pub fn generate_streaming(&self, request: &GenerationRequest, callbacks: StreamCallbacks) -> StreamHandle {
        let gate = Arc::new(CancelGate::new());
        let flag = Arc::clone(&gate);
        let http = self.http.clone();
        let url = self.url(STREAM_PATH);
        let timeout_ms = self.request_timeout_ms;
        let body = Self::body(request);
        debug!(provider = ?request.provider, model = ?request.model, "Starting generation stream");

        let task = tokio::spawn(async move {
            let body = match body {
                Ok(body) => body,
                Err(e) => return deliver_error(&flag, callbacks, e),
            };

            let sent = tokio::time::timeout(Duration::from_millis(timeout_ms), http.post(&url).json(&body).send()).await;
            let resp = match sent {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => return deliver_error(&flag, callbacks, LlmError::from_transport(e, timeout_ms)),
                Err(_) => return deliver_error(&flag, callbacks, LlmError::ProviderTimeout(timeout_ms)),
            };
            if !resp.status().is_success() {
                let err = rejection(resp).await;
                return deliver_error(&flag, callbacks, err);
            }

            let bytes = resp.bytes_stream().map(|chunk| chunk.map_err(LlmError::from));
            pump(bytes, &flag, Some(Duration::from_millis(timeout_ms)), callbacks).await
        });

        StreamHandle { gate, task }
    }

    /// Ask the backend which providers are usable.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the backend does not answer.
    pub async fn check_health(&self) -> Result<HealthResponse, LlmError> {
        self.fetch_status(HEALTH_PATH).await
    }

    /// Ask the backend which models each provider offers.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the backend does not answer.
    pub async fn list_models(&self) -> Result<ModelsResponse, LlmError> {
        self.fetch_status(MODELS_PATH).await
    }

    /// Health and models merged into provider descriptors.
    ///
    /// A failed model listing leaves the model sets empty rather than failing.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the health check fails.
    pub async fn snapshot(&self) -> Result<ProviderSnapshot, LlmError> {
        let health = self.check_health().await?;
        let models = self.list_models().await.unwrap_or_else(|e| {
            warn!(error = %e, "Model listing failed; continuing without model sets");
            ModelsResponse::default()
        });
        Ok(ProviderSnapshot::from_wire(&health, &models))
    }

    async fn fetch_status<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, LlmError> {
        let resp = self
            .http
            .get(self.url(path))
            .timeout(Duration::from_millis(STATUS_TIMEOUT_MS))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, STATUS_TIMEOUT_MS))?;
        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| LlmError::ProviderRejected(format!("unreadable {path} response: {e}")))
    }
}

/// Turn a non-2xx response into `ProviderRejected`, keeping the backend's
/// `detail` / `error` message when there is one.
async fn rejection(resp: reqwest::Response) -> LlmError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    LlmError::ProviderRejected(format!("HTTP {status}: {detail}"))
}

fn deliver_error(gate: &CancelGate, callbacks: StreamCallbacks, err: LlmError) -> StreamOutcome {
    gate.deliver(|| {
        warn!(error = %err, "Generation stream failed");
        (callbacks.on_error)(err);
        StreamOutcome::Failed
    })
    .unwrap_or(StreamOutcome::Cancelled)
}

/// Drive `chunks` through a [`FrameParser`] into `callbacks`.
///
/// Returns as soon as a terminal event is delivered or `gate` is cancelled;
/// dropping `chunks` on return releases the connection.
pub(crate) async fn pump<S, B>(
    chunks: S,
    gate: &CancelGate,
    idle_timeout: Option<Duration>,
    callbacks: StreamCallbacks,
) -> StreamOutcome
where
    S: Stream<Item = Result<B, LlmError>>,
    B: AsRef<[u8]>,
{
    let StreamCallbacks {
        mut on_fragment,
        on_done,
        on_error,
    } = callbacks;
    let mut chunks = pin!(chunks);
    let mut parser = FrameParser::new();
    let start = Instant::now();
    let mut fragments = 0usize;

    loop {
        if gate.is_cancelled() {
            return StreamOutcome::Cancelled;
        }

        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, chunks.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    return gate
                        .deliver(|| {
                            on_error(LlmError::ProviderTimeout(ms));
                            StreamOutcome::Failed
                        })
                        .unwrap_or(StreamOutcome::Cancelled);
                }
            },
            None => chunks.next().await,
        };

        let events = match next {
            Some(Ok(chunk)) => parser.push(chunk.as_ref()),
            Some(Err(e)) => {
                return gate
                    .deliver(|| {
                        warn!(error = %e, fragments, "Generation stream interrupted");
                        on_error(e);
                        StreamOutcome::Failed
                    })
                    .unwrap_or(StreamOutcome::Cancelled);
            }
            None => parser.finish(),
        };

        for event in events {
            match event {
                StreamEvent::Fragment(text) => {
                    if gate.deliver(|| on_fragment(text)).is_none() {
                        return StreamOutcome::Cancelled;
                    }
                    fragments += 1;
                }
                StreamEvent::Done => {
                    let dropped = parser.dropped();
                    return gate
                        .deliver(|| {
                            info!(
                                fragments,
                                dropped,
                                elapsed_ms = start.elapsed().as_millis() as u64,
                                "Generation stream completed"
                            );
                            on_done();
                            StreamOutcome::Completed
                        })
                        .unwrap_or(StreamOutcome::Cancelled);
                }
                StreamEvent::Error(message) => {
                    return gate
                        .deliver(|| {
                            warn!(%message, fragments, "Provider reported a stream error");
                            on_error(LlmError::ProviderRejected(message));
                            StreamOutcome::Failed
                        })
                        .unwrap_or(StreamOutcome::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Recorded {
        fragments: Vec<String>,
        done: usize,
        errors: Vec<String>,
    }

    fn recording() -> (Arc<Mutex<Recorded>>, StreamCallbacks) {
        let rec = Arc::new(Mutex::new(Recorded::default()));
        let (a, b, c) = (Arc::clone(&rec), Arc::clone(&rec), Arc::clone(&rec));
        let callbacks = StreamCallbacks::new(
            move |text| a.lock().fragments.push(text),
            move || b.lock().done += 1,
            move |err| c.lock().errors.push(err.to_string()),
        );
        (rec, callbacks)
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], LlmError>> {
        futures::stream::iter(parts.iter().copied().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn pump_delivers_fragments_then_done() {
        let (rec, callbacks) = recording();
        let outcome = pump(
            chunks(&["data: {\"content\": \"a\"}\nda", "ta: {\"content\": \"b\"}\n", "data: {\"done\": true}\n"]),
            &CancelGate::new(),
            None,
            callbacks,
        )
        .await;

        assert_eq!(outcome, StreamOutcome::Completed);
        let rec = rec.lock();
        assert_eq!(rec.fragments, vec!["a", "b"]);
        assert_eq!(rec.done, 1);
        assert!(rec.errors.is_empty());
    }

    #[tokio::test]
    async fn pump_completes_on_eof_without_terminal() {
        let (rec, callbacks) = recording();
        let outcome = pump(chunks(&["data: {\"content\": \"x\"}"]), &CancelGate::new(), None, callbacks).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(rec.lock().fragments, vec!["x"]);
    }

    #[tokio::test]
    async fn pump_reports_provider_error_once() {
        let (rec, callbacks) = recording();
        let outcome = pump(
            chunks(&["data: {\"error\": \"quota\"}\n", "data: {\"error\": \"again\"}\n"]),
            &CancelGate::new(),
            None,
            callbacks,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Failed);
        let rec = rec.lock();
        assert_eq!(rec.errors.len(), 1);
        assert!(rec.errors[0].contains("quota"));
        assert_eq!(rec.done, 0);
    }

    #[tokio::test]
    async fn pump_reports_transport_error() {
        let (rec, callbacks) = recording();
        let items: Vec<Result<&'static [u8], LlmError>> = vec![
            Ok(&b"data: {\"content\": \"partial\"}\n"[..]),
            Err(LlmError::ProviderUnreachable("reset".into())),
        ];
        let outcome = pump(futures::stream::iter(items), &CancelGate::new(), None, callbacks).await;
        assert_eq!(outcome, StreamOutcome::Failed);
        let rec = rec.lock();
        assert_eq!(rec.fragments, vec!["partial"]);
        assert_eq!(rec.errors.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_pump_delivers_nothing() {
        let (rec, callbacks) = recording();
        let outcome = pump(
            chunks(&["data: {\"content\": \"a\"}\n"]),
            &CancelGate::closed(),
            None,
            callbacks,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Cancelled);
        let rec = rec.lock();
        assert!(rec.fragments.is_empty());
        assert_eq!(rec.done + rec.errors.len(), 0);
    }

    #[tokio::test]
    async fn callback_may_cancel_its_own_stream() {
        let gate = Arc::new(CancelGate::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (g, sink) = (Arc::clone(&gate), Arc::clone(&seen));
        let callbacks = StreamCallbacks::new(
            move |text| {
                sink.lock().push(text);
                g.cancel();
            },
            || panic!("done after cancel"),
            |e| panic!("error after cancel: {e}"),
        );
        let outcome = pump(
            chunks(&["data: {\"content\": \"a\"}\ndata: {\"content\": \"b\"}\ndata: [DONE]\n"]),
            &gate,
            None,
            callbacks,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(*seen.lock(), vec!["a"]);
    }

    #[test]
    fn cancel_waits_for_the_running_callback() {
        let gate = Arc::new(CancelGate::new());
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let worker = {
            let (gate, finished) = (Arc::clone(&gate), Arc::clone(&finished));
            std::thread::spawn(move || {
                gate.deliver(|| {
                    entered_tx.send(()).expect("signal");
                    std::thread::sleep(Duration::from_millis(50));
                    finished.store(true, std::sync::atomic::Ordering::SeqCst);
                })
            })
        };

        entered_rx.recv().expect("callback started");
        assert!(gate.cancel());
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst), "cancel returned mid-callback");
        assert!(gate.deliver(|| ()).is_none());
        assert!(!gate.cancel());
        assert_eq!(worker.join().expect("worker"), Some(()));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_times_out() {
        let (rec, callbacks) = recording();
        let outcome = pump(
            futures::stream::pending::<Result<&'static [u8], LlmError>>(),
            &CancelGate::new(),
            Some(Duration::from_millis(50)),
            callbacks,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Failed);
        assert!(rec.lock().errors[0].contains("50ms"));
    }

    #[tokio::test]
    async fn unresolved_request_fails_through_on_error() {
        let client = GenerationClient::new(DEFAULT_BASE_URL, 1_000, 1_000).expect("client");
        let (rec, callbacks) = recording();
        let handle = client.generate_streaming(&GenerationRequest::freeform("hi"), callbacks);
        assert_eq!(handle.join().await, StreamOutcome::Failed);
        assert!(rec.lock().errors[0].contains("no generation provider"));
    }

    #[test]
    fn base_url_is_normalised() {
        let client = GenerationClient::new("http://127.0.0.1:9/", 10, 10).expect("client");
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        assert_eq!(client.url(HEALTH_PATH), "http://127.0.0.1:9/api/health");
    }
}
