//! Debounced auto-save.
//!
//! Every edit calls [`AutoSaver::schedule`] with the latest document. A save
//! fires once the document has been left alone for the debounce period; each
//! new edit restarts the timer, so a burst of typing becomes one save of the
//! final text. [`AutoSaver::flush`] saves the pending document immediately
//! (closing the editor, switching documents).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use quill_core::persistence::SaveOutcome;
use quill_core::store::{DurableStore, EphemeralStore};
use quill_core::types::Document;

use crate::error::Result;
use crate::workspace::Workspace;

type SaveFn = Arc<dyn Fn(Document) -> BoxFuture<'static, Result<SaveOutcome>> + Send + Sync>;

/// Counters for the auto-saver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoSaveStats {
    /// Calls to `schedule`.
    pub scheduled: u64,
    /// Saves that reached at least one store.
    pub saved: u64,
    /// Saves that failed outright.
    pub failed: u64,
    /// Scheduled saves replaced by a later edit before firing.
    pub superseded: u64,
}

/// Debounces document saves.
///
/// Cloning shares the same pending document and timer.
#[derive(Clone)]
pub struct AutoSaver {
    inner: Arc<Mutex<AutoSaverInner>>,
    save: SaveFn,
    debounce: Duration,
}

struct AutoSaverInner {
    pending: Option<Document>,
    /// Bumped on every schedule/flush/cancel; a timer only fires if the
    /// generation it captured is still current.
    generation: u64,
    stats: AutoSaveStats,
}

impl std::fmt::Debug for AutoSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaver")
            .field("debounce", &self.debounce)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AutoSaver {
    /// Create an auto-saver around an async save function.
    pub fn new<F, Fut>(debounce: Duration, save: F) -> Self
    where
        F: Fn(Document) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SaveOutcome>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(AutoSaverInner {
                pending: None,
                generation: 0,
                stats: AutoSaveStats::default(),
            })),
            save: Arc::new(move |doc| Box::pin(save(doc))),
            debounce,
        }
    }

    /// Auto-saver that writes through `workspace` using its configured
    /// debounce period.
    pub fn for_workspace<D, E>(workspace: Arc<Workspace<D, E>>) -> Self
    where
        D: DurableStore + 'static,
        E: EphemeralStore + 'static,
    {
        let debounce = Duration::from_millis(workspace.editor_config().autosave_debounce_ms);
        Self::new(debounce, move |doc| {
            let workspace = Arc::clone(&workspace);
            async move { workspace.save_document(doc).await }
        })
    }

    /// Quiet period before a scheduled save fires.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Whether a document is waiting to be saved.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> AutoSaveStats {
        self.inner.lock().stats
    }

    /// Record an edit. Restarts the debounce timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, doc: Document) {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.pending.replace(doc).is_some() {
                inner.stats.superseded += 1;
            }
            inner.generation += 1;
            inner.stats.scheduled += 1;
            inner.generation
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            let doc = {
                let mut inner = this.inner.lock();
                if inner.generation != generation {
                    return;
                }
                inner.pending.take()
            };
            if let Some(doc) = doc {
                // Errors are counted and logged; the editor keeps the text.
                let _ = this.run(doc).await;
            }
        });
    }

    /// Save the pending document now, if any.
    ///
    /// # Errors
    ///
    /// Returns the save error; the document is not re-queued.
    pub async fn flush(&self) -> Result<Option<SaveOutcome>> {
        let doc = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.pending.take()
        };
        match doc {
            Some(doc) => self.run(doc).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop the pending document without saving it.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if inner.pending.take().is_some() {
            debug!("Pending auto-save discarded");
        }
    }

    async fn run(&self, doc: Document) -> Result<SaveOutcome> {
        let id = doc.id.clone();
        let result = (self.save)(doc).await;
        let mut inner = self.inner.lock();
        match &result {
            Ok(outcome) => {
                inner.stats.saved += 1;
                if !outcome.fully_persisted() {
                    debug!(id = %id, "Auto-save reached only one store");
                }
            }
            Err(e) => {
                inner.stats.failed += 1;
                warn!(id = %id, error = %e, "Auto-save failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::persistence::StoreStatus;
    use quill_core::QuillError;

    fn recording(fail: bool) -> (Arc<Mutex<Vec<Document>>>, AutoSaver) {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&saved);
        let saver = AutoSaver::new(Duration::from_millis(1_000), move |doc: Document| {
            let sink = Arc::clone(&sink);
            async move {
                if fail {
                    return Err(QuillError::StoresExhausted {
                        durable: "disk full".into(),
                        ephemeral: "quota".into(),
                    }
                    .into());
                }
                sink.lock().push(doc.clone());
                Ok(SaveOutcome {
                    document: doc,
                    durable: StoreStatus::Written,
                    ephemeral: StoreStatus::Written,
                })
            }
        });
        (saved, saver)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_saves_once_with_final_text() {
        let (saved, saver) = recording(false);
        let mut doc = Document::new("Draft", "a");
        for body in ["ab", "abc", "abcd"] {
            doc.body = body.into();
            saver.schedule(doc.clone());
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert!(saved.lock().is_empty(), "still inside the quiet period");

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let saved = saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].body, "abcd");

        let stats = saver.stats();
        assert_eq!(stats.scheduled, 3);
        assert_eq!(stats.superseded, 2);
        assert_eq!(stats.saved, 1);
        assert!(!saver.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_saves_immediately_and_disarms_timer() {
        let (saved, saver) = recording(false);
        saver.schedule(Document::new("Draft", "text"));

        let outcome = saver.flush().await.expect("flush");
        assert!(outcome.is_some_and(|o| o.fully_persisted()));
        assert_eq!(saved.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(saved.lock().len(), 1, "timer must not save again");
        assert!(saver.flush().await.expect("flush").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_document() {
        let (saved, saver) = recording(false);
        saver.schedule(Document::new("Draft", "text"));
        saver.cancel();
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(saved.lock().is_empty());
        assert!(!saver.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_counted() {
        let (_saved, saver) = recording(true);
        saver.schedule(Document::new("Draft", "text"));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(saver.stats().failed, 1);
        assert_eq!(saver.stats().saved, 0);
    }
}
