//! Dual-store persistence engine for documents.
//!
//! Every document is written twice:
//!
//! - to the **durable** store as a human-readable record
//!   (`slug(title)_id.md`, metadata block + body, see [`crate::codec`]);
//! - to the **ephemeral** store as part of one JSON array under a fixed
//!   namespace, replaced wholesale on every write.
//!
//! A write succeeds if at least one store accepted it. Loading prefers the
//! durable store and falls back to the ephemeral mirror when the directory
//! cannot be read. When both are readable they are reconciled by id: the
//! later `updatedAt` wins and ties go to the durable copy.
//!
//! The engine holds no locks of its own. It assumes a single writer and
//! relies on every `save` being independently idempotent.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::PersistenceConfig;
use crate::derive::{KeywordHeuristic, MetadataDeriver};
use crate::error::{QuillError, Result, StoreKind};
use crate::store::{DurableStore, EphemeralStore};
use crate::types::{Document, DocumentId};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-store result of a write or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// The store accepted the operation.
    Written,
    /// The store failed; the message is kept for diagnostics.
    Failed(String),
}

impl StoreStatus {
    /// Whether the store accepted the operation.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Written)
    }

    fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Written,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Result of [`PersistenceEngine::save`].
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// The document as stored (advanced `updatedAt`, derived metadata).
    pub document: Document,
    /// Durable store status.
    pub durable: StoreStatus,
    /// Ephemeral store status.
    pub ephemeral: StoreStatus,
}

impl SaveOutcome {
    /// Both stores hold the new version.
    #[must_use]
    pub fn fully_persisted(&self) -> bool {
        self.durable.is_ok() && self.ephemeral.is_ok()
    }
}

/// Result of [`PersistenceEngine::delete`].
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// Whether either store held the document.
    pub existed: bool,
    /// Durable store status.
    pub durable: StoreStatus,
    /// Ephemeral store status.
    pub ephemeral: StoreStatus,
}

/// Result of [`PersistenceEngine::load_report`].
#[derive(Debug)]
pub struct LoadReport {
    /// Documents, most recently updated first.
    pub documents: Vec<Document>,
    /// Store the listing was primarily served from.
    pub source: StoreKind,
    /// Records that could not be read or decoded.
    pub skipped: Vec<QuillError>,
    /// Documents re-written to the durable store because only the
    /// ephemeral mirror had their latest version.
    pub restored: usize,
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Owns the document lifecycle over a durable and an ephemeral store.
///
/// # Usage
///
/// ```no_run
/// # use quill_core::persistence::PersistenceEngine;
/// # use quill_core::config::PersistenceConfig;
/// # use quill_core::store::{FsStore, MemoryKv};
/// # use quill_core::types::Document;
/// let config = PersistenceConfig::default();
/// let engine = PersistenceEngine::new(
///     FsStore::new(&config.documents_dir, &config.file_extension),
///     MemoryKv::new(),
///     &config,
/// );
/// let outcome = engine.save(&Document::new("Hello", "First draft."))?;
/// let all = engine.load_all()?;
/// # Ok::<(), quill_core::error::QuillError>(())
/// ```
pub struct PersistenceEngine<D, E> {
    durable: D,
    ephemeral: E,
    config: PersistenceConfig,
    deriver: Box<dyn MetadataDeriver>,
    slow_threshold_ms: u64,
}

impl<D, E> std::fmt::Debug for PersistenceEngine<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("config", &self.config)
            .field("slow_threshold_ms", &self.slow_threshold_ms)
            .finish_non_exhaustive()
    }
}

impl<D: DurableStore, E: EphemeralStore> PersistenceEngine<D, E> {
    /// Create an engine over the given stores.
    pub fn new(durable: D, ephemeral: E, config: &PersistenceConfig) -> Self {
        Self {
            durable,
            ephemeral,
            config: config.clone(),
            deriver: Box::new(KeywordHeuristic::default()),
            slow_threshold_ms: 250,
        }
    }

    /// Replace the keyword/summary deriver.
    #[must_use]
    pub fn with_deriver(mut self, deriver: impl MetadataDeriver + 'static) -> Self {
        self.deriver = Box::new(deriver);
        self
    }

    /// Log saves and loads slower than `ms` at warn level.
    #[must_use]
    pub fn with_slow_threshold(mut self, ms: u64) -> Self {
        self.slow_threshold_ms = ms;
        self
    }

    /// The durable store.
    pub fn durable(&self) -> &D {
        &self.durable
    }

    /// The ephemeral store.
    pub fn ephemeral(&self) -> &E {
        &self.ephemeral
    }

    /// Create the durable container if needed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::StoreUnavailable`] if the container cannot be created.
    pub fn provision(&self) -> Result<()> {
        self.durable.provision()
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Load every document, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::StoresExhausted`] only if neither store can be read.
    pub fn load_all(&self) -> Result<Vec<Document>> {
        self.load_report().map(|report| report.documents)
    }

    /// Like [`load_all`](Self::load_all), with details on skipped records and
    /// fallback.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::StoresExhausted`] only if neither store can be read.
    pub fn load_report(&self) -> Result<LoadReport> {
        let start = Instant::now();
        let durable = self.read_durable();
        let mirror = self.read_mirror();

        let report = match (durable, mirror) {
            (Ok((documents, skipped)), mirror) => {
                let mirror = mirror.unwrap_or_else(|e| {
                    warn!(error = %e, "Ephemeral mirror unreadable; rebuilding from durable store");
                    Vec::new()
                });
                let (documents, newer_in_mirror) = reconcile(documents, mirror);

                let mut restored = 0;
                for doc in &newer_in_mirror {
                    match self.write_durable(doc) {
                        Ok(()) => restored += 1,
                        Err(e) => warn!(document = %doc.id, error = %e, "Could not restore document to durable store"),
                    }
                }
                if let Err(e) = self.write_mirror(&documents) {
                    warn!(error = %e, "Could not refresh ephemeral mirror");
                }

                LoadReport {
                    documents,
                    source: StoreKind::Durable,
                    skipped,
                    restored,
                }
            }
            (Err(durable_err), Ok(mut documents)) => {
                warn!(error = %durable_err, "Durable store unavailable; loading from ephemeral mirror");
                sort_documents(&mut documents);
                LoadReport {
                    documents,
                    source: StoreKind::Ephemeral,
                    skipped: Vec::new(),
                    restored: 0,
                }
            }
            (Err(durable_err), Err(mirror_err)) => {
                return Err(QuillError::StoresExhausted {
                    durable: durable_err.to_string(),
                    ephemeral: mirror_err.to_string(),
                });
            }
        };

        self.note_elapsed("load", start);
        info!(
            documents = report.documents.len(),
            skipped = report.skipped.len(),
            restored = report.restored,
            source = %report.source,
            "Loaded documents"
        );
        Ok(report)
    }

    /// Decode every durable record; unreadable records are skipped, not fatal.
    fn read_durable(&self) -> Result<(Vec<Document>, Vec<QuillError>)> {
        self.durable.provision()?;
        let names = self.durable.list_names()?;

        let mut documents = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for name in names {
            let decoded = match self.durable.read(&name) {
                Ok(text) => codec::decode(&text).ok_or_else(|| "missing or malformed metadata block".to_string()),
                Err(e) => Err(e.to_string()),
            };
            match decoded {
                Ok(doc) => documents.push(doc),
                Err(reason) => {
                    let err = QuillError::RecordSkipped { record: name, reason };
                    warn!(error = %err, "Skipping unreadable document record");
                    skipped.push(err);
                }
            }
        }
        Ok((documents, skipped))
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Save (upsert) a document.
    ///
    /// `updatedAt` is advanced to the current time, never backwards. Empty
    /// keywords or summary are derived from the text when configured. The
    /// durable and ephemeral writes are attempted independently.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::StoresExhausted`] if neither store accepted the write.
    pub fn save(&self, doc: &Document) -> Result<SaveOutcome> {
        let start = Instant::now();
        let mut mirror = self.read_mirror_for_update();

        let mut doc = doc.clone();
        let in_mirror = mirror
            .as_ref()
            .ok()
            .and_then(|docs| docs.iter().find(|d| d.id == doc.id))
            .map(|d| d.updated_at);
        doc.updated_at = in_mirror
            .into_iter()
            .chain(self.durable_updated_at(&doc.id))
            .fold(Utc::now().max(doc.updated_at), |a, b| a.max(b));
        self.fill_metadata(&mut doc);

        let durable = self.write_durable(&doc);
        let ephemeral = match mirror.as_mut() {
            Ok(docs) => {
                upsert(docs, &doc);
                self.write_mirror(docs)
            }
            Err(e) => Err(QuillError::unavailable(StoreKind::Ephemeral, e.to_string())),
        };

        if let Err(e) = &durable {
            warn!(document = %doc.id, error = %e, "Durable save failed; document kept in ephemeral mirror");
        }
        if let Err(e) = &ephemeral {
            warn!(document = %doc.id, error = %e, "Ephemeral mirror write failed");
        }
        if let (Err(d), Err(e)) = (&durable, &ephemeral) {
            return Err(QuillError::StoresExhausted {
                durable: d.to_string(),
                ephemeral: e.to_string(),
            });
        }

        self.note_elapsed("save", start);
        debug!(
            document = %doc.id,
            bytes = doc.body.len(),
            durable = durable.is_ok(),
            ephemeral = ephemeral.is_ok(),
            "Saved document"
        );

        Ok(SaveOutcome {
            durable: StoreStatus::from_result(&durable),
            ephemeral: StoreStatus::from_result(&ephemeral),
            document: doc,
        })
    }

    fn fill_metadata(&self, doc: &mut Document) {
        if !self.config.derive_missing_metadata || (!doc.keywords.is_empty() && !doc.summary.is_empty()) {
            return;
        }
        let derived = self.deriver.derive(&doc.title, &doc.body);
        if doc.keywords.is_empty() {
            doc.keywords = derived.keywords;
        }
        if doc.summary.is_empty() {
            doc.summary = derived.description;
        }
    }

    /// Latest `updatedAt` among the durable records for `id`. Unreadable
    /// stores or records count as absent.
    fn durable_updated_at(&self, id: &DocumentId) -> Option<DateTime<Utc>> {
        let suffix = format!(
            "_{}.{}",
            codec::id_component(id),
            self.config.file_extension.trim_start_matches('.')
        );
        let names = self.durable.list_names().ok()?;
        names
            .iter()
            .filter(|name| name.ends_with(&suffix))
            .filter_map(|name| self.durable.read(name).ok())
            .filter_map(|text| codec::decode(&text))
            .filter(|stored| &stored.id == id)
            .map(|stored| stored.updated_at)
            .max()
    }

    fn write_durable(&self, doc: &Document) -> Result<()> {
        let name = codec::record_name(doc, &self.config.file_extension);
        self.durable.write(&doc.id, &name, &codec::encode(doc))
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a document from both stores.
    ///
    /// Removal from the ephemeral mirror is immediate; durable removal is
    /// best-effort and its failure is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::StoresExhausted`] if neither store could be updated.
    pub fn delete(&self, id: &DocumentId) -> Result<DeleteOutcome> {
        let mut existed = false;
        let ephemeral = self.read_mirror_for_update().and_then(|mut docs| {
            let before = docs.len();
            docs.retain(|d| &d.id != id);
            existed |= docs.len() != before;
            self.write_mirror(&docs)
        });
        let durable = self.durable.remove(id).map(|removed| existed |= removed);

        if let Err(e) = &durable {
            warn!(document = %id, error = %e, "Durable delete failed");
        }
        if let (Err(d), Err(e)) = (&durable, &ephemeral) {
            return Err(QuillError::StoresExhausted {
                durable: d.to_string(),
                ephemeral: e.to_string(),
            });
        }

        info!(document = %id, existed, "Deleted document");
        Ok(DeleteOutcome {
            existed,
            durable: StoreStatus::from_result(&durable),
            ephemeral: StoreStatus::from_result(&ephemeral),
        })
    }

    // ------------------------------------------------------------------
    // Ephemeral mirror
    // ------------------------------------------------------------------

    fn read_mirror(&self) -> Result<Vec<Document>> {
        match self.ephemeral.get(&self.config.ephemeral_namespace)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Mirror contents for a read-modify-write. A corrupt mirror is rebuilt
    /// from scratch rather than blocking the write.
    fn read_mirror_for_update(&self) -> Result<Vec<Document>> {
        match self.read_mirror() {
            Err(QuillError::Serialization(reason)) => {
                warn!(%reason, "Ephemeral mirror is corrupt; starting a fresh one");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn write_mirror(&self, docs: &[Document]) -> Result<()> {
        let json = serde_json::to_string(docs)?;
        self.ephemeral.set(&self.config.ephemeral_namespace, &json)
    }

    fn note_elapsed(&self, operation: &str, start: Instant) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms > self.slow_threshold_ms {
            warn!(operation, elapsed_ms, threshold_ms = self.slow_threshold_ms, "Slow persistence operation");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Overwrite in place when the id exists, append otherwise.
fn upsert(docs: &mut Vec<Document>, doc: &Document) {
    match docs.iter_mut().find(|d| d.id == doc.id) {
        Some(slot) => *slot = doc.clone(),
        None => docs.push(doc.clone()),
    }
}

/// Merge durable and mirror listings by id.
///
/// Returns the merged set and the documents whose newest version exists only
/// in the mirror.
fn reconcile(durable: Vec<Document>, mirror: Vec<Document>) -> (Vec<Document>, Vec<Document>) {
    let mut merged: BTreeMap<DocumentId, Document> = BTreeMap::new();
    for doc in durable {
        match merged.get(&doc.id) {
            Some(existing) if existing.updated_at >= doc.updated_at => {}
            _ => {
                merged.insert(doc.id.clone(), doc);
            }
        }
    }

    let mut newer_in_mirror = Vec::new();
    for doc in mirror {
        let newer = merged
            .get(&doc.id)
            .is_none_or(|existing| doc.updated_at > existing.updated_at);
        if newer {
            newer_in_mirror.push(doc.clone());
            merged.insert(doc.id.clone(), doc);
        }
    }

    let mut documents: Vec<Document> = merged.into_values().collect();
    sort_documents(&mut documents);
    (documents, newer_in_mirror)
}

fn sort_documents(docs: &mut [Document]) {
    docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FsStore, MemoryKv};
    use chrono::Duration;
    use std::sync::Arc;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            derive_missing_metadata: false,
            ..PersistenceConfig::default()
        }
    }

    fn engine() -> (tempfile::TempDir, PersistenceEngine<FsStore, Arc<MemoryKv>>, Arc<MemoryKv>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(MemoryKv::new());
        let engine = PersistenceEngine::new(
            FsStore::new(dir.path().join("docs"), "md"),
            Arc::clone(&kv),
            &test_config(),
        );
        (dir, engine, kv)
    }

    #[test]
    fn save_then_load_round_trip() {
        let (_dir, engine, _kv) = engine();
        let doc = Document::new("First post", "Hello **world**").with_keywords(["hello"]);

        let outcome = engine.save(&doc).expect("save");
        assert!(outcome.fully_persisted());

        let loaded = engine.load_all().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, doc.id);
        assert_eq!(loaded[0].body, doc.body);
        assert_eq!(loaded[0].keywords, vec!["hello"]);
        assert_eq!(loaded[0], outcome.document);
    }

    #[test]
    fn saving_twice_keeps_one_record() {
        let (_dir, engine, _kv) = engine();
        let doc = Document::new("Same", "content");

        let first = engine.save(&doc).expect("save 1");
        let second = engine.save(&doc).expect("save 2");
        assert!(second.document.updated_at >= first.document.updated_at);

        assert_eq!(engine.durable().list_names().expect("list").len(), 1);
        assert_eq!(engine.load_all().expect("load").len(), 1);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let (_dir, engine, _kv) = engine();
        let mut doc = Document::new("Future", "x");
        doc.updated_at = Utc::now() + Duration::hours(1);
        let saved = engine.save(&doc).expect("save").document;
        assert_eq!(saved.updated_at, doc.updated_at);

        // A stale in-memory copy must not roll the stored timestamp back.
        let mut stale = doc.clone();
        stale.updated_at = Utc::now() - Duration::days(1);
        let resaved = engine.save(&stale).expect("save").document;
        assert!(resaved.updated_at >= saved.updated_at);
    }

    #[test]
    fn newer_durable_record_bounds_the_stamp_without_a_mirror() {
        let (dir, engine, _kv) = engine();
        let mut doc = Document::new("Shared", "from another session");
        doc.updated_at = Utc::now() + Duration::hours(2);
        engine.save(&doc).expect("seed");

        // A fresh process: same directory, empty mirror.
        let fresh = PersistenceEngine::new(
            FsStore::new(dir.path().join("docs"), "md"),
            MemoryKv::new(),
            &test_config(),
        );
        let mut stale = doc.clone();
        stale.updated_at = Utc::now() - Duration::days(1);
        let saved = fresh.save(&stale).expect("save").document;
        assert!(saved.updated_at >= doc.updated_at);
    }

    #[test]
    fn missing_metadata_is_derived_when_enabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = PersistenceEngine::new(
            FsStore::new(dir.path(), "md"),
            MemoryKv::new(),
            &PersistenceConfig::default(),
        )
        .with_deriver(|_: &str, _: &str| crate::derive::DerivedMetadata {
            keywords: vec!["derived".into()],
            description: "auto".into(),
        });

        let saved = engine
            .save(&Document::new("t", "b").with_summary("kept"))
            .expect("save")
            .document;
        assert_eq!(saved.keywords, vec!["derived"]);
        assert_eq!(saved.summary, "kept");
    }

    #[test]
    fn new_ids_append_and_existing_ids_overwrite_in_mirror() {
        let (_dir, engine, kv) = engine();
        let a = Document::new("A", "a");
        let b = Document::new("B", "b");
        engine.save(&a).expect("save a");
        engine.save(&b).expect("save b");
        let mut a2 = a.clone();
        a2.body = "a, revised".into();
        engine.save(&a2).expect("save a2");

        let json = kv
            .get(&test_config().ephemeral_namespace)
            .expect("get")
            .expect("mirror present");
        let mirror: Vec<Document> = serde_json::from_str(&json).expect("parse");
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror[0].id, a.id);
        assert_eq!(mirror[0].body, "a, revised");
        assert_eq!(mirror[1].id, b.id);
    }

    #[test]
    fn ephemeral_failure_alone_still_saves() {
        let (_dir, engine, kv) = engine();
        kv.set_fail_writes(true);
        let outcome = engine.save(&Document::new("t", "b")).expect("durable accepted");
        assert!(outcome.durable.is_ok());
        assert!(!outcome.ephemeral.is_ok());
    }

    #[test]
    fn both_stores_failing_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").expect("write");
        let kv = MemoryKv::new();
        kv.set_fail_writes(true);
        let engine = PersistenceEngine::new(FsStore::new(&blocker, "md"), kv, &test_config());

        let err = engine.save(&Document::new("t", "b")).expect_err("both fail");
        assert!(matches!(err, QuillError::StoresExhausted { .. }));
    }

    #[test]
    fn delete_removes_from_both_stores() {
        let (_dir, engine, _kv) = engine();
        let doc = Document::new("Doomed", "x");
        engine.save(&doc).expect("save");

        let outcome = engine.delete(&doc.id).expect("delete");
        assert!(outcome.existed);
        assert!(outcome.durable.is_ok() && outcome.ephemeral.is_ok());
        assert!(engine.load_all().expect("load").is_empty());

        let again = engine.delete(&doc.id).expect("delete again");
        assert!(!again.existed);
    }

    #[test]
    fn corrupt_mirror_is_rebuilt_on_save() {
        let (_dir, engine, kv) = engine();
        kv.set(&test_config().ephemeral_namespace, "{not json").expect("set");
        let outcome = engine.save(&Document::new("t", "b")).expect("save");
        assert!(outcome.fully_persisted());
    }

    #[test]
    fn reconcile_prefers_later_updates_and_durable_on_ties() {
        let base = Document::new("t", "durable");
        let mut newer = base.clone();
        newer.body = "mirror".into();
        newer.updated_at = base.updated_at + Duration::seconds(5);
        let mut tie = base.clone();
        tie.body = "mirror tie".into();

        let (merged, restore) = reconcile(vec![base.clone()], vec![tie]);
        assert_eq!(merged[0].body, "durable");
        assert!(restore.is_empty());

        let (merged, restore) = reconcile(vec![base], vec![newer]);
        assert_eq!(merged[0].body, "mirror");
        assert_eq!(restore.len(), 1);
    }

    #[test]
    fn sort_is_newest_first_then_id() {
        let mut a = Document::new("a", "");
        let mut b = Document::new("b", "");
        let mut c = Document::new("c", "");
        let t = Utc::now();
        a.updated_at = t;
        b.updated_at = t + Duration::seconds(1);
        c.updated_at = t;
        a.id = DocumentId::from("2");
        c.id = DocumentId::from("1");
        let mut docs = vec![a, b, c];
        sort_documents(&mut docs);
        let titles: Vec<_> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c", "a"]);
    }
}
