//! Provider and model selection.
//!
//! Resolution order for the provider:
//!
//! 1. the explicit choice on the request, if that provider is available;
//! 2. the stored preferred provider, if available;
//! 3. the first available provider in priority order (local before cloud).
//!
//! For the model, within the chosen provider's model set: the explicit model,
//! then the stored preferred model, then the first model matching the ranked
//! keyword list, then the first model offered. An empty set leaves the model
//! unset so the backend picks its own default.
//!
//! Explicit choices that were honoured are written back to the
//! [`PreferenceStore`] so the next request starts from them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{ProviderKind, ProviderSnapshot, Selection};

// ---------------------------------------------------------------------------
// Preference storage
// ---------------------------------------------------------------------------

/// Remembered provider and per-provider model choices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Last explicitly chosen provider.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Last explicitly chosen model, per provider.
    #[serde(default)]
    pub models: BTreeMap<ProviderKind, String>,
}

/// Where provider preferences live. Last write wins.
pub trait PreferenceStore: Send + Sync {
    /// Current preferences.
    fn load(&self) -> Preferences;

    /// Record an explicit choice. `model` is `None` when only the provider
    /// was chosen.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Preferences`] if the choice could not be stored.
    fn record(&self, provider: ProviderKind, model: Option<&str>) -> Result<(), LlmError>;
}

fn apply(prefs: &mut Preferences, provider: ProviderKind, model: Option<&str>) {
    prefs.provider = Some(provider);
    if let Some(model) = model {
        prefs.models.insert(provider, model.to_string());
    }
}

/// Process-local preferences.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    inner: Mutex<Preferences>,
}

impl MemoryPreferences {
    /// Start from `prefs`.
    #[must_use]
    pub fn new(prefs: Preferences) -> Self {
        Self {
            inner: Mutex::new(prefs),
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Preferences {
        self.inner.lock().clone()
    }

    fn record(&self, provider: ProviderKind, model: Option<&str>) -> Result<(), LlmError> {
        apply(&mut self.inner.lock(), provider, model);
        Ok(())
    }
}

/// Preferences persisted as a small JSON file.
///
/// A missing or unreadable file starts from empty preferences.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    cache: Mutex<Preferences>,
}

impl FilePreferences {
    /// Open (or lazily create) the preference file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt provider preferences");
                Preferences::default()
            }),
            Err(_) => Preferences::default(),
        };
        Self {
            path,
            cache: Mutex::new(prefs),
        }
    }

    /// Location of the preference file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, prefs: &Preferences) -> Result<(), LlmError> {
        let json = serde_json::to_string_pretty(prefs).map_err(|e| LlmError::Preferences(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LlmError::Preferences(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| LlmError::Preferences(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| LlmError::Preferences(e.to_string()))
    }
}

impl PreferenceStore for FilePreferences {
    fn load(&self) -> Preferences {
        self.cache.lock().clone()
    }

    fn record(&self, provider: ProviderKind, model: Option<&str>) -> Result<(), LlmError> {
        let mut prefs = self.cache.lock();
        apply(&mut prefs, provider, model);
        self.persist(&prefs)
    }
}

// ---------------------------------------------------------------------------
// Model ranking
// ---------------------------------------------------------------------------

/// Ranked keywords used to pick a default model per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRanking {
    ranks: BTreeMap<ProviderKind, Vec<String>>,
}

impl Default for ModelRanking {
    fn default() -> Self {
        Self::new()
            .with(ProviderKind::Ollama, ["llama3", "mistral", "llama"])
            .with(ProviderKind::OpenAi, ["gpt-3.5-turbo", "gpt-4"])
    }
}

impl ModelRanking {
    /// Empty ranking: the first offered model always wins.
    #[must_use]
    pub fn new() -> Self {
        Self { ranks: BTreeMap::new() }
    }

    /// Set the keywords for one provider, best first.
    #[must_use]
    pub fn with<I, S>(mut self, provider: ProviderKind, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ranks.insert(provider, keywords.into_iter().map(Into::into).collect());
        self
    }

    /// Best model of `models` for `provider`.
    #[must_use]
    pub fn pick<'m>(&self, provider: ProviderKind, models: &'m [String]) -> Option<&'m String> {
        let ranked = self.ranks.get(&provider).into_iter().flatten().find_map(|keyword| {
            let keyword = keyword.to_ascii_lowercase();
            models.iter().find(|m| m.to_ascii_lowercase().contains(&keyword))
        });
        ranked.or_else(|| models.first())
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Chooses provider and model for each request.
#[derive(Clone)]
pub struct ProviderSelector {
    preferences: Arc<dyn PreferenceStore>,
    ranking: ModelRanking,
    priority: Vec<ProviderKind>,
}

impl std::fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSelector")
            .field("ranking", &self.ranking)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl ProviderSelector {
    /// Selector with default ranking and priority.
    pub fn new(preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            preferences,
            ranking: ModelRanking::default(),
            priority: ProviderKind::PRIORITY.to_vec(),
        }
    }

    /// Replace the model ranking.
    #[must_use]
    pub fn with_ranking(mut self, ranking: ModelRanking) -> Self {
        self.ranking = ranking;
        self
    }

    /// Replace the fallback priority order. An empty list keeps the default.
    #[must_use]
    pub fn with_priority(mut self, priority: Vec<ProviderKind>) -> Self {
        if !priority.is_empty() {
            self.priority = priority;
        }
        self
    }

    /// The preference store in use.
    #[must_use]
    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    /// Resolve provider and model for a request.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::NoProviderAvailable`] if no provider in the
    /// snapshot is available.
    pub fn resolve(
        &self,
        provider: Option<ProviderKind>,
        model: Option<&str>,
        snapshot: &ProviderSnapshot,
    ) -> Result<Selection, LlmError> {
        let prefs = self.preferences.load();

        let explicit_provider = provider.filter(|p| snapshot.is_available(*p));
        if let (Some(requested), None) = (provider, explicit_provider) {
            debug!(provider = %requested, "Requested provider unavailable; falling back");
        }
        let chosen = explicit_provider
            .or_else(|| prefs.provider.filter(|p| snapshot.is_available(*p)))
            .or_else(|| self.priority.iter().copied().find(|p| snapshot.is_available(*p)))
            .ok_or(LlmError::NoProviderAvailable)?;

        let models = snapshot.get(chosen).map(|d| d.models.as_slice()).unwrap_or_default();
        let explicit_model = model.and_then(|m| models.iter().find(|x| x.as_str() == m));
        let model = explicit_model
            .or_else(|| {
                prefs
                    .models
                    .get(&chosen)
                    .and_then(|m| models.iter().find(|x| *x == m))
            })
            .or_else(|| self.ranking.pick(chosen, models))
            .cloned();

        if explicit_provider.is_some() || explicit_model.is_some() {
            let remembered = explicit_model.map(String::as_str);
            if let Err(e) = self.preferences.record(chosen, remembered) {
                warn!(provider = %chosen, error = %e, "Could not remember provider choice");
            }
        }

        debug!(provider = %chosen, model = model.as_deref().unwrap_or("<backend default>"), "Resolved provider");
        Ok(Selection { provider: chosen, model })
    }
}
