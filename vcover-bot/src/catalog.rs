//! Model catalog
//!
//! A catalog is the ordered list of voice models a backend offers, each with
//! an optional operator-assigned alias. Entries are persisted as
//! `modelId|||alias` strings.

use serde::{Deserialize, Serialize};

/// Separator between model identifier and alias in persisted entries
pub const MODEL_ALIAS_SEPARATOR: &str = "|||";

/// One model in a catalog
///
/// `model_id` is opaque and passed unchanged to inference. It is assumed
/// never to contain [`MODEL_ALIAS_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model_id: String,
    pub alias: Option<String>,
}

impl ModelEntry {
    pub fn new(model_id: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            alias: alias.filter(|a| !a.is_empty()),
        }
    }

    /// Parse a persisted `modelId|||alias` entry
    ///
    /// Only the first separator splits; an entry without one has no alias.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(MODEL_ALIAS_SEPARATOR) {
            Some((model_id, alias)) => Self::new(model_id, Some(alias.to_string())),
            None => Self::new(raw, None),
        }
    }

    /// Persisted form; the separator is always written
    pub fn serialize(&self) -> String {
        format!(
            "{}{}{}",
            self.model_id,
            MODEL_ALIAS_SEPARATOR,
            self.alias.as_deref().unwrap_or("")
        )
    }

    /// Alias if set, otherwise the model id without its file extension
    pub fn display_name(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) => alias,
            None => strip_extension(&self.model_id),
        }
    }
}

/// Remove the final extension of the last path component
///
/// Leading dots of the file name do not start an extension, so
/// `.hidden` stays intact while `voice.v2.pth` becomes `voice.v2`.
fn strip_extension(name: &str) -> &str {
    let base_start = name.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();

    match base[leading_dots..].rfind('.') {
        Some(dot) => &name[..base_start + leading_dots + dot],
        None => name,
    }
}

/// Rendered catalog: the numbered listing and the parallel id list
///
/// `keys[i]` is the model id shown on line `i + 1` of `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogListing {
    pub text: String,
    pub keys: Vec<String>,
}

/// Ordered model catalog of one backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    /// Build from persisted `modelId|||alias` strings
    pub fn from_config(raw: &[String]) -> Self {
        Self::new(raw.iter().map(|s| ModelEntry::parse(s)).collect())
    }

    /// Persisted form, in catalog order
    pub fn to_config(&self) -> Vec<String> {
        self.entries.iter().map(ModelEntry::serialize).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-indexed listing, one `"{index}. {display}"` line per entry
    pub fn format(&self) -> CatalogListing {
        let text = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. {}", i + 1, entry.display_name()))
            .collect::<Vec<_>>()
            .join("\n");
        let keys = self.entries.iter().map(|e| e.model_id.clone()).collect();

        CatalogListing { text, keys }
    }

    /// Catalog for a freshly listed set of model ids
    ///
    /// Ids already present keep their alias, new ids get none, and ids no
    /// longer listed are dropped. Order follows `model_ids`.
    pub fn merged_with(&self, model_ids: Vec<String>) -> ModelCatalog {
        let entries = model_ids
            .into_iter()
            .map(|model_id| {
                let alias = self
                    .entries
                    .iter()
                    .find(|e| e.model_id == model_id)
                    .and_then(|e| e.alias.clone());
                ModelEntry::new(model_id, alias)
            })
            .collect();

        ModelCatalog { entries }
    }
}
