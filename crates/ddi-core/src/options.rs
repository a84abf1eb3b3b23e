//! Converter options shared across the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag names longer than this are cut (database column limit).
pub const DEFAULT_TAG_MAX_LENGTH: usize = 100;

/// All options controlling a conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterOptions {
    // -- Storage --
    /// Public base URL of the catalog site.
    pub site_url: String,
    /// Path under `site_url` where stored files are served.
    pub storage_path: String,
    /// Blob bucket for raw documents and exports.
    pub bucket: String,

    // -- Tags --
    pub tag_max_length: usize,
    /// Keywords under this URL prefix are expanded through the vocabulary.
    pub vocabulary_prefix: String,

    // -- Exports --
    /// Exports (raw XML, CSV tables) normally run only when a record is first
    /// created, on the assumption that a study's raw document and variable
    /// structure do not change between harvests. Setting this re-runs them on
    /// every update and replaces the earlier resources.
    pub reexport_on_update: bool,

    // -- Vocabulary (kept last: serialized as a TOML table) --
    /// Static concept URL → labels table.
    pub vocabulary: BTreeMap<String, Vec<String>>,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:5000".to_string(),
            storage_path: "/storage/f/".to_string(),
            bucket: "default".to_string(),
            tag_max_length: DEFAULT_TAG_MAX_LENGTH,
            vocabulary_prefix: "http://www.yso.fi".to_string(),
            reexport_on_update: false,
            vocabulary: BTreeMap::new(),
        }
    }
}

impl ConverterOptions {
    /// Public URL of a stored blob.
    pub fn file_url(&self, key: &str) -> String {
        let base = self.site_url.trim_end_matches('/');
        let path = self.storage_path.trim_matches('/');
        let key = ddi_utils::munge::encode_storage_key(key);
        if path.is_empty() {
            format!("{}/{}", base, key)
        } else {
            format!("{}/{}/{}", base, path, key)
        }
    }

    /// Whether blob and tabular exports run for this record.
    pub fn should_export(&self, is_new: bool) -> bool {
        is_new || self.reexport_on_update
    }
}
