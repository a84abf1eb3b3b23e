//! Controlled-vocabulary expansion for subject keywords given as URLs.

use std::collections::BTreeMap;

use crate::error::Result;

/// Turns a controlled-vocabulary concept URL into human-readable labels.
pub trait VocabularyExpander: Send + Sync {
    fn expand(&self, url: &str) -> Result<Vec<String>>;
}

/// Knows no concepts; every URL expands to nothing.
pub struct NoVocabulary;

impl VocabularyExpander for NoVocabulary {
    fn expand(&self, _url: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Labels from a fixed table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticVocabulary {
    labels: BTreeMap<String, Vec<String>>,
}

impl StaticVocabulary {
    pub fn new(labels: BTreeMap<String, Vec<String>>) -> Self {
        Self { labels }
    }

    pub fn insert(&mut self, url: impl Into<String>, labels: Vec<String>) {
        self.labels.insert(url.into(), labels);
    }
}

impl VocabularyExpander for StaticVocabulary {
    fn expand(&self, url: &str) -> Result<Vec<String>> {
        // Concept URLs are published both with and without a trailing slash.
        let found = self
            .labels
            .get(url)
            .or_else(|| self.labels.get(url.trim_end_matches('/')));
        match found {
            Some(labels) => Ok(labels.clone()),
            None => {
                log::debug!("No labels known for {}", url);
                Ok(Vec::new())
            }
        }
    }
}
