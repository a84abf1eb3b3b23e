//! Catalog entities produced by the converters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Schema version
// ---------------------------------------------------------------------------

/// DDI schema generation, decided by the document's root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// DDI-Codebook (DDI 2.x), root `codeBook`.
    Codebook,
    /// DDI-Lifecycle (DDI 3.x), root `DDIInstance`.
    Lifecycle,
}

impl SchemaVersion {
    pub fn from_root_tag(tag: &str) -> Option<Self> {
        match tag {
            "codeBook" => Some(Self::Codebook),
            "DDIInstance" => Some(Self::Lifecycle),
            _ => None,
        }
    }

    pub fn root_tag(&self) -> &'static str {
        match self {
            Self::Codebook => "codeBook",
            Self::Lifecycle => "DDIInstance",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codebook => write!(f, "DDI2"),
            Self::Lifecycle => write!(f, "DDI3"),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog record
// ---------------------------------------------------------------------------

/// One dataset in the catalog. Identified by `name`; `id` is the store key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub maintainer: Option<String>,
    pub maintainer_email: Option<String>,
    pub notes: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub license_id: Option<String>,
    pub extras: Extras,
    /// Tag associations, by tag name.
    pub tags: Vec<String>,
    pub resources: Vec<Resource>,
    /// Names of the groups this record belongs to.
    pub groups: Vec<String>,
}

impl CatalogRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }

    /// Attach a resource, replacing an earlier one with the same description.
    pub fn attach_resource(&mut self, resource: Resource) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.description == resource.description)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }
}

/// Insertion-ordered string map for open-ended record metadata.
///
/// Setting an existing key overwrites the value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extras {
    entries: Vec<(String, String)>,
}

impl Extras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys starting with `prefix`, in insertion order.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(move |k| k.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A file attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub url: String,
    pub description: String,
    pub format: Option<String>,
    pub size: Option<u64>,
}

impl Resource {
    pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
            format: None,
            size: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

// ---------------------------------------------------------------------------
// Tags and groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// A producer organization that records are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    /// Member record names.
    pub members: BTreeSet<String>,
}

impl Group {
    /// A new group whose title and description default to its name.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            title: name.clone(),
            description: name.clone(),
            name,
            members: BTreeSet::new(),
        }
    }
}

/// An entity that just came into existence and is owed default roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Record(String),
    Group(String),
}

// ---------------------------------------------------------------------------
// Harvest tracking
// ---------------------------------------------------------------------------

/// The harvester's tracking handle for one fetched document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestObject {
    pub package_id: Option<String>,
    /// Raw fetched content; cleared once the record is materialized.
    pub content: Option<String>,
    pub current: bool,
}

impl HarvestObject {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            package_id: None,
            content: Some(content.into()),
            current: false,
        }
    }

    /// Point at the materialized record.
    pub fn mark_converted(&mut self, record_id: &str) {
        self.package_id = Some(record_id.to_string());
        self.content = None;
        self.current = true;
    }
}
