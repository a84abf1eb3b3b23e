//! Catalog store collaborator and the staged revision converters write into.
//!
//! Converters never write to the store directly. Every upsert goes into a
//! [`Revision`], which reads through to the store but keeps its own writes
//! private. The pipeline hands the finished [`ChangeSet`] to
//! [`CatalogStore::commit`] in one call; a revision that is dropped instead
//! leaves the store untouched.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DdiError, Result};
use crate::record::{CatalogRecord, EntityRef, Group, Tag};

/// Persistence for records, tags, and groups.
pub trait CatalogStore {
    fn record_by_name(&self, name: &str) -> Result<Option<CatalogRecord>>;

    fn record_by_id(&self, id: &str) -> Result<Option<CatalogRecord>>;

    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    fn group_by_name(&self, name: &str) -> Result<Option<Group>>;

    /// Apply every staged write atomically, or none of them.
    fn commit(&mut self, changes: ChangeSet) -> Result<()>;
}

/// Everything one conversion wants to write.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub records: Vec<CatalogRecord>,
    pub tags: Vec<Tag>,
    pub groups: Vec<Group>,
    /// Entities to receive the default access roles.
    pub role_grants: Vec<EntityRef>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.tags.is_empty()
            && self.groups.is_empty()
            && self.role_grants.is_empty()
    }
}

/// A write scope over a catalog store.
pub struct Revision<'s> {
    store: &'s dyn CatalogStore,
    records: Vec<CatalogRecord>,
    tags: BTreeMap<String, Tag>,
    groups: BTreeMap<String, Group>,
    role_grants: Vec<EntityRef>,
}

impl<'s> Revision<'s> {
    pub fn new(store: &'s dyn CatalogStore) -> Self {
        Self {
            store,
            records: Vec::new(),
            tags: BTreeMap::new(),
            groups: BTreeMap::new(),
            role_grants: Vec::new(),
        }
    }

    pub fn record_by_name(&self, name: &str) -> Result<Option<CatalogRecord>> {
        if let Some(staged) = self.records.iter().find(|r| r.name == name) {
            return Ok(Some(staged.clone()));
        }
        self.store.record_by_name(name)
    }

    /// Stage a record, replacing any staged version with the same id.
    pub fn put_record(&mut self, record: CatalogRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(staged) => *staged = record,
            None => self.records.push(record),
        }
    }

    /// Look up a tag by name, creating it when it does not exist yet.
    pub fn ensure_tag(&mut self, name: &str) -> Result<Tag> {
        if let Some(tag) = self.tags.get(name) {
            return Ok(tag.clone());
        }
        let tag = match self.store.tag_by_name(name)? {
            Some(existing) => existing,
            None => {
                log::debug!("Creating tag {:?}", name);
                let tag = Tag {
                    id: new_id(),
                    name: name.to_string(),
                };
                self.tags.insert(name.to_string(), tag.clone());
                tag
            }
        };
        Ok(tag)
    }

    /// Add `record` to the group called `group_name`, creating the group if
    /// needed. Returns `true` when the group was created by this call.
    pub fn add_group_member(&mut self, group_name: &str, record: &mut CatalogRecord) -> Result<bool> {
        let (mut group, created) = match self.groups.remove(group_name) {
            Some(staged) => (staged, false),
            None => match self.store.group_by_name(group_name)? {
                Some(existing) => (existing, false),
                None => {
                    log::debug!("Creating group {:?}", group_name);
                    (Group::named(new_id(), group_name), true)
                }
            },
        };
        group.members.insert(record.name.clone());
        if !record.groups.iter().any(|g| g == group_name) {
            record.groups.push(group_name.to_string());
        }
        self.groups.insert(group_name.to_string(), group);
        Ok(created)
    }

    /// Stage the default role assignment for a freshly created entity.
    pub fn grant_default_roles(&mut self, entity: EntityRef) {
        if !self.role_grants.contains(&entity) {
            self.role_grants.push(entity);
        }
    }

    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            records: self.records,
            tags: self.tags.into_values().collect(),
            groups: self.groups.into_values().collect(),
            role_grants: self.role_grants,
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A catalog held in memory, optionally persisted as a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCatalog {
    /// Records keyed by id.
    records: BTreeMap<String, CatalogRecord>,
    /// Tags keyed by name.
    tags: BTreeMap<String, Tag>,
    /// Groups keyed by name.
    groups: BTreeMap<String, Group>,
    role_grants: Vec<EntityRef>,
    revision: u64,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file. A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(DdiError::Catalog(format!("Cannot read {}: {}", path.display(), e))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.records.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn role_grants(&self) -> &[EntityRef] {
        &self.role_grants
    }

    /// Number of successful commits.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl CatalogStore for MemoryCatalog {
    fn record_by_name(&self, name: &str) -> Result<Option<CatalogRecord>> {
        Ok(self.records.values().find(|r| r.name == name).cloned())
    }

    fn record_by_id(&self, id: &str) -> Result<Option<CatalogRecord>> {
        Ok(self.records.get(id).cloned())
    }

    fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        Ok(self.tags.get(name).cloned())
    }

    fn group_by_name(&self, name: &str) -> Result<Option<Group>> {
        Ok(self.groups.get(name).cloned())
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        // Validate before touching anything so a rejected change set leaves
        // the catalog as it was.
        for record in &changes.records {
            if let Some(other) = self
                .records
                .values()
                .find(|r| r.name == record.name && r.id != record.id)
            {
                return Err(DdiError::Catalog(format!(
                    "Record name {:?} already belongs to {}",
                    record.name, other.id
                )));
            }
            if let Some(other) = self.records.get(&record.id).filter(|r| r.name != record.name) {
                return Err(DdiError::Catalog(format!(
                    "Record id {} already belongs to {:?}",
                    record.id, other.name
                )));
            }
        }

        for tag in changes.tags {
            self.tags.entry(tag.name.clone()).or_insert(tag);
        }
        for group in changes.groups {
            self.groups.insert(group.name.clone(), group);
        }
        for record in changes.records {
            self.records.insert(record.id.clone(), record);
        }
        for grant in changes.role_grants {
            if !self.role_grants.contains(&grant) {
                self.role_grants.push(grant);
            }
        }
        self.revision += 1;
        Ok(())
    }
}
