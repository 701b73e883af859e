use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::label::ObjectLabel;

/// One stored generation result. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryRecord {
    pub id: String,
    pub object_type: ObjectLabel,
    pub image_url: String,
    pub created: String,
}

impl GalleryRecord {
    /// Assembles a record with a fresh id and the current UTC time.
    pub fn new(object_type: ObjectLabel, image_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            object_type,
            image_url: image_url.into(),
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Process-local gallery, newest record first.
///
/// Nothing is persisted; the collection dies with the process.
#[derive(Debug, Default)]
pub struct GalleryStore {
    records: RwLock<VecDeque<GalleryRecord>>,
}

impl GalleryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: GalleryRecord) {
        self.write().push_front(record);
    }

    pub fn list(&self) -> Vec<GalleryRecord> {
        self.read().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<GalleryRecord> {
        self.read().iter().find(|record| record.id == id).cloned()
    }

    /// Removes the record with `id`. Returns `false` when it was not present.
    pub fn remove(&self, id: &str) -> bool {
        let mut records = self.write();
        let before = records.len();
        records.retain(|record| record.id != id);
        records.len() != before
    }

    /// Drops every record and reports how many were removed.
    pub fn clear(&self) -> usize {
        let mut records = self.write();
        let removed = records.len();
        records.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Every mutation is a single deque call, so a poisoned lock still holds a
    // consistent collection.
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<GalleryRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<GalleryRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
