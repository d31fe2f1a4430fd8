//! In-process document store
//!
//! Keeps every collection in memory behind a single `RwLock`; the write lock
//! makes compare-and-swap atomic. Can be saved to and restored from a JSON
//! snapshot file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::document::{Collection, Document, DocumentStore, SharedStore, StoreError, StoreResult, Version};

type CollectionMap = BTreeMap<Collection, BTreeMap<String, Document>>;

/// On-disk snapshot format
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collections: BTreeMap<String, Vec<Document>>,
}

/// In-memory document store
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<CollectionMap>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    /// Restore a store from a JSON snapshot
    pub fn load_snapshot(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;

        let all = [
            Collection::Users,
            Collection::Products,
            Collection::Transactions,
            Collection::Disputes,
            Collection::Reports,
            Collection::Reviews,
            Collection::AdminActions,
        ];

        let mut data = CollectionMap::new();
        for (name, docs) in snapshot.collections {
            let collection = all
                .iter()
                .copied()
                .find(|c| c.as_str() == name)
                .ok_or_else(|| StoreError::Deserialization(format!("unknown collection: {}", name)))?;
            let entries = docs.into_iter().map(|d| (d.id.clone(), d)).collect();
            data.insert(collection, entries);
        }

        Ok(Self {
            data: RwLock::new(data),
        })
    }

    /// Write all collections to a JSON snapshot
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let data = self.data.read().map_err(|_| StoreError::LockPoisoned)?;
        let snapshot = Snapshot {
            collections: data
                .iter()
                .map(|(c, docs)| (c.as_str().to_string(), docs.values().cloned().collect()))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: Collection) -> StoreResult<usize> {
        let data = self.data.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data.get(&collection).map_or(0, |docs| docs.len()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let data = self.data.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        body: serde_json::Value,
    ) -> StoreResult<Version> {
        let mut data = self.data.write().map_err(|_| StoreError::LockPoisoned)?;
        let docs = data.entry(collection).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(
            id.to_string(),
            Document {
                id: id.to_string(),
                version: Version::INITIAL,
                updated_at: Utc::now(),
                body,
            },
        );
        debug!(%collection, id, "Document inserted");
        Ok(Version::INITIAL)
    }

    async fn compare_and_swap(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
        body: serde_json::Value,
    ) -> StoreResult<Version> {
        let mut data = self.data.write().map_err(|_| StoreError::LockPoisoned)?;
        let conflict = || StoreError::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
        };

        let doc = data
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(conflict)?;

        if doc.version != expected {
            return Err(conflict());
        }

        doc.version = expected.next();
        doc.updated_at = Utc::now();
        doc.body = body;
        Ok(doc.version)
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Document>> {
        let data = self.data.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }
}
