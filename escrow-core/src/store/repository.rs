//! Typed repository over one collection

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::document::{Collection, Document, SharedStore, StoreError, Version};
use crate::error::{MarketError, MarketResult};

/// A decoded document together with the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub id: String,
    pub version: Version,
    pub value: T,
}

/// Typed access to one collection of a [`SharedStore`]
pub struct Repository<T> {
    store: SharedStore,
    collection: Collection,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection,
            _marker: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a repository for `collection`
    pub fn new(store: SharedStore, collection: Collection) -> Self {
        Self {
            store,
            collection,
            _marker: PhantomData,
        }
    }

    /// The collection this repository reads and writes
    pub fn collection(&self) -> Collection {
        self.collection
    }

    fn decode(&self, doc: Document) -> MarketResult<Versioned<T>> {
        let value = serde_json::from_value(doc.body).map_err(|e| {
            MarketError::integrity(format!(
                "{}/{} is not a valid {}: {}",
                self.collection,
                doc.id,
                self.collection.kind(),
                e
            ))
        })?;
        Ok(Versioned {
            id: doc.id,
            version: doc.version,
            value,
        })
    }

    fn encode(value: &T) -> MarketResult<serde_json::Value> {
        serde_json::to_value(value)
            .map_err(|e| MarketError::Store(StoreError::Serialization(e.to_string())))
    }

    /// Read a document, or `None` if absent
    pub async fn get(&self, id: &str) -> MarketResult<Option<Versioned<T>>> {
        match self.store.get(self.collection, id).await? {
            Some(doc) => Ok(Some(self.decode(doc)?)),
            None => Ok(None),
        }
    }

    /// Read a document that must exist
    pub async fn require(&self, id: &str) -> MarketResult<Versioned<T>> {
        self.get(id)
            .await?
            .ok_or_else(|| MarketError::not_found(self.collection.kind(), id))
    }

    /// Create a new document
    pub async fn insert(&self, id: &str, value: &T) -> MarketResult<Version> {
        let body = Self::encode(value)?;
        Ok(self.store.insert(self.collection, id, body).await?)
    }

    /// Conditionally replace `current` with `next`
    pub async fn replace(&self, current: &Versioned<T>, next: &T) -> MarketResult<Version> {
        let body = Self::encode(next)?;
        Ok(self
            .store
            .compare_and_swap(self.collection, &current.id, current.version, body)
            .await?)
    }

    /// All documents in the collection
    pub async fn list(&self) -> MarketResult<Vec<Versioned<T>>> {
        self.store
            .list(self.collection)
            .await?
            .into_iter()
            .map(|doc| self.decode(doc))
            .collect()
    }

    /// Read-validate-write with bounded retries.
    ///
    /// `apply` receives the freshly read value and returns the replacement
    /// plus an arbitrary output. A guard failure from `apply` aborts
    /// immediately; a version conflict on write re-reads and re-applies,
    /// up to `max_retries` extra attempts, after which the operation fails
    /// with `ConcurrentModification`.
    pub async fn update<R, F>(
        &self,
        id: &str,
        max_retries: u32,
        mut apply: F,
    ) -> MarketResult<(Versioned<T>, R)>
    where
        F: FnMut(&T) -> MarketResult<(T, R)>,
    {
        let attempts = max_retries + 1;
        for attempt in 1..=attempts {
            let current = self.require(id).await?;
            let (next, output) = apply(&current.value)?;

            match self.replace(&current, &next).await {
                Ok(version) => {
                    return Ok((
                        Versioned {
                            id: current.id,
                            version,
                            value: next,
                        },
                        output,
                    ))
                }
                Err(MarketError::Store(StoreError::VersionConflict { .. })) => {
                    debug!(
                        collection = %self.collection,
                        id,
                        attempt,
                        "Version conflict, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(MarketError::ConcurrentModification {
            kind: self.collection.kind(),
            id: id.to_string(),
            attempts,
        })
    }

    /// Like [`Repository::update`], but starts from `default()` when the
    /// document does not exist yet.
    pub async fn upsert<R, D, F>(
        &self,
        id: &str,
        max_retries: u32,
        default: D,
        mut apply: F,
    ) -> MarketResult<(Versioned<T>, R)>
    where
        D: Fn() -> T,
        F: FnMut(&T) -> MarketResult<(T, R)>,
    {
        let attempts = max_retries + 1;
        for attempt in 1..=attempts {
            let written = match self.get(id).await? {
                Some(current) => {
                    let (next, output) = apply(&current.value)?;
                    self.replace(&current, &next)
                        .await
                        .map(|version| (version, next, output))
                }
                None => {
                    let (next, output) = apply(&default())?;
                    self.insert(id, &next)
                        .await
                        .map(|version| (version, next, output))
                }
            };

            match written {
                Ok((version, value, output)) => {
                    return Ok((
                        Versioned {
                            id: id.to_string(),
                            version,
                            value,
                        },
                        output,
                    ))
                }
                Err(MarketError::Store(
                    StoreError::VersionConflict { .. } | StoreError::AlreadyExists { .. },
                )) => {
                    debug!(collection = %self.collection, id, attempt, "Upsert conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(MarketError::ConcurrentModification {
            kind: self.collection.kind(),
            id: id.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    fn repo() -> Repository<Counter> {
        Repository::new(MemoryStore::new().shared(), Collection::Users)
    }

    #[tokio::test]
    async fn test_update_applies_closure() {
        let repo = repo();
        repo.insert("c", &Counter { value: 1 }).await.unwrap();

        let (updated, previous) = repo
            .update("c", 3, |c| Ok((Counter { value: c.value + 1 }, c.value)))
            .await
            .unwrap();

        assert_eq!(previous, 1);
        assert_eq!(updated.value.value, 2);
        assert_eq!(updated.version, Version(2));
    }

    #[tokio::test]
    async fn test_update_guard_failure_does_not_write() {
        let repo = repo();
        repo.insert("c", &Counter { value: 1 }).await.unwrap();

        let err = repo
            .update("c", 3, |_| -> MarketResult<(Counter, ())> {
                Err(MarketError::validation("nope"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation { .. }));

        let current = repo.require("c").await.unwrap();
        assert_eq!(current.version, Version::INITIAL);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let err = repo()
            .update("missing", 3, |c| Ok((c.clone(), ())))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { kind: "user", .. }));
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let repo = repo();
        let bump = |c: &Counter| Ok((Counter { value: c.value + 10 }, ()));

        let (first, _) = repo.upsert("c", 3, || Counter { value: 0 }, bump).await.unwrap();
        assert_eq!(first.value.value, 10);
        assert_eq!(first.version, Version::INITIAL);

        let (second, _) = repo.upsert("c", 3, || Counter { value: 0 }, bump).await.unwrap();
        assert_eq!(second.value.value, 20);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_integrity_error() {
        let store = MemoryStore::new().shared();
        store
            .insert(Collection::Users, "bad", serde_json::json!({"value": "x"}))
            .await
            .unwrap();
        let repo: Repository<Counter> = Repository::new(store, Collection::Users);
        let err = repo.get("bad").await.unwrap_err();
        assert!(matches!(err, MarketError::Integrity { .. }));
    }
}
