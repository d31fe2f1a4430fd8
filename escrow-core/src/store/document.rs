//! Store contract and document envelope

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error type for document store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Version conflict on {collection}/{id}")]
    VersionConflict { collection: String, id: String },

    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a document store
pub type SharedStore = Arc<dyn DocumentStore>;

/// Logical grouping of documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Products,
    Transactions,
    Disputes,
    Reports,
    Reviews,
    AdminActions,
}

impl Collection {
    /// Collection name as stored
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Products => "products",
            Self::Transactions => "transactions",
            Self::Disputes => "disputes",
            Self::Reports => "reports",
            Self::Reviews => "reviews",
            Self::AdminActions => "admin_actions",
        }
    }

    /// Singular entity name used in error messages
    pub fn kind(self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Products => "product",
            Self::Transactions => "transaction",
            Self::Disputes => "dispute",
            Self::Reports => "report",
            Self::Reviews => "review",
            Self::AdminActions => "admin action",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque concurrency token; changes on every successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// Version assigned to a freshly inserted document
    pub const INITIAL: Version = Version(1);

    /// The version following this one
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A stored document with its concurrency token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub version: Version,
    pub updated_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

/// Transactional document store consumed by the marketplace core.
///
/// Implementations must make [`DocumentStore::compare_and_swap`] atomic:
/// the write is applied only if the stored version still equals `expected`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, or `None` if absent
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    /// Create a document; fails with `AlreadyExists` if the id is taken
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        body: serde_json::Value,
    ) -> StoreResult<Version>;

    /// Replace a document only if it is still at `expected`
    async fn compare_and_swap(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
        body: serde_json::Value,
    ) -> StoreResult<Version>;

    /// All documents in a collection, ordered by id
    async fn list(&self, collection: Collection) -> StoreResult<Vec<Document>>;
}
