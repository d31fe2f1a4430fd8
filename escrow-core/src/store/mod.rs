//! Document store abstraction with optimistic concurrency
//!
//! The marketplace persists every entity as a JSON document addressed by
//! `(collection, id)`. Each document carries a [`Version`] that changes on
//! every write; writers must present the version they read, so two actors
//! can never both apply a guard against the same stale read.
//!
//! # Architecture
//!
//! - [`DocumentStore`]: the collaborator contract (async, object safe).
//! - [`MemoryStore`]: in-process implementation with JSON snapshots.
//! - [`Repository`]: typed view of one collection with a bounded
//!   read-validate-write retry loop ([`Repository::update`]).
//!
//! # Usage
//!
//! ```ignore
//! use escrow_core::store::{Collection, MemoryStore, Repository};
//!
//! let store = MemoryStore::new().shared();
//! let users: Repository<UserRecord> = Repository::new(store, Collection::Users);
//! let (record, _) = users
//!     .update("u-1", 5, |user| Ok((user.clone(), ())))
//!     .await?;
//! ```

pub mod document;
pub mod memory;
pub mod repository;

pub use document::{Collection, Document, DocumentStore, SharedStore, StoreError, StoreResult, Version};
pub use memory::MemoryStore;
pub use repository::{Repository, Versioned};
