//! Storage abstraction for marketplace records.
//!
//! Every entity is persisted as a versioned JSON document keyed by
//! `(kind, id)`. Writes are optimistic: an update names the version it was
//! read at and fails with [`StoreError::Conflict`] when someone else got
//! there first. Typed access goes through [`Repository`].

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

const MODIFY_ATTEMPTS: u32 = 3;
const INSERT_ATTEMPTS: u32 = 5;

/// Errors a [`Store`] backend can return.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored version no longer matches the version the caller read.
    #[error("concurrent modification of {kind} {id}: expected version {expected_version}")]
    Conflict {
        kind: String,
        id: String,
        expected_version: i64,
    },

    /// Another record of the kind already holds this id.
    #[error("{kind} id {id} is already taken")]
    IdTaken { kind: String, id: String },

    /// Another record of the kind already holds this lookup key.
    #[error("{kind} {key} already exists")]
    Duplicate { kind: String, key: String },

    /// Update targeted a record that was never inserted.
    #[error("{kind} {id} does not exist")]
    Missing { kind: String, id: String },

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend specific failure (connection, SQL, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Raw stored form of a record.
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: String,
    pub id: String,
    pub version: i64,
    /// Optional secondary key, unique per kind (e.g. an account email).
    pub lookup_key: Option<String>,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Insert a new document at version 1.
    async fn insert(&self, doc: Document) -> Result<(), StoreError>;

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find_by_key(&self, kind: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Replace a document if its stored version equals `expected_version`.
    /// Returns the new version.
    async fn update(&self, doc: Document, expected_version: i64) -> Result<i64, StoreError>;

    /// All documents of a kind in insertion order.
    async fn list(&self, kind: &str) -> Result<Vec<Document>, StoreError>;
}

/// A persisted entity.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;

    fn record_id(&self) -> String;

    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    fn lookup_key(&self) -> Option<String> {
        None
    }

    /// Draw a fresh random id after a collision. Records whose id is derived
    /// from another record return `false`.
    fn regenerate_id(&mut self) -> bool {
        false
    }
}

/// Typed CRUD over a [`Store`] for one entity.
pub struct Repository<T> {
    store: Arc<dyn Store>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    fn to_document(record: &T) -> Result<Document, StoreError> {
        Ok(Document {
            kind: T::KIND.to_string(),
            id: record.record_id(),
            version: record.version(),
            lookup_key: record.lookup_key(),
            body: serde_json::to_value(record)?,
        })
    }

    fn from_document(doc: Document) -> Result<T, StoreError> {
        let mut record: T = serde_json::from_value(doc.body)?;
        record.set_version(doc.version);
        Ok(record)
    }

    /// Insert at version 1. A generated id that collides with an existing
    /// record is redrawn, so callers must read the id back afterwards.
    pub async fn insert(&self, record: &mut T) -> Result<(), StoreError> {
        record.set_version(1);
        let mut attempt = 1;
        loop {
            let doc = Self::to_document(record)?;
            match self.store.insert(doc).await {
                Err(StoreError::IdTaken { .. })
                    if attempt < INSERT_ATTEMPTS && record.regenerate_id() =>
                {
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(T::KIND, id).await? {
            Some(doc) => Ok(Some(Self::from_document(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.find_by_key(T::KIND, key).await? {
            Some(doc) => Ok(Some(Self::from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Persist `record` and bump its version on success.
    pub async fn update(&self, record: &mut T) -> Result<(), StoreError> {
        let expected = record.version();
        let mut doc = Self::to_document(record)?;
        doc.version = expected + 1;
        let version = self.store.update(doc, expected).await?;
        record.set_version(version);
        Ok(())
    }

    /// Read-modify-write with a few retries on version conflicts. For
    /// changes that commute with concurrent writers (counters, flags).
    pub async fn modify<F>(&self, id: &str, mut apply: F) -> Result<Option<T>, StoreError>
    where
        F: FnMut(&mut T) + Send,
    {
        let mut attempt = 1;
        loop {
            let Some(mut record) = self.get(id).await? else {
                return Ok(None);
            };
            apply(&mut record);
            match self.update(&mut record).await {
                Ok(()) => return Ok(Some(record)),
                Err(StoreError::Conflict { .. }) if attempt < MODIFY_ATTEMPTS => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.store
            .list(T::KIND)
            .await?
            .into_iter()
            .map(Self::from_document)
            .collect()
    }
}
